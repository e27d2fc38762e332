//! Asset runtimes
//!
//! An asset runtime is the live instantiation of one [`AssetDefinition`].
//! Every runtime is built in two phases:
//!
//! 1. **construct**: wire the runtime to its definition. No files are read
//!    and no native handles are acquired, so this cannot fail.
//! 2. **use_definition** (or `load`): do the expensive work. File reads,
//!    decoding, GPU uploads and physics shape creation all happen here, and
//!    any handle acquired before a failure is released before returning.
//!
//! Runtimes come in two flavours:
//!
//! - **Shared** (textures, shaders, materials, models, audio, fonts) live in
//!   a [`Cache`] keyed by definition UUID and are referenced by any number of
//!   entities.
//! - **Discrete** (physics objects, scripts, lights, paths, animations) are
//!   owned by exactly one entity and dropped with it.

pub mod animation;
pub mod audio;
pub mod cache;
pub mod discrete;
pub mod font;
pub mod light;
pub mod material;
pub mod model;
pub mod obj;
pub mod path;
pub mod shader;
pub mod texture;

pub use animation::AnimationRuntime;
pub use audio::AudioRuntime;
pub use cache::{Cache, SharedAssetRuntime};
pub use discrete::DiscreteAssetRuntime;
pub use font::FontRuntime;
pub use light::LightRuntime;
pub use material::MaterialRuntime;
pub use model::ModelRuntime;
pub use path::PathRuntime;
pub use shader::ShaderRuntime;
pub use texture::TextureRuntime;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::backend::{AudioBackend, BackendError, GraphicsBackend};
use crate::definition::{AssetDefinition, AssetType, DefinitionError, ProjectDefinition};
use crate::foundation::uuid::Uuid;
use crate::physics::SharedPhysicsWorld;
use crate::scripting::SharedScriptEngine;
use crate::storage::ProjectDirectory;

/// Lifecycle of one runtime instance. `Error` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Wired to its definition, no resources acquired
    Constructed,
    /// `use_definition` succeeded
    Loaded,
    /// `use_definition` failed; build a fresh instance to retry
    Error,
}

/// Common surface of every asset runtime
pub trait AssetRuntime: Send + Sync {
    /// Definition this runtime was built from
    fn definition(&self) -> &Arc<AssetDefinition>;

    /// Current lifecycle state
    fn state(&self) -> RuntimeState;

    /// Identifier of the definition
    fn uuid(&self) -> &Uuid {
        self.definition().uuid()
    }

    /// Whether `use_definition` succeeded
    fn is_loaded(&self) -> bool {
        self.state() == RuntimeState::Loaded
    }

    /// Whether `use_definition` failed
    fn has_error(&self) -> bool {
        self.state() == RuntimeState::Error
    }
}

/// A referenced asset could not be resolved
#[derive(Debug, Error)]
pub enum DependencyError {
    /// The referencing definition has no value for a required slot
    #[error("{owner} has no {kind} assigned")]
    Unassigned {
        /// Dependent runtime
        owner: String,
        /// Kind of asset required
        kind: AssetType,
    },

    /// The referenced UUID names no definition in the project
    #[error("{owner} references {kind} {uuid} which is not defined")]
    Undefined {
        /// Dependent runtime
        owner: String,
        /// Kind of asset required
        kind: AssetType,
        /// Missing reference
        uuid: Uuid,
    },

    /// The referenced definition exists but its runtime could not be built
    #[error("{owner} references {kind} {uuid} which failed to load")]
    Unavailable {
        /// Dependent runtime
        owner: String,
        /// Kind of asset required
        kind: AssetType,
        /// Failed reference
        uuid: Uuid,
    },
}

/// `use_definition` or `load` failed
#[derive(Debug, Error)]
pub enum ConstructionError {
    /// A required field is missing or malformed
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// An asset file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// An asset file could not be decoded
    #[error("cannot decode {path}: {reason}")]
    Decode {
        /// File being decoded
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// A required dependency could not be resolved
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// A native collaborator refused the request
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The format is not one this engine can build
    #[error("unsupported format '{format}' for {owner}")]
    UnsupportedFormat {
        /// Runtime being built
        owner: String,
        /// Format requested
        format: String,
    },

    /// An entity references an asset the project does not define
    #[error("asset {0} is not defined in the project")]
    UnknownAsset(Uuid),

    /// A previous build of this definition failed and it was not invalidated
    #[error("{0} failed to load earlier and has not been invalidated")]
    PreviouslyFailed(Uuid),
}

impl ConstructionError {
    /// Wrap an I/O error with the path being read
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Everything a runtime needs during its second construction phase
#[derive(Clone, Copy)]
pub struct LoadContext<'a> {
    /// Project definitions, for resolving references
    pub project: &'a ProjectDefinition,
    /// Asset path resolution
    pub directory: &'a ProjectDirectory,
    /// Graphics context
    pub graphics: &'a Arc<dyn GraphicsBackend>,
    /// Audio device
    pub audio: &'a Arc<dyn AudioBackend>,
    /// Physics world
    pub physics: &'a SharedPhysicsWorld,
    /// Script engine
    pub scripts: &'a SharedScriptEngine,
    /// Shared runtime caches
    pub caches: &'a Caches,
}

impl LoadContext<'_> {
    /// Resolve a required reference to a shared runtime
    pub fn resolve<T: SharedAssetRuntime>(
        &self,
        cache: &Cache<T>,
        owner: &str,
        uuid: Option<&Uuid>,
    ) -> Result<Arc<T>, DependencyError> {
        let kind = T::ASSET_TYPE;
        let uuid = uuid.ok_or_else(|| DependencyError::Unassigned {
            owner: owner.to_string(),
            kind,
        })?;
        let definition = self
            .project
            .asset_definition(uuid)
            .filter(|d| d.asset_type() == kind)
            .ok_or_else(|| DependencyError::Undefined {
                owner: owner.to_string(),
                kind,
                uuid: uuid.clone(),
            })?;
        cache
            .get_runtime(Some(definition), self)
            .ok_or_else(|| DependencyError::Unavailable {
                owner: owner.to_string(),
                kind,
                uuid: uuid.clone(),
            })
    }
}

/// One cache per shared asset kind
pub struct Caches {
    /// Texture runtimes
    pub textures: Cache<TextureRuntime>,
    /// Shader runtimes
    pub shaders: Cache<ShaderRuntime>,
    /// Material runtimes
    pub materials: Cache<MaterialRuntime>,
    /// Model runtimes
    pub models: Cache<ModelRuntime>,
    /// Audio runtimes
    pub audio: Cache<AudioRuntime>,
    /// Font runtimes
    pub fonts: Cache<FontRuntime>,
}

impl Default for Caches {
    fn default() -> Self {
        Self::new()
    }
}

impl Caches {
    /// Create empty caches
    pub fn new() -> Self {
        Self {
            textures: Cache::new(),
            shaders: Cache::new(),
            materials: Cache::new(),
            models: Cache::new(),
            audio: Cache::new(),
            fonts: Cache::new(),
        }
    }

    /// Clear every cache, dependents before their dependencies
    pub fn clear(&self) {
        self.models.clear();
        self.materials.clear();
        self.shaders.clear();
        self.textures.clear();
        self.audio.clear();
        self.fonts.clear();
    }

    /// Evict runtimes nothing outside the caches references.
    ///
    /// Dependents go first so that the dependencies they held become
    /// collectable in the same pass.
    pub fn collect_garbage(&self) -> usize {
        self.models.collect_garbage()
            + self.materials.collect_garbage()
            + self.shaders.collect_garbage()
            + self.textures.collect_garbage()
            + self.audio.collect_garbage()
            + self.fonts.collect_garbage()
    }

    /// Runtimes across all caches
    pub fn len(&self) -> usize {
        self.textures.len()
            + self.shaders.len()
            + self.materials.len()
            + self.models.len()
            + self.audio.len()
            + self.fonts.len()
    }

    /// Whether every cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
