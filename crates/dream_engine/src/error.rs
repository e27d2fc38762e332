//! Top-level error types
//!
//! Per-asset and per-entity failures are isolated where they happen and
//! surface here only as [`RuntimeOperationError`] reports; the frame loop
//! keeps running. [`EngineError`] is what reaches the process boundary.

use thiserror::Error;

use crate::config::ConfigError;
use crate::definition::DefinitionError;
use crate::foundation::uuid::Uuid;
use crate::project::tasks::TaskError;
use crate::scene::runtime::SceneError;
use crate::scripting::ScriptError;
use crate::storage::StorageError;

/// A per-frame operation failed for one entity. The feature that failed is
/// skipped for the rest of the session.
#[derive(Debug, Error)]
pub enum RuntimeOperationError {
    /// A script callback failed
    #[error("script on {entity} disabled: {source}")]
    Script {
        /// Entity name and UUID
        entity: String,
        /// What the script engine reported
        #[source]
        source: ScriptError,
    },

    /// A physics command targeted an entity without a usable body
    #[error("physics on {entity}: {reason}")]
    Physics {
        /// Entity name and UUID
        entity: String,
        /// What went wrong
        reason: String,
    },

    /// The physics step itself did not complete
    #[error("physics step failed: {0}")]
    PhysicsStep(#[from] TaskError),
}

/// Errors that stop a project from running
#[derive(Debug, Error)]
pub enum EngineError {
    /// The startup scene or its root entity could not be constructed
    #[error("cannot load scene {scene}: {reason}")]
    FatalLoad {
        /// Scene UUID
        scene: Uuid,
        /// What went wrong
        reason: String,
    },

    /// A required definition field is missing or malformed
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// The project could not be read from disk
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The engine configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A scene rejected an operation
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// A subsystem task failed
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Other I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for project-level operations
pub type EngineResult<T> = Result<T, EngineError>;
