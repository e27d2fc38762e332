//! Discrete runtimes: owned by exactly one entity

use std::path::PathBuf;
use std::sync::Arc;

use super::{AssetRuntime, ConstructionError, LoadContext, RuntimeState};
use crate::definition::AssetDefinition;
use crate::foundation::math::Transform;
use crate::foundation::uuid::Uuid;
use crate::storage::ProjectDirectory;

/// State every discrete runtime carries
#[derive(Debug, Clone)]
pub struct DiscreteAssetRuntime {
    definition: Arc<AssetDefinition>,
    entity: Uuid,
    state: RuntimeState,
}

impl DiscreteAssetRuntime {
    /// Wire a runtime to its definition and owning entity
    pub fn new(definition: Arc<AssetDefinition>, entity: Uuid) -> Self {
        Self {
            definition,
            entity,
            state: RuntimeState::Constructed,
        }
    }

    /// Definition this runtime was built from
    pub const fn definition(&self) -> &Arc<AssetDefinition> {
        &self.definition
    }

    /// Entity that owns this runtime
    pub const fn entity_uuid(&self) -> &Uuid {
        &self.entity
    }

    /// Lifecycle state
    pub const fn state(&self) -> RuntimeState {
        self.state
    }

    /// Record a lifecycle transition
    pub fn set_state(&mut self, state: RuntimeState) {
        self.state = state;
    }

    /// File holding this asset's data in its definition's format
    pub fn asset_file_path(&self, directory: &ProjectDirectory) -> PathBuf {
        directory.asset_absolute_path(&self.definition, &self.definition.format())
    }

    /// Directory holding this asset's files
    pub fn asset_directory_path(&self, directory: &ProjectDirectory) -> PathBuf {
        directory.asset_directory_path(&self.definition)
    }
}

/// A runtime owned by one entity and loaded with it
pub trait DiscreteRuntime: AssetRuntime + Sized {
    /// First phase. Never touches files or native handles.
    fn construct(definition: Arc<AssetDefinition>, entity: Uuid) -> Self;

    /// Shared state
    fn base_mut(&mut self) -> &mut DiscreteAssetRuntime;

    /// Second phase. `world` is the owning entity's world transform.
    fn load(&mut self, ctx: &LoadContext<'_>, world: &Transform) -> Result<(), ConstructionError>;
}

/// Construct and load a discrete runtime, recording the outcome in its state
pub fn load_discrete<T: DiscreteRuntime>(
    definition: Arc<AssetDefinition>,
    entity: &Uuid,
    ctx: &LoadContext<'_>,
    world: &Transform,
) -> Result<T, ConstructionError> {
    let mut runtime = T::construct(definition, entity.clone());
    match runtime.load(ctx, world) {
        Ok(()) => {
            runtime.base_mut().set_state(RuntimeState::Loaded);
            Ok(runtime)
        }
        Err(e) => {
            runtime.base_mut().set_state(RuntimeState::Error);
            Err(e)
        }
    }
}

/// Implements [`AssetRuntime`] for a type with a `base: DiscreteAssetRuntime` field
macro_rules! discrete_asset_runtime {
    ($ty:ty) => {
        impl $crate::assets::AssetRuntime for $ty {
            fn definition(&self) -> &::std::sync::Arc<$crate::definition::AssetDefinition> {
                self.base.definition()
            }

            fn state(&self) -> $crate::assets::RuntimeState {
                self.base.state()
            }
        }
    };
}

pub(crate) use discrete_asset_runtime;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::AssetType;

    #[test]
    fn test_paths_follow_project_layout() {
        let definition = Arc::new(AssetDefinition::new(AssetType::Script, Uuid::new("abc"), "Mover"));
        let base = DiscreteAssetRuntime::new(definition, Uuid::new("entity"));
        let directory = ProjectDirectory::new("/projects/demo");

        let folder = base.asset_directory_path(&directory);
        assert!(folder.ends_with("abc"));
        assert_eq!(base.asset_file_path(&directory).parent(), Some(folder.as_path()));
        assert_eq!(base.state(), RuntimeState::Constructed);
    }
}
