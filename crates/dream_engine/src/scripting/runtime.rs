//! Script runtimes: one script instance per entity

use std::sync::Arc;

use super::{lock, ScriptCallback, ScriptContext, ScriptError, ScriptInstanceId, SharedScriptEngine};
use crate::assets::discrete::{discrete_asset_runtime, DiscreteAssetRuntime, DiscreteRuntime};
use crate::assets::{ConstructionError, LoadContext};
use crate::definition::AssetDefinition;
use crate::foundation::math::Transform;
use crate::foundation::uuid::Uuid;

/// A script instance bound to its entity
pub struct ScriptRuntime {
    base: DiscreteAssetRuntime,
    source: String,
    engine: Option<SharedScriptEngine>,
    instance: Option<ScriptInstanceId>,
    initialised: bool,
}

discrete_asset_runtime!(ScriptRuntime);

impl ScriptRuntime {
    /// Entity the script runs for
    pub const fn entity_uuid(&self) -> &Uuid {
        self.base.entity_uuid()
    }

    /// Script source as read from disk
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `on_init` has run
    pub const fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Run one callback. `on_init` is recorded as done even when it fails.
    pub fn call(&mut self, callback: ScriptCallback<'_>, ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
        let (Some(engine), Some(instance)) = (&self.engine, self.instance) else {
            return Ok(());
        };
        if matches!(callback, ScriptCallback::Init) {
            self.initialised = true;
        }
        lock(engine).call(instance, callback, ctx)
    }

    /// Destroy the script instance. Safe to call more than once.
    pub fn release(&mut self) {
        if let (Some(engine), Some(instance)) = (&self.engine, self.instance.take()) {
            lock(engine).destroy_instance(instance);
        }
    }
}

impl DiscreteRuntime for ScriptRuntime {
    fn construct(definition: Arc<AssetDefinition>, entity: Uuid) -> Self {
        Self {
            base: DiscreteAssetRuntime::new(definition, entity),
            source: String::new(),
            engine: None,
            instance: None,
            initialised: false,
        }
    }

    fn base_mut(&mut self) -> &mut DiscreteAssetRuntime {
        &mut self.base
    }

    fn load(&mut self, ctx: &LoadContext<'_>, _world: &Transform) -> Result<(), ConstructionError> {
        let definition = Arc::clone(self.base.definition());
        let path = self.base.asset_file_path(ctx.directory);
        self.source = std::fs::read_to_string(&path).map_err(|e| ConstructionError::io(&path, e))?;

        let instance = lock(ctx.scripts)
            .create_instance(&definition.name(), &self.source, self.base.entity_uuid())
            .map_err(|e| ConstructionError::Decode {
                path,
                reason: e.to_string(),
            })?;
        self.engine = Some(Arc::clone(ctx.scripts));
        self.instance = Some(instance);
        Ok(())
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        self.release();
    }
}
