//! Native script engine
//!
//! Behaviours are Rust types registered by name. A script asset's source
//! names the behaviour to instantiate on its first non-blank line.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use super::{InputState, ScriptCallback, ScriptContext, ScriptEngine, ScriptError, ScriptInstanceId};
use crate::events::Event;
use crate::foundation::uuid::Uuid;

/// Result of a behaviour callback; the message ends up in the error log
pub type BehaviourResult = Result<(), String>;

/// Per-entity script logic
pub trait ScriptBehaviour: Send {
    /// Called once before the first update
    fn on_init(&mut self, _ctx: &mut ScriptContext<'_>) -> BehaviourResult {
        Ok(())
    }

    /// Called every frame
    fn on_update(&mut self, _ctx: &mut ScriptContext<'_>) -> BehaviourResult {
        Ok(())
    }

    /// Called when the entity has input focus
    fn on_input(&mut self, _input: &InputState, _ctx: &mut ScriptContext<'_>) -> BehaviourResult {
        Ok(())
    }

    /// Called once per pending event
    fn on_event(&mut self, _event: &Event, _ctx: &mut ScriptContext<'_>) -> BehaviourResult {
        Ok(())
    }

    /// Called when the entity is removed
    fn on_destroy(&mut self, _ctx: &mut ScriptContext<'_>) -> BehaviourResult {
        Ok(())
    }
}

type BehaviourFactory = Box<dyn Fn() -> Box<dyn ScriptBehaviour> + Send>;

struct Instance {
    script: String,
    behaviour: Box<dyn ScriptBehaviour>,
}

/// [`ScriptEngine`] over registered Rust behaviours
#[derive(Default)]
pub struct NativeScriptEngine {
    factories: HashMap<String, BehaviourFactory>,
    instances: HashMap<u32, Instance>,
    next_id: u32,
}

impl NativeScriptEngine {
    /// Engine with no behaviours
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a behaviour under a name
    pub fn register<F, B>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> B + Send + 'static,
        B: ScriptBehaviour + 'static,
    {
        self.factories
            .insert(name.to_string(), Box::new(move || -> Box<dyn ScriptBehaviour> { Box::new(factory()) }));
    }

    /// Register a behaviour, builder style
    pub fn with<F, B>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> B + Send + 'static,
        B: ScriptBehaviour + 'static,
    {
        self.register(name, factory);
        self
    }

    /// Whether a behaviour name is registered
    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

/// Behaviour name named by a script source
pub fn behaviour_name(source: &str) -> Option<&str> {
    source.lines().map(str::trim).find(|line| !line.is_empty())
}

impl ScriptEngine for NativeScriptEngine {
    fn create_instance(&mut self, script: &str, source: &str, entity: &Uuid) -> Result<ScriptInstanceId, ScriptError> {
        let name = behaviour_name(source).ok_or_else(|| ScriptError::Compile {
            script: script.to_string(),
            reason: "source is empty".to_string(),
        })?;
        let factory = self.factories.get(name).ok_or_else(|| ScriptError::Compile {
            script: script.to_string(),
            reason: format!("no behaviour registered as '{name}'"),
        })?;

        self.next_id += 1;
        let id = self.next_id;
        self.instances.insert(
            id,
            Instance {
                script: script.to_string(),
                behaviour: factory(),
            },
        );
        log::debug!("Created '{name}' instance {id} for entity {entity}");
        Ok(ScriptInstanceId(id))
    }

    fn destroy_instance(&mut self, id: ScriptInstanceId) {
        self.instances.remove(&id.0);
    }

    fn call(&mut self, id: ScriptInstanceId, callback: ScriptCallback<'_>, ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError> {
        let instance = self
            .instances
            .get_mut(&id.0)
            .ok_or(ScriptError::UnknownInstance(id))?;
        let behaviour = &mut instance.behaviour;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match callback {
            ScriptCallback::Init => behaviour.on_init(ctx),
            ScriptCallback::Update => behaviour.on_update(ctx),
            ScriptCallback::Input(input) => behaviour.on_input(input, ctx),
            ScriptCallback::Event(event) => behaviour.on_event(event, ctx),
            ScriptCallback::Destroy => behaviour.on_destroy(ctx),
        }));

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(ScriptError::Runtime {
                script: instance.script.clone(),
                callback: callback.name(),
                reason,
            }),
            Err(_) => Err(ScriptError::Panicked {
                script: instance.script.clone(),
                callback: callback.name(),
            }),
        }
    }

    fn instance_count(&self) -> usize {
        self.instances.len()
    }
}
