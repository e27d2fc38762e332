//! Scripting module
//!
//! Scripts reach the engine only through [`ScriptContext`]: they may read
//! and write their own entity's transform and queue [`ScriptCommand`]s,
//! which the scene applies after the script pass. A failing script flags
//! its entity and is not called again; the rest of the scene keeps running.

pub mod input;
pub mod native;
pub mod runtime;

pub use input::InputState;
pub use native::{NativeScriptEngine, ScriptBehaviour};
pub use runtime::ScriptRuntime;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::events::Event;
use crate::foundation::math::{Transform, Vec3};
use crate::foundation::uuid::Uuid;

/// One script instance inside a [`ScriptEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptInstanceId(pub u32);

/// Failure inside the scripting collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// Source could not be turned into an instance
    #[error("script '{script}' failed to compile: {reason}")]
    Compile {
        /// Script label
        script: String,
        /// Compiler message
        reason: String,
    },

    /// A callback reported an error
    #[error("script '{script}' failed in {callback}: {reason}")]
    Runtime {
        /// Script label
        script: String,
        /// Callback being run
        callback: &'static str,
        /// Error message
        reason: String,
    },

    /// A callback panicked
    #[error("script '{script}' panicked in {callback}")]
    Panicked {
        /// Script label
        script: String,
        /// Callback being run
        callback: &'static str,
    },

    /// The instance does not exist
    #[error("unknown script instance {0:?}")]
    UnknownInstance(ScriptInstanceId),
}

/// Lifecycle entry point being invoked
#[derive(Debug, Clone, Copy)]
pub enum ScriptCallback<'a> {
    /// Once, before the first update
    Init,
    /// Every frame while the scene is active
    Update,
    /// When the entity has input focus
    Input(&'a InputState),
    /// Once per pending event
    Event(&'a Event),
    /// When the entity is removed
    Destroy,
}

impl ScriptCallback<'_> {
    /// Callback name used in logs and errors
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init => "on_init",
            Self::Update => "on_update",
            Self::Input(_) => "on_input",
            Self::Event(_) => "on_event",
            Self::Destroy => "on_destroy",
        }
    }
}

/// Deferred request from a script, applied by the scene after the script pass
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    /// Queue an event on another entity
    SendEvent {
        /// Receiving entity
        target: Uuid,
        /// Event to deliver
        event: Event,
    },
    /// Impulse on the calling entity's body
    ApplyCentralImpulse(Vec3),
    /// Force on the calling entity's body
    ApplyCentralForce(Vec3),
    /// Linear velocity of the calling entity's body
    SetLinearVelocity(Vec3),
    /// Angular velocity of the calling entity's body
    SetAngularVelocity(Vec3),
    /// Flag an entity and its descendants for deletion
    RemoveEntity(Uuid),
    /// End the scene
    StopScene,
}

/// Host API handed to a script callback
pub struct ScriptContext<'a> {
    entity: &'a Uuid,
    entity_name: &'a str,
    /// Local transform of the calling entity
    pub transform: &'a mut Transform,
    delta: f32,
    scene_time: f64,
    commands: &'a mut Vec<ScriptCommand>,
}

impl<'a> ScriptContext<'a> {
    /// Context for one callback
    pub fn new(
        entity: &'a Uuid,
        entity_name: &'a str,
        transform: &'a mut Transform,
        delta: f32,
        scene_time: f64,
        commands: &'a mut Vec<ScriptCommand>,
    ) -> Self {
        Self {
            entity,
            entity_name,
            transform,
            delta,
            scene_time,
            commands,
        }
    }

    /// Calling entity
    pub const fn entity(&self) -> &Uuid {
        self.entity
    }

    /// Calling entity's name
    pub const fn entity_name(&self) -> &str {
        self.entity_name
    }

    /// Seconds since the previous frame
    pub const fn delta(&self) -> f32 {
        self.delta
    }

    /// Seconds since the scene became active
    pub const fn scene_time(&self) -> f64 {
        self.scene_time
    }

    /// Queue an event on another entity
    pub fn send_event(&mut self, target: &Uuid, event: Event) {
        let event = event.from_sender(self.entity);
        self.commands.push(ScriptCommand::SendEvent {
            target: target.clone(),
            event,
        });
    }

    /// Impulse through the centre of mass
    pub fn apply_central_impulse(&mut self, impulse: Vec3) {
        self.commands.push(ScriptCommand::ApplyCentralImpulse(impulse));
    }

    /// Force through the centre of mass
    pub fn apply_central_force(&mut self, force: Vec3) {
        self.commands.push(ScriptCommand::ApplyCentralForce(force));
    }

    /// Set linear velocity
    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.commands.push(ScriptCommand::SetLinearVelocity(velocity));
    }

    /// Set angular velocity
    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.commands.push(ScriptCommand::SetAngularVelocity(velocity));
    }

    /// Remove an entity and its descendants at the end of the frame
    pub fn remove_entity(&mut self, target: &Uuid) {
        self.commands.push(ScriptCommand::RemoveEntity(target.clone()));
    }

    /// Remove the calling entity at the end of the frame
    pub fn remove_self(&mut self) {
        self.commands.push(ScriptCommand::RemoveEntity(self.entity.clone()));
    }

    /// End the scene after this frame
    pub fn stop_scene(&mut self) {
        self.commands.push(ScriptCommand::StopScene);
    }
}

/// Scripting collaborator
pub trait ScriptEngine: Send {
    /// Create an instance of `source` for an entity
    fn create_instance(&mut self, script: &str, source: &str, entity: &Uuid) -> Result<ScriptInstanceId, ScriptError>;
    /// Destroy an instance; unknown ids are ignored
    fn destroy_instance(&mut self, id: ScriptInstanceId);
    /// Run one callback
    fn call(&mut self, id: ScriptInstanceId, callback: ScriptCallback<'_>, ctx: &mut ScriptContext<'_>) -> Result<(), ScriptError>;
    /// Live instances
    fn instance_count(&self) -> usize;
}

/// Script engine shared by every script runtime of a project
pub type SharedScriptEngine = Arc<Mutex<Box<dyn ScriptEngine>>>;

/// Wrap an engine for sharing
pub fn shared(engine: impl ScriptEngine + 'static) -> SharedScriptEngine {
    Arc::new(Mutex::new(Box::new(engine)))
}

/// Lock a shared engine, recovering from a panicked holder
pub fn lock(engine: &SharedScriptEngine) -> MutexGuard<'_, Box<dyn ScriptEngine>> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}
