//! End-to-end scenarios over a real project directory and headless
//! collaborators

mod fixture;
mod frame;
mod lifecycle;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::events::Event;
use crate::scripting::native::BehaviourResult;
use crate::scripting::{ScriptBehaviour, ScriptContext};

/// Counts its callbacks
#[derive(Default)]
struct Counter {
    updates: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
}

impl ScriptBehaviour for Counter {
    fn on_update(&mut self, _ctx: &mut ScriptContext<'_>) -> BehaviourResult {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_destroy(&mut self, _ctx: &mut ScriptContext<'_>) -> BehaviourResult {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every update
struct Faulty;

impl ScriptBehaviour for Faulty {
    fn on_update(&mut self, _ctx: &mut ScriptContext<'_>) -> BehaviourResult {
        Err("attempt to index a nil value".to_string())
    }
}

/// Moves its entity one unit along +X per update
struct Mover;

impl ScriptBehaviour for Mover {
    fn on_update(&mut self, ctx: &mut ScriptContext<'_>) -> BehaviourResult {
        ctx.transform.position.x += 1.0;
        Ok(())
    }
}

/// Keeps every event it receives
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl ScriptBehaviour for Recorder {
    fn on_event(&mut self, event: &Event, _ctx: &mut ScriptContext<'_>) -> BehaviourResult {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
