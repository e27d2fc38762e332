//! Entity events
//!
//! Events carry key-value arguments so senders and receivers never depend
//! on argument order. Each entity owns an [`EventQueue`]; the scene drains
//! it once per frame after scripts have run, hands the events to the
//! entity's script and then clears it.

use std::collections::HashMap;

use crate::foundation::math::Vec3;
use crate::foundation::uuid::Uuid;

/// Event type identification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Two physics bodies touched
    Collision,
    /// The entity gained input focus
    FocusGained,
    /// The entity lost input focus
    FocusLost,
    /// Application defined event, identified by name
    Custom(String),
}

/// Variant for type-safe event arguments
#[derive(Debug, Clone, PartialEq)]
pub enum EventArg {
    /// Another entity or asset
    Uuid(Uuid),
    /// Free text
    Text(String),
    /// Any number
    Number(f64),
    /// A point or direction
    Vector(Vec3),
    /// A flag
    Flag(bool),
}

/// Argument keys used by engine generated events
pub mod args {
    /// Entity on the other side of a collision
    pub const OTHER: &str = "other";
    /// World space contact point
    pub const POINT: &str = "point";
    /// Contact normal pointing away from the other body
    pub const NORMAL: &str = "normal";
}

/// Event with type, sender and key-value arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Type of event
    pub event_type: EventType,
    /// Entity that sent the event, if any
    pub sender: Option<Uuid>,
    /// Scene time when the event was created (seconds)
    pub timestamp: f64,
    args: HashMap<String, EventArg>,
}

impl Event {
    /// Create a new event with the given type and timestamp
    pub fn new(event_type: EventType, timestamp: f64) -> Self {
        Self {
            event_type,
            sender: None,
            timestamp,
            args: HashMap::new(),
        }
    }

    /// Application event by name
    pub fn custom(name: impl Into<String>, timestamp: f64) -> Self {
        Self::new(EventType::Custom(name.into()), timestamp)
    }

    /// Collision with `other` at a contact point
    pub fn collision(other: &Uuid, point: Vec3, normal: Vec3, timestamp: f64) -> Self {
        Self::new(EventType::Collision, timestamp)
            .with_arg(args::OTHER, EventArg::Uuid(other.clone()))
            .with_arg(args::POINT, EventArg::Vector(point))
            .with_arg(args::NORMAL, EventArg::Vector(normal))
    }

    /// Set the sender (builder pattern)
    pub fn from_sender(mut self, sender: &Uuid) -> Self {
        self.sender = Some(sender.clone());
        self
    }

    /// Add an argument to the event (builder pattern)
    pub fn with_arg(mut self, key: impl Into<String>, value: EventArg) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Get an argument by key
    pub fn get_arg(&self, key: &str) -> Option<&EventArg> {
        self.args.get(key)
    }

    /// Get a UUID argument if present
    pub fn get_uuid(&self, key: &str) -> Option<&Uuid> {
        if let Some(EventArg::Uuid(uuid)) = self.get_arg(key) {
            Some(uuid)
        } else {
            None
        }
    }

    /// Get a number argument if present
    pub fn get_number(&self, key: &str) -> Option<f64> {
        if let Some(EventArg::Number(n)) = self.get_arg(key) {
            Some(*n)
        } else {
            None
        }
    }

    /// Get a text argument if present
    pub fn get_text(&self, key: &str) -> Option<&str> {
        if let Some(EventArg::Text(text)) = self.get_arg(key) {
            Some(text)
        } else {
            None
        }
    }

    /// Get a vector argument if present
    pub fn get_vector(&self, key: &str) -> Option<Vec3> {
        if let Some(EventArg::Vector(v)) = self.get_arg(key) {
            Some(*v)
        } else {
            None
        }
    }

    /// Whether this is a named application event
    pub fn is_custom(&self, name: &str) -> bool {
        matches!(&self.event_type, EventType::Custom(n) if n == name)
    }
}

/// Pending events of one entity, in arrival order
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    events: Vec<Event>,
}

impl EventQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the next event pass
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Pending events
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take every pending event, leaving the queue empty
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Drop every pending event
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_event_args() {
        let event = Event::collision(&Uuid::new("rock"), Vec3::new(1.0, 2.0, 3.0), Vec3::y(), 0.5);
        assert_eq!(event.event_type, EventType::Collision);
        assert_eq!(event.get_uuid(args::OTHER), Some(&Uuid::new("rock")));
        assert_eq!(event.get_vector(args::POINT), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert!(event.get_number(args::POINT).is_none());
    }

    #[test]
    fn test_custom_event() {
        let event = Event::custom("door_open", 1.0)
            .from_sender(&Uuid::new("switch"))
            .with_arg("speed", EventArg::Number(2.0))
            .with_arg("label", EventArg::Text("north".to_string()));
        assert!(event.is_custom("door_open"));
        assert!(!event.is_custom("door_close"));
        assert_eq!(event.sender, Some(Uuid::new("switch")));
        assert_eq!(event.get_number("speed"), Some(2.0));
        assert_eq!(event.get_text("label"), Some("north"));
    }

    #[test]
    fn test_queue_drain_preserves_order() {
        let mut queue = EventQueue::new();
        queue.push(Event::custom("a", 0.0));
        queue.push(Event::custom("b", 0.0));
        let drained = queue.drain();
        assert!(queue.is_empty());
        assert!(drained[0].is_custom("a"));
        assert!(drained[1].is_custom("b"));
    }
}
