// Structured notifications for indexers and explorers. Never read back by the module.

use serde::{Deserialize, Serialize};

pub const EVENT_TYPE_LIVENESS: &str = "liveness";
pub const EVENT_TYPE_SLASH: &str = "slash";

pub const ATTRIBUTE_KEY_ADDRESS: &str = "address";
pub const ATTRIBUTE_KEY_HEIGHT: &str = "height";
pub const ATTRIBUTE_KEY_POWER: &str = "power";
pub const ATTRIBUTE_KEY_REASON: &str = "reason";
pub const ATTRIBUTE_KEY_JAILED: &str = "jailed";
pub const ATTRIBUTE_KEY_MISSED_BLOCKS: &str = "missed_blocks";
pub const ATTRIBUTE_KEY_BURNED_COINS: &str = "burned_coins";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

/// Event with ordered attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: Vec<Attribute>,
}

impl Event {
    pub fn new(kind: &str) -> Self {
        Event {
            kind: kind.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.push(Attribute {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// First value recorded under `key`.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// Append-only event destination.
pub trait EventSink {
    fn emit(&mut self, event: Event);
}

/// Collects the events emitted while processing a block.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    events: Vec<Event>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_of_type<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Hand the collected events over, leaving the manager empty.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

impl EventSink for EventManager {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}
