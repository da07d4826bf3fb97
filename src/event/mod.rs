use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub mod kinds;
mod validation;

pub use validation::{validate_and_prepare, ValidationError};

/// Event is the immutable unit of communication between entities.
///
/// The envelope is fixed; the payload is an open JSON object whose shape is
/// defined by `event_type`. Events are never mutated once built: the only
/// way to change one is to build a new one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// UUIDv7 identifier (time-ordered, globally unique)
    /// Generated on construction, or by `validate_and_prepare` for wire events
    #[serde(default)]
    event_id: String,

    /// Schema tag (e.g., "agent_gives_object_to_agent_event")
    event_type: String,

    /// Entity that emitted the event
    sender_id: String,

    /// Entity the event is addressed to (None = broadcast)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_id: Option<String>,

    /// Producer time
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,

    /// Optional human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,

    /// Event-type-specific data (opaque to the broker)
    #[serde(default = "empty_payload")]
    payload: Value,
}

fn empty_payload() -> Value {
    Value::Object(Map::new())
}

impl Event {
    /// Create a broadcast event with a fresh id and an empty payload
    pub fn new(event_type: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            event_type: event_type.into(),
            sender_id: sender_id.into(),
            target_id: None,
            created_at: Utc::now(),
            summary: None,
            payload: empty_payload(),
        }
    }

    /// Address the event to a single entity
    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Replace the whole payload (non-object values are rejected by validation)
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set a single payload field
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        if !self.payload.is_object() {
            self.payload = empty_payload();
        }
        if let Some(map) = self.payload.as_object_mut() {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Override the generated id (redelivery, replay, tests)
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// String field from the payload, if present
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    /// True when the event is addressed to `entity_id`
    pub fn is_targeted_at(&self, entity_id: &str) -> bool {
        self.target_id.as_deref() == Some(entity_id)
    }

    /// Validates the envelope and fills a missing event id.
    ///
    /// This method:
    /// - Validates required fields
    /// - Validates event_type format
    /// - Validates payload is a JSON object
    /// - Generates UUIDv7 for event_id if missing
    pub fn validate_and_prepare(&mut self) -> Result<(), ValidationError> {
        validation::validate_and_prepare(self)
    }

    /// Parse a wire frame into a validated event
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let mut event: Event = serde_json::from_str(text)?;
        event.validate_and_prepare()?;
        Ok(event)
    }
}
