use super::Event;
use std::fmt;
use uuid::Uuid;

/// Validation errors for Event envelopes
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingEventType,
    MissingSender,
    EmptyTarget,
    InvalidEventType(String),
    PayloadNotObject,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingEventType => write!(f, "event_type is required"),
            ValidationError::MissingSender => write!(f, "sender_id is required"),
            ValidationError::EmptyTarget => write!(f, "target_id must not be empty when present"),
            ValidationError::InvalidEventType(t) => {
                write!(
                    f,
                    "invalid event_type '{}': must be lowercase letters, digits and underscores",
                    t
                )
            }
            ValidationError::PayloadNotObject => write!(f, "payload must be a JSON object"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates and prepares an Event received from the wire.
///
/// Validation rules:
/// - Required fields: event_type, sender_id
/// - event_type format: lowercase letters, digits, underscores (e.g., "agent_moves")
/// - target_id: absent or non-empty
/// - Payload: must be a JSON object
/// - EventId: auto-generated UUIDv7 if empty
///
/// Unknown event types are accepted; only the envelope is checked here.
pub fn validate_and_prepare(event: &mut Event) -> Result<(), ValidationError> {
    if event.event_type.is_empty() {
        return Err(ValidationError::MissingEventType);
    }
    if event.sender_id.is_empty() {
        return Err(ValidationError::MissingSender);
    }
    if matches!(event.target_id.as_deref(), Some("")) {
        return Err(ValidationError::EmptyTarget);
    }

    if !is_valid_event_type(&event.event_type) {
        return Err(ValidationError::InvalidEventType(event.event_type.clone()));
    }

    if !event.payload.is_object() {
        return Err(ValidationError::PayloadNotObject);
    }

    if event.event_id.is_empty() {
        event.event_id = Uuid::now_v7().to_string();
    }

    Ok(())
}

/// Validates event_type format.
///
/// Valid event types:
/// - Lowercase letters (a-z)
/// - Numbers (0-9)
/// - Underscores as separators
/// - No leading/trailing underscores
fn is_valid_event_type(event_type: &str) -> bool {
    if event_type.is_empty() {
        return false;
    }

    if event_type.starts_with('_') || event_type.ends_with('_') {
        return false;
    }

    event_type
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn test_valid_event_types() {
        assert!(is_valid_event_type("agent_speaks_into_microphone"));
        assert!(is_valid_event_type("entity_moves_to_location_event"));
        assert!(is_valid_event_type("ping"));
        assert!(is_valid_event_type("v2_update"));
    }

    #[test]
    fn test_invalid_event_types() {
        assert!(!is_valid_event_type(""));
        assert!(!is_valid_event_type("_agent"));
        assert!(!is_valid_event_type("agent_"));
        assert!(!is_valid_event_type("AgentSpeaks"));
        assert!(!is_valid_event_type("agent-speaks"));
        assert!(!is_valid_event_type("agent.speaks"));
        assert!(!is_valid_event_type("agent speaks"));
    }
}
