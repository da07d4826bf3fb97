use crate::registry::RegistryError;
use std::fmt;

/// Recoverable failures of a single control-loop tick
#[derive(Debug, Clone, PartialEq)]
pub enum ActionError {
    /// No available schema matches the proposed event_type
    UnknownAction { event_type: String },
    /// Schema matched but its precondition is unmet
    InvalidAction { event_type: String, reason: String },
    /// The addressed entity is not connected to the broker
    DeliveryFailure { event_type: String, target_id: String },
    /// A concurrent transfer won the race for the same object
    RegistryConflict { event_type: String, reason: String },
    /// The planner failed to produce a decision
    Planner(String),
    /// The agent's own state could not be derived
    Perception(String),
}

impl ActionError {
    /// Map a registry refusal during local execution
    pub fn from_registry(event_type: &str, err: RegistryError) -> Self {
        match err {
            RegistryError::Conflict { .. } => ActionError::RegistryConflict {
                event_type: event_type.to_string(),
                reason: err.to_string(),
            },
            other => ActionError::InvalidAction {
                event_type: event_type.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Short machine-readable tag
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::UnknownAction { .. } => "unknown_action",
            ActionError::InvalidAction { .. } => "invalid_action",
            ActionError::DeliveryFailure { .. } => "delivery_failure",
            ActionError::RegistryConflict { .. } => "registry_conflict",
            ActionError::Planner(_) => "planner",
            ActionError::Perception(_) => "perception",
        }
    }

    /// Event type the failure refers to, when there is one
    pub fn event_type(&self) -> Option<&str> {
        match self {
            ActionError::UnknownAction { event_type }
            | ActionError::InvalidAction { event_type, .. }
            | ActionError::DeliveryFailure { event_type, .. }
            | ActionError::RegistryConflict { event_type, .. } => Some(event_type),
            ActionError::Planner(_) | ActionError::Perception(_) => None,
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionError::UnknownAction { event_type } => {
                write!(f, "unknown action '{}': not in the available schemas", event_type)
            }
            ActionError::InvalidAction { event_type, reason } => {
                write!(f, "invalid action '{}': {}", event_type, reason)
            }
            ActionError::DeliveryFailure {
                event_type,
                target_id,
            } => write!(f, "could not deliver '{}' to {}", event_type, target_id),
            ActionError::RegistryConflict { event_type, reason } => {
                write!(f, "'{}' lost a registry race: {}", event_type, reason)
            }
            ActionError::Planner(e) => write!(f, "planner failed: {}", e),
            ActionError::Perception(e) => write!(f, "could not read world state: {}", e),
        }
    }
}

impl std::error::Error for ActionError {}
