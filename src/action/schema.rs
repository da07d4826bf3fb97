use crate::antenna::WorldState;
use crate::registry::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who carries out an action once it has been validated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Executor {
    /// The proposing agent executes it and broadcasts the result
    Sender,
    /// Forwarded to the world, which answers with a reply event
    World,
    /// Forwarded to the entity named in the proposal's target_id
    Target,
}

/// Explicit validation predicate attached to a schema.
///
/// Evaluated against the proposing agent's WorldState, never against the
/// registry directly: an agent can only be refused for what it could know.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Precondition {
    None,
    /// Sender must currently hold this object
    HoldsObject { object_id: String },
    /// Sender must hold the object named in payload[field]
    HoldsPayloadObject { field: String },
    /// The object named in payload[field] must be nearby and unheld
    PayloadObjectUnheldNearby { field: String },
    /// The proposal's target_id must be a nearby entity
    TargetNearby,
    /// The proposal's target_id must be a nearby agent
    TargetIsNearbyAgent,
    /// payload[field] must name a known location
    PayloadLocationKnown { field: String },
    /// payload[field] must be a non-empty string
    PayloadFieldPresent { field: String },
    /// payload[field], when present, must name the proposal's target_id
    PayloadFieldIsTarget { field: String },
    All { checks: Vec<Precondition> },
}

impl Precondition {
    /// Returns the reason the precondition is unmet, if it is
    pub fn check(&self, proposal: &ProposedAction, state: &WorldState) -> Result<(), String> {
        match self {
            Precondition::None => Ok(()),
            Precondition::HoldsObject { object_id } => {
                if state.holds(object_id) {
                    Ok(())
                } else {
                    Err(format!("{} does not hold '{}'", state.agent_id, object_id))
                }
            }
            Precondition::HoldsPayloadObject { field } => {
                let object_id = required_field(proposal, field)?;
                if state.holds(object_id) {
                    Ok(())
                } else {
                    Err(format!("{} does not hold '{}'", state.agent_id, object_id))
                }
            }
            Precondition::PayloadObjectUnheldNearby { field } => {
                let object_id = required_field(proposal, field)?;
                match state.nearby(object_id) {
                    Some(entity) if !matches!(entity.kind, EntityKind::Object) => {
                        Err(format!("'{}' is not an object", object_id))
                    }
                    Some(entity) => match &entity.held_by {
                        Some(holder) => Err(format!("'{}' is held by {}", object_id, holder)),
                        None => Ok(()),
                    },
                    None => Err(format!("'{}' is not nearby", object_id)),
                }
            }
            Precondition::TargetNearby => {
                let target = required_target(proposal)?;
                if state.nearby(target).is_some() {
                    Ok(())
                } else {
                    Err(format!("'{}' is not nearby", target))
                }
            }
            Precondition::TargetIsNearbyAgent => {
                let target = required_target(proposal)?;
                match state.nearby(target) {
                    Some(entity) if entity.is_agent() => Ok(()),
                    Some(_) => Err(format!("'{}' is not an agent", target)),
                    None => Err(format!("'{}' is not nearby", target)),
                }
            }
            Precondition::PayloadLocationKnown { field } => {
                let location = required_field(proposal, field)?;
                if state.known_locations.iter().any(|l| l == location) {
                    Ok(())
                } else {
                    Err(format!("unknown location '{}'", location))
                }
            }
            Precondition::PayloadFieldPresent { field } => required_field(proposal, field).map(|_| ()),
            Precondition::PayloadFieldIsTarget { field } => {
                let target = required_target(proposal)?;
                match proposal.payload.get(field) {
                    None => Ok(()),
                    Some(value) if value.as_str() == Some(target) => Ok(()),
                    Some(value) => Err(format!(
                        "payload field '{}' is {} but the target is '{}'",
                        field, value, target
                    )),
                }
            }
            Precondition::All { checks } => checks.iter().try_for_each(|c| c.check(proposal, state)),
        }
    }
}

fn required_field<'a>(proposal: &'a ProposedAction, field: &str) -> Result<&'a str, String> {
    match proposal.payload.get(field).and_then(|v| v.as_str()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(format!("payload field '{}' is required", field)),
    }
}

fn required_target(proposal: &ProposedAction) -> Result<&str, String> {
    proposal
        .target_id
        .as_deref()
        .ok_or_else(|| "target_id is required".to_string())
}

/// A capability an entity currently exposes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionSchema {
    pub event_type: String,
    pub description: String,
    pub precondition: Precondition,
    pub executor: Executor,
}

impl ActionSchema {
    pub fn new(
        event_type: impl Into<String>,
        description: impl Into<String>,
        precondition: Precondition,
        executor: Executor,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            description: description.into(),
            precondition,
            executor,
        }
    }
}

/// A partially filled event proposed by the planner
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl ProposedAction {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}
