use super::error::ActionError;
use super::schema::{ActionSchema, Executor, ProposedAction};
use crate::antenna::WorldState;
use crate::event::Event;
use serde_json::Value;

/// Outcome of a successful validation
#[derive(Clone, Debug, PartialEq)]
pub struct Validated {
    /// True when the proposing agent is the legitimate executor
    pub is_local: bool,
    /// The event to execute locally or forward
    pub event: Event,
}

/// Decide whether `agent_id` may execute `proposal` itself or must forward it.
///
/// 1. The proposal must match an available schema by event_type.
/// 2. The schema precondition must hold against `state`.
/// 3. Sender-executed schemas are local.
/// 4. World- and target-executed schemas are forwarded, addressed to the executor.
///
/// A target-executed schema with no target has no clear executor and is
/// rejected as unknown rather than guessed.
pub fn validate(
    agent_id: &str,
    proposal: &ProposedAction,
    available_schemas: &[ActionSchema],
    state: &WorldState,
) -> Result<Validated, ActionError> {
    let schema = available_schemas
        .iter()
        .find(|s| s.event_type == proposal.event_type)
        .ok_or_else(|| ActionError::UnknownAction {
            event_type: proposal.event_type.clone(),
        })?;

    schema
        .precondition
        .check(proposal, state)
        .map_err(|reason| ActionError::InvalidAction {
            event_type: proposal.event_type.clone(),
            reason,
        })?;

    let (is_local, target_id) = match schema.executor {
        Executor::Sender => (true, proposal.target_id.clone()),
        Executor::World => (false, Some(state.world_id.clone())),
        Executor::Target => match proposal.target_id.as_deref() {
            None => {
                return Err(ActionError::UnknownAction {
                    event_type: proposal.event_type.clone(),
                })
            }
            Some(target) if target == agent_id => (true, Some(target.to_string())),
            Some(target) => (false, Some(target.to_string())),
        },
    };

    let mut event = Event::new(proposal.event_type.clone(), agent_id)
        .with_payload(Value::Object(proposal.payload.clone()));
    if let Some(target) = target_id {
        event = event.with_target(target);
    }
    if let Some(summary) = &proposal.summary {
        event = event.with_summary(summary.clone());
    }

    Ok(Validated { is_local, event })
}
