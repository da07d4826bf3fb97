use crate::action::ProposedAction;
use crate::antenna::WorldState;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// What the planner wants the agent to do next
#[derive(Clone, Debug, PartialEq)]
pub enum PlannerDecision {
    /// Propose an action for validation
    Act(ProposedAction),
    /// Nothing worth doing this tick
    Skip,
    /// The agent is done and falls asleep
    Finish,
}

/// Decides the next action from a WorldState.
///
/// The kernel treats the planner as a black box: it may call a language
/// model, follow a script or pick at random. Errors are reported back as
/// failed ticks and never stop the control loop.
///
/// # Example
/// ```no_run
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use colony::action::ProposedAction;
/// use colony::agent::{ActionPlanner, PlannerDecision};
/// use colony::antenna::WorldState;
///
/// struct AlwaysAsk;
///
/// #[async_trait]
/// impl ActionPlanner for AlwaysAsk {
///     async fn plan_next_action(&self, _state: &WorldState) -> Result<PlannerDecision> {
///         Ok(PlannerDecision::Act(ProposedAction::new(
///             "agent_gets_nearby_entities_event",
///         )))
///     }
/// }
/// ```
#[async_trait]
pub trait ActionPlanner: Send + Sync {
    async fn plan_next_action(&self, state: &WorldState) -> Result<PlannerDecision>;
}

/// Replays a fixed list of decisions, in order
pub struct ScriptedPlanner {
    queue: Mutex<VecDeque<PlannerDecision>>,
    when_exhausted: PlannerDecision,
}

impl ScriptedPlanner {
    /// Skips once the script runs out
    pub fn new<I>(decisions: I) -> Self
    where
        I: IntoIterator<Item = PlannerDecision>,
    {
        Self {
            queue: Mutex::new(decisions.into_iter().collect()),
            when_exhausted: PlannerDecision::Skip,
        }
    }

    /// One `Act` per proposal
    pub fn from_actions<I>(actions: I) -> Self
    where
        I: IntoIterator<Item = ProposedAction>,
    {
        Self::new(actions.into_iter().map(PlannerDecision::Act))
    }

    /// Falls asleep once the script runs out
    pub fn finish_when_exhausted(mut self) -> Self {
        self.when_exhausted = PlannerDecision::Finish;
        self
    }

    /// Decisions not yet handed out
    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionPlanner for ScriptedPlanner {
    async fn plan_next_action(&self, _state: &WorldState) -> Result<PlannerDecision> {
        let next = self.queue.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.when_exhausted.clone()))
    }
}
