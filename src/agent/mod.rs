// Agent control loop: perceive, plan, validate, execute or forward

mod planner;

pub use planner::{ActionPlanner, PlannerDecision, ScriptedPlanner};

use crate::action::{validate, ActionError, Validated};
use crate::antenna::ListeningAntenna;
use crate::broker::EventSender;
use crate::config::AgentConfig;
use crate::event::{kinds, Event};
use crate::registry::EntityRegistry;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};


/// What an agent is and how it decides
#[derive(Clone)]
pub struct AgentSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub interesting_event_types: Vec<String>,
    pub planner: Arc<dyn ActionPlanner>,
}

impl AgentSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        planner: Arc<dyn ActionPlanner>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            interesting_event_types: Vec::new(),
            planner,
        }
    }

    pub fn with_interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interesting_event_types
            .extend(interests.into_iter().map(Into::into));
        self
    }
}

/// Where a control loop currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Idle,
    Perceiving,
    Deciding,
    Executing,
    Asleep,
}

/// Result of one iteration
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// Executed by this agent and broadcast
    Executed { event: Event },
    /// Sent to the entity that must execute it
    Forwarded { event: Event },
    /// The planner had nothing to do
    Skipped,
    /// The agent is asleep; nothing was planned
    Slept,
    /// The planner finished; the agent fell asleep
    Finished,
    /// Recovered failure, recorded in the agent's own log
    Failed(ActionError),
}

/// One agent's think-and-act task
pub struct ControlLoop {
    agent_id: String,
    antenna: Arc<ListeningAntenna>,
    registry: Arc<EntityRegistry>,
    sender: EventSender,
    planner: Arc<dyn ActionPlanner>,
    phase_tx: watch::Sender<LoopPhase>,
    asleep_interval: Duration,
}

impl ControlLoop {
    pub fn new(
        antenna: Arc<ListeningAntenna>,
        registry: Arc<EntityRegistry>,
        sender: EventSender,
        planner: Arc<dyn ActionPlanner>,
        config: &AgentConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(LoopPhase::Idle);
        Self {
            agent_id: antenna.agent_id().to_string(),
            antenna,
            registry,
            sender,
            planner,
            phase_tx,
            asleep_interval: config.asleep_interval(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Observe phase changes
    pub fn phase(&self) -> watch::Receiver<LoopPhase> {
        self.phase_tx.subscribe()
    }

    fn set_phase(&self, phase: LoopPhase) {
        self.phase_tx.send_replace(phase);
    }

    /// Run ticks until `stop` turns true or its sender is dropped.
    /// Errors never end the loop.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        info!(agent_id = %self.agent_id, "Control loop started");

        while !*stop.borrow() {
            let mut tick_stop = stop.clone();
            let outcome = tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                outcome = self.tick(&mut tick_stop) => outcome,
            };
            debug!(agent_id = %self.agent_id, outcome = ?outcome, "Tick finished");
        }

        self.set_phase(LoopPhase::Idle);
        info!(agent_id = %self.agent_id, "Control loop stopped");
    }

    /// One iteration. Asleep agents wait out the configured interval
    /// (cut short by `stop`) instead of planning.
    pub async fn tick(&self, stop: &mut watch::Receiver<bool>) -> TickOutcome {
        let is_asleep = match self.registry.lookup(&self.agent_id) {
            Ok(agent) => agent.is_asleep(),
            Err(e) => return self.fail(ActionError::Perception(e.to_string())),
        };

        if is_asleep {
            self.set_phase(LoopPhase::Asleep);
            tokio::select! {
                _ = tokio::time::sleep(self.asleep_interval) => {}
                _ = stop.changed() => {}
            }
            return TickOutcome::Slept;
        }

        self.set_phase(LoopPhase::Perceiving);
        let state = match self.antenna.get_world_state().await {
            Ok(state) => state,
            Err(e) => return self.fail(ActionError::Perception(e.to_string())),
        };

        self.set_phase(LoopPhase::Deciding);
        let decision = match self.planner.plan_next_action(&state).await {
            Ok(decision) => decision,
            Err(e) => return self.fail(ActionError::Planner(format!("{:#}", e))),
        };

        let proposal = match decision {
            PlannerDecision::Act(proposal) => proposal,
            PlannerDecision::Skip => {
                self.set_phase(LoopPhase::Idle);
                return TickOutcome::Skipped;
            }
            PlannerDecision::Finish => return self.fall_asleep(),
        };

        self.set_phase(LoopPhase::Executing);
        let outcome = match validate(&self.agent_id, &proposal, &state.available_schemas, &state) {
            Ok(validated) => self.execute(validated),
            Err(e) => Err(e),
        };
        self.set_phase(LoopPhase::Idle);

        outcome.unwrap_or_else(|e| self.fail(e))
    }

    fn execute(&self, validated: Validated) -> Result<TickOutcome, ActionError> {
        let Validated { is_local, event } = validated;

        if is_local {
            if EntityRegistry::is_structural(event.event_type()) {
                self.registry
                    .apply(&event)
                    .map_err(|e| ActionError::from_registry(event.event_type(), e))?;
            }
            self.sender.send(&event);
            self.antenna.record(event.clone());

            info!(
                agent_id = %self.agent_id,
                event_type = %event.event_type(),
                event_id = %event.event_id(),
                "Executed action"
            );
            return Ok(TickOutcome::Executed { event });
        }

        let report = self.sender.send(&event);
        if report.target_delivered == Some(false) {
            return Err(ActionError::DeliveryFailure {
                event_type: event.event_type().to_string(),
                target_id: event.target_id().unwrap_or_default().to_string(),
            });
        }
        self.antenna.record(event.clone());

        info!(
            agent_id = %self.agent_id,
            event_type = %event.event_type(),
            target_id = event.target_id().unwrap_or_default(),
            "Forwarded action"
        );
        Ok(TickOutcome::Forwarded { event })
    }

    fn fall_asleep(&self) -> TickOutcome {
        let event = Event::new(kinds::AGENT_FALLS_ASLEEP, self.agent_id.as_str())
            .with_summary(format!("{} falls asleep", self.agent_id));

        if let Err(e) = self.registry.apply(&event) {
            return self.fail(ActionError::from_registry(event.event_type(), e));
        }
        self.sender.send(&event);
        self.antenna.record(event);
        self.set_phase(LoopPhase::Asleep);

        info!(agent_id = %self.agent_id, "Planner finished, agent falls asleep");
        TickOutcome::Finished
    }

    /// Log the failure and keep it as an observation for the next plan
    fn fail(&self, error: ActionError) -> TickOutcome {
        warn!(
            agent_id = %self.agent_id,
            kind = error.kind(),
            error = %error,
            "Action failed"
        );

        let mut observation = Event::new(kinds::AGENT_ACTION_FAILED, self.agent_id.as_str())
            .with_target(self.agent_id.as_str())
            .with_summary(error.to_string())
            .with_field("kind", error.kind())
            .with_field("reason", error.to_string());
        if let Some(event_type) = error.event_type() {
            observation = observation.with_field("failed_event_type", json!(event_type));
        }
        self.antenna.record(observation);
        self.set_phase(LoopPhase::Idle);

        TickOutcome::Failed(error)
    }
}
