use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Agent-only attributes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Event types the agent's antenna keeps
    #[serde(default)]
    pub interesting_event_types: BTreeSet<String>,

    /// Suspends the control loop without disconnecting it
    #[serde(default)]
    pub is_asleep: bool,

    /// Ids of the objects this agent holds
    #[serde(default)]
    pub inventory: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    Agent(AgentState),
    Object,
}

/// Entity is anything that exists in the world: an agent or an object
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique, stable for the session (e.g., "maria", "microphone")
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// One of the world's locations
    pub location: String,

    /// Agent currently holding this entity (objects only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub held_by: Option<String>,

    pub kind: EntityKind,
}

impl Entity {
    pub fn agent(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            location: location.into(),
            held_by: None,
            kind: EntityKind::Agent(AgentState::default()),
        }
    }

    pub fn object(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            location: location.into(),
            held_by: None,
            kind: EntityKind::Object,
        }
    }

    pub fn with_interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let EntityKind::Agent(state) = &mut self.kind {
            state.interesting_event_types = interests.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn held_by(mut self, agent_id: impl Into<String>) -> Self {
        self.held_by = Some(agent_id.into());
        self
    }

    pub fn is_agent(&self) -> bool {
        matches!(self.kind, EntityKind::Agent(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, EntityKind::Object)
    }

    pub fn is_asleep(&self) -> bool {
        matches!(&self.kind, EntityKind::Agent(state) if state.is_asleep)
    }

    pub fn inventory(&self) -> Option<&BTreeSet<String>> {
        match &self.kind {
            EntityKind::Agent(state) => Some(&state.inventory),
            EntityKind::Object => None,
        }
    }

    pub(crate) fn agent_state_mut(&mut self) -> Option<&mut AgentState> {
        match &mut self.kind {
            EntityKind::Agent(state) => Some(state),
            EntityKind::Object => None,
        }
    }
}

/// What changed on an entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    Registered,
    Moved { from: String, to: String },
    HolderChanged { from: Option<String>, to: Option<String> },
    SleepChanged { is_asleep: bool },
    Destroyed,
}

/// Registry change broadcast to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryUpdate {
    pub entity_id: String,
    pub change: Change,
    /// Event that caused the change (None for direct registration)
    pub event_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}
