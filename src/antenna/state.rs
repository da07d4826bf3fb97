use crate::action::ActionSchema;
use crate::event::Event;
use crate::registry::Entity;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// An agent's best-effort view of the world.
///
/// Assembled by the antenna from its event log and the registry; it can lag
/// the registry by a round trip.
#[derive(Clone, Debug, Default, Serialize)]
pub struct WorldState {
    pub agent_id: String,
    pub agent_name: String,
    pub world_id: String,
    pub location: String,
    pub is_asleep: bool,
    pub inventory: Vec<String>,
    /// Entities within the vision radius, the agent itself excluded
    pub nearby_entities: Vec<Entity>,
    pub available_schemas: Vec<ActionSchema>,
    pub known_locations: Vec<String>,
    /// Most recent log entries, oldest first
    pub recent_events: Vec<Event>,
    pub observed_at: DateTime<Utc>,
}

impl WorldState {
    pub fn holds(&self, object_id: &str) -> bool {
        self.inventory.iter().any(|id| id == object_id)
    }

    pub fn nearby(&self, entity_id: &str) -> Option<&Entity> {
        self.nearby_entities.iter().find(|e| e.id == entity_id)
    }

    pub fn has_schema(&self, event_type: &str) -> bool {
        self.available_schemas
            .iter()
            .any(|s| s.event_type == event_type)
    }
}
