//! Well-known event types.
//!
//! The broker forwards any event type; these are the ones the registry,
//! the world runtime and the default schema catalog understand.

// Object transfers (structural)
pub const AGENT_GIVES_OBJECT_TO_AGENT: &str = "agent_gives_object_to_agent_event";
pub const AGENT_TAKES_OBJECT: &str = "agent_takes_object_event";
pub const AGENT_DROPS_OBJECT: &str = "agent_drops_object_event";

// Movement and lifecycle (structural)
pub const ENTITY_MOVES_TO_LOCATION: &str = "entity_moves_to_location_event";
pub const WORLD_CREATES_ENTITY: &str = "world_creates_entity_event";
pub const WORLD_DESTROYS_ENTITY: &str = "world_destroys_entity_event";
pub const AGENT_FALLS_ASLEEP: &str = "agent_falls_asleep_event";
pub const AGENT_WAKES_UP: &str = "agent_wakes_up_event";

// Communication
pub const AGENT_SPEAKS_WITH_AGENT: &str = "agent_speaks_with_agent_event";
pub const AGENT_INTERACTS_WITH_OBJECT: &str = "agent_interacts_with_object_event";
pub const OBJECT_RESPONDS_TO_INTERACTION: &str = "object_responds_to_interaction_event";

// Requests answered by the world
pub const AGENT_GETS_NEARBY_ENTITIES: &str = "agent_gets_nearby_entities_event";
pub const AGENT_GETS_OBJECT_INFO: &str = "agent_gets_object_info_event";
pub const AGENT_GETS_AGENT_INFO: &str = "agent_gets_agent_info_event";
pub const ENTITY_REQUESTS_WORLD_STATE_UPDATE: &str = "entity_request_world_state_update_event";

// World replies
pub const WORLD_SENDS_NEARBY_ENTITIES: &str = "world_sends_nearby_entities_event";
pub const WORLD_SENDS_OBJECT_INFO: &str = "world_sends_object_info_event";
pub const WORLD_SENDS_AGENT_INFO: &str = "world_sends_agent_info_event";
pub const WORLD_SENDS_AVAILABLE_ENTITIES: &str = "world_sends_available_entities_event";
pub const WORLD_REJECTS_REQUEST: &str = "world_rejects_request_event";

// Self-observation written into an agent's own log
pub const AGENT_ACTION_FAILED: &str = "agent_action_failed_event";

// Payload keys
pub const FIELD_OBJECT_ID: &str = "object_id";
pub const FIELD_RECIPIENT_ID: &str = "recipient_id";
pub const FIELD_AGENT_ID: &str = "agent_id";
pub const FIELD_LOCATION: &str = "location";
pub const FIELD_ENTITY: &str = "entity";
pub const FIELD_ENTITY_ID: &str = "entity_id";
pub const FIELD_MESSAGE: &str = "message";

/// Event types every agent listens to regardless of its configured interests
pub fn default_interests() -> Vec<&'static str> {
    vec![
        WORLD_SENDS_NEARBY_ENTITIES,
        WORLD_SENDS_OBJECT_INFO,
        WORLD_SENDS_AGENT_INFO,
        WORLD_SENDS_AVAILABLE_ENTITIES,
        AGENT_GIVES_OBJECT_TO_AGENT,
    ]
}
