use super::schema::{ActionSchema, Executor, Precondition};
use crate::event::kinds;
use crate::registry::{Entity, EntityKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// When a catalog entry is offered to an agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Exposure {
    Always,
    /// Only while the agent holds this object
    WhileHolding { object_id: String },
    /// While the agent holds at least one object
    WhileHoldingAny,
    /// While an unheld object is within reach
    WhileUnheldObjectNearby,
}

impl Exposure {
    fn is_open(&self, agent: &Entity, nearby: &[Entity]) -> bool {
        let inventory = match &agent.kind {
            EntityKind::Agent(state) => &state.inventory,
            EntityKind::Object => return false,
        };
        match self {
            Exposure::Always => true,
            Exposure::WhileHolding { object_id } => inventory.contains(object_id),
            Exposure::WhileHoldingAny => !inventory.is_empty(),
            Exposure::WhileUnheldObjectNearby => nearby
                .iter()
                .any(|e| matches!(e.kind, EntityKind::Object) && e.held_by.is_none()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct CatalogEntry {
    schema: ActionSchema,
    exposure: Exposure,
}

/// Registry mapping event_type -> (predicate, executor, exposure)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchemaCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl SchemaCatalog {
    /// Empty catalog (no agent can do anything)
    pub fn new() -> Self {
        Self::default()
    }

    /// The basic action set every agent in a world starts with
    pub fn standard() -> Self {
        Self::new()
            .with_schema(
                ActionSchema::new(
                    kinds::AGENT_GIVES_OBJECT_TO_AGENT,
                    "Gives an object you hold to a nearby agent",
                    Precondition::All {
                        checks: vec![
                            Precondition::HoldsPayloadObject {
                                field: kinds::FIELD_OBJECT_ID.to_string(),
                            },
                            Precondition::TargetIsNearbyAgent,
                            Precondition::PayloadFieldIsTarget {
                                field: kinds::FIELD_RECIPIENT_ID.to_string(),
                            },
                        ],
                    },
                    Executor::Sender,
                ),
                Exposure::WhileHoldingAny,
            )
            .with_schema(
                ActionSchema::new(
                    kinds::AGENT_TAKES_OBJECT,
                    "Picks up a nearby object nobody holds",
                    Precondition::PayloadObjectUnheldNearby {
                        field: kinds::FIELD_OBJECT_ID.to_string(),
                    },
                    Executor::Sender,
                ),
                Exposure::WhileUnheldObjectNearby,
            )
            .with_schema(
                ActionSchema::new(
                    kinds::AGENT_DROPS_OBJECT,
                    "Drops an object you hold at your current location",
                    Precondition::HoldsPayloadObject {
                        field: kinds::FIELD_OBJECT_ID.to_string(),
                    },
                    Executor::Sender,
                ),
                Exposure::WhileHoldingAny,
            )
            .with_schema(
                ActionSchema::new(
                    kinds::ENTITY_MOVES_TO_LOCATION,
                    "Moves to another location",
                    Precondition::PayloadLocationKnown {
                        field: kinds::FIELD_LOCATION.to_string(),
                    },
                    Executor::Sender,
                ),
                Exposure::Always,
            )
            .with_schema(
                ActionSchema::new(
                    kinds::AGENT_SPEAKS_WITH_AGENT,
                    "Says something to a nearby agent",
                    Precondition::All {
                        checks: vec![
                            Precondition::TargetIsNearbyAgent,
                            Precondition::PayloadFieldPresent {
                                field: kinds::FIELD_MESSAGE.to_string(),
                            },
                        ],
                    },
                    Executor::Sender,
                ),
                Exposure::Always,
            )
            .with_schema(
                ActionSchema::new(
                    kinds::AGENT_INTERACTS_WITH_OBJECT,
                    "Interacts with a nearby object",
                    Precondition::TargetNearby,
                    Executor::Target,
                ),
                Exposure::Always,
            )
            .with_schema(
                ActionSchema::new(
                    kinds::AGENT_GETS_NEARBY_ENTITIES,
                    "Asks the world which entities are nearby",
                    Precondition::None,
                    Executor::World,
                ),
                Exposure::Always,
            )
            .with_schema(
                ActionSchema::new(
                    kinds::AGENT_GETS_OBJECT_INFO,
                    "Asks the world for the info of an object",
                    Precondition::PayloadFieldPresent {
                        field: kinds::FIELD_OBJECT_ID.to_string(),
                    },
                    Executor::World,
                ),
                Exposure::Always,
            )
            .with_schema(
                ActionSchema::new(
                    kinds::AGENT_GETS_AGENT_INFO,
                    "Asks the world for the info of an agent",
                    Precondition::PayloadFieldPresent {
                        field: kinds::FIELD_AGENT_ID.to_string(),
                    },
                    Executor::World,
                ),
                Exposure::Always,
            )
            .with_schema(
                ActionSchema::new(
                    kinds::ENTITY_REQUESTS_WORLD_STATE_UPDATE,
                    "Asks the world for the entities and actions currently available",
                    Precondition::None,
                    Executor::World,
                ),
                Exposure::Always,
            )
    }

    /// Add or replace an entry
    pub fn with_schema(mut self, schema: ActionSchema, exposure: Exposure) -> Self {
        self.insert(schema, exposure);
        self
    }

    /// Action unlocked by holding an object (e.g., speaking into a microphone)
    pub fn with_object_action(
        self,
        object_id: &str,
        event_type: &str,
        description: &str,
    ) -> Self {
        self.with_schema(
            ActionSchema::new(
                event_type,
                description,
                Precondition::HoldsObject {
                    object_id: object_id.to_string(),
                },
                Executor::Sender,
            ),
            Exposure::WhileHolding {
                object_id: object_id.to_string(),
            },
        )
    }

    pub fn insert(&mut self, schema: ActionSchema, exposure: Exposure) {
        self.entries
            .insert(schema.event_type.clone(), CatalogEntry { schema, exposure });
    }

    pub fn get(&self, event_type: &str) -> Option<&ActionSchema> {
        self.entries.get(event_type).map(|e| &e.schema)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Schemas currently open to `entity`, given what is around it.
    /// Objects are passive and expose nothing themselves.
    pub fn available_for(&self, entity: &Entity, nearby: &[Entity]) -> Vec<ActionSchema> {
        self.entries
            .values()
            .filter(|entry| entry.exposure.is_open(entity, nearby))
            .map(|entry| entry.schema.clone())
            .collect()
    }
}
