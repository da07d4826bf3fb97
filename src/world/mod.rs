// World and object runtimes: the executors of forwarded actions

mod object;

pub use object::ObjectRuntime;

use crate::broker::{EventReceiver, EventSender};
use crate::event::{kinds, Event};
use crate::registry::{ApplyOutcome, Entity, EntityRegistry};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// The world entity.
///
/// Sees every event on the broker, keeps the registry in step with the
/// structural ones and answers the requests agents forward to it.
pub struct WorldRuntime {
    world_id: String,
    registry: Arc<EntityRegistry>,
    sender: EventSender,
    vision_radius: usize,
}

impl WorldRuntime {
    pub fn new(
        world_id: &str,
        registry: Arc<EntityRegistry>,
        sender: EventSender,
        vision_radius: usize,
    ) -> Self {
        Self {
            world_id: world_id.to_string(),
            registry,
            sender,
            vision_radius,
        }
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    /// Apply the event and build the reply, if it calls for one
    pub fn handle_event(&self, event: &Event) -> Option<Event> {
        if EntityRegistry::is_structural(event.event_type()) {
            self.apply(event);
            return None;
        }

        let is_request = matches!(
            event.event_type(),
            kinds::AGENT_GETS_NEARBY_ENTITIES
                | kinds::AGENT_GETS_OBJECT_INFO
                | kinds::AGENT_GETS_AGENT_INFO
                | kinds::ENTITY_REQUESTS_WORLD_STATE_UPDATE
        );
        let addressed = event.target_id().map_or(is_request, |t| t == self.world_id);
        if !addressed {
            return None;
        }

        let reply = match self.answer(event) {
            Ok(reply) => reply,
            Err(reason) => {
                warn!(
                    event_id = %event.event_id(),
                    event_type = %event.event_type(),
                    sender_id = %event.sender_id(),
                    reason = %reason,
                    "World rejected request"
                );
                self.reply(event, kinds::WORLD_REJECTS_REQUEST)
                    .with_summary(format!("Request rejected: {}", reason))
                    .with_field("reason", reason)
                    .with_field("request_event_type", event.event_type())
            }
        };
        Some(reply)
    }

    fn apply(&self, event: &Event) {
        match self.registry.apply(event) {
            Ok(ApplyOutcome::Applied(updates)) => debug!(
                event_id = %event.event_id(),
                changes = updates.len(),
                "World applied structural event"
            ),
            Ok(ApplyOutcome::Duplicate) | Ok(ApplyOutcome::PassThrough) => {}
            Err(e) => warn!(
                event_id = %event.event_id(),
                event_type = %event.event_type(),
                sender_id = %event.sender_id(),
                error = %e,
                "World could not apply event"
            ),
        }
    }

    fn answer(&self, request: &Event) -> Result<Event, String> {
        match request.event_type() {
            kinds::AGENT_GETS_NEARBY_ENTITIES => {
                let nearby = self.nearby_for(request.sender_id())?;
                Ok(self
                    .reply(request, kinds::WORLD_SENDS_NEARBY_ENTITIES)
                    .with_summary(format!("{} entities nearby", nearby.len()))
                    .with_field("nearby_entities", to_value(&nearby)?))
            }
            kinds::AGENT_GETS_OBJECT_INFO => {
                let object = self.lookup_field(request, kinds::FIELD_OBJECT_ID)?;
                if !object.is_object() {
                    return Err(format!("'{}' is not an object", object.id));
                }
                Ok(self
                    .reply(request, kinds::WORLD_SENDS_OBJECT_INFO)
                    .with_summary(format!("Info about {}", object.name))
                    .with_field(kinds::FIELD_ENTITY, to_value(&object)?))
            }
            kinds::AGENT_GETS_AGENT_INFO => {
                let agent = self.lookup_field(request, kinds::FIELD_AGENT_ID)?;
                if !agent.is_agent() {
                    return Err(format!("'{}' is not an agent", agent.id));
                }
                Ok(self
                    .reply(request, kinds::WORLD_SENDS_AGENT_INFO)
                    .with_summary(format!("Info about {}", agent.name))
                    .with_field(kinds::FIELD_ENTITY, to_value(&agent)?))
            }
            kinds::ENTITY_REQUESTS_WORLD_STATE_UPDATE => {
                let nearby = self.nearby_for(request.sender_id())?;
                let schemas = self
                    .registry
                    .schemas_for(request.sender_id(), self.vision_radius)
                    .map_err(|e| e.to_string())?;
                Ok(self
                    .reply(request, kinds::WORLD_SENDS_AVAILABLE_ENTITIES)
                    .with_summary(format!(
                        "{} entities and {} actions available",
                        nearby.len(),
                        schemas.len()
                    ))
                    .with_field("available_entities", to_value(&nearby)?)
                    .with_field("available_action_schemas", to_value(&schemas)?))
            }
            other => Err(format!("the world does not handle '{}'", other)),
        }
    }

    /// Entities around `entity_id`, itself excluded
    fn nearby_for(&self, entity_id: &str) -> Result<Vec<Entity>, String> {
        let entity = self.registry.lookup(entity_id).map_err(|e| e.to_string())?;
        Ok(self
            .registry
            .nearby(&entity.location, self.vision_radius)
            .into_iter()
            .filter(|e| e.id != entity_id)
            .collect())
    }

    fn lookup_field(&self, request: &Event, field: &str) -> Result<Entity, String> {
        let id = request
            .payload_str(field)
            .ok_or_else(|| format!("payload field '{}' is required", field))?;
        self.registry.lookup(id).map_err(|e| e.to_string())
    }

    fn reply(&self, request: &Event, event_type: &str) -> Event {
        Event::new(event_type, self.world_id.as_str())
            .with_target(request.sender_id())
            .with_field("request_event_id", request.event_id())
    }

    /// Serve until stopped or disconnected
    pub async fn run(self, receiver: EventReceiver, stop: watch::Receiver<bool>) {
        info!(world_id = %self.world_id, "World runtime started");
        serve(receiver, stop, &self.sender, |event| self.handle_event(event)).await;
        info!(world_id = %self.world_id, "World runtime stopped");
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

/// Feed each received event to `handler` and publish its replies
pub(crate) async fn serve<F>(
    mut receiver: EventReceiver,
    mut stop: watch::Receiver<bool>,
    sender: &EventSender,
    handler: F,
) where
    F: Fn(&Event) -> Option<Event>,
{
    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            next = receiver.recv() => {
                let Some(event) = next else {
                    info!(entity_id = %sender.entity_id(), "Broker connection closed");
                    break;
                };
                if let Some(reply) = handler(&event) {
                    let report = sender.send(&reply);
                    debug!(
                        entity_id = %sender.entity_id(),
                        event_type = %reply.event_type(),
                        delivered = report.delivered,
                        "Reply sent"
                    );
                }
            }
        }
    }
}

/// Summary line for the world's view of an entity
pub(crate) fn describe(entity: &Entity) -> Value {
    json!({
        "id": entity.id,
        "name": entity.name,
        "description": entity.description,
        "location": entity.location,
        "held_by": entity.held_by,
    })
}
