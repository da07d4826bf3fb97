use super::{describe, serve};
use crate::broker::{EventReceiver, EventSender};
use crate::event::{kinds, Event};
use crate::registry::EntityRegistry;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// A passive object that still answers when interacted with
pub struct ObjectRuntime {
    object_id: String,
    registry: Arc<EntityRegistry>,
    sender: EventSender,
}

impl ObjectRuntime {
    pub fn new(object_id: &str, registry: Arc<EntityRegistry>, sender: EventSender) -> Self {
        Self {
            object_id: object_id.to_string(),
            registry,
            sender,
        }
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Answer interactions addressed to this object; ignore everything else
    pub fn handle_event(&self, event: &Event) -> Option<Event> {
        if event.event_type() != kinds::AGENT_INTERACTS_WITH_OBJECT
            || !event.is_targeted_at(&self.object_id)
        {
            return None;
        }

        let object = match self.registry.lookup(&self.object_id) {
            Ok(object) => object,
            Err(e) => {
                warn!(object_id = %self.object_id, error = %e, "Object missing from registry");
                return None;
            }
        };

        let mut response = Event::new(kinds::OBJECT_RESPONDS_TO_INTERACTION, self.object_id.as_str())
            .with_target(event.sender_id())
            .with_summary(format!("{} responds to {}", object.name, event.sender_id()))
            .with_field(kinds::FIELD_OBJECT_ID, self.object_id.as_str())
            .with_field(kinds::FIELD_ENTITY, describe(&object))
            .with_field("request_event_id", event.event_id());
        if let Some(interaction) = event.payload().get("interaction") {
            response = response.with_field("interaction", interaction.clone());
        }
        Some(response)
    }

    /// Serve until stopped or disconnected
    pub async fn run(self, receiver: EventReceiver, stop: watch::Receiver<bool>) {
        info!(object_id = %self.object_id, "Object runtime started");
        serve(receiver, stop, &self.sender, |event| self.handle_event(event)).await;
        info!(object_id = %self.object_id, "Object runtime stopped");
    }
}
