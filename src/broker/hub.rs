use crate::broker::metrics::{BrokerMetrics, MetricsSnapshot};
use crate::event::Event;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One live connection
struct Connection {
    tx: mpsc::UnboundedSender<Event>,
    generation: u64,
    connected_at: DateTime<Utc>,
}

/// Result of one publish
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    /// Entities the event was handed to
    pub delivered: usize,
    /// Entities whose connection turned out to be gone
    pub failed: Vec<String>,
    /// For targeted events: whether the target received it
    pub target_delivered: Option<bool>,
}

/// Central hub: every event is fanned out to every other connected entity.
///
/// Each connection is an unbounded channel, so a single publisher's events
/// reach each receiver in the order they were published. No order is
/// guaranteed across publishers.
pub struct EventBroker {
    connections: DashMap<String, Connection>,
    next_generation: AtomicU64,
    metrics: BrokerMetrics,
}

impl EventBroker {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_generation: AtomicU64::new(1),
            metrics: BrokerMetrics::new(),
        }
    }

    /// Connect an entity. A second connection with the same id replaces
    /// the first, whose receiver then sees the end of its stream.
    pub fn connect(self: &Arc<Self>, entity_id: &str) -> (EventSender, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        let previous = self.connections.insert(
            entity_id.to_string(),
            Connection {
                tx,
                generation,
                connected_at: Utc::now(),
            },
        );
        if previous.is_some() {
            warn!(entity_id = %entity_id, "Entity reconnected, replacing previous connection");
        } else {
            self.metrics.connection_opened();
        }
        info!(entity_id = %entity_id, "Entity connected to broker");

        self.halves(entity_id, generation, rx)
    }

    /// Connect an entity only if no connection holds its id yet.
    /// Returns None, leaving the live connection untouched, otherwise.
    pub fn try_connect(self: &Arc<Self>, entity_id: &str) -> Option<(EventSender, EventReceiver)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        match self.connections.entry(entity_id.to_string()) {
            Entry::Occupied(_) => {
                warn!(entity_id = %entity_id, "Entity already connected, refusing second connection");
                return None;
            }
            Entry::Vacant(slot) => {
                slot.insert(Connection {
                    tx,
                    generation,
                    connected_at: Utc::now(),
                });
            }
        }
        self.metrics.connection_opened();
        info!(entity_id = %entity_id, "Entity connected to broker");

        Some(self.halves(entity_id, generation, rx))
    }

    fn halves(
        self: &Arc<Self>,
        entity_id: &str,
        generation: u64,
        rx: mpsc::UnboundedReceiver<Event>,
    ) -> (EventSender, EventReceiver) {
        (
            EventSender {
                entity_id: entity_id.to_string(),
                broker: Arc::clone(self),
            },
            EventReceiver {
                entity_id: entity_id.to_string(),
                generation,
                rx,
                broker: Arc::clone(self),
            },
        )
    }

    /// Drop an entity's connection
    pub fn disconnect(&self, entity_id: &str) -> bool {
        let removed = self.connections.remove(entity_id).is_some();
        if removed {
            self.metrics.connection_closed();
            info!(entity_id = %entity_id, "Entity disconnected from broker");
        }
        removed
    }

    /// Remove the connection only if it is still the given generation
    fn release(&self, entity_id: &str, generation: u64) {
        if self
            .connections
            .remove_if(entity_id, |_, c| c.generation == generation)
            .is_some()
        {
            self.metrics.connection_closed();
            info!(entity_id = %entity_id, "Entity disconnected from broker");
        }
    }

    pub fn is_connected(&self, entity_id: &str) -> bool {
        self.connections.contains_key(entity_id)
    }

    /// Connected entity ids, sorted
    pub fn connected_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.iter().map(|c| c.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// When an entity connected, if it is connected
    pub fn connected_since(&self, entity_id: &str) -> Option<DateTime<Utc>> {
        self.connections.get(entity_id).map(|c| c.connected_at)
    }

    /// Broadcast `event` from connection `from` to every other connection.
    ///
    /// A send to a connection that has gone away is a delivery failure: it
    /// is logged, the event is dropped for that entity and the dead
    /// connection is removed. Nothing is retried.
    pub fn publish(&self, from: &str, event: &Event) -> PublishReport {
        self.metrics.record_event(from);

        let mut report = PublishReport::default();
        let target = event.target_id();

        for connection in self.connections.iter() {
            let entity_id = connection.key();
            if entity_id == from {
                continue;
            }
            match connection.tx.send(event.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    if target == Some(entity_id.as_str()) {
                        report.target_delivered = Some(true);
                    }
                }
                Err(_) => report.failed.push(entity_id.clone()),
            }
        }
        self.metrics.record_deliveries(report.delivered as u64);

        // Removal happens after iteration; DashMap shards are locked while iterating
        for entity_id in &report.failed {
            warn!(
                entity_id = %entity_id,
                event_id = %event.event_id(),
                event_type = %event.event_type(),
                "Delivery failure: connection closed, dropping event"
            );
            self.metrics.record_delivery_failure();
            if self
                .connections
                .remove_if(entity_id, |_, c| c.tx.is_closed())
                .is_some()
            {
                self.metrics.connection_closed();
            }
        }

        if let Some(target_id) = target {
            if report.target_delivered.is_none() {
                report.target_delivered = Some(false);
                if !report.failed.iter().any(|id| id == target_id) {
                    warn!(
                        target_id = %target_id,
                        event_id = %event.event_id(),
                        event_type = %event.event_type(),
                        "Delivery failure: target not connected, dropping event"
                    );
                    self.metrics.record_delivery_failure();
                }
            }
        }

        debug!(
            from = %from,
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            delivered = report.delivered,
            "Event published"
        );

        report
    }

    pub fn metrics(&self, active_sender_window_seconds: i64) -> MetricsSnapshot {
        self.metrics.get_snapshot(active_sender_window_seconds)
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishing half of a connection
#[derive(Clone)]
pub struct EventSender {
    entity_id: String,
    broker: Arc<EventBroker>,
}

impl EventSender {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Broadcast an event to every other connected entity
    pub fn send(&self, event: &Event) -> PublishReport {
        self.broker.publish(&self.entity_id, event)
    }
}

/// Receiving half of a connection. Dropping it disconnects the entity.
pub struct EventReceiver {
    entity_id: String,
    generation: u64,
    rx: mpsc::UnboundedReceiver<Event>,
    broker: Arc<EventBroker>,
}

impl EventReceiver {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Next event; None once the connection is gone
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        self.broker.release(&self.entity_id, self.generation);
    }
}
