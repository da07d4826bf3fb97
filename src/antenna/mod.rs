// Per-agent listening filter and world-state derivation

mod state;

pub use state::WorldState;

use crate::broker::EventReceiver;
use crate::config::AgentConfig;
use crate::event::Event;
use crate::registry::{EntityRegistry, RegistryError};
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};


/// Keeps the events one agent cares about and derives its WorldState.
///
/// An event passes the filter when its type is in the interest set or when
/// it is addressed to the owning agent.
pub struct ListeningAntenna {
    agent_id: String,
    world_id: String,
    interests: HashSet<String>,
    registry: Arc<EntityRegistry>,

    /// Rolling log, oldest first
    log: Mutex<VecDeque<Event>>,
    log_capacity: usize,
    recent_events: usize,
    vision_radius: usize,
    state_wait: Duration,

    /// Events accepted from the broker so far
    ingested: AtomicU64,
    /// Value of `ingested` at the last get_world_state
    observed: AtomicU64,
    notify: Notify,
}

impl ListeningAntenna {
    pub fn new<I, S>(
        agent_id: &str,
        world_id: &str,
        interests: I,
        registry: Arc<EntityRegistry>,
        config: &AgentConfig,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agent_id: agent_id.to_string(),
            world_id: world_id.to_string(),
            interests: interests.into_iter().map(Into::into).collect(),
            registry,
            log: Mutex::new(VecDeque::new()),
            log_capacity: config.log_capacity.max(1),
            recent_events: config.recent_events,
            vision_radius: config.vision_radius,
            state_wait: config.state_wait(),
            ingested: AtomicU64::new(0),
            observed: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// True when the event would pass the filter
    pub fn is_interested(&self, event: &Event) -> bool {
        event.is_targeted_at(&self.agent_id) || self.interests.contains(event.event_type())
    }

    /// Keep the event if it passes the filter. Returns whether it was kept.
    pub fn ingest(&self, event: Event) -> bool {
        if !self.is_interested(&event) {
            return false;
        }

        debug!(
            agent_id = %self.agent_id,
            event_type = %event.event_type(),
            sender_id = %event.sender_id(),
            "Antenna picked up event"
        );
        self.push(event);
        self.ingested.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
        true
    }

    /// Append unconditionally (own actions, failure observations).
    /// Does not count as new information for get_world_state.
    pub fn record(&self, event: Event) {
        self.push(event);
    }

    fn push(&self, event: Event) {
        let mut log = self.log.lock().unwrap();
        log.push_back(event);
        while log.len() > self.log_capacity {
            log.pop_front();
        }
    }

    /// Most recent `n` entries, oldest first, without consuming them
    pub fn get_last_events(&self, n: usize) -> Vec<Event> {
        let log = self.log.lock().unwrap();
        let skip = log.len().saturating_sub(n);
        log.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Derive the current WorldState.
    ///
    /// If nothing was ingested since the previous call, waits up to the
    /// configured bound for new events, then answers with what it has.
    pub async fn get_world_state(&self) -> Result<WorldState, RegistryError> {
        // Registered before the check so a concurrent ingest is not missed
        let notified = self.notify.notified();
        let seen = self.observed.load(Ordering::SeqCst);
        if self.ingested.load(Ordering::SeqCst) == seen {
            let _ = tokio::time::timeout(self.state_wait, notified).await;
        }
        self.observed
            .store(self.ingested.load(Ordering::SeqCst), Ordering::SeqCst);

        self.snapshot()
    }

    /// Derive the WorldState immediately
    pub fn snapshot(&self) -> Result<WorldState, RegistryError> {
        let agent = self.registry.lookup(&self.agent_id)?;
        let nearby_entities = self
            .registry
            .nearby(&agent.location, self.vision_radius)
            .into_iter()
            .filter(|e| e.id != self.agent_id)
            .collect();
        let available_schemas = self
            .registry
            .schemas_for(&self.agent_id, self.vision_radius)?;

        Ok(WorldState {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            world_id: self.world_id.clone(),
            location: agent.location.clone(),
            is_asleep: agent.is_asleep(),
            inventory: agent
                .inventory()
                .map(|inv| inv.iter().cloned().collect())
                .unwrap_or_default(),
            nearby_entities,
            available_schemas,
            known_locations: self.registry.locations(),
            recent_events: self.get_last_events(self.recent_events),
            observed_at: Utc::now(),
        })
    }

    /// Feed the antenna from a broker connection until stopped or disconnected
    pub async fn listen(self: Arc<Self>, mut receiver: EventReceiver, mut stop: watch::Receiver<bool>) {
        info!(agent_id = %self.agent_id, "Antenna listening");

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                next = receiver.recv() => {
                    match next {
                        Some(event) => {
                            self.ingest(event);
                        }
                        None => {
                            info!(agent_id = %self.agent_id, "Broker connection closed");
                            break;
                        }
                    }
                }
            }
        }

        info!(agent_id = %self.agent_id, "Antenna stopped");
    }
}
