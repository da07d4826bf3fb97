use crate::broker::EventBroker;
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Tracks traffic through the broker
pub struct BrokerMetrics {
    /// Total events published (lifetime counter)
    total_events: AtomicU64,

    /// Total per-connection deliveries
    deliveries: AtomicU64,

    /// Sends that could not reach their entity
    delivery_failures: AtomicU64,

    /// Event timestamps for rate calculation (sliding 5-second window)
    event_timestamps: RwLock<VecDeque<i64>>,

    /// Active senders (entity_id -> last_seen_timestamp_ms)
    active_senders: RwLock<HashMap<String, i64>>,

    /// Connections opened minus connections closed
    connections: AtomicU64,
}

impl BrokerMetrics {
    pub fn new() -> Self {
        Self {
            total_events: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            event_timestamps: RwLock::new(VecDeque::new()),
            active_senders: RwLock::new(HashMap::new()),
            connections: AtomicU64::new(0),
        }
    }

    /// Record a published event
    pub fn record_event(&self, sender_id: &str) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let now = Utc::now().timestamp_millis();

        {
            let mut timestamps = self.event_timestamps.write().unwrap();
            timestamps.push_back(now);

            // Prune old timestamps (keep last 5 seconds)
            while let Some(&oldest) = timestamps.front() {
                if now - oldest > 5000 {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }
        }

        {
            let mut senders = self.active_senders.write().unwrap();
            senders.insert(sender_id.to_string(), now);
        }
    }

    pub fn record_deliveries(&self, count: u64) {
        self.deliveries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Saturating: never wraps below zero
        let _ = self
            .connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Snapshot of current metrics
    pub fn get_snapshot(&self, active_window_seconds: i64) -> MetricsSnapshot {
        let now = Utc::now().timestamp_millis();

        // Events per second over the sliding window
        let event_rate = {
            let timestamps = self.event_timestamps.read().unwrap();
            let recent = timestamps.iter().filter(|&&ts| now - ts <= 5000).count();
            recent as f64 / 5.0
        };

        let active_senders = {
            let window_ms = active_window_seconds * 1000;
            let senders = self.active_senders.read().unwrap();
            senders
                .values()
                .filter(|&&last_seen| now - last_seen <= window_ms)
                .count()
        };

        MetricsSnapshot {
            total_events: self.total_events.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            event_rate,
            active_senders,
            connections: self.connections.load(Ordering::Relaxed),
        }
    }
}

impl Default for BrokerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time broker metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_events: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
    pub event_rate: f64,
    pub active_senders: usize,
    pub connections: u64,
}

/// Periodically log broker metrics until stopped
pub async fn run_metrics_reporter(
    broker: Arc<EventBroker>,
    interval_seconds: u64,
    active_window_seconds: i64,
    mut stop: watch::Receiver<bool>,
) {
    if interval_seconds == 0 {
        return;
    }

    let mut ticker = interval(Duration::from_secs(interval_seconds));

    // Skip missed ticks to prevent backlog under load
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let snapshot = broker.metrics(active_window_seconds);
                info!(
                    total_events = snapshot.total_events,
                    deliveries = snapshot.deliveries,
                    delivery_failures = snapshot.delivery_failures,
                    event_rate = snapshot.event_rate,
                    active_senders = snapshot.active_senders,
                    connections = snapshot.connections,
                    "Broker metrics"
                );
            }
        }
    }
}
