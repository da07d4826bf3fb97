pub mod scenario;
pub use scenario::{
    load_scenario, AgentScenario, HeldActionScenario, ObjectScenario, ScenarioConfig,
    ScriptStep, WorldScenario,
};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Complete kernel configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColonyConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

/// World Socket configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Address the WebSocket endpoint binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// How often broker metrics are logged (seconds, 0 = never)
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_seconds: u64,
    /// Time window for "active sender" tracking (seconds)
    #[serde(default = "default_active_sender_window")]
    pub active_sender_window_seconds: i64,
}

fn default_bind_addr() -> String {
    std::env::var("COLONY_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:7456".to_string())
}

fn default_metrics_interval() -> u64 {
    30
}

fn default_active_sender_window() -> i64 {
    10
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            metrics_interval_seconds: default_metrics_interval(),
            active_sender_window_seconds: default_active_sender_window(),
        }
    }
}

/// Per-agent control loop and antenna configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Longest get_world_state waits for new events (milliseconds)
    #[serde(default = "default_state_wait_ms")]
    pub state_wait_ms: u64,
    /// How long an asleep agent waits before re-checking (milliseconds)
    #[serde(default = "default_asleep_interval_ms")]
    pub asleep_interval_ms: u64,
    /// Events included in each WorldState
    #[serde(default = "default_recent_events")]
    pub recent_events: usize,
    /// Antenna log capacity; oldest entries are evicted
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    /// Hops within which entities count as nearby
    #[serde(default = "default_vision_radius")]
    pub vision_radius: usize,
}

fn default_state_wait_ms() -> u64 {
    500
}

fn default_asleep_interval_ms() -> u64 {
    1000
}

fn default_recent_events() -> usize {
    10
}

fn default_log_capacity() -> usize {
    1000
}

fn default_vision_radius() -> usize {
    0
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            state_wait_ms: default_state_wait_ms(),
            asleep_interval_ms: default_asleep_interval_ms(),
            recent_events: default_recent_events(),
            log_capacity: default_log_capacity(),
            vision_radius: default_vision_radius(),
        }
    }
}

impl AgentConfig {
    pub fn state_wait(&self) -> Duration {
        Duration::from_millis(self.state_wait_ms)
    }

    pub fn asleep_interval(&self) -> Duration {
        Duration::from_millis(self.asleep_interval_ms)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<ColonyConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config '{}'", path))?;
    let config: ColonyConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config '{}'", path))?;
    Ok(config)
}
