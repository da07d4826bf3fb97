use crate::action::ProposedAction;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// A simulation described in TOML: the world, its objects and its agents
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub world: WorldScenario,
    #[serde(default)]
    pub objects: Vec<ObjectScenario>,
    #[serde(default)]
    pub agents: Vec<AgentScenario>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorldScenario {
    #[serde(default = "default_world_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub locations: Vec<String>,
    /// Pairs of connected locations
    #[serde(default)]
    pub paths: Vec<[String; 2]>,
}

fn default_world_id() -> String {
    "world".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectScenario {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Initial holder (takes precedence over location)
    #[serde(default)]
    pub held_by: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Actions unlocked for whoever holds the object
    #[serde(default)]
    pub actions: Vec<HeldActionScenario>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeldActionScenario {
    pub event_type: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentScenario {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub interesting_events: Vec<String>,
    /// Actions a scripted planner proposes, in order
    #[serde(default)]
    pub script: Vec<ScriptStep>,
}

/// One scripted action
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStep {
    pub event_type: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl From<&ScriptStep> for ProposedAction {
    fn from(step: &ScriptStep) -> Self {
        ProposedAction {
            event_type: step.event_type.clone(),
            target_id: step.target_id.clone(),
            summary: step.summary.clone(),
            payload: step.payload.clone(),
        }
    }
}

/// Load a scenario from a TOML file
pub fn load_scenario(path: &str) -> Result<ScenarioConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario '{}'", path))?;
    let scenario: ScenarioConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse scenario '{}'", path))?;
    Ok(scenario)
}
