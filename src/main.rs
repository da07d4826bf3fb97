use anyhow::{Context, Result};
use colony::action::ProposedAction;
use colony::agent::{ActionPlanner, ScriptedPlanner};
use colony::config::{load_config, load_scenario, ColonyConfig};
use colony::simulation::Simulation;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colony=info".into()),
        )
        .init();

    info!("Colony starting...");

    let config = match std::env::var("COLONY_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => ColonyConfig::default(),
    };

    let scenario_path = std::env::var("COLONY_SCENARIO")
        .unwrap_or_else(|_| "demos/roundtable.toml".to_string());
    let scenario = load_scenario(&scenario_path)?;

    info!(
        scenario = %scenario.name,
        bind_addr = %config.broker.bind_addr,
        agents = scenario.agents.len(),
        objects = scenario.objects.len(),
        "Configuration loaded"
    );

    let bind_addr = config.broker.bind_addr.clone();
    let simulation = Simulation::from_scenario(&scenario, config, |agent| {
        let planner = ScriptedPlanner::from_actions(agent.script.iter().map(ProposedAction::from))
            .finish_when_exhausted();
        Arc::new(planner) as Arc<dyn ActionPlanner>
    })?;
    let handle = simulation.launch().await?;

    // World Socket for remote entities
    let router = handle.router();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind World Socket to {}", bind_addr))?;
    info!(bind_addr = %bind_addr, "World Socket listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "World Socket server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    handle.shutdown().await;
    info!("Colony stopped");

    Ok(())
}
