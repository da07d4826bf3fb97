// Simulation orchestrator: registers the world, connects everyone, spawns loops

use crate::action::SchemaCatalog;
use crate::agent::{ActionPlanner, AgentSpec, ControlLoop, LoopPhase};
use crate::antenna::ListeningAntenna;
use crate::broker::{
    create_world_socket_router, run_metrics_reporter, EventBroker, WorldSocketState,
};
use crate::config::{AgentScenario, ColonyConfig, ScenarioConfig};
use crate::event::kinds;
use crate::registry::{Entity, EntityRegistry, WorldMap};
use crate::world::{ObjectRuntime, WorldRuntime};
use anyhow::{bail, Context, Result};
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};


/// The world entity and its map
#[derive(Clone, Debug)]
pub struct WorldSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub map: WorldMap,
}

impl WorldSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        map: WorldMap,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            map,
        }
    }
}

/// An object and the actions it unlocks for its holder
#[derive(Clone, Debug)]
pub struct ObjectSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    /// (event_type, description) pairs
    pub held_actions: Vec<(String, String)>,
}

impl ObjectSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            held_actions: Vec::new(),
        }
    }

    pub fn with_held_action(
        mut self,
        event_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.held_actions.push((event_type.into(), description.into()));
        self
    }
}

/// Where an object starts
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectPlacement {
    HeldBy(String),
    At(String),
}

/// A world, its objects and its agents, ready to launch
pub struct Simulation {
    name: String,
    description: String,
    world: WorldSpec,
    config: ColonyConfig,
    catalog: SchemaCatalog,
    objects: Vec<(ObjectSpec, ObjectPlacement)>,
    agents: Vec<(AgentSpec, String)>,
}

impl Simulation {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        world: WorldSpec,
        config: ColonyConfig,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            world,
            config,
            catalog: SchemaCatalog::standard(),
            objects: Vec::new(),
            agents: Vec::new(),
        }
    }

    /// Replace the standard action catalog
    pub fn with_catalog(mut self, catalog: SchemaCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_object(mut self, spec: ObjectSpec, placement: ObjectPlacement) -> Self {
        self.objects.push((spec, placement));
        self
    }

    pub fn with_agent(mut self, spec: AgentSpec, location: impl Into<String>) -> Self {
        self.agents.push((spec, location.into()));
        self
    }

    /// Build a simulation from a scenario file; `planner_for` supplies each
    /// agent's planner.
    pub fn from_scenario<F>(
        scenario: &ScenarioConfig,
        config: ColonyConfig,
        mut planner_for: F,
    ) -> Result<Self>
    where
        F: FnMut(&AgentScenario) -> Arc<dyn ActionPlanner>,
    {
        let world = &scenario.world;
        let mut map = WorldMap::new(world.locations.iter().cloned());
        for [a, b] in &world.paths {
            if !map.contains(a) || !map.contains(b) {
                bail!("Path '{}' <-> '{}' names an unknown location", a, b);
            }
            map = map.with_path(a, b);
        }

        let mut simulation = Simulation::new(
            scenario.name.clone(),
            scenario.description.clone(),
            WorldSpec::new(
                world.id.clone(),
                world.name.clone(),
                world.description.clone(),
                map,
            ),
            config,
        );

        for agent in &scenario.agents {
            let spec = AgentSpec::new(
                agent.id.clone(),
                agent.name.clone(),
                agent.description.clone(),
                planner_for(agent),
            )
            .with_interests(agent.interesting_events.iter().cloned());
            simulation = simulation.with_agent(spec, agent.location.clone());
        }

        for object in &scenario.objects {
            let placement = match (&object.held_by, &object.location) {
                (Some(holder), _) => ObjectPlacement::HeldBy(holder.clone()),
                (None, Some(location)) => ObjectPlacement::At(location.clone()),
                (None, None) => bail!("Object '{}' needs held_by or location", object.id),
            };
            let spec = object.actions.iter().fold(
                ObjectSpec::new(object.id.clone(), object.name.clone(), object.description.clone()),
                |spec, action| spec.with_held_action(action.event_type.clone(), action.description.clone()),
            );
            simulation = simulation.with_object(spec, placement);
        }

        Ok(simulation)
    }

    /// Register every entity, connect everyone to the broker and spawn the
    /// world, object, listener and control-loop tasks. Returns without
    /// waiting for them.
    pub async fn launch(self) -> Result<SimulationHandle> {
        info!(
            simulation = %self.name,
            description = %self.description,
            agents = self.agents.len(),
            objects = self.objects.len(),
            "Launching simulation"
        );

        let catalog = self.objects.iter().fold(self.catalog, |catalog, (object, _)| {
            object
                .held_actions
                .iter()
                .fold(catalog, |catalog, (event_type, description)| {
                    catalog.with_object_action(&object.id, event_type, description)
                })
        });
        let registry = Arc::new(EntityRegistry::new(
            self.world.id.clone(),
            self.world.map.clone(),
            catalog,
        ));

        // The world shares the broker's id space with everything it hosts
        let entity_ids = self
            .agents
            .iter()
            .map(|(spec, _)| &spec.id)
            .chain(self.objects.iter().map(|(spec, _)| &spec.id));
        for id in entity_ids {
            if *id == self.world.id {
                bail!("Failed to register entity '{}': id is taken by the world", id);
            }
        }

        // Agents first: held objects take their holder's location
        for (spec, location) in &self.agents {
            let entity = Entity::agent(&spec.id, &spec.name, &spec.description, location)
                .with_interests(spec.interesting_event_types.iter().cloned());
            registry
                .register(entity)
                .with_context(|| format!("Failed to register agent '{}'", spec.id))?;
        }
        for (spec, placement) in &self.objects {
            let entity = match placement {
                ObjectPlacement::At(location) => {
                    Entity::object(&spec.id, &spec.name, &spec.description, location)
                }
                ObjectPlacement::HeldBy(holder) => {
                    let holder_location = registry
                        .lookup(holder)
                        .with_context(|| format!("Holder of '{}' is not registered", spec.id))?
                        .location;
                    Entity::object(&spec.id, &spec.name, &spec.description, holder_location)
                        .held_by(holder)
                }
            };
            registry
                .register(entity)
                .with_context(|| format!("Failed to register object '{}'", spec.id))?;
        }

        let broker = Arc::new(EventBroker::new());
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let (world_tx, world_rx) = broker.connect(&self.world.id);
        let world = WorldRuntime::new(
            &self.world.id,
            Arc::clone(&registry),
            world_tx,
            self.config.agent.vision_radius,
        );
        tasks.push(tokio::spawn(world.run(world_rx, stop_rx.clone())));

        for (spec, _) in &self.objects {
            let (object_tx, object_rx) = broker.connect(&spec.id);
            let object = ObjectRuntime::new(&spec.id, Arc::clone(&registry), object_tx);
            tasks.push(tokio::spawn(object.run(object_rx, stop_rx.clone())));
        }

        let mut antennas = HashMap::new();
        let mut phases = HashMap::new();
        for (spec, _) in self.agents {
            let interests = spec
                .interesting_event_types
                .iter()
                .cloned()
                .chain(kinds::default_interests().into_iter().map(String::from));
            let antenna = Arc::new(ListeningAntenna::new(
                &spec.id,
                &self.world.id,
                interests,
                Arc::clone(&registry),
                &self.config.agent,
            ));

            let (agent_tx, agent_rx) = broker.connect(&spec.id);
            tasks.push(tokio::spawn(
                Arc::clone(&antenna).listen(agent_rx, stop_rx.clone()),
            ));

            let control = ControlLoop::new(
                Arc::clone(&antenna),
                Arc::clone(&registry),
                agent_tx,
                spec.planner,
                &self.config.agent,
            );
            phases.insert(spec.id.clone(), control.phase());
            tasks.push(tokio::spawn(control.run(stop_rx.clone())));
            antennas.insert(spec.id, antenna);
        }

        tasks.push(tokio::spawn(run_metrics_reporter(
            Arc::clone(&broker),
            self.config.broker.metrics_interval_seconds,
            self.config.broker.active_sender_window_seconds,
            stop_rx,
        )));

        info!(
            simulation = %self.name,
            connections = broker.connection_count(),
            "Simulation launched"
        );

        Ok(SimulationHandle {
            name: self.name,
            broker,
            registry,
            antennas,
            phases,
            stop_tx,
            tasks,
        })
    }
}

/// A running simulation
pub struct SimulationHandle {
    name: String,
    broker: Arc<EventBroker>,
    registry: Arc<EntityRegistry>,
    antennas: HashMap<String, Arc<ListeningAntenna>>,
    phases: HashMap<String, watch::Receiver<LoopPhase>>,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SimulationHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn broker(&self) -> Arc<EventBroker> {
        Arc::clone(&self.broker)
    }

    pub fn registry(&self) -> Arc<EntityRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn antenna(&self, agent_id: &str) -> Option<Arc<ListeningAntenna>> {
        self.antennas.get(agent_id).cloned()
    }

    /// Current control-loop phase of an agent
    pub fn phase(&self, agent_id: &str) -> Option<LoopPhase> {
        self.phases.get(agent_id).map(|rx| *rx.borrow())
    }

    /// World Socket router for remote entities
    pub fn router(&self) -> Router {
        create_world_socket_router(Arc::new(WorldSocketState {
            broker: Arc::clone(&self.broker),
        }))
    }

    /// Signal every task to stop. In-flight actions are not rolled back.
    pub fn stop(&self) {
        info!(simulation = %self.name, "Stopping simulation");
        self.stop_tx.send_replace(true);
    }

    /// Wait for every task to finish
    pub async fn join(self) {
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                error!(simulation = %self.name, error = %e, "Simulation task failed");
            }
        }
        info!(simulation = %self.name, "Simulation stopped");
    }

    pub async fn shutdown(self) {
        self.stop();
        self.join().await;
    }
}
