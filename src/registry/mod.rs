// Entity registry: canonical world bookkeeping

mod engine;
mod entity;
mod world_map;

pub use engine::{ApplyOutcome, EntityRegistry, RegistryError};
pub use entity::{AgentState, Change, Entity, EntityKind, RegistryUpdate};
pub use world_map::WorldMap;

#[cfg(test)]
mod tests;
