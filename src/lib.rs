// Event model and validation
pub mod event;

// Entity registry and world map
pub mod registry;

// Action schemas and validation
pub mod action;

// Per-agent listening filter
pub mod antenna;

// Event broker and World Socket
pub mod broker;

// Agent control loop and planner interface
pub mod agent;

// World and object runtimes
pub mod world;

// Simulation orchestrator
pub mod simulation;

// Configuration and scenarios
pub mod config;

pub use event::Event;
