pub mod agents;
pub mod config;
pub mod contract;
pub mod events;
pub mod evidence;
pub mod graph;
pub mod guardrails;
pub mod nodes;
pub mod phases;
pub mod provider;
pub mod shared;
pub mod state;
