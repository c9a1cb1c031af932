pub mod builder;
pub mod checkpoint;
pub mod command;
pub mod engine;
pub mod error;
pub mod node;

pub use builder::{
    assemble_from_files, build_sage_graph, AssemblyError, GraphDeps, RunOutcome, RunStatus,
    SageAgents, SageGraph, StreamedRun, ROOT_GRAPH_NAME,
};
pub use checkpoint::{Checkpointer, InMemoryCheckpointer};
pub use command::{Command, END};
pub use engine::{GraphNode, RunTracker, StateGraph};
pub use error::GraphError;
pub use node::{Node, RuntimeContext};
