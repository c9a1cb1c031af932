use crate::contract::ContractError;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("node `{node}` in graph `{graph}` routed to unknown node `{target}`")]
    UnknownNode {
        graph: String,
        node: String,
        target: String,
    },
    #[error("graph `{graph}` entry node `{entry}` is not registered")]
    MissingEntry { graph: String, entry: String },
    #[error("node `{node}` returned an invalid state update: {source}")]
    InvalidUpdate {
        node: String,
        #[source]
        source: ContractError,
    },
    #[error("run exceeded {limit} node steps (last node `{node}`)")]
    StepLimitExceeded { limit: usize, node: String },
    #[error("checkpoint store lock poisoned")]
    CheckpointPoisoned,
}
