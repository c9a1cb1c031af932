pub mod problem_framing;

pub use problem_framing::{problem_framing_contract, PROBLEM_FRAMING};

use crate::contract::is_known_phase;
use crate::graph::{Node, StateGraph};
use crate::nodes::{PhaseSupervisorNode, PHASE_SUPERVISOR};
use crate::state::SageState;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("phase `{phase}` is already registered")]
    Duplicate { phase: String },
    #[error("phase `{phase}` is not part of the phase dependency graph")]
    UnknownPhase { phase: String },
}

#[derive(Clone)]
pub struct PhaseContract {
    pub name: String,
    pub output_schema: String,
    pub requires_evidence: bool,
    pub retrieval_enabled: bool,
    pub clarification_enabled: bool,
    node: Arc<dyn Node>,
}

impl PhaseContract {
    pub fn new(name: &str, output_schema: &str, node: Arc<dyn Node>) -> Self {
        Self {
            name: name.to_string(),
            output_schema: output_schema.to_string(),
            requires_evidence: true,
            retrieval_enabled: true,
            clarification_enabled: true,
            node,
        }
    }

    pub fn with_requires_evidence(mut self, enabled: bool) -> Self {
        self.requires_evidence = enabled;
        self
    }

    pub fn with_retrieval(mut self, enabled: bool) -> Self {
        self.retrieval_enabled = enabled;
        self
    }

    pub fn with_clarification(mut self, enabled: bool) -> Self {
        self.clarification_enabled = enabled;
        self
    }

    pub fn allows_retrieval(&self) -> bool {
        self.retrieval_enabled && self.requires_evidence
    }

    pub fn build_graph(&self) -> StateGraph {
        StateGraph::new(self.name.clone(), PHASE_SUPERVISOR)
            .add_node(
                PHASE_SUPERVISOR,
                Arc::new(PhaseSupervisorNode::new(&self.name)),
            )
            .add_node(&self.name, Arc::clone(&self.node))
    }
}

#[derive(Clone, Default)]
pub struct PhaseRegistry {
    phases: Vec<PhaseContract>,
}

impl PhaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, contract: PhaseContract) -> Result<(), RegistryError> {
        if !is_known_phase(&contract.name) {
            return Err(RegistryError::UnknownPhase {
                phase: contract.name,
            });
        }
        if self.get(&contract.name).is_some() {
            return Err(RegistryError::Duplicate {
                phase: contract.name,
            });
        }
        self.phases.push(contract);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PhaseContract> {
        self.phases.iter().find(|contract| contract.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.phases.iter().map(|contract| contract.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhaseContract> {
        self.phases.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn first_incomplete(&self, state: &SageState) -> Option<&PhaseContract> {
        self.phases.iter().find(|contract| {
            !state
                .phase(&contract.name)
                .is_some_and(|entry| entry.is_complete())
        })
    }

    pub fn all_complete(&self, state: &SageState) -> bool {
        self.first_incomplete(state).is_none()
    }
}
