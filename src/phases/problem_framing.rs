use super::PhaseContract;
use crate::agents::{Agent, ProblemFrame};
use crate::contract::OutputSchema;
use crate::nodes::PhaseNode;
use std::sync::Arc;

pub const PROBLEM_FRAMING: &str = "problem_framing";

pub fn problem_framing_contract(agent: Arc<dyn Agent>, max_context_items: usize) -> PhaseContract {
    let node = PhaseNode::<ProblemFrame>::new(PROBLEM_FRAMING, agent, max_context_items);
    PhaseContract::new(PROBLEM_FRAMING, ProblemFrame::NAME, Arc::new(node))
}
