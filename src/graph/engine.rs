use super::{Command, GraphError, Node, RuntimeContext, END};
use crate::contract::validate_state_update;
use crate::state::{SageState, StateUpdate};
use std::collections::BTreeMap;
use std::sync::Arc;

pub enum GraphNode {
    Leaf(Arc<dyn Node>),
    Subgraph(StateGraph),
}

#[derive(Debug, Clone, Default)]
pub struct RunTracker {
    limit: usize,
    steps: usize,
    visited: Vec<String>,
    snapshots: Option<Vec<SageState>>,
}

impl RunTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn recording(limit: usize) -> Self {
        Self {
            snapshots: Some(Vec::new()),
            ..Self::new(limit)
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    pub fn into_parts(self) -> (usize, Vec<String>, Vec<SageState>) {
        (self.steps, self.visited, self.snapshots.unwrap_or_default())
    }

    fn step(&mut self, node: &str) -> Result<(), GraphError> {
        if self.steps >= self.limit {
            return Err(GraphError::StepLimitExceeded {
                limit: self.limit,
                node: node.to_string(),
            });
        }
        self.steps += 1;
        self.visited.push(node.to_string());
        Ok(())
    }

    fn observe(&mut self, state: &SageState) {
        if let Some(snapshots) = self.snapshots.as_mut() {
            snapshots.push(state.clone());
        }
    }
}

enum Exit {
    End,
    Parent(String),
}

/// Nodes routed purely by [`Command::goto`]. A subgraph that routes to a name it
/// does not contain hands control back to its parent.
pub struct StateGraph {
    name: String,
    entry: String,
    nodes: BTreeMap<String, GraphNode>,
}

impl StateGraph {
    pub fn new(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn add_node(mut self, name: &str, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(name.to_string(), GraphNode::Leaf(node));
        self
    }

    pub fn add_subgraph(mut self, graph: StateGraph) -> Self {
        self.nodes
            .insert(graph.name.clone(), GraphNode::Subgraph(graph));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    pub fn subgraph(&self, name: &str) -> Option<&StateGraph> {
        match self.nodes.get(name) {
            Some(GraphNode::Subgraph(graph)) => Some(graph),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        if !self.contains(&self.entry) {
            return Err(GraphError::MissingEntry {
                graph: self.name.clone(),
                entry: self.entry.clone(),
            });
        }
        self.nodes.values().try_for_each(|node| match node {
            GraphNode::Subgraph(graph) => graph.validate(),
            GraphNode::Leaf(_) => Ok(()),
        })
    }

    pub fn run(
        &self,
        state: &mut SageState,
        runtime: &RuntimeContext,
        tracker: &mut RunTracker,
    ) -> Result<(), GraphError> {
        match self.run_from(state, &self.entry, runtime, tracker, true)? {
            Exit::End => Ok(()),
            Exit::Parent(target) => Err(GraphError::UnknownNode {
                graph: self.name.clone(),
                node: self.entry.clone(),
                target,
            }),
        }
    }

    fn run_from(
        &self,
        state: &mut SageState,
        start: &str,
        runtime: &RuntimeContext,
        tracker: &mut RunTracker,
        is_root: bool,
    ) -> Result<Exit, GraphError> {
        let mut current = start.to_string();
        let mut previous = start.to_string();
        loop {
            let Some(node) = self.nodes.get(&current) else {
                if is_root {
                    return Err(GraphError::UnknownNode {
                        graph: self.name.clone(),
                        node: previous,
                        target: current,
                    });
                }
                return Ok(Exit::Parent(current));
            };
            let goto = match node {
                GraphNode::Leaf(node) => {
                    tracker.step(&current)?;
                    let Command { update, goto } = node.run(state, runtime);
                    validate_state_update(&update, node.owner()).map_err(|source| {
                        runtime.log.error(
                            "graph.invalid_update",
                            &[
                                ("node", serde_json::json!(current)),
                                ("error", serde_json::json!(source.to_string())),
                            ],
                        );
                        GraphError::InvalidUpdate {
                            node: current.clone(),
                            source,
                        }
                    })?;
                    state.apply(update);
                    tracker.observe(state);
                    goto
                }
                GraphNode::Subgraph(graph) => {
                    let mut inner = state.clone();
                    let exit = graph.run_from(&mut inner, &graph.entry, runtime, tracker, false)?;
                    let update = StateUpdate::diff(state, &inner);
                    state.apply(update);
                    match exit {
                        Exit::End => return Ok(Exit::End),
                        Exit::Parent(target) => target,
                    }
                }
            };
            if goto == END {
                return Ok(Exit::End);
            }
            previous = std::mem::replace(&mut current, goto);
        }
    }
}
