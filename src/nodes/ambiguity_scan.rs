use super::{trace, AMBIGUITY_SUPERVISOR};
use crate::agents::{Agent, AgentInput, AmbiguityScanOutput};
use crate::contract::{extract_structured_response, parse_structured};
use crate::evidence::collect_phase_evidence;
use crate::graph::{Command, Node, RuntimeContext};
use crate::state::{
    build_llm_messages, latest_user_input, AmbiguityItem, EventKind, SageState, StateUpdate,
};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

const OWNER: &str = "ambiguity_scan";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanThresholds {
    pub importance: f64,
    pub confidence: f64,
    pub max_selected: usize,
}

impl Default for ScanThresholds {
    fn default() -> Self {
        Self {
            importance: 0.9,
            confidence: 0.9,
            max_selected: 3,
        }
    }
}

pub fn select_ambiguities(items: Vec<AmbiguityItem>, thresholds: &ScanThresholds) -> Vec<AmbiguityItem> {
    let mut selected: Vec<AmbiguityItem> = items
        .into_iter()
        .filter(|item| {
            item.importance >= thresholds.importance && item.confidence >= thresholds.confidence
        })
        .collect();
    selected.sort_by(|left, right| {
        right
            .importance
            .partial_cmp(&left.importance)
            .unwrap_or(Ordering::Equal)
            .then(
                right
                    .confidence
                    .partial_cmp(&left.confidence)
                    .unwrap_or(Ordering::Equal),
            )
    });
    let mut seen = BTreeSet::new();
    selected.retain(|item| seen.insert(item.key.clone()));
    selected.truncate(thresholds.max_selected);
    selected
}

pub struct AmbiguityScanNode {
    agent: Arc<dyn Agent>,
    thresholds: ScanThresholds,
    max_context_items: usize,
}

impl AmbiguityScanNode {
    pub fn new(agent: Arc<dyn Agent>, thresholds: ScanThresholds, max_context_items: usize) -> Self {
        Self {
            agent,
            thresholds,
            max_context_items,
        }
    }

    fn scan(&self, input: &AgentInput) -> Result<AmbiguityScanOutput, String> {
        let result = self.agent.invoke(input).map_err(|err| err.to_string())?;
        let structured = extract_structured_response(&result)
            .ok_or_else(|| "missing structured response".to_string())?;
        parse_structured::<AmbiguityScanOutput>(structured).map_err(|err| err.to_string())
    }
}

impl Node for AmbiguityScanNode {
    fn owner(&self) -> &str {
        OWNER
    }

    fn run(&self, state: &SageState, runtime: &RuntimeContext) -> Command {
        let Some(phase) = state.ambiguity.target_step.as_deref() else {
            return Command::goto(AMBIGUITY_SUPERVISOR);
        };
        let bundle = collect_phase_evidence(
            state,
            phase,
            self.max_context_items,
            runtime.store(),
            &runtime.log,
        );
        let task_input = latest_user_input(&state.messages).unwrap_or_default();
        let input = AgentInput::new(task_input, build_llm_messages(&state.messages))
            .with_context_docs(bundle.context_docs)
            .with_value("phase", json!(phase));

        let mut next = state.ambiguity.clone();
        next.checked = true;
        next.resolved = Vec::new();
        next.exhausted = false;
        next.awaiting_user = false;
        next.clarification_round = 0;
        next.last_scan_retrieval_round = next.context_retrieval_round;
        let entry = state.phase(phase).cloned().unwrap_or_default().with_ambiguity_checked();

        match self.scan(&input) {
            Ok(output) => {
                let (items, rejected) = output.split_items();
                if !rejected.is_empty() {
                    runtime.log.warn(
                        "ambiguity_scan.invalid_items",
                        &[("phase", json!(phase)), ("rejected", json!(rejected))],
                    );
                }
                let selected = select_ambiguities(items, &self.thresholds);
                let keys: Vec<String> = selected.iter().map(|item| item.key.to_string()).collect();
                next.eligible = selected.is_empty();
                next.detected = selected;
                runtime.log.info(
                    "ambiguity_scan.completed",
                    &[("phase", json!(phase)), ("selected", json!(keys))],
                );
                Command::goto(AMBIGUITY_SUPERVISOR).with_update(
                    StateUpdate::new()
                        .with_ambiguity(next)
                        .with_phase(phase, entry)
                        .merge(trace(
                            OWNER,
                            EventKind::Progress,
                            &format!("Ambiguities detected: {}.", keys.len()),
                            Some(phase),
                            &[("keys", json!(keys)), ("rejected", json!(rejected.len()))],
                        )),
                )
            }
            Err(reason) => {
                runtime.log.warn(
                    "ambiguity_scan.failed",
                    &[("phase", json!(phase)), ("reason", json!(reason))],
                );
                next.detected = Vec::new();
                next.eligible = true;
                Command::goto(AMBIGUITY_SUPERVISOR).with_update(
                    StateUpdate::new()
                        .with_ambiguity(next)
                        .with_phase(phase, entry)
                        .with_error(format!("ambiguity_scan: {reason}"))
                        .merge(trace(
                            OWNER,
                            EventKind::Error,
                            "Ambiguity scan failed; continuing without clarification.",
                            Some(phase),
                            &[("reason", json!(reason))],
                        )),
                )
            }
        }
    }
}
