use super::{trace, SUPERVISOR};
use crate::agents::{Agent, AgentInput};
use crate::contract::{
    extract_structured_response, invalidate_downstream_phases, parse_structured, OutputSchema,
};
use crate::evidence::{collect_phase_evidence, evidence_to_items};
use crate::graph::{Command, Node, RuntimeContext};
use crate::state::{
    build_llm_messages, count_human_messages, latest_user_input, EventKind, PhaseEntry,
    PhaseStatus, SageState, StateUpdate,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

struct PhaseFailure {
    code: &'static str,
    message: String,
    raw_output: Option<String>,
}

impl PhaseFailure {
    fn new(code: &'static str, message: impl Into<String>, raw_output: Option<String>) -> Self {
        Self {
            code,
            message: message.into(),
            raw_output,
        }
    }
}

pub struct PhaseNode<S> {
    phase: String,
    agent: Arc<dyn Agent>,
    max_context_items: usize,
    _schema: PhantomData<fn() -> S>,
}

impl<S: OutputSchema> PhaseNode<S> {
    pub fn new(phase: &str, agent: Arc<dyn Agent>, max_context_items: usize) -> Self {
        Self {
            phase: phase.to_string(),
            agent,
            max_context_items,
            _schema: PhantomData,
        }
    }

    fn produce(&self, input: &AgentInput) -> Result<(Map<String, Value>, Option<String>), PhaseFailure> {
        let result = self.agent.invoke(input).map_err(|err| {
            PhaseFailure::new("agent_invocation_failed", err.to_string(), None)
        })?;
        let Some(structured) = extract_structured_response(&result) else {
            return Err(PhaseFailure::new(
                "missing_structured_response",
                "agent returned no structured response",
                result.raw_output.clone(),
            ));
        };
        let raw_output = result
            .raw_output
            .clone()
            .or_else(|| Some(structured.to_string()));
        let model = parse_structured::<S>(structured).map_err(|err| {
            PhaseFailure::new("validation_failed", err.to_string(), raw_output.clone())
        })?;
        match serde_json::to_value(&model) {
            Ok(Value::Object(data)) => Ok((data, raw_output)),
            _ => Err(PhaseFailure::new(
                "validation_failed",
                format!("{} output must serialize to an object", S::NAME),
                raw_output,
            )),
        }
    }
}

impl<S: OutputSchema> Node for PhaseNode<S> {
    fn owner(&self) -> &str {
        &self.phase
    }

    fn run(&self, state: &SageState, runtime: &RuntimeContext) -> Command {
        let phase = self.phase.as_str();
        let task_input = latest_user_input(&state.messages).unwrap_or_default();
        let bundle = collect_phase_evidence(
            state,
            phase,
            self.max_context_items,
            runtime.store(),
            &runtime.log,
        );
        let mut update = StateUpdate::new();
        if bundle.missing_store {
            update = update.with_error(format!("{phase}: evidence store unavailable"));
        }

        let input = AgentInput::new(task_input, build_llm_messages(&state.messages))
            .with_context_docs(bundle.context_docs.clone());

        match self.produce(&input) {
            Ok((data, raw_output)) => {
                let mut entry = bundle.phase_entry.clone();
                entry.data = data;
                entry.error = Map::new();
                entry.status = PhaseStatus::Complete;
                entry.evidence = evidence_to_items(&bundle);
                entry.raw_output = raw_output;
                let entry = entry.with_snapshot();
                let version = entry.version();

                let mut phases = state.phases.clone();
                phases.insert(phase.to_string(), entry);
                let changed: BTreeMap<String, PhaseEntry> =
                    invalidate_downstream_phases(&phases, phase)
                        .into_iter()
                        .filter(|(name, entry)| state.phase(name) != Some(entry))
                        .collect();
                let invalidated: Vec<&String> =
                    changed.keys().filter(|name| name.as_str() != phase).collect();

                runtime.log.info(
                    "phase.completed",
                    &[
                        ("phase", json!(phase)),
                        ("version", json!(version)),
                        ("invalidated", json!(invalidated)),
                    ],
                );
                let event = trace(
                    phase,
                    EventKind::Progress,
                    &format!("Phase {phase} produced version {version}."),
                    Some(phase),
                    &[("version", json!(version)), ("invalidated", json!(invalidated))],
                );
                Command::goto(SUPERVISOR).with_update(update.with_phases(changed).merge(event))
            }
            Err(failure) => {
                let turn = count_human_messages(&state.messages);
                runtime.log.warn(
                    "phase.failed",
                    &[
                        ("phase", json!(phase)),
                        ("code", json!(failure.code)),
                        ("message", json!(failure.message)),
                    ],
                );
                let mut entry = bundle.phase_entry.with_failure(
                    failure.code,
                    &failure.message,
                    &[("turn", json!(turn))],
                );
                if failure.raw_output.is_some() {
                    entry.raw_output = failure.raw_output;
                }
                let event = trace(
                    phase,
                    EventKind::Error,
                    &format!("Phase {phase} failed."),
                    Some(phase),
                    &[("code", json!(failure.code))],
                );
                Command::goto(SUPERVISOR).with_update(
                    update
                        .with_phase(phase, entry)
                        .with_error(format!("{phase}: {}", failure.code))
                        .merge(event),
                )
            }
        }
    }
}
