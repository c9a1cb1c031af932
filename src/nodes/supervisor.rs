use super::{trace, AMBIGUITY_CHECK, CHECKING_AMBIGUITIES_MESSAGE, GUARDRAILS_CHECK, SUPERVISOR};
use crate::graph::{Command, Node, RuntimeContext};
use crate::phases::PhaseRegistry;
use crate::state::{
    count_human_messages, is_latest_message_human, EventKind, Message, PhaseEntry, PhaseStatus,
    SageState, StateUpdate,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct SupervisorNode {
    registry: Arc<PhaseRegistry>,
    hilp_enabled: bool,
}

impl SupervisorNode {
    pub fn new(registry: Arc<PhaseRegistry>, hilp_enabled: bool) -> Self {
        Self {
            registry,
            hilp_enabled,
        }
    }
}

/// A phase that failed during the current user turn is not retried until the user speaks again.
fn failed_this_turn(entry: &PhaseEntry, state: &SageState) -> bool {
    if entry.status != PhaseStatus::Stale || !entry.has_error() {
        return false;
    }
    let turn = entry.error.get("turn").and_then(Value::as_u64);
    turn.is_some_and(|turn| turn >= count_human_messages(&state.messages) as u64)
}

fn phase_failure_message(phase: &str) -> String {
    format!(
        "Unable to finish {} right now. Please add more detail and try again.",
        phase.replace('_', " ")
    )
}

fn last_message_is(state: &SageState, text: &str) -> bool {
    state
        .messages
        .last()
        .is_some_and(|message| message.is_ai() && message.content == text)
}

impl Node for SupervisorNode {
    fn owner(&self) -> &str {
        SUPERVISOR
    }

    fn run(&self, state: &SageState, runtime: &RuntimeContext) -> Command {
        let Some(guardrail) = state.gating.guardrail.as_ref() else {
            return Command::goto(GUARDRAILS_CHECK).with_update(trace(
                SUPERVISOR,
                EventKind::Routing,
                "Guardrails have not run; routing to guardrails check.",
                None,
                &[],
            ));
        };
        if !guardrail.passed() {
            return Command::end().with_update(trace(
                SUPERVISOR,
                EventKind::Decision,
                "Request was rejected by guardrails; ending run.",
                None,
                &[("reasons", json!(guardrail.reasons))],
            ));
        }

        let Some(contract) = self.registry.first_incomplete(state) else {
            runtime.log.info("supervisor.all_phases_complete", &[]);
            return Command::end().with_update(trace(
                SUPERVISOR,
                EventKind::Decision,
                "All phases complete.",
                None,
                &[("phases", json!(self.registry.names()))],
            ));
        };
        let phase = contract.name.as_str();

        if let Some(entry) = state.phase(phase).filter(|entry| failed_this_turn(entry, state)) {
            runtime.log.warn(
                "supervisor.phase_failed",
                &[("phase", json!(phase)), ("code", json!(entry.error_code()))],
            );
            let notice = phase_failure_message(phase);
            let mut update = trace(
                SUPERVISOR,
                EventKind::Decision,
                &format!("Phase {phase} failed this turn; ending run."),
                Some(phase),
                &[("code", json!(entry.error_code()))],
            );
            if !last_message_is(state, &notice) {
                update = update.with_message(Message::ai(notice));
            }
            return Command::end().with_update(update);
        }

        if !contract.clarification_enabled {
            return Command::goto(phase).with_update(trace(
                SUPERVISOR,
                EventKind::Routing,
                &format!("Clarification disabled; routing to {phase}."),
                Some(phase),
                &[],
            ));
        }

        let ambiguity = &state.ambiguity;
        if ambiguity.is_target(phase) {
            if ambiguity.checked && ambiguity.eligible && ambiguity.pending_keys().is_empty() {
                runtime
                    .log
                    .info("supervisor.routing.phase_start", &[("phase", json!(phase))]);
                return Command::goto(phase).with_update(trace(
                    SUPERVISOR,
                    EventKind::Routing,
                    &format!("Ambiguity preflight passed; routing to {phase}."),
                    Some(phase),
                    &[],
                ));
            }
            if ambiguity.exhausted && !is_latest_message_human(&state.messages) {
                return Command::end().with_update(trace(
                    SUPERVISOR,
                    EventKind::Decision,
                    "Clarification exhausted; waiting for new input.",
                    Some(phase),
                    &[],
                ));
            }
            if !ambiguity.exhausted {
                return Command::goto(AMBIGUITY_CHECK).with_update(trace(
                    SUPERVISOR,
                    EventKind::Routing,
                    "Continuing ambiguity preflight.",
                    Some(phase),
                    &[("round", json!(ambiguity.clarification_round))],
                ));
            }
        }

        let mut reset = ambiguity.reset_for(phase);
        reset.hilp_enabled = self.hilp_enabled;
        runtime
            .log
            .info("supervisor.routing.ambiguity_check", &[("phase", json!(phase))]);
        Command::goto(AMBIGUITY_CHECK).with_update(
            StateUpdate::new()
                .with_ambiguity(reset)
                .with_message(Message::ai(CHECKING_AMBIGUITIES_MESSAGE))
                .merge(trace(
                    SUPERVISOR,
                    EventKind::Routing,
                    &format!("Starting ambiguity preflight for {phase}."),
                    Some(phase),
                    &[],
                )),
        )
    }
}
