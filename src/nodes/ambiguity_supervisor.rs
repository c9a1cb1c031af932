use super::{
    trace, AMBIGUITY_CLARIFICATION, AMBIGUITY_CLARIFICATION_EXTERNAL, AMBIGUITY_SCAN,
    RETRIEVE_CONTEXT, SUPERVISOR, UNABLE_TO_CLARIFY_MESSAGE,
};
use crate::graph::{Command, Node, RuntimeContext};
use crate::phases::PhaseRegistry;
use crate::state::{
    is_latest_message_human, AmbiguityContext, EventKind, Message, SageState, StateUpdate,
};
use serde_json::json;
use std::sync::Arc;

const OWNER: &str = "ambiguity_supervisor";

pub struct AmbiguitySupervisorNode {
    registry: Arc<PhaseRegistry>,
    max_rounds: u32,
    max_context_retrieval_rounds: u32,
}

impl AmbiguitySupervisorNode {
    pub fn new(registry: Arc<PhaseRegistry>, max_rounds: u32, max_context_retrieval_rounds: u32) -> Self {
        Self {
            registry,
            max_rounds,
            max_context_retrieval_rounds,
        }
    }

    fn exhausted(
        &self,
        state: &SageState,
        next: Option<AmbiguityContext>,
        phase: &str,
        runtime: &RuntimeContext,
    ) -> Command {
        runtime.log.warn(
            "ambiguity_supervisor.exhausted",
            &[
                ("phase", json!(phase)),
                ("pending", json!(state.ambiguity.pending_keys())),
            ],
        );
        let mut update = trace(
            OWNER,
            EventKind::Decision,
            "Clarification rounds exhausted.",
            Some(phase),
            &[("rounds", json!(state.ambiguity.clarification_round))],
        );
        if let Some(next) = next {
            update = update.with_ambiguity(next);
        }
        let already_sent = state
            .messages
            .last()
            .is_some_and(|message| message.is_ai() && message.content == UNABLE_TO_CLARIFY_MESSAGE);
        if !already_sent {
            update = update.with_message(Message::ai(UNABLE_TO_CLARIFY_MESSAGE));
        }
        Command::end().with_update(update)
    }
}

impl Node for AmbiguitySupervisorNode {
    fn owner(&self) -> &str {
        OWNER
    }

    fn run(&self, state: &SageState, runtime: &RuntimeContext) -> Command {
        let ambiguity = &state.ambiguity;
        let Some(phase) = ambiguity.target_step.as_deref() else {
            runtime.log.warn("ambiguity_supervisor.missing_target", &[]);
            return Command::goto(SUPERVISOR).with_update(trace(
                OWNER,
                EventKind::Error,
                "Ambiguity preflight has no target phase.",
                None,
                &[],
            ));
        };
        let Some(contract) = self.registry.get(phase) else {
            runtime
                .log
                .warn("ambiguity_supervisor.unknown_phase", &[("phase", json!(phase))]);
            return Command::end().with_update(trace(
                OWNER,
                EventKind::Error,
                &format!("Unknown phase {phase}; ending run."),
                Some(phase),
                &[],
            ));
        };

        if !ambiguity.checked {
            return Command::goto(AMBIGUITY_SCAN).with_update(trace(
                OWNER,
                EventKind::Routing,
                "Scanning for ambiguities.",
                Some(phase),
                &[],
            ));
        }

        if contract.allows_retrieval() {
            let has_evidence = state
                .phase(phase)
                .is_some_and(|entry| !entry.evidence.is_empty());
            if !has_evidence && ambiguity.context_retrieval_round < self.max_context_retrieval_rounds {
                let mut next = ambiguity.clone();
                next.context_retrieval_round += 1;
                return Command::goto(RETRIEVE_CONTEXT).with_update(
                    StateUpdate::new().with_ambiguity(next.clone()).merge(trace(
                        OWNER,
                        EventKind::Progress,
                        "Retrieving context.",
                        Some(phase),
                        &[("round", json!(next.context_retrieval_round))],
                    )),
                );
            }
            if has_evidence && ambiguity.last_scan_retrieval_round < ambiguity.context_retrieval_round {
                return Command::goto(AMBIGUITY_SCAN).with_update(trace(
                    OWNER,
                    EventKind::Routing,
                    "Rescanning ambiguities with retrieved context.",
                    Some(phase),
                    &[("round", json!(ambiguity.context_retrieval_round))],
                ));
            }
        }

        if ambiguity.exhausted {
            return self.exhausted(state, None, phase, runtime);
        }

        if ambiguity.pending_keys().is_empty() {
            let mut update = trace(
                OWNER,
                EventKind::Decision,
                "Ambiguity checks complete.",
                Some(phase),
                &[],
            );
            if !ambiguity.eligible {
                let mut next = ambiguity.clone();
                next.eligible = true;
                update = update.with_ambiguity(next);
            }
            return Command::goto(SUPERVISOR).with_update(update);
        }

        if ambiguity.hilp_enabled
            && ambiguity.awaiting_user
            && !is_latest_message_human(&state.messages)
        {
            return Command::end().with_update(trace(
                OWNER,
                EventKind::Decision,
                "Clarification pending; waiting for the user.",
                Some(phase),
                &[],
            ));
        }

        if ambiguity.clarification_round >= self.max_rounds {
            let mut next = ambiguity.clone();
            next.exhausted = true;
            next.eligible = false;
            return self.exhausted(state, Some(next), phase, runtime);
        }

        let target = if ambiguity.hilp_enabled {
            AMBIGUITY_CLARIFICATION_EXTERNAL
        } else {
            AMBIGUITY_CLARIFICATION
        };
        Command::goto(target).with_update(trace(
            OWNER,
            EventKind::Routing,
            &format!("Clarifying {} pending ambiguities.", ambiguity.pending_keys().len()),
            Some(phase),
            &[("round", json!(ambiguity.clarification_round))],
        ))
    }
}
