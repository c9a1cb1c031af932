use super::{trace, AMBIGUITY_SUPERVISOR};
use crate::agents::context_lookup;
use crate::graph::{Command, Node, RuntimeContext};
use crate::state::{latest_user_input, EventKind, SageState, StateUpdate};
use serde_json::json;

const OWNER: &str = "retrieve_context";

pub struct RetrieveContextNode {
    limit: usize,
}

impl RetrieveContextNode {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Node for RetrieveContextNode {
    fn owner(&self) -> &str {
        OWNER
    }

    fn run(&self, state: &SageState, runtime: &RuntimeContext) -> Command {
        let Some(phase) = state.ambiguity.target_step.as_deref() else {
            return Command::goto(AMBIGUITY_SUPERVISOR);
        };
        let Some(store) = runtime.store() else {
            runtime
                .log
                .warn("retrieve_context.missing_store", &[("phase", json!(phase))]);
            return Command::goto(AMBIGUITY_SUPERVISOR).with_update(trace(
                OWNER,
                EventKind::Error,
                "Evidence store unavailable; skipping retrieval.",
                Some(phase),
                &[],
            ));
        };

        let query = latest_user_input(&state.messages).unwrap_or_default().trim();
        if query.is_empty() {
            return Command::goto(AMBIGUITY_SUPERVISOR).with_update(trace(
                OWNER,
                EventKind::Progress,
                "No user input to retrieve context for.",
                Some(phase),
                &[],
            ));
        }

        match context_lookup(store, query, phase, self.limit) {
            Ok(docs) => {
                let evidence: Vec<_> = docs.iter().filter_map(|doc| doc.to_evidence_item()).collect();
                let count = evidence.len();
                runtime.log.info(
                    "retrieve_context.completed",
                    &[("phase", json!(phase)), ("items", json!(count))],
                );
                let mut update = trace(
                    OWNER,
                    EventKind::Progress,
                    &format!("Retrieved {count} context items."),
                    Some(phase),
                    &[("items", json!(count))],
                );
                if count > 0 {
                    let entry = state
                        .phase(phase)
                        .cloned()
                        .unwrap_or_default()
                        .with_evidence(evidence);
                    update = update.with_phase(phase, entry);
                }
                Command::goto(AMBIGUITY_SUPERVISOR).with_update(update)
            }
            Err(err) => {
                runtime.log.warn(
                    "retrieve_context.failed",
                    &[("phase", json!(phase)), ("error", json!(err.to_string()))],
                );
                Command::goto(AMBIGUITY_SUPERVISOR).with_update(
                    StateUpdate::new()
                        .with_error(format!("{phase}: context retrieval failed"))
                        .merge(trace(
                            OWNER,
                            EventKind::Error,
                            "Context retrieval failed.",
                            Some(phase),
                            &[("error", json!(err.to_string()))],
                        )),
                )
            }
        }
    }
}
