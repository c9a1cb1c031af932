use super::{trace, GUARDRAILS_CHECK, SUPERVISOR};
use crate::graph::{Command, Node, RuntimeContext};
use crate::guardrails::{evaluate_guardrails, rejection_message, GuardrailsConfig};
use crate::state::{latest_user_input, EventKind, GatingDecision, Message, SageState, StateUpdate};
use serde_json::json;

const OWNER: &str = "gating_guardrails";

pub struct GatingGuardrailsNode {
    config: GuardrailsConfig,
}

impl GatingGuardrailsNode {
    pub fn new(config: GuardrailsConfig) -> Self {
        Self { config }
    }
}

impl Node for GatingGuardrailsNode {
    fn owner(&self) -> &str {
        OWNER
    }

    fn run(&self, state: &SageState, runtime: &RuntimeContext) -> Command {
        let latest = latest_user_input(&state.messages).unwrap_or_default();
        let mut gating = state.gating.with_original_input(latest);
        let verdict = evaluate_guardrails(&gating.original_input, &self.config);
        gating.decision = Some(GatingDecision::from_guardrail(&verdict));
        gating.rationale = verdict.reasons.clone();
        gating.guardrail = Some(verdict.clone());
        if let Err(reason) = gating.validate() {
            runtime
                .log
                .error("gating.invalid_context", &[("reason", json!(reason))]);
            return Command::end().with_update(
                StateUpdate::new()
                    .with_error(format!("{OWNER}: {reason}"))
                    .merge(trace(OWNER, EventKind::Error, "Guardrail verdict was malformed.", None, &[])),
            );
        }

        let fields = [
            ("node", json!(GUARDRAILS_CHECK)),
            ("is_safe", json!(verdict.is_safe)),
            ("is_in_scope", json!(verdict.is_in_scope)),
            ("reasons", json!(verdict.reasons)),
        ];
        if verdict.passed() {
            runtime.log.info("gating.passed", &fields);
            return Command::goto(SUPERVISOR).with_update(
                StateUpdate::new()
                    .with_gating(gating)
                    .merge(trace(OWNER, EventKind::Decision, "Guardrails passed.", None, &fields)),
            );
        }

        runtime.log.warn("gating.rejected", &fields);
        Command::end().with_update(
            StateUpdate::new()
                .with_gating(gating)
                .with_message(Message::ai(rejection_message(&verdict)))
                .merge(trace(OWNER, EventKind::Decision, "Guardrails rejected the request.", None, &fields)),
        )
    }
}
