use super::{trace, AMBIGUITY_SUPERVISOR};
use crate::agents::{Agent, AgentInput, ClarificationOutput};
use crate::contract::{extract_structured_response, parse_structured};
use crate::graph::{Command, Node, RuntimeContext};
use crate::state::{
    build_llm_messages, is_latest_message_human, latest_user_input, AmbiguityContext,
    AmbiguityKey, ClarificationResponse, EventKind, Message, SageState, StateUpdate,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

const FALLBACK_QUESTION: &str = "Could you clarify your request?";

/// Fills in `clarified_input`, keeps only detected keys, and falls back to every
/// pending key when the agent clarified the input without naming keys.
pub fn normalize_clarification_responses(
    responses: Vec<ClarificationResponse>,
    latest_input: &str,
    detected: &BTreeSet<AmbiguityKey>,
    pending: &[AmbiguityKey],
) -> Vec<ClarificationResponse> {
    responses
        .into_iter()
        .map(|response| {
            let supplied_input = response
                .clarified_input
                .filter(|input| !input.trim().is_empty());
            let mut seen = BTreeSet::new();
            let mut keys: Vec<AmbiguityKey> = response
                .clarified_keys
                .into_iter()
                .filter(|key| detected.contains(key) && seen.insert(key.clone()))
                .collect();
            if keys.is_empty() && supplied_input.is_some() {
                keys = pending.to_vec();
            }
            ClarificationResponse {
                clarified_input: Some(supplied_input.unwrap_or_else(|| latest_input.to_string())),
                clarified_keys: keys,
                clarification_output: response
                    .clarification_output
                    .filter(|output| !output.trim().is_empty()),
            }
        })
        .collect()
}

fn settle_round(next: &mut AmbiguityContext, max_rounds: u32) {
    if next.pending_keys().is_empty() {
        next.eligible = true;
        next.exhausted = false;
    } else {
        next.eligible = false;
        next.exhausted = next.clarification_round >= max_rounds;
    }
}

pub struct AmbiguityClarificationNode {
    agent: Arc<dyn Agent>,
    max_rounds: u32,
}

impl AmbiguityClarificationNode {
    const OWNER: &'static str = "ambiguity_clarification";

    pub fn new(agent: Arc<dyn Agent>, max_rounds: u32) -> Self {
        Self { agent, max_rounds }
    }

    fn clarify(&self, input: &AgentInput) -> Result<ClarificationOutput, String> {
        let result = self.agent.invoke(input).map_err(|err| err.to_string())?;
        let structured = extract_structured_response(&result)
            .ok_or_else(|| "missing structured response".to_string())?;
        parse_structured::<ClarificationOutput>(structured).map_err(|err| err.to_string())
    }
}

impl Node for AmbiguityClarificationNode {
    fn owner(&self) -> &str {
        Self::OWNER
    }

    fn run(&self, state: &SageState, runtime: &RuntimeContext) -> Command {
        let ambiguity = &state.ambiguity;
        let phase = ambiguity.target_step.as_deref();
        let pending = ambiguity.pending_keys();
        if pending.is_empty() {
            let mut next = ambiguity.clone();
            next.eligible = true;
            return Command::goto(AMBIGUITY_SUPERVISOR)
                .with_update(StateUpdate::new().with_ambiguity(next));
        }

        let user_input = latest_user_input(&state.messages).unwrap_or_default();
        let input = AgentInput::new(user_input, build_llm_messages(&state.messages))
            .with_value("user_input", json!(user_input))
            .with_value("keys_to_clarify", json!(pending))
            .with_value("ambiguous_items", json!(ambiguity.pending_questions()))
            .with_value("phase", json!(phase.unwrap_or_default()));

        let mut next = ambiguity.clone();
        next.clarification_round += 1;
        let mut update = StateUpdate::new();

        match self.clarify(&input) {
            Ok(output) => {
                let responses = normalize_clarification_responses(
                    output.responses,
                    user_input,
                    &ambiguity.detected_keys(),
                    &pending,
                );
                for response in &responses {
                    if let Some(text) = &response.clarification_output {
                        update = update.with_message(Message::ai(text.clone()));
                    }
                }
                next.resolved.extend(responses);
            }
            Err(reason) => {
                runtime.log.warn(
                    "ambiguity_clarification.failed",
                    &[("phase", json!(phase)), ("reason", json!(reason))],
                );
                update = update
                    .with_error(format!("ambiguity_clarification: {reason}"))
                    .merge(trace(
                        Self::OWNER,
                        EventKind::Error,
                        "Clarification agent failed.",
                        phase,
                        &[("reason", json!(reason))],
                    ));
            }
        }

        settle_round(&mut next, self.max_rounds);
        let remaining = next.pending_keys();
        runtime.log.info(
            "ambiguity_clarification.round",
            &[
                ("phase", json!(phase)),
                ("round", json!(next.clarification_round)),
                ("pending", json!(remaining)),
            ],
        );
        let event = trace(
            Self::OWNER,
            EventKind::Progress,
            &format!("Clarification round {} finished.", next.clarification_round),
            phase,
            &[("pending", json!(remaining))],
        );
        Command::goto(AMBIGUITY_SUPERVISOR).with_update(update.with_ambiguity(next).merge(event))
    }
}

pub struct ExternalClarificationNode {
    max_rounds: u32,
}

impl ExternalClarificationNode {
    const OWNER: &'static str = "ambiguity_clarification_external";

    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }
}

impl Node for ExternalClarificationNode {
    fn owner(&self) -> &str {
        Self::OWNER
    }

    fn run(&self, state: &SageState, runtime: &RuntimeContext) -> Command {
        let ambiguity = &state.ambiguity;
        let phase = ambiguity.target_step.as_deref();
        let pending = ambiguity.pending_keys();
        let mut next = ambiguity.clone();
        if pending.is_empty() {
            next.eligible = true;
            next.awaiting_user = false;
            return Command::goto(AMBIGUITY_SUPERVISOR)
                .with_update(StateUpdate::new().with_ambiguity(next));
        }

        if !ambiguity.awaiting_user || !is_latest_message_human(&state.messages) {
            let question = ambiguity
                .current_clarifying_question()
                .unwrap_or_else(|| FALLBACK_QUESTION.to_string());
            next.awaiting_user = true;
            runtime.log.info(
                "ambiguity_clarification_external.asked",
                &[("phase", json!(phase)), ("pending", json!(pending))],
            );
            return Command::end().with_update(
                StateUpdate::new()
                    .with_ambiguity(next)
                    .with_message(Message::ai(format!("Clarification needed: {question}")))
                    .merge(trace(
                        Self::OWNER,
                        EventKind::Decision,
                        "Waiting for the user to clarify.",
                        phase,
                        &[("pending", json!(pending))],
                    )),
            );
        }

        let reply = latest_user_input(&state.messages).unwrap_or_default();
        next.resolved.push(ClarificationResponse {
            clarified_input: Some(reply.to_string()),
            clarified_keys: pending.clone(),
            clarification_output: None,
        });
        next.awaiting_user = false;
        next.clarification_round += 1;
        settle_round(&mut next, self.max_rounds);
        Command::goto(AMBIGUITY_SUPERVISOR).with_update(
            StateUpdate::new().with_ambiguity(next).merge(trace(
                Self::OWNER,
                EventKind::Progress,
                "Recorded the user's clarification.",
                phase,
                &[("keys", json!(pending))],
            )),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_falls_back_to_pending_keys_when_agent_omits_them() {
        let detected: BTreeSet<AmbiguityKey> =
            [AmbiguityKey::from("scope/channels/coverage")].into_iter().collect();
        let pending: Vec<AmbiguityKey> = detected.iter().cloned().collect();
        let responses = vec![
            ClarificationResponse {
                clarified_input: Some("Online and in-store".to_string()),
                clarified_keys: Vec::new(),
                clarification_output: None,
            },
            ClarificationResponse {
                clarified_input: None,
                clarified_keys: vec![AmbiguityKey::from("unknown/key")],
                clarification_output: Some(" ".to_string()),
            },
        ];

        let normalized =
            normalize_clarification_responses(responses, "latest", &detected, &pending);

        assert_eq!(normalized[0].clarified_keys, pending);
        assert!(normalized[1].clarified_keys.is_empty());
        assert_eq!(normalized[1].clarified_input.as_deref(), Some("latest"));
        assert_eq!(normalized[1].clarification_output, None);
    }
}
