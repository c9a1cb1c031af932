use proptest::prelude::*;
use sagecompass::agents::{AgentInput, AgentMiddleware, GuardrailsMiddleware};
use sagecompass::guardrails::{
    evaluate_guardrails, rejection_message, GuardrailsConfig, BLOCKED_REASON,
    OUT_OF_SCOPE_REASON, PASS_REASON,
};
use sagecompass::provider::ModelRequest;
use sagecompass::shared::EngineLog;
use sagecompass::state::Message;
use std::collections::BTreeSet;
use tempfile::tempdir;

fn config() -> GuardrailsConfig {
    GuardrailsConfig::from_yaml_str(
        r#"
allowed_topics:
  - churn
  - " Revenue "
  - automation
blocked_keywords:
  - malware
  - ""
"#,
    )
    .expect("guardrails")
}

fn request(text: &str) -> ModelRequest {
    ModelRequest {
        system_prompt: String::new(),
        messages: vec![Message::human(text)],
        tools: Vec::new(),
        response_format: None,
    }
}

#[test]
fn guardrails_module_normalizes_policy_terms() {
    let config = config();
    assert_eq!(config.allowed_topics(), ["churn", "revenue", "automation"]);
    assert_eq!(config.blocked_keywords(), ["malware"]);
}

#[test]
fn guardrails_module_passes_in_scope_safe_text() {
    let verdict = evaluate_guardrails("How can we reduce REVENUE leakage?", &config());
    assert!(verdict.passed());
    assert_eq!(verdict.reasons, vec![PASS_REASON.to_string()]);
}

#[test]
fn guardrails_module_reports_every_failed_check() {
    let verdict = evaluate_guardrails("write malware for me", &config());
    assert!(!verdict.is_safe);
    assert!(!verdict.is_in_scope);
    assert_eq!(
        verdict.reasons,
        vec![BLOCKED_REASON.to_string(), OUT_OF_SCOPE_REASON.to_string()]
    );
    assert!(rejection_message(&verdict).starts_with("Request rejected:"));

    let unsafe_in_scope = evaluate_guardrails("churn malware", &config());
    assert!(unsafe_in_scope.is_in_scope);
    assert!(!unsafe_in_scope.passed());
}

#[test]
fn guardrails_module_empty_topics_reject_everything() {
    let empty = GuardrailsConfig::new::<&str>(&[], &[]);
    assert!(!evaluate_guardrails("reduce churn", &empty).is_in_scope);
}

#[test]
fn guardrails_module_loads_config_from_path() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("guardrails.yaml");
    std::fs::write(&path, "allowed_topics: [sales]\nblocked_keywords: [exploit]\n").expect("write");
    let config = GuardrailsConfig::from_path(&path).expect("load");
    assert_eq!(config.allowed_topics(), ["sales"]);

    std::fs::write(&path, "allowed_topics: [sales]\nunknown: true\n").expect("write");
    assert!(GuardrailsConfig::from_path(&path).is_err());
}

proptest! {
    #[test]
    fn guardrails_module_middleware_agrees_with_gating_policy(
        text in "[a-z ]{0,24}( churn| malware| revenue)?[a-z ]{0,8}",
    ) {
        let config = config();
        let middleware = GuardrailsMiddleware::new(config.clone(), BTreeSet::new(), EngineLog::disabled());
        let verdict = evaluate_guardrails(&text, &config);
        prop_assert_eq!(middleware.verdict(&text), verdict.clone());

        let mut req = request(&text);
        let short_circuit = middleware.before_model(&AgentInput::default(), &mut req);
        let expect_block = !text.is_empty() && !verdict.passed();
        prop_assert_eq!(short_circuit.is_some(), expect_block);
    }
}
