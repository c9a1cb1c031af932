use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::state::GuardrailResult;

pub const PASS_REASON: &str = "Passed all checks.";
pub const BLOCKED_REASON: &str = "Contains blocked or unsafe terms.";
pub const OUT_OF_SCOPE_REASON: &str = "Outside supported business / AI domains.";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardrailsFile {
    pub allowed_topics: Vec<String>,
    pub blocked_keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardrailsConfig {
    allowed_topics: Vec<String>,
    blocked_keywords: Vec<String>,
}

fn normalize_terms<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.as_ref().trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

impl GuardrailsConfig {
    pub fn new<S: AsRef<str>>(allowed_topics: &[S], blocked_keywords: &[S]) -> Self {
        Self {
            allowed_topics: normalize_terms(allowed_topics),
            blocked_keywords: normalize_terms(blocked_keywords),
        }
    }

    pub fn from_file(raw: &GuardrailsFile) -> Self {
        Self::new(&raw.allowed_topics, &raw.blocked_keywords)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        let file: GuardrailsFile = serde_yaml::from_str(raw)?;
        Ok(Self::from_file(&file))
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn allowed_topics(&self) -> &[String] {
        &self.allowed_topics
    }

    pub fn blocked_keywords(&self) -> &[String] {
        &self.blocked_keywords
    }
}

pub fn evaluate_guardrails(text: &str, config: &GuardrailsConfig) -> GuardrailResult {
    let normalized = text.to_lowercase();
    let is_safe = !config
        .blocked_keywords
        .iter()
        .any(|keyword| normalized.contains(keyword.as_str()));
    let is_in_scope = config
        .allowed_topics
        .iter()
        .any(|topic| normalized.contains(topic.as_str()));

    let mut reasons = Vec::new();
    if !is_safe {
        reasons.push(BLOCKED_REASON.to_string());
    }
    if !is_in_scope {
        reasons.push(OUT_OF_SCOPE_REASON.to_string());
    }
    if reasons.is_empty() {
        reasons.push(PASS_REASON.to_string());
    }
    GuardrailResult {
        is_safe,
        is_in_scope,
        reasons,
    }
}

pub fn rejection_message(result: &GuardrailResult) -> String {
    format!("Request rejected: {}", result.reasons.join(" "))
}
