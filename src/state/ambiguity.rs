use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmbiguityKey {
    Text(String),
    Path(Vec<String>),
}

/// Canonical `a/b/c` form. Segments are trimmed and empty segments dropped, so
/// `"scope / channels"` and `["scope", "channels"]` produce the same key.
pub fn format_ambiguity_key(raw: &RawAmbiguityKey) -> String {
    let segments: Vec<&str> = match raw {
        RawAmbiguityKey::Text(text) => text.split('/').collect(),
        RawAmbiguityKey::Path(parts) => parts
            .iter()
            .flat_map(|part| part.split('/'))
            .collect(),
    };
    segments
        .into_iter()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RawAmbiguityKey", into = "String")]
pub struct AmbiguityKey(String);

impl AmbiguityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> Vec<&str> {
        self.0.split('/').collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<RawAmbiguityKey> for AmbiguityKey {
    fn from(value: RawAmbiguityKey) -> Self {
        Self(format_ambiguity_key(&value))
    }
}

impl From<&str> for AmbiguityKey {
    fn from(value: &str) -> Self {
        RawAmbiguityKey::Text(value.to_string()).into()
    }
}

impl From<Vec<&str>> for AmbiguityKey {
    fn from(value: Vec<&str>) -> Self {
        RawAmbiguityKey::Path(value.into_iter().map(str::to_string).collect()).into()
    }
}

impl From<AmbiguityKey> for String {
    fn from(value: AmbiguityKey) -> Self {
        value.0
    }
}

impl std::fmt::Display for AmbiguityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactDirection {
    #[serde(rename = "++")]
    StrongPositive,
    #[serde(rename = "+")]
    Positive,
    #[serde(rename = "0")]
    Neutral,
    #[serde(rename = "-")]
    Negative,
    #[serde(rename = "--")]
    StrongNegative,
}

impl ImpactDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongPositive => "++",
            Self::Positive => "+",
            Self::Neutral => "0",
            Self::Negative => "-",
            Self::StrongNegative => "--",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityItem {
    pub key: AmbiguityKey,
    pub description: String,
    pub clarifying_question: String,
    pub resolution_assumption: String,
    pub resolution_impact_direction: ImpactDirection,
    pub resolution_impact_value: f64,
    pub importance: f64,
    pub confidence: f64,
}

impl AmbiguityItem {
    pub fn validate(&self) -> Result<(), String> {
        if self.key.is_empty() {
            return Err("ambiguity key must be non-empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.resolution_impact_value) {
            return Err(format!(
                "ambiguity `{}` resolution_impact_value must be between 0 and 1",
                self.key
            ));
        }
        if !(0.01..=0.99).contains(&self.importance) {
            return Err(format!(
                "ambiguity `{}` importance must be between 0.01 and 0.99",
                self.key
            ));
        }
        if !(0.01..=0.99).contains(&self.confidence) {
            return Err(format!(
                "ambiguity `{}` confidence must be between 0.01 and 0.99",
                self.key
            ));
        }
        Ok(())
    }

    pub fn question(&self) -> &str {
        if !self.clarifying_question.trim().is_empty() {
            return &self.clarifying_question;
        }
        if !self.description.trim().is_empty() {
            return &self.description;
        }
        self.key.as_str()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClarificationResponse {
    #[serde(default)]
    pub clarified_input: Option<String>,
    #[serde(default)]
    pub clarified_keys: Vec<AmbiguityKey>,
    #[serde(default)]
    pub clarification_output: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityContext {
    #[serde(default)]
    pub target_step: Option<String>,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub eligible: bool,
    #[serde(default)]
    pub detected: Vec<AmbiguityItem>,
    #[serde(default)]
    pub resolved: Vec<ClarificationResponse>,
    #[serde(default)]
    pub exhausted: bool,
    #[serde(default)]
    pub hilp_enabled: bool,
    #[serde(default)]
    pub awaiting_user: bool,
    #[serde(default)]
    pub clarification_round: u32,
    #[serde(default)]
    pub context_retrieval_round: u32,
    #[serde(default)]
    pub last_scan_retrieval_round: u32,
}

impl AmbiguityContext {
    pub fn is_target(&self, phase: &str) -> bool {
        self.target_step.as_deref() == Some(phase)
    }

    pub fn detected_keys(&self) -> BTreeSet<AmbiguityKey> {
        self.detected.iter().map(|item| item.key.clone()).collect()
    }

    pub fn clarified_keys(&self) -> BTreeSet<AmbiguityKey> {
        self.resolved
            .iter()
            .flat_map(|response| response.clarified_keys.iter().cloned())
            .collect()
    }

    /// Detected keys minus every key already covered by a clarification, in detection order.
    pub fn pending_keys(&self) -> Vec<AmbiguityKey> {
        let resolved = self.clarified_keys();
        let mut seen = BTreeSet::new();
        self.detected
            .iter()
            .map(|item| &item.key)
            .filter(|key| !resolved.contains(*key) && seen.insert((*key).clone()))
            .cloned()
            .collect()
    }

    pub fn pending_items(&self) -> Vec<&AmbiguityItem> {
        let pending: BTreeSet<AmbiguityKey> = self.pending_keys().into_iter().collect();
        let mut seen = BTreeSet::new();
        self.detected
            .iter()
            .filter(|item| pending.contains(&item.key) && seen.insert(item.key.clone()))
            .collect()
    }

    pub fn pending_questions(&self) -> Vec<String> {
        self.pending_items()
            .into_iter()
            .map(|item| item.question().to_string())
            .collect()
    }

    pub fn current_clarifying_question(&self) -> Option<String> {
        self.pending_questions().into_iter().next()
    }

    pub fn reset_for(&self, target_step: &str) -> Self {
        Self {
            target_step: Some(target_step.to_string()),
            hilp_enabled: self.hilp_enabled,
            ..Self::default()
        }
    }
}
