use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PHASE_STATUS_VALUES: [&str; 3] = ["pending", "complete", "stale"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Complete,
    Stale,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Stale => "stale",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "stale" => Ok(Self::Stale),
            other => Err(format!(
                "phase status must be one of: pending, complete, stale (got `{other}`)"
            )),
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub namespace: Vec<String>,
    pub key: String,
    #[serde(default)]
    pub score: f64,
}

impl EvidenceItem {
    pub fn new(namespace: Vec<String>, key: impl Into<String>, score: f64) -> Self {
        Self {
            namespace,
            key: key.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSnapshot {
    version: u32,
    timestamp: String,
    data: Map<String, Value>,
    error: Map<String, Value>,
    status: PhaseStatus,
    evidence: Vec<EvidenceItem>,
    raw_output: Option<String>,
}

impl PhaseSnapshot {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn error(&self) -> &Map<String, Value> {
        &self.error
    }

    pub fn status(&self) -> PhaseStatus {
        self.status
    }

    pub fn evidence(&self) -> &[EvidenceItem] {
        &self.evidence
    }

    pub fn raw_output(&self) -> Option<&str> {
        self.raw_output.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseEntry {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub error: Map<String, Value>,
    #[serde(default)]
    pub status: PhaseStatus,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
    #[serde(default)]
    pub raw_output: Option<String>,
    #[serde(default)]
    pub ambiguity_checked: bool,
    #[serde(default)]
    version: u32,
    #[serde(default)]
    history: Vec<PhaseSnapshot>,
}

impl PhaseEntry {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn history(&self) -> &[PhaseSnapshot] {
        &self.history
    }

    pub fn latest_snapshot(&self) -> Option<&PhaseSnapshot> {
        self.history.last()
    }

    pub fn is_complete(&self) -> bool {
        self.status == PhaseStatus::Complete
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn with_snapshot(&self) -> Self {
        let version = self.version + 1;
        let snapshot = PhaseSnapshot {
            version,
            timestamp: crate::shared::now_iso8601(),
            data: self.data.clone(),
            error: self.error.clone(),
            status: self.status,
            evidence: self.evidence.clone(),
            raw_output: self.raw_output.clone(),
        };
        let mut history = self.history.clone();
        history.push(snapshot);
        Self {
            version,
            history,
            ..self.clone()
        }
    }

    pub fn with_status(&self, status: PhaseStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn with_ambiguity_checked(&self) -> Self {
        Self {
            ambiguity_checked: true,
            ..self.clone()
        }
    }

    pub fn with_evidence(&self, evidence: Vec<EvidenceItem>) -> Self {
        Self {
            evidence,
            ..self.clone()
        }
    }

    pub fn with_failure(&self, code: &str, message: &str, extra: &[(&str, Value)]) -> Self {
        let mut error = Map::new();
        error.insert("code".to_string(), Value::String(code.to_string()));
        error.insert("message".to_string(), Value::String(message.to_string()));
        for (key, value) in extra {
            error.insert((*key).to_string(), value.clone());
        }
        Self {
            status: PhaseStatus::Stale,
            error,
            ..self.clone()
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.get("code").and_then(Value::as_str)
    }
}
