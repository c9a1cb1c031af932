use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub is_safe: bool,
    pub is_in_scope: bool,
    pub reasons: Vec<String>,
}

impl GuardrailResult {
    pub fn passed(&self) -> bool {
        self.is_safe && self.is_in_scope
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatingDecision {
    #[serde(rename = "go")]
    Go,
    #[serde(rename = "no-go")]
    NoGo,
    #[serde(rename = "needs-input")]
    NeedsInput,
    #[serde(rename = "needs-human")]
    NeedsHuman,
}

impl GatingDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::NoGo => "no-go",
            Self::NeedsInput => "needs-input",
            Self::NeedsHuman => "needs-human",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "go" => Ok(Self::Go),
            "no-go" => Ok(Self::NoGo),
            "needs-input" => Ok(Self::NeedsInput),
            "needs-human" => Ok(Self::NeedsHuman),
            other => Err(format!(
                "gating decision must be one of: go, no-go, needs-input, needs-human (got `{other}`)"
            )),
        }
    }

    pub fn from_guardrail(result: &GuardrailResult) -> Self {
        if result.passed() {
            Self::Go
        } else {
            Self::NoGo
        }
    }
}

impl std::fmt::Display for GatingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatingContext {
    #[serde(default)]
    pub original_input: String,
    #[serde(default)]
    pub guardrail: Option<GuardrailResult>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub decision: Option<GatingDecision>,
}

impl GatingContext {
    pub fn with_original_input(&self, input: &str) -> Self {
        let mut next = self.clone();
        if next.original_input.is_empty() {
            next.original_input = input.to_string();
        }
        next
    }

    pub fn guardrails_ran(&self) -> bool {
        self.guardrail.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(confidence) = self.confidence {
            if !(0.01..=0.99).contains(&confidence) {
                return Err(format!(
                    "gating.confidence must be between 0.01 and 0.99 (got {confidence})"
                ));
            }
        }
        if let Some(guardrail) = &self.guardrail {
            if guardrail.reasons.is_empty() {
                return Err("gating.guardrail.reasons must be non-empty".to_string());
            }
        }
        Ok(())
    }
}
