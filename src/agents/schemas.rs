use crate::contract::OutputSchema;
use crate::state::{AmbiguityItem, ClarificationResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

fn string_list_schema() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProblemFrame {
    pub business_domain: String,
    pub primary_outcome: String,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub current_pain: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub confidence: f64,
}

impl OutputSchema for ProblemFrame {
    const NAME: &'static str = "ProblemFrame";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "business_domain": {"type": "string"},
                "primary_outcome": {"type": "string"},
                "actors": string_list_schema(),
                "current_pain": string_list_schema(),
                "constraints": string_list_schema(),
                "confidence": {"type": "number", "minimum": 0.01, "maximum": 0.99}
            },
            "required": ["business_domain", "primary_outcome", "confidence"],
            "additionalProperties": false
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.business_domain.trim().is_empty() {
            return Err("business_domain must be non-empty".to_string());
        }
        if self.primary_outcome.trim().is_empty() {
            return Err("primary_outcome must be non-empty".to_string());
        }
        if !(0.01..=0.99).contains(&self.confidence) {
            return Err(format!(
                "confidence must be between 0.01 and 0.99, got {}",
                self.confidence
            ));
        }
        Ok(())
    }
}

/// Raw scan output. Items are range-checked one by one by the scan node so a
/// single bad item does not discard the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityScanOutput {
    #[serde(default)]
    pub ambiguities: Vec<Value>,
}

impl AmbiguityScanOutput {
    pub fn split_items(&self) -> (Vec<AmbiguityItem>, Vec<String>) {
        let mut valid = Vec::new();
        let mut rejected = Vec::new();
        for (index, raw) in self.ambiguities.iter().enumerate() {
            let parsed = serde_json::from_value::<AmbiguityItem>(raw.clone())
                .map_err(|err| err.to_string())
                .and_then(|item| item.validate().map(|()| item));
            match parsed {
                Ok(item) => valid.push(item),
                Err(reason) => rejected.push(format!("item {index}: {reason}")),
            }
        }
        (valid, rejected)
    }
}

impl OutputSchema for AmbiguityScanOutput {
    const NAME: &'static str = "AmbiguityScan";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "ambiguities": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "key": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                            "description": {"type": "string"},
                            "clarifying_question": {"type": "string"},
                            "resolution_assumption": {"type": "string"},
                            "resolution_impact_direction": {"type": "string", "enum": ["++", "+", "0", "-", "--"]},
                            "resolution_impact_value": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                            "importance": {"type": "number", "minimum": 0.01, "maximum": 0.99},
                            "confidence": {"type": "number", "minimum": 0.01, "maximum": 0.99}
                        },
                        "required": [
                            "key", "description", "clarifying_question", "resolution_assumption",
                            "resolution_impact_direction", "resolution_impact_value",
                            "importance", "confidence"
                        ]
                    }
                }
            },
            "required": ["ambiguities"]
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawClarificationOutput {
    Batch { responses: Vec<ClarificationResponse> },
    Single(ClarificationResponse),
}

impl From<RawClarificationOutput> for ClarificationOutput {
    fn from(raw: RawClarificationOutput) -> Self {
        let responses = match raw {
            RawClarificationOutput::Batch { responses } => responses,
            RawClarificationOutput::Single(response) => vec![response],
        };
        Self { responses }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawClarificationOutput")]
pub struct ClarificationOutput {
    pub responses: Vec<ClarificationResponse>,
}

impl OutputSchema for ClarificationOutput {
    const NAME: &'static str = "ClarificationResponses";

    fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "responses": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "clarified_input": {"type": ["string", "null"]},
                            "clarified_keys": {
                                "type": "array",
                                "items": {"type": "array", "items": {"type": "string"}}
                            },
                            "clarification_output": {"type": ["string", "null"]}
                        },
                        "required": ["clarified_keys"]
                    }
                }
            },
            "required": ["responses"]
        })
    }
}
