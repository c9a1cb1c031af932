#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("unknown SageState fields in update: {}", fields.join(", "))]
    UnknownFields { fields: Vec<String> },
    #[error("owner `{owner}` may not write `{field}`; allowed owners: {}", allowed.join(", "))]
    OwnershipViolation {
        field: String,
        owner: String,
        allowed: Vec<String>,
    },
    #[error("phase `{phase}` has invalid status `{status}`")]
    InvalidPhaseStatus { phase: String, status: String },
    #[error("phase update for `{phase}` is malformed: {reason}")]
    MalformedPhase { phase: String, reason: String },
    #[error("prompt is missing required placeholders: {}", missing.join(", "))]
    MissingPlaceholders { missing: Vec<String> },
    #[error("prompt order {actual:?} must end with {expected:?}")]
    PromptSuffixOrder {
        actual: Vec<String>,
        expected: Vec<String>,
    },
    #[error("few-shot examples invalid: {0}")]
    Examples(String),
    #[error("structured output `{schema}` failed validation: {reason}")]
    SchemaValidation { schema: String, reason: String },
}
