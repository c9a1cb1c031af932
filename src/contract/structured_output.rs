use super::ContractError;
use crate::agents::AgentResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub trait OutputSchema: Sized + Serialize + DeserializeOwned {
    const NAME: &'static str;

    fn json_schema() -> Value;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

pub fn extract_structured_response(result: &AgentResult) -> Option<&Value> {
    result
        .structured_response
        .as_ref()
        .filter(|value| !value.is_null())
}

pub fn parse_structured<S: OutputSchema>(value: &Value) -> Result<S, ContractError> {
    let parsed: S =
        serde_json::from_value(value.clone()).map_err(|err| ContractError::SchemaValidation {
            schema: S::NAME.to_string(),
            reason: err.to_string(),
        })?;
    parsed
        .validate()
        .map_err(|reason| ContractError::SchemaValidation {
            schema: S::NAME.to_string(),
            reason,
        })?;
    Ok(parsed)
}
