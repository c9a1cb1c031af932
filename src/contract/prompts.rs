use super::ContractError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const TASK_INPUT_PLACEHOLDER: &str = "{task_input}";
pub const OUTPUT_STUB_SUFFIX: &str = "Output:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptExample {
    pub task_input: String,
    #[serde(default)]
    pub output: Value,
}

impl PromptExample {
    fn is_stub(&self) -> bool {
        self.task_input.trim() == TASK_INPUT_PLACEHOLDER && output_is_empty(&self.output)
    }
}

fn output_is_empty(output: &Value) -> bool {
    match output {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn render_output(output: &Value) -> String {
    match output {
        _ if output_is_empty(output) => String::new(),
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub fn validate_prompt_placeholders(template: &str, required: &[&str]) -> Result<(), ContractError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !template.contains(&format!("{{{name}}}")))
        .map(|name| (*name).to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ContractError::MissingPlaceholders { missing })
    }
}

pub fn validate_prompt_suffix_order(
    prompt_names: &[&str],
    required_suffix: &[&str],
) -> Result<(), ContractError> {
    if prompt_names.ends_with(required_suffix) {
        return Ok(());
    }
    Err(ContractError::PromptSuffixOrder {
        actual: prompt_names.iter().map(|name| (*name).to_string()).collect(),
        expected: required_suffix
            .iter()
            .map(|name| (*name).to_string())
            .collect(),
    })
}

pub fn validate_examples(examples: &[PromptExample]) -> Result<(), ContractError> {
    let Some((stub, real)) = examples.split_last() else {
        return Err(ContractError::Examples(
            "examples list must not be empty".to_string(),
        ));
    };
    if !stub.is_stub() {
        return Err(ContractError::Examples(format!(
            "last example must be a stub with task_input `{TASK_INPUT_PLACEHOLDER}` and empty output"
        )));
    }
    if real.is_empty() {
        return Err(ContractError::Examples(
            "at least one real example must precede the stub".to_string(),
        ));
    }
    if let Some(position) = real.iter().position(PromptExample::is_stub) {
        return Err(ContractError::Examples(format!(
            "example {position} is a stub; only the last example may be empty"
        )));
    }
    Ok(())
}

/// Substitutes `{key}` for each key in `values` and leaves every other brace group intact.
pub fn render_placeholders(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut cursor = template;
    while let Some(start) = cursor.find('{') {
        rendered.push_str(&cursor[..start]);
        let after_open = &cursor[start + 1..];
        let replacement = after_open
            .find('}')
            .map(|close| &after_open[..close])
            .and_then(|token| values.get(token).map(|value| (token.len(), value)));
        match replacement {
            Some((token_len, value)) => {
                rendered.push_str(value);
                cursor = &after_open[token_len + 1..];
            }
            None => {
                rendered.push('{');
                cursor = after_open;
            }
        }
    }
    rendered.push_str(cursor);
    rendered
}

fn render_example(template: &str, example: &PromptExample) -> String {
    let values = BTreeMap::from([
        ("task_input".to_string(), example.task_input.clone()),
        ("output".to_string(), render_output(&example.output)),
    ]);
    render_placeholders(template, &values)
}

pub fn compose_agent_prompt(
    system: &str,
    few_shots: Option<&str>,
    examples: &[PromptExample],
) -> Result<String, ContractError> {
    let Some(few_shots) = few_shots else {
        return Ok(system.trim_end().to_string());
    };
    validate_prompt_placeholders(few_shots, &["task_input", "output"])?;
    validate_examples(examples)?;

    let rendered: Vec<String> = examples
        .iter()
        .map(|example| render_example(few_shots, example).trim_end().to_string())
        .collect();
    let assembled = format!("{}\n\n{}", system.trim_end(), rendered.join("\n\n"));
    if !assembled.ends_with(OUTPUT_STUB_SUFFIX) {
        return Err(ContractError::Examples(format!(
            "assembled prompt must end with the empty `{OUTPUT_STUB_SUFFIX}` stub"
        )));
    }
    Ok(assembled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_placeholders_skips_unknown_and_unclosed_braces() {
        let values = BTreeMap::from([("phase".to_string(), "problem_framing".to_string())]);
        let rendered = render_placeholders("{phase} uses {\"json\": 1} and {other} {", &values);
        assert_eq!(rendered, "problem_framing uses {\"json\": 1} and {other} {");
    }
}
