use super::ConfigError;
use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub module: String,
    pub class: String,
    pub key_env: String,
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

impl ProviderConfig {
    pub fn kind(&self) -> Option<ProviderKind> {
        ProviderKind::try_from(self.class.as_str())
            .or_else(|_| ProviderKind::try_from(self.module.as_str()))
            .ok()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.key_env.trim().is_empty() {
            return Err("key_env must be non-empty".to_string());
        }
        if self.kind().is_none() {
            return Err(format!(
                "cannot infer provider kind from module `{}` / class `{}`",
                self.module, self.class
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub provider: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModelConfig {
    pub provider_name: String,
    pub kind: ProviderKind,
    pub params: Map<String, Value>,
    pub api_key: String,
}

pub fn merge_provider_params(
    provider: &ProviderConfig,
    agent: &AgentConfig,
) -> Map<String, Value> {
    let mut merged = provider.defaults.clone();
    for (key, value) in &agent.params {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

pub fn resolve_model_config<F>(
    provider: &ProviderConfig,
    agent: &AgentConfig,
    env: F,
) -> Result<ResolvedModelConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    provider
        .validate()
        .map_err(|reason| ConfigError::Provider {
            name: agent.provider.clone(),
            reason,
        })?;
    let kind = provider.kind().ok_or_else(|| ConfigError::Provider {
        name: agent.provider.clone(),
        reason: "unknown provider kind".to_string(),
    })?;
    let api_key = env(&provider.key_env)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingApiKey {
            provider: agent.provider.clone(),
            env: provider.key_env.clone(),
        })?;
    Ok(ResolvedModelConfig {
        provider_name: agent.provider.clone(),
        kind,
        params: merge_provider_params(provider, agent),
        api_key,
    })
}
