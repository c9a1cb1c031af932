use super::paths::{
    ConfigLayout, AGENT_CONFIG_FILE_NAME, EXAMPLES_FILE_NAME, FEW_SHOTS_PROMPT_FILE_NAME,
    SYSTEM_PROMPT_FILE_NAME,
};
use super::provider::{resolve_model_config, AgentConfig, ProviderConfig, ResolvedModelConfig};
use super::{ConfigError, EngineSettings};
use crate::contract::PromptExample;
use crate::evidence::StoredValue;
use crate::guardrails::GuardrailsConfig;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct AgentPromptFiles {
    pub system: String,
    pub few_shots: Option<String>,
    pub examples: Vec<PromptExample>,
}

#[derive(Debug)]
pub struct FileLoader {
    layout: ConfigLayout,
    cache: Mutex<BTreeMap<PathBuf, Option<String>>>,
}

fn parse_yaml<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T, ConfigError> {
    serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn parse_json<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T, ConfigError> {
    serde_json::from_str(raw).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_layout(ConfigLayout::new(root))
    }

    pub fn with_layout(layout: ConfigLayout) -> Self {
        Self {
            layout,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn layout(&self) -> &ConfigLayout {
        &self.layout
    }

    pub fn cached_file_count(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or_default()
    }

    fn read_cached(&self, path: &Path) -> Result<Option<String>, ConfigError> {
        let mut cache = self.cache.lock().map_err(|_| ConfigError::CachePoisoned)?;
        if let Some(cached) = cache.get(path) {
            return Ok(cached.clone());
        }
        let contents = match fs::read_to_string(path) {
            Ok(contents) => Some(contents),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        cache.insert(path.to_path_buf(), contents.clone());
        Ok(contents)
    }

    fn read_required(&self, path: &Path) -> Result<String, ConfigError> {
        self.read_cached(path)?
            .ok_or_else(|| ConfigError::MissingFile {
                path: path.display().to_string(),
            })
    }

    pub fn load_prompt(&self, agent: &str, file_name: &str) -> Result<Option<String>, ConfigError> {
        self.read_cached(&self.layout.agent_file(agent, file_name))
    }

    pub fn load_examples(&self, agent: &str) -> Result<Option<Vec<PromptExample>>, ConfigError> {
        let path = self.layout.agent_file(agent, EXAMPLES_FILE_NAME);
        self.read_cached(&path)?
            .map(|raw| parse_json(&path, &raw))
            .transpose()
    }

    pub fn load_agent_prompts(&self, agent: &str) -> Result<AgentPromptFiles, ConfigError> {
        let system = self.read_required(&self.layout.agent_file(agent, SYSTEM_PROMPT_FILE_NAME))?;
        let few_shots = self.load_prompt(agent, FEW_SHOTS_PROMPT_FILE_NAME)?;
        let examples = self.load_examples(agent)?.unwrap_or_default();
        if few_shots.is_some() && examples.is_empty() {
            return Err(ConfigError::Prompt {
                agent: agent.to_string(),
                reason: format!("{FEW_SHOTS_PROMPT_FILE_NAME} requires {EXAMPLES_FILE_NAME}"),
            });
        }
        Ok(AgentPromptFiles {
            system,
            few_shots,
            examples,
        })
    }

    pub fn load_agent_config(&self, agent: &str) -> Result<Option<AgentConfig>, ConfigError> {
        let path = self.layout.agent_file(agent, AGENT_CONFIG_FILE_NAME);
        self.read_cached(&path)?
            .map(|raw| parse_yaml(&path, &raw))
            .transpose()
    }

    pub fn load_provider_config(&self, provider: &str) -> Result<ProviderConfig, ConfigError> {
        let path = self.layout.provider_path(provider);
        let raw = self.read_required(&path)?;
        parse_yaml(&path, &raw)
    }

    pub fn load_guardrails_config(&self) -> Result<Option<GuardrailsConfig>, ConfigError> {
        let path = self.layout.guardrails_path();
        self.read_cached(&path)?
            .map(|raw| {
                GuardrailsConfig::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Context documents under `context/<phase>/`, keyed by file stem and sorted by key.
    /// Only `.md` and `.txt` files are read; a missing directory yields nothing.
    pub fn load_context_documents(&self, phase: &str) -> Result<Vec<(String, StoredValue)>, ConfigError> {
        let dir = self.layout.context_dir(phase);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: dir.display().to_string(),
                    source,
                })
            }
        };
        let mut documents = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| ConfigError::Read {
                    path: dir.display().to_string(),
                    source,
                })?
                .path();
            let is_document = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext, "md" | "txt"));
            let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if !is_document {
                continue;
            }
            let text = self.read_required(&path)?;
            documents.push((
                key.to_string(),
                StoredValue {
                    title: key.replace(['-', '_'], " "),
                    text,
                    agents: vec![phase.to_string()],
                    ..StoredValue::default()
                },
            ));
        }
        documents.sort_by(|left, right| left.0.cmp(&right.0));
        Ok(documents)
    }

    pub fn load_engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        let path = self.layout.engine_settings_path();
        let settings: EngineSettings = match self.read_cached(&path)? {
            Some(raw) => parse_yaml(&path, &raw)?,
            None => EngineSettings::default(),
        };
        settings.validate().map_err(ConfigError::Settings)?;
        Ok(settings)
    }

    pub fn resolve_agent_model_with_env<F>(
        &self,
        agent: &str,
        env: F,
    ) -> Result<ResolvedModelConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = self.layout.agent_file(agent, AGENT_CONFIG_FILE_NAME);
        let agent_config = self
            .load_agent_config(agent)?
            .ok_or_else(|| ConfigError::MissingFile {
                path: path.display().to_string(),
            })?;
        let provider = self.load_provider_config(&agent_config.provider)?;
        resolve_model_config(&provider, &agent_config, env)
    }

    pub fn resolve_agent_model(&self, agent: &str) -> Result<ResolvedModelConfig, ConfigError> {
        self.resolve_agent_model_with_env(agent, |name| std::env::var(name).ok())
    }
}
