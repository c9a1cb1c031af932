use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "config";
pub const AGENTS_DIR: &str = "agents";
pub const PROVIDER_DIR: &str = "provider";
pub const CONTEXT_DIR: &str = "context";
pub const GUARDRAILS_FILE_NAME: &str = "guardrails.yaml";
pub const ENGINE_SETTINGS_FILE_NAME: &str = "engine.yaml";
pub const AGENT_CONFIG_FILE_NAME: &str = "config.yaml";
pub const SYSTEM_PROMPT_FILE_NAME: &str = "system.prompt";
pub const FEW_SHOTS_PROMPT_FILE_NAME: &str = "few-shots.prompt";
pub const EXAMPLES_FILE_NAME: &str = "examples.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayout {
    root: PathBuf,
}

impl ConfigLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn guardrails_path(&self) -> PathBuf {
        self.root.join(CONFIG_DIR).join(GUARDRAILS_FILE_NAME)
    }

    pub fn engine_settings_path(&self) -> PathBuf {
        self.root.join(CONFIG_DIR).join(ENGINE_SETTINGS_FILE_NAME)
    }

    pub fn provider_path(&self, provider: &str) -> PathBuf {
        self.root
            .join(CONFIG_DIR)
            .join(PROVIDER_DIR)
            .join(format!("{provider}.yaml"))
    }

    pub fn agent_dir(&self, agent: &str) -> PathBuf {
        self.root.join(AGENTS_DIR).join(agent)
    }

    pub fn agent_file(&self, agent: &str, file_name: &str) -> PathBuf {
        self.agent_dir(agent).join(file_name)
    }

    pub fn context_dir(&self, phase: &str) -> PathBuf {
        self.root.join(CONTEXT_DIR).join(phase)
    }
}
