use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_max_rounds() -> u32 {
    3
}

fn default_max_context_retrieval_rounds() -> u32 {
    1
}

fn default_threshold() -> f64 {
    0.9
}

fn default_max_selected_ambiguities() -> usize {
    3
}

fn default_max_context_items() -> usize {
    8
}

fn default_scan_context_items() -> usize {
    3
}

fn default_retrieval_limit() -> usize {
    5
}

fn default_max_agent_iterations() -> u32 {
    6
}

fn default_max_graph_steps() -> u32 {
    200
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_max_context_retrieval_rounds")]
    pub max_context_retrieval_rounds: u32,
    #[serde(default = "default_threshold")]
    pub importance_threshold: f64,
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_max_selected_ambiguities")]
    pub max_selected_ambiguities: usize,
    #[serde(default = "default_max_context_items")]
    pub max_context_items: usize,
    #[serde(default = "default_scan_context_items")]
    pub scan_context_items: usize,
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,
    #[serde(default = "default_max_agent_iterations")]
    pub max_agent_iterations: u32,
    #[serde(default = "default_max_graph_steps")]
    pub max_graph_steps: u32,
    pub hilp_enabled: bool,
    pub log_path: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_context_retrieval_rounds: default_max_context_retrieval_rounds(),
            importance_threshold: default_threshold(),
            confidence_threshold: default_threshold(),
            max_selected_ambiguities: default_max_selected_ambiguities(),
            max_context_items: default_max_context_items(),
            scan_context_items: default_scan_context_items(),
            retrieval_limit: default_retrieval_limit(),
            max_agent_iterations: default_max_agent_iterations(),
            max_graph_steps: default_max_graph_steps(),
            hilp_enabled: false,
            log_path: None,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_rounds == 0 {
            return Err("max_rounds must be >= 1".to_string());
        }
        for (name, value) in [
            ("importance_threshold", self.importance_threshold),
            ("confidence_threshold", self.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be between 0 and 1"));
            }
        }
        if self.max_selected_ambiguities == 0 {
            return Err("max_selected_ambiguities must be >= 1".to_string());
        }
        if self.max_agent_iterations == 0 {
            return Err("max_agent_iterations must be >= 1".to_string());
        }
        if self.max_graph_steps == 0 {
            return Err("max_graph_steps must be >= 1".to_string());
        }
        Ok(())
    }
}
