pub mod error;
pub mod load;
pub mod paths;
pub mod provider;
pub mod settings;

pub use error::ConfigError;
pub use load::{AgentPromptFiles, FileLoader};
pub use paths::ConfigLayout;
pub use provider::{
    merge_provider_params, resolve_model_config, AgentConfig, ProviderConfig,
    ResolvedModelConfig,
};
pub use settings::EngineSettings;
