#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("required file {path} is missing")]
    MissingFile { path: String },
    #[error("engine settings validation failed: {0}")]
    Settings(String),
    #[error("provider config `{name}` is invalid: {reason}")]
    Provider { name: String, reason: String },
    #[error("environment variable `{env}` for provider `{provider}` is not set")]
    MissingApiKey { provider: String, env: String },
    #[error("prompt contract violation for agent `{agent}`: {reason}")]
    Prompt { agent: String, reason: String },
    #[error("config cache lock poisoned")]
    CachePoisoned,
}
