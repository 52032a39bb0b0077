//! Typed errors: load-time `ConfigError`, request-time `EngineError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("registry already bound to base dir '{current}', cannot rebind to '{requested}'")]
    BaseDirBound { current: String, requested: String },
    #[error("invalid base dir '{0}': {1}")]
    BadBaseDir(String, String),
    #[error("required config missing: {0}")]
    MissingRequired(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("signature: {0}")]
    Signature(String),
    #[error("rate limit: {0}")]
    RateLimit(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("build: {0}")]
    Build(String),
    #[error("driver: {0}")]
    Driver(String),
    #[error("script: {0}")]
    Script(String),
    #[error("transaction: {0}")]
    Transaction(String),
}

impl EngineError {
    /// Whether waiting and retrying can ever succeed without operator action.
    pub fn retryable(&self) -> bool {
        matches!(self, EngineError::RateLimit(_))
    }
}
