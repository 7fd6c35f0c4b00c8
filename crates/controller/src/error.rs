use modewarden_runner::RunnerError;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid controller config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced by the controller's public handle.
///
/// Lifecycle failures of individual managers are absorbed by the controller
/// and never show up here; only the cross-thread bridge and construction can
/// fail.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
