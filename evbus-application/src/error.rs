use crate::config::ConfigError;
use evbus_domain::error::DomainError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("domain: {0}")]
    Domain(#[from] DomainError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("module {module} failed to load: {reason}")]
    Module { module: String, reason: String },

    #[error("application not initialized")]
    NotInitialized,
}

pub type AppResult<T> = Result<T, AppError>;
