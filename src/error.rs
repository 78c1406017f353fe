use crate::config::ConfigError;
use crate::location::LocationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error("http client error: {0}")]
    HttpClient(String),
    #[error("pipeline command channel closed")]
    CommandChannelClosed,
}
