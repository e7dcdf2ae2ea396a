use bridge_types::platform::PlatformError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("storage error: {0}")]
    Storage(anyhow::Error),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RelayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Platform(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
