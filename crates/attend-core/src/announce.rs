use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnounceError {
    #[error("speech program failed: {0}")]
    Command(String),
    #[error("speech request failed: {0}")]
    Request(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that can say a line of text out loud.
///
/// Callers treat speech as fire-and-forget: errors are logged and dropped,
/// never propagated into the recognition loop.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), AnnounceError>;
}
