//! Bounded fire-and-forget speech queue.

use attend_core::Announcer;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Queued utterances beyond this are dropped.
pub const SPEECH_QUEUE_CAPACITY: usize = 8;

/// Clone-safe handle to the speech task.
#[derive(Clone)]
pub struct SpeechQueue {
    tx: mpsc::Sender<String>,
}

impl SpeechQueue {
    /// Spawn a detached task that speaks queued lines one at a time.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(announcer: Arc<dyn Announcer>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<String>(capacity);

        tokio::spawn(async move {
            tracing::info!("speech task started");
            while let Some(text) = rx.recv().await {
                if let Err(e) = announcer.speak(&text).await {
                    tracing::warn!(error = %e, text = %text, "announcement failed");
                }
            }
            tracing::info!("speech task exiting");
        });

        Self { tx }
    }

    /// Queue a line without waiting. Returns whether it was accepted.
    pub fn say(&self, text: impl Into<String>) -> bool {
        match self.tx.try_send(text.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(text)) => {
                tracing::warn!(text = %text, "speech queue full; dropping announcement");
                false
            }
            Err(TrySendError::Closed(text)) => {
                tracing::warn!(text = %text, "speech task gone; dropping announcement");
                false
            }
        }
    }
}
