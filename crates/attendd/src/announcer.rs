//! Speech backends.

use async_trait::async_trait;
use attend_core::{AnnounceError, Announcer};
use std::path::PathBuf;
use tokio::process::Command;

/// Offline speech: runs a local program with the text as its last argument.
pub struct CommandAnnouncer {
    program: String,
    args: Vec<String>,
}

impl CommandAnnouncer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Announcer for CommandAnnouncer {
    async fn speak(&self, text: &str) -> Result<(), AnnounceError> {
        tracing::debug!(program = %self.program, text, "speaking");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .kill_on_drop(true)
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(AnnounceError::Command(format!("{} exited with {status}", self.program)))
        }
    }
}

/// Network speech: fetches synthesized audio over HTTP and plays it.
///
/// Any failure along the way (request, download, playback) falls back to
/// the local announcer, so callers only see an error if both paths fail.
pub struct HttpAnnouncer {
    client: reqwest::Client,
    url: String,
    lang: String,
    player: String,
    fallback: CommandAnnouncer,
}

impl HttpAnnouncer {
    pub fn new(url: String, lang: String, player: String, fallback: CommandAnnouncer) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            lang,
            player,
            fallback,
        }
    }

    async fn speak_remote(&self, text: &str) -> Result<(), AnnounceError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("text", text), ("lang", self.lang.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AnnounceError::Request(e.to_string()))?;
        let audio = response
            .bytes()
            .await
            .map_err(|e| AnnounceError::Request(e.to_string()))?;

        let path = audio_path();
        tokio::fs::write(&path, &audio).await?;
        let played = Command::new(&self.player)
            .arg(&path)
            .kill_on_drop(true)
            .status()
            .await;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!(path = %path.display(), error = %e, "failed to remove speech audio");
        }

        let status = played?;
        if status.success() {
            Ok(())
        } else {
            Err(AnnounceError::Command(format!("{} exited with {status}", self.player)))
        }
    }
}

#[async_trait]
impl Announcer for HttpAnnouncer {
    async fn speak(&self, text: &str) -> Result<(), AnnounceError> {
        match self.speak_remote(text).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "network speech failed; falling back to local");
                self.fallback.speak(text).await
            }
        }
    }
}

fn audio_path() -> PathBuf {
    std::env::temp_dir().join(format!("attend-speech-{}.mp3", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_success() {
        let announcer = CommandAnnouncer::new("true", vec![]);
        assert!(announcer.speak("hello").await.is_ok());
    }

    #[tokio::test]
    async fn test_command_nonzero_exit() {
        let announcer = CommandAnnouncer::new("false", vec![]);
        let err = announcer.speak("hello").await.unwrap_err();
        assert!(matches!(err, AnnounceError::Command(_)));
    }

    #[tokio::test]
    async fn test_command_missing_program() {
        let announcer = CommandAnnouncer::new("/nonexistent/speech-program", vec![]);
        let err = announcer.speak("hello").await.unwrap_err();
        assert!(matches!(err, AnnounceError::Io(_)));
    }

    #[tokio::test]
    async fn test_http_falls_back_to_local() {
        // Nothing listens on port 9 of localhost; the request fails fast.
        let announcer = HttpAnnouncer::new(
            "http://127.0.0.1:9/tts".into(),
            "en".into(),
            "true".into(),
            CommandAnnouncer::new("true", vec![]),
        );
        assert!(announcer.speak("hello").await.is_ok());
    }
}
