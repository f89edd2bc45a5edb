//! Speechd-ng backend over D-Bus
//!
//! The daemon picks its own rate and volume, so only the voice name is
//! forwarded. A muted speaker skips the call entirely.

use super::{TtsEngine, VoiceSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};
use zbus::{proxy, Connection};

#[proxy(
    interface = "org.speech.Service",
    default_service = "org.speech.Service",
    default_path = "/org/speech/Service"
)]
trait SpeechService {
    fn speak(&self, text: &str) -> zbus::Result<()>;

    fn speak_voice(&self, text: &str, voice: &str) -> zbus::Result<()>;

    fn ping(&self) -> zbus::Result<String>;

    fn get_version(&self) -> zbus::Result<String>;
}

#[derive(Debug, Clone)]
pub struct SpeechdEngine {
    proxy: SpeechServiceProxy<'static>,
}

impl SpeechdEngine {
    /// Connect on the session bus; fails if the daemon does not answer a ping
    pub async fn connect() -> Result<Self> {
        let connection = Connection::session()
            .await
            .context("No D-Bus session bus")?;
        let proxy = SpeechServiceProxy::new(&connection).await?;

        let pong = proxy.ping().await.context("speechd-ng not responding")?;
        let version = proxy
            .get_version()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        info!("🔊 Connected to speechd-ng {} ({})", version, pong);

        Ok(Self { proxy })
    }
}

/// Voice to request, if any
fn requested_voice(settings: &VoiceSettings) -> Option<&str> {
    settings
        .voice
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl TtsEngine for SpeechdEngine {
    async fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()> {
        if settings.volume <= 0.0 {
            debug!("Muted, not sending '{}' to speechd-ng", text);
            return Ok(());
        }
        match requested_voice(settings) {
            Some(voice) => self.proxy.speak_voice(text, voice).await?,
            None => self.proxy.speak(text).await?,
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "speechd_ng"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_voice() {
        let mut settings = VoiceSettings::default();
        assert_eq!(requested_voice(&settings), None);

        settings.voice = Some("  ".into());
        assert_eq!(requested_voice(&settings), None);

        settings.voice = Some("en-us+f3".into());
        assert_eq!(requested_voice(&settings), Some("en-us+f3"));
    }
}
