//! ASR (Automatic Speech Recognition) Module
//!
//! Provides multiple ASR backends:
//! - Vosk: Local offline recognition
//! - Wyoming: Remote ASR protocol (e.g., faster-whisper)

pub mod vosk;
pub mod wyoming;

use crate::audio::AudioSegment;
use crate::config::Config;
use crate::error::VoxResult;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

// Re-export main types
pub use self::vosk::VoskRecognizer;
pub use self::wyoming::WyomingClient;

/// Trait for speech recognizers
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe one audio segment.
    ///
    /// `Ok(None)` means nothing intelligible was said. `Err` is reserved for
    /// the backend being unavailable.
    async fn transcribe(&self, segment: &AudioSegment) -> VoxResult<Option<String>>;

    /// Get the backend name
    fn name(&self) -> &str;
}

/// Factory to create the configured recognizer
pub fn create_recognizer(config: &Config) -> Result<Arc<dyn Recognizer>> {
    info!("🛠️ Creating recognizer: {}", config.asr_engine);
    let recognizer: Arc<dyn Recognizer> = match config.asr_engine.as_str() {
        "wyoming" => Arc::new(WyomingClient::new(&config.wyoming_host, config.wyoming_port)),
        "vosk" => Arc::new(VoskRecognizer::new(config)?),
        other => {
            warn!("  - Unknown recognizer '{}', falling back to Vosk", other);
            Arc::new(VoskRecognizer::new(config)?)
        }
    };
    Ok(recognizer)
}

/// Trim a transcript, treating blank output as "not understood"
pub(crate) fn extract_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text() {
        assert_eq!(extract_text(""), None);
        assert_eq!(extract_text("  "), None);
        assert_eq!(extract_text("hello"), Some("hello".to_string()));
        assert_eq!(extract_text("  hello  "), Some("hello".to_string()));
    }
}
