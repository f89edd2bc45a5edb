//! TTS (Text-to-Speech) Module
//!
//! Provides a unified interface for multiple TTS backends and the
//! [`Speaker`] queue that serializes playback.

use crate::config::Config;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub mod piper;
pub mod speaker;
pub mod speechd;
pub mod system;

pub use speaker::{Speaker, SpeakerStatus};

/// Default volume restored by unmute
pub const DEFAULT_VOLUME: f32 = 0.8;

/// Rate, volume and voice applied to each utterance
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    /// Words per minute
    pub rate: u32,
    /// 0.0 to 1.0
    pub volume: f32,
    pub voice: Option<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: 200,
            volume: DEFAULT_VOLUME,
            voice: None,
        }
    }
}

impl VoiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rate: config.tts_rate,
            volume: config.tts_volume.clamp(0.0, 1.0),
            voice: None,
        }
    }
}

/// Trait for TTS engines
#[async_trait]
pub trait TtsEngine: Send + Sync + std::fmt::Debug {
    /// Speak the given text, resolving once playback has finished.
    ///
    /// Dropping the returned future abandons the utterance.
    async fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()>;

    /// Cut any in-flight playback short
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Voices this engine can switch to
    async fn voices(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Get the engine name
    fn name(&self) -> &str;
}

/// Factory to create the configured TTS engine
pub async fn create_engine(config: &Config) -> Result<Arc<dyn TtsEngine>> {
    info!("🛠️ Creating TTS engine: {}", config.tts_engine);
    let engine: Arc<dyn TtsEngine> = match config.tts_engine.as_str() {
        "piper" => {
            info!("  - Using Piper TTS (Voice: {})", config.piper_voice);
            Arc::new(piper::PiperEngine::new(config)?)
        }
        "speechd_ng" | "speechd" => {
            info!("  - Using Speechd TTS");
            Arc::new(speechd::SpeechdEngine::connect().await?)
        }
        "system" => {
            info!("  - Using System TTS");
            Arc::new(system::SystemEngine::detect()?)
        }
        _ => {
            warn!(
                "  - Unknown engine '{}', falling back to System",
                config.tts_engine
            );
            Arc::new(system::SystemEngine::detect()?)
        }
    };
    info!("✅ TTS engine '{}' initialized", engine.name());
    Ok(engine)
}
