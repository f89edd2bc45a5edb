//! Mock TTS Engine for Testing
//!
//! Records all spoken text for verification.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxbridge::tts::{TtsEngine, VoiceSettings};

/// Mock TTS engine that records spoken text
#[derive(Debug, Default)]
pub struct MockTts {
    /// All text that was "spoken"
    pub spoken: Arc<Mutex<Vec<String>>>,
    /// Settings in effect for each utterance
    pub settings: Arc<Mutex<Vec<VoiceSettings>>>,
    /// Simulate failure on every speak
    pub should_fail: Arc<Mutex<bool>>,
    /// Simulated playback time
    pub delay: Duration,
    pub voice_names: Vec<String>,
}

impl MockTts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_voices(voices: &[&str]) -> Self {
        Self {
            voice_names: voices.iter().map(|v| v.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Get all spoken phrases
    pub fn get_spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    /// Check if a phrase was spoken
    pub fn was_spoken(&self, text: &str) -> bool {
        self.spoken.lock().unwrap().iter().any(|s| s.contains(text))
    }
}

#[async_trait]
impl TtsEngine for MockTts {
    async fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()> {
        if *self.should_fail.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock TTS failure"));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.spoken.lock().unwrap().push(text.to_string());
        self.settings.lock().unwrap().push(settings.clone());
        Ok(())
    }

    async fn voices(&self) -> Result<Vec<String>> {
        Ok(self.voice_names.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
