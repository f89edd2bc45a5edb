//! Offline recognition using Vosk

use super::{extract_text, Recognizer};
use crate::audio::{AudioSegment, SAMPLE_RATE};
use crate::config::Config;
use crate::error::{VoxError, VoxResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Minimum average word confidence (below this, results are discarded)
pub const MIN_CONFIDENCE: f32 = 0.5;

/// Vosk-based recognizer
pub struct VoskRecognizer {
    recognizer: Arc<Mutex<::vosk::Recognizer>>,
}

impl VoskRecognizer {
    /// Load the model configured in `vosk_model_path`
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = std::path::PathBuf::from(&config.vosk_model_path);

        if !model_path.exists() {
            return Err(anyhow::anyhow!(
                "Vosk model not found at {}",
                model_path.display()
            ));
        }

        info!("Loading Vosk model from: {}", model_path.display());

        let model_str = model_path.to_str().ok_or_else(|| {
            anyhow::anyhow!(
                "Vosk model path is not valid UTF-8: {}",
                model_path.display()
            )
        })?;

        let model = ::vosk::Model::new(model_str).context("Failed to load Vosk model")?;
        let mut recognizer = ::vosk::Recognizer::new(&model, SAMPLE_RATE as f32)
            .context("Failed to create Vosk recognizer")?;
        recognizer.set_words(true);

        Ok(Self {
            recognizer: Arc::new(Mutex::new(recognizer)),
        })
    }
}

#[async_trait]
impl Recognizer for VoskRecognizer {
    async fn transcribe(&self, segment: &AudioSegment) -> VoxResult<Option<String>> {
        let recognizer = Arc::clone(&self.recognizer);
        let samples = segment.samples.clone();

        // Decoding is CPU bound
        tokio::task::spawn_blocking(move || -> VoxResult<Option<String>> {
            let mut recognizer = recognizer.lock()?;
            if let ::vosk::DecodingState::Failed = recognizer.accept_waveform(&samples) {
                recognizer.reset();
                return Err(VoxError::RecognitionService(
                    "Vosk failed to decode segment".into(),
                ));
            }

            let result = recognizer.final_result();
            let Some(single) = result.single() else {
                return Ok(None);
            };
            let Some(text) = extract_text(single.text) else {
                return Ok(None);
            };

            let confidence = average_confidence(single.result.iter().map(|w| w.conf));
            if confidence < MIN_CONFIDENCE {
                info!(
                    "🔇 Rejecting low-confidence transcript ({:.2}): '{}'",
                    confidence, text
                );
                return Ok(None);
            }

            debug!("Vosk transcript ({:.2}): '{}'", confidence, text);
            Ok(Some(text))
        })
        .await
        .map_err(|e| VoxError::Runtime(format!("Task join error: {}", e)))?
    }

    fn name(&self) -> &str {
        "vosk"
    }
}

/// Average of per-word confidences; a transcript without word info counts as certain
fn average_confidence(confs: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = confs.fold((0.0f32, 0usize), |(s, c), conf| (s + conf, c + 1));
    if count == 0 {
        1.0
    } else {
        sum / count as f32
    }
}
