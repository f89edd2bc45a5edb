//! Piper TTS backend calling a local binary

use super::{TtsEngine, VoiceSettings};
use crate::config::Config;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Speaking rate piper produces at length scale 1.0
const NATURAL_RATE: f32 = 200.0;

pub struct PiperEngine {
    voices_dir: PathBuf,
    default_voice: String,
    playing: Arc<Mutex<Option<Arc<rodio::Sink>>>>,
}

impl std::fmt::Debug for PiperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiperEngine")
            .field("voices_dir", &self.voices_dir)
            .field("default_voice", &self.default_voice)
            .finish_non_exhaustive()
    }
}

impl PiperEngine {
    pub fn new(config: &Config) -> Result<Self> {
        let voices_dir = dirs::data_dir()
            .unwrap_or_default()
            .join("voxbridge/voices");

        let engine = Self {
            voices_dir,
            default_voice: config.piper_voice.clone(),
            playing: Arc::new(Mutex::new(None)),
        };

        let model = engine.model_path(&engine.default_voice);
        if !model.exists() {
            warn!("⚠️ Piper model not found at {}", model.display());
        }
        Ok(engine)
    }

    fn model_path(&self, voice: &str) -> PathBuf {
        self.voices_dir.join(format!("{}.onnx", voice))
    }
}

/// Piper slows down as length_scale grows
fn length_scale(rate: u32) -> f32 {
    (NATURAL_RATE / rate.max(1) as f32).clamp(0.25, 4.0)
}

#[async_trait]
impl TtsEngine for PiperEngine {
    async fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()> {
        info!("📢 Piper speaking: '{}'", text);

        let voice = settings.voice.as_deref().unwrap_or(&self.default_voice);
        let model_path = self.model_path(voice);
        if !model_path.exists() {
            return Err(anyhow::anyhow!(
                "Piper model file missing: {}",
                model_path.display()
            ));
        }

        let wav_path = std::env::temp_dir().join(format!(
            "voxbridge_speech_{}.wav",
            chrono::Utc::now().timestamp_millis()
        ));

        let mut child = Command::new("piper-tts")
            .arg("-m")
            .arg(&model_path)
            .arg("-f")
            .arg(&wav_path)
            .arg("--length_scale")
            .arg(length_scale(settings.rate).to_string())
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("❌ Failed to spawn piper-tts: {}", e);
                anyhow::anyhow!("Failed to spawn piper-tts: {}", e)
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(anyhow::anyhow!("Piper failed with status {}", status));
        }
        if !wav_path.exists() {
            return Err(anyhow::anyhow!("Piper output file not created"));
        }

        let volume = settings.volume;
        let playing = Arc::clone(&self.playing);

        // OutputStream is not Send, so playback lives entirely on a blocking thread
        tokio::task::spawn_blocking(move || -> Result<()> {
            let result = (|| -> Result<()> {
                let (_stream, handle) = rodio::OutputStream::try_default()?;
                let file = std::fs::File::open(&wav_path)?;
                let source = rodio::Decoder::new(std::io::BufReader::new(file))?;
                let sink = Arc::new(rodio::Sink::try_new(&handle)?);
                sink.set_volume(volume);
                sink.append(source);

                if let Ok(mut slot) = playing.lock() {
                    *slot = Some(Arc::clone(&sink));
                }
                debug!("📢 Playing Piper WAV: {:?}", wav_path);
                sink.sleep_until_end();
                if let Ok(mut slot) = playing.lock() {
                    *slot = None;
                }
                Ok(())
            })();
            let _ = std::fs::remove_file(&wav_path);
            result
        })
        .await
        .map_err(|e| anyhow::anyhow!("Task join error: {}", e))??;

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let sink = self
            .playing
            .lock()
            .map_err(|_| anyhow::anyhow!("piper playback lock poisoned"))?
            .take();
        if let Some(sink) = sink {
            sink.stop();
        }
        Ok(())
    }

    async fn voices(&self) -> Result<Vec<String>> {
        let mut voices = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.voices_dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(voices),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("onnx") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    voices.push(stem.to_string());
                }
            }
        }
        voices.sort();
        Ok(voices)
    }

    fn name(&self) -> &str {
        "piper"
    }
}
