//! System TTS engine (speech-dispatcher's `spd-say` or `espeak-ng`)

use super::{TtsEngine, VoiceSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemBackend {
    SpdSay,
    Espeak,
}

#[derive(Debug)]
pub struct SystemEngine {
    backend: SystemBackend,
}

impl SystemEngine {
    pub fn new(backend: SystemBackend) -> Self {
        Self { backend }
    }

    /// Pick the first speech command found on PATH
    pub fn detect() -> Result<Self> {
        for (binary, backend) in [
            ("spd-say", SystemBackend::SpdSay),
            ("espeak-ng", SystemBackend::Espeak),
        ] {
            if on_path(binary) {
                debug!("System TTS using {}", binary);
                return Ok(Self::new(backend));
            }
        }
        Err(anyhow::anyhow!(
            "No system TTS command found (tried spd-say, espeak-ng)"
        ))
    }

    fn binary(&self) -> &'static str {
        match self.backend {
            SystemBackend::SpdSay => "spd-say",
            SystemBackend::Espeak => "espeak-ng",
        }
    }

    /// Command-line arguments for one utterance
    pub fn speak_args(&self, text: &str, settings: &VoiceSettings) -> Vec<String> {
        let mut args = Vec::new();
        match self.backend {
            SystemBackend::SpdSay => {
                // spd-say takes rate and volume on a -100..100 scale
                let rate = ((settings.rate as i32 - 200) / 2).clamp(-100, 100);
                let volume = ((settings.volume * 200.0) as i32 - 100).clamp(-100, 100);
                args.extend(["--wait".to_string(), "-r".into(), rate.to_string()]);
                args.extend(["-i".to_string(), volume.to_string()]);
                if let Some(voice) = &settings.voice {
                    args.extend(["-y".to_string(), voice.clone()]);
                }
            }
            SystemBackend::Espeak => {
                let amplitude = (settings.volume * 200.0).clamp(0.0, 200.0) as i32;
                args.extend(["-s".to_string(), settings.rate.to_string()]);
                args.extend(["-a".to_string(), amplitude.to_string()]);
                if let Some(voice) = &settings.voice {
                    args.extend(["-v".to_string(), voice.clone()]);
                }
            }
        }
        args.push("--".to_string());
        args.push(text.to_string());
        args
    }
}

fn on_path(binary: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file()))
        .unwrap_or(false)
}

/// Voice names from `spd-say -L` / `espeak-ng --voices` output
fn parse_voice_list(backend: SystemBackend, output: &str) -> Vec<String> {
    let column = match backend {
        SystemBackend::SpdSay => 0,
        SystemBackend::Espeak => 3,
    };
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(column))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl TtsEngine for SystemEngine {
    async fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()> {
        debug!("System speaking: {}", text);

        let status = Command::new(self.binary())
            .args(self.speak_args(text, settings))
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.binary()))?;

        if !status.success() {
            return Err(anyhow::anyhow!("{} failed with status {}", self.binary(), status));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if self.backend == SystemBackend::SpdSay {
            Command::new("spd-say").arg("--cancel").status().await?;
        }
        Ok(())
    }

    async fn voices(&self) -> Result<Vec<String>> {
        let flag = match self.backend {
            SystemBackend::SpdSay => "-L",
            SystemBackend::Espeak => "--voices",
        };
        let output = Command::new(self.binary()).arg(flag).output().await?;
        Ok(parse_voice_list(
            self.backend,
            &String::from_utf8_lossy(&output.stdout),
        ))
    }

    fn name(&self) -> &str {
        "system"
    }
}
