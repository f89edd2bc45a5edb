//! Serialized speech output
//!
//! A single worker task pops utterances off a bounded FIFO queue and hands
//! them to the engine one at a time, so speech never overlaps.

use super::{TtsEngine, VoiceSettings};
use crate::error::{ErrorCallback, VoxError, VoxResult};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Utterances waiting beyond this are refused
pub const MAX_QUEUE: usize = 64;
const DONE_POLL: Duration = Duration::from_millis(20);

/// Snapshot of the speaker for status reports
#[derive(Debug, Clone, Serialize)]
pub struct SpeakerStatus {
    pub engine: String,
    pub speaking: bool,
    pub queued: usize,
    pub rate: u32,
    pub volume: f32,
    pub voice: Option<String>,
}

struct Shared {
    engine: Arc<dyn TtsEngine>,
    queue: Mutex<VecDeque<(u64, String)>>,
    settings: Mutex<VoiceSettings>,
    speaking: AtomicBool,
    /// Bumped on every interrupt; queued items from older generations are stale
    generation: AtomicU64,
    wake: Notify,
    interrupt: Notify,
    closed: AtomicBool,
    on_error: ErrorCallback,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Queue-backed front end for a [`TtsEngine`]
pub struct Speaker {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Speaker {
    /// Spawns the playback worker; needs a running tokio runtime.
    pub fn new(
        engine: Arc<dyn TtsEngine>,
        settings: VoiceSettings,
        on_error: ErrorCallback,
    ) -> VoxResult<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| VoxError::Runtime(format!("speaker needs a tokio runtime: {}", e)))?;

        let shared = Arc::new(Shared {
            engine,
            queue: Mutex::new(VecDeque::new()),
            settings: Mutex::new(settings),
            speaking: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            wake: Notify::new(),
            interrupt: Notify::new(),
            closed: AtomicBool::new(false),
            on_error,
        });

        let worker = runtime.spawn(playback_loop(Arc::clone(&shared)));
        info!("🔊 Speaker ready ({})", shared.engine.name());

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue text for playback.
    ///
    /// With `interrupt` the pending queue is dropped and the current
    /// utterance is cut short first. Returns `false` when nothing was queued.
    pub fn speak(&self, text: &str, interrupt: bool) -> bool {
        let text = text.trim();
        if text.is_empty() || self.shared.closed.load(Ordering::SeqCst) {
            return false;
        }

        let mut queue = lock(&self.shared.queue);
        if interrupt {
            let dropped = queue.len();
            queue.clear();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            self.shared.interrupt.notify_waiters();
            if dropped > 0 {
                debug!("Interrupt dropped {} queued utterances", dropped);
            }
        }

        if queue.len() >= MAX_QUEUE {
            warn!("⚠️ Speech queue full, dropping: '{}'", text);
            return false;
        }

        let generation = self.shared.generation.load(Ordering::SeqCst);
        queue.push_back((generation, text.to_string()));
        drop(queue);

        self.shared.wake.notify_one();
        true
    }

    /// Wait until the queue is empty and nothing is playing.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_until_done(&self, timeout: Duration) -> bool {
        let idle = async {
            while !self.is_idle() {
                tokio::time::sleep(DONE_POLL).await;
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }

    fn is_idle(&self) -> bool {
        // `speaking` is raised while the queue lock is held, so an item is
        // never invisible to both checks at once
        let queue = lock(&self.shared.queue);
        queue.is_empty() && !self.shared.speaking.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.shared.speaking.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.shared.queue).len()
    }

    pub fn engine_name(&self) -> &str {
        self.shared.engine.name()
    }

    pub fn settings(&self) -> VoiceSettings {
        lock(&self.shared.settings).clone()
    }

    /// Words per minute for subsequent utterances
    pub fn set_rate(&self, rate: u32) {
        lock(&self.shared.settings).rate = rate;
        info!("🗣️ Speech rate set to {} wpm", rate);
    }

    pub fn rate(&self) -> u32 {
        lock(&self.shared.settings).rate
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        lock(&self.shared.settings).volume = volume;
        info!("🔉 Speech volume set to {:.2}", volume);
    }

    pub fn volume(&self) -> f32 {
        lock(&self.shared.settings).volume
    }

    pub fn set_voice(&self, voice: Option<String>) {
        info!("🗣️ Voice set to {:?}", voice);
        lock(&self.shared.settings).voice = voice;
    }

    pub fn voice(&self) -> Option<String> {
        lock(&self.shared.settings).voice.clone()
    }

    /// Voices offered by the engine; failures are reported and yield an empty list
    pub async fn voices(&self) -> Vec<String> {
        match self.shared.engine.voices().await {
            Ok(voices) => voices,
            Err(e) => {
                (self.shared.on_error)(&VoxError::Synthesis(format!(
                    "listing voices failed: {:#}",
                    e
                )));
                Vec::new()
            }
        }
    }

    pub fn status(&self) -> SpeakerStatus {
        let settings = self.settings();
        SpeakerStatus {
            engine: self.engine_name().to_string(),
            speaking: self.is_speaking(),
            queued: self.queue_len(),
            rate: settings.rate,
            volume: settings.volume,
            voice: settings.voice,
        }
    }

    /// Drop pending speech, cut the current utterance and stop the worker
    pub async fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        lock(&self.shared.queue).clear();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.interrupt.notify_waiters();
        self.shared.wake.notify_one();

        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("⚠️ Speaker worker ended abnormally: {}", e);
            }
        }
        info!("🔇 Speaker shut down");
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(worker) = lock(&self.worker).take() {
            worker.abort();
        }
    }
}

async fn playback_loop(shared: Arc<Shared>) {
    loop {
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }

        let next = {
            let mut queue = lock(&shared.queue);
            let item = queue.pop_front();
            if item.is_some() {
                shared.speaking.store(true, Ordering::SeqCst);
            }
            item
        };

        let Some((generation, text)) = next else {
            shared.wake.notified().await;
            continue;
        };

        // Register for interrupts before re-checking the generation so an
        // interrupt landing in between is not missed
        let interrupted = shared.interrupt.notified();
        if generation == shared.generation.load(Ordering::SeqCst) {
            let settings = lock(&shared.settings).clone();
            debug!("🗣️ Speaking: '{}'", text);

            tokio::select! {
                result = shared.engine.speak(&text, &settings) => {
                    if let Err(e) = result {
                        (shared.on_error)(&VoxError::Synthesis(format!("{:#}", e)));
                    }
                }
                _ = interrupted => {
                    debug!("Utterance interrupted");
                    if let Err(e) = shared.engine.stop().await {
                        warn!("⚠️ Failed to stop engine: {}", e);
                    }
                }
            }
        }

        shared.speaking.store(false, Ordering::SeqCst);
    }
    debug!("Speaker worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Debug, Default)]
    struct RecordingEngine {
        spoken: Mutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl TtsEngine for RecordingEngine {
        async fn speak(&self, text: &str, _settings: &VoiceSettings) -> anyhow::Result<()> {
            tokio::time::sleep(self.delay).await;
            if text == "fail" {
                anyhow::bail!("engine failure");
            }
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn speaker_with(engine: Arc<RecordingEngine>, errors: Arc<Mutex<Vec<String>>>) -> Speaker {
        let on_error: ErrorCallback = Arc::new(move |e| errors.lock().unwrap().push(e.to_string()));
        Speaker::new(engine, VoiceSettings::default(), on_error).unwrap()
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let engine = Arc::new(RecordingEngine::default());
        let speaker = speaker_with(engine.clone(), Arc::default());

        assert!(speaker.speak("one", false));
        assert!(speaker.speak("two", false));
        assert!(speaker.speak("three", false));
        assert!(speaker.wait_until_done(Duration::from_secs(2)).await);

        assert_eq!(*engine.spoken.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let speaker = speaker_with(Arc::new(RecordingEngine::default()), Arc::default());
        assert!(!speaker.speak("   ", false));
        assert_eq!(speaker.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_queue() {
        let engine = Arc::new(RecordingEngine::default());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let speaker = speaker_with(engine.clone(), errors.clone());

        speaker.speak("fail", false);
        speaker.speak("after", false);
        assert!(speaker.wait_until_done(Duration::from_secs(2)).await);

        assert_eq!(*engine.spoken.lock().unwrap(), vec!["after"]);
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_drops_pending() {
        let engine = Arc::new(RecordingEngine {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let speaker = speaker_with(engine.clone(), Arc::default());

        speaker.speak("first", false);
        speaker.speak("second", false);
        speaker.speak("third", false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        speaker.speak("urgent", true);
        assert!(speaker.wait_until_done(Duration::from_secs(2)).await);

        assert_eq!(*engine.spoken.lock().unwrap(), vec!["urgent"]);
    }

    #[tokio::test]
    async fn test_wait_times_out_while_playing() {
        let engine = Arc::new(RecordingEngine {
            delay: Duration::from_millis(500),
            ..Default::default()
        });
        let speaker = speaker_with(engine, Arc::default());

        speaker.speak("slow", false);
        assert!(!speaker.wait_until_done(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_volume_clamped() {
        let speaker = speaker_with(Arc::new(RecordingEngine::default()), Arc::default());
        speaker.set_volume(3.0);
        assert_eq!(speaker.volume(), 1.0);
        speaker.set_rate(250);
        assert_eq!(speaker.status().rate, 250);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_speech() {
        let speaker = speaker_with(Arc::new(RecordingEngine::default()), Arc::default());
        speaker.shutdown().await;
        assert!(!speaker.speak("late", false));
    }
}
