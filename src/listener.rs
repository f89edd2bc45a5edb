//! Speech input pipeline
//!
//! Couples an [`AudioSource`] with a [`Recognizer`]. Capture runs on a
//! dedicated thread with short read windows so that stop requests are
//! noticed quickly; transcription runs on the tokio runtime so slow
//! recognizers never hold up the microphone.
//!
//! Every capture worker owns its stop flag. A worker that outlives its
//! bounded join keeps that raised flag, so it can neither deliver text
//! nor be revived by a later start.

use crate::asr::Recognizer;
use crate::audio::{AudioSegment, AudioSource};
use crate::config::TranscriptionOrder;
use crate::error::{ErrorCallback, VoxError, VoxResult};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long each continuous capture waits for speech before re-checking the stop flag
pub const CAPTURE_WINDOW: Duration = Duration::from_millis(500);
/// Bounded wait when joining the capture thread
pub const STOP_WAIT: Duration = Duration::from_secs(2);
/// Pause after a capture error before retrying
const ERROR_BACKOFF: Duration = Duration::from_millis(500);
/// Segments waiting for the sequential transcription worker
const SEGMENT_QUEUE: usize = 8;

/// Receives each recognized utterance. May be invoked concurrently.
pub type TextCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

struct CaptureWorker {
    thread: thread::JoinHandle<()>,
    done: std_mpsc::Receiver<()>,
    stop: Arc<AtomicBool>,
}

impl CaptureWorker {
    /// Wait for the thread with a bounded timeout, detaching it on expiry
    fn join(self) {
        match self.done.recv_timeout(STOP_WAIT) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                let _ = self.thread.join();
                info!("🔇 Stopped continuous listening");
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    "⚠️ Capture thread did not stop within {:?}; detaching",
                    STOP_WAIT
                );
            }
        }
    }
}

/// Listens on an audio source and turns speech into text
pub struct Listener {
    source: Arc<dyn AudioSource>,
    recognizer: Arc<dyn Recognizer>,
    on_error: ErrorCallback,
    order: TranscriptionOrder,
    runtime: Handle,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<CaptureWorker>>,
    /// Held for the duration of every capture call on `source`
    capture_gate: Arc<Mutex<()>>,
}

impl Listener {
    /// Must be called from within a tokio runtime; transcription tasks are spawned on it.
    pub fn new(
        source: Arc<dyn AudioSource>,
        recognizer: Arc<dyn Recognizer>,
        order: TranscriptionOrder,
        on_error: ErrorCallback,
    ) -> VoxResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| VoxError::Runtime(format!("listener needs a tokio runtime: {}", e)))?;

        Ok(Self {
            source,
            recognizer,
            on_error,
            order,
            runtime,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            capture_gate: Arc::new(Mutex::new(())),
        })
    }

    pub fn is_listening(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// One blocking capture-and-transcribe cycle.
    ///
    /// Returns `None` on silence or when recognition fails; service failures
    /// are also reported through the error callback.
    pub async fn listen_once(&self, timeout: Duration) -> Option<String> {
        let source = Arc::clone(&self.source);
        let gate = Arc::clone(&self.capture_gate);
        let captured = tokio::task::spawn_blocking(move || {
            let never = AtomicBool::new(false);
            let _gate = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            source.capture(timeout, &never)
        })
        .await;

        let segment = match captured {
            Ok(Ok(Some(segment))) => segment,
            Ok(Ok(None)) => {
                debug!("⏰ Listening timeout - no speech detected");
                return None;
            }
            Ok(Err(e)) => {
                (self.on_error)(&e);
                return None;
            }
            Err(e) => {
                (self.on_error)(&VoxError::Runtime(format!("capture task failed: {}", e)));
                return None;
            }
        };

        transcribe(self.recognizer.as_ref(), &segment, &self.on_error).await
    }

    /// Start the background capture loop. Returns `false` if already running.
    pub fn start_continuous(&self, on_text: TextCallback) -> VoxResult<bool> {
        let mut worker = self.worker.lock()?;
        if worker.is_some() {
            warn!("⚠️ Already listening");
            return Ok(false);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let deliver = self.segment_sink(on_text, Arc::clone(&stop));
        let (done_tx, done_rx) = std_mpsc::channel();
        let source = Arc::clone(&self.source);
        let gate = Arc::clone(&self.capture_gate);
        let on_error = Arc::clone(&self.on_error);
        let thread_stop = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("voxbridge-capture".into())
            .spawn(move || {
                capture_loop(source.as_ref(), &gate, &thread_stop, &on_error, deliver);
                let _ = done_tx.send(());
            })?;

        *worker = Some(CaptureWorker {
            thread,
            done: done_rx,
            stop,
        });
        self.running.store(true, Ordering::SeqCst);
        info!("🎤 Started continuous listening on {}", self.source.name());
        Ok(true)
    }

    /// Signal the capture loop to exit and join it with a bounded wait.
    ///
    /// Blocks the calling thread for up to [`STOP_WAIT`]; async callers
    /// should use [`Self::stop_continuous_async`]. Returns `false` if
    /// nothing was running.
    pub fn stop_continuous(&self) -> bool {
        match self.signal_stop() {
            Some(worker) => {
                worker.join();
                true
            }
            None => false,
        }
    }

    /// Like [`Self::stop_continuous`], joining on the blocking pool
    pub async fn stop_continuous_async(&self) -> bool {
        let Some(worker) = self.signal_stop() else {
            return false;
        };
        if let Err(e) = tokio::task::spawn_blocking(move || worker.join()).await {
            warn!("⚠️ Joining capture thread failed: {}", e);
        }
        true
    }

    /// Raise the current worker's stop flag and hand the worker back for joining
    fn signal_stop(&self) -> Option<CaptureWorker> {
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = &worker {
            worker.stop.store(true, Ordering::SeqCst);
        }
        worker
    }

    /// Build the function the capture thread calls for every captured segment
    fn segment_sink(
        &self,
        on_text: TextCallback,
        stop: Arc<AtomicBool>,
    ) -> Box<dyn Fn(AudioSegment) + Send> {
        let recognizer = Arc::clone(&self.recognizer);
        let on_error = Arc::clone(&self.on_error);
        let runtime = self.runtime.clone();

        match self.order {
            TranscriptionOrder::Concurrent => Box::new(move |segment| {
                let recognizer = Arc::clone(&recognizer);
                let on_error = Arc::clone(&on_error);
                let on_text = Arc::clone(&on_text);
                let stop = Arc::clone(&stop);
                runtime.spawn(async move {
                    if let Some(text) = transcribe(recognizer.as_ref(), &segment, &on_error).await
                    {
                        deliver_unless_stopped(&stop, &on_text, text).await;
                    }
                });
            }),
            TranscriptionOrder::Sequential => {
                let (tx, mut rx) = mpsc::channel::<AudioSegment>(SEGMENT_QUEUE);
                let worker_stop = Arc::clone(&stop);
                runtime.spawn(async move {
                    while let Some(segment) = rx.recv().await {
                        if worker_stop.load(Ordering::SeqCst) {
                            continue;
                        }
                        if let Some(text) =
                            transcribe(recognizer.as_ref(), &segment, &on_error).await
                        {
                            deliver_unless_stopped(&worker_stop, &on_text, text).await;
                        }
                    }
                    debug!("Sequential transcription worker finished");
                });
                Box::new(move |segment| {
                    if tx.try_send(segment).is_err() {
                        warn!("⚠️ Transcription queue full, dropping segment");
                    }
                })
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        // The raised flag ends the loop; dropping the worker detaches it
        let _ = self.signal_stop();
    }
}

async fn deliver_unless_stopped(stop: &AtomicBool, on_text: &TextCallback, text: String) {
    if stop.load(Ordering::SeqCst) {
        debug!("Dropping '{}' recognized after stop", text);
        return;
    }
    on_text(text).await;
}

fn capture_loop(
    source: &dyn AudioSource,
    gate: &Mutex<()>,
    stop: &AtomicBool,
    on_error: &ErrorCallback,
    deliver: Box<dyn Fn(AudioSegment) + Send>,
) {
    while !stop.load(Ordering::SeqCst) {
        let captured = {
            let _gate = gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if stop.load(Ordering::SeqCst) {
                break;
            }
            source.capture(CAPTURE_WINDOW, stop)
        };

        match captured {
            Ok(Some(segment)) if !segment.is_empty() => {
                if stop.load(Ordering::SeqCst) {
                    debug!("Discarding segment captured during stop");
                    break;
                }
                deliver(segment);
            }
            Ok(_) => continue,
            Err(e) => {
                on_error(&e);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
}

async fn transcribe(
    recognizer: &dyn Recognizer,
    segment: &AudioSegment,
    on_error: &ErrorCallback,
) -> Option<String> {
    match recognizer.transcribe(segment).await {
        Ok(Some(text)) => {
            info!("✅ Recognized: '{}'", text);
            Some(text)
        }
        Ok(None) => {
            debug!("Speech not understood");
            None
        }
        Err(e) => {
            on_error(&e);
            None
        }
    }
}
