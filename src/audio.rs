//! Audio capture module using cpal
//!
//! The microphone stream lives on its own thread (cpal streams are not
//! `Send`); chunks flow over a bounded channel and are cut into speech
//! segments by a simple energy detector.

use crate::error::{VoxError, VoxResult};
use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const SAMPLE_RATE: u32 = 16000;
const CHUNK_SIZE: usize = 1024;
/// Chunks buffered between captures before the callback starts dropping audio
const CHANNEL_DEPTH: usize = 256;
/// Chunks kept from before a capture starts, so leading syllables survive
const PREROLL_CHUNKS: usize = 4;
/// Silence that ends a phrase
const PAUSE: Duration = Duration::from_millis(800);
/// Longest wait on the device before the cancel flag is checked again
const CANCEL_POLL: Duration = Duration::from_millis(100);
/// No audio for this long mid-phrase means the device stalled
const STALL: Duration = Duration::from_secs(1);

/// A captured stretch of mono 16-bit audio
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioSegment {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioSegment {
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples,
            sample_rate: SAMPLE_RATE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Raw little-endian PCM, as expected by network recognizers
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// A microphone or any other producer of speech segments
pub trait AudioSource: Send + Sync {
    /// Block until one speech segment is captured.
    ///
    /// Returns `Ok(None)` when `timeout` elapses before any speech starts,
    /// or as soon as `cancel` is raised; a phrase cut short is discarded.
    fn capture(&self, timeout: Duration, cancel: &AtomicBool) -> VoxResult<Option<AudioSegment>>;

    /// Human readable device name
    fn name(&self) -> &str;
}

/// Calculate audio energy for VAD
pub fn calculate_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: i64 = samples.iter().map(|&s| (s as i64).pow(2)).sum();
    (sum as f32 / samples.len() as f32).sqrt()
}

/// Outcome of feeding one chunk to the [`Segmenter`]
#[derive(Debug, PartialEq)]
pub enum SegmentEvent {
    /// Still waiting for speech to start
    Waiting,
    /// Speech in progress
    Recording,
    /// Phrase finished (trailing pause or length limit)
    Complete(AudioSegment),
}

/// Energy-gated phrase detector
#[derive(Debug)]
pub struct Segmenter {
    threshold: f32,
    pause_samples: usize,
    max_samples: usize,
    preroll: VecDeque<Vec<i16>>,
    buffer: Vec<i16>,
    silent_run: usize,
    started: bool,
}

impl Segmenter {
    pub fn new(threshold: f32, phrase_limit: Duration) -> Self {
        Self {
            threshold,
            pause_samples: samples_for(PAUSE),
            max_samples: samples_for(phrase_limit).max(CHUNK_SIZE),
            preroll: VecDeque::with_capacity(PREROLL_CHUNKS),
            buffer: Vec::new(),
            silent_run: 0,
            started: false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.started
    }

    pub fn push(&mut self, chunk: &[i16]) -> SegmentEvent {
        let loud = calculate_energy(chunk) >= self.threshold;

        if !self.started {
            if !loud {
                if self.preroll.len() == PREROLL_CHUNKS {
                    self.preroll.pop_front();
                }
                self.preroll.push_back(chunk.to_vec());
                return SegmentEvent::Waiting;
            }
            self.started = true;
            for earlier in self.preroll.drain(..) {
                self.buffer.extend_from_slice(&earlier);
            }
        }

        self.buffer.extend_from_slice(chunk);
        if loud {
            self.silent_run = 0;
        } else {
            self.silent_run += chunk.len();
        }

        if self.silent_run >= self.pause_samples || self.buffer.len() >= self.max_samples {
            return SegmentEvent::Complete(self.finish());
        }
        SegmentEvent::Recording
    }

    /// Flush whatever was recorded so far
    pub fn finish(&mut self) -> AudioSegment {
        self.started = false;
        self.silent_run = 0;
        self.preroll.clear();
        AudioSegment::new(std::mem::take(&mut self.buffer))
    }
}

fn samples_for(duration: Duration) -> usize {
    (duration.as_secs_f32() * SAMPLE_RATE as f32) as usize
}

/// Physical microphone backed by a cpal input stream
pub struct Microphone {
    name: String,
    chunks: Mutex<Receiver<Vec<i16>>>,
    threshold: f32,
    phrase_limit: Duration,
    // Dropping this sender ends the stream thread
    _stop: SyncSender<()>,
}

impl Microphone {
    /// Open an input device and start streaming.
    ///
    /// Device errors are reported here, before any capture happens.
    pub fn open(
        device_index: Option<usize>,
        threshold: f32,
        phrase_limit: Duration,
    ) -> VoxResult<Self> {
        let (chunk_tx, chunk_rx) = mpsc::sync_channel::<Vec<i16>>(CHANNEL_DEPTH);
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<String>>();
        let (stop_tx, stop_rx) = mpsc::sync_channel::<()>(1);

        thread::Builder::new()
            .name("voxbridge-mic".into())
            .spawn(move || {
                let stream = match build_stream(device_index, chunk_tx) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until the Microphone is dropped
                let _ = stop_rx.recv();
                drop(stream);
                info!("🔇 Audio capture stopped");
            })?;

        let name = ready_rx
            .recv()
            .map_err(|_| VoxError::Audio("capture thread exited during startup".into()))?
            .map_err(|e| VoxError::Audio(format!("{:#}", e)))?;

        info!("🎙️ Audio capture started on {}", name);
        Ok(Self {
            name,
            chunks: Mutex::new(chunk_rx),
            threshold,
            phrase_limit,
            _stop: stop_tx,
        })
    }
}

impl AudioSource for Microphone {
    fn capture(&self, timeout: Duration, cancel: &AtomicBool) -> VoxResult<Option<AudioSegment>> {
        let chunks = self.chunks.lock()?;
        let mut segmenter = Segmenter::new(self.threshold, self.phrase_limit);

        // Audio queued while nobody was listening is only useful as preroll
        while let Ok(stale) = chunks.try_recv() {
            if let SegmentEvent::Complete(segment) = segmenter.push(&stale) {
                return Ok(Some(segment));
            }
        }

        let deadline = Instant::now() + timeout;
        let mut last_chunk = Instant::now();
        loop {
            if cancel.load(Ordering::SeqCst) {
                if segmenter.is_recording() {
                    debug!("Capture cancelled mid-phrase, dropping partial audio");
                }
                return Ok(None);
            }

            let now = Instant::now();
            if segmenter.is_recording() {
                if now.duration_since(last_chunk) >= STALL {
                    // Device stalled mid-phrase; hand over what we have
                    return Ok(Some(segmenter.finish()));
                }
            } else if now >= deadline {
                return Ok(None);
            }

            match chunks.recv_timeout(CANCEL_POLL) {
                Ok(chunk) => {
                    last_chunk = Instant::now();
                    if let SegmentEvent::Complete(segment) = segmenter.push(&chunk) {
                        debug!("Captured {:?} of audio", segment.duration());
                        return Ok(Some(segment));
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(VoxError::Audio("input stream closed".into()));
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn build_stream(
    device_index: Option<usize>,
    tx: SyncSender<Vec<i16>>,
) -> anyhow::Result<(cpal::Stream, String)> {
    let host = cpal::default_host();

    // List available devices
    info!("Available audio input devices:");
    for (i, device) in host.input_devices()?.enumerate() {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let marker = if device_index == Some(i) { "*" } else { " " };
        info!("  {} [{}] {}", marker, i, name);
    }

    // Select device
    let device = if let Some(idx) = device_index {
        host.input_devices()?
            .nth(idx)
            .context("Device index out of range")?
    } else {
        host.default_input_device()
            .context("No default input device")?
    };

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Fixed(CHUNK_SIZE as u32),
    };

    let stream = device.build_input_stream(
        &config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| match tx.try_send(data.to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Audio buffer full, dropping chunk"),
            Err(TrySendError::Disconnected(_)) => warn!("Audio receiver dropped"),
        },
        |err| {
            warn!("Audio stream error: {}", err);
        },
        None,
    )?;

    stream.play()?;
    Ok((stream, device_name))
}
