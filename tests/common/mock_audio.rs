//! Mock Audio Source for Testing
//!
//! Hands out scripted segments, then behaves like a silent room.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use voxbridge::audio::{AudioSegment, AudioSource};
use voxbridge::error::{VoxError, VoxResult};

/// Segment whose first sample identifies it to [`super::mock_asr::MockRecognizer`]
pub fn tagged_segment(tag: i16) -> AudioSegment {
    let mut samples = vec![0i16; 160];
    samples[0] = tag;
    AudioSegment::new(samples)
}

pub enum Step {
    Segment(AudioSegment),
    Silence,
    Fail(String),
    /// A phrase that takes this long to finish, abandoned when cancelled
    LongPhrase(i16, Duration),
    /// A device read that blocks this long and ignores cancellation
    Stuck(i16, Duration),
}

pub struct MockAudio {
    steps: Mutex<VecDeque<Step>>,
    /// Number of capture calls made so far
    pub captures: AtomicUsize,
    /// Captures currently in progress
    pub active: AtomicUsize,
    /// Highest number of captures ever in progress at once
    pub max_active: AtomicUsize,
}

impl MockAudio {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            captures: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// One tagged segment per entry, in order
    pub fn with_tags(tags: &[i16]) -> Self {
        Self::new(
            tags.iter()
                .map(|tag| Step::Segment(tagged_segment(*tag)))
                .collect(),
        )
    }

    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }

    fn run(
        &self,
        step: Option<Step>,
        timeout: Duration,
        cancel: &AtomicBool,
    ) -> VoxResult<Option<AudioSegment>> {
        match step {
            Some(Step::Segment(segment)) => Ok(Some(segment)),
            Some(Step::Fail(message)) => Err(VoxError::Audio(message)),
            Some(Step::LongPhrase(tag, length)) => {
                let end = Instant::now() + length;
                while Instant::now() < end {
                    if cancel.load(Ordering::SeqCst) {
                        return Ok(None);
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(Some(tagged_segment(tag)))
            }
            Some(Step::Stuck(tag, length)) => {
                std::thread::sleep(length);
                Ok(Some(tagged_segment(tag)))
            }
            Some(Step::Silence) | None => {
                std::thread::sleep(timeout.min(Duration::from_millis(50)));
                Ok(None)
            }
        }
    }
}

impl AudioSource for MockAudio {
    fn capture(&self, timeout: Duration, cancel: &AtomicBool) -> VoxResult<Option<AudioSegment>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let step = self.steps.lock().unwrap().pop_front();
        let result = self.run(step, timeout, cancel);

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "mock microphone"
    }
}
