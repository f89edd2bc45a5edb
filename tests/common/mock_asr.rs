//! Mock Recognizer for Testing
//!
//! Maps the tag in a segment's first sample to a scripted transcript.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxbridge::asr::Recognizer;
use voxbridge::audio::AudioSegment;
use voxbridge::error::{VoxError, VoxResult};

#[derive(Clone)]
pub enum Reply {
    Text(String),
    Unintelligible,
    ServiceDown,
}

pub struct MockRecognizer {
    replies: HashMap<i16, (Reply, Duration)>,
    /// Tags in the order transcription finished
    pub finished: Arc<Mutex<Vec<i16>>>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            finished: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn phrase(mut self, tag: i16, text: &str) -> Self {
        self.replies
            .insert(tag, (Reply::Text(text.to_string()), Duration::ZERO));
        self
    }

    /// Like [`Self::phrase`] but transcription takes `delay`
    pub fn slow_phrase(mut self, tag: i16, text: &str, delay: Duration) -> Self {
        self.replies.insert(tag, (Reply::Text(text.to_string()), delay));
        self
    }

    pub fn reply(mut self, tag: i16, reply: Reply) -> Self {
        self.replies.insert(tag, (reply, Duration::ZERO));
        self
    }

    pub fn finished(&self) -> Vec<i16> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn transcribe(&self, segment: &AudioSegment) -> VoxResult<Option<String>> {
        let tag = segment.samples.first().copied().unwrap_or_default();
        let (reply, delay) = self
            .replies
            .get(&tag)
            .cloned()
            .unwrap_or((Reply::Unintelligible, Duration::ZERO));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.finished.lock().unwrap().push(tag);

        match reply {
            Reply::Text(text) => Ok(Some(text)),
            Reply::Unintelligible => Ok(None),
            Reply::ServiceDown => Err(VoxError::RecognitionService(
                "mock service unavailable".into(),
            )),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
