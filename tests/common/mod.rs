#![allow(dead_code)]

pub mod mock_asr;
pub mod mock_audio;
pub mod mock_tts;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use voxbridge::error::{ErrorCallback, VoxError};

/// Error callback that keeps every reported message
pub fn collecting_errors() -> (ErrorCallback, Arc<Mutex<Vec<String>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let callback: ErrorCallback = Arc::new(move |err: &VoxError| {
        sink.lock().unwrap().push(err.to_string());
    });
    (callback, errors)
}

/// Poll `check` until it holds or `limit` passes
pub async fn wait_for<F: Fn() -> bool>(check: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
