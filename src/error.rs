//! VoxBridge Error Types
//!
//! Centralized error handling. Component-local failures are contained and
//! surfaced as data; only resource initialization returns these errors to
//! the caller.

use std::sync::Arc;
use thiserror::Error;

/// Central error type for VoxBridge
#[derive(Error, Debug)]
pub enum VoxError {
    #[error("Audio capture error: {0}")]
    Audio(String),

    #[error("Recognition service error: {0}")]
    RecognitionService(String),

    #[error("Synthesis failure: {0}")]
    Synthesis(String),

    #[error("Command handler failed: {0}")]
    Handler(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for VoxBridge operations
pub type VoxResult<T> = Result<T, VoxError>;

/// Side-channel for non-fatal failures (recognition service, synthesis, handler)
pub type ErrorCallback = Arc<dyn Fn(&VoxError) + Send + Sync>;

/// Error callback that only logs
pub fn log_errors() -> ErrorCallback {
    Arc::new(|err: &VoxError| tracing::warn!("⚠️ {}", err))
}

/// Helper to convert Mutex poison errors
impl<T> From<std::sync::PoisonError<T>> for VoxError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        VoxError::Lock(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poison_conversion() {
        let lock = std::sync::Mutex::new(0);
        let _ = std::panic::catch_unwind(|| {
            let _guard = lock.lock().unwrap();
            panic!("poison");
        });
        let err: VoxError = lock.lock().unwrap_err().into();
        assert!(matches!(err, VoxError::Lock(_)));
    }

    #[test]
    fn test_display() {
        let err = VoxError::RecognitionService("offline".into());
        assert_eq!(err.to_string(), "Recognition service error: offline");
    }
}
