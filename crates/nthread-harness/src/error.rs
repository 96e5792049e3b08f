//! Harness error type.

use thiserror::Error;

use nthread_core::ThreadError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("thread operation failed: {0}")]
    Thread(#[from] ThreadError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scenario {scenario}: {message}")]
    Invariant {
        scenario: &'static str,
        message: String,
    },
    #[error("invalid stress configuration: {0}")]
    Config(String),
}

impl HarnessError {
    /// POSIX errno attached to thread failures.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Thread(err) => Some(err.errno()),
            Self::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}
