//! Error handling for the rategate engine.

use std::fmt;

/// Errors surfaced by the engine.
///
/// A denied admission is never an error; it comes back as a
/// [`Decision`](crate::decision::Decision) with `allowed = false`.
#[derive(Debug, Clone)]
pub enum RateGateError {
    /// The store was unreachable, timed out, or returned an operational
    /// failure. Safe to retry: every script runs atomically, so a failed
    /// round trip left no partial state behind.
    Transport(String),
    /// The store returned a different hash than the one computed from our
    /// script source. The running binary and the loaded script disagree,
    /// which only a bad build can produce. Fatal.
    ScriptDrift {
        script: &'static str,
        expected: String,
        actual: String,
    },
    /// A caller-supplied argument was outside its domain (zero burst,
    /// non-positive rate, zero window, malformed key, ...). No state was
    /// touched.
    InvalidArgument(String),
    /// Startup configuration problem.
    Config(String),
}

pub type RateGateResult<T> = Result<T, RateGateError>;

impl fmt::Display for RateGateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateGateError::Transport(msg) => write!(f, "store transport error: {}", msg),
            RateGateError::ScriptDrift {
                script,
                expected,
                actual,
            } => write!(
                f,
                "script hash drift for '{}': expected {}, store returned {}",
                script, expected, actual
            ),
            RateGateError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            RateGateError::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RateGateError {}

impl From<redis::RedisError> for RateGateError {
    fn from(error: redis::RedisError) -> Self {
        match error.kind() {
            redis::ErrorKind::IoError => {
                RateGateError::Transport(format!("connection lost: {}", error))
            }
            redis::ErrorKind::AuthenticationFailed => {
                RateGateError::Transport("authentication failed".to_string())
            }
            _ => RateGateError::Transport(format!("redis error: {}", error)),
        }
    }
}

impl RateGateError {
    /// True for failures a caller may retry verbatim.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RateGateError::Transport(_))
    }
}
