use crate::decision::{ConcurrencyDecision, Decision, RejectionCause};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub retry_after_seconds: u64,
    pub retries_left: u64,
    pub limit: u64,
    pub available_at: u64,
}

impl From<Decision> for CheckResponse {
    fn from(decision: Decision) -> Self {
        Self {
            allowed: decision.allowed,
            retry_after_seconds: decision.retry_after_seconds,
            retries_left: decision.retries_left,
            limit: decision.limit,
            available_at: decision.available_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConcurrencyCheckResponse {
    pub allowed: bool,
    pub gate_acquired: bool,
    pub rejection_cause: RejectionCause,
    pub current_in_flight: u64,
    pub max_in_flight: u64,
    pub retry_after_seconds: u64,
    pub retries_left: u64,
    pub limit: u64,
}

impl From<ConcurrencyDecision> for ConcurrencyCheckResponse {
    fn from(decision: ConcurrencyDecision) -> Self {
        let base = decision.as_decision();
        Self {
            allowed: decision.gate_acquired() && base.allowed,
            gate_acquired: decision.gate_acquired(),
            rejection_cause: decision.rejection_cause(),
            current_in_flight: decision.current_in_flight(),
            max_in_flight: decision.max_in_flight(),
            retry_after_seconds: base.retry_after_seconds,
            retries_left: base.retries_left,
            limit: base.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub key: String,
    pub algorithm: String,
    pub attempts: u64,
    pub remaining: u64,
    pub available_in_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub key: String,
    pub removed: u64,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub key: String,
    pub request_id: String,
    pub released: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub redis_connected: bool,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self::build("healthy", true)
    }

    pub fn unhealthy() -> Self {
        Self::build("unhealthy", false)
    }

    fn build(status: &str, redis_connected: bool) -> Self {
        Self {
            status: status.to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            redis_connected,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
