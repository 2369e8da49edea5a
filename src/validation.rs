//! Synchronous argument-domain validation.
//!
//! Every public operation checks its arguments before any store I/O, so a
//! domain error never touches state.

use crate::error::{RateGateError, RateGateResult};

/// Maximum accepted length for limit keys and request ids.
const MAX_KEY_LENGTH: usize = 256;

pub struct ArgumentValidator;

impl ArgumentValidator {
    /// Validates a caller-supplied limit key.
    ///
    /// Keys become part of store key names, so the charset is restricted
    /// the same way for every algorithm.
    pub fn validate_key(key: &str) -> RateGateResult<()> {
        if key.is_empty() {
            return Err(RateGateError::InvalidArgument(
                "key must not be empty".to_string(),
            ));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(RateGateError::InvalidArgument(format!(
                "key exceeds {} characters",
                MAX_KEY_LENGTH
            )));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.' | '@' | '/'))
        {
            return Err(RateGateError::InvalidArgument(format!(
                "key '{}' contains characters outside [A-Za-z0-9-_:.@/]",
                key
            )));
        }
        Ok(())
    }

    pub fn validate_limit_args(burst: u32, rate: f64, window: u64) -> RateGateResult<()> {
        if burst == 0 {
            return Err(RateGateError::InvalidArgument(
                "burst must be greater than 0".to_string(),
            ));
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateGateError::InvalidArgument(
                "rate must be a positive number".to_string(),
            ));
        }
        if window == 0 {
            return Err(RateGateError::InvalidArgument(
                "window must be greater than 0 seconds".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_window(window: u64) -> RateGateResult<()> {
        if window == 0 {
            return Err(RateGateError::InvalidArgument(
                "window must be greater than 0 seconds".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_request_id(request_id: &str) -> RateGateResult<()> {
        if request_id.is_empty() {
            return Err(RateGateError::InvalidArgument(
                "request id must not be empty".to_string(),
            ));
        }
        if request_id.len() > MAX_KEY_LENGTH {
            return Err(RateGateError::InvalidArgument(format!(
                "request id exceeds {} characters",
                MAX_KEY_LENGTH
            )));
        }
        Ok(())
    }

    pub fn validate_gate_args(max_in_flight: u32, timeout: u64) -> RateGateResult<()> {
        if max_in_flight == 0 {
            return Err(RateGateError::InvalidArgument(
                "max_in_flight must be greater than 0".to_string(),
            ));
        }
        if timeout == 0 {
            return Err(RateGateError::InvalidArgument(
                "gate timeout must be greater than 0 seconds".to_string(),
            ));
        }
        Ok(())
    }

    /// Playground-only: probability of an injected failure.
    pub fn validate_error_chance(error_chance: f64) -> RateGateResult<()> {
        if !error_chance.is_finite() || !(0.0..=1.0).contains(&error_chance) {
            return Err(RateGateError::InvalidArgument(
                "error_chance must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
