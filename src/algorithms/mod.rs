//! Rate limiting algorithms.
//!
//! Five interchangeable admission algorithms, each a thin wrapper around
//! its catalogue scripts. They share one contract: `attempt` is the only
//! mutating call; everything else is best-effort observation.

pub mod fixed_window;
pub mod gcra;
pub mod leaky_bucket;
pub mod sliding_window;
pub mod token_bucket;

pub use fixed_window::FixedWindowLimiter;
pub use gcra::GcraLimiter;
pub use leaky_bucket::LeakyBucketLimiter;
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

use crate::decision::Decision;
use crate::error::{RateGateError, RateGateResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The uniform admission contract.
///
/// `burst`, `rate` and `window` keep one meaning per algorithm (see each
/// module); keys are independent across algorithms because every limiter
/// prefixes its own tag on the wire.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Try to admit one request. The only call that mutates state.
    async fn attempt(
        &self,
        key: &str,
        burst: u32,
        rate: f64,
        window: u64,
    ) -> RateGateResult<Decision>;

    /// Best-effort current usage.
    async fn attempts(&self, key: &str, window: u64) -> RateGateResult<u64>;

    /// Admissions still available right now.
    async fn remaining(
        &self,
        key: &str,
        burst: u32,
        rate: f64,
        window: u64,
    ) -> RateGateResult<u64>;

    /// Seconds until the next admission can succeed (0 when one would
    /// succeed immediately).
    async fn available_in(
        &self,
        key: &str,
        burst: u32,
        rate: f64,
        window: u64,
    ) -> RateGateResult<u64>;

    /// Delete all state for a key; returns the number of entries removed.
    async fn reset(&self, key: &str) -> RateGateResult<u64>;
}

/// Algorithm selector used by the factory and the playground API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    SlidingWindow,
    FixedWindow,
    LeakyBucket,
    TokenBucket,
    Gcra,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::SlidingWindow,
        Algorithm::FixedWindow,
        Algorithm::LeakyBucket,
        Algorithm::TokenBucket,
        Algorithm::Gcra,
    ];

    /// The stable prefix tag this algorithm writes in front of every key.
    pub fn prefix(&self) -> &'static str {
        match self {
            Algorithm::SlidingWindow => "sliding",
            Algorithm::FixedWindow => "fixed",
            Algorithm::LeakyBucket => "leaky",
            Algorithm::TokenBucket => "token",
            Algorithm::Gcra => "gcra",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::SlidingWindow => "sliding_window",
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::LeakyBucket => "leaky_bucket",
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::Gcra => "gcra",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Algorithm {
    type Err = RateGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sliding_window" | "sliding" => Ok(Algorithm::SlidingWindow),
            "fixed_window" | "fixed" => Ok(Algorithm::FixedWindow),
            "leaky_bucket" | "leaky" => Ok(Algorithm::LeakyBucket),
            "token_bucket" | "token" => Ok(Algorithm::TokenBucket),
            "gcra" => Ok(Algorithm::Gcra),
            other => Err(RateGateError::InvalidArgument(format!(
                "unknown algorithm '{}'",
                other
            ))),
        }
    }
}

/// Parse the `{allowed, retry_after, retries_left, limit}` tuple every
/// attempt script returns.
pub(crate) fn decision_from_reply(value: redis::Value) -> RateGateResult<Decision> {
    let (allowed, retry_after, retries_left, limit): (i64, i64, i64, i64) =
        redis::from_redis_value(&value).map_err(|e| {
            RateGateError::Transport(format!("malformed script reply: {}", e))
        })?;

    Ok(Decision {
        allowed: allowed == 1,
        retry_after_seconds: retry_after.max(0) as u64,
        retries_left: retries_left.max(0) as u64,
        limit: limit.max(0) as u64,
    })
}

/// Parse the single integer read-only scripts return.
pub(crate) fn count_from_reply(value: redis::Value) -> RateGateResult<u64> {
    let count: i64 = redis::from_redis_value(&value).map_err(|e| {
        RateGateError::Transport(format!("malformed script reply: {}", e))
    })?;
    Ok(count.max(0) as u64)
}
