//! Sliding window rate limiting.
//!
//! Tracks one sorted-set entry per admitted request, scored by the store's
//! epoch second. Entries older than the window are evicted before every
//! read, so the cap `floor(rate * window)` holds over any rolling window,
//! not just aligned ones. The `burst` argument is ignored; this algorithm
//! is smooth by construction.

use super::{count_from_reply, decision_from_reply, Limiter};
use crate::decision::Decision;
use crate::error::RateGateResult;
use crate::scripts;
use crate::store::RedisStore;
use crate::validation::ArgumentValidator;
use async_trait::async_trait;
use std::sync::Arc;

pub struct SlidingWindowLimiter {
    store: Arc<RedisStore>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<RedisStore>) -> Self {
        Self { store }
    }

    fn storage_key(key: &str) -> String {
        format!("sliding:{}", key)
    }
}

#[async_trait]
impl Limiter for SlidingWindowLimiter {
    async fn attempt(
        &self,
        key: &str,
        _burst: u32,
        rate: f64,
        window: u64,
    ) -> RateGateResult<Decision> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_limit_args(1, rate, window)?;

        let reply = self
            .store
            .run_script(
                &scripts::SLIDING_ATTEMPT,
                &[Self::storage_key(key)],
                &[rate.to_string(), window.to_string()],
            )
            .await?;
        decision_from_reply(reply)
    }

    async fn attempts(&self, key: &str, window: u64) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_window(window)?;

        let reply = self
            .store
            .run_script(
                &scripts::SLIDING_ATTEMPTS,
                &[Self::storage_key(key)],
                &[window.to_string()],
            )
            .await?;
        count_from_reply(reply)
    }

    async fn remaining(
        &self,
        key: &str,
        _burst: u32,
        rate: f64,
        window: u64,
    ) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_limit_args(1, rate, window)?;

        let reply = self
            .store
            .run_script(
                &scripts::SLIDING_REMAINING,
                &[Self::storage_key(key)],
                &[rate.to_string(), window.to_string()],
            )
            .await?;
        count_from_reply(reply)
    }

    async fn available_in(
        &self,
        key: &str,
        _burst: u32,
        rate: f64,
        window: u64,
    ) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_limit_args(1, rate, window)?;

        let reply = self
            .store
            .run_script(
                &scripts::SLIDING_AVAILABLE_IN,
                &[Self::storage_key(key)],
                &[rate.to_string(), window.to_string()],
            )
            .await?;
        count_from_reply(reply)
    }

    async fn reset(&self, key: &str) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;

        let reply = self
            .store
            .run_script(&scripts::SLIDING_RESET, &[Self::storage_key(key)], &[])
            .await?;
        count_from_reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_the_algorithm_tag() {
        assert_eq!(SlidingWindowLimiter::storage_key("u1"), "sliding:u1");
    }
}
