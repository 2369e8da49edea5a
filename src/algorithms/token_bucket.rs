//! Token bucket rate limiting.
//!
//! A bucket of at most `burst` tokens refilled at `rate` tokens per
//! second. Refill is gated behind `min_refill = max(1, 2 / rate)` elapsed
//! seconds: without that floor, a tight call loop sees a fractional but
//! nonzero refill on every pass and the observed burst creeps past the
//! declared capacity. With it, the bucket size is a hard upper bound at
//! any call frequency.

use super::{count_from_reply, decision_from_reply, Limiter};
use crate::decision::Decision;
use crate::error::RateGateResult;
use crate::scripts;
use crate::store::RedisStore;
use crate::validation::ArgumentValidator;
use async_trait::async_trait;
use std::sync::Arc;

pub struct TokenBucketLimiter {
    store: Arc<RedisStore>,
}

impl TokenBucketLimiter {
    pub fn new(store: Arc<RedisStore>) -> Self {
        Self { store }
    }

    fn storage_key(key: &str) -> String {
        format!("token:{}", key)
    }
}

#[async_trait]
impl Limiter for TokenBucketLimiter {
    async fn attempt(
        &self,
        key: &str,
        burst: u32,
        rate: f64,
        window: u64,
    ) -> RateGateResult<Decision> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_limit_args(burst, rate, window)?;

        let reply = self
            .store
            .run_script(
                &scripts::TOKEN_ATTEMPT,
                &[Self::storage_key(key)],
                &[burst.to_string(), rate.to_string(), window.to_string()],
            )
            .await?;
        decision_from_reply(reply)
    }

    /// Total attempts recorded against this key since its state was
    /// created, allowed and denied alike.
    async fn attempts(&self, key: &str, window: u64) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_window(window)?;

        let reply = self
            .store
            .run_script(&scripts::TOKEN_ATTEMPTS, &[Self::storage_key(key)], &[])
            .await?;
        count_from_reply(reply)
    }

    async fn remaining(
        &self,
        key: &str,
        burst: u32,
        rate: f64,
        window: u64,
    ) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_limit_args(burst, rate, window)?;

        let reply = self
            .store
            .run_script(
                &scripts::TOKEN_REMAINING,
                &[Self::storage_key(key)],
                &[burst.to_string(), rate.to_string()],
            )
            .await?;
        count_from_reply(reply)
    }

    async fn available_in(
        &self,
        key: &str,
        burst: u32,
        rate: f64,
        window: u64,
    ) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_limit_args(burst, rate, window)?;

        let reply = self
            .store
            .run_script(
                &scripts::TOKEN_AVAILABLE_IN,
                &[Self::storage_key(key)],
                &[burst.to_string(), rate.to_string()],
            )
            .await?;
        count_from_reply(reply)
    }

    async fn reset(&self, key: &str) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;

        let reply = self
            .store
            .run_script(&scripts::TOKEN_RESET, &[Self::storage_key(key)], &[])
            .await?;
        count_from_reply(reply)
    }
}
