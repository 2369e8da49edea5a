//! Leaky bucket rate limiting.
//!
//! The bucket holds `level` units and drains one unit every
//! `ceil(1 / rate)` seconds. An attempt that finds room increments the
//! level and stamps `last_leak`; an attempt that finds the bucket full is
//! denied and leaves the state exactly as it was.

use super::{count_from_reply, decision_from_reply, Limiter};
use crate::decision::Decision;
use crate::error::RateGateResult;
use crate::scripts;
use crate::store::RedisStore;
use crate::validation::ArgumentValidator;
use async_trait::async_trait;
use std::sync::Arc;

pub struct LeakyBucketLimiter {
    store: Arc<RedisStore>,
}

impl LeakyBucketLimiter {
    pub fn new(store: Arc<RedisStore>) -> Self {
        Self { store }
    }

    fn storage_key(key: &str) -> String {
        format!("leaky:{}", key)
    }
}

#[async_trait]
impl Limiter for LeakyBucketLimiter {
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
                &scripts::LEAKY_ATTEMPT,
                &[Self::storage_key(key)],
                &[burst.to_string(), rate.to_string(), window.to_string()],
            )
            .await?;
        decision_from_reply(reply)
    }

    /// Reports the stored fill level without simulating drain; a bucket
    /// idle since its last attempt may read higher than its effective
    /// level until the next mutation.
    async fn attempts(&self, key: &str, window: u64) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_window(window)?;

        let reply = self
            .store
            .run_script(&scripts::LEAKY_ATTEMPTS, &[Self::storage_key(key)], &[])
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
                &scripts::LEAKY_REMAINING,
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
                &scripts::LEAKY_AVAILABLE_IN,
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
            .run_script(&scripts::LEAKY_RESET, &[Self::storage_key(key)], &[])
            .await?;
        count_from_reply(reply)
    }
}
