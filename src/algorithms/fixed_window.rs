//! Fixed window rate limiting.
//!
//! One integer counter per `(key, floor(now / window))` slot, capped at
//! `burst` per slot. The cap renews instantly at the slot boundary, so two
//! adjacent slots can each admit the full cap back to back; that is the
//! documented trade for the cheapest possible state.
//!
//! The base key holds the latest slot number so `reset` can delete the
//! live counter atomically without scanning for sibling slot keys; stale
//! slots die by their own TTL.

use super::{count_from_reply, decision_from_reply, Limiter};
use crate::decision::Decision;
use crate::error::RateGateResult;
use crate::scripts;
use crate::store::RedisStore;
use crate::validation::ArgumentValidator;
use async_trait::async_trait;
use std::sync::Arc;

pub struct FixedWindowLimiter {
    store: Arc<RedisStore>,
}

impl FixedWindowLimiter {
    pub fn new(store: Arc<RedisStore>) -> Self {
        Self { store }
    }

    fn storage_key(key: &str) -> String {
        format!("fixed:{}", key)
    }
}

#[async_trait]
impl Limiter for FixedWindowLimiter {
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
                &scripts::FIXED_ATTEMPT,
                &[Self::storage_key(key)],
                &[burst.to_string(), window.to_string()],
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
                &scripts::FIXED_ATTEMPTS,
                &[Self::storage_key(key)],
                &[window.to_string()],
            )
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
                &scripts::FIXED_REMAINING,
                &[Self::storage_key(key)],
                &[burst.to_string(), window.to_string()],
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
                &scripts::FIXED_AVAILABLE_IN,
                &[Self::storage_key(key)],
                &[burst.to_string(), window.to_string()],
            )
            .await?;
        count_from_reply(reply)
    }

    async fn reset(&self, key: &str) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;

        let reply = self
            .store
            .run_script(&scripts::FIXED_RESET, &[Self::storage_key(key)], &[])
            .await?;
        count_from_reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_the_algorithm_tag() {
        assert_eq!(FixedWindowLimiter::storage_key("u1"), "fixed:u1");
    }
}
