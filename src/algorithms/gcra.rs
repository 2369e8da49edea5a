//! Generic Cell Rate Algorithm.
//!
//! The entire state is one fractional number: the theoretical arrival
//! time (TAT) at which the next request would leave the limiter perfectly
//! conformant. With `period = window`, `limit = floor(rate * window)` and
//! `separation = period / limit`, a request is admitted while
//! `TAT - now <= period - separation`, which yields the same cap as the
//! sliding window but in O(1) state. TAT only moves forward on admission;
//! a denied request leaves it untouched. Timing is microsecond-resolution
//! store time, never the caller's clock.

use super::{count_from_reply, decision_from_reply, Limiter};
use crate::decision::Decision;
use crate::error::RateGateResult;
use crate::scripts;
use crate::store::RedisStore;
use crate::validation::ArgumentValidator;
use async_trait::async_trait;
use std::sync::Arc;

pub struct GcraLimiter {
    store: Arc<RedisStore>,
}

impl GcraLimiter {
    pub fn new(store: Arc<RedisStore>) -> Self {
        Self { store }
    }

    fn storage_key(key: &str) -> String {
        format!("gcra:{}", key)
    }
}

#[async_trait]
impl Limiter for GcraLimiter {
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
                &scripts::GCRA_ATTEMPT,
                &[Self::storage_key(key)],
                &[rate.to_string(), window.to_string()],
            )
            .await?;
        decision_from_reply(reply)
    }

    /// Best-effort usage proxy: seconds of accumulated schedule debt
    /// (`ceil(TAT - now)`, 0 when conformant). A slot count would need the
    /// rate, which this operation does not receive.
    async fn attempts(&self, key: &str, window: u64) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_window(window)?;

        let reply = self
            .store
            .run_script(&scripts::GCRA_ATTEMPTS, &[Self::storage_key(key)], &[])
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
                &scripts::GCRA_REMAINING,
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
                &scripts::GCRA_AVAILABLE_IN,
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
            .run_script(&scripts::GCRA_RESET, &[Self::storage_key(key)], &[])
            .await?;
        count_from_reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_carry_the_algorithm_tag() {
        assert_eq!(GcraLimiter::storage_key("u1"), "gcra:u1");
    }
}
