//! The factory: the one entry point other code sees.
//!
//! Holds nothing but the store handle; every constructor is cheap and
//! safe to call from any task.

use crate::algorithms::{
    Algorithm, FixedWindowLimiter, GcraLimiter, LeakyBucketLimiter, Limiter,
    SlidingWindowLimiter, TokenBucketLimiter,
};
use crate::concurrency::ConcurrencyLimiter;
use crate::error::RateGateResult;
use crate::gate::ConcurrencyGate;
use crate::store::RedisStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct LimiterFactory {
    store: Arc<RedisStore>,
}

impl LimiterFactory {
    pub fn new(store: Arc<RedisStore>) -> Self {
        Self { store }
    }

    pub fn from_url(redis_url: &str) -> RateGateResult<Self> {
        Ok(Self::new(Arc::new(RedisStore::new(redis_url)?)))
    }

    pub fn store(&self) -> Arc<RedisStore> {
        Arc::clone(&self.store)
    }

    pub fn sliding_window(&self) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(self.store())
    }

    pub fn fixed_window(&self) -> FixedWindowLimiter {
        FixedWindowLimiter::new(self.store())
    }

    pub fn leaky_bucket(&self) -> LeakyBucketLimiter {
        LeakyBucketLimiter::new(self.store())
    }

    pub fn token_bucket(&self) -> TokenBucketLimiter {
        TokenBucketLimiter::new(self.store())
    }

    pub fn gcra(&self) -> GcraLimiter {
        GcraLimiter::new(self.store())
    }

    /// Construct any algorithm behind the uniform trait object.
    pub fn limiter(&self, algorithm: Algorithm) -> Arc<dyn Limiter> {
        match algorithm {
            Algorithm::SlidingWindow => Arc::new(self.sliding_window()),
            Algorithm::FixedWindow => Arc::new(self.fixed_window()),
            Algorithm::LeakyBucket => Arc::new(self.leaky_bucket()),
            Algorithm::TokenBucket => Arc::new(self.token_bucket()),
            Algorithm::Gcra => Arc::new(self.gcra()),
        }
    }

    pub fn gate(&self) -> ConcurrencyGate {
        ConcurrencyGate::new(self.store())
    }

    /// Compose the gate with a base algorithm, or run a pure gate when
    /// `base` is `None`.
    pub fn with_concurrency(&self, base: Option<Algorithm>) -> ConcurrencyLimiter {
        ConcurrencyLimiter::new(self.gate(), base.map(|algorithm| self.limiter(algorithm)))
    }
}

impl std::fmt::Debug for LimiterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterFactory").finish_non_exhaustive()
    }
}
