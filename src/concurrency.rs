//! Concurrency-aware admission: rate limit and gate as one decision.
//!
//! The gate is checked first: a caller that cannot get a slot must not
//! burn rate budget, and its rejection names the gate as the cause. When
//! the gate admits but the base limiter denies, the slot is handed back
//! before returning so a rate-denied call nets zero gate change. Without
//! a base limiter the composer degrades to a pure gate.

use crate::decision::{ConcurrencyDecision, Decision};
use crate::error::RateGateResult;
use crate::gate::ConcurrencyGate;
use crate::algorithms::Limiter;
use std::sync::Arc;
use tracing::warn;

pub struct ConcurrencyLimiter {
    gate: ConcurrencyGate,
    base: Option<Arc<dyn Limiter>>,
}

impl ConcurrencyLimiter {
    pub fn new(gate: ConcurrencyGate, base: Option<Arc<dyn Limiter>>) -> Self {
        Self { gate, base }
    }

    /// Gate acquire, then base attempt, releasing the slot when the base
    /// denies. On success the caller holds a slot and must call
    /// [`release_concurrency`](Self::release_concurrency) when its work
    /// finishes; a forgotten release is reclaimed after `timeout`.
    #[allow(clippy::too_many_arguments)]
    pub async fn attempt_with_concurrency(
        &self,
        key: &str,
        request_id: &str,
        max_in_flight: u32,
        burst: u32,
        rate: f64,
        window: u64,
        timeout: u64,
    ) -> RateGateResult<ConcurrencyDecision> {
        let admission = self
            .gate
            .try_acquire(key, request_id, max_in_flight, timeout)
            .await?;

        if !admission.acquired {
            return Ok(ConcurrencyDecision::DeniedByGate {
                current_in_flight: admission.current_in_flight,
                max_in_flight: max_in_flight as u64,
            });
        }

        let base = match &self.base {
            Some(base) => base,
            // Pure gate mode: the slot itself is the admission.
            None => {
                return Ok(ConcurrencyDecision::Allowed {
                    decision: Decision::allowed(u64::MAX, max_in_flight as u64),
                    current_in_flight: admission.current_in_flight,
                    max_in_flight: max_in_flight as u64,
                });
            }
        };

        match base.attempt(key, burst, rate, window).await {
            Ok(decision) if decision.allowed => Ok(ConcurrencyDecision::Allowed {
                decision,
                current_in_flight: admission.current_in_flight,
                max_in_flight: max_in_flight as u64,
            }),
            Ok(decision) => {
                self.gate.release(key, request_id).await?;
                Ok(ConcurrencyDecision::DeniedByRate {
                    decision,
                    current_in_flight: admission.current_in_flight.saturating_sub(1),
                    max_in_flight: max_in_flight as u64,
                })
            }
            Err(err) => {
                // The slot must not outlive a failed attempt; if the
                // release also fails the lease timeout reclaims it.
                if let Err(release_err) = self.gate.release(key, request_id).await {
                    warn!(
                        key,
                        request_id,
                        error = %release_err,
                        "failed to release gate slot after attempt error"
                    );
                }
                Err(err)
            }
        }
    }

    /// Release the slot held by `request_id`. Idempotent.
    pub async fn release_concurrency(&self, key: &str, request_id: &str) -> RateGateResult<()> {
        self.gate.release(key, request_id).await
    }

    /// Live in-flight count for a key after stale-lease eviction.
    pub async fn current_in_flight(&self, key: &str, timeout: u64) -> RateGateResult<u64> {
        self.gate.current(key, timeout).await
    }

    /// Evict abandoned leases; returns how many were dropped.
    pub async fn cleanup(&self, key: &str, timeout: u64) -> RateGateResult<u64> {
        self.gate.cleanup(key, timeout).await
    }

    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }
}
