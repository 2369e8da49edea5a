//! Concurrency gate: a leased-slot semaphore in the store.
//!
//! Bounds the number of simultaneously in-flight operations per key,
//! independent of request rate. Each holder is a member of a sorted set
//! scored by its acquisition time; any member older than the lease
//! timeout counts as abandoned and is evicted on the next access, so a
//! crashed holder cannot wedge the gate.

use crate::error::RateGateResult;
use crate::scripts;
use crate::store::RedisStore;
use crate::validation::ArgumentValidator;
use std::sync::Arc;
use tracing::debug;

/// Result of a `try_acquire` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateAdmission {
    /// Whether the caller now holds a slot.
    pub acquired: bool,
    /// In-flight count observed by the script, including this acquisition
    /// when it succeeded.
    pub current_in_flight: u64,
}

#[derive(Clone)]
pub struct ConcurrencyGate {
    store: Arc<RedisStore>,
}

impl ConcurrencyGate {
    pub fn new(store: Arc<RedisStore>) -> Self {
        Self { store }
    }

    fn storage_key(key: &str) -> String {
        format!("gate:{}", key)
    }

    /// Atomically evict stale leases and, if a slot is free, take one.
    ///
    /// Re-using a `request_id` whose lease is still live is a no-op that
    /// reports `acquired = false`; the gate does not refcount.
    pub async fn try_acquire(
        &self,
        key: &str,
        request_id: &str,
        max_in_flight: u32,
        timeout: u64,
    ) -> RateGateResult<GateAdmission> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_request_id(request_id)?;
        ArgumentValidator::validate_gate_args(max_in_flight, timeout)?;

        let reply = self
            .store
            .run_script(
                &scripts::GATE_TRY_ACQUIRE,
                &[Self::storage_key(key)],
                &[
                    request_id.to_string(),
                    max_in_flight.to_string(),
                    timeout.to_string(),
                ],
            )
            .await?;

        let (acquired, current): (i64, i64) = redis::from_redis_value(&reply).map_err(|e| {
            crate::error::RateGateError::Transport(format!("malformed gate reply: {}", e))
        })?;

        let admission = GateAdmission {
            acquired: acquired == 1,
            current_in_flight: current.max(0) as u64,
        };
        debug!(
            key,
            request_id,
            acquired = admission.acquired,
            current = admission.current_in_flight,
            "gate try_acquire"
        );
        Ok(admission)
    }

    /// Hand a slot back. Idempotent: releasing an id that holds no lease
    /// succeeds silently.
    pub async fn release(&self, key: &str, request_id: &str) -> RateGateResult<()> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_request_id(request_id)?;

        self.store
            .remove_member(&Self::storage_key(key), request_id)
            .await?;
        Ok(())
    }

    /// Evict stale leases, then report the live in-flight count.
    pub async fn current(&self, key: &str, timeout: u64) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_gate_args(1, timeout)?;

        let reply = self
            .store
            .run_script(
                &scripts::GATE_CURRENT,
                &[Self::storage_key(key)],
                &[timeout.to_string()],
            )
            .await?;
        let count: i64 = redis::from_redis_value(&reply).map_err(|e| {
            crate::error::RateGateError::Transport(format!("malformed gate reply: {}", e))
        })?;
        Ok(count.max(0) as u64)
    }

    /// Evict stale leases and report how many were dropped.
    pub async fn cleanup(&self, key: &str, timeout: u64) -> RateGateResult<u64> {
        ArgumentValidator::validate_key(key)?;
        ArgumentValidator::validate_gate_args(1, timeout)?;

        let reply = self
            .store
            .run_script(
                &scripts::GATE_CLEANUP,
                &[Self::storage_key(key)],
                &[timeout.to_string()],
            )
            .await?;
        let removed: i64 = redis::from_redis_value(&reply).map_err(|e| {
            crate::error::RateGateError::Transport(format!("malformed gate reply: {}", e))
        })?;
        Ok(removed.max(0) as u64)
    }
}
