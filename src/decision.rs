//! Admission decision values.
//!
//! Every admission call returns a [`Decision`]; the concurrency-aware
//! composer returns a [`ConcurrencyDecision`], a tagged outcome that names
//! which mechanism rejected the call and projects back to the base shape
//! for uniform callers.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of a rate-limit admission call.
///
/// A pure value with no identity; never mutated after construction. A
/// denied decision is the normal return shape, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the caller may proceed.
    pub allowed: bool,
    /// Seconds until the next attempt can succeed. `0` iff allowed.
    pub retry_after_seconds: u64,
    /// Admissions still available in the current budgeting horizon.
    pub retries_left: u64,
    /// The effective cap reported to the caller (burst capacity, window
    /// count, or bucket size depending on the algorithm).
    pub limit: u64,
}

impl Decision {
    pub fn allowed(retries_left: u64, limit: u64) -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0,
            retries_left,
            limit,
        }
    }

    pub fn denied(retry_after_seconds: u64, limit: u64) -> Self {
        Self {
            allowed: false,
            retry_after_seconds: retry_after_seconds.max(1),
            retries_left: 0,
            limit,
        }
    }

    /// Wall-clock second at which the next admission becomes possible.
    ///
    /// Derived for caller observability only; the store clock governs the
    /// actual decision.
    pub fn available_at(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now + self.retry_after_seconds
    }
}

/// Which mechanism rejected a concurrency-aware admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionCause {
    None,
    GateExhausted,
    RateExceeded,
}

/// Outcome of a concurrency-aware admission call.
///
/// `Allowed` means the caller holds a gate slot and must eventually release
/// it. `DeniedByGate` means the base limiter was never consulted and its
/// state is untouched. `DeniedByRate` means a slot was briefly taken and
/// has already been handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyDecision {
    Allowed {
        decision: Decision,
        current_in_flight: u64,
        max_in_flight: u64,
    },
    DeniedByRate {
        decision: Decision,
        current_in_flight: u64,
        max_in_flight: u64,
    },
    DeniedByGate {
        current_in_flight: u64,
        max_in_flight: u64,
    },
}

impl ConcurrencyDecision {
    /// True iff the call still holds a concurrency slot.
    pub fn gate_acquired(&self) -> bool {
        matches!(self, ConcurrencyDecision::Allowed { .. })
    }

    pub fn rejection_cause(&self) -> RejectionCause {
        match self {
            ConcurrencyDecision::Allowed { .. } => RejectionCause::None,
            ConcurrencyDecision::DeniedByRate { .. } => RejectionCause::RateExceeded,
            ConcurrencyDecision::DeniedByGate { .. } => RejectionCause::GateExhausted,
        }
    }

    pub fn current_in_flight(&self) -> u64 {
        match self {
            ConcurrencyDecision::Allowed {
                current_in_flight, ..
            }
            | ConcurrencyDecision::DeniedByRate {
                current_in_flight, ..
            }
            | ConcurrencyDecision::DeniedByGate {
                current_in_flight, ..
            } => *current_in_flight,
        }
    }

    pub fn max_in_flight(&self) -> u64 {
        match self {
            ConcurrencyDecision::Allowed { max_in_flight, .. }
            | ConcurrencyDecision::DeniedByRate { max_in_flight, .. }
            | ConcurrencyDecision::DeniedByGate { max_in_flight, .. } => *max_in_flight,
        }
    }

    /// Projection to the base shape for callers that do not care about the
    /// rejection cause. A gate rejection projects to `retry_after = 1` with
    /// the gate size as the reported limit.
    pub fn as_decision(&self) -> Decision {
        match self {
            ConcurrencyDecision::Allowed { decision, .. }
            | ConcurrencyDecision::DeniedByRate { decision, .. } => *decision,
            ConcurrencyDecision::DeniedByGate { max_in_flight, .. } => {
                Decision::denied(1, *max_in_flight)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_iff_no_wait() {
        let ok = Decision::allowed(5, 10);
        assert!(ok.allowed);
        assert_eq!(ok.retry_after_seconds, 0);

        let no = Decision::denied(30, 10);
        assert!(!no.allowed);
        assert_eq!(no.retry_after_seconds, 30);
        assert_eq!(no.retries_left, 0);
    }

    #[test]
    fn denied_wait_is_never_zero() {
        let no = Decision::denied(0, 10);
        assert_eq!(no.retry_after_seconds, 1);
    }

    #[test]
    fn available_at_is_in_the_future_when_denied() {
        let no = Decision::denied(60, 10);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert!(no.available_at() >= now + 59);
    }

    #[test]
    fn gate_rejection_carries_no_slot_and_projects_denied() {
        let d = ConcurrencyDecision::DeniedByGate {
            current_in_flight: 4,
            max_in_flight: 4,
        };
        assert!(!d.gate_acquired());
        assert_eq!(d.rejection_cause(), RejectionCause::GateExhausted);
        let projected = d.as_decision();
        assert!(!projected.allowed);
        assert_eq!(projected.retry_after_seconds, 1);
        assert_eq!(projected.limit, 4);
    }

    #[test]
    fn rate_rejection_released_its_slot() {
        let d = ConcurrencyDecision::DeniedByRate {
            decision: Decision::denied(12, 100),
            current_in_flight: 2,
            max_in_flight: 50,
        };
        assert!(!d.gate_acquired());
        assert_eq!(d.rejection_cause(), RejectionCause::RateExceeded);
        assert_eq!(d.as_decision().retry_after_seconds, 12);
    }

    #[test]
    fn allowed_holds_its_slot() {
        let d = ConcurrencyDecision::Allowed {
            decision: Decision::allowed(9, 10),
            current_in_flight: 1,
            max_in_flight: 2,
        };
        assert!(d.gate_acquired());
        assert_eq!(d.rejection_cause(), RejectionCause::None);
        assert_eq!(d.current_in_flight(), 1);
        assert_eq!(d.max_in_flight(), 2);
    }
}
