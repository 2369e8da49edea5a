use crate::decision::{ConcurrencyDecision, Decision, RejectionCause};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-key admission counters for the playground. The core never records
/// anything here; only the HTTP layer feeds it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeyMetrics {
    pub total: u64,
    pub allowed: u64,
    pub denied_by_rate: u64,
    pub denied_by_gate: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    per_key: Arc<RwLock<HashMap<String, KeyMetrics>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_decision(&self, key: &str, decision: &Decision) {
        let mut per_key = self.per_key.write().await;
        let metrics = per_key.entry(key.to_string()).or_default();
        metrics.total += 1;
        if decision.allowed {
            metrics.allowed += 1;
        } else {
            metrics.denied_by_rate += 1;
        }
    }

    pub async fn record_concurrency(&self, key: &str, decision: &ConcurrencyDecision) {
        let mut per_key = self.per_key.write().await;
        let metrics = per_key.entry(key.to_string()).or_default();
        metrics.total += 1;
        match decision.rejection_cause() {
            RejectionCause::None => metrics.allowed += 1,
            RejectionCause::RateExceeded => metrics.denied_by_rate += 1,
            RejectionCause::GateExhausted => metrics.denied_by_gate += 1,
        }
    }

    pub async fn key_metrics(&self, key: &str) -> Option<KeyMetrics> {
        self.per_key.read().await.get(key).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, KeyMetrics> {
        self.per_key.read().await.clone()
    }

    pub async fn global(&self) -> KeyMetrics {
        let per_key = self.per_key.read().await;
        let mut global = KeyMetrics::default();
        for metrics in per_key.values() {
            global.total += metrics.total;
            global.allowed += metrics.allowed;
            global.denied_by_rate += metrics.denied_by_rate;
            global.denied_by_gate += metrics.denied_by_gate;
        }
        global
    }

    pub async fn reset_key(&self, key: &str) {
        self.per_key.write().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_split_by_cause() {
        let collector = MetricsCollector::new();
        collector
            .record_decision("k", &Decision::allowed(9, 10))
            .await;
        collector.record_decision("k", &Decision::denied(5, 10)).await;
        collector
            .record_concurrency(
                "k",
                &ConcurrencyDecision::DeniedByGate {
                    current_in_flight: 2,
                    max_in_flight: 2,
                },
            )
            .await;

        let metrics = collector.key_metrics("k").await.unwrap();
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.allowed, 1);
        assert_eq!(metrics.denied_by_rate, 1);
        assert_eq!(metrics.denied_by_gate, 1);
    }

    #[tokio::test]
    async fn global_rolls_up_all_keys() {
        let collector = MetricsCollector::new();
        collector
            .record_decision("a", &Decision::allowed(1, 2))
            .await;
        collector
            .record_decision("b", &Decision::allowed(1, 2))
            .await;

        let global = collector.global().await;
        assert_eq!(global.total, 2);
        assert_eq!(global.allowed, 2);
    }

    #[tokio::test]
    async fn reset_forgets_a_key() {
        let collector = MetricsCollector::new();
        collector
            .record_decision("a", &Decision::allowed(1, 2))
            .await;
        collector.reset_key("a").await;
        assert!(collector.key_metrics("a").await.is_none());
    }
}
