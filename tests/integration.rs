//! End-to-end tests against a live Redis.
//!
//! Each test acquires the store through `factory()`, which skips the test
//! with a note on stderr when nothing answers at `REDIS_URL` (default
//! redis://127.0.0.1:6379). Keys are unique per run so tests never
//! interfere with each other or with previous runs.
//!
//! Timing assertions are tolerant of one extra second where the store's
//! second-granularity clock can round an elapsed interval up.

use rategate::algorithms::Limiter;
use rategate::{Algorithm, LimiterFactory, RejectionCause};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn factory() -> Option<LimiterFactory> {
    let url = redis_url();
    let factory = LimiterFactory::from_url(&url).ok()?;
    if factory.store().ping().await.is_err() {
        eprintln!("skipping: no redis reachable at {}", url);
        return None;
    }
    Some(factory)
}

macro_rules! require_redis {
    () => {
        match factory().await {
            Some(factory) => factory,
            None => return,
        }
    };
}

fn unique_key(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", name, nanos)
}

// --- scenario S1 -----------------------------------------------------------

#[tokio::test]
async fn fixed_window_counts_down_and_denies_the_overflow() {
    let factory = require_redis!();
    let limiter = factory.fixed_window();
    let key = unique_key("s1");

    for i in 0..10u64 {
        let decision = limiter.attempt(&key, 10, 1.0, 60).await.unwrap();
        assert!(decision.allowed, "attempt {} should be allowed", i + 1);
        assert_eq!(decision.retries_left, 9 - i);
        assert_eq!(decision.limit, 10);
    }

    let decision = limiter.attempt(&key, 10, 1.0, 60).await.unwrap();
    assert!(!decision.allowed);
    assert!(decision.retry_after_seconds > 0);
    assert!(decision.retry_after_seconds <= 60);
}

// --- scenario S2 -----------------------------------------------------------

#[tokio::test]
async fn token_bucket_refills_by_elapsed_rate() {
    let factory = require_redis!();
    let limiter = factory.token_bucket();
    let key = unique_key("s2");

    for _ in 0..10 {
        assert!(limiter.attempt(&key, 10, 1.0, 60).await.unwrap().allowed);
    }
    assert!(!limiter.attempt(&key, 10, 1.0, 60).await.unwrap().allowed);

    sleep(Duration::from_millis(2100)).await;

    let mut refilled = 0;
    loop {
        let decision = limiter.attempt(&key, 10, 1.0, 60).await.unwrap();
        if !decision.allowed {
            break;
        }
        refilled += 1;
        assert!(refilled <= 3, "refill overshot the elapsed budget");
    }
    assert!(
        (2..=3).contains(&refilled),
        "expected ~2 refilled tokens, got {}",
        refilled
    );
}

// --- scenario S3 -----------------------------------------------------------

#[tokio::test]
async fn gate_exhaustion_recovers_on_release() {
    let factory = require_redis!();
    let gate = factory.gate();
    let key = unique_key("s3");

    let first = gate.try_acquire(&key, "req1", 2, 30).await.unwrap();
    assert!(first.acquired);
    let second = gate.try_acquire(&key, "req2", 2, 30).await.unwrap();
    assert!(second.acquired);
    assert_eq!(second.current_in_flight, 2);

    let third = gate.try_acquire(&key, "req3", 2, 30).await.unwrap();
    assert!(!third.acquired);
    assert_eq!(third.current_in_flight, 2);

    gate.release(&key, "req1").await.unwrap();

    let retry = gate.try_acquire(&key, "req3", 2, 30).await.unwrap();
    assert!(retry.acquired);
    assert_eq!(retry.current_in_flight, 2);
}

// --- scenario S4 -----------------------------------------------------------

#[tokio::test]
async fn composer_returns_the_slot_when_rate_denies() {
    let factory = require_redis!();
    let limiter = factory.with_concurrency(Some(Algorithm::FixedWindow));
    let key = unique_key("s4");

    for req in ["req1", "req2"] {
        let decision = limiter
            .attempt_with_concurrency(&key, req, 50, 2, 0.1, 60, 30)
            .await
            .unwrap();
        assert!(decision.gate_acquired());
        assert_eq!(decision.rejection_cause(), RejectionCause::None);
    }
    let before = limiter.current_in_flight(&key, 30).await.unwrap();
    assert_eq!(before, 2);

    let decision = limiter
        .attempt_with_concurrency(&key, "req3", 50, 2, 0.1, 60, 30)
        .await
        .unwrap();
    assert!(!decision.gate_acquired());
    assert_eq!(decision.rejection_cause(), RejectionCause::RateExceeded);
    assert!(decision.as_decision().retry_after_seconds > 0);

    let after = limiter.current_in_flight(&key, 30).await.unwrap();
    assert_eq!(after, before, "a rate-denied call must not keep its slot");
}

// --- scenario S5 -----------------------------------------------------------

#[tokio::test]
async fn abandoned_gate_leases_expire() {
    let factory = require_redis!();
    let gate = factory.gate();
    let key = unique_key("s5");

    assert!(gate.try_acquire(&key, "req1", 2, 1).await.unwrap().acquired);
    assert!(gate.try_acquire(&key, "req2", 2, 1).await.unwrap().acquired);

    sleep(Duration::from_millis(2100)).await;

    assert_eq!(gate.current(&key, 1).await.unwrap(), 0);
    assert!(gate.try_acquire(&key, "req3", 2, 1).await.unwrap().acquired);
}

// --- scenario S6 -----------------------------------------------------------

#[tokio::test]
async fn token_bucket_burst_is_a_hard_cap_under_rapid_fire() {
    let factory = require_redis!();
    let limiter = factory.token_bucket();
    let key = unique_key("s6");

    let mut allowed = 0;
    for _ in 0..150 {
        if limiter.attempt(&key, 100, 8.0, 60).await.unwrap().allowed {
            allowed += 1;
        }
    }
    assert!(allowed >= 100, "burst undershot: {}", allowed);
    assert!(allowed <= 110, "burst overshot: {}", allowed);
}

// --- admission caps (property 1) -------------------------------------------

#[tokio::test]
async fn sliding_window_cap_is_rate_times_window() {
    let factory = require_redis!();
    let limiter = factory.sliding_window();
    let key = unique_key("p1-sliding");

    // floor(0.5 * 10) = 5
    let mut allowed = 0;
    for _ in 0..8 {
        let decision = limiter.attempt(&key, 99, 0.5, 10).await.unwrap();
        if decision.allowed {
            allowed += 1;
            assert_eq!(decision.limit, 5);
        } else {
            assert!(decision.retry_after_seconds > 0);
            assert!(decision.retry_after_seconds <= 10);
        }
    }
    assert_eq!(allowed, 5);
    assert_eq!(limiter.attempts(&key, 10).await.unwrap(), 5);
    assert_eq!(limiter.remaining(&key, 99, 0.5, 10).await.unwrap(), 0);
    assert!(limiter.available_in(&key, 99, 0.5, 10).await.unwrap() > 0);
}

#[tokio::test]
async fn gcra_cap_matches_the_sliding_interpretation() {
    let factory = require_redis!();
    let limiter = factory.gcra();
    let key = unique_key("p1-gcra");

    // floor(0.5 * 10) = 5 within a single window
    let mut allowed = 0;
    for _ in 0..8 {
        if limiter.attempt(&key, 99, 0.5, 10).await.unwrap().allowed {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 5);

    let denied = limiter.attempt(&key, 99, 0.5, 10).await.unwrap();
    assert!(!denied.allowed);
    assert!(denied.retry_after_seconds > 0);
    assert_eq!(limiter.remaining(&key, 99, 0.5, 10).await.unwrap(), 0);
}

#[tokio::test]
async fn leaky_bucket_admits_burst_then_drains() {
    let factory = require_redis!();
    let limiter = factory.leaky_bucket();
    let key = unique_key("p1-leaky");

    for _ in 0..3 {
        assert!(limiter.attempt(&key, 3, 1.0, 60).await.unwrap().allowed);
    }
    let denied = limiter.attempt(&key, 3, 1.0, 60).await.unwrap();
    assert!(!denied.allowed);
    assert!(denied.retry_after_seconds >= 1);

    // One unit drains per second at rate 1.0.
    sleep(Duration::from_millis(2100)).await;
    let mut refilled = 0;
    loop {
        if !limiter.attempt(&key, 3, 1.0, 60).await.unwrap().allowed {
            break;
        }
        refilled += 1;
        assert!(refilled <= 3, "drained more than the elapsed time allows");
    }
    assert!((2..=3).contains(&refilled), "drained {}", refilled);
}

// --- sliding window smoothing (property 3) ----------------------------------

#[tokio::test]
async fn sliding_window_does_not_renew_at_a_boundary() {
    let factory = require_redis!();
    let limiter = factory.sliding_window();
    let key = unique_key("p3");

    // cap = floor(1.0 * 3) = 3
    for _ in 0..3 {
        assert!(limiter.attempt(&key, 99, 1.0, 3).await.unwrap().allowed);
    }
    assert!(!limiter.attempt(&key, 99, 1.0, 3).await.unwrap().allowed);

    // Entries leave the window one by one, never all at once.
    sleep(Duration::from_millis(4100)).await;
    assert_eq!(limiter.attempts(&key, 3).await.unwrap(), 0);
    assert!(limiter.attempt(&key, 99, 1.0, 3).await.unwrap().allowed);
}

// --- gate bound and duplicate ids (property 4) ------------------------------

#[tokio::test]
async fn gate_never_exceeds_its_bound() {
    let factory = require_redis!();
    let gate = factory.gate();
    let key = unique_key("p4");

    let mut acquired = 0;
    for i in 0..5 {
        let admission = gate
            .try_acquire(&key, &format!("req{}", i), 3, 30)
            .await
            .unwrap();
        if admission.acquired {
            acquired += 1;
        }
        assert!(admission.current_in_flight <= 3);
    }
    assert_eq!(acquired, 3);

    gate.release(&key, "req0").await.unwrap();
    assert_eq!(gate.current(&key, 30).await.unwrap(), 2);
    assert!(gate.try_acquire(&key, "req9", 3, 30).await.unwrap().acquired);
}

#[tokio::test]
async fn gate_does_not_refcount_a_live_id() {
    let factory = require_redis!();
    let gate = factory.gate();
    let key = unique_key("p4-dup");

    assert!(gate.try_acquire(&key, "req1", 5, 30).await.unwrap().acquired);
    let duplicate = gate.try_acquire(&key, "req1", 5, 30).await.unwrap();
    assert!(!duplicate.acquired);
    assert_eq!(duplicate.current_in_flight, 1);

    // One release drops the single lease; a second is a harmless no-op.
    gate.release(&key, "req1").await.unwrap();
    gate.release(&key, "req1").await.unwrap();
    assert_eq!(gate.current(&key, 30).await.unwrap(), 0);
}

#[tokio::test]
async fn gate_cleanup_reports_evicted_leases() {
    let factory = require_redis!();
    let gate = factory.gate();
    let key = unique_key("p4-cleanup");

    assert!(gate.try_acquire(&key, "a", 5, 1).await.unwrap().acquired);
    assert!(gate.try_acquire(&key, "b", 5, 1).await.unwrap().acquired);

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(gate.cleanup(&key, 1).await.unwrap(), 2);
    assert_eq!(gate.cleanup(&key, 1).await.unwrap(), 0);
}

// --- composer ordering (property 6) -----------------------------------------

#[tokio::test]
async fn full_gate_leaves_base_state_untouched() {
    let factory = require_redis!();
    let limiter = factory.with_concurrency(Some(Algorithm::TokenBucket));
    let base = factory.token_bucket();
    let key = unique_key("p6");

    let first = limiter
        .attempt_with_concurrency(&key, "req1", 1, 10, 1.0, 60, 30)
        .await
        .unwrap();
    assert!(first.gate_acquired());
    assert_eq!(base.attempts(&key, 60).await.unwrap(), 1);

    // req1 still holds the only slot, so the base must not be consulted.
    let second = limiter
        .attempt_with_concurrency(&key, "req2", 1, 10, 1.0, 60, 30)
        .await
        .unwrap();
    assert_eq!(second.rejection_cause(), RejectionCause::GateExhausted);
    assert_eq!(base.attempts(&key, 60).await.unwrap(), 1);
}

#[tokio::test]
async fn pure_gate_mode_skips_the_base() {
    let factory = require_redis!();
    let limiter = factory.with_concurrency(None);
    let key = unique_key("p6-pure");

    let decision = limiter
        .attempt_with_concurrency(&key, "req1", 2, 1, 0.001, 60, 30)
        .await
        .unwrap();
    assert!(decision.gate_acquired());
    assert_eq!(decision.rejection_cause(), RejectionCause::None);

    limiter.release_concurrency(&key, "req1").await.unwrap();
    assert_eq!(limiter.current_in_flight(&key, 30).await.unwrap(), 0);
}

// --- key isolation (property 7) ---------------------------------------------

#[tokio::test]
async fn keys_never_leak_across_algorithms_or_each_other() {
    let factory = require_redis!();
    let key1 = unique_key("p7-a");
    let key2 = unique_key("p7-b");

    for algorithm in Algorithm::ALL {
        let limiter = factory.limiter(algorithm);
        for _ in 0..3 {
            limiter.attempt(&key1, 10, 1.0, 30).await.unwrap();
        }
        assert!(
            limiter.attempts(&key1, 30).await.unwrap() > 0,
            "{} left no trace on its own key",
            algorithm
        );
        assert_eq!(
            limiter.attempts(&key2, 30).await.unwrap(),
            0,
            "{} leaked state across keys",
            algorithm
        );
    }
}

// --- reset idempotence (property 8) -----------------------------------------

#[tokio::test]
async fn reset_is_idempotent_and_restores_a_fresh_key() {
    let factory = require_redis!();

    for algorithm in Algorithm::ALL {
        let limiter = factory.limiter(algorithm);
        let key = unique_key(&format!("p8-{}", algorithm));

        for _ in 0..3 {
            limiter.attempt(&key, 5, 1.0, 30).await.unwrap();
        }

        let removed = limiter.reset(&key).await.unwrap();
        assert!(removed > 0, "{} reset removed nothing", algorithm);
        assert_eq!(
            limiter.reset(&key).await.unwrap(),
            0,
            "{} reset is not idempotent",
            algorithm
        );

        let fresh = limiter.attempt(&key, 5, 1.0, 30).await.unwrap();
        assert!(fresh.allowed, "{} did not reset to a fresh key", algorithm);
    }
}

// --- script cache recovery (property 9) --------------------------------------

#[tokio::test]
async fn operations_survive_a_flushed_script_cache() {
    let factory = require_redis!();
    let limiter = factory.token_bucket();
    let key = unique_key("p9");

    assert!(limiter.attempt(&key, 5, 1.0, 30).await.unwrap().allowed);

    // Flush the server-side script cache behind the executor's back.
    let client = redis::Client::open(redis_url()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let _: () = redis::cmd("SCRIPT")
        .arg("FLUSH")
        .query_async(&mut conn)
        .await
        .unwrap();

    let decision = limiter.attempt(&key, 5, 1.0, 30).await.unwrap();
    assert!(decision.allowed, "reload-on-miss did not recover");
}

// --- executor plumbing -------------------------------------------------------

#[tokio::test]
async fn preload_confirms_every_catalogue_script() {
    let factory = require_redis!();
    let store = factory.store();

    let scripts = rategate::scripts::catalogue();
    let loaded = store.preload(&scripts).await.unwrap();
    assert_eq!(loaded, scripts.len());

    for script in scripts {
        assert!(store.is_confirmed(script).await, "{}", script.name());
    }
}

// --- playground ---------------------------------------------------------------

fn app_state(factory: LimiterFactory) -> rategate::server::SharedState {
    std::sync::Arc::new(rategate::server::AppState {
        factory,
        metrics: rategate::metrics::MetricsCollector::new(),
        config: rategate::Config::default(),
    })
}

#[tokio::test]
async fn playground_rejects_unknown_algorithms_without_store_io() {
    // Parsing fails before any store round trip, so no live Redis needed.
    let factory = LimiterFactory::from_url(&redis_url()).unwrap();
    let routes = rategate::server::routes(app_state(factory));

    let response = warp::test::request()
        .method("POST")
        .path("/check/quantum_window")
        .json(&serde_json::json!({"key": "k"}))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 400);

    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert!(body["error"].as_str().unwrap().contains("quantum_window"));
}

#[tokio::test]
async fn playground_rejects_error_chance_out_of_range() {
    let factory = LimiterFactory::from_url(&redis_url()).unwrap();
    let routes = rategate::server::routes(app_state(factory));

    let response = warp::test::request()
        .method("POST")
        .path("/check/token_bucket")
        .json(&serde_json::json!({"key": "k", "error_chance": 1.5}))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn playground_translates_denials_to_429_with_headers() {
    let factory = require_redis!();
    let routes = rategate::server::routes(app_state(factory));
    let key = unique_key("http");

    for remaining in ["1", "0"] {
        let response = warp::test::request()
            .method("POST")
            .path("/check/fixed_window")
            .json(&serde_json::json!({"key": key, "burst": 2, "window": 60}))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("X-RateLimit-Remaining").unwrap(),
            remaining
        );
    }

    let response = warp::test::request()
        .method("POST")
        .path("/check/fixed_window")
        .json(&serde_json::json!({"key": key, "burst": 2, "window": 60}))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 429);
    assert_eq!(response.headers().get("X-RateLimit-Limit").unwrap(), "2");
    assert!(response.headers().contains_key("Retry-After"));
}

#[tokio::test]
async fn playground_reports_gate_blame() {
    let factory = require_redis!();
    let routes = rategate::server::routes(app_state(factory));
    let key = unique_key("http-gate");

    let first = warp::test::request()
        .method("POST")
        .path("/concurrency/check")
        .json(&serde_json::json!({
            "key": key, "request_id": "r1", "max_in_flight": 1, "algorithm": "none",
        }))
        .reply(&routes)
        .await;
    assert_eq!(first.status(), 200);

    let second = warp::test::request()
        .method("POST")
        .path("/concurrency/check")
        .json(&serde_json::json!({
            "key": key, "request_id": "r2", "max_in_flight": 1, "algorithm": "none",
        }))
        .reply(&routes)
        .await;
    assert_eq!(second.status(), 429);
    let body: serde_json::Value = serde_json::from_slice(second.body()).unwrap();
    assert_eq!(body["rejection_cause"], "gate_exhausted");
    assert_eq!(body["gate_acquired"], false);

    let release = warp::test::request()
        .method("POST")
        .path("/concurrency/release")
        .json(&serde_json::json!({"key": key, "request_id": "r1"}))
        .reply(&routes)
        .await;
    assert_eq!(release.status(), 200);
}

#[tokio::test]
async fn invalid_arguments_fail_before_touching_the_store() {
    let factory = require_redis!();
    let limiter = factory.token_bucket();
    let key = unique_key("args");

    assert!(limiter.attempt(&key, 0, 1.0, 60).await.is_err());
    assert!(limiter.attempt(&key, 10, 0.0, 60).await.is_err());
    assert!(limiter.attempt(&key, 10, 1.0, 0).await.is_err());
    assert!(limiter.attempt("", 10, 1.0, 60).await.is_err());

    // Nothing above may have created state.
    assert_eq!(limiter.attempts(&key, 60).await.unwrap(), 0);
}
