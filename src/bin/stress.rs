//! Load harness for a live store.
//!
//! Usage: `stress [algorithm] [total_requests] [workers]`
//!
//! `algorithm` is any of sliding_window, fixed_window, leaky_bucket,
//! token_bucket, gcra, or `gate` to stress the concurrency gate through
//! the composer. Reads `REDIS_URL` (default redis://127.0.0.1:6379).

use anyhow::Result;
use hdrhistogram::Histogram;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rategate::{Algorithm, Limiter, LimiterFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Barrier;
use tokio::task::JoinSet;

const BURST: u32 = 500;
const RATE: f64 = 200.0;
const WINDOW: u64 = 60;
const GATE_MAX: u32 = 64;
const GATE_TIMEOUT: u64 = 30;
const KEYSPACE: u64 = 8;

struct WorkerReport {
    histogram: Histogram<u64>,
    allowed: u64,
    denied: u64,
    errors: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let algorithm = args.next().unwrap_or_else(|| "token_bucket".to_string());
    let total: usize = args.next().map(|s| s.parse()).transpose()?.unwrap_or(10_000);
    let workers: usize = args.next().map(|s| s.parse()).transpose()?.unwrap_or(16);

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let factory = LimiterFactory::from_url(&redis_url)?;
    factory.store().ping().await?;

    println!(
        "stressing {} with {} requests across {} workers against {}",
        algorithm, total, workers, redis_url
    );

    let mode = if algorithm == "gate" {
        None
    } else {
        Some(algorithm.parse::<Algorithm>()?)
    };

    let per_worker = total / workers;
    let barrier = Arc::new(Barrier::new(workers));
    let mut tasks = JoinSet::new();

    let run_id = std::process::id();
    let start = Instant::now();

    for worker in 0..workers {
        let factory = factory.clone();
        let barrier = barrier.clone();

        tasks.spawn(async move {
            // Seeded per worker so every run issues the same key sequence.
            let mut rng = StdRng::seed_from_u64(42 + worker as u64);
            let mut report = WorkerReport {
                histogram: Histogram::new_with_bounds(1, 60_000_000, 3).unwrap(),
                allowed: 0,
                denied: 0,
                errors: 0,
            };

            barrier.wait().await;

            let limiter = mode.map(|algo| factory.limiter(algo));
            let gate = factory.with_concurrency(None);

            for i in 0..per_worker {
                let key = format!("stress-{}-{}", run_id, rng.random_range(0..KEYSPACE));
                let req_start = Instant::now();

                let allowed = match &limiter {
                    Some(limiter) => match limiter.attempt(&key, BURST, RATE, WINDOW).await {
                        Ok(decision) => Some(decision.allowed),
                        Err(_) => None,
                    },
                    None => {
                        let request_id = format!("w{}-r{}", worker, i);
                        match gate
                            .attempt_with_concurrency(
                                &key, &request_id, GATE_MAX, BURST, RATE, WINDOW, GATE_TIMEOUT,
                            )
                            .await
                        {
                            Ok(decision) => {
                                let acquired = decision.gate_acquired();
                                if acquired {
                                    let _ = gate.release_concurrency(&key, &request_id).await;
                                }
                                Some(acquired)
                            }
                            Err(_) => None,
                        }
                    }
                };

                let elapsed_us = req_start.elapsed().as_micros() as u64;
                report.histogram.record(elapsed_us.max(1)).unwrap();
                match allowed {
                    Some(true) => report.allowed += 1,
                    Some(false) => report.denied += 1,
                    None => report.errors += 1,
                }
            }

            report
        });
    }

    let mut merged = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    let mut allowed = 0u64;
    let mut denied = 0u64;
    let mut errors = 0u64;

    while let Some(task) = tasks.join_next().await {
        let report = task.expect("worker panicked");
        merged.add(&report.histogram).unwrap();
        allowed += report.allowed;
        denied += report.denied;
        errors += report.errors;
    }

    let total_duration = start.elapsed();
    let issued = allowed + denied + errors;
    let throughput = issued as f64 / total_duration.as_secs_f64();
    let goodput = allowed as f64 / total_duration.as_secs_f64();

    println!("--- {} ---", algorithm);
    println!("issued:     {}", issued);
    println!("allowed:    {}", allowed);
    println!("denied:     {}", denied);
    println!("errors:     {}", errors);
    println!("elapsed:    {:.2?}", total_duration);
    println!("throughput: {:.0} req/s", throughput);
    println!("goodput:    {:.0} req/s", goodput);
    println!(
        "latency us: p50={} p95={} p99={} max={}",
        merged.value_at_quantile(0.50),
        merged.value_at_quantile(0.95),
        merged.value_at_quantile(0.99),
        merged.max()
    );

    Ok(())
}
