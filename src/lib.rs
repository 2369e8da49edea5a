//! Distributed rate limiting and concurrency gating backed by a shared
//! Redis store.
//!
//! Every admission decision runs as a single server-side Lua script, so
//! callers in different processes need no coordination beyond the store
//! itself: the store's script executor serializes everything that touches
//! a key, and the store's clock is the only clock any decision reads.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use rategate::LimiterFactory;
//! use rategate::algorithms::Limiter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = LimiterFactory::from_url("redis://127.0.0.1:6379")?;
//!
//! // 100-token bucket refilled at 10 tokens/second.
//! let limiter = factory.token_bucket();
//! let decision = limiter.attempt("user-42", 100, 10.0, 60).await?;
//! if decision.allowed {
//!     // proceed
//! } else {
//!     // back off for decision.retry_after_seconds
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Composing a rate limit with an in-flight bound:
//!
//! ```rust,no_run
//! use rategate::{Algorithm, LimiterFactory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = LimiterFactory::from_url("redis://127.0.0.1:6379")?;
//! let limiter = factory.with_concurrency(Some(Algorithm::SlidingWindow));
//!
//! let decision = limiter
//!     .attempt_with_concurrency("user-42", "req-1", 8, 100, 10.0, 60, 30)
//!     .await?;
//! if decision.gate_acquired() {
//!     // ... do the work ...
//!     limiter.release_concurrency("user-42", "req-1").await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod algorithms;
pub mod concurrency;
pub mod config;
pub mod decision;
pub mod error;
pub mod factory;
pub mod gate;
pub mod metrics;
pub mod response;
pub mod scripts;
pub mod server;
pub mod store;
pub mod validation;

pub use algorithms::{Algorithm, Limiter};
pub use concurrency::ConcurrencyLimiter;
pub use config::Config;
pub use decision::{ConcurrencyDecision, Decision, RejectionCause};
pub use error::{RateGateError, RateGateResult};
pub use factory::LimiterFactory;
pub use gate::ConcurrencyGate;
pub use store::RedisStore;
