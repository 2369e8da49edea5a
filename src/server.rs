//! HTTP playground for poking the engine.
//!
//! A thin warp front end over the factory: denials become 429 with the
//! standard rate-limit headers, transport failures become 503, domain
//! errors become 400. Everything here is a consumer of the core; no
//! admission logic lives in this module.

use crate::algorithms::{Algorithm, Limiter};
use crate::config::Config;
use crate::error::RateGateError;
use crate::factory::LimiterFactory;
use crate::metrics::MetricsCollector;
use crate::response::{
    CheckResponse, ConcurrencyCheckResponse, ErrorResponse, HealthResponse, ReleaseResponse,
    ResetResponse, StatusResponse,
};
use crate::validation::ArgumentValidator;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

pub struct AppState {
    pub factory: LimiterFactory,
    pub metrics: MetricsCollector,
    pub config: Config,
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub key: String,
    pub burst: Option<u32>,
    pub rate: Option<f64>,
    pub window: Option<u64>,
    /// Probability of an injected 500, for failure-mode experiments.
    pub error_chance: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ConcurrencyCheckRequest {
    pub key: String,
    pub request_id: String,
    pub max_in_flight: Option<u32>,
    pub burst: Option<u32>,
    pub rate: Option<f64>,
    pub window: Option<u64>,
    pub timeout: Option<u64>,
    pub algorithm: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub key: String,
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub burst: Option<u32>,
    pub rate: Option<f64>,
    pub window: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentQuery {
    pub timeout: Option<u64>,
}

#[derive(Debug)]
struct ApiError(RateGateError);

impl warp::reject::Reject for ApiError {}

fn reject(err: RateGateError) -> Rejection {
    warp::reject::custom(ApiError(err))
}

fn parse_algorithm(raw: &str) -> Result<Algorithm, Rejection> {
    raw.parse::<Algorithm>().map_err(reject)
}

async fn check(
    algorithm: String,
    request: CheckRequest,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let algorithm = parse_algorithm(&algorithm)?;
    let burst = request.burst.unwrap_or(state.config.default_burst);
    let rate = request.rate.unwrap_or(state.config.default_rate);
    let window = request.window.unwrap_or(state.config.default_window_seconds);

    if let Some(error_chance) = request.error_chance {
        ArgumentValidator::validate_error_chance(error_chance).map_err(reject)?;
        if rand::random::<f64>() < error_chance {
            warn!(key = %request.key, "injected failure");
            return Ok(warp::reply::with_status(
                warp::reply::json(&ErrorResponse::new("injected failure")),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
            .into_response());
        }
    }

    let limiter = state.factory.limiter(algorithm);
    let decision = limiter
        .attempt(&request.key, burst, rate, window)
        .await
        .map_err(reject)?;

    state.metrics.record_decision(&request.key, &decision).await;

    let status = if decision.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    let body = CheckResponse::from(decision);

    let reply = warp::reply::with_status(warp::reply::json(&body), status);
    let reply = warp::reply::with_header(reply, "X-RateLimit-Limit", decision.limit.to_string());
    let reply = warp::reply::with_header(
        reply,
        "X-RateLimit-Remaining",
        decision.retries_left.to_string(),
    );
    if decision.allowed {
        Ok(reply.into_response())
    } else {
        Ok(warp::reply::with_header(
            reply,
            "Retry-After",
            decision.retry_after_seconds.to_string(),
        )
        .into_response())
    }
}

async fn status(
    algorithm: String,
    key: String,
    query: StatusQuery,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let algorithm = parse_algorithm(&algorithm)?;
    let burst = query.burst.unwrap_or(state.config.default_burst);
    let rate = query.rate.unwrap_or(state.config.default_rate);
    let window = query.window.unwrap_or(state.config.default_window_seconds);

    let limiter = state.factory.limiter(algorithm);
    let attempts = limiter.attempts(&key, window).await.map_err(reject)?;
    let remaining = limiter
        .remaining(&key, burst, rate, window)
        .await
        .map_err(reject)?;
    let available_in = limiter
        .available_in(&key, burst, rate, window)
        .await
        .map_err(reject)?;

    Ok(warp::reply::json(&StatusResponse {
        key,
        algorithm: algorithm.to_string(),
        attempts,
        remaining,
        available_in_seconds: available_in,
    }))
}

async fn reset(
    algorithm: String,
    key: String,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let algorithm = parse_algorithm(&algorithm)?;
    let limiter = state.factory.limiter(algorithm);
    let removed = limiter.reset(&key).await.map_err(reject)?;
    state.metrics.reset_key(&key).await;

    Ok(warp::reply::json(&ResetResponse { key, removed }))
}

async fn concurrency_check(
    request: ConcurrencyCheckRequest,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let base = match request.algorithm.as_deref() {
        Some("none") => None,
        Some(raw) => Some(parse_algorithm(raw)?),
        None => Some(state.config.default_algorithm),
    };
    let max_in_flight = request
        .max_in_flight
        .unwrap_or(state.config.gate_max_in_flight);
    let burst = request.burst.unwrap_or(state.config.default_burst);
    let rate = request.rate.unwrap_or(state.config.default_rate);
    let window = request.window.unwrap_or(state.config.default_window_seconds);
    let timeout = request.timeout.unwrap_or(state.config.gate_timeout_seconds);

    let limiter = state.factory.with_concurrency(base);
    let decision = limiter
        .attempt_with_concurrency(
            &request.key,
            &request.request_id,
            max_in_flight,
            burst,
            rate,
            window,
            timeout,
        )
        .await
        .map_err(reject)?;

    state
        .metrics
        .record_concurrency(&request.key, &decision)
        .await;

    let body = ConcurrencyCheckResponse::from(decision);
    let code = if body.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), code))
}

async fn concurrency_release(
    request: ReleaseRequest,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let limiter = state.factory.with_concurrency(None);
    limiter
        .release_concurrency(&request.key, &request.request_id)
        .await
        .map_err(reject)?;

    Ok(warp::reply::json(&ReleaseResponse {
        key: request.key,
        request_id: request.request_id,
        released: true,
    }))
}

async fn concurrency_current(
    key: String,
    query: CurrentQuery,
    state: SharedState,
) -> Result<impl Reply, Rejection> {
    let timeout = query.timeout.unwrap_or(state.config.gate_timeout_seconds);
    let limiter = state.factory.with_concurrency(None);
    let current = limiter
        .current_in_flight(&key, timeout)
        .await
        .map_err(reject)?;

    Ok(warp::reply::json(&serde_json::json!({
        "key": key,
        "current_in_flight": current,
    })))
}

async fn health(state: SharedState) -> Result<impl Reply, Rejection> {
    match state.factory.store().ping().await {
        Ok(()) => Ok(warp::reply::with_status(
            warp::reply::json(&HealthResponse::healthy()),
            StatusCode::OK,
        )),
        Err(_) => Ok(warp::reply::with_status(
            warp::reply::json(&HealthResponse::unhealthy()),
            StatusCode::SERVICE_UNAVAILABLE,
        )),
    }
}

async fn metrics(state: SharedState) -> Result<impl Reply, Rejection> {
    let snapshot = state.metrics.snapshot().await;
    let global = state.metrics.global().await;
    Ok(warp::reply::json(&serde_json::json!({
        "global": global,
        "per_key": snapshot,
    })))
}

async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(ApiError(err)) = rejection.find::<ApiError>() {
        let status = match err {
            RateGateError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            RateGateError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            RateGateError::ScriptDrift { .. } | RateGateError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, err.to_string())
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else {
        (StatusCode::BAD_REQUEST, "bad request".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorResponse::new(message)),
        status,
    ))
}

fn with_state(
    state: SharedState,
) -> impl Filter<Extract = (SharedState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

pub fn routes(
    state: SharedState,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let check = warp::path!("check" / String)
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(check);

    let status = warp::path!("status" / String / String)
        .and(warp::get())
        .and(warp::query::<StatusQuery>())
        .and(with_state(state.clone()))
        .and_then(status);

    let reset = warp::path!("reset" / String / String)
        .and(warp::delete())
        .and(with_state(state.clone()))
        .and_then(reset);

    let concurrency_check = warp::path!("concurrency" / "check")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(concurrency_check);

    let concurrency_release = warp::path!("concurrency" / "release")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(concurrency_release);

    let concurrency_current = warp::path!("concurrency" / "current" / String)
        .and(warp::get())
        .and(warp::query::<CurrentQuery>())
        .and(with_state(state.clone()))
        .and_then(concurrency_current);

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(with_state(state))
        .and_then(metrics);

    check
        .or(status)
        .or(reset)
        .or(concurrency_check)
        .or(concurrency_release)
        .or(concurrency_current)
        .or(health)
        .or(metrics)
        .recover(handle_rejection)
}

pub async fn run_server(config: Config) -> Result<(), RateGateError> {
    let factory = LimiterFactory::from_url(&config.redis_url)?;

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .map_err(|_| {
            RateGateError::Config(format!(
                "invalid bind address {}:{}",
                config.server_host, config.server_port
            ))
        })?;

    if let Err(err) = factory.store().ping().await {
        warn!("store not reachable at startup: {}", err);
    }

    let state = Arc::new(AppState {
        factory,
        metrics: MetricsCollector::new(),
        config,
    });

    let routes = routes(state)
        .with(warp::cors().allow_any_origin())
        .with(warp::log("rategate"));

    info!("playground listening on http://{}", addr);
    warp::serve(routes).run(addr).await;

    Ok(())
}
