use crate::algorithms::Algorithm;
use std::env;
use std::fmt;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub redis_url: String,
    pub default_algorithm: Algorithm,
    pub default_burst: u32,
    pub default_rate: f64,
    pub default_window_seconds: u64,
    pub gate_max_in_flight: u32,
    pub gate_timeout_seconds: u64,
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort(String),
    InvalidAlgorithm(String),
    InvalidBurst(String),
    InvalidRate(String),
    InvalidWindow(String),
    InvalidGate(String),
    MissingRedisUrl,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort(msg) => write!(f, "Invalid port: {}", msg),
            ConfigError::InvalidAlgorithm(msg) => write!(f, "Invalid algorithm: {}", msg),
            ConfigError::InvalidBurst(msg) => write!(f, "Invalid burst: {}", msg),
            ConfigError::InvalidRate(msg) => write!(f, "Invalid rate: {}", msg),
            ConfigError::InvalidWindow(msg) => write!(f, "Invalid window: {}", msg),
            ConfigError::InvalidGate(msg) => write!(f, "Invalid gate setting: {}", msg),
            ConfigError::MissingRedisUrl => write!(f, "Redis URL is required"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_algorithm: Algorithm::TokenBucket,
            default_burst: 100,
            default_rate: 10.0,
            default_window_seconds: 60,
            gate_max_in_flight: 50,
            gate_timeout_seconds: 30,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(host) = env::var("RATEGATE_HOST") {
            config.server_host = host;
        }

        if let Ok(port_str) = env::var("RATEGATE_PORT") {
            config.server_port = port_str
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port_str))?;
        }

        if let Ok(redis_url) = env::var("REDIS_URL") {
            config.redis_url = redis_url;
        }

        if let Ok(algo_str) = env::var("RATEGATE_ALGORITHM") {
            config.default_algorithm = algo_str
                .parse()
                .map_err(|_| ConfigError::InvalidAlgorithm(algo_str))?;
        }

        if let Ok(burst_str) = env::var("RATEGATE_BURST") {
            config.default_burst = burst_str
                .parse()
                .map_err(|_| ConfigError::InvalidBurst(burst_str))?;
        }

        if let Ok(rate_str) = env::var("RATEGATE_RATE") {
            config.default_rate = rate_str
                .parse()
                .map_err(|_| ConfigError::InvalidRate(rate_str))?;
        }

        if let Ok(window_str) = env::var("RATEGATE_WINDOW_SECONDS") {
            config.default_window_seconds = window_str
                .parse()
                .map_err(|_| ConfigError::InvalidWindow(window_str))?;
        }

        if let Ok(max_str) = env::var("RATEGATE_GATE_MAX_IN_FLIGHT") {
            config.gate_max_in_flight = max_str
                .parse()
                .map_err(|_| ConfigError::InvalidGate(max_str))?;
        }

        if let Ok(timeout_str) = env::var("RATEGATE_GATE_TIMEOUT_SECONDS") {
            config.gate_timeout_seconds = timeout_str
                .parse()
                .map_err(|_| ConfigError::InvalidGate(timeout_str))?;
        }

        if let Ok(level) = env::var("RATEGATE_LOG") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server_port == 0 {
            return Err(ConfigError::InvalidPort("Port cannot be 0".to_string()));
        }

        if self.redis_url.is_empty() {
            return Err(ConfigError::MissingRedisUrl);
        }

        if self.default_burst == 0 {
            return Err(ConfigError::InvalidBurst(
                "Burst must be greater than 0".to_string(),
            ));
        }

        if !self.default_rate.is_finite() || self.default_rate <= 0.0 {
            return Err(ConfigError::InvalidRate(
                "Rate must be a positive number".to_string(),
            ));
        }

        if self.default_window_seconds == 0 {
            return Err(ConfigError::InvalidWindow(
                "Window must be greater than 0 seconds".to_string(),
            ));
        }

        if self.gate_max_in_flight == 0 {
            return Err(ConfigError::InvalidGate(
                "Gate capacity must be greater than 0".to_string(),
            ));
        }

        if self.gate_timeout_seconds == 0 {
            return Err(ConfigError::InvalidGate(
                "Gate timeout must be greater than 0 seconds".to_string(),
            ));
        }

        Ok(())
    }
}
