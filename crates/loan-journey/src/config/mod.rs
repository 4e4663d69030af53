use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub journey: JourneyConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            journey: JourneyConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Limits and timings for the journey engine.
#[derive(Debug, Clone, PartialEq)]
pub struct JourneyConfig {
    /// Node executions allowed before a journey is force-terminated.
    pub max_steps_guard: u32,
    /// Re-prompts a collect step may issue before accepting a best-effort answer.
    pub max_validation_retries: u32,
    pub review_poll_interval: Duration,
    /// `None` waits for in-flight documents indefinitely.
    pub review_gate_timeout: Option<Duration>,
    pub extraction_latency: Duration,
    /// `None` keeps checkpoints in memory.
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for JourneyConfig {
    fn default() -> Self {
        Self {
            max_steps_guard: 25,
            max_validation_retries: 2,
            review_poll_interval: Duration::from_millis(500),
            review_gate_timeout: None,
            extraction_latency: Duration::from_millis(100),
            checkpoint_dir: None,
        }
    }
}

impl JourneyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_steps_guard =
            number_var("JOURNEY_MAX_STEPS_GUARD")?.unwrap_or(defaults.max_steps_guard);
        let max_validation_retries = number_var("JOURNEY_MAX_VALIDATION_RETRIES")?
            .unwrap_or(defaults.max_validation_retries);
        let review_poll_interval = number_var::<u64>("JOURNEY_REVIEW_POLL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.review_poll_interval);
        let review_gate_timeout =
            number_var::<u64>("JOURNEY_REVIEW_TIMEOUT_SECS")?.map(Duration::from_secs);
        let extraction_latency = number_var::<u64>("JOURNEY_EXTRACTION_LATENCY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.extraction_latency);
        let checkpoint_dir = env::var("JOURNEY_CHECKPOINT_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            max_steps_guard,
            max_validation_retries,
            review_poll_interval,
            review_gate_timeout,
            extraction_latency,
            checkpoint_dir,
        })
    }
}

fn number_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
