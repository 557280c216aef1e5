use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Deployment {
    Local,
    Dev,
    Stage,
    Prod,
}

impl Deployment {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Self::Dev,
            "stage" | "staging" => Self::Stage,
            "prod" | "production" => Self::Prod,
            _ => Self::Local,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Evaluation driver
    pub eval_interval_seconds: u64,
    pub eval_concurrency: usize,
    pub eval_retry_max: u32,
    pub eval_retry_delay_seconds: u64,

    // Readings store
    pub store_timeout_ms: u64,
    pub stale_factor: u32,

    // Expression cache
    pub expression_cache_capacity: u64,

    // Actuator gateway
    pub actuator_gateway_url: Option<String>,
    pub command_timeout_seconds: u64,

    // API settings
    pub api_host: String,
    pub api_port: u16,
    pub request_timeout_seconds: u64,

    // Application metadata
    pub deployment: Deployment,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if required environment variables are not set,
    /// or `ConfigError::Invalid` if a tuning value is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // Evaluation driver
            eval_interval_seconds: parse_or("EVAL_INTERVAL_SECONDS", 10),
            eval_concurrency: parse_or("EVAL_CONCURRENCY", 8),
            eval_retry_max: parse_or("EVAL_RETRY_MAX", 3),
            eval_retry_delay_seconds: parse_or("EVAL_RETRY_DELAY_SECONDS", 5),

            // Readings store
            store_timeout_ms: parse_or("STORE_TIMEOUT_MS", 2000),
            stale_factor: parse_or("STALE_FACTOR", 3),

            // Expression cache
            expression_cache_capacity: parse_or("EXPRESSION_CACHE_CAPACITY", 1024),

            // Actuator gateway
            actuator_gateway_url: env::var("ACTUATOR_GATEWAY_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            command_timeout_seconds: parse_or("COMMAND_TIMEOUT_SECONDS", 10),

            // API settings
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parse_or("API_PORT", 3000),
            request_timeout_seconds: parse_or("REQUEST_TIMEOUT_SECONDS", 30),

            // Application metadata
            deployment: Deployment::from_str(
                &env::var("DEPLOYMENT").unwrap_or_else(|_| "local".to_string()),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Defaults suitable for tests and embedded use; `database_url` is left empty.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            eval_interval_seconds: 10,
            eval_concurrency: 4,
            eval_retry_max: 0,
            eval_retry_delay_seconds: 0,
            store_timeout_ms: 500,
            stale_factor: 3,
            expression_cache_capacity: 64,
            actuator_gateway_url: None,
            command_timeout_seconds: 1,
            api_host: "127.0.0.1".to_string(),
            api_port: 0,
            request_timeout_seconds: 5,
            deployment: Deployment::Local,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.eval_interval_seconds == 0 {
            return Err(ConfigError::Invalid("EVAL_INTERVAL_SECONDS must be > 0"));
        }
        if self.eval_concurrency == 0 {
            return Err(ConfigError::Invalid("EVAL_CONCURRENCY must be > 0"));
        }
        if self.stale_factor == 0 {
            return Err(ConfigError::Invalid("STALE_FACTOR must be > 0"));
        }
        Ok(())
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
