use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Reads an environment variable, treating blank values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Parses an environment variable, falling back to `default` when unset or malformed.
fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: relay.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "relay.log".to_string()));

/// Proxy for outgoing HTTP traffic (extractor sessions and the Telegram client)
/// Read from PROXY_URL environment variable
/// Example: socks5://127.0.0.1:1080
pub static PROXY_URL: Lazy<Option<String>> = Lazy::new(|| non_empty_var("PROXY_URL"));

/// Media encoding hint handed to every extractor on construction.
/// Read from PREFERRED_ENCODING environment variable
pub static PREFERRED_ENCODING: Lazy<Option<String>> = Lazy::new(|| non_empty_var("PREFERRED_ENCODING"));

/// Maximum number of URLs accepted from a single message
pub static MAX_URLS_PER_MESSAGE: Lazy<usize> = Lazy::new(|| parsed_var("MAX_URLS_PER_MESSAGE", 20));

/// Content-extraction API configuration
pub mod parse_api {
    use super::{non_empty_var, parsed_var, Duration, Lazy};

    /// Endpoint of the content-extraction service
    /// Read from PARSE_API_URL environment variable (required)
    pub static URL: Lazy<Option<String>> = Lazy::new(|| non_empty_var("PARSE_API_URL"));

    /// HTTP timeout for a single extraction request (seconds)
    /// Read from PARSE_API_TIMEOUT_SECS, default 30
    pub static TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| parsed_var("PARSE_API_TIMEOUT_SECS", 30));

    pub fn timeout() -> Duration {
        Duration::from_secs(*TIMEOUT_SECS)
    }
}

/// Extractor pool configuration
pub mod pool {
    use super::{parsed_var, Duration, Lazy};

    /// Default number of live extractor instances
    pub const DEFAULT_CAPACITY: usize = 3;

    /// Pool capacity
    /// Read from EXTRACTOR_POOL_SIZE environment variable
    pub static CAPACITY: Lazy<usize> = Lazy::new(|| parsed_var("EXTRACTOR_POOL_SIZE", DEFAULT_CAPACITY));

    /// How long `acquire` may wait before a stall warning is logged (seconds)
    /// Read from POOL_STALL_WARN_SECS environment variable
    pub static STALL_WARN_SECS: Lazy<u64> = Lazy::new(|| parsed_var("POOL_STALL_WARN_SECS", 30));

    pub fn stall_warning() -> Duration {
        Duration::from_secs(*STALL_WARN_SECS)
    }
}

/// Batch scheduler configuration
pub mod scheduler {
    use super::{parsed_var, Duration, Lazy};

    /// Absolute ceiling on concurrently running jobs, regardless of configuration.
    /// Protects both the extractor pool and the Telegram flood limits.
    pub const MAX_CONCURRENCY_CEILING: usize = 5;

    /// Requested concurrency (clamped to `MAX_CONCURRENCY_CEILING` by the scheduler)
    /// Read from MAX_CONCURRENT_JOBS environment variable
    pub static MAX_CONCURRENT_JOBS: Lazy<usize> = Lazy::new(|| parsed_var("MAX_CONCURRENT_JOBS", 3));

    /// Per-job timeout (seconds)
    /// Read from JOB_TIMEOUT_SECS environment variable
    pub static JOB_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| parsed_var("JOB_TIMEOUT_SECS", 180));

    pub fn job_timeout() -> Duration {
        Duration::from_secs(*JOB_TIMEOUT_SECS)
    }
}

/// Pending recovery store configuration
pub mod recovery {
    use super::{parsed_var, Duration, Lazy};

    /// Time-to-live of an unanswered recovery offer (seconds)
    /// Read from RECOVERY_TTL_SECS environment variable, default 1 hour
    pub static TTL_SECS: Lazy<u64> = Lazy::new(|| parsed_var("RECOVERY_TTL_SECS", 3600));

    /// Maximum number of recovery offers kept at once
    /// Read from RECOVERY_MAX_ENTRIES environment variable
    pub static MAX_ENTRIES: Lazy<u64> = Lazy::new(|| parsed_var("RECOVERY_MAX_ENTRIES", 1000));

    /// How many times a retry may be re-offered before the job is abandoned
    /// Read from RECOVERY_MAX_ROUNDS environment variable
    pub static MAX_ROUNDS: Lazy<u32> = Lazy::new(|| parsed_var("RECOVERY_MAX_ROUNDS", 3));

    pub fn ttl() -> Duration {
        Duration::from_secs(*TTL_SECS)
    }
}

/// Metrics and monitoring configuration
pub mod metrics {
    use super::{parsed_var, Lazy};

    /// Enable metrics HTTP server
    /// Read from METRICS_ENABLED environment variable
    /// Default: false
    pub static ENABLED: Lazy<bool> = Lazy::new(|| parsed_var("METRICS_ENABLED", false));

    /// Port for metrics HTTP server
    /// Read from METRICS_PORT environment variable
    /// Default: 9090
    pub static PORT: Lazy<u16> = Lazy::new(|| parsed_var("METRICS_PORT", 9090));
}

/// Configuration errors surfaced at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PARSE_API_URL is not set")]
    MissingParseApiUrl,

    #[error("PARSE_API_URL is not a valid URL: {0}")]
    InvalidParseApiUrl(#[from] url::ParseError),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Everything the relay service needs, assembled once at startup.
///
/// Built from the environment with [`RelayConfig::from_env`]; tests construct it directly.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub parse_api_url: Url,
    pub parse_api_timeout: Duration,
    pub proxy_url: Option<String>,
    pub preferred_encoding: Option<String>,
    pub pool_capacity: usize,
    pub pool_stall_warning: Duration,
    pub max_concurrent_jobs: usize,
    pub job_timeout: Duration,
    pub recovery_ttl: Duration,
    pub recovery_max_entries: u64,
    pub recovery_max_rounds: u32,
}

impl RelayConfig {
    /// Reads the configuration from the environment and validates it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = parse_api::URL.clone().ok_or(ConfigError::MissingParseApiUrl)?;
        let config = Self {
            parse_api_url: Url::parse(&raw_url)?,
            parse_api_timeout: parse_api::timeout(),
            proxy_url: PROXY_URL.clone(),
            preferred_encoding: PREFERRED_ENCODING.clone(),
            pool_capacity: *pool::CAPACITY,
            pool_stall_warning: pool::stall_warning(),
            max_concurrent_jobs: *scheduler::MAX_CONCURRENT_JOBS,
            job_timeout: scheduler::job_timeout(),
            recovery_ttl: recovery::ttl(),
            recovery_max_entries: *recovery::MAX_ENTRIES,
            recovery_max_rounds: *recovery::MAX_ROUNDS,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the numeric settings that must be non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_capacity == 0 {
            return Err(ConfigError::Zero("EXTRACTOR_POOL_SIZE"));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Zero("MAX_CONCURRENT_JOBS"));
        }
        if self.job_timeout.is_zero() {
            return Err(ConfigError::Zero("JOB_TIMEOUT_SECS"));
        }
        if self.recovery_max_entries == 0 {
            return Err(ConfigError::Zero("RECOVERY_MAX_ENTRIES"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RelayConfig {
        RelayConfig {
            parse_api_url: Url::parse("http://localhost:8080/parse").unwrap(),
            parse_api_timeout: Duration::from_secs(30),
            proxy_url: None,
            preferred_encoding: None,
            pool_capacity: 3,
            pool_stall_warning: Duration::from_secs(30),
            max_concurrent_jobs: 3,
            job_timeout: Duration::from_secs(180),
            recovery_ttl: Duration::from_secs(3600),
            recovery_max_entries: 1000,
            recovery_max_rounds: 3,
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let config = RelayConfig {
            pool_capacity: 0,
            ..sample()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Zero("EXTRACTOR_POOL_SIZE"))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = RelayConfig {
            job_timeout: Duration::ZERO,
            ..sample()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ceiling_is_five() {
        assert_eq!(scheduler::MAX_CONCURRENCY_CEILING, 5);
    }
}
