use serde::Deserialize;
use std::fs::File;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG` when set
    pub level: String,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            sentry_dsn: None,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout of each remote call made while transforming
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        EnvFilter::try_new(&self.logging.level)
            .map_err(|e| ValidationError::InvalidLogLevel(format!("{}: {e}", self.logging.level)))?;

        if let Some(dsn) = &self.logging.sentry_dsn {
            dsn.parse::<sentry::types::Dsn>()
                .map_err(|e| ValidationError::InvalidSentryDsn(e.to_string()))?;
        }

        if let Some(metrics) = &self.metrics {
            if metrics.statsd_host.trim().is_empty() {
                return Err(ValidationError::EmptyStatsdHost);
            }
        }

        if self.http.timeout_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("invalid logging.level {0}")]
    InvalidLogLevel(String),
    #[error("invalid logging.sentry_dsn: {0}")]
    InvalidSentryDsn(String),
    #[error("metrics.statsd_host must not be empty")]
    EmptyStatsdHost,
    #[error("http.timeout_secs must be greater than zero")]
    ZeroTimeout,
}
