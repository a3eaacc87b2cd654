mod config;

use clap::Parser;
use config::{Config, ConfigError, LoggingConfig, MetricsConfig, ValidationError};
use destinations::{TransformError, TransformEvent, Transformer};
use metrics_exporter_statsd::StatsdBuilder;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const METRICS_PREFIX: &str = "transformer";

#[derive(Parser)]
#[command(name = "transformer", version)]
enum CliCommand {
    /// Transforms the events in a JSON file and prints their request
    /// descriptors, one JSON document per event
    Process {
        #[arg(long)]
        config: PathBuf,
        /// A single event object or an array of events
        #[arg(long)]
        event: PathBuf,
    },
    /// Builds every destination adapter, validating the embedded mapping
    /// tables and, when given, the config file
    Check {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid config: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("could not read events from {path}: {source}")]
    Events { path: PathBuf, source: std::io::Error },
    #[error("could not parse events in {path}: {source}")]
    EventsFormat { path: PathBuf, source: serde_json::Error },
    #[error("could not set up logging: {0}")]
    Logging(String),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let result = match &cli {
        CliCommand::Process { config, event } => process(config, event).await,
        CliCommand::Check { config } => check(config.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "transformer failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: &Path) -> Result<Config, CliError> {
    let config = Config::from_file(path)?;
    config.validate()?;
    Ok(config)
}

async fn process(config_path: &Path, events_path: &Path) -> Result<ExitCode, CliError> {
    let config = load_config(config_path)?;
    let _sentry = init_logging(&config.logging)?;
    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }

    let transformer = Transformer::with_timeout(config.http.timeout())?;
    let events = read_events(events_path)?;
    tracing::info!(events = events.len(), path = %events_path.display(), "processing events");

    let mut failed = 0;
    for (index, event) in events.into_iter().enumerate() {
        let output = match transform(&transformer, event).await {
            Ok(requests) => json!({"index": index, "requests": requests}),
            Err(e) => {
                failed += 1;
                tracing::error!(index, error = %e, "event failed");
                json!({"index": index, "error": e.to_string()})
            }
        };
        println!("{output}");
    }

    if failed > 0 {
        tracing::warn!(failed, "some events could not be transformed");
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn transform(transformer: &Transformer, event: Value) -> Result<Value, CliError> {
    let event: TransformEvent = serde_json::from_value(event)
        .map_err(|e| TransformError::InvalidEvent(format!("malformed event: {e}")))?;
    let requests = transformer.process(&event).await?;
    serde_json::to_value(requests)
        .map_err(|e| CliError::Transform(TransformError::InvalidEvent(e.to_string())))
}

fn check(config_path: Option<&Path>) -> Result<ExitCode, CliError> {
    let timeout = match config_path {
        Some(path) => load_config(path)?.http.timeout(),
        None => Config::default().http.timeout(),
    };
    let transformer = Transformer::with_timeout(timeout)?;
    for name in transformer.destinations() {
        println!("{name}: ok");
    }
    Ok(ExitCode::SUCCESS)
}

/// Reads one event object or an array of events.
fn read_events(path: &Path) -> Result<Vec<Value>, CliError> {
    let data = std::fs::read_to_string(path).map_err(|source| CliError::Events {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&data).map_err(|source| CliError::EventsFormat {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(match value {
        Value::Array(events) => events,
        event => vec![event],
    })
}

/// Installs the fmt layer on stderr, keeping stdout for descriptors, plus
/// the Sentry layer when a DSN is configured.
fn init_logging(config: &LoggingConfig) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| CliError::Logging(e.to_string()))?,
    };

    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;

    Ok(guard)
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    shared::metrics_defs::describe_all(destinations::metrics_defs::ALL_METRICS);
    tracing::info!(host = %config.statsd_host, port = config.statsd_port, "statsd metrics enabled");
    Ok(())
}
