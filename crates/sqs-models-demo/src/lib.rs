//! Shared pieces of the `sender` and `worker` demo binaries.
//!
//! Both binaries read their queue settings through
//! [`QueueSettings::load`]: an optional file named by `SQS_MODELS_CONFIG_FILE`,
//! then `SQS_MODELS__*` environment variables, e.g.
//!
//! ```text
//! SQS_MODELS__QUEUE_URL=http://localhost:4566/000000000000/tasks
//! SQS_MODELS__ENDPOINT_URL=http://localhost:4566
//! SQS_MODELS__USE_SSL=false
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqs_models::{ModelBinding, QueueModel, QueueRegistry, QueueSettings, ValidationError};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Environment variable naming an optional settings file
pub const CONFIG_FILE_ENV: &str = "SQS_MODELS_CONFIG_FILE";

/// A unit of work passed from the sender to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncTask {
    /// This task's uuid
    pub uuid: String,
    /// The message to print
    pub message: String,
}

impl AsyncTask {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            message: message.into(),
        }
    }
}

impl QueueModel for AsyncTask {
    fn binding() -> &'static ModelBinding {
        static BINDING: ModelBinding = ModelBinding::new();
        &BINDING
    }

    fn validate(&self) -> Result<(), ValidationError> {
        uuid::Uuid::parse_str(&self.uuid).map_err(|e| ValidationError::InvalidFormat {
            field: "uuid".to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

/// Initialize logging
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqs_models=info,sqs_models_demo=info,sender=info,worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Connect to the configured queue and register [`AsyncTask`].
///
/// The returned registry must be kept alive for as long as records are
/// sent or received.
pub async fn connect() -> anyhow::Result<QueueRegistry> {
    let config_file = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|path| !path.is_empty());
    let settings = QueueSettings::load(config_file.as_deref().map(Path::new))
        .context("failed to load queue settings")?;

    let registry = QueueRegistry::connect(settings).await?;
    registry.register::<AsyncTask>()?;

    info!(queue_url = %registry.queue_url(), "Connected to queue");
    Ok(registry)
}

/// Read a tunable from the environment, falling back to `default` when unset
pub fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_or(key, std::env::var(key).ok(), default)
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, value)),
    }
}

/// Read a number of seconds from the environment as a [`Duration`], falling
/// back to `default_seconds` when unset
pub fn env_seconds(key: &str, default_seconds: f64) -> anyhow::Result<Duration> {
    seconds_or(key, std::env::var(key).ok(), default_seconds)
}

fn seconds_or(key: &str, raw: Option<String>, default_seconds: f64) -> anyhow::Result<Duration> {
    let seconds: f64 = parse_or(key, raw, default_seconds)?;
    Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("invalid duration for {}: {}", key, seconds))
}
