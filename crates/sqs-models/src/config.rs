//! Registry configuration and the connection parameters derived from it.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest batch a single receive call may return
pub const MAX_MESSAGES_LIMIT: u32 = 10;

/// Longest visibility timeout the transport accepts (12 hours)
pub const VISIBILITY_TIMEOUT_LIMIT: u32 = 43_200;

/// Longest long-poll wait the transport accepts
pub const WAIT_TIME_SECONDS_LIMIT: u32 = 20;

/// Longest per-message send delay the transport accepts (15 minutes)
pub const DELAY_SECONDS_LIMIT: u32 = 900;

/// Prefix of environment variables read by [`QueueSettings::load`]
pub const ENV_PREFIX: &str = "SQS_MODELS";

/// Configuration of a single queue registry
///
/// Every field has a serde default so a partially specified file or an
/// environment that only sets `SQS_MODELS__QUEUE_URL` still produces a
/// usable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Locator of the queue (the SQS queue URL)
    pub queue_url: String,

    /// Region the queue lives in
    pub region: String,

    /// Default batch size for receive calls (1-10)
    pub max_messages: Option<u32>,

    /// Default visibility timeout in seconds (0-43200)
    pub visibility_timeout: Option<u32>,

    /// Default long-poll wait in seconds (0-20)
    pub wait_time_seconds: Option<u32>,

    /// Endpoint override, e.g. a local emulator
    pub endpoint_url: Option<String>,

    /// Whether the transport connects over TLS
    pub use_ssl: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            region: "us-east-1".to_string(),
            max_messages: Some(1),
            visibility_timeout: None,
            wait_time_seconds: None,
            endpoint_url: None,
            use_ssl: true,
        }
    }
}

impl QueueSettings {
    /// Create settings for a queue with all other values defaulted
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            ..Self::default()
        }
    }

    /// Set region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set default batch size
    pub fn with_max_messages(mut self, max_messages: u32) -> Self {
        self.max_messages = Some(max_messages);
        self
    }

    /// Set default visibility timeout
    pub fn with_visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }

    /// Set default long-poll wait
    pub fn with_wait_time_seconds(mut self, seconds: u32) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }

    /// Set endpoint override
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// Set transport security flag
    pub fn with_use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// Check every value against the transport's accepted ranges
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.queue_url.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "queue_url".to_string(),
            });
        }

        if self.region.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "region".to_string(),
            });
        }

        if let Some(max_messages) = self.max_messages {
            if !(1..=MAX_MESSAGES_LIMIT).contains(&max_messages) {
                return Err(ConfigurationError::Invalid {
                    message: format!(
                        "max_messages must be between 1 and {}, got {}",
                        MAX_MESSAGES_LIMIT, max_messages
                    ),
                });
            }
        }

        if let Some(visibility_timeout) = self.visibility_timeout {
            if visibility_timeout > VISIBILITY_TIMEOUT_LIMIT {
                return Err(ConfigurationError::Invalid {
                    message: format!(
                        "visibility_timeout must be at most {} seconds, got {}",
                        VISIBILITY_TIMEOUT_LIMIT, visibility_timeout
                    ),
                });
            }
        }

        if let Some(wait_time_seconds) = self.wait_time_seconds {
            if wait_time_seconds > WAIT_TIME_SECONDS_LIMIT {
                return Err(ConfigurationError::Invalid {
                    message: format!(
                        "wait_time_seconds must be at most {} seconds, got {}",
                        WAIT_TIME_SECONDS_LIMIT, wait_time_seconds
                    ),
                });
            }
        }

        if let Some(endpoint_url) = self.endpoint_override() {
            url::Url::parse(endpoint_url).map_err(|e| ConfigurationError::Invalid {
                message: format!("endpoint_url '{}' is not a valid URL: {}", endpoint_url, e),
            })?;
        }

        Ok(())
    }

    /// Load settings from an optional file followed by `SQS_MODELS__*`
    /// environment variables, later sources overriding earlier ones.
    ///
    /// e.g. `SQS_MODELS__QUEUE_URL=http://localhost:4566/000000000000/tasks`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?
            .try_deserialize()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Endpoint override, with a blank value treated as absent
    pub fn endpoint_override(&self) -> Option<&str> {
        self.endpoint_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Connection parameters handed to the transport on every call
    pub fn client_parameters(&self) -> ClientParameters {
        ClientParameters {
            region: self.region.clone(),
            use_ssl: self.use_ssl,
            endpoint_url: self.endpoint_override().map(str::to_string),
        }
    }
}

/// Parameters a transport needs to build a client for one registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientParameters {
    pub region: String,
    pub use_ssl: bool,
    /// Only present when an override was configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
