use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::RetryPolicy;

/// Error produced when client configuration fails validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
    #[error("max_send_attempts must be at least 1")]
    ZeroSendAttempts,
    #[error("max_reconnect_attempts must be at least 1")]
    ZeroReconnectAttempts,
    #[error("app_path must start with '/': {0:?}")]
    InvalidAppPath(String),
    #[error("config parse error: {0}")]
    Parse(String),
}

/// Tunables for one device session.
///
/// Defaults match what the devices tolerate in practice: a five second
/// request timeout and three sends per connection across three connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub request_timeout_ms: u64,
    pub app_path: String,
    pub max_send_attempts: u8,
    pub max_reconnect_attempts: u8,
    /// Reject replies whose envelope signature does not verify.
    pub verify_response_signature: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            app_path: "/app".to_string(),
            max_send_attempts: 3,
            max_reconnect_attempts: 3,
            verify_response_signature: false,
        }
    }
}

impl SessionConfig {
    /// Parses a JSON document, filling absent fields with defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()
    }

    /// Rejects values that would make the session unusable.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_send_attempts == 0 {
            return Err(ConfigError::ZeroSendAttempts);
        }
        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::ZeroReconnectAttempts);
        }
        if !self.app_path.starts_with('/') {
            return Err(ConfigError::InvalidAppPath(self.app_path));
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_send_attempts: self.max_send_attempts,
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }

    /// `http://<address><app_path>`, with any trailing slash on the path dropped.
    pub fn base_url(&self, address: &str) -> String {
        format!("http://{}{}", address, self.app_path.trim_end_matches('/'))
    }
}
