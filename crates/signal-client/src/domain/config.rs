//! Client configuration with validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default push-event buffer per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Default maximum inbound frame size (1MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long a correlated request may wait for its response.
    /// `None` waits indefinitely.
    #[serde(with = "humantime_serde::option")]
    pub request_timeout: Option<Duration>,
    /// Reject every pending request with `Disconnected` when the transport
    /// closes, instead of leaving them waiting for a reconnect.
    pub fail_pending_on_disconnect: bool,
    /// Push events buffered per subscriber before the slowest one lags.
    pub event_capacity: usize,
    /// Inbound frames larger than this are dropped as malformed.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            fail_pending_on_disconnect: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// - `SIGNAL_REQUEST_TIMEOUT`: e.g. `10s`, `250ms`, `2m`
    /// - `SIGNAL_FAIL_PENDING_ON_DISCONNECT`: `true` / `false`
    /// - `SIGNAL_EVENT_CAPACITY`: integer
    /// - `SIGNAL_MAX_FRAME_SIZE`: integer (bytes)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var("SIGNAL_REQUEST_TIMEOUT") {
            let timeout = humantime_serde::parse_duration(&value)
                .map_err(|e| ConfigError::InvalidTimeout(format!("{value}: {e}")))?;
            config.request_timeout = Some(timeout);
        }

        if let Ok(value) = env::var("SIGNAL_FAIL_PENDING_ON_DISCONNECT") {
            config.fail_pending_on_disconnect = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SIGNAL_FAIL_PENDING_ON_DISCONNECT", value))?;
        }

        if let Ok(value) = env::var("SIGNAL_EVENT_CAPACITY") {
            config.event_capacity = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SIGNAL_EVENT_CAPACITY", value))?;
        }

        if let Ok(value) = env::var("SIGNAL_MAX_FRAME_SIZE") {
            config.max_frame_size = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SIGNAL_MAX_FRAME_SIZE", value))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidLimit("event_capacity cannot be 0".into()));
        }

        if self.max_frame_size == 0 {
            return Err(ConfigError::InvalidLimit("max_frame_size cannot be 0".into()));
        }

        if matches!(self.request_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(&'static str, String),
}

/// Duration (de)serialization as `"10s"`, `"250ms"`, `"2m"`.
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m".
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }

    pub mod option {
        use super::parse_duration;
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(duration) => super::serialize(duration, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
