use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default estimate used when a session starts without a usable target
pub const DEFAULT_TARGET_UNITS: u64 = 600;

/// Flush cadence relative to the tick cadence
pub const DEFAULT_FLUSH_MULTIPLIER: u32 = 30;

const ENV_API_URL: &str = "SESSION_TRACKER_API_URL";
const ENV_API_TOKEN: &str = "SESSION_TRACKER_API_TOKEN";

/// Timing configuration for a tracked session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    #[serde(rename = "tick_interval_ms", with = "millis")]
    pub tick_interval: Duration,
    pub flush_multiplier: u32,
    pub default_target_units: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            flush_multiplier: DEFAULT_FLUSH_MULTIPLIER,
            default_target_units: DEFAULT_TARGET_UNITS,
        }
    }
}

impl TrackerConfig {
    /// Interval of the remote flush timer
    pub fn flush_interval(&self) -> Result<Duration> {
        self.tick_interval
            .checked_mul(self.flush_multiplier)
            .ok_or_else(|| TrackerError::Config("flush interval overflows".to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(TrackerError::Config("tick_interval must be > 0".to_string()));
        }
        if self.flush_multiplier == 0 {
            return Err(TrackerError::Config("flush_multiplier must be > 0".to_string()));
        }
        if self.default_target_units == 0 {
            return Err(TrackerError::Config("default_target_units must be > 0".to_string()));
        }
        self.flush_interval()?;
        Ok(())
    }
}

/// Polling configuration for message/notification views
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// REST backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub poll: PollConfig,
    pub api: ApiConfig,
}

impl AppConfig {
    /// Load from a JSON file, then apply environment overrides.
    /// A missing path yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.is_empty() {
                self.api.base_url = url;
            }
        }
        if let Ok(token) = std::env::var(ENV_API_TOKEN) {
            if !token.is_empty() {
                self.api.token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        if self.poll.interval.is_zero() {
            return Err(TrackerError::Config("poll interval must be > 0".to_string()));
        }
        if self.api.base_url.is_empty() {
            return Err(TrackerError::Config("api base_url is empty".to_string()));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_flush_interval_is_thirty_ticks() {
        let config = TrackerConfig::default();
        assert_eq!(config.flush_interval().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_overflowing_flush_interval() {
        let config = TrackerConfig {
            tick_interval: Duration::from_secs(u64::MAX / 10),
            ..Default::default()
        };
        assert!(config.flush_interval().is_err());
        assert!(matches!(config.validate(), Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_multiplier() {
        let config = TrackerConfig {
            flush_multiplier: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "tracker": { "tick_interval_ms": 250 }, "api": { "base_url": "http://api.test" } }"#;
        let config: AppConfig = serde_json::from_str(json).expect("Failed to parse config");
        assert_eq!(config.tracker.tick_interval, Duration::from_millis(250));
        assert_eq!(config.tracker.flush_multiplier, DEFAULT_FLUSH_MULTIPLIER);
        assert_eq!(config.poll.interval, Duration::from_secs(5));
        assert_eq!(config.api.base_url, "http://api.test");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "poll": {{ "interval_ms": 2000 }} }}"#).unwrap();

        let config = AppConfig::load(Some(file.path())).expect("Failed to load config");
        assert_eq!(config.poll.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_load_rejects_zero_poll_interval() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "poll": {{ "interval_ms": 0 }} }}"#).unwrap();

        assert!(AppConfig::load(Some(file.path())).is_err());
    }
}
