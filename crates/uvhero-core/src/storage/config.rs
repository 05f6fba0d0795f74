//! TOML-based application configuration.
//!
//! Stores:
//! - The timezone all local-day and wall-clock logic runs in
//! - The active ingestion/fetch window
//! - Aggregation and prevention timing
//! - Daily rollover schedule, retention and success threshold
//! - Forecast endpoint, selected city and refresh cadence
//!
//! Configuration is stored at `~/.config/uvhero/config.toml`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::daily::RolloverPolicy;
use crate::error::{ConfigError, CoreError};
use crate::window::ActiveWindow;

/// Active window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
}

/// Bucket aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_commit_interval_secs")]
    pub commit_interval_secs: u64,
    #[serde(default = "default_prevention_cooldown_secs")]
    pub prevention_cooldown_secs: u64,
}

/// Daily rollover configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloverSettings {
    #[serde(default = "default_fire_hour")]
    pub fire_hour: u32,
    #[serde(default)]
    pub fire_minute: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    #[serde(default = "default_run_now_deadline_secs")]
    pub run_now_deadline_secs: u64,
}

/// UV forecast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API token. `UVHERO_API_KEY` takes precedence when set.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_city")]
    pub selected_city: String,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_fix_hour")]
    pub fix_hour: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/uvhero/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// IANA timezone name.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub rollover: RolloverSettings,
    #[serde(default)]
    pub forecast: ForecastConfig,
}

// Default functions
fn default_timezone() -> String {
    "Asia/Tokyo".into()
}
fn default_start_hour() -> u32 {
    crate::window::DEFAULT_START_HOUR
}
fn default_end_hour() -> u32 {
    crate::window::DEFAULT_END_HOUR
}
fn default_commit_interval_secs() -> u64 {
    crate::sensor::DEFAULT_COMMIT_INTERVAL_SECS
}
fn default_prevention_cooldown_secs() -> u64 {
    crate::sensor::DEFAULT_PREVENTION_COOLDOWN_SECS
}
fn default_fire_hour() -> u32 {
    18
}
fn default_retention_days() -> usize {
    7
}
fn default_success_threshold() -> u32 {
    10
}
fn default_run_now_deadline_secs() -> u64 {
    25
}
fn default_endpoint() -> String {
    "https://api.openuv.io/api/v1/uv".into()
}
fn default_city() -> String {
    "Tokyo".into()
}
fn default_refresh_interval_secs() -> u64 {
    1800
}
fn default_fix_hour() -> u32 {
    9
}
fn default_request_timeout_secs() -> u64 {
    15
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            commit_interval_secs: default_commit_interval_secs(),
            prevention_cooldown_secs: default_prevention_cooldown_secs(),
        }
    }
}

impl Default for RolloverSettings {
    fn default() -> Self {
        Self {
            fire_hour: default_fire_hour(),
            fire_minute: 0,
            retention_days: default_retention_days(),
            success_threshold: default_success_threshold(),
            run_now_deadline_secs: default_run_now_deadline_secs(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: String::new(),
            selected_city: default_city(),
            refresh_interval_secs: default_refresh_interval_secs(),
            fix_hour: default_fix_hour(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            window: WindowConfig::default(),
            aggregation: AggregationConfig::default(),
            rollover: RolloverSettings::default(),
            forecast: ForecastConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".into(),
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot set a whole section".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// `config.toml` in the data directory.
    pub fn path() -> Result<PathBuf, CoreError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation, or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, CoreError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), CoreError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Apply a value by key and validate the result without saving.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown
    /// or the resulting configuration is invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        self.active_window()?;
        if self.rollover_policy().is_err() {
            return Err(ConfigError::InvalidValue {
                key: "rollover.fire_hour".into(),
                message: format!(
                    "{:02}:{:02} is not a valid time of day",
                    self.rollover.fire_hour, self.rollover.fire_minute
                ),
            });
        }
        if self.forecast.fix_hour > 23 {
            return Err(ConfigError::InvalidValue {
                key: "forecast.fix_hour".into(),
                message: "must be 0..=23".into(),
            });
        }
        if self.aggregation.commit_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "aggregation.commit_interval_secs".into(),
                message: "must be positive".into(),
            });
        }
        if self.rollover.retention_days == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rollover.retention_days".into(),
                message: "must keep at least one summary".into(),
            });
        }
        url::Url::parse(&self.forecast.endpoint).map_err(|e| ConfigError::InvalidValue {
            key: "forecast.endpoint".into(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "timezone".into(),
                message: e.to_string(),
            })
    }

    pub fn active_window(&self) -> Result<ActiveWindow, ConfigError> {
        ActiveWindow::new(self.window.start_hour, self.window.end_hour, self.tz()?).map_err(|e| {
            ConfigError::InvalidValue {
                key: "window".into(),
                message: e.to_string(),
            }
        })
    }

    pub fn rollover_policy(&self) -> Result<RolloverPolicy, ConfigError> {
        let fire_time = NaiveTime::from_hms_opt(self.rollover.fire_hour, self.rollover.fire_minute, 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "rollover.fire_hour".into(),
                message: "not a valid time of day".into(),
            })?;
        Ok(RolloverPolicy {
            fire_time,
            tz: self.tz()?,
            retention: self.rollover.retention_days,
            success_threshold: self.rollover.success_threshold,
        })
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_secs(self.aggregation.commit_interval_secs)
    }

    pub fn prevention_cooldown(&self) -> Duration {
        Duration::from_secs(self.aggregation.prevention_cooldown_secs)
    }

    pub fn run_now_deadline(&self) -> Duration {
        Duration::from_secs(self.rollover.run_now_deadline_secs)
    }

    /// API token, preferring `UVHERO_API_KEY` over the file.
    pub fn api_key(&self) -> String {
        std::env::var("UVHERO_API_KEY").unwrap_or_else(|_| self.forecast.api_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.timezone, "Asia/Tokyo");
        assert_eq!(parsed.rollover.fire_hour, 18);
        assert_eq!(parsed.forecast.selected_city, "Tokyo");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.window.start_hour, 5);
        assert_eq!(parsed.window.end_hour, 18);
        assert_eq!(parsed.aggregation.commit_interval_secs, 300);
        assert_eq!(parsed.aggregation.prevention_cooldown_secs, 60);
        assert_eq!(parsed.rollover.retention_days, 7);
        assert_eq!(parsed.rollover.success_threshold, 10);
        assert_eq!(parsed.forecast.refresh_interval_secs, 1800);
        assert_eq!(parsed.forecast.fix_hour, 9);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let parsed: Config = toml::from_str("[rollover]\nfire_hour = 20\n").unwrap();
        assert_eq!(parsed.rollover.fire_hour, 20);
        assert_eq!(parsed.rollover.retention_days, 7);
        let policy = parsed.rollover_policy().unwrap();
        assert_eq!(policy.fire_time, NaiveTime::from_hms_opt(20, 0, 0).unwrap());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("window.start_hour").as_deref(), Some("5"));
        assert_eq!(cfg.get("timezone").as_deref(), Some("Asia/Tokyo"));
        assert!(cfg.get("window.missing_key").is_none());
    }

    #[test]
    fn apply_updates_nested_number() {
        let mut cfg = Config::default();
        cfg.apply("rollover.fire_hour", "19").unwrap();
        assert_eq!(cfg.rollover.fire_hour, 19);
    }

    #[test]
    fn apply_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(cfg.apply("window.nonexistent", "1").is_err());
        assert!(cfg.apply("", "1").is_err());
    }

    #[test]
    fn apply_rejects_invalid_values() {
        let mut cfg = Config::default();
        assert!(cfg.apply("timezone", "Mars/Olympus").is_err());
        assert!(cfg.apply("window.start_hour", "18").is_err());
        assert!(cfg.apply("rollover.fire_hour", "24").is_err());
        assert!(cfg.apply("rollover.fire_hour", "evening").is_err());
        assert!(cfg.apply("forecast.endpoint", "not a url").is_err());
        // Rejected updates leave the config untouched
        assert_eq!(cfg.timezone, "Asia/Tokyo");
        assert_eq!(cfg.rollover.fire_hour, 18);
    }

    #[test]
    fn apply_accepts_other_timezone() {
        let mut cfg = Config::default();
        cfg.apply("timezone", "Europe/Berlin").unwrap();
        assert_eq!(cfg.tz().unwrap(), chrono_tz::Europe::Berlin);
    }
}
