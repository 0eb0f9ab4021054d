//! Breaker configuration types.
//!
//! Per Iron Lotus Framework: Configuration is validated at load time (Poka-Yoke),
//! with sensible defaults and clear error messages.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::settings::{
    DEFAULT_INTERVAL, DEFAULT_MAX_REQUESTS, DEFAULT_TIMEOUT, Settings, TripPolicy,
};

/// Registry-wide configuration file.
///
/// # Toyota Way: Standardized Work (標準作業)
/// Every breaker starts from the same defaults; only deviations are listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Values for breakers without their own entry.
    #[serde(default)]
    pub defaults: BreakerDefaults,

    /// Per-breaker overrides.
    #[serde(default)]
    pub breakers: Vec<BreakerConfig>,
}

impl RegistryConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    /// Returns an error if the document cannot be parsed or is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::parse(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error on an invalid value or a duplicated breaker name.
    pub fn validate(&self) -> Result<()> {
        self.defaults.validate()?;

        let mut seen = HashSet::new();
        for breaker in &self.breakers {
            breaker.validate()?;
            if !seen.insert(breaker.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "breaker '{}' is configured more than once",
                    breaker.name
                )));
            }
        }
        Ok(())
    }

    /// Returns the entry for `name`, if one is configured.
    #[must_use]
    pub fn breaker(&self, name: &str) -> Option<&BreakerConfig> {
        self.breakers.iter().find(|b| b.name == name)
    }

    /// Builds settings for `name`: its own entry layered on the defaults.
    #[must_use]
    pub fn settings_for(&self, name: &str) -> Settings {
        self.breaker(name).map_or_else(
            || self.defaults.apply(Settings::new(name)),
            |breaker| breaker.into_settings(&self.defaults),
        )
    }
}

/// Defaults shared by every breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerDefaults {
    /// Half-open probe budget.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// `Closed` statistics window. `0s` never resets.
    #[serde(default = "default_interval")]
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Time spent open before probing.
    #[serde(default = "default_timeout")]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Trip predicate.
    #[serde(default)]
    pub trip: TripPolicy,
}

const fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

const fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Default for BreakerDefaults {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            interval: default_interval(),
            timeout: default_timeout(),
            trip: TripPolicy::default(),
        }
    }
}

impl BreakerDefaults {
    /// Validates the defaults.
    ///
    /// # Errors
    /// Returns an error if the trip policy is invalid.
    pub fn validate(&self) -> Result<()> {
        validate_trip(&self.trip)
    }

    /// Writes these values onto `settings`, keeping its name, callbacks,
    /// observer and clock.
    #[must_use]
    pub fn apply(&self, settings: Settings) -> Settings {
        settings
            .with_max_requests(self.max_requests)
            .with_interval(self.interval)
            .with_timeout(self.timeout)
            .with_trip_policy(self.trip)
    }
}

/// One breaker's overrides. Unset fields fall back to [`BreakerDefaults`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Breaker name.
    pub name: String,

    /// Half-open probe budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<u32>,

    /// `Closed` statistics window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(with = "humantime_serde::option")]
    pub interval: Option<Duration>,

    /// Time spent open before probing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(with = "humantime_serde::option")]
    pub timeout: Option<Duration>,

    /// Trip predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip: Option<TripPolicy>,
}

impl BreakerConfig {
    /// Creates an entry overriding nothing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_requests: None,
            interval: None,
            timeout: None,
            trip: None,
        }
    }

    /// Validates the entry.
    ///
    /// # Errors
    /// Returns an error if the name or trip policy is invalid.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if let Some(trip) = &self.trip {
            validate_trip(trip)
                .map_err(|e| ConfigError::invalid(format!("breaker '{}': {e}", self.name)))?;
        }
        Ok(())
    }

    /// Builds settings from this entry layered on `defaults`.
    #[must_use]
    pub fn into_settings(&self, defaults: &BreakerDefaults) -> Settings {
        self.apply(defaults.apply(Settings::new(&self.name)))
    }

    /// Writes the overridden values onto `settings`.
    #[must_use]
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(max_requests) = self.max_requests {
            settings = settings.with_max_requests(max_requests);
        }
        if let Some(interval) = self.interval {
            settings = settings.with_interval(interval);
        }
        if let Some(timeout) = self.timeout {
            settings = settings.with_timeout(timeout);
        }
        if let Some(trip) = self.trip {
            settings = settings.with_trip_policy(trip);
        }
        settings
    }
}

/// Checks a breaker name: non-empty, `[A-Za-z0-9_.:/-]` only.
///
/// # Errors
/// Returns an error describing the first problem found.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ConfigError::invalid("breaker name cannot be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/'))
    {
        return Err(ConfigError::invalid(format!(
            "breaker name '{name}' must contain only ASCII alphanumerics and '-', '_', '.', ':', '/'"
        )));
    }
    Ok(())
}

fn validate_trip(trip: &TripPolicy) -> Result<()> {
    if let TripPolicy::FailureRatio { ratio, .. } = *trip {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::invalid(format!(
                "failure ratio must be in (0, 1], got {ratio}"
            )));
        }
    }
    Ok(())
}

/// Humantime serialization for Duration.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        #[allow(clippy::ref_option)]
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Option::<String>::deserialize(deserializer)?
                .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
