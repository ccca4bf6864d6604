//! Startup configuration for the carousel
//!
//! The carousel is configured by a YAML file listing named throttles and the
//! cycles that reference them. Validation failures at load time abort
//! startup. Duration fields accept `"150ms"`, `"30s"`, `"5m"`, `"2h"` or a
//! bare number of seconds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::scheduler::cycle::CycleConfig;
use crate::scheduler::error::SchedulerError;

/// Top-level configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarouselConfig {
    /// Named throttles shared between cycles
    #[serde(default)]
    pub throttles: Vec<ThrottleConfig>,

    /// Cycle definitions
    #[serde(default)]
    pub cycles: Vec<CycleConfig>,
}

/// A named throttle definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub name: String,

    #[serde(with = "duration_string")]
    pub interval: Duration,
}

impl CarouselConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every throttle and cycle definition.
    pub fn validate(&self) -> std::result::Result<(), SchedulerError> {
        for throttle in &self.throttles {
            if throttle.name.trim().is_empty() {
                return Err(SchedulerError::invalid_config("throttle name is required"));
            }
            if throttle.interval.is_zero() {
                return Err(SchedulerError::invalid_config(format!(
                    "throttle {} must have a non-zero interval",
                    throttle.name
                )));
            }
        }

        for cycle in &self.cycles {
            cycle.validate()?;
        }

        Ok(())
    }
}

/// Parse a duration string: `"150ms"`, `"30s"`, `"5m"`, `"2h"` or bare seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Some(stripped) = s.strip_suffix("ms") {
        let ms: u64 = stripped
            .trim()
            .parse()
            .map_err(|_| format!("Invalid duration: {s}"))?;
        Ok(Duration::from_millis(ms))
    } else if let Some(stripped) = s.strip_suffix('s') {
        let secs: u64 = stripped
            .trim()
            .parse()
            .map_err(|_| format!("Invalid duration: {s}"))?;
        Ok(Duration::from_secs(secs))
    } else if let Some(stripped) = s.strip_suffix('m') {
        let mins: u64 = stripped
            .trim()
            .parse()
            .map_err(|_| format!("Invalid duration: {s}"))?;
        Ok(Duration::from_secs(mins * 60))
    } else if let Some(stripped) = s.strip_suffix('h') {
        let hours: u64 = stripped
            .trim()
            .parse()
            .map_err(|_| format!("Invalid duration: {s}"))?;
        Ok(Duration::from_secs(hours * 3600))
    } else {
        let secs: u64 = s.parse().map_err(|_| format!("Invalid duration: {s}"))?;
        Ok(Duration::from_secs(secs))
    }
}

/// Render a duration in the most compact unit `parse_duration` accepts.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 {
        return "0s".to_string();
    }
    if ms % 1000 != 0 {
        return format!("{ms}ms");
    }
    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Serde adapter for required duration-string fields
pub mod duration_string {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional duration-string fields
pub mod option_duration_string {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_some(&format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        match s {
            Some(s) if !s.trim().is_empty() => parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}
