//! Event manager configuration.

use std::collections::HashMap;
use std::env;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;
use crate::util::serde::SleepType;

/// Prefix of the environment variables read by [`EventManagerConfig::from_env`].
pub const ENV_PREFIX: &str = "EVENT_MANAGER_";

/// Upper bound accepted for any configured sleep time.
pub const MAX_SLEEP_MS: u64 = 60_000;

/// Settings applied to a new [`crate::core::EventManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventManagerConfig {
    /// Whether dispatch starts enabled.
    pub enabled: bool,
    /// Whether notifications are delivered.
    pub notify: bool,
    /// Queue limit for requests that do not set one; zero means unbounded.
    pub default_limit: usize,
    /// Manager-wide default sleep time.
    pub default_sleep_ms: Option<u64>,
    /// Minimum for every kind without its own entry. Must be non-zero.
    pub minimum_sleep_ms: Option<u64>,
    /// Per-kind sleep times.
    pub sleep_times: HashMap<SleepType, u64>,
    /// Per-kind minimum sleep times.
    pub minimum_sleep_times: HashMap<SleepType, u64>,
}

impl Default for EventManagerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notify: true,
            default_limit: 0,
            default_sleep_ms: None,
            minimum_sleep_ms: None,
            sleep_times: HashMap::new(),
            minimum_sleep_times: HashMap::new(),
        }
    }
}

impl EventManagerConfig {
    /// Validate configured values.
    ///
    /// # Errors
    ///
    /// Describes the first out-of-range value.
    pub fn validate(&self) -> Result<(), String> {
        let check = |label: String, ms: u64| {
            if ms > MAX_SLEEP_MS {
                Err(format!("{label} must be at most {MAX_SLEEP_MS} ms"))
            } else {
                Ok(())
            }
        };
        if let Some(ms) = self.default_sleep_ms {
            check("default_sleep_ms".into(), ms)?;
        }
        if let Some(ms) = self.minimum_sleep_ms {
            if ms == 0 {
                return Err("minimum_sleep_ms must be greater than 0".into());
            }
            check("minimum_sleep_ms".into(), ms)?;
        }
        for (kind, ms) in &self.sleep_times {
            check(format!("sleep_times.{kind:?}"), *ms)?;
        }
        for (kind, ms) in &self.minimum_sleep_times {
            check(format!("minimum_sleep_times.{kind:?}"), *ms)?;
        }
        Ok(())
    }

    /// Parse from JSON and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` if present, then read `EVENT_MANAGER_*` variables over the
    /// defaults: `ENABLED`, `NOTIFY`, `DEFAULT_LIMIT`, `DEFAULT_SLEEP_MS`,
    /// `MINIMUM_SLEEP_MS`.
    ///
    /// # Errors
    ///
    /// A variable that does not parse, or a value that fails validation.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Build from a variable lookup (keys without the prefix).
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_vars<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(value) = lookup("ENABLED") {
            cfg.enabled = parse_bool(&value).with_context(|| format!("{ENV_PREFIX}ENABLED"))?;
        }
        if let Some(value) = lookup("NOTIFY") {
            cfg.notify = parse_bool(&value).with_context(|| format!("{ENV_PREFIX}NOTIFY"))?;
        }
        if let Some(value) = lookup("DEFAULT_LIMIT") {
            cfg.default_limit = value
                .trim()
                .parse()
                .with_context(|| format!("{ENV_PREFIX}DEFAULT_LIMIT"))?;
        }
        if let Some(value) = lookup("DEFAULT_SLEEP_MS") {
            cfg.default_sleep_ms = Some(
                value
                    .trim()
                    .parse()
                    .with_context(|| format!("{ENV_PREFIX}DEFAULT_SLEEP_MS"))?,
            );
        }
        if let Some(value) = lookup("MINIMUM_SLEEP_MS") {
            cfg.minimum_sleep_ms = Some(
                value
                    .trim()
                    .parse()
                    .with_context(|| format!("{ENV_PREFIX}MINIMUM_SLEEP_MS"))?,
            );
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got `{other}`"),
    }
}
