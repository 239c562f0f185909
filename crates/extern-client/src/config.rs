//! Client configuration with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ExternConfig::default()`]
//! 2. If a config file is given, deep-merge its values over the defaults
//! 3. Apply `EXTERN_*` environment variable overrides (highest priority)
//! 4. Validate

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use extern_core::view::Props;
use extern_engine::DEFAULT_BOUNDARY;

use crate::errors::{ConfigError, Result};

/// Reconnection policy. Delays are in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub min: u64,
    pub max: u64,
    pub factor: f64,
    /// Fraction of the delay added or removed at random.
    pub jitter: f64,
    pub retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: 500,
            max: 30_000,
            factor: 2.0,
            jitter: 0.2,
            retries: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternConfig {
    /// Base URL for assets. Defaults to the stream URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn: Option<String>,
    /// Upper bound for a single asset download.
    pub timeout_ms: u64,
    /// Don't connect on construction.
    pub manual: bool,
    /// Merged under every fragment's state.
    pub props: Props,
    pub backoff: BackoffConfig,
    /// Message for the loading view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading: Option<String>,
    pub boundary: String,
    /// A stream silent for this long is considered dead.
    pub idle_timeout_ms: u64,
}

impl Default for ExternConfig {
    fn default() -> Self {
        Self {
            cdn: None,
            timeout_ms: 30_000,
            manual: false,
            props: Props::new(),
            backoff: BackoffConfig::default(),
            loading: None,
            boundary: DEFAULT_BOUNDARY.to_string(),
            idle_timeout_ms: 90_000,
        }
    }
}

impl ExternConfig {
    /// Defaults, then `path` (if any), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                tracing::debug!(?path, "loading config from file");
                let content = std::fs::read_to_string(path)?;
                Self::from_json_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Deep-merge a JSON document over the defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let defaults = serde_json::to_value(Self::default())?;
        let user: Value = serde_json::from_str(json)?;
        Ok(serde_json::from_value(deep_merge(defaults, user))?)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `EXTERN_*` overrides read through `lookup`. Invalid values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = read("EXTERN_CDN") {
            self.cdn = Some(v);
        }
        if let Some(v) = read("EXTERN_TIMEOUT_MS") {
            match parse_u64_range(&v, 1, 600_000) {
                Some(ms) => self.timeout_ms = ms,
                None => tracing::warn!(key = "EXTERN_TIMEOUT_MS", value = %v, "invalid env var, ignoring"),
            }
        }
        if let Some(v) = read("EXTERN_MANUAL") {
            match parse_bool(&v) {
                Some(manual) => self.manual = manual,
                None => tracing::warn!(key = "EXTERN_MANUAL", value = %v, "invalid env var, ignoring"),
            }
        }
        if let Some(v) = read("EXTERN_LOADING") {
            self.loading = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("timeoutMs must be positive".into()));
        }
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("idleTimeoutMs must be positive".into()));
        }
        if self.boundary.is_empty() {
            return Err(ConfigError::InvalidValue("boundary must not be empty".into()));
        }
        let b = &self.backoff;
        if b.min > b.max {
            return Err(ConfigError::InvalidValue(format!(
                "backoff.min ({}) exceeds backoff.max ({})",
                b.min, b.max
            )));
        }
        if !(b.factor >= 1.0) {
            return Err(ConfigError::InvalidValue(format!("backoff.factor must be >= 1, got {}", b.factor)));
        }
        if !(0.0..=1.0).contains(&b.jitter) {
            return Err(ConfigError::InvalidValue(format!(
                "backoff.jitter must be within 0..=1, got {}",
                b.jitter
            )));
        }
        if let Some(cdn) = &self.cdn {
            Url::parse(cdn).map_err(|e| ConfigError::InvalidValue(format!("cdn {cdn:?}: {e}")))?;
        }
        Ok(())
    }

    /// Base for asset URLs: the configured CDN or else `source`.
    pub fn cdn_url(&self, source: &Url) -> Result<Url> {
        match &self.cdn {
            Some(cdn) => Url::parse(cdn).map_err(|e| ConfigError::InvalidValue(format!("cdn {cdn:?}: {e}"))),
            None => Ok(source.clone()),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}
