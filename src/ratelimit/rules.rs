//! Per-identity limit overrides.
//!
//! A [`LimitResolver`] picks the quota and window for one identity key.
//! Values of zero or below mean "use the limiter's static defaults".
//! Rules can be loaded from YAML:
//!
//! ```yaml
//! rules:
//!   - key: "10.0.0.1"
//!     max: 100
//!   - prefix: "partner:"
//!     max: 1000
//!     window_secs: 3600
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::{Result, SlidegateError};

/// Resolves the limit and window to apply to an identity key.
pub trait LimitResolver: Send + Sync {
    /// Hits allowed per window; `<= 0` falls back to the default.
    fn max(&self, key: &str) -> i64;

    /// Window length in seconds; `<= 0` falls back to the default.
    fn window_secs(&self, key: &str) -> i64;
}

/// A single override rule. Exactly one of `key` or `prefix` should be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitRule {
    /// Matches this identity key exactly
    #[serde(default)]
    pub key: Option<String>,
    /// Matches identity keys starting with this prefix
    #[serde(default)]
    pub prefix: Option<String>,
    /// Hits allowed per window
    #[serde(default)]
    pub max: i64,
    /// Window length in seconds
    #[serde(default)]
    pub window_secs: i64,
}

impl LimitRule {
    fn matches(&self, key: &str) -> bool {
        match (&self.key, &self.prefix) {
            (Some(exact), _) => exact == key,
            (None, Some(prefix)) => key.starts_with(prefix.as_str()),
            (None, None) => false,
        }
    }
}

/// An ordered list of rules; the first matching rule wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitRules {
    #[serde(default)]
    pub rules: Vec<LimitRule>,
}

impl LimitRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limit rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: LimitRules = serde_yaml::from_str(yaml)
            .map_err(|e| SlidegateError::Config(format!("Failed to parse limit rules: {}", e)))?;

        for (i, rule) in rules.rules.iter().enumerate() {
            if rule.key.is_some() == rule.prefix.is_some() {
                return Err(SlidegateError::Config(format!(
                    "limit rule {} must set exactly one of `key` or `prefix`",
                    i
                )));
            }
        }
        Ok(rules)
    }

    /// Find the first rule matching `key`.
    pub fn find(&self, key: &str) -> Option<&LimitRule> {
        self.rules.iter().find(|rule| rule.matches(key))
    }
}

impl LimitResolver for LimitRules {
    fn max(&self, key: &str) -> i64 {
        self.find(key).map(|r| r.max).unwrap_or(0)
    }

    fn window_secs(&self, key: &str) -> i64 {
        self.find(key).map(|r| r.window_secs).unwrap_or(0)
    }
}

type KeyFn = dyn Fn(&str) -> i64 + Send + Sync;

/// A resolver built from closures.
#[derive(Clone, Default)]
pub struct FnLimits {
    max: Option<Arc<KeyFn>>,
    window: Option<Arc<KeyFn>>,
}

impl FnLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> i64 + Send + Sync + 'static,
    {
        self.max = Some(Arc::new(f));
        self
    }

    pub fn window_secs<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> i64 + Send + Sync + 'static,
    {
        self.window = Some(Arc::new(f));
        self
    }
}

impl LimitResolver for FnLimits {
    fn max(&self, key: &str) -> i64 {
        self.max.as_ref().map(|f| f(key)).unwrap_or(0)
    }

    fn window_secs(&self, key: &str) -> i64 {
        self.window.as_ref().map(|f| f(key)).unwrap_or(0)
    }
}
