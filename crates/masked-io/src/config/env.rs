//! Environment-based configuration.

use std::collections::HashMap;
use std::time::Duration;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "MASKED_IO";

/// Environment variable reader.
///
/// Reads `<PREFIX>_<NAME>` from the process environment, or from a fixed
/// set of variables supplied with [`EnvConfig::with_vars`].
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Variables to read instead of the process environment.
    vars: Option<HashMap<String, String>>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a new environment config reader.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Read from the given variables instead of the process environment.
    #[must_use]
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        match &self.vars {
            Some(vars) => vars.get(&var_name).cloned(),
            None => std::env::var(&var_name).ok(),
        }
    }

    /// Get a comma-separated list, trimmed, without empty items.
    #[must_use]
    pub fn list(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
    }

    /// Get a boolean value.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "enabled"
            )
        })
    }

    /// Get a duration in microseconds.
    ///
    /// Returns `Some(Err(raw))` if the variable is set but not a number.
    #[must_use]
    pub fn duration_micros(&self, name: &str) -> Option<Result<Duration, String>> {
        self.get(name).map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_micros)
                .map_err(|_| raw)
        })
    }
}

/// Variable names read by [`MaskConfig::apply_env`](crate::MaskConfig::apply_env).
pub mod vars {
    /// Comma-separated keywords to add.
    pub const KEYWORDS: &str = "KEYWORDS";
    /// Mask token.
    pub const MASK_TOKEN: &str = "MASK_TOKEN";
    /// Auto-flush switch.
    pub const AUTO_FLUSH: &str = "AUTO_FLUSH";
    /// Auto-flush delay in microseconds.
    pub const FLUSH_DELAY_US: &str = "FLUSH_DELAY_US";
}
