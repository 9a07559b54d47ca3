//! Harness configuration loaded from `PYHARNESS_*` environment variables.
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `PYHARNESS_TIMEOUT_MS` | `sandbox.timeout_ms` | 1000 |
//! | `PYHARNESS_READY_TIMEOUT_MS` | `sandbox.ready_timeout_ms` | 30000 |
//! | `PYHARNESS_MAX_OUTPUT_BYTES` | `sandbox.max_output_bytes` | 1048576 |
//! | `PYHARNESS_ALLOWED_MODULES` | `sandbox.allowed_modules` (comma separated) | see [`DEFAULT_ALLOWED_MODULES`](crate::types::DEFAULT_ALLOWED_MODULES) |
//! | `PYHARNESS_COMPILE_CACHE_SIZE` | `sandbox.compile_cache_size` | 256 |
//! | `PYHARNESS_STDLIB_PATHS` | `sandbox.stdlib_paths` (`:` separated) | probed |
//! | `PYHARNESS_BACKEND_URL` | `backend_url` | unset |
//! | `PYHARNESS_CSRF_TOKEN` | `csrf_token` | unset |
//!
//! Unset or empty variables fall back to the default; anything that does not
//! parse is a [`ConfigError::Invalid`].

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::SandboxSettings;

/// Everything the harness reads from its environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub sandbox: SandboxSettings,
    /// Base URL of the question backend, e.g. `https://codewof.example/`.
    pub backend_url: Option<String>,
    /// Token sent as `X-CSRFToken` / `csrfmiddlewaretoken`.
    pub csrf_token: Option<String>,
}

impl HarnessConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = SandboxSettings::default();

        let sandbox = SandboxSettings {
            timeout_ms: parse_or(&var, "PYHARNESS_TIMEOUT_MS", defaults.timeout_ms)?,
            ready_timeout_ms: parse_or(
                &var,
                "PYHARNESS_READY_TIMEOUT_MS",
                defaults.ready_timeout_ms,
            )?,
            max_output_bytes: parse_or(
                &var,
                "PYHARNESS_MAX_OUTPUT_BYTES",
                defaults.max_output_bytes,
            )?,
            allowed_modules: match var("PYHARNESS_ALLOWED_MODULES") {
                Some(list) => split_list(&list, ','),
                None => defaults.allowed_modules,
            },
            compile_cache_size: parse_or(
                &var,
                "PYHARNESS_COMPILE_CACHE_SIZE",
                defaults.compile_cache_size,
            )?,
            stdlib_paths: var("PYHARNESS_STDLIB_PATHS")
                .map(|paths| split_list(&paths, ':'))
                .unwrap_or_default(),
        };

        if sandbox.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "PYHARNESS_TIMEOUT_MS",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            sandbox,
            backend_url: var("PYHARNESS_BACKEND_URL"),
            csrf_token: var("PYHARNESS_CSRF_TOKEN"),
        })
    }
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // (1) empty environment yields the defaults
    #[test]
    fn test_empty_environment_is_default() {
        let config = HarnessConfig::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(config, HarnessConfig::default());
    }

    // (2) every variable is honoured
    #[test]
    fn test_overrides() {
        let config = HarnessConfig::from_lookup(lookup(&[
            ("PYHARNESS_TIMEOUT_MS", "2500"),
            ("PYHARNESS_READY_TIMEOUT_MS", "5000"),
            ("PYHARNESS_MAX_OUTPUT_BYTES", "4096"),
            ("PYHARNESS_ALLOWED_MODULES", "math, re ,,json"),
            ("PYHARNESS_COMPILE_CACHE_SIZE", "8"),
            ("PYHARNESS_STDLIB_PATHS", "/opt/py/lib:/usr/lib/python3"),
            ("PYHARNESS_BACKEND_URL", "http://localhost:8000/"),
            ("PYHARNESS_CSRF_TOKEN", "abc"),
        ]))
        .expect("valid config");
        assert_eq!(config.sandbox.timeout_ms, 2500);
        assert_eq!(config.sandbox.ready_timeout_ms, 5000);
        assert_eq!(config.sandbox.max_output_bytes, 4096);
        assert_eq!(config.sandbox.allowed_modules, vec!["math", "re", "json"]);
        assert_eq!(config.sandbox.compile_cache_size, 8);
        assert_eq!(
            config.sandbox.stdlib_paths,
            vec!["/opt/py/lib", "/usr/lib/python3"]
        );
        assert_eq!(config.backend_url.as_deref(), Some("http://localhost:8000/"));
        assert_eq!(config.csrf_token.as_deref(), Some("abc"));
    }

    // (3) unparseable numbers are rejected with the offending key
    #[test]
    fn test_invalid_number() {
        let err = HarnessConfig::from_lookup(lookup(&[("PYHARNESS_TIMEOUT_MS", "soon")]))
            .expect_err("should reject");
        match err {
            ConfigError::Invalid { key, value, .. } => {
                assert_eq!(key, "PYHARNESS_TIMEOUT_MS");
                assert_eq!(value, "soon");
            }
        }
    }

    // (4) a zero timeout is rejected
    #[test]
    fn test_zero_timeout_rejected() {
        assert!(HarnessConfig::from_lookup(lookup(&[("PYHARNESS_TIMEOUT_MS", "0")])).is_err());
    }

    // (5) blank values fall back to defaults
    #[test]
    fn test_blank_values_ignored() {
        let config = HarnessConfig::from_lookup(lookup(&[
            ("PYHARNESS_MAX_OUTPUT_BYTES", "  "),
            ("PYHARNESS_BACKEND_URL", ""),
        ]))
        .expect("valid config");
        assert_eq!(config.sandbox.max_output_bytes, 1_048_576);
        assert!(config.backend_url.is_none());
    }
}
