//! Configuration helpers: endpoint resolution and base-service defaults
//!
//! Credentials are never embedded. An API key, if the endpoint needs one, is
//! read from `VLM_API_KEY` or supplied by the caller.

use crate::{Error, Result};
use std::env;
use std::str::FromStr;

/// Environment variable holding the endpoint base URL
pub const ENV_ENDPOINT_URL: &str = "VLM_ENDPOINT_URL";
/// Environment variable holding the model name
pub const ENV_MODEL: &str = "VLM_MODEL";
/// Environment variable holding an optional bearer token
pub const ENV_API_KEY: &str = "VLM_API_KEY";
pub const ENV_MAX_RETRIES: &str = "VLM_MAX_RETRIES";
pub const ENV_TIMEOUT_SECS: &str = "VLM_TIMEOUT_SECS";
pub const ENV_MAX_TOKENS: &str = "VLM_MAX_TOKENS";

/// Endpoint used when neither `VLM_ENDPOINT_URL` nor a fallback is given
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/v1";

/// Defaults a call falls back to when it doesn't set retries or timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDefaults {
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub max_tokens: Option<u32>,
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout_secs: 30,
            max_tokens: Some(4096),
        }
    }
}

impl ServiceDefaults {
    /// Read overrides from `VLM_MAX_RETRIES`, `VLM_TIMEOUT_SECS` and
    /// `VLM_MAX_TOKENS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// Unset variables keep the built-in default; set but unparsable values
    /// are a configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let timeout_secs = parse_var(&lookup, ENV_TIMEOUT_SECS)?.unwrap_or(defaults.timeout_secs);
        if timeout_secs == 0 {
            return Err(Error::config(format!(
                "{} must be greater than zero",
                ENV_TIMEOUT_SECS
            )));
        }

        Ok(Self {
            max_retries: parse_var(&lookup, ENV_MAX_RETRIES)?.unwrap_or(defaults.max_retries),
            timeout_secs,
            max_tokens: parse_var(&lookup, ENV_MAX_TOKENS)?.or(defaults.max_tokens),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::config(format!("{}={:?}: {}", key, raw, e))),
    }
}

/// Get the endpoint URL from environment variable or fallback
///
/// Priority:
/// 1. VLM_ENDPOINT_URL environment variable
/// 2. fallback parameter
/// 3. [`DEFAULT_ENDPOINT`]
///
/// # Examples
///
/// ```rust,no_run
/// use vlm_structured::get_endpoint;
///
/// let url = get_endpoint(Some("https://vlm.internal/v1"));
/// ```
pub fn get_endpoint(fallback: Option<&str>) -> String {
    resolve_endpoint(|key| env::var(key).ok(), fallback)
}

fn resolve_endpoint<F>(lookup: F, fallback: Option<&str>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(ENV_ENDPOINT_URL)
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| fallback.unwrap_or(DEFAULT_ENDPOINT).to_string())
}

/// Get the model name from environment variable or fallback
///
/// Priority:
/// 1. VLM_MODEL environment variable (if prefer_env is true)
/// 2. fallback parameter
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Ok(model) = env::var(ENV_MODEL) {
            return Some(model);
        }
    }

    fallback.map(|s| s.to_string())
}

/// Read the optional bearer token from `VLM_API_KEY`. Empty values count as unset.
pub fn get_api_key() -> Option<String> {
    env::var(ENV_API_KEY).ok().filter(|k| !k.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_resolve_endpoint_priority() {
        let env = lookup(&[(ENV_ENDPOINT_URL, "https://vlm.internal/v1")]);
        assert_eq!(
            resolve_endpoint(&env, Some("http://fallback/v1")),
            "https://vlm.internal/v1"
        );

        let empty = lookup(&[]);
        assert_eq!(
            resolve_endpoint(&empty, Some("http://fallback/v1")),
            "http://fallback/v1"
        );
        assert_eq!(resolve_endpoint(&empty, None), DEFAULT_ENDPOINT);

        let blank = lookup(&[(ENV_ENDPOINT_URL, "  ")]);
        assert_eq!(resolve_endpoint(&blank, None), DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_service_defaults() {
        let defaults = ServiceDefaults::default();
        assert_eq!(defaults.max_retries, 2);
        assert_eq!(defaults.timeout_secs, 30);
        assert_eq!(defaults.max_tokens, Some(4096));
    }

    #[test]
    fn test_defaults_from_lookup_unset() {
        let defaults = ServiceDefaults::from_lookup(lookup(&[])).unwrap();
        assert_eq!(defaults, ServiceDefaults::default());
    }

    #[test]
    fn test_defaults_from_lookup_overrides() {
        let defaults = ServiceDefaults::from_lookup(lookup(&[
            (ENV_MAX_RETRIES, "5"),
            (ENV_TIMEOUT_SECS, " 120 "),
            (ENV_MAX_TOKENS, "1024"),
        ]))
        .unwrap();

        assert_eq!(defaults.max_retries, 5);
        assert_eq!(defaults.timeout_secs, 120);
        assert_eq!(defaults.max_tokens, Some(1024));
    }

    #[test]
    fn test_defaults_from_lookup_invalid() {
        let err = ServiceDefaults::from_lookup(lookup(&[(ENV_MAX_RETRIES, "many")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(ENV_MAX_RETRIES));

        assert!(ServiceDefaults::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "0")])).is_err());
        assert!(ServiceDefaults::from_lookup(lookup(&[(ENV_MAX_RETRIES, "-1")])).is_err());
    }

    #[test]
    fn test_get_model_fallback_when_env_ignored() {
        let model = get_model(Some("qwen2.5-vl"), false);
        assert_eq!(model.as_deref(), Some("qwen2.5-vl"));
    }
}
