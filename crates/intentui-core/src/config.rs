//! Runtime configuration read from `INTENTUI_*` environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::escalation::DEFAULT_REPAIR_MODEL;
use crate::{Error, Result};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub repair_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_ms: u64,
    pub retrieval_k: usize,
    pub history_size: usize,
    pub user_state_path: Option<PathBuf>,
    pub docs_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_base: DEFAULT_API_BASE.into(),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            repair_model: DEFAULT_REPAIR_MODEL.into(),
            temperature: 0.7,
            max_tokens: 1000,
            request_timeout_ms: 30_000,
            retrieval_k: 5,
            history_size: 10,
            user_state_path: None,
            docs_dir: None,
        }
    }
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Config> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    ///
    /// # Errors
    /// `ConfigError` when a numeric variable does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        Ok(Config {
            api_base: get("INTENTUI_API_BASE").unwrap_or(defaults.api_base),
            api_key: get("INTENTUI_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            model: get("INTENTUI_MODEL").unwrap_or(defaults.model),
            repair_model: get("INTENTUI_REPAIR_MODEL").unwrap_or(defaults.repair_model),
            temperature: parse_var("INTENTUI_TEMPERATURE", get("INTENTUI_TEMPERATURE"), defaults.temperature)?,
            max_tokens: parse_var("INTENTUI_MAX_TOKENS", get("INTENTUI_MAX_TOKENS"), defaults.max_tokens)?,
            request_timeout_ms: parse_var(
                "INTENTUI_REQUEST_TIMEOUT_MS",
                get("INTENTUI_REQUEST_TIMEOUT_MS"),
                defaults.request_timeout_ms,
            )?,
            retrieval_k: parse_var("INTENTUI_RETRIEVAL_K", get("INTENTUI_RETRIEVAL_K"), defaults.retrieval_k)?,
            history_size: parse_var("INTENTUI_HISTORY_SIZE", get("INTENTUI_HISTORY_SIZE"), defaults.history_size)?,
            user_state_path: get("INTENTUI_USER_STATE_PATH").map(PathBuf::from),
            docs_dir: get("INTENTUI_DOCS_DIR").map(PathBuf::from),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// API key, or a `ConfigError` naming the variables to set
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| Error::ConfigError("set INTENTUI_API_KEY or OPENAI_API_KEY".into()))
    }
}

fn parse_var<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::ConfigError(format!("{}={:?}: {}", name, raw, e))),
    }
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
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.repair_model, "gpt-4.1-nano");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("INTENTUI_MODEL", "gpt-4o"),
            ("OPENAI_API_KEY", "sk-test"),
            ("INTENTUI_MAX_TOKENS", "2048"),
            ("INTENTUI_TEMPERATURE", "0.2"),
            ("INTENTUI_DOCS_DIR", "docs"),
        ]))
        .unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
        assert_eq!(config.max_tokens, 2048);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.docs_dir, Some(PathBuf::from("docs")));
    }

    #[test]
    fn test_intentui_key_wins() {
        let config = Config::from_lookup(lookup(&[
            ("INTENTUI_API_KEY", "primary"),
            ("OPENAI_API_KEY", "secondary"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let err = Config::from_lookup(lookup(&[("INTENTUI_RETRIEVAL_K", "five")])).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
        assert!(err.to_string().contains("INTENTUI_RETRIEVAL_K"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = Config {
            api_key: Some("sk-secret".into()),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
