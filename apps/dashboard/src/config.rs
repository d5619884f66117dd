use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::llm_client::{DEFAULT_GEMINI_BASE_URL, DEFAULT_MODEL};
use crate::sheets::DEFAULT_SHEETS_BASE_URL;

/// Default byte budget for the state store, matching a browser's local storage.
pub const DEFAULT_STORAGE_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Switches for the optional parts of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub chat: bool,
    pub documents: bool,
    pub session_persistence: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            chat: true,
            documents: true,
            session_persistence: true,
        }
    }
}

/// Application configuration loaded from environment variables.
/// Everything has a default; only malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub sheets_base_url: String,
    pub sheet_id: Option<String>,
    pub sheet_name: String,
    /// `:memory:` keeps state in process only.
    pub state_path: String,
    pub storage_quota_bytes: usize,
    pub static_dir: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub features: Features,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            rust_log: "info".to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            sheets_base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            sheet_id: None,
            sheet_name: "cleaned".to_string(),
            state_path: "dashboard_state.json".to_string(),
            storage_quota_bytes: DEFAULT_STORAGE_QUOTA_BYTES,
            static_dir: None,
            connect_timeout_secs: 10,
            features: Features::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Config {
            port: parse_or(var("PORT"), defaults.port, "PORT must be a valid port number")?,
            rust_log: var("RUST_LOG").unwrap_or(defaults.rust_log),
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: var("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            sheets_base_url: var("SHEETS_BASE_URL").unwrap_or(defaults.sheets_base_url),
            sheet_id: var("SHEET_ID"),
            sheet_name: var("SHEET_NAME").unwrap_or(defaults.sheet_name),
            state_path: var("STATE_PATH").unwrap_or(defaults.state_path),
            storage_quota_bytes: parse_or(
                var("STORAGE_QUOTA_BYTES"),
                defaults.storage_quota_bytes,
                "STORAGE_QUOTA_BYTES must be a byte count",
            )?,
            static_dir: var("STATIC_DIR").map(PathBuf::from),
            connect_timeout_secs: parse_or(
                var("HTTP_CONNECT_TIMEOUT_SECS"),
                defaults.connect_timeout_secs,
                "HTTP_CONNECT_TIMEOUT_SECS must be a whole number of seconds",
            )?,
            features: Features {
                chat: flag(var("ENABLE_CHAT"), "ENABLE_CHAT")?,
                documents: flag(var("ENABLE_DOCUMENT_UPLOAD"), "ENABLE_DOCUMENT_UPLOAD")?,
                session_persistence: flag(
                    var("ENABLE_SESSION_PERSISTENCE"),
                    "ENABLE_SESSION_PERSISTENCE",
                )?,
            },
        })
    }
}

fn parse_or<T>(raw: Option<String>, default: T, message: &'static str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw.parse::<T>().context(message),
        None => Ok(default),
    }
}

fn flag(raw: Option<String>, key: &str) -> Result<bool> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(true),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => anyhow::bail!("{key} must be true or false, got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 3000);
        assert_eq!(c.sheet_name, "cleaned");
        assert_eq!(c.storage_quota_bytes, 5 * 1024 * 1024);
        assert_eq!(c.features, Features::default());
        assert!(c.gemini_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("PORT", "8081"),
            ("GEMINI_API_KEY", " abc "),
            ("ENABLE_CHAT", "false"),
            ("ENABLE_DOCUMENT_UPLOAD", "0"),
            ("STATE_PATH", ":memory:"),
        ])
        .unwrap();
        assert_eq!(c.port, 8081);
        assert_eq!(c.gemini_api_key.as_deref(), Some("abc"));
        assert!(!c.features.chat);
        assert!(!c.features.documents);
        assert!(c.features.session_persistence);
        assert_eq!(c.state_path, ":memory:");
    }

    #[test]
    fn test_malformed_values_fail() {
        assert!(config(&[("PORT", "eighty")]).is_err());
        assert!(config(&[("ENABLE_CHAT", "maybe")]).is_err());
        assert!(config(&[("STORAGE_QUOTA_BYTES", "-1")]).is_err());
    }
}
