//! Configuration management for Topicscope
//!
//! Configuration is loaded from environment variables, falling back to a
//! `.env` file in the working directory.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::Capabilities;

/// Main configuration struct for Topicscope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the backend (scheme + host + port).
    pub api_url: String,
    /// Path prefix of the backend API (`/api`).
    pub api_prefix: String,
    pub default_cluster: Option<String>,
    pub default_topic: Option<String>,
    /// Timeout for non-streaming requests.
    pub request_timeout: Duration,
    /// Upper bound on a streaming search session; `None` keeps it open until stopped.
    pub search_max_duration: Option<Duration>,
    pub capabilities: Capabilities,
    /// Where the CLI persists navigable history.
    pub history_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080".to_string(),
            api_prefix: "/api".to_string(),
            default_cluster: None,
            default_topic: None,
            request_timeout: Duration::from_secs(30),
            search_max_duration: None,
            capabilities: Capabilities::default(),
            history_file: PathBuf::from(".topicscope-history.json"),
        }
    }
}

impl Config {
    /// Load configuration from the environment (and `.env`).
    ///
    /// Unparsable values fall back to defaults; only a malformed role
    /// document is reported, since silently dropping permissions hides bugs.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let mut capabilities = Capabilities {
            can_access_schema: env_bool("TOPICSCOPE_CAN_ACCESS_SCHEMA", false),
        };
        if let Some(roles) = env_value("TOPICSCOPE_ROLES_JSON").filter(|r| !r.trim().is_empty()) {
            let from_roles = Capabilities::from_roles_json(&roles)
                .map_err(|e| Error::Config(format!("TOPICSCOPE_ROLES_JSON: {e}")))?;
            capabilities.can_access_schema |= from_roles.can_access_schema;
        }

        let search_max_secs = env_u64("TOPICSCOPE_SEARCH_MAX_SECS", 0);

        Ok(Self {
            api_url: env_value("TOPICSCOPE_API_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.api_url),
            api_prefix: env_value("TOPICSCOPE_API_PREFIX")
                .map(|v| normalize_prefix(&v))
                .unwrap_or(defaults.api_prefix),
            default_cluster: env_nonempty("TOPICSCOPE_CLUSTER"),
            default_topic: env_nonempty("TOPICSCOPE_TOPIC"),
            request_timeout: Duration::from_secs(
                env_u64("TOPICSCOPE_REQUEST_TIMEOUT_SECS", 30).max(1),
            ),
            search_max_duration: (search_max_secs > 0)
                .then(|| Duration::from_secs(search_max_secs)),
            capabilities,
            history_file: env_nonempty("TOPICSCOPE_HISTORY_FILE")
                .map_or(defaults.history_file, PathBuf::from),
        })
    }

    /// `api_url` joined with `api_prefix`.
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), self.api_prefix)
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

// Helper functions for environment variable parsing

static DOTENV_VALUES: OnceLock<HashMap<String, String>> = OnceLock::new();

#[cfg(test)]
thread_local! {
    static TEST_ENV_OVERRIDES: std::cell::RefCell<HashMap<String, String>> =
        std::cell::RefCell::new(HashMap::new());
}

#[cfg(test)]
fn test_env_override_value(key: &str) -> Option<String> {
    TEST_ENV_OVERRIDES.with(|cell| cell.borrow().get(key).cloned())
}

fn dotenv_values() -> &'static HashMap<String, String> {
    DOTENV_VALUES.get_or_init(|| load_dotenv_file(Path::new(".env")))
}

/// Read a value from the .env file (if present).
#[must_use]
pub fn dotenv_value(key: &str) -> Option<String> {
    dotenv_values().get(key).cloned()
}

/// Read a value from the real environment first, falling back to .env.
#[must_use]
pub fn env_value(key: &str) -> Option<String> {
    #[cfg(test)]
    if let Some(v) = test_env_override_value(key) {
        return Some(v);
    }
    env::var(key).ok().or_else(|| dotenv_value(key))
}

fn load_dotenv_file(path: &Path) -> HashMap<String, String> {
    let Ok(contents) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    parse_dotenv_contents(&contents)
}

/// Parse dotenv syntax: `KEY=value`, `export KEY=value`, `#` comments,
/// single- and double-quoted values.
#[must_use]
pub fn parse_dotenv_contents(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), parse_dotenv_value(value.trim()));
    }
    map
}

fn parse_dotenv_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if let Some(rest) = trimmed.strip_prefix('"') {
        let mut escaped = false;
        let mut out = String::new();
        for c in rest.chars() {
            if escaped {
                out.push(match c {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                return out;
            } else {
                out.push(c);
            }
        }
    }

    if let Some(rest) = trimmed.strip_prefix('\'') {
        if let Some(end) = rest.find('\'') {
            return rest[..end].to_string();
        }
    }

    strip_inline_comment(trimmed).to_string()
}

fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return value[..i].trim_end();
        }
    }
    value
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => true,
        "0" | "false" | "f" | "no" | "n" => false,
        _ => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| parse_bool(&v, default))
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_value(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_nonempty(key: &str) -> Option<String> {
    env_value(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
