//! Process-wide settings.
//!
//! Everything is read from environment variables. `main` loads a `.env`
//! file (desktop development) and then the bundled `assets/config.env`,
//! which only fills variables that are not already set.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const MODEL_VAR: &str = "FLOAT_MODEL";
pub const ENDPOINT_VAR: &str = "FLOAT_LLM_ENDPOINT";
pub const CHUNK_DELAY_VAR: &str = "FLOAT_CHUNK_DELAY_MS";
pub const BIND_ADDR_VAR: &str = "FLOAT_BIND_ADDR";

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(20);
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Non-secret settings. The credential is deliberately not part of this
/// struct: it is read at call time by the completion client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub model: String,
    pub endpoint: Option<String>,
    pub chunk_delay: Duration,
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: None,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let model = non_empty_var(MODEL_VAR).unwrap_or(defaults.model);
        let endpoint = non_empty_var(ENDPOINT_VAR);
        let chunk_delay = non_empty_var(CHUNK_DELAY_VAR)
            .and_then(|raw| match raw.parse::<u64>() {
                Ok(ms) => Some(Duration::from_millis(ms)),
                Err(_) => {
                    tracing::warn!(value = %raw, "ignoring invalid {CHUNK_DELAY_VAR}");
                    None
                }
            })
            .unwrap_or(defaults.chunk_delay);
        let bind_addr = non_empty_var(BIND_ADDR_VAR).unwrap_or(defaults.bind_addr);

        Self {
            model,
            endpoint,
            chunk_delay,
            bind_addr,
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {BIND_ADDR_VAR} '{}': {e}", self.bind_addr))
    }
}

/// Current credential from the environment, if any. Blank counts as unset.
pub fn credential_from_env() -> Option<String> {
    non_empty_var(API_KEY_VAR)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse `KEY=VALUE` lines, skipping blanks and `#` comments.
pub fn parse_env_lines(source: &str) -> Vec<(String, String)> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}
