use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::util::{is_local_endpoint_url, non_empty_env, parse_bool_flag};

const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_SESSION_ID: &str = "default-session";
const STREAM_PATH: &str = "/diy-agent/stream/";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub session_id: String,
    pub auto_execute: bool,
    pub history_file: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        let base_url =
            non_empty_env("CHATSTREAM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let auth_token = non_empty_env("CHATSTREAM_AUTH_TOKEN");
        let session_id = std::env::var("CHATSTREAM_SESSION_ID")
            .unwrap_or_else(|_| DEFAULT_SESSION_ID.to_string());
        let auto_execute = std::env::var("CHATSTREAM_AUTO_EXECUTE")
            .ok()
            .and_then(parse_bool_flag)
            .unwrap_or(false);
        let history_file = non_empty_env("CHATSTREAM_HISTORY_FILE").map(PathBuf::from);
        let connect_timeout = non_empty_env("CHATSTREAM_CONNECT_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs.clamp(1, 300))
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        Ok(Self {
            base_url,
            auth_token,
            session_id,
            auto_execute,
            history_file,
            connect_timeout: Duration::from_secs(connect_timeout),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            bail!(
                "Invalid CHATSTREAM_BASE_URL '{}': expected http:// or https:// URL",
                self.base_url
            );
        }

        if !is_local_endpoint_url(&self.base_url) && self.auth_token.is_none() {
            bail!(
                "CHATSTREAM_AUTH_TOKEN must be set for non-local endpoints (url: '{}')",
                self.base_url
            );
        }

        if self.session_id.trim().is_empty() {
            bail!("CHATSTREAM_SESSION_ID must not be empty");
        }

        Ok(())
    }

    /// Endpoint that accepts both new messages and tool confirmations.
    pub fn stream_url(&self) -> String {
        format!("{}{STREAM_PATH}", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 6] = [
        "CHATSTREAM_BASE_URL",
        "CHATSTREAM_AUTH_TOKEN",
        "CHATSTREAM_SESSION_ID",
        "CHATSTREAM_AUTO_EXECUTE",
        "CHATSTREAM_HISTORY_FILE",
        "CHATSTREAM_CONNECT_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_load_defaults() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();

        let config = Config::load().expect("config");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.session_id, DEFAULT_SESSION_ID);
        assert!(config.auth_token.is_none());
        assert!(!config.auto_execute);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_reads_environment() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        clear_env();
        std::env::set_var("CHATSTREAM_BASE_URL", "https://agent.example.com/api/");
        std::env::set_var("CHATSTREAM_AUTH_TOKEN", "  ");
        std::env::set_var("CHATSTREAM_SESSION_ID", "abc");
        std::env::set_var("CHATSTREAM_AUTO_EXECUTE", "on");
        std::env::set_var("CHATSTREAM_CONNECT_TIMEOUT_SECS", "9000");

        let config = Config::load().expect("config");
        clear_env();

        assert_eq!(config.stream_url(), "https://agent.example.com/api/diy-agent/stream/");
        assert!(config.auth_token.is_none(), "blank token is treated as unset");
        assert_eq!(config.session_id, "abc");
        assert!(config.auto_execute);
        assert_eq!(config.connect_timeout, Duration::from_secs(300));
        assert!(config.validate().is_err(), "remote endpoint requires a token");
    }
}
