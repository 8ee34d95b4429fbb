use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::notifications::DEFAULT_PAGE_SIZE;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";
pub const DEFAULT_SESSION_DB: &str = "sqlite://./data/session.db";
pub const DEFAULT_CONFIG_FILE: &str = "client.toml";

/// Raw WebSocket transport of the server's `/ws` STOMP endpoint.
const WS_ENDPOINT_PATH: &str = "/ws/websocket";
const API_PATH_SUFFIX: &str = "/api/v1";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub api_url: String,
    pub ws_url: Option<String>,
    pub session_db_url: String,
    /// Pause between re-dials; zero turns re-dialling off.
    pub reconnect_delay: Duration,
    pub heartbeat_incoming: Duration,
    pub heartbeat_outgoing: Duration,
    pub notification_page_size: u32,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            ws_url: None,
            session_db_url: DEFAULT_SESSION_DB.into(),
            reconnect_delay: Duration::from_millis(5000),
            heartbeat_incoming: Duration::from_millis(4000),
            heartbeat_outgoing: Duration::from_millis(4000),
            notification_page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    api_url: Option<String>,
    ws_url: Option<String>,
    session_db: Option<String>,
    reconnect_delay_ms: Option<u64>,
    heartbeat_incoming_ms: Option<u64>,
    heartbeat_outgoing_ms: Option<u64>,
    notification_page_size: Option<u32>,
    request_timeout_secs: Option<u64>,
}

/// Defaults, then `client.toml` (or `path`), then environment variables.
pub fn load_settings(path: Option<&Path>) -> Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    let explicit = path.is_some();
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            apply_file_settings(&mut settings, file_cfg);
        }
        Err(err) if explicit => {
            return Err(err).with_context(|| format!("failed to read config file {}", path.display()));
        }
        Err(_) => {}
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.api_url = settings.api_url.trim_end_matches('/').to_string();
    settings.session_db_url = normalize_database_url(&settings.session_db_url);
    Ok(settings)
}

fn apply_file_settings(settings: &mut ClientSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.api_url {
        settings.api_url = v;
    }
    if let Some(v) = file_cfg.ws_url {
        settings.ws_url = Some(v);
    }
    if let Some(v) = file_cfg.session_db {
        settings.session_db_url = v;
    }
    if let Some(v) = file_cfg.reconnect_delay_ms {
        settings.reconnect_delay = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.heartbeat_incoming_ms {
        settings.heartbeat_incoming = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.heartbeat_outgoing_ms {
        settings.heartbeat_outgoing = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.notification_page_size {
        settings.notification_page_size = v.max(1);
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout = Duration::from_secs(v);
    }
}

fn apply_env_overrides(settings: &mut ClientSettings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("CLINIC_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = env("CLINIC_WS_URL") {
        settings.ws_url = Some(v);
    }
    if let Some(v) = env("APP__WS_URL") {
        settings.ws_url = Some(v);
    }

    if let Some(v) = env("CLINIC_SESSION_DB") {
        settings.session_db_url = v;
    }
    if let Some(v) = env("APP__SESSION_DB") {
        settings.session_db_url = v;
    }

    if let Some(v) = parse_env(&env, "APP__RECONNECT_DELAY_MS") {
        settings.reconnect_delay = Duration::from_millis(v);
    }
    if let Some(v) = parse_env(&env, "APP__HEARTBEAT_INCOMING_MS") {
        settings.heartbeat_incoming = Duration::from_millis(v);
    }
    if let Some(v) = parse_env(&env, "APP__HEARTBEAT_OUTGOING_MS") {
        settings.heartbeat_outgoing = Duration::from_millis(v);
    }
    if let Some(v) = parse_env::<u32>(&env, "APP__NOTIFICATION_PAGE_SIZE") {
        settings.notification_page_size = v.max(1);
    }
    if let Some(v) = parse_env(&env, "APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout = Duration::from_secs(v);
    }
}

fn parse_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %raw, "config: ignoring unparsable override");
            None
        }
    }
}

impl ClientSettings {
    /// WebSocket endpoint for the messaging transport. An explicit `ws_url`
    /// wins; otherwise it is derived from the API base.
    pub fn websocket_url(&self) -> Result<String> {
        if let Some(ws_url) = &self.ws_url {
            return Ok(ws_url.clone());
        }

        let origin = self.api_url.trim_end_matches('/');
        let origin = origin.strip_suffix(API_PATH_SUFFIX).unwrap_or(origin);
        let ws_origin = if let Some(rest) = origin.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = origin.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(anyhow!("api_url must start with http:// or https://"));
        };

        let ws_url = format!("{ws_origin}{WS_ENDPOINT_PATH}");
        Url::parse(&ws_url).with_context(|| format!("invalid websocket url: {ws_url}"))?;
        Ok(ws_url)
    }
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return DEFAULT_SESSION_DB.to_string();
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
