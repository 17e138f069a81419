//! Client configuration: defaults, TOML file loading and validation.
//!
//! Credentials live here and are handed explicitly to the backend; there is
//! no global token store.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chatsync_core::presence::DEFAULT_TYPING_QUIET_MS;
use chatsync_core::reconnect::{DEFAULT_RECONNECT_DELAY_MS, ReconnectPolicy};
use chatsync_core::types::UserId;
use chatsync_core::CoreError;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::http_backend::ApiContext;

pub const DEFAULT_API_BASE: &str = "http://localhost:8080";
pub const DEFAULT_WS_BASE: &str = "ws://localhost:8080/ws";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// Base URL of the REST API (tickets, history, send).
    pub api_base: String,
    /// Address of the live connection endpoint, without query.
    pub ws_base: String,
    /// Bearer token attached to every REST call.
    pub token: Option<String>,
    /// The local user. Used to work out who the partner is.
    pub me: Option<UserId>,
    /// Typing recipient. Derived from history when unset.
    pub partner: Option<UserId>,
    pub reconnect_delay_ms: u64,
    pub typing_quiet_ms: u64,
    pub request_timeout_ms: u64,
    /// Fetch history once when the conversation view opens.
    pub history_on_start: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_owned(),
            ws_base: DEFAULT_WS_BASE.to_owned(),
            token: None,
            me: None,
            partner: None,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            typing_quiet_ms: DEFAULT_TYPING_QUIET_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            history_on_start: true,
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_base", &self.api_base)
            .field("ws_base", &self.ws_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("me", &self.me)
            .field("partner", &self.partner)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("typing_quiet_ms", &self.typing_quiet_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("history_on_start", &self.history_on_start)
            .finish()
    }
}

impl ChatConfig {
    /// Load a config file. Missing keys take their defaults; unknown keys
    /// are rejected.
    pub fn load(path: &Path) -> Result<Self, ChatError> {
        let content = std::fs::read_to_string(path).map_err(|e| ChatError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ChatError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.api_url()?;
        self.ws_url()?;
        self.reconnect_policy().validate()?;
        if self.typing_quiet_ms == 0 {
            return Err(CoreError::ZeroDuration {
                field: "typing_quiet_ms",
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(CoreError::ZeroDuration {
                field: "request_timeout_ms",
            });
        }
        Ok(())
    }

    pub fn api_url(&self) -> Result<Url, CoreError> {
        parse_url(&self.api_base, &["http", "https"])
    }

    pub fn ws_url(&self) -> Result<Url, CoreError> {
        parse_url(&self.ws_base, &["ws", "wss"])
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::constant(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn api_context(&self) -> Result<ApiContext, CoreError> {
        Ok(ApiContext {
            base_url: self.api_url()?,
            bearer_token: self.token.clone(),
        })
    }
}

fn parse_url(raw: &str, schemes: &[&str]) -> Result<Url, CoreError> {
    let url = Url::parse(raw).map_err(|e| CoreError::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(CoreError::InvalidUrl {
            url: raw.to_owned(),
            reason: format!("scheme must be one of {}", schemes.join(", ")),
        });
    }
    if url.cannot_be_a_base() {
        return Err(CoreError::InvalidUrl {
            url: raw.to_owned(),
            reason: "not a base url".to_owned(),
        });
    }
    Ok(url)
}
