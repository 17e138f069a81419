//! CLI definition using clap derive.
//!
//! Precedence: flags and `CHATSYNC_*` environment variables, then the
//! config file, then built-in defaults.

use std::path::PathBuf;

use chatsync_client::ChatConfig;
use chatsync_client::ChatError;
use chatsync_core::types::UserId;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatsync", about = "Realtime chat over a live connection")]
pub struct Cli {
    /// TOML config file
    #[arg(long, short = 'c', global = true, env = "CHATSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// REST API base URL
    #[arg(long, global = true, env = "CHATSYNC_API")]
    pub api: Option<String>,

    /// Live connection endpoint (ws:// or wss://)
    #[arg(long, global = true, env = "CHATSYNC_WS")]
    pub ws: Option<String>,

    /// Bearer token for REST calls
    #[arg(long, global = true, env = "CHATSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Your user id
    #[arg(long, global = true, env = "CHATSYNC_USER")]
    pub me: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Open a conversation: print messages as they arrive, send stdin lines
    Chat(ChatOpts),
    /// Print a conversation's history once
    History(HistoryOpts),
}

#[derive(clap::Args)]
pub struct ChatOpts {
    /// Conversation (match) id
    pub conversation: String,

    /// Typing recipient; derived from history when omitted
    #[arg(long)]
    pub partner: Option<String>,

    /// Skip the initial history fetch
    #[arg(long)]
    pub no_history: bool,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long)]
    pub reconnect_delay_ms: Option<u64>,

    /// Quiet period before the typing indicator clears, in milliseconds
    #[arg(long)]
    pub typing_quiet_ms: Option<u64>,
}

#[derive(clap::Args)]
pub struct HistoryOpts {
    /// Conversation (match) id
    pub conversation: String,

    /// Print raw JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Config file (or defaults) overlaid with global flags.
    pub fn resolve_config(&self) -> Result<ChatConfig, ChatError> {
        let base = match &self.config {
            Some(path) => ChatConfig::load(path)?,
            None => ChatConfig::default(),
        };
        let config = self.overlay(base);
        config.validate()?;
        Ok(config)
    }

    fn overlay(&self, mut config: ChatConfig) -> ChatConfig {
        if let Some(api) = &self.api {
            config.api_base = api.clone();
        }
        if let Some(ws) = &self.ws {
            config.ws_base = ws.clone();
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(me) = &self.me {
            config.me = Some(UserId::from(me.as_str()));
        }
        config
    }
}

impl ChatOpts {
    pub fn apply(&self, mut config: ChatConfig) -> Result<ChatConfig, ChatError> {
        if let Some(partner) = &self.partner {
            config.partner = Some(UserId::from(partner.as_str()));
        }
        if self.no_history {
            config.history_on_start = false;
        }
        if let Some(ms) = self.reconnect_delay_ms {
            config.reconnect_delay_ms = ms;
        }
        if let Some(ms) = self.typing_quiet_ms {
            config.typing_quiet_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }
}
