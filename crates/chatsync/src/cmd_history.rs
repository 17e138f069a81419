//! `chatsync history` — print a conversation once.

use anyhow::Context;
use chatsync_client::{ChatBackend, ChatConfig, HttpBackend};
use chatsync_core::types::ConversationId;

use crate::render::format_message;

pub async fn cmd_history(config: &ChatConfig, conversation: &str, json: bool) -> anyhow::Result<()> {
    let backend = HttpBackend::new(config.api_context()?, config.request_timeout())?;
    let messages = backend
        .fetch_history(&ConversationId::from(conversation))
        .await
        .with_context(|| format!("fetching history of {conversation}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }
    if messages.is_empty() {
        println!("(no messages)");
    }
    for msg in &messages {
        println!("{}", format_message(msg, config.me.as_ref()));
    }
    Ok(())
}
