//! `chatsync chat` — interactive conversation view.

use std::sync::Arc;

use chatsync_client::{ChatConfig, ConversationSession, HttpBackend};
use chatsync_core::types::ConversationId;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::render::SnapshotPrinter;

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Send(&'a str),
    /// `/live <text>`: push over the socket without persisting.
    Live(&'a str),
    Typing,
    Quit,
    Empty,
}

pub fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "/quit" | "/q" => Input::Quit,
        "/typing" => Input::Typing,
        _ => match line.strip_prefix("/live ") {
            Some(text) if !text.trim().is_empty() => Input::Live(text.trim()),
            _ => Input::Send(line),
        },
    }
}

/// Entry point for `chatsync chat`.
pub async fn cmd_chat(config: ChatConfig, conversation: &str) -> anyhow::Result<()> {
    let backend = Arc::new(HttpBackend::new(
        config.api_context()?,
        config.request_timeout(),
    )?);
    let handle = ConversationSession::spawn(ConversationId::from(conversation), backend, &config)?;
    let mut snapshots = handle.subscribe();
    let mut printer = SnapshotPrinter::new(config.me.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("chatsync {conversation}: type to send, /typing, /quit");

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = snapshots.borrow_and_update().clone();
                for line in printer.diff(&snap) {
                    println!("{line}");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_input(&line) {
                    Input::Empty => {}
                    Input::Quit => break,
                    Input::Typing => handle.notify_typing_partner(),
                    Input::Live(text) => handle.send_live(text),
                    Input::Send(text) => {
                        if let Err(e) = handle.send_message(text).await {
                            eprintln!("!! {e}");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_commands() {
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("  /q "), Input::Quit);
        assert_eq!(parse_input("/typing"), Input::Typing);
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn parse_text_is_trimmed() {
        assert_eq!(parse_input("  hello there \n"), Input::Send("hello there"));
    }

    #[test]
    fn parse_live() {
        assert_eq!(parse_input("/live  ping "), Input::Live("ping"));
        // Bare prefix falls through to a normal send.
        assert_eq!(parse_input("/live"), Input::Send("/live"));
    }
}
