//! chatsync: terminal client for one realtime conversation.

use clap::Parser;

mod cli;
mod cmd_chat;
mod cmd_history;
mod render;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // stdout carries the conversation; logs go to stderr.
    let filter = std::env::var("CHATSYNC_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = args.resolve_config()?;
    tracing::debug!(?config, "resolved config");

    match args.command {
        cli::Command::Chat(opts) => {
            let config = opts.apply(config)?;
            cmd_chat::cmd_chat(config, &opts.conversation).await?;
        }
        cli::Command::History(opts) => {
            cmd_history::cmd_history(&config, &opts.conversation, opts.json).await?;
        }
    }

    Ok(())
}
