//! Souk - marketplace chat from the command line
//!
//! Main entry point for the Souk CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{chat, config, conversations, send, thread};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Souk - marketplace chat from the command line
#[derive(Parser)]
#[command(name = "souk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Server URL (default: from context, else http://localhost:5000)
    #[arg(long, global = true, env = "SOUK_SERVER_URL")]
    pub server: Option<String>,

    /// Context to use instead of the current one
    #[arg(long, global = true)]
    pub context: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List conversations with unread counts
    Conversations(conversations::ConversationsArgs),

    /// Show the messages of a conversation
    Thread(thread::ThreadArgs),

    /// Send a message to a user or into a conversation
    Send(send::SendArgs),

    /// Open a live chat session
    Chat(chat::ChatArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "souk=debug,souk_chat=debug,souk_cache=debug,souk_client=debug,souk_config=debug,info"
    } else {
        "souk=info,souk_chat=warn,souk_cache=warn,souk_client=warn,warn"
    };

    let log_dir = souk_config::log_dir().unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "souk.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "souk=trace,souk_chat=trace,souk_cache=trace,souk_client=debug,souk_config=debug,info",
                )),
        )
        .init();

    // Config commands edit the file the context is resolved from
    let command = match cli.command {
        Commands::Config(args) => return config::run(args, cli.json).await,
        other => other,
    };

    let ctx = commands::Context::resolve(cli.server, cli.context.as_deref(), cli.json, cli.verbose)?;

    match command {
        Commands::Conversations(args) => conversations::run(args, &ctx).await,
        Commands::Thread(args) => thread::run(args, &ctx).await,
        Commands::Send(args) => send::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, ctx.json_output).await,
    }
}
