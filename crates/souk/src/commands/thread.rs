//! Thread command - show a conversation's messages.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::{Context, print_message};

/// Arguments for the thread command.
#[derive(Args, Debug)]
pub struct ThreadArgs {
    /// Conversation ID
    pub conversation_id: String,

    /// Show only the last N messages
    #[arg(short, long)]
    pub last: Option<usize>,
}

/// Run the thread command.
pub async fn run(args: ThreadArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let mut messages = client
        .conversations()
        .messages(&args.conversation_id)
        .await?
        .messages;
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    if let Some(last) = args.last {
        let skip = messages.len().saturating_sub(last);
        messages.drain(..skip);
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style(format!("Thread {}", args.conversation_id)).bold());
    println!("{}", dim.apply_to("─".repeat(50)));

    if messages.is_empty() {
        println!("{}", dim.apply_to("No messages"));
    }
    for message in &messages {
        print_message(message, ctx.user_id.as_deref());
    }

    Ok(())
}
