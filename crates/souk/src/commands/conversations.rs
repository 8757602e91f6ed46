//! Conversations command - list conversations.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use souk_chat::resolver::counterpart_of;

use super::{Context, truncate};

/// Arguments for the conversations command.
#[derive(Args, Debug)]
pub struct ConversationsArgs {
    /// Maximum conversations to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Only show conversations with unread messages
    #[arg(long)]
    pub unread: bool,
}

/// Run the conversations command.
pub async fn run(args: ConversationsArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let mut conversations = client.conversations().list().await?.conversations;
    if args.unread {
        conversations.retain(|c| c.unread_count > 0);
    }

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&conversations)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Conversations").bold());
    println!("{}", dim.apply_to("─".repeat(50)));

    if conversations.is_empty() {
        println!("{}", dim.apply_to("No conversations"));
        return Ok(());
    }

    let me = ctx.user_id.as_deref().unwrap_or_default();
    for conversation in conversations.iter().take(args.limit) {
        let name = counterpart_of(conversation, me)
            .map(|u| u.name.as_str())
            .unwrap_or("(unknown)");
        let unread = if conversation.unread_count > 0 {
            Style::new()
                .yellow()
                .bold()
                .apply_to(format!(" ({})", conversation.unread_count))
                .to_string()
        } else {
            String::new()
        };

        println!("{}{}  {}", style(name).bold(), unread, dim.apply_to(&conversation.id));
        if let Some(last) = &conversation.last_message {
            println!("  {}", dim.apply_to(truncate(&last.content, 60)));
        }
    }

    if conversations.len() > args.limit {
        println!();
        println!(
            "{}",
            dim.apply_to(format!("... and {} more", conversations.len() - args.limit))
        );
    }

    Ok(())
}
