//! Chat command - live chat session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use souk_cache::CacheEvent;
use souk_chat::resolver::counterpart_of;
use souk_chat::{
    ChatGateway, ChatQuery, ChatSession, ChatSessionConfig, FileStore, KeyValueStore, PushChannel,
    Resolution, TargetUser,
};
use souk_client::ProductContext;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::{Context, print_message, truncate};

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// User to chat with (opens your conversation with them, or starts one)
    #[arg(long = "with", value_name = "USER_ID")]
    pub with_user: Option<String>,

    /// Display name for that user
    #[arg(long, requires = "with_user")]
    pub name: Option<String>,
}

/// Outcome of handling one input line.
enum Flow {
    Continue,
    Quit,
}

/// Run the chat command.
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let me = ctx.require_user()?.to_string();
    let client = ctx.client()?;
    let push = match &ctx.push_url {
        Some(url) => PushChannel::connect_to(url, ctx.token.clone())?,
        None => PushChannel::connect(&ctx.server_url, ctx.token.clone())?,
    };
    if ctx.verbose {
        println!("{}", Style::new().dim().apply_to(format!("Push: {}", push.url())));
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(ctx.state_dir.clone()));
    let mut config = ChatSessionConfig::new(&me).with_cache(ctx.cache.clone());
    if let Some(user_id) = args.with_user {
        let mut target = TargetUser::new(user_id);
        if let Some(name) = args.name {
            target = target.with_name(name);
        }
        config = config.with_target(target);
    }

    let mut session = ChatSession::mount(client, &push, store, config);
    let mut resolution = session.watch_resolution();
    let mut changes = session.changes();

    wait_for_list(&session, ctx.timeout).await;
    let mut shown = HashSet::new();
    describe(&session, &resolution.borrow_and_update().clone());
    show_thread(&session, &mut shown, &me);

    println!(
        "{}",
        Style::new()
            .dim()
            .apply_to("Enter sends. Commands: /list, /open <id>, /with <user>, /product <id> [title], /refresh, /quit")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if let Flow::Quit = handle_line(&mut session, line.trim()).await {
                    break;
                }
            }
            event = changes.recv() => match event {
                Ok(CacheEvent::Updated { key: ChatQuery::Messages(id) })
                    if session.resolution().active_conversation() == Some(id.as_str()) =>
                {
                    show_thread(&session, &mut shown, &me);
                }
                Ok(CacheEvent::Failed { key, error }) => {
                    let red = Style::new().red();
                    eprintln!("{} could not load {}: {}", red.apply_to("Error:"), key, error);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => show_thread(&session, &mut shown, &me),
                Err(RecvError::Closed) => break,
            },
            changed = resolution.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = resolution.borrow_and_update().clone();
                shown.clear();
                describe(&session, &current);
                show_thread(&session, &mut shown, &me);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.dispose();
    push.close();
    Ok(())
}

/// Wait until the conversation list has loaded or failed.
async fn wait_for_list<G: ChatGateway>(session: &ChatSession<G>, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if session
            .conversations_entry()
            .is_some_and(|e| e.has_value() || e.error.is_some())
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn handle_line<G: ChatGateway>(session: &mut ChatSession<G>, line: &str) -> Flow {
    let red = Style::new().red();
    let dim = Style::new().dim();

    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "/quit" | "/exit" => return Flow::Quit,
        "/list" => list(session),
        "/refresh" => session.refresh(),
        "/open" if !rest.is_empty() => {
            if let Err(e) = session.select(rest) {
                eprintln!("{} {}", red.apply_to("Error:"), e);
            }
        }
        "/with" if !rest.is_empty() => {
            session.open_with(TargetUser::new(rest));
        }
        "/product" if !rest.is_empty() => {
            let (id, title) = match rest.split_once(' ') {
                Some((id, title)) => (id, Some(title.trim())),
                None => (rest, None),
            };
            let mut product = ProductContext::new(id);
            if let Some(title) = title {
                product = product.with_title(title);
            }
            session.composer_mut().attach_product(product);
            println!("{}", dim.apply_to(format!("Product {} attached to your next message", id)));
        }
        c if c.starts_with('/') => {
            eprintln!("{} unknown command {}", red.apply_to("Error:"), c);
        }
        _ => {
            if let Err(e) = session.send(line).await {
                eprintln!("{} {} (message kept)", red.apply_to("Error:"), e);
            }
        }
    }
    Flow::Continue
}

fn list<G: ChatGateway>(session: &ChatSession<G>) {
    let dim = Style::new().dim();
    let Some(conversations) = session.conversations() else {
        println!("{}", dim.apply_to("Conversations still loading"));
        return;
    };

    let active = session.resolution();
    for conversation in conversations.iter() {
        let marker = if active.active_conversation() == Some(conversation.id.as_str()) {
            "*"
        } else {
            " "
        };
        let name = counterpart_of(conversation, session.owner())
            .map(|u| u.name.as_str())
            .unwrap_or("(unknown)");
        let unread = if conversation.unread_count > 0 {
            format!(" ({})", conversation.unread_count)
        } else {
            String::new()
        };
        let preview = conversation
            .last_message
            .as_ref()
            .map(|m| truncate(&m.content, 40))
            .unwrap_or_default();
        println!(
            "{} {}{}  {}  {}",
            marker,
            style(name).bold(),
            Style::new().yellow().apply_to(unread),
            dim.apply_to(&conversation.id),
            dim.apply_to(preview)
        );
    }
}

fn describe<G: ChatGateway>(session: &ChatSession<G>, resolution: &Resolution) {
    let dim = Style::new().dim();
    match resolution {
        Resolution::Active(id) => {
            let name = session
                .conversations()
                .and_then(|list| {
                    list.iter()
                        .find(|c| &c.id == id)
                        .and_then(|c| counterpart_of(c, session.owner()))
                        .map(|u| u.name.clone())
                })
                .unwrap_or_else(|| id.clone());
            println!("{} {}", style("Chatting with").bold(), style(name).cyan().bold());
        }
        Resolution::PendingNewTarget(target) => {
            let name = target.display_name.as_deref().unwrap_or(&target.user_id);
            println!(
                "{} {}",
                style("New conversation with").bold(),
                style(name).cyan().bold()
            );
            println!("{}", dim.apply_to("Your first message starts it."));
        }
        Resolution::Unresolved => {
            println!(
                "{}",
                dim.apply_to("No conversation open. Use /list and /open <id>, or /with <user>.")
            );
        }
    }
}

fn show_thread<G: ChatGateway>(session: &ChatSession<G>, shown: &mut HashSet<String>, me: &str) {
    let Some(thread) = session.thread() else {
        return;
    };
    for message in thread.iter() {
        if shown.insert(message.id.clone()) {
            print_message(message, Some(me));
        }
    }
}
