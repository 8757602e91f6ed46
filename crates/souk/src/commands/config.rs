//! Config command - client configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use souk_config::{ClientConfig, ConfigError, ContextUpdate, TokenSource};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the client configuration
    Show,

    /// Show configuration file path
    Path,

    // ── Context Commands ─────────────────────────────────────────────────
    /// Show the current context name
    CurrentContext,

    /// List available contexts
    GetContexts,

    /// Switch to a different context
    UseContext {
        /// Context name to switch to
        name: String,
    },

    /// Create or update a context
    SetContext {
        /// Context name
        name: String,

        /// Server URL (e.g., http://localhost:5000)
        #[arg(long)]
        server: Option<String>,

        /// User ID to chat as
        #[arg(long)]
        user: Option<String>,

        /// Read the bearer token from this file
        #[arg(long, conflicts_with = "token_env")]
        token_file: Option<String>,

        /// Read the bearer token from this environment variable
        #[arg(long)]
        token_env: Option<String>,

        /// Push channel URL, if not derived from the server
        #[arg(long)]
        push_url: Option<String>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Delete a context
    DeleteContext {
        /// Context name to delete
        name: String,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, json_output: bool) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(json_output),
        ConfigCommand::Path => cmd_path(),
        ConfigCommand::CurrentContext => cmd_current_context(),
        ConfigCommand::GetContexts => cmd_get_contexts(json_output),
        ConfigCommand::UseContext { name } => cmd_use_context(&name),
        ConfigCommand::SetContext {
            name,
            server,
            user,
            token_file,
            token_env,
            push_url,
            timeout,
        } => {
            let token = match (token_file, token_env) {
                (Some(path), _) => Some(TokenSource::from_file(path)),
                (None, Some(var)) => Some(TokenSource::from_env(var)),
                (None, None) => None,
            };
            let update = ContextUpdate {
                server,
                user_id: user,
                token,
                push_url,
                timeout,
            };
            cmd_set_context(&name, update)
        }
        ConfigCommand::DeleteContext { name } => cmd_delete_context(&name),
    }
}

fn cmd_show(json_output: bool) -> Result<()> {
    let config = ClientConfig::load()?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", config.to_yaml()?);
    }
    Ok(())
}

fn cmd_path() -> Result<()> {
    match ClientConfig::path() {
        Some(path) => println!("{}", path.display()),
        None => anyhow::bail!("Could not determine config directory"),
    }
    Ok(())
}

fn cmd_current_context() -> Result<()> {
    let config = ClientConfig::load()?;
    match &config.current_context {
        Some(name) => println!("{}", name),
        None => println!("No current context set."),
    }
    Ok(())
}

fn cmd_get_contexts(json_output: bool) -> Result<()> {
    let config = ClientConfig::load()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&config.contexts)?);
        return Ok(());
    }

    if config.contexts.is_empty() {
        println!("No contexts configured.");
        println!();
        println!("Create one with:");
        println!("  souk config set-context local --server=http://localhost:5000 --user=<id>");
        return Ok(());
    }

    let current = config.current_context.as_deref();
    let dim = Style::new().dim();

    println!("CURRENT   NAME            USER            SERVER");
    for ctx in &config.contexts {
        let marker = if current == Some(ctx.name.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{}         {:<15} {:<15} {}",
            marker,
            ctx.name,
            ctx.user_id.as_deref().unwrap_or("-"),
            dim.apply_to(&ctx.server)
        );
    }

    Ok(())
}

fn cmd_use_context(name: &str) -> Result<()> {
    let mut config = ClientConfig::load()?;

    config.use_context(name)?;
    config.save()?;

    println!("Switched to context \"{}\".", name);
    Ok(())
}

fn cmd_set_context(name: &str, update: ContextUpdate) -> Result<()> {
    let mut config = ClientConfig::load()?;

    let change = config.apply(name, update).map_err(|e| match e {
        ConfigError::MissingField { .. } => {
            anyhow::anyhow!("--server is required when creating a new context")
        }
        other => other.into(),
    })?;

    if change.created {
        println!("Context \"{}\" created.", name);
    } else {
        println!("Context \"{}\" modified.", name);
    }
    if change.became_current {
        println!("Switched to context \"{}\".", name);
    }

    config.save()?;
    Ok(())
}

fn cmd_delete_context(name: &str) -> Result<()> {
    let mut config = ClientConfig::load()?;

    if config.remove_context(name).is_none() {
        anyhow::bail!("Context \"{}\" not found", name);
    }
    config.save()?;

    println!("Context \"{}\" deleted.", name);
    Ok(())
}
