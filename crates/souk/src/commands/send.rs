//! Send command - send a single message.

use anyhow::Result;
use clap::Args;
use console::Style;
use souk_cache::QueryCache;
use souk_chat::{ChatFetcher, Composer, SendOutcome};
use souk_client::ProductContext;

use super::Context;

/// Arguments for the send command.
#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["to", "conversation"])))]
pub struct SendArgs {
    /// Message text
    pub content: String,

    /// Recipient user ID (starts a conversation if none exists)
    #[arg(long)]
    pub to: Option<String>,

    /// Existing conversation ID
    #[arg(long)]
    pub conversation: Option<String>,

    /// Attach a product by ID
    #[arg(long)]
    pub product_id: Option<String>,

    /// Product title to show with the message
    #[arg(long, requires = "product_id")]
    pub product_title: Option<String>,

    /// Product price at the time of sending
    #[arg(long, requires = "product_id")]
    pub price: Option<f64>,
}

impl SendArgs {
    fn product(&self) -> Option<ProductContext> {
        let mut product = ProductContext::new(self.product_id.clone()?);
        if let Some(title) = &self.product_title {
            product = product.with_title(title);
        }
        if let Some(price) = self.price {
            product = product.with_price(price);
        }
        Some(product)
    }
}

/// Run the send command.
pub async fn run(args: SendArgs, ctx: &Context) -> Result<()> {
    let me = ctx.require_user()?;
    let client = ctx.client()?;
    let cache = QueryCache::new(ctx.cache.clone(), ChatFetcher::new(client.clone()));
    let mut composer = Composer::new(me, client, cache);
    if let Some(product) = args.product() {
        composer.attach_product(product);
    }

    let outcome = match (&args.conversation, &args.to) {
        (Some(conversation_id), _) => {
            composer
                .send_into_existing(conversation_id, &args.content)
                .await?
        }
        (None, Some(user_id)) => composer.send_to_new_target(user_id, &args.content).await?,
        (None, None) => anyhow::bail!("either --to or --conversation is required"),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(outcome.message())?);
        return Ok(());
    }

    let green = Style::new().green();
    let dim = Style::new().dim();
    match &outcome {
        SendOutcome::Delivered {
            conversation_id, ..
        } => println!("{} Sent to {}", green.apply_to("✓"), dim.apply_to(conversation_id)),
        SendOutcome::Created { conversation, .. } => println!(
            "{} Sent, conversation {}",
            green.apply_to("✓"),
            dim.apply_to(&conversation.id)
        ),
        SendOutcome::Unlocated { user_id, message } => println!(
            "{} Sent to {} (conversation {} not listed yet)",
            green.apply_to("✓"),
            user_id,
            dim.apply_to(&message.conversation_id)
        ),
    }

    Ok(())
}
