//! HTTP client SDK for the Souk marketplace chat API.
//!
//! This crate provides a typed client for the conversation and message
//! endpoints that back the buyer/seller chat surface.
//!
//! # Example
//!
//! ```no_run
//! use souk_client::{SendMessageRequest, SoukClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = SoukClient::builder()
//!     .base_url("http://localhost:5000")
//!     .auth_token("secret")
//!     .build()?;
//!
//! // List conversations with their unread counts
//! let list = client.conversations().list().await?;
//! for conversation in &list.conversations {
//!     println!("{} ({} unread)", conversation.id, conversation.unread_count);
//! }
//!
//! // Message a seller; the server creates the conversation if needed
//! let sent = client
//!     .messages()
//!     .send(SendMessageRequest::new("seller-42", "Is this still available?"))
//!     .await?;
//! println!("Sent into {}", sent.message.conversation_id);
//! # Ok(())
//! # }
//! ```
//!
//! # API Coverage
//!
//! - **Conversations**: List, list messages, mark read
//! - **Messages**: Send (optionally with a product snapshot)
//! - **Users**: Fetch a user profile by id
//! - **Health**: Server health checks

pub mod api;
pub mod client;
pub mod error;
pub mod types;

pub use client::{ClientBuilder, SoukClient};
pub use error::{Error, Result};
pub use types::*;
