//! Conversation and message synchronization for the Souk chat surface.
//!
//! Chat data is pulled from the server through a [`ChatGateway`] and cached
//! per query in a [`ChatCache`]. A push channel tells the client *that*
//! something changed; the [`InvalidationCoordinator`] turns those hints into
//! cache invalidations, and the cache refetches what is being watched.
//! Which conversation is open is decided by the [`ConversationResolver`]
//! from a requested target user, the persisted last session and the loaded
//! list. The [`Composer`] sends messages, including the first message to a
//! user, which is how conversations come to exist.
//!
//! [`ChatSession`] mounts all of this for one user.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use souk_chat::{ChatSession, ChatSessionConfig, FileStore, PushChannel, TargetUser};
//!
//! let client = Arc::new(SoukClient::builder().base_url(url).auth_token(token).build()?);
//! let push = PushChannel::connect(url, Some(token.to_string()))?;
//! let store = Arc::new(FileStore::new(souk_config::state_dir()?));
//!
//! let config = ChatSessionConfig::new("me").with_target(TargetUser::new("seller-42"));
//! let mut session = ChatSession::mount(client, &push, store, config);
//!
//! // Pending until the first message creates the conversation
//! session.send("Is this still available?").await?;
//! ```

pub mod channel;
pub mod composer;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod persisted;
pub mod protocol;
pub mod query;
pub mod resolver;
pub mod session;

pub use channel::{ConnectionStatus, LocalPushSource, PushChannel, PushSource};
pub use composer::{Composer, SendOutcome};
pub use coordinator::{InvalidationCoordinator, invalidations_for};
pub use error::{ChatError, Result};
pub use gateway::ChatGateway;
pub use persisted::{FileStore, KeyValueStore, MemoryStore, PersistedSession, SessionStore};
pub use protocol::{ClientFrame, PushEvent};
pub use query::{ChatCache, ChatData, ChatFetcher, ChatQuery};
pub use resolver::{ConversationResolver, Resolution, TargetUser, resolve};
pub use session::{ChatSession, ChatSessionConfig};
