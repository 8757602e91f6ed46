//! API endpoint implementations.

mod conversations;
mod health;
mod messages;
mod users;

pub use conversations::ConversationsApi;
pub use health::HealthApi;
pub use messages::MessagesApi;
pub use users::UsersApi;
