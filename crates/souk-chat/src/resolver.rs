//! Active conversation resolution.
//!
//! Which conversation is open is derived from three inputs: a target user
//! named by the caller (a deep link such as "message this seller"), the
//! persisted last-session record, and the freshly loaded conversation list.
//! [`resolve`] is the pure decision; [`ConversationResolver`] owns the
//! inputs, publishes the result and persists every change.

use crate::composer::SendOutcome;
use crate::persisted::{PersistedSession, SessionStore};
use souk_client::{Conversation, UserRef};
use tokio::sync::watch;

/// A user the caller wants to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUser {
    /// User ID.
    pub user_id: String,
    /// Name to show before any conversation exists.
    pub display_name: Option<String>,
}

impl TargetUser {
    /// Target a user by id.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Outcome of resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing selected.
    Unresolved,
    /// An existing conversation is open.
    Active(String),
    /// The caller wants to talk to a user with no conversation yet. The
    /// first send creates it.
    PendingNewTarget(TargetUser),
}

impl Resolution {
    /// The open conversation, if any.
    pub fn active_conversation(&self) -> Option<&str> {
        match self {
            Resolution::Active(id) => Some(id),
            _ => None,
        }
    }

    /// Whether nothing is selected.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolution::Unresolved)
    }
}

/// The other party of a conversation from `owner`'s point of view.
pub fn counterpart_of<'a>(conversation: &'a Conversation, owner: &str) -> Option<&'a UserRef> {
    conversation
        .participants
        .iter()
        .find(|p| p.id != owner)
        .or_else(|| conversation.counterpart())
}

/// Decide the active conversation.
///
/// Rules, first match wins:
/// 1. A target user with an existing conversation opens that conversation.
/// 2. A target user without one is pending.
/// 3. Otherwise a persisted record owned by `owner` is restored, by
///    conversation id first and then by the other party's id.
pub fn resolve(
    owner: &str,
    target: Option<&TargetUser>,
    persisted: Option<&PersistedSession>,
    conversations: &[Conversation],
) -> Resolution {
    if let Some(target) = target {
        return match conversations
            .iter()
            .find(|c| c.has_participant(&target.user_id))
        {
            Some(conversation) => Resolution::Active(conversation.id.clone()),
            None => Resolution::PendingNewTarget(target.clone()),
        };
    }

    let Some(persisted) = persisted.filter(|p| p.is_owned_by(owner)) else {
        return Resolution::Unresolved;
    };

    if let Some(id) = &persisted.conversation_id
        && conversations.iter().any(|c| &c.id == id)
    {
        return Resolution::Active(id.clone());
    }

    if let Some(with_user) = &persisted.with_user_id
        && let Some(conversation) = conversations
            .iter()
            .find(|c| c.has_participant(with_user))
    {
        return Resolution::Active(conversation.id.clone());
    }

    Resolution::Unresolved
}

/// Owns resolution inputs and publishes the active conversation.
///
/// The persisted record is read once, at construction. After that the
/// resolver keeps its own copy in step with what it writes, so later
/// reconciliations restore the latest selection rather than the one found
/// at startup.
#[derive(Debug)]
pub struct ConversationResolver {
    owner: String,
    target: Option<TargetUser>,
    last: Option<PersistedSession>,
    store: SessionStore,
    state: watch::Sender<Resolution>,
}

impl ConversationResolver {
    /// Create a resolver for `owner`, loading the persisted record.
    pub fn new(owner: impl Into<String>, target: Option<TargetUser>, store: SessionStore) -> Self {
        let owner = owner.into();
        let last = store.load(&owner);
        if let Some(last) = &last {
            tracing::debug!(
                conversation = ?last.conversation_id,
                with_user = ?last.with_user_id,
                "Loaded persisted chat session"
            );
        }
        let (state, _) = watch::channel(Resolution::Unresolved);

        Self {
            owner,
            target,
            last,
            store,
            state,
        }
    }

    /// The authenticated user.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The requested target user, if any.
    pub fn target(&self) -> Option<&TargetUser> {
        self.target.as_ref()
    }

    /// The most recent persisted record.
    pub fn persisted(&self) -> Option<&PersistedSession> {
        self.last.as_ref()
    }

    /// Current resolution.
    pub fn current(&self) -> Resolution {
        self.state.borrow().clone()
    }

    /// Watch resolution changes.
    pub fn watch(&self) -> watch::Receiver<Resolution> {
        self.state.subscribe()
    }

    /// Re-run resolution against the conversation list.
    ///
    /// `None` means the list is still loading; resolution is deferred and
    /// the current state kept.
    pub fn reconcile(&mut self, conversations: Option<&[Conversation]>) -> Resolution {
        let Some(conversations) = conversations else {
            tracing::debug!("Conversation list loading, deferring resolution");
            return self.current();
        };

        let next = resolve(
            &self.owner,
            self.target.as_ref(),
            self.last.as_ref(),
            conversations,
        );
        let conversation = next
            .active_conversation()
            .and_then(|id| conversations.iter().find(|c| c.id == id));
        self.transition(next, conversation);
        self.current()
    }

    /// Change the target user and re-run resolution.
    pub fn set_target(
        &mut self,
        target: Option<TargetUser>,
        conversations: Option<&[Conversation]>,
    ) -> Resolution {
        self.target = target;
        self.reconcile(conversations)
    }

    /// Record a display name for a target user found out later.
    pub fn name_target(&mut self, user_id: &str, name: &str) {
        if let Some(target) = self.target.as_mut().filter(|t| t.user_id == user_id) {
            target.display_name = Some(name.to_string());
        }
        self.state.send_if_modified(|state| match state {
            Resolution::PendingNewTarget(target) if target.user_id == user_id => {
                target.display_name = Some(name.to_string());
                true
            }
            _ => false,
        });
    }

    /// Open a conversation the user picked from the list.
    ///
    /// An explicit pick replaces any target user.
    pub fn select(&mut self, conversation: &Conversation) -> Resolution {
        self.target = None;
        self.transition(
            Resolution::Active(conversation.id.clone()),
            Some(conversation),
        );
        self.current()
    }

    /// Follow up on a completed send.
    pub fn apply_send_outcome(&mut self, outcome: &SendOutcome) -> Resolution {
        match outcome {
            SendOutcome::Delivered { .. } => {}
            SendOutcome::Created { conversation, .. } => {
                self.transition(
                    Resolution::Active(conversation.id.clone()),
                    Some(conversation),
                );
            }
            SendOutcome::Unlocated { user_id, .. } => {
                tracing::warn!(
                    user = %user_id,
                    "Sent message but its conversation is not in the list yet"
                );
                // The pending record still names the user, so the
                // conversation is restored once the list shows it.
                self.target = None;
                self.transition(Resolution::Unresolved, None);
            }
        }
        self.current()
    }

    fn transition(&mut self, next: Resolution, conversation: Option<&Conversation>) {
        let previous = self.current();
        if previous == next {
            return;
        }
        tracing::info!(from = ?previous, to = ?next, "Active conversation changed");

        let record = match &next {
            Resolution::Active(id) => {
                let mut record = PersistedSession::new(&self.owner).with_conversation(id);
                record.with_user_id = conversation
                    .and_then(|c| counterpart_of(c, &self.owner))
                    .map(|user| user.id.clone());
                Some(record)
            }
            Resolution::PendingNewTarget(target) => {
                Some(PersistedSession::new(&self.owner).with_user(&target.user_id))
            }
            // Nothing selected: keep the last record so it can still be
            // restored once its conversation shows up.
            Resolution::Unresolved => None,
        };

        self.state.send_replace(next);

        if let Some(record) = record {
            if let Err(e) = self.store.save(&record) {
                tracing::warn!(error = %e, "Failed to persist chat session");
            }
            self.last = Some(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persisted::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    fn conversation(id: &str, other: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            participants: vec![UserRef::new(other, other), UserRef::new("me", "Me")],
            last_message: None,
            unread_count: 0,
        }
    }

    fn stores() -> (Arc<MemoryStore>, SessionStore) {
        let raw = Arc::new(MemoryStore::new());
        (raw.clone(), SessionStore::new(raw))
    }

    #[test]
    fn test_target_with_existing_conversation() {
        let list = vec![conversation("c1", "u1"), conversation("c2", "u2")];
        let target = TargetUser::new("u2");
        assert_eq!(
            resolve("me", Some(&target), None, &list),
            Resolution::Active("c2".to_string())
        );
    }

    #[test]
    fn test_target_without_conversation_is_pending() {
        let list = vec![conversation("c1", "u1")];
        let target = TargetUser::new("u9").with_name("Nine");
        assert_eq!(
            resolve("me", Some(&target), None, &list),
            Resolution::PendingNewTarget(target)
        );
    }

    #[test]
    fn test_target_beats_persisted_conversation() {
        let list = vec![conversation("c1", "u1"), conversation("c2", "u2")];
        let persisted = PersistedSession::new("me").with_conversation("c1");
        let target = TargetUser::new("u2");
        assert_eq!(
            resolve("me", Some(&target), Some(&persisted), &list),
            Resolution::Active("c2".to_string())
        );
    }

    #[test]
    fn test_restore_by_conversation_then_user() {
        let list = vec![conversation("c1", "u1"), conversation("c2", "u2")];

        let by_id = PersistedSession::new("me")
            .with_conversation("c1")
            .with_user("u2");
        assert_eq!(
            resolve("me", None, Some(&by_id), &list),
            Resolution::Active("c1".to_string())
        );

        let by_user = PersistedSession::new("me")
            .with_conversation("gone")
            .with_user("u2");
        assert_eq!(
            resolve("me", None, Some(&by_user), &list),
            Resolution::Active("c2".to_string())
        );
    }

    #[test]
    fn test_missing_persisted_conversation_is_unresolved() {
        let list = vec![conversation("c1", "u1")];
        let persisted = PersistedSession::new("me").with_conversation("c7");
        assert_eq!(
            resolve("me", None, Some(&persisted), &list),
            Resolution::Unresolved
        );
        assert_eq!(resolve("me", None, None, &[]), Resolution::Unresolved);
    }

    #[test]
    fn test_foreign_record_never_restores() {
        let list = vec![conversation("c1", "u1")];
        let persisted = PersistedSession::new("alice").with_conversation("c1");
        assert_eq!(
            resolve("bob", None, Some(&persisted), &list),
            Resolution::Unresolved
        );
    }

    #[test]
    fn test_reconcile_defers_while_loading() {
        let (raw, store) = stores();
        store
            .save(&PersistedSession::new("me").with_conversation("c1"))
            .unwrap();

        let mut resolver = ConversationResolver::new("me", None, store);
        assert_eq!(resolver.reconcile(None), Resolution::Unresolved);

        let list = vec![conversation("c1", "u1")];
        assert_eq!(
            resolver.reconcile(Some(&list)),
            Resolution::Active("c1".to_string())
        );

        // Restoring rewrites the record with the other party filled in
        let saved = raw.read(crate::persisted::SESSION_KEY).unwrap().unwrap();
        assert!(saved.contains(r#""withUserId":"u1""#));
    }

    #[test]
    fn test_select_persists_and_wins_over_startup_record() {
        let (_, store) = stores();
        store
            .save(&PersistedSession::new("me").with_conversation("c1"))
            .unwrap();
        let list = vec![conversation("c1", "u1"), conversation("c2", "u2")];

        let mut resolver = ConversationResolver::new("me", None, store.clone());
        resolver.reconcile(Some(&list));
        resolver.select(&list[1]);
        assert_eq!(resolver.current(), Resolution::Active("c2".to_string()));

        // A later list refresh keeps the user's pick
        resolver.reconcile(Some(&list));
        assert_eq!(resolver.current(), Resolution::Active("c2".to_string()));
        assert_eq!(
            store.load("me"),
            Some(
                PersistedSession::new("me")
                    .with_conversation("c2")
                    .with_user("u2")
            )
        );
    }

    #[test]
    fn test_pending_target_is_persisted_and_named() {
        let (_, store) = stores();
        let mut resolver =
            ConversationResolver::new("me", Some(TargetUser::new("u9")), store.clone());
        let mut watch = resolver.watch();

        resolver.reconcile(Some(&[]));
        assert!(watch.has_changed().unwrap());
        assert_eq!(
            *watch.borrow_and_update(),
            Resolution::PendingNewTarget(TargetUser::new("u9"))
        );
        assert_eq!(
            store.load("me"),
            Some(PersistedSession::new("me").with_user("u9"))
        );

        resolver.name_target("u9", "Nine");
        assert_eq!(
            resolver.current(),
            Resolution::PendingNewTarget(TargetUser::new("u9").with_name("Nine"))
        );
        assert_eq!(
            resolver.target().and_then(|t| t.display_name.as_deref()),
            Some("Nine")
        );
    }

    #[test]
    fn test_unchanged_resolution_does_not_notify() {
        let (_, store) = stores();
        let mut resolver = ConversationResolver::new("me", None, store);
        let watch = resolver.watch();

        resolver.reconcile(Some(&[]));
        assert!(!watch.has_changed().unwrap());
    }
}
