//! End-to-end chat session scenarios against an in-memory backend.

mod common;

use common::{MemoryGateway, eventually};
use souk_cache::{CacheConfig, CacheEvent, QueryCache};
use souk_chat::{
    ChatError, ChatFetcher, ChatQuery, ChatSession, ChatSessionConfig, InvalidationCoordinator,
    KeyValueStore, LocalPushSource, MemoryStore, PersistedSession, PushEvent, Resolution,
    SendOutcome, SessionStore, TargetUser,
};
use souk_client::{ProductContext, SendMessageRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn store_with(record: Option<PersistedSession>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    if let Some(record) = record {
        SessionStore::new(store.clone()).save(&record).unwrap();
    }
    store
}

fn persisted(store: &Arc<MemoryStore>, owner: &str) -> Option<PersistedSession> {
    SessionStore::new(store.clone()).load(owner)
}

#[tokio::test]
async fn test_first_message_to_new_target_opens_conversation() {
    let gateway = Arc::new(MemoryGateway::new("me").with_user("U1", "Seller"));
    let push = LocalPushSource::new();
    let store = store_with(None);

    let config = ChatSessionConfig::new("me").with_target(TargetUser::new("U1"));
    let mut session = ChatSession::mount(gateway.clone(), &push, store.clone(), config);

    eventually(|| {
        session.resolution() == Resolution::PendingNewTarget(TargetUser::new("U1").with_name("Seller"))
    })
    .await;
    let lists_before = gateway.list_calls();

    let outcome = session.send("Hi").await.unwrap();
    let conversation = match &outcome {
        SendOutcome::Created { conversation, .. } => conversation.clone(),
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert!(conversation.has_participant("U1"));

    assert_eq!(gateway.sent(), vec![SendMessageRequest::new("U1", "Hi")]);
    assert!(gateway.list_calls() > lists_before);
    assert_eq!(session.resolution(), Resolution::Active(conversation.id.clone()));
    assert_eq!(
        persisted(&store, "me"),
        Some(
            PersistedSession::new("me")
                .with_conversation(&conversation.id)
                .with_user("U1")
        )
    );

    eventually(|| session.thread().is_some_and(|t| t.len() == 1)).await;
    assert_eq!(session.thread().unwrap()[0].content, "Hi");
    session.dispose();
}

#[tokio::test]
async fn test_new_message_elsewhere_leaves_open_thread_alone() {
    let gateway = Arc::new(
        MemoryGateway::new("me")
            .with_conversation("c1", "u1")
            .with_conversation("c2", "u2")
            .with_message("c1", "u1", "hello"),
    );
    let push = LocalPushSource::new();
    let store = store_with(Some(PersistedSession::new("me").with_conversation("c1")));

    let session = ChatSession::mount(gateway.clone(), &push, store, ChatSessionConfig::new("me"));
    eventually(|| session.thread().is_some()).await;
    assert_eq!(session.resolution(), Resolution::Active("c1".to_string()));
    assert_eq!(gateway.message_calls("c1"), 1);

    let mut changes = session.changes();
    let lists_before = gateway.list_calls();

    push.publish(PushEvent::NewMessage {
        conversation_id: "c2".to_string(),
        message: None,
    });

    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), changes.recv())
            .await
            .unwrap()
            .unwrap();
        let done = matches!(
            event,
            CacheEvent::Updated {
                key: ChatQuery::Conversations
            }
        );
        seen.push(event);
        if done {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    while let Ok(event) = changes.try_recv() {
        seen.push(event);
    }

    assert!(gateway.list_calls() > lists_before);
    assert_eq!(gateway.message_calls("c1"), 1);
    assert!(
        !seen.iter().any(|e| matches!(
            e,
            CacheEvent::Updated { key } | CacheEvent::Failed { key, .. }
                if *key == ChatQuery::messages("c1")
        )),
        "open thread was touched: {:?}",
        seen
    );
}

#[tokio::test]
async fn test_new_message_in_open_conversation_refetches_thread() {
    let gateway = Arc::new(
        MemoryGateway::new("me")
            .with_conversation("c1", "u1")
            .with_message("c1", "u1", "first"),
    );
    let push = LocalPushSource::new();
    let store = store_with(Some(PersistedSession::new("me").with_conversation("c1")));

    let session = ChatSession::mount(gateway.clone(), &push, store, ChatSessionConfig::new("me"));
    eventually(|| session.thread().is_some()).await;

    gateway.add_message("c1", "u1", "second");
    push.publish(PushEvent::NewMessage {
        conversation_id: "c1".to_string(),
        message: None,
    });
    // Duplicate delivery is harmless
    push.publish(PushEvent::NewMessage {
        conversation_id: "c1".to_string(),
        message: None,
    });

    eventually(|| session.thread().is_some_and(|t| t.len() == 2)).await;
    let thread = session.thread().unwrap();
    let contents: Vec<_> = thread.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);
}

#[tokio::test]
async fn test_missing_persisted_conversation_stays_unresolved() {
    let gateway = Arc::new(MemoryGateway::new("me").with_conversation("c1", "u1"));
    let push = LocalPushSource::new();
    let store = store_with(Some(PersistedSession::new("me").with_conversation("c7")));

    let mut session = ChatSession::mount(gateway.clone(), &push, store, ChatSessionConfig::new("me"));
    eventually(|| session.conversations().is_some()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(session.resolution(), Resolution::Unresolved);

    let err = session.send("anyone there?").await.unwrap_err();
    assert!(matches!(err, ChatError::NoActiveConversation));
    assert_eq!(session.composer().draft(), "anyone there?");
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn test_other_users_session_is_not_restored() {
    let gateway = Arc::new(MemoryGateway::new("bob").with_conversation("c1", "u1"));
    let push = LocalPushSource::new();
    let store = store_with(Some(PersistedSession::new("alice").with_conversation("c1")));

    let session = ChatSession::mount(gateway, &push, store.clone(), ChatSessionConfig::new("bob"));
    eventually(|| session.conversations().is_some()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(session.resolution(), Resolution::Unresolved);
    assert!(persisted(&store, "bob").is_none());
    assert!(persisted(&store, "alice").is_some());
}

#[tokio::test]
async fn test_target_user_beats_persisted_conversation() {
    let gateway = Arc::new(
        MemoryGateway::new("me")
            .with_conversation("c1", "u1")
            .with_conversation("c2", "u2"),
    );
    let push = LocalPushSource::new();
    let store = store_with(Some(PersistedSession::new("me").with_conversation("c1")));

    let config = ChatSessionConfig::new("me").with_target(TargetUser::new("u2").with_name("Two"));
    let session = ChatSession::mount(gateway, &push, store.clone(), config);

    eventually(|| session.resolution() == Resolution::Active("c2".to_string())).await;
    assert_eq!(
        persisted(&store, "me"),
        Some(PersistedSession::new("me").with_conversation("c2").with_user("u2"))
    );
}

#[tokio::test]
async fn test_product_context_is_one_shot() {
    let gateway = Arc::new(MemoryGateway::new("me").with_conversation("c1", "u1"));
    let push = LocalPushSource::new();
    let store = store_with(Some(PersistedSession::new("me").with_conversation("c1")));

    let mut session = ChatSession::mount(gateway.clone(), &push, store, ChatSessionConfig::new("me"));
    eventually(|| session.resolution().active_conversation().is_some()).await;

    let product = ProductContext::new("p1").with_title("Lamp").with_price(19.99);
    session.composer_mut().attach_product(product.clone());

    let outcome = session.send("Is the lamp available?").await.unwrap();
    assert_eq!(outcome.conversation_id(), Some("c1"));
    assert_eq!(outcome.message().product.as_ref(), Some(&product));
    assert!(session.composer().pending_product().is_none());
    assert_eq!(session.composer().draft(), "");

    session.send("Also, does it ship?").await.unwrap();
    let sent = gateway.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].product.as_ref(), Some(&product));
    assert!(sent[1].product.is_none());

    // Sending invalidated the open thread
    eventually(|| session.thread().is_some_and(|t| t.len() == 2)).await;
}

#[tokio::test]
async fn test_failed_send_keeps_draft_and_product() {
    let gateway = Arc::new(MemoryGateway::new("me").with_conversation("c1", "u1"));
    let push = LocalPushSource::new();
    let store = store_with(Some(PersistedSession::new("me").with_conversation("c1")));

    let mut session = ChatSession::mount(gateway.clone(), &push, store, ChatSessionConfig::new("me"));
    eventually(|| session.resolution().active_conversation().is_some()).await;

    session
        .composer_mut()
        .attach_product(ProductContext::new("p1"));
    gateway.set_fail_sends(true);

    let err = session.send("hello").await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(session.composer().draft(), "hello");
    assert!(session.composer().pending_product().is_some());

    gateway.set_fail_sends(false);
    session.send("hello").await.unwrap();
    assert_eq!(session.composer().draft(), "");
    assert!(session.composer().pending_product().is_none());

    let err = session.send("   ").await.unwrap_err();
    assert!(matches!(err, ChatError::EmptyMessage));
}

#[tokio::test]
async fn test_unlocated_conversation_falls_back_to_unresolved() {
    let gateway = Arc::new(MemoryGateway::new("me").with_user("U1", "Seller"));
    gateway.set_hide_new_conversations(true);
    let push = LocalPushSource::new();
    let store = store_with(None);

    let config = ChatSessionConfig::new("me").with_target(TargetUser::new("U1").with_name("Seller"));
    let mut session = ChatSession::mount(gateway.clone(), &push, store, config);
    eventually(|| matches!(session.resolution(), Resolution::PendingNewTarget(_))).await;

    let outcome = session.send("Hi").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Unlocated { ref user_id, .. } if user_id == "U1"));
    assert_eq!(session.resolution(), Resolution::Unresolved);
    assert_eq!(gateway.sent().len(), 1);
}

#[tokio::test]
async fn test_select_opens_thread_and_marks_read() {
    let gateway = Arc::new(
        MemoryGateway::new("me")
            .with_conversation("c1", "u1")
            .with_conversation("c2", "u2")
            .with_message("c2", "u2", "ping"),
    );
    let push = LocalPushSource::new();
    let store = store_with(None);

    let session = ChatSession::mount(gateway.clone(), &push, store.clone(), ChatSessionConfig::new("me"));
    eventually(|| session.conversations().is_some()).await;

    assert!(matches!(
        session.select("nope"),
        Err(ChatError::UnknownConversation(_))
    ));
    assert_eq!(
        session.select("c2").unwrap(),
        Resolution::Active("c2".to_string())
    );

    eventually(|| session.thread().is_some()).await;
    eventually(|| gateway.marked_read() == vec!["c2".to_string()]).await;
    assert_eq!(
        persisted(&store, "me"),
        Some(PersistedSession::new("me").with_conversation("c2").with_user("u2"))
    );
}

#[tokio::test]
async fn test_open_with_switches_target() {
    let gateway = Arc::new(
        MemoryGateway::new("me")
            .with_user("u9", "Nine")
            .with_conversation("c1", "u1"),
    );
    let push = LocalPushSource::new();
    let mut session = ChatSession::mount(gateway, &push, store_with(None), ChatSessionConfig::new("me"));
    eventually(|| session.conversations().is_some()).await;

    assert_eq!(
        session.open_with(TargetUser::new("u1")),
        Resolution::Active("c1".to_string())
    );
    session.open_with(TargetUser::new("u9"));
    eventually(|| {
        session.resolution() == Resolution::PendingNewTarget(TargetUser::new("u9").with_name("Nine"))
    })
    .await;
}

#[tokio::test]
async fn test_coordinator_attaches_once() {
    let gateway = Arc::new(MemoryGateway::new("me"));
    let push = LocalPushSource::new();
    let cache = QueryCache::new(CacheConfig::default(), ChatFetcher::new(gateway));
    let (_tx, active) = watch::channel(Resolution::Unresolved);

    let mut coordinator = InvalidationCoordinator::new(cache, active);
    assert!(!coordinator.is_attached());
    assert!(coordinator.attach(&push));
    assert!(!coordinator.attach(&push));
    assert_eq!(push.listener_count(), 1);
    assert!(coordinator.is_attached());

    assert!(coordinator.detach());
    assert!(!coordinator.detach());
    assert!(!coordinator.is_attached());
    eventually(|| push.listener_count() == 0).await;
}

#[tokio::test]
async fn test_dispose_detaches_from_push_source() {
    let gateway = Arc::new(MemoryGateway::new("me"));
    let push = LocalPushSource::new();
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    let session = ChatSession::mount(gateway, &push, store, ChatSessionConfig::new("me"));
    assert!(session.is_attached());
    assert_eq!(push.listener_count(), 1);

    session.dispose();
    eventually(|| push.listener_count() == 0).await;
}
