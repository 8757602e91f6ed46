//! In-memory marketplace backend for session tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use souk_chat::{ChatError, ChatGateway, Result};
use souk_client::{Conversation, LastMessage, Message, SendMessageRequest, UserRef};
use std::collections::HashMap;

/// Gateway serving conversations from memory and recording every call.
pub struct MemoryGateway {
    owner: UserRef,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    users: HashMap<String, UserRef>,
    conversations: Vec<Conversation>,
    hidden: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    sent: Vec<SendMessageRequest>,
    list_calls: usize,
    message_calls: HashMap<String, usize>,
    marked_read: Vec<String>,
    fail_sends: bool,
    hide_new_conversations: bool,
    clock: i64,
}

impl MemoryGateway {
    pub fn new(owner_id: &str) -> Self {
        Self {
            owner: UserRef::new(owner_id, "Me"),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_user(self, id: &str, name: &str) -> Self {
        self.state
            .lock()
            .users
            .insert(id.to_string(), UserRef::new(id, name));
        self
    }

    pub fn with_conversation(self, id: &str, other_id: &str) -> Self {
        {
            let mut state = self.state.lock();
            let other = user(&state, other_id);
            state.conversations.push(Conversation {
                id: id.to_string(),
                participants: vec![other, self.owner.clone()],
                last_message: None,
                unread_count: 0,
            });
        }
        self
    }

    pub fn with_message(self, conversation_id: &str, sender_id: &str, content: &str) -> Self {
        self.add_message(conversation_id, sender_id, content);
        self
    }

    /// Store a message as if another client had sent it.
    pub fn add_message(&self, conversation_id: &str, sender_id: &str, content: &str) {
        let mut state = self.state.lock();
        let sender = if sender_id == self.owner.id {
            self.owner.clone()
        } else {
            user(&state, sender_id)
        };
        let message = next_message(&mut state, conversation_id, sender, content);
        touch(&mut state, &message);
        state
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Keep conversations created by sends out of the listing.
    pub fn set_hide_new_conversations(&self, hide: bool) {
        self.state.lock().hide_new_conversations = hide;
    }

    pub fn sent(&self) -> Vec<SendMessageRequest> {
        self.state.lock().sent.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    pub fn message_calls(&self, conversation_id: &str) -> usize {
        self.state
            .lock()
            .message_calls
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn marked_read(&self) -> Vec<String> {
        self.state.lock().marked_read.clone()
    }
}

#[async_trait]
impl ChatGateway for MemoryGateway {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        Ok(state.conversations.clone())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut state = self.state.lock();
        *state
            .message_calls
            .entry(conversation_id.to_string())
            .or_default() += 1;
        // Newest first, so callers have to sort
        let mut messages = state
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.reverse();
        Ok(messages)
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<Message> {
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(ChatError::Gateway(souk_client::Error::Api {
                status: 503,
                code: "unavailable".to_string(),
                message: "send failed".to_string(),
            }));
        }
        state.sent.push(request.clone());

        let receiver = &request.receiver_id;
        let existing = state
            .conversations
            .iter()
            .chain(state.hidden.iter())
            .find(|c| c.has_participant(receiver))
            .map(|c| c.id.clone());
        let conversation_id = match existing {
            Some(id) => id,
            None => {
                let id = format!("c-{}", receiver);
                let conversation = Conversation {
                    id: id.clone(),
                    participants: vec![user(&state, receiver), self.owner.clone()],
                    last_message: None,
                    unread_count: 0,
                };
                if state.hide_new_conversations {
                    state.hidden.push(conversation);
                } else {
                    state.conversations.insert(0, conversation);
                }
                id
            }
        };

        let mut message = next_message(
            &mut state,
            &conversation_id,
            self.owner.clone(),
            &request.content,
        );
        message.product = request.product.clone();
        touch(&mut state, &message);
        state
            .messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn get_user(&self, user_id: &str) -> Result<UserRef> {
        self.state
            .lock()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ChatError::Gateway(souk_client::Error::NotFound(user_id.to_string())))
    }

    async fn mark_read(&self, conversation_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.marked_read.push(conversation_id.to_string());
        if let Some(c) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            c.unread_count = 0;
        }
        Ok(())
    }
}

fn user(state: &State, id: &str) -> UserRef {
    state
        .users
        .get(id)
        .cloned()
        .unwrap_or_else(|| UserRef::new(id, id))
}

fn next_message(state: &mut State, conversation_id: &str, sender: UserRef, content: &str) -> Message {
    state.clock += 1;
    Message {
        id: format!("m{}", state.clock),
        conversation_id: conversation_id.to_string(),
        sender,
        content: content.to_string(),
        created_at: at(state.clock),
        product: None,
    }
}

fn touch(state: &mut State, message: &Message) {
    if let Some(c) = state
        .conversations
        .iter_mut()
        .find(|c| c.id == message.conversation_id)
    {
        c.last_message = Some(LastMessage {
            content: message.content.clone(),
            created_at: message.created_at,
        });
    }
}

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::minutes(minutes)
}

/// Poll `check` until it holds, failing the test after a few seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}
