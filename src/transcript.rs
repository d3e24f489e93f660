//! Chat transcript — ordered user/assistant messages with loading placeholders.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Unix time in milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub is_loading: bool,
}

impl ChatMessage {
    fn new(role: Role, content: String, is_loading: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: chrono::Utc::now().timestamp_millis(),
            is_loading,
        }
    }

    /// A finished assistant message that is not part of any transcript.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into(), false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: VecDeque<ChatMessage>,
    cap: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `cap` messages; the oldest are dropped first.
    /// The cap never goes below 2 so a query and its placeholder always fit.
    pub fn with_cap(cap: Option<usize>) -> Self {
        Self {
            messages: VecDeque::new(),
            cap: cap.filter(|c| *c > 0).map(|c| c.max(2)),
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> ChatMessage {
        self.push(ChatMessage::new(Role::User, content.into(), false))
    }

    /// Append an empty loading assistant message and return its id.
    pub fn push_placeholder(&mut self) -> String {
        self.push(ChatMessage::new(Role::Assistant, String::new(), true)).id
    }

    /// Replace the content of message `id` and clear its loading flag.
    /// Returns the updated message, or `None` if no message has that id.
    pub fn resolve(&mut self, id: &str, content: impl Into<String>) -> Option<ChatMessage> {
        let msg = self.messages.iter_mut().find(|m| m.id == id)?;
        msg.content = content.into();
        msg.is_loading = false;
        Some(msg.clone())
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.messages.iter().filter(|m| m.is_loading).count()
    }

    fn push(&mut self, msg: ChatMessage) -> ChatMessage {
        self.messages.push_back(msg.clone());
        if let Some(cap) = self.cap {
            while self.messages.len() > cap {
                self.messages.pop_front();
            }
        }
        msg
    }
}
