//! Conversation transcript

use crate::backend::{ChatMessage, Role};
use crate::router::Tier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Lifecycle of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Assistant placeholder waiting for its first token
    Pending,
    Streaming,
    Complete,
    /// Stopped by the user; content may be partial
    Cancelled,
    Error,
}

impl MessageStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Error)
    }
}

/// Routing metadata attached to assistant messages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingInfo {
    pub tier: Tier,
    /// Label shown to the user, e.g. "Local (auto fallback)" or "Cache (Exact)"
    pub label: String,
    pub cost_cents: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    pub timestamp: DateTime<Utc>,
    pub routing: Option<RoutingInfo>,
    pub time_to_first_token: Option<Duration>,
    pub total_duration: Option<Duration>,
    pub error: Option<String>,
}

impl Message {
    fn new(role: Role, content: String, status: MessageStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            status,
            timestamp: Utc::now(),
            routing: None,
            time_to_first_token: None,
            total_duration: None,
            error: None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.status, MessageStatus::Pending | MessageStatus::Streaming)
    }

    /// Append streamed text; ignored once the message is finished
    pub fn append(&mut self, text: &str) {
        if self.status.is_finished() {
            return;
        }
        self.status = MessageStatus::Streaming;
        self.content.push_str(text);
    }
}

/// Ordered list of messages for one chat
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    system_prompt: Option<String>,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn add_user(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::new(Role::User, content.into(), MessageStatus::Complete))
    }

    /// Add an empty assistant message that a stream will fill
    pub fn add_assistant(&mut self) -> &Message {
        self.push(Message::new(Role::Assistant, String::new(), MessageStatus::Pending))
    }

    /// Add an assistant message that is already complete (cache hits)
    pub fn add_assistant_complete(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::new(
            Role::Assistant,
            content.into(),
            MessageStatus::Complete,
        ))
    }

    fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// History to send to a backend
    ///
    /// Skips assistant messages that have no content yet and those that ended
    /// in an error, so a failed turn is never replayed as model output.
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        let system = self.system_prompt.iter().map(ChatMessage::system);
        let history = self
            .messages
            .iter()
            .filter(|m| match m.role {
                Role::Assistant => !m.content.is_empty() && m.status != MessageStatus::Error,
                _ => true,
            })
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content.clone(),
            });
        system.chain(history).collect()
    }
}
