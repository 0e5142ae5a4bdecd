//! Conversation state for a single chat thread.
//!
//! A [`Conversation`] is an append-only sequence of [`Message`]s. Appends are
//! checked so that every tool result answers a request issued by the most
//! recent assistant message, and no other message can be appended while such
//! requests are still unanswered.

mod message;

pub use message::{Message, Role, ToolCallRequest};

use crate::error::{Result, TolkError};
use serde::{Deserialize, Serialize};

/// Ordered message history for one thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    thread_id: String,
    messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation.
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
        }
    }

    /// Rebuild a conversation from stored messages, re-checking every append.
    pub fn from_messages(thread_id: impl Into<String>, messages: Vec<Message>) -> Result<Self> {
        let mut conversation = Self::new(thread_id);
        for message in messages {
            conversation.append(message)?;
        }
        Ok(conversation)
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages appended after the first `len` entries.
    pub fn since(&self, len: usize) -> &[Message] {
        &self.messages[len.min(self.messages.len())..]
    }

    /// Append a message, enforcing tool-call linkage.
    pub fn append(&mut self, message: Message) -> Result<()> {
        self.check_append(&message)?;
        self.messages.push(message);
        Ok(())
    }

    /// Append a batch of messages atomically: either all are appended or none.
    pub fn extend(&mut self, batch: Vec<Message>) -> Result<()> {
        let mut staged = self.clone();
        for message in batch {
            staged.append(message)?;
        }
        self.messages = staged.messages;
        Ok(())
    }

    /// Replace this state with `next` if `next` is an append-only extension of it.
    pub fn commit(&mut self, next: Conversation) -> Result<usize> {
        if next.thread_id != self.thread_id {
            return Err(TolkError::InvalidMessage(format!(
                "cannot commit thread '{}' onto '{}'",
                next.thread_id, self.thread_id
            )));
        }
        if next.messages.len() < self.messages.len()
            || next.messages[..self.messages.len()] != self.messages[..]
        {
            return Err(TolkError::InvalidMessage(
                "committed state does not extend the stored history".to_string(),
            ));
        }
        let added = next.messages.len() - self.messages.len();
        self.messages = next.messages;
        Ok(added)
    }

    /// Call ids issued by the latest assistant message that have no result yet.
    ///
    /// A repeated id needs one result per occurrence.
    pub fn pending_tool_calls(&self) -> Vec<&str> {
        let Some(idx) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Assistant { .. }))
        else {
            return Vec::new();
        };

        let mut answered: Vec<&str> = self.messages[idx + 1..]
            .iter()
            .filter_map(Message::tool_call_id)
            .collect();

        self.messages[idx]
            .tool_calls()
            .iter()
            .map(|c| c.id.as_str())
            .filter(|id| match answered.iter().position(|a| a == id) {
                Some(pos) => {
                    answered.swap_remove(pos);
                    false
                }
                None => true,
            })
            .collect()
    }

    /// Content of the last assistant message, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role() == Role::Assistant)
            .map(Message::content)
    }

    /// Number of assistant messages in the history.
    pub fn assistant_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role() == Role::Assistant)
            .count()
    }

    fn check_append(&self, message: &Message) -> Result<()> {
        let pending = self.pending_tool_calls();

        match message {
            Message::Tool { tool_call_id, .. } => {
                if pending.contains(&tool_call_id.as_str()) {
                    Ok(())
                } else {
                    Err(TolkError::InvalidMessage(format!(
                        "tool result '{}' does not answer a pending request",
                        tool_call_id
                    )))
                }
            }
            _ if !pending.is_empty() => Err(TolkError::InvalidMessage(format!(
                "{} message appended while {} tool call(s) are unanswered",
                message.role(),
                pending.len()
            ))),
            _ => Ok(()),
        }
    }
}
