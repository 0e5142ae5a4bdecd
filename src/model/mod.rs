//! Language model boundary.
//!
//! The agent loop only sees [`ModelClient`]: hand it the full message history
//! and the available tool descriptors, get back either final text or a set of
//! tool-call requests.

mod openai;
mod scripted;

pub use openai::OpenAIModel;
pub use scripted::{ScriptedModel, ScriptedReply};

use crate::conversation::{Message, ToolCallRequest};
use crate::error::Result;
use crate::tools::ToolDescriptor;
use async_trait::async_trait;

/// Response from a single model invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelResponse {
    /// Text content (may be empty when tools are requested).
    pub content: String,
    /// Tool invocations requested by the model, in the order listed.
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelResponse {
    /// A final answer with no tool requests.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// A response requesting tool invocations.
    pub fn tools(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }

    /// Convert into the assistant message appended to the conversation.
    pub fn into_message(self) -> Message {
        Message::assistant_with_tools(self.content, self.tool_calls)
    }
}

/// Trait for chat model implementations.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Ask the model for the next step given the full history.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelResponse>;
}
