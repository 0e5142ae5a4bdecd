//! OpenAI chat-completions model client.

use super::{ModelClient, ModelResponse};
use crate::config::ModelSettings;
use crate::conversation::{Message, ToolCallRequest};
use crate::error::{Result, TolkError};
use crate::openai::create_client;
use crate::tools::ToolDescriptor;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionCall,
    FunctionObject,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Default system prompt for the chat agent.
const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful assistant with access to external tools.

Think about what information you need, then use the appropriate tools.
If a tool returns an error, decide whether to try again differently or answer without it.
When you have gathered enough information, provide your final response.
Be conversational and remember context from earlier in the conversation."#;

/// Model client backed by the OpenAI chat-completions API.
pub struct OpenAIModel {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
    system_prompt: String,
}

impl OpenAIModel {
    /// Create a client from model settings.
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        Ok(Self {
            client: create_client(settings)?,
            model: settings.model.clone(),
            temperature: settings.temperature,
            system_prompt: settings
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }

    /// Set a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    fn build_messages(&self, messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut request_messages = Vec::with_capacity(messages.len() + 1);
        request_messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_prompt.clone())
                .build()
                .map_err(build_error)?
                .into(),
        );

        for message in messages {
            request_messages.push(to_request_message(message)?);
        }

        Ok(request_messages)
    }
}

#[async_trait]
impl ModelClient for OpenAIModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelResponse> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(self.build_messages(messages)?);

        // The API rejects an empty tools array.
        if !tools.is_empty() {
            args.tools(tool_definitions(tools));
        }
        if let Some(temperature) = self.temperature {
            args.temperature(temperature);
        }

        let request = args.build().map_err(build_error)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| TolkError::ModelUnavailable(format!("Chat API error: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TolkError::ModelUnavailable("No response from model".to_string()))?;

        let tool_calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCallRequest::new(call.id, call.function.name, call.function.arguments))
            .collect();

        debug!("Model returned {} tool call(s)", tool_calls.len());

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

fn build_error(e: OpenAIError) -> TolkError {
    TolkError::InvalidInput(format!("Failed to build model request: {}", e))
}

/// Convert a conversation message into its chat-completions form.
fn to_request_message(message: &Message) -> Result<ChatCompletionRequestMessage> {
    let converted = match message {
        Message::User { content, .. } => ChatCompletionRequestUserMessageArgs::default()
            .content(content.clone())
            .build()
            .map_err(build_error)?
            .into(),

        Message::Assistant {
            content,
            tool_calls,
            ..
        } => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !content.is_empty() {
                args.content(content.clone());
            }
            if !tool_calls.is_empty() {
                args.tool_calls(
                    tool_calls
                        .iter()
                        .map(|call| ChatCompletionMessageToolCall {
                            id: call.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                        })
                        .collect::<Vec<_>>(),
                );
            }
            args.build().map_err(build_error)?.into()
        }

        Message::Tool {
            tool_call_id,
            content,
            ..
        } => ChatCompletionRequestToolMessageArgs::default()
            .tool_call_id(tool_call_id.clone())
            .content(content.clone())
            .build()
            .map_err(build_error)?
            .into(),
    };

    Ok(converted)
}

/// Get OpenAI function/tool definitions for the registered tools.
fn tool_definitions(tools: &[ToolDescriptor]) -> Vec<ChatCompletionTool> {
    tools
        .iter()
        .map(|tool| ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: tool.name.clone(),
                description: Some(tool.description.clone()),
                parameters: Some(tool.parameters.clone()),
                strict: None,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_definitions() {
        let descriptors = vec![ToolDescriptor {
            name: "search".to_string(),
            description: "Used to get info from online search".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }];

        let defs = tool_definitions(&descriptors);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].function.name, "search");
        assert_eq!(
            defs[0].function.description.as_deref(),
            Some("Used to get info from online search")
        );
    }

    #[test]
    fn test_assistant_tool_calls_are_converted() {
        let message = Message::assistant_with_tools(
            "",
            vec![ToolCallRequest::new("call_1", "search", r#"{"query":"x"}"#)],
        );

        match to_request_message(&message).unwrap() {
            ChatCompletionRequestMessage::Assistant(assistant) => {
                let calls = assistant.tool_calls.unwrap();
                assert_eq!(calls[0].id, "call_1");
                assert_eq!(calls[0].function.arguments, r#"{"query":"x"}"#);
                assert!(assistant.content.is_none());
            }
            other => panic!("Expected assistant message, got {:?}", other),
        }
    }

    #[test]
    fn test_system_prompt_is_prepended() {
        let model = OpenAIModel::new(&ModelSettings::default())
            .unwrap()
            .with_system_prompt("Be brief.");
        let built = model.build_messages(&[Message::user("hi")]).unwrap();

        assert_eq!(built.len(), 2);
        assert!(matches!(built[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(built[1], ChatCompletionRequestMessage::User(_)));
    }
}
