//! Classification of a model response into the next loop action.

use crate::conversation::{Message, ToolCallRequest};
use crate::error::TolkError;
use crate::model::ModelResponse;

/// What the agent loop does after a model invocation.
#[derive(Debug)]
pub enum LoopStep {
    /// The model requested tools: execute `requests`, append `message` and
    /// the results, then ask the model again.
    Continue {
        message: Message,
        requests: Vec<ToolCallRequest>,
    },
    /// The model produced a final answer.
    Done { message: Message },
    /// The model call failed; nothing from this round is appended.
    Failed(TolkError),
}

impl From<ModelResponse> for LoopStep {
    fn from(response: ModelResponse) -> Self {
        if response.tool_calls.is_empty() {
            LoopStep::Done {
                message: response.into_message(),
            }
        } else {
            let requests = response.tool_calls.clone();
            LoopStep::Continue {
                message: response.into_message(),
                requests,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_response_is_done() {
        match LoopStep::from(ModelResponse::text("hi")) {
            LoopStep::Done { message } => {
                assert_eq!(message.content(), "hi");
                assert!(!message.has_tool_calls());
            }
            other => panic!("Expected Done, got {:?}", other),
        }
    }

    #[test]
    fn test_tool_response_continues() {
        let response = ModelResponse::tools(vec![
            ToolCallRequest::new("a", "search", "{}"),
            ToolCallRequest::new("b", "search", "{}"),
        ]);

        match LoopStep::from(response) {
            LoopStep::Continue { message, requests } => {
                assert_eq!(requests.len(), 2);
                assert_eq!(requests[0].id, "a");
                assert_eq!(message.tool_calls(), requests.as_slice());
            }
            other => panic!("Expected Continue, got {:?}", other),
        }
    }
}
