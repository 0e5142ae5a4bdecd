//! Scripted model client that replays canned responses.
//!
//! Records every history it is shown, so callers can inspect exactly what the
//! model would have seen.

use super::{ModelClient, ModelResponse};
use crate::conversation::Message;
use crate::error::{Result, TolkError};
use crate::tools::ToolDescriptor;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted step.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this response.
    Respond(ModelResponse),
    /// Fail as if the model endpoint were unreachable.
    Fail(String),
    /// Sleep, then return the response.
    Delayed(Duration, ModelResponse),
}

/// Model client that plays back a fixed script.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<ScriptedReply>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    /// Create a model that returns the given responses in order.
    pub fn new(responses: impl IntoIterator<Item = ModelResponse>) -> Self {
        Self::from_script(responses.into_iter().map(ScriptedReply::Respond))
    }

    /// Create a model from an explicit script.
    pub fn from_script(script: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Append a step to the end of the script.
    pub fn push(&self, reply: ScriptedReply) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Every message history passed to `complete`, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<ModelResponse> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            Some(ScriptedReply::Respond(response)) => Ok(response),
            Some(ScriptedReply::Fail(reason)) => Err(TolkError::ModelUnavailable(reason)),
            Some(ScriptedReply::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Err(TolkError::ModelUnavailable("script exhausted".to_string())),
        }
    }
}
