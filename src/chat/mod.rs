//! Chat surface: one user turn against one thread.

use crate::agent::{Agent, AgentResponse};
use crate::config::Settings;
use crate::conversation::{Conversation, Message};
use crate::error::{Result, TolkError};
use crate::model::{ModelClient, OpenAIModel};
use crate::threads::{ThreadStore, ThreadSummary};
use crate::tools::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Entry point shared by every front end.
pub struct ChatService {
    agent: Agent,
    store: Arc<ThreadStore>,
}

impl ChatService {
    pub fn new(agent: Agent, store: Arc<ThreadStore>) -> Self {
        Self { agent, store }
    }

    /// Wire the production model, the configured tools and the thread store.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let model: Arc<dyn ModelClient> = Arc::new(OpenAIModel::new(&settings.model)?);
        Self::with_model(settings, model)
    }

    /// Like [`ChatService::from_settings`] with a caller-provided model client.
    pub fn with_model(settings: &Settings, model: Arc<dyn ModelClient>) -> Result<Self> {
        let tools = Arc::new(ToolRegistry::from_settings(settings)?);
        let agent = Agent::new(model, tools)
            .with_settings(&settings.agent)
            .with_model_timeout(Duration::from_secs(settings.model.timeout_seconds));
        let store = Arc::new(ThreadStore::from_settings(settings)?);

        Ok(Self::new(agent, store))
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn store(&self) -> &Arc<ThreadStore> {
        &self.store
    }

    /// Send a user message and return the final assistant text.
    pub async fn submit(&self, thread_id: &str, text: &str) -> Result<String> {
        self.submit_turn(thread_id, text)
            .await
            .map(|response| response.content)
    }

    /// Send a user message and return the full turn record.
    pub async fn submit_turn(&self, thread_id: &str, text: &str) -> Result<AgentResponse> {
        self.submit_with_cancel(thread_id, text, &CancellationToken::new())
            .await
    }

    /// Run one turn. The stored thread changes only if the turn completes.
    #[instrument(skip(self, text, cancel))]
    pub async fn submit_with_cancel(
        &self,
        thread_id: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TolkError::InvalidInput("message must not be empty".to_string()));
        }

        let mut thread = self.store.get_or_create(thread_id)?.lock().await;

        let mut working = Conversation::clone(&thread);
        working.append(Message::user(text))?;

        match self.agent.run_with_cancel(&mut working, cancel).await {
            Ok(response) => {
                let added = thread.commit(working)?;
                info!(
                    "Thread {} committed {} message(s), {} tool call(s)",
                    thread_id,
                    added,
                    response.tool_calls.len()
                );
                Ok(response)
            }
            Err(err @ TolkError::RoundLimitExceeded { .. }) => {
                warn!(
                    "Discarding turn on thread {}: {} ({} partial message(s))",
                    thread_id,
                    err,
                    working.len() - thread.len()
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Current history of a thread, if it exists.
    pub async fn history(&self, thread_id: &str) -> Result<Option<Conversation>> {
        self.store.snapshot(thread_id).await
    }

    /// Forget a thread. Returns whether it existed.
    pub async fn reset(&self, thread_id: &str) -> Result<bool> {
        self.store.reset(thread_id).await
    }

    pub fn threads(&self) -> Result<Vec<ThreadSummary>> {
        self.store.list()
    }
}
