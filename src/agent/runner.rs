//! Agent runner with tool calling loop.

use super::step::LoopStep;
use crate::config::AgentSettings;
use crate::conversation::{Conversation, Message, Role, ToolCallRequest};
use crate::error::{Result, TolkError};
use crate::model::ModelClient;
use crate::tools::{ToolDescriptor, ToolRegistry};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default timeout for a single model call (5 minutes).
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 300;

/// Agent that alternates between the model and tools until a final answer.
pub struct Agent {
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    max_rounds: usize,
    parallel_tool_calls: bool,
    model_timeout: Duration,
}

impl Agent {
    /// Create a new agent with the given model and tool registry.
    pub fn new(model: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            model,
            tools,
            max_rounds: 15,
            parallel_tool_calls: true,
            model_timeout: Duration::from_secs(DEFAULT_MODEL_TIMEOUT_SECS),
        }
    }

    /// Apply loop settings.
    pub fn with_settings(self, settings: &AgentSettings) -> Self {
        self.with_max_rounds(settings.max_rounds)
            .with_parallel_tool_calls(settings.parallel_tool_calls)
    }

    /// Set the maximum number of tool rounds per turn.
    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = max;
        self
    }

    /// Run the tool calls of one round concurrently or one after another.
    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    /// Set the timeout for a single model call.
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Run the loop until the model produces a final answer.
    ///
    /// The conversation must end with the user message being answered.
    pub async fn run(&self, conversation: &mut Conversation) -> Result<AgentResponse> {
        self.run_with_cancel(conversation, &CancellationToken::new())
            .await
    }

    /// Like [`Agent::run`], aborting the in-flight round when `cancel` fires.
    ///
    /// Every round is appended atomically: on failure the conversation holds
    /// all completed rounds and nothing from the aborted one.
    pub async fn run_with_cancel(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<AgentResponse> {
        if conversation.last().map(Message::role) != Some(Role::User) {
            return Err(TolkError::InvalidInput(
                "conversation must end with a user message".to_string(),
            ));
        }

        let descriptors = self.tools.descriptors();
        let mut tool_calls_made = Vec::new();
        let mut rounds = 0;

        loop {
            debug!(
                "Agent round {} on thread {}, {} messages",
                rounds + 1,
                conversation.thread_id(),
                conversation.len()
            );

            match self.next_step(conversation, &descriptors, cancel).await {
                LoopStep::Done { message } => {
                    let content = message.content().to_string();
                    conversation.append(message)?;
                    info!(
                        "Agent finished thread {} after {} tool round(s)",
                        conversation.thread_id(),
                        rounds
                    );
                    return Ok(AgentResponse {
                        content,
                        tool_calls: tool_calls_made,
                        rounds,
                    });
                }

                LoopStep::Continue { message, requests } => {
                    if rounds >= self.max_rounds {
                        warn!(
                            "Agent exceeded {} tool rounds on thread {}",
                            self.max_rounds,
                            conversation.thread_id()
                        );
                        return Err(TolkError::RoundLimitExceeded {
                            limit: self.max_rounds,
                        });
                    }

                    let records = tokio::select! {
                        _ = cancel.cancelled() => return Err(TolkError::Cancelled),
                        records = self.execute_tool_calls(&requests) => records,
                    };

                    let mut batch = Vec::with_capacity(records.len() + 1);
                    batch.push(message);
                    batch.extend(records.iter().map(ToolCallRecord::to_message));
                    conversation.extend(batch)?;

                    tool_calls_made.extend(records);
                    rounds += 1;
                }

                LoopStep::Failed(err) => return Err(err),
            }
        }
    }

    /// Ask the model for the next step, bounded by timeout and cancellation.
    async fn next_step(
        &self,
        conversation: &Conversation,
        descriptors: &[ToolDescriptor],
        cancel: &CancellationToken,
    ) -> LoopStep {
        let call = self.model.complete(conversation.messages(), descriptors);

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(TolkError::Cancelled),
            outcome = tokio::time::timeout(self.model_timeout, call) => match outcome {
                Ok(response) => response,
                Err(_) => Err(TolkError::ModelTimeout(self.model_timeout)),
            },
        };

        match result {
            Ok(response) => LoopStep::from(response),
            Err(err) => LoopStep::Failed(err),
        }
    }

    /// Execute every request of a round. Results keep request order.
    async fn execute_tool_calls(&self, requests: &[ToolCallRequest]) -> Vec<ToolCallRecord> {
        if self.parallel_tool_calls {
            futures::future::join_all(requests.iter().map(|r| self.execute_tool_call(r))).await
        } else {
            let mut records = Vec::with_capacity(requests.len());
            for request in requests {
                records.push(self.execute_tool_call(request).await);
            }
            records
        }
    }

    /// Execute a single tool call and return a record of it.
    async fn execute_tool_call(&self, request: &ToolCallRequest) -> ToolCallRecord {
        info!("Agent calling tool: {} with args: {}", request.name, request.arguments);

        let (result, is_error) = match self.tools.invoke(request).await {
            Ok(output) => (output, false),
            Err(e) => {
                warn!("Tool call {} failed: {}", request, e);
                (format!("Error: {}", e), true)
            }
        };

        ToolCallRecord {
            id: request.id.clone(),
            name: request.name.clone(),
            arguments: request.arguments.clone(),
            result,
            is_error,
        }
    }
}

/// Response from an agent run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    /// The final response content from the agent.
    pub content: String,
    /// Record of all tool calls made during execution.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Number of completed tool rounds.
    pub rounds: usize,
}

/// Record of a tool call made by the agent.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    /// Call id issued by the model.
    pub id: String,
    /// Name of the tool called.
    pub name: String,
    /// JSON arguments passed to the tool.
    pub arguments: String,
    /// Result returned by the tool, or the error text.
    pub result: String,
    /// Whether the result is an error payload.
    pub is_error: bool,
}

impl ToolCallRecord {
    /// The tool-result message answering this call.
    pub fn to_message(&self) -> Message {
        if self.is_error {
            Message::tool_error(&self.id, &self.result)
        } else {
            Message::tool_result(&self.id, &self.result)
        }
    }
}

impl std::fmt::Display for ToolCallRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelResponse, ScriptedModel, ScriptedReply};
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Returns a canned answer after an optional delay.
    struct Canned {
        name: &'static str,
        answer: &'static str,
        delay: Duration,
    }

    #[async_trait]
    impl Tool for Canned {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Returns a canned answer"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            })
        }

        async fn invoke(&self, _args: Value) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            Ok(self.answer.to_string())
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn invoke(&self, _args: Value) -> Result<String> {
            Err(TolkError::ToolExecution {
                tool: "broken".to_string(),
                reason: "quota exceeded".to_string(),
            })
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new()
            .with_tool(Canned {
                name: "search",
                answer: "Paris is the capital of France.",
                delay: Duration::ZERO,
            })
            .unwrap()
            .with_tool(Canned {
                name: "slow",
                answer: "slow result",
                delay: Duration::from_millis(50),
            })
            .unwrap()
            .with_tool(Broken)
            .unwrap();
        Arc::new(registry)
    }

    fn call(id: &str, name: &str) -> ToolCallRequest {
        ToolCallRequest::new(id, name, r#"{"query": "capital of France"}"#)
    }

    fn asked(question: &str) -> Conversation {
        let mut conv = Conversation::new("t1");
        conv.append(Message::user(question)).unwrap();
        conv
    }

    /// Every tool result answers a call from the nearest preceding assistant message.
    fn assert_linked(conv: &Conversation) {
        let mut issued: Vec<String> = Vec::new();
        for message in conv.messages() {
            match message {
                Message::Assistant { tool_calls, .. } => {
                    issued = tool_calls.iter().map(|c| c.id.clone()).collect();
                }
                Message::Tool { tool_call_id, .. } => assert!(issued.contains(tool_call_id)),
                Message::User { .. } => {}
            }
        }
    }

    #[tokio::test]
    async fn test_capital_of_france_scenario() {
        let model = Arc::new(ScriptedModel::new([
            ModelResponse::tools(vec![call("c1", "search")]),
            ModelResponse::text("The capital of France is Paris."),
        ]));
        let agent = Agent::new(model.clone(), registry());

        let mut conv = asked("What is the capital of France?");
        let response = agent.run(&mut conv).await.unwrap();

        assert_eq!(response.content, "The capital of France is Paris.");
        assert_eq!(response.rounds, 1);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(conv.len(), 4);
        assert_eq!(conv.messages()[2].content(), "Paris is the capital of France.");
        assert_eq!(conv.messages()[2].tool_call_id(), Some("c1"));
        assert_eq!(conv.last_assistant_text(), Some("The capital of France is Paris."));

        // The second model call sees the assistant request and the tool result.
        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].len(), 3);
        assert_linked(&conv);
    }

    #[tokio::test]
    async fn test_assistant_count_is_rounds_plus_one() {
        let model = Arc::new(ScriptedModel::new([
            ModelResponse::tools(vec![call("a", "search")]),
            ModelResponse::tools(vec![call("b", "search"), call("c", "slow")]),
            ModelResponse::tools(vec![call("d", "broken")]),
            ModelResponse::text("done"),
        ]));
        let agent = Agent::new(model, registry());

        let mut conv = asked("go");
        let response = agent.run(&mut conv).await.unwrap();

        assert_eq!(response.rounds, 3);
        assert_eq!(conv.assistant_count(), response.rounds + 1);
        assert_eq!(conv.len(), 1 + 2 + 3 + 2 + 1);
        assert!(!conv.last().unwrap().has_tool_calls());
        assert_linked(&conv);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result() {
        let model = Arc::new(ScriptedModel::new([
            ModelResponse::tools(vec![call("c1", "jira")]),
            ModelResponse::text("I could not reach the tracker."),
        ]));
        let agent = Agent::new(model, registry());

        let mut conv = asked("list my issues");
        let response = agent.run(&mut conv).await.unwrap();

        let result = &conv.messages()[2];
        assert!(result.is_error());
        assert_eq!(result.content(), "Error: Unknown tool: jira");
        assert!(response.tool_calls[0].is_error);
        assert_eq!(response.content, "I could not reach the tracker.");
    }

    #[tokio::test]
    async fn test_tool_failure_is_reported_to_model() {
        let model = Arc::new(ScriptedModel::new([
            ModelResponse::tools(vec![ToolCallRequest::new("c1", "broken", "{}")]),
            ModelResponse::text("The tool failed."),
        ]));
        let agent = Agent::new(model.clone(), registry());

        let mut conv = asked("try it");
        agent.run(&mut conv).await.unwrap();

        let seen = &model.requests()[1];
        assert!(seen[2].is_error());
        assert!(seen[2].content().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_results_keep_request_order() {
        for parallel in [true, false] {
            let model = Arc::new(ScriptedModel::new([
                ModelResponse::tools(vec![call("first", "slow"), call("second", "search")]),
                ModelResponse::text("ok"),
            ]));
            let agent = Agent::new(model, registry()).with_parallel_tool_calls(parallel);

            let mut conv = asked("both");
            agent.run(&mut conv).await.unwrap();

            assert_eq!(conv.messages()[2].tool_call_id(), Some("first"));
            assert_eq!(conv.messages()[2].content(), "slow result");
            assert_eq!(conv.messages()[3].tool_call_id(), Some("second"));
        }
    }

    #[tokio::test]
    async fn test_parallel_round_overlaps_calls() {
        let model = Arc::new(ScriptedModel::new([
            ModelResponse::tools(vec![call("a", "slow"), call("b", "slow")]),
            ModelResponse::text("ok"),
        ]));
        let agent = Agent::new(model, registry()).with_parallel_tool_calls(true);

        let mut conv = asked("both");
        let started = std::time::Instant::now();
        agent.run(&mut conv).await.unwrap();

        // Two 50ms tools run back to back would take at least 100ms.
        assert!(started.elapsed() < Duration::from_millis(90));
        assert_eq!(conv.len(), 5);
    }

    #[tokio::test]
    async fn test_repeated_call_ids_are_answered_in_order() {
        let model = Arc::new(ScriptedModel::new([
            ModelResponse::tools(vec![call("", "search"), call("", "slow")]),
            ModelResponse::text("done"),
        ]));
        let agent = Agent::new(model.clone(), registry());

        let mut conv = asked("twice");
        let response = agent.run(&mut conv).await.unwrap();

        assert_eq!(response.content, "done");
        assert_eq!(response.tool_calls.len(), 2);
        assert_eq!(conv.len(), 5);
        assert_eq!(conv.messages()[2].content(), "Paris is the capital of France.");
        assert_eq!(conv.messages()[3].content(), "slow result");
        assert!(conv.pending_tool_calls().is_empty());
        assert_eq!(model.remaining(), 0);
    }

    #[tokio::test]
    async fn test_round_limit_keeps_completed_rounds() {
        let model = Arc::new(ScriptedModel::new([
            ModelResponse::tools(vec![call("a", "search")]),
            ModelResponse::tools(vec![call("b", "search")]),
            ModelResponse::tools(vec![call("c", "search")]),
        ]));
        let agent = Agent::new(model, registry()).with_max_rounds(2);

        let mut conv = asked("loop forever");
        let err = agent.run(&mut conv).await.unwrap_err();

        assert!(matches!(err, TolkError::RoundLimitExceeded { limit: 2 }));
        // user + two complete rounds, nothing from the third request
        assert_eq!(conv.len(), 5);
        assert!(conv.pending_tool_calls().is_empty());
        assert_linked(&conv);
    }

    #[tokio::test]
    async fn test_model_failure_leaves_round_unapplied() {
        let model = Arc::new(ScriptedModel::from_script([
            ScriptedReply::Respond(ModelResponse::tools(vec![call("a", "search")])),
            ScriptedReply::Fail("quota".to_string()),
        ]));
        let agent = Agent::new(model, registry());

        let mut conv = asked("q");
        let err = agent.run(&mut conv).await.unwrap_err();

        assert!(matches!(err, TolkError::ModelUnavailable(_)));
        assert_eq!(conv.len(), 3);
    }

    #[tokio::test]
    async fn test_model_timeout() {
        let model = Arc::new(ScriptedModel::from_script([ScriptedReply::Delayed(
            Duration::from_millis(500),
            ModelResponse::text("late"),
        )]));
        let agent = Agent::new(model, registry()).with_model_timeout(Duration::from_millis(20));

        let mut conv = asked("q");
        let err = agent.run(&mut conv).await.unwrap_err();

        assert!(matches!(err, TolkError::ModelTimeout(_)));
        assert_eq!(conv.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_round() {
        let model = Arc::new(ScriptedModel::from_script([ScriptedReply::Delayed(
            Duration::from_secs(5),
            ModelResponse::text("never"),
        )]));
        let agent = Agent::new(model, registry());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut conv = asked("q");
        let err = agent.run_with_cancel(&mut conv, &cancel).await.unwrap_err();

        assert!(matches!(err, TolkError::Cancelled));
        assert_eq!(conv.len(), 1);
    }

    #[tokio::test]
    async fn test_requires_pending_user_message() {
        let agent = Agent::new(Arc::new(ScriptedModel::default()), registry());
        let mut conv = Conversation::new("t1");
        assert!(matches!(
            agent.run(&mut conv).await,
            Err(TolkError::InvalidInput(_))
        ));
    }
}
