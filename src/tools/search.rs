//! Web search tool backed by the Serper API.

use super::Tool;
use crate::config::SearchSettings;
use crate::error::{Result, TolkError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

const NO_RESULT: &str = "No good Google Search Result was found";

/// Pass-through web search over the Serper endpoint.
pub struct SerperSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    num_results: u32,
    gl: String,
    hl: String,
}

impl SerperSearch {
    /// Create a search tool from settings and a resolved API key.
    pub fn new(settings: &SearchSettings, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: api_key.to_string(),
            num_results: settings.num_results,
            gl: settings.gl.clone(),
            hl: settings.hl.clone(),
        })
    }
}

#[async_trait]
impl Tool for SerperSearch {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Used to get info from online search. \
         Use this for current events or facts you are unsure about."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    #[instrument(skip(self, args))]
    async fn invoke(&self, args: Value) -> Result<String> {
        let query = args["query"].as_str().unwrap_or_default();

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({
                "q": query,
                "gl": self.gl,
                "hl": self.hl,
                "num": self.num_results,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TolkError::ToolExecution {
                tool: "search".to_string(),
                reason: format!("search API returned {}", status),
            });
        }

        let body: Value = response.json().await?;
        debug!("Search for '{}' returned", query);

        Ok(flatten_results(&body, self.num_results as usize))
    }
}

/// Flatten a Serper response into plain text snippets.
///
/// A direct answer box wins outright; otherwise knowledge-graph facts and
/// organic snippets are joined in that order.
fn flatten_results(body: &Value, limit: usize) -> String {
    if let Some(answer_box) = body.get("answerBox") {
        for key in ["answer", "snippet"] {
            if let Some(text) = answer_box.get(key).and_then(Value::as_str) {
                return text.replace('\n', " ");
            }
        }
        if let Some(highlights) = answer_box.get("snippetHighlighted").and_then(Value::as_array) {
            let joined = highlights
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            if !joined.is_empty() {
                return joined;
            }
        }
    }

    let mut snippets = Vec::new();

    if let Some(kg) = body.get("knowledgeGraph") {
        let title = kg.get("title").and_then(Value::as_str).unwrap_or_default();
        if let Some(entity_type) = kg.get("type").and_then(Value::as_str) {
            snippets.push(format!("{}: {}.", title, entity_type));
        }
        if let Some(description) = kg.get("description").and_then(Value::as_str) {
            snippets.push(description.to_string());
        }
        if let Some(attributes) = kg.get("attributes").and_then(Value::as_object) {
            for (attribute, value) in attributes {
                if let Some(value) = value.as_str() {
                    snippets.push(format!("{} {}: {}.", title, attribute, value));
                }
            }
        }
    }

    if let Some(organic) = body.get("organic").and_then(Value::as_array) {
        snippets.extend(
            organic
                .iter()
                .take(limit)
                .filter_map(|r| r.get("snippet").and_then(Value::as_str))
                .map(str::to_string),
        );
    }

    if snippets.is_empty() {
        NO_RESULT.to_string()
    } else {
        snippets.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_box_wins() {
        let body = json!({
            "answerBox": { "answer": "Paris" },
            "organic": [{ "snippet": "Paris is the capital of France." }]
        });
        assert_eq!(flatten_results(&body, 5), "Paris");
    }

    #[test]
    fn test_knowledge_graph_and_organic() {
        let body = json!({
            "knowledgeGraph": {
                "title": "Paris",
                "type": "Capital of France",
                "attributes": { "Population": "2.1 million" }
            },
            "organic": [
                { "snippet": "Paris is the capital of France." },
                { "snippet": "second" },
                { "snippet": "third" }
            ]
        });
        assert_eq!(
            flatten_results(&body, 2),
            "Paris: Capital of France. Paris Population: 2.1 million. \
             Paris is the capital of France. second"
        );
    }

    #[test]
    fn test_empty_response() {
        assert_eq!(flatten_results(&json!({}), 5), NO_RESULT);
    }
}
