//! Ask command implementation.

use crate::chat::ChatService;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;

/// Run the ask command: one turn, then print the answer and the tools used.
pub async fn run_ask(
    message: &str,
    thread: Option<String>,
    model: Option<String>,
    mut settings: Settings,
) -> Result<()> {
    if let Some(model) = model {
        settings.model.model = model;
    }

    if let Err(e) = preflight::check(Operation::Chat, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'tolk doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let chat = ChatService::from_settings(&settings)?;
    let thread_id = thread.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let spinner = Output::spinner("Thinking...");

    match chat.submit_turn(&thread_id, message).await {
        Ok(response) => {
            spinner.finish_and_clear();

            println!("\n{}\n", response.content);

            if !response.tool_calls.is_empty() {
                Output::header(&format!("Tool calls ({} round(s))", response.rounds));
                for record in &response.tool_calls {
                    Output::tool_call(record);
                }
            }
            if chat.store().is_persistent() {
                Output::kv("Thread", &thread_id);
            }
        }
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
