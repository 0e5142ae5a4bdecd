//! Interactive chat command.

use crate::chat::ChatService;
use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::TolkError;
use console::style;
use std::io::{self, BufRead, Write};
use tokio_util::sync::CancellationToken;

/// Run the interactive chat command.
pub async fn run_chat(
    thread: Option<String>,
    model: Option<String>,
    mut settings: Settings,
) -> anyhow::Result<()> {
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

    println!("\n{}", style("Tolk Chat").bold().cyan());
    Output::kv("Thread", &thread_id);
    Output::kv("Model", chat.agent().model_name());
    println!(
        "{}\n",
        style("Type a message, or 'exit' to quit. 'clear' resets the thread, 'history' shows it.")
            .dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            chat.reset(&thread_id).await?;
            Output::info("Conversation history cleared.");
            continue;
        }

        if input.eq_ignore_ascii_case("history") {
            match chat.history(&thread_id).await? {
                Some(conversation) if !conversation.is_empty() => {
                    println!();
                    for message in conversation.messages() {
                        Output::message(message);
                    }
                    println!();
                }
                _ => Output::info("No messages yet."),
            }
            continue;
        }

        // Ctrl+C aborts the running turn instead of the whole session.
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let spinner = Output::spinner("Thinking...");
        let result = chat.submit_with_cancel(&thread_id, input, &cancel).await;
        spinner.finish_and_clear();
        watcher.abort();

        match result {
            Ok(response) => {
                for record in &response.tool_calls {
                    Output::tool_call(record);
                }
                println!("\n{} {}\n", style("Tolk:").cyan().bold(), response.content);
            }
            Err(TolkError::Cancelled) => {
                Output::warning("Cancelled. The thread is unchanged.");
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
                if e.is_transient() {
                    Output::info("The thread is unchanged; you can retry the message.");
                }
            }
        }
    }

    Ok(())
}
