//! CLI output formatting utilities.

use crate::agent::ToolCallRecord;
use crate::conversation::{Message, Role};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print one tool call made during a turn.
    pub fn tool_call(record: &ToolCallRecord) {
        let marker = if record.is_error {
            style("!").red()
        } else {
            style("*").cyan()
        };
        println!(
            "  {} {} {}",
            marker,
            style(&record.name).bold(),
            style(preview(&record.arguments, 80)).dim()
        );
    }

    /// Print one message of a thread's history.
    pub fn message(message: &Message) {
        let label = match message.role() {
            Role::User => style("You").green().bold(),
            Role::Assistant => style("Assistant").cyan().bold(),
            Role::Tool if message.is_error() => style("Tool").red(),
            Role::Tool => style("Tool").dim(),
        };

        if message.has_tool_calls() {
            let calls: Vec<String> = message.tool_calls().iter().map(|c| c.to_string()).collect();
            println!("{}: {}", label, style(calls.join(", ")).dim());
        } else if message.role() == Role::Tool {
            println!("{}: {}", label, style(preview(message.content(), 200)).dim());
        } else {
            println!("{}: {}", label, message.content());
        }
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Single-line preview truncated on a character boundary.
fn preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let truncated: String = content.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
