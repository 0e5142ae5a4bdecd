//! Doctor command - verify credentials and configuration.

use crate::cli::Output;
use crate::config::Settings;
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Tolk Doctor");
    println!();
    println!("Checking credentials and configuration...\n");

    let mut checks = Vec::new();

    let sections = [
        ("API Configuration", check_credentials(settings)),
        ("Model", check_model(settings)),
        ("Thread Store", check_threads(settings)),
        ("Configuration", vec![check_config_file()]),
    ];

    for (title, results) in sections {
        println!("{}", style(title).bold());
        for check in &results {
            check.print();
        }
        println!();
        checks.extend(results);
    }

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Tolk.",
            errors
        ));
        anyhow::bail!("doctor found {} error(s)", errors);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Tolk is ready to use.");
    }

    Ok(())
}

/// Check model and search credentials.
fn check_credentials(settings: &Settings) -> Vec<CheckResult> {
    let model_key = match settings.model_api_key() {
        Some(key) if key.starts_with("sk-") && key.len() > 20 => {
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", mask(&key)))
        }
        Some(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        None if settings.model.api_base.is_some() => CheckResult::warning(
            "OPENAI_API_KEY",
            "not set",
            "Fine if your custom endpoint needs no key",
        ),
        None => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    };

    let search_key = match settings.search_api_key() {
        Some(key) => CheckResult::ok(
            "SERPER_API_KEY",
            &format!("configured ({}), search tool enabled", mask(&key)),
        ),
        None => CheckResult::warning(
            "SERPER_API_KEY",
            "not set, search tool disabled",
            "Set with: export SERPER_API_KEY='...'",
        ),
    };

    vec![model_key, search_key]
}

fn check_model(settings: &Settings) -> Vec<CheckResult> {
    let endpoint = settings
        .model
        .api_base
        .as_deref()
        .unwrap_or("https://api.openai.com/v1");

    vec![
        CheckResult::ok("Model", &settings.model.model),
        CheckResult::ok("Endpoint", endpoint),
        CheckResult::ok(
            "Limits",
            &format!(
                "{} tool rounds, {}s per model call",
                settings.agent.max_rounds, settings.model.timeout_seconds
            ),
        ),
    ]
}

fn check_threads(settings: &Settings) -> Vec<CheckResult> {
    if !settings.threads.persist {
        return vec![CheckResult::ok("Journal", "disabled (threads kept in memory)")];
    }

    let db_path = settings.sqlite_path();
    if db_path.exists() {
        let size = std::fs::metadata(&db_path)
            .map(|m| format_size(m.len()))
            .unwrap_or_else(|_| "unknown size".to_string());
        vec![CheckResult::ok(
            "Journal",
            &format!("{} ({})", db_path.display(), size),
        )]
    } else {
        vec![CheckResult::warning(
            "Journal",
            &format!("{} (not created yet)", db_path.display()),
            "Journal will be created on first chat turn",
        )]
    }
}

/// Check if config file exists.
fn check_config_file() -> CheckResult {
    let config_path = Settings::default_config_path();
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: tolk config init (or tolk config edit)",
        )
    }
}

/// Show only the ends of a credential.
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 11 {
        return "***".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
