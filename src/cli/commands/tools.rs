//! Tools command: list what the model can call.

use crate::cli::Output;
use crate::config::Settings;
use crate::tools::ToolRegistry;
use console::style;

/// Print every tool enabled by the current configuration.
pub fn run_tools(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let registry = ToolRegistry::from_settings(settings)?;
    let descriptors = registry.descriptors();

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    Output::header("Tools");
    if descriptors.is_empty() {
        Output::warning("No tools enabled.");
        Output::info("Set SERPER_API_KEY to enable web search.");
        return Ok(());
    }

    for descriptor in &descriptors {
        println!("  {} {}", style("*").cyan(), style(&descriptor.name).bold());
        println!("    {}", style(&descriptor.description).dim());
    }

    Ok(())
}
