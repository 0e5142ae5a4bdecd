//! Configuration module for Tolk.
//!
//! Settings come from a TOML file, with credentials and model selection
//! overridable from the environment (including a `.env` file).

mod settings;

pub use settings::{
    AgentSettings, GeneralSettings, ModelSettings, SearchSettings, ServerSettings, Settings,
    ThreadSettings, ToolSettings,
};

/// Load a `.env` file from the working directory (or its parents), if present.
///
/// Values from the file replace variables already set in the environment.
pub fn load_dotenv() -> Option<std::path::PathBuf> {
    dotenvy::dotenv_override().ok()
}
