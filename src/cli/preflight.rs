//! Pre-flight checks before talking to the model.
//!
//! Validates that credentials are available before starting a turn that would
//! otherwise fail on the first model call.

use crate::config::Settings;
use crate::error::{Result, TolkError};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Chatting requires a model API key.
    Chat,
    /// Serving requires a model API key and a valid bind address.
    Serve,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    check_api_key(settings)?;

    if let Operation::Serve = operation {
        let addr = format!("{}:{}", settings.server.host, settings.server.port);
        addr.parse::<std::net::SocketAddr>()
            .map_err(|e| TolkError::Config(format!("Invalid bind address {}: {}", addr, e)))?;
    }

    Ok(())
}

/// Check that a model API key is configured.
///
/// Custom endpoints may not need one, so a configured `api_base` passes.
fn check_api_key(settings: &Settings) -> Result<()> {
    if settings.model_api_key().is_some() || settings.model.api_base.is_some() {
        return Ok(());
    }
    Err(TolkError::Config(
        "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
    ))
}
