//! Tool-augmented conversation loop.
//!
//! The [`Agent`] asks the model for the next step, runs any requested tools,
//! appends the round to the conversation and repeats until the model answers
//! without requesting tools or the round limit is reached.

mod runner;
mod step;

pub use runner::{Agent, AgentResponse, ToolCallRecord};
pub use step::LoopStep;
