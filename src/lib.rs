//! Tolk - a tool-calling chat agent
//!
//! A small agent runtime: a language model answers user messages and may call
//! tools before replying, with each conversation thread remembered between turns.
//!
//! The name "Tolk" is the Norwegian/Scandinavian word for "interpreter."
//!
//! # Architecture
//!
//! - `conversation` - Messages and the append-only per-thread history
//! - `tools` - Tool trait, registry and the web search adapter
//! - `model` - Model client boundary (OpenAI and a scripted client)
//! - `agent` - The bounded model/tool loop
//! - `threads` - Thread store with optional SQLite journal
//! - `chat` - One user turn against one thread
//! - `config` - Configuration management
//! - `cli` - Terminal and HTTP front ends
//!
//! # Example
//!
//! ```rust,no_run
//! use tolk::chat::ChatService;
//! use tolk::config::Settings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let chat = ChatService::from_settings(&settings)?;
//!
//!     let reply = chat.submit("1", "What is the capital of France?").await?;
//!     println!("{}", reply);
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod chat;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod model;
pub mod openai;
pub mod threads;
pub mod tools;

pub use error::{Result, TolkError};
