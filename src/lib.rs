//! turnstile: a middleware-pipelined agent turn executor.
//!
//! A turn appends a user message, calls the model through a chain of
//! middleware, runs the tools it asks for and loops until the model answers.
//! Tool calls listed in the interrupt policy pause the turn; the caller
//! approves, rejects or edits them and resumes, possibly from another
//! process, since every transition is checkpointed per thread.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use turnstile::prelude::*;
//! use turnstile::provider::openai::OpenAiProvider;
//!
//! # async fn example() -> turnstile::error::Result<()> {
//! let provider = Arc::new(OpenAiProvider::new("gpt-4o-mini", "sk-...", None));
//! let executor = TurnExecutor::builder(ModelRouter::new(provider))
//!     .tool(turnstile::tools::builtin::write_file_tool())
//!     .interrupt_policy(InterruptPolicy::new().on("write_file"))
//!     .build()?;
//!
//! let result = executor
//!     .start_turn("thread-1", "Save a haiku to haiku.txt", serde_json::json!({}))
//!     .await?;
//! if let TurnResult::Suspended { interrupts } = result {
//!     let decisions = interrupts
//!         .iter()
//!         .map(|interrupt| (interrupt.id.clone(), Decision::Approve))
//!         .collect();
//!     executor.resume_turn("thread-1", decisions).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod middleware;
pub mod prelude;
pub mod provider;
pub mod retrieval;
pub mod store;
pub mod structured;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
