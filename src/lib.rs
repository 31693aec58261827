//! FLOAT: a personal knowledge-management chat backend.
//!
//! The user's messages live in a [`session::Session`]; answers come from the
//! language model through [`ai::CompletionClient`] and are replayed word by
//! word by [`chunker::ResponseChunker`]. [`analysis::run_analysis`] derives
//! insights, patterns and contradictions from the same history.

pub mod ai;
pub mod analysis;
pub mod chunker;
pub mod config;
pub mod server;
pub mod session;
pub mod types;
