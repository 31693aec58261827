//! AI module for FLOAT
//!
//! Everything that talks to the language model lives here.
//!
//! # Architecture
//!
//! - `client` - `CompletionClient`: credential checks, error taxonomy, advisory strings
//! - `prompt` - pure prompt builders for chat and analysis requests
//! - `providers` - transports behind the `LLMBackend` trait (Rig OpenAI, custom endpoint)
//!
//! # Usage
//!
//! ```rust,no_run
//! use float::ai::CompletionClient;
//! use float::config::Settings;
//!
//! # async fn example() {
//! let client = CompletionClient::from_settings(&Settings::from_env());
//! let reply = client.reply(&[], &[]).await;
//! # }
//! ```

mod client;
pub mod prompt;
pub mod providers;

// Re-export main types
pub use client::{
    CompletionClient, CompletionError, CompletionResult, CredentialSource, MALFORMED_KEY_ADVISORY,
    MISSING_KEY_ADVISORY, MISSING_KEY_MARKER, REJECTED_KEY_ADVISORY, UPSTREAM_ADVISORY,
    validate_credential,
};
pub use providers::{CompletionRequest, LLMBackend, ProviderClient};
