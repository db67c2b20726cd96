//! Completion service access with streaming responses.
//!
//! Provides the prompt template, provider configuration, and streaming
//! clients for the external LLM APIs. No local model required.

pub mod auth;
pub mod config;
pub mod prompt;
pub mod providers;
pub mod types;

pub use auth::{is_service_account_key, AccessTokenSource, BoxedFuture, ServiceAccountTokens};
pub use config::LLMConfig;
pub use prompt::{PromptTemplate, DEFAULT_PROMPT};
pub use providers::{
    check_credentials, BoxedStream, CompletionBackend, HttpCompletionClient, StreamChunk,
};
pub use types::*;
