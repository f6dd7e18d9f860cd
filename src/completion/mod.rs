//! Language-model completion: the service contract the orchestrator calls
//! and its OpenAI-compatible HTTP implementation.

pub mod openai;

pub use openai::OpenAiCompletion;

use crate::error::CompletionError;
use std::future::Future;
use std::pin::Pin;

/// Generated text plus the token accounting the audit log keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

pub trait CompletionService: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Complete a single user prompt under the given system prompt.
    fn complete<'a>(
        &'a self,
        system_prompt: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, CompletionError>> + Send + 'a>>;
}
