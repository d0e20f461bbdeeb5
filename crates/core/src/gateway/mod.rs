//! # Provider Gateway
//!
//! Uniform chat-completion interface to external generation services.
//! Owns per-call timeouts and error translation; performs no retries -
//! a failed call simply removes that provider from the current turn.

pub mod error;
pub mod openrouter;

use async_trait::async_trait;

pub use error::ProviderError;
pub use openrouter::OpenRouterGateway;

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message sent to a provider
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Trait for chat completion providers.
///
/// The pipeline only ever talks to this seam, so tests can swap in a
/// scripted provider and the server can swap gateways without touching
/// pipeline code.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a prompt to `model` and return the assistant's answer text.
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}
