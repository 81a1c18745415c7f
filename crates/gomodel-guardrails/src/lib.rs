//! Pre-call request transforms over a normalized message list.
//!
//! Guardrails are grouped by `order`; groups run sequentially, siblings
//! within a group concurrently. Guardrails never mutate the caller's
//! request: the adapters clone and rebuild.

pub mod adapt;
pub mod pipeline;
pub mod system_prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gomodel_common::GatewayError;

pub use adapt::{
    apply_messages_to_chat, apply_messages_to_responses, messages_from_chat,
    messages_from_responses,
};
pub use pipeline::GuardrailPipeline;
pub use system_prompt::{SystemPromptGuardrail, SystemPromptMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// The normalized DTO guardrails operate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A pre-call transform or reject. `apply` receives an owned snapshot of the
/// message list and returns the transformed list, or an error that blocks
/// the request.
#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;

    fn order(&self) -> i32;

    async fn apply(&self, messages: Vec<Message>) -> Result<Vec<Message>, GatewayError>;
}
