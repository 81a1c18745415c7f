use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gomodel_common::GatewayError;

use crate::{Guardrail, Message, MessageRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemPromptMode {
    /// Add a system message at position 0 iff none exists.
    Inject,
    /// Remove all system messages, insert one at position 0.
    Override,
    /// Prepend content and a newline to the first existing system message;
    /// falls back to `Inject` when there is none.
    Decorator,
}

pub struct SystemPromptGuardrail {
    name: String,
    order: i32,
    mode: SystemPromptMode,
    content: String,
}

impl SystemPromptGuardrail {
    pub fn new(
        name: impl Into<String>,
        order: i32,
        mode: SystemPromptMode,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            order,
            mode,
            content: content.into(),
        }
    }
}

#[async_trait]
impl Guardrail for SystemPromptGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    async fn apply(&self, mut messages: Vec<Message>) -> Result<Vec<Message>, GatewayError> {
        match self.mode {
            SystemPromptMode::Inject => {
                if !has_system(&messages) {
                    messages.insert(0, Message::new(MessageRole::System, self.content.clone()));
                }
            }
            SystemPromptMode::Override => {
                messages.retain(|m| m.role != MessageRole::System);
                messages.insert(0, Message::new(MessageRole::System, self.content.clone()));
            }
            SystemPromptMode::Decorator => {
                match messages.iter_mut().find(|m| m.role == MessageRole::System) {
                    Some(system) => {
                        system.content = format!("{}\n{}", self.content, system.content);
                    }
                    None => {
                        messages.insert(0, Message::new(MessageRole::System, self.content.clone()));
                    }
                }
            }
        }
        Ok(messages)
    }
}

fn has_system(messages: &[Message]) -> bool {
    messages.iter().any(|m| m.role == MessageRole::System)
}
