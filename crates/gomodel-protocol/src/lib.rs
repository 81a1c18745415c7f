//! OpenAI-compatible wire types.
//!
//! These are the gateway's normalized DTOs: the northbound edge parses into
//! them, guardrails rewrite them, and provider adapters translate them to and
//! from upstream dialects. Unknown fields are preserved through
//! `#[serde(flatten)]` maps so the gateway never silently strips data it does
//! not model.

pub mod chat;
pub mod embeddings;
pub mod models;
pub mod responses;

pub use chat::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, ChatRole, ChatUsage,
    CompletionTokensDetails, PromptTokensDetails, ToolCall, ToolCallFunction,
};
pub use embeddings::{
    Embedding, EmbeddingInput, EmbeddingUsage, EmbeddingVector, EmbeddingsRequest,
    EmbeddingsResponse, EncodingFormat,
};
pub use models::{ModelCategory, ModelInfo, ModelList};
pub use responses::{
    ResponseInput, ResponsesRequest, ResponsesResponse, ResponsesUsage,
};
