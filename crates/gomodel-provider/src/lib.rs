//! Provider adapters and the model registry.
//!
//! An adapter translates the gateway's normalized DTOs to one upstream
//! dialect and back, routing every outbound call through the resilience
//! engine. The registry owns the model-id → adapter mapping as immutable
//! epoch snapshots published by atomic pointer swap.

pub mod adapter;
pub mod anthropic;
pub mod openai;
pub mod registry;

pub use adapter::{DiscoveredModel, ProviderAdapter, RequestContext};
pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use registry::{ModelRegistry, RegistryEpoch};
