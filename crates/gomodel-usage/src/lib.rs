//! Token usage extraction and granular cost attribution.
//!
//! Two synchronous paths (chat/responses/embeddings responses) and one
//! streaming path (an incremental SSE scanner that finds the terminal usage
//! payload without buffering the stream) feed the same cost engine.

pub mod cost;
pub mod entry;
pub mod extract;
pub mod pricing;
pub mod stream;

pub use cost::{CostBreakdown, compute_cost, extended_usage_fields, provider_mappings};
pub use entry::UsageEntry;
pub use extract::{
    ExtractedUsage, from_chat_response, from_embeddings_response, from_responses_response,
};
pub use pricing::ModelPricing;
pub use stream::{SseUsageScanner, UsageCaptureStream};
