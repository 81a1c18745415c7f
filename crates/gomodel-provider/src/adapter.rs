use async_trait::async_trait;

use gomodel_common::GatewayError;
use gomodel_protocol::{
    ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, ModelCategory,
    ResponsesRequest, ResponsesResponse,
};
use gomodel_resilience::{ByteStream, CallFailure};

/// Per-request context threaded through the call chain. Cancellation is the
/// future being dropped; there is no separate token.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub endpoint: String,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// One model as reported by a provider's catalog call.
#[derive(Debug, Clone)]
pub struct DiscoveredModel {
    pub id: String,
    pub owned_by: String,
    pub created: i64,
    pub category: ModelCategory,
}

/// Uniform capability surface over heterogeneous upstream APIs.
///
/// Adapters are stateless with respect to a given request: they hold
/// configuration, credentials, the shared HTTP client and their resilience
/// settings, nothing else. Operations an upstream does not offer keep the
/// default `Unsupported` body.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Configured instance name (unique per gateway).
    fn name(&self) -> &str;

    /// Provider-type tag driving dialect-specific behavior ("openai", ...).
    fn provider_type(&self) -> &'static str;

    async fn chat(&self, ctx: &RequestContext, req: ChatRequest)
    -> Result<ChatResponse, GatewayError>;

    async fn stream_chat(
        &self,
        _ctx: &RequestContext,
        _req: ChatRequest,
    ) -> Result<ByteStream, GatewayError> {
        Err(unsupported(self.name(), "stream_chat"))
    }

    async fn responses(
        &self,
        _ctx: &RequestContext,
        _req: ResponsesRequest,
    ) -> Result<ResponsesResponse, GatewayError> {
        Err(unsupported(self.name(), "responses"))
    }

    async fn stream_responses(
        &self,
        _ctx: &RequestContext,
        _req: ResponsesRequest,
    ) -> Result<ByteStream, GatewayError> {
        Err(unsupported(self.name(), "stream_responses"))
    }

    async fn embeddings(
        &self,
        _ctx: &RequestContext,
        _req: EmbeddingsRequest,
    ) -> Result<EmbeddingsResponse, GatewayError> {
        Err(unsupported(self.name(), "embeddings"))
    }

    async fn list_models(&self, ctx: &RequestContext)
    -> Result<Vec<DiscoveredModel>, GatewayError>;
}

pub(crate) fn unsupported(provider: &str, operation: &str) -> GatewayError {
    GatewayError::invalid_request(format!(
        "operation {operation} is not supported by provider {provider}"
    ))
}

/// Maps a resilience-layer failure to the client-facing taxonomy.
pub(crate) fn failure_to_error(provider: &str, failure: CallFailure) -> GatewayError {
    match failure {
        CallFailure::CircuitOpen { .. } => GatewayError::circuit_open(provider),
        CallFailure::Transport { message, .. } => {
            GatewayError::provider(None, format!("upstream transport error: {message}"))
        }
        CallFailure::Http { status, body, .. } => {
            let detail = upstream_message(&body)
                .unwrap_or_else(|| format!("upstream returned status {status}"));
            match status {
                429 => GatewayError::rate_limit(detail),
                401 | 403 => GatewayError::provider(
                    None,
                    format!("upstream rejected provider credentials: {detail}"),
                ),
                400..=499 => GatewayError::invalid_request(detail),
                _ => GatewayError::provider(Some(status), detail),
            }
        }
    }
}

/// Best-effort extraction of the upstream error message from a JSON error
/// envelope (both OpenAI and Anthropic nest it under `error.message`).
fn upstream_message(body: &bytes::Bytes) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(|message| message.as_str())
        .map(str::to_string)
}
