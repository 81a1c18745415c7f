use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use gomodel_common::GatewayError;
use gomodel_protocol::{
    ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, ModelCategory,
    ResponsesRequest, ResponsesResponse,
};
use gomodel_resilience::{
    ByteStream, HttpMethod, HttpRequest, HttpResponse, HttpResponseBody, ResilienceEngine,
    SharedHttpClient,
};

use crate::adapter::{
    DiscoveredModel, ProviderAdapter, RequestContext, failure_to_error,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Native-dialect adapter: the normalized DTOs already are OpenAI wire
/// format, so requests pass through and streaming is a byte passthrough.
pub struct OpenAiProvider {
    name: String,
    base_url: String,
    api_key: String,
    http: SharedHttpClient,
    resilience: Arc<ResilienceEngine>,
}

impl OpenAiProvider {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
        http: SharedHttpClient,
        resilience: Arc<ResilienceEngine>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.into(),
            http,
            resilience,
        }
    }

    fn request(&self, method: HttpMethod, path: &str, body: Option<Bytes>, stream: bool) -> HttpRequest {
        HttpRequest {
            method,
            url: format!("{}{path}", self.base_url),
            headers: vec![
                (
                    "authorization".to_string(),
                    format!("Bearer {}", self.api_key),
                ),
                ("content-type".to_string(), "application/json".to_string()),
            ],
            body,
            want_stream: stream,
        }
    }

    async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Bytes>,
        stream: bool,
    ) -> Result<HttpResponse, GatewayError> {
        let request = self.request(method, path, body, stream);
        let http = self.http.clone();
        self.resilience
            .execute(&self.name, move |_attempt| {
                let http = http.clone();
                let request = request.clone();
                async move { http.send(request).await }
            })
            .await
            .map_err(|failure| failure_to_error(&self.name, failure))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: Bytes,
    ) -> Result<T, GatewayError> {
        let response = self.execute(HttpMethod::Post, path, Some(body), false).await?;
        decode_body(response)
    }

    async fn post_stream(&self, path: &str, body: Bytes) -> Result<ByteStream, GatewayError> {
        let response = self.execute(HttpMethod::Post, path, Some(body), true).await?;
        match response.body {
            HttpResponseBody::Stream(stream) => Ok(stream),
            // A non-streamed 2xx still satisfies the contract as one chunk.
            HttpResponseBody::Bytes(bytes) => {
                let (tx, rx) = tokio::sync::mpsc::channel(1);
                let _ = tx.try_send(bytes);
                Ok(rx)
            }
        }
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(response: HttpResponse) -> Result<T, GatewayError> {
    let HttpResponseBody::Bytes(bytes) = response.body else {
        return Err(GatewayError::provider(
            None,
            "expected a buffered upstream response",
        ));
    };
    serde_json::from_slice(&bytes).map_err(|err| {
        GatewayError::provider(None, format!("undecodable upstream response: {err}"))
    })
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes, GatewayError> {
    match serde_json::to_vec(value) {
        Ok(body) => Ok(Bytes::from(body)),
        Err(err) => {
            tracing::error!(error = %err, "request serialization failed");
            Err(GatewayError::internal())
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireModelList {
    #[serde(default)]
    data: Vec<WireModel>,
}

#[derive(Debug, Deserialize)]
struct WireModel {
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    owned_by: String,
}

/// The catalog endpoint carries no category; classify from the id and fall
/// back to `all` when nothing matches.
fn classify_model(id: &str) -> ModelCategory {
    let id = id.to_ascii_lowercase();
    if id.contains("embed") {
        ModelCategory::Embedding
    } else if id.contains("whisper") || id.contains("tts") || id.contains("audio") {
        ModelCategory::Audio
    } else if id.contains("dall-e") || id.contains("image") {
        ModelCategory::Image
    } else if id.contains("instruct") || id.starts_with("babbage") || id.starts_with("davinci") {
        ModelCategory::Completion
    } else if id.contains("gpt") || id.starts_with("o1") || id.starts_with("o3") || id.starts_with("o4") {
        ModelCategory::Chat
    } else {
        ModelCategory::All
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> &'static str {
        "openai"
    }

    async fn chat(
        &self,
        _ctx: &RequestContext,
        mut req: ChatRequest,
    ) -> Result<ChatResponse, GatewayError> {
        req.stream = None;
        self.post_json("/v1/chat/completions", encode(&req)?).await
    }

    async fn stream_chat(
        &self,
        _ctx: &RequestContext,
        mut req: ChatRequest,
    ) -> Result<ByteStream, GatewayError> {
        req.stream = Some(true);
        self.post_stream("/v1/chat/completions", encode(&req)?).await
    }

    async fn responses(
        &self,
        _ctx: &RequestContext,
        mut req: ResponsesRequest,
    ) -> Result<ResponsesResponse, GatewayError> {
        req.stream = None;
        self.post_json("/v1/responses", encode(&req)?).await
    }

    async fn stream_responses(
        &self,
        _ctx: &RequestContext,
        mut req: ResponsesRequest,
    ) -> Result<ByteStream, GatewayError> {
        req.stream = Some(true);
        self.post_stream("/v1/responses", encode(&req)?).await
    }

    async fn embeddings(
        &self,
        _ctx: &RequestContext,
        req: EmbeddingsRequest,
    ) -> Result<EmbeddingsResponse, GatewayError> {
        self.post_json("/v1/embeddings", encode(&req)?).await
    }

    async fn list_models(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Vec<DiscoveredModel>, GatewayError> {
        let response = self.execute(HttpMethod::Get, "/v1/models", None, false).await?;
        let list: WireModelList = decode_body(response)?;
        Ok(list
            .data
            .into_iter()
            .map(|model| DiscoveredModel {
                category: classify_model(&model.id),
                owned_by: if model.owned_by.is_empty() {
                    "openai".to_string()
                } else {
                    model.owned_by
                },
                created: model.created,
                id: model.id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_covers_the_catalog_shapes() {
        assert_eq!(classify_model("text-embedding-3-small"), ModelCategory::Embedding);
        assert_eq!(classify_model("whisper-1"), ModelCategory::Audio);
        assert_eq!(classify_model("gpt-4o-mini-tts"), ModelCategory::Audio);
        assert_eq!(classify_model("dall-e-3"), ModelCategory::Image);
        assert_eq!(classify_model("gpt-3.5-turbo-instruct"), ModelCategory::Completion);
        assert_eq!(classify_model("gpt-4o"), ModelCategory::Chat);
        assert_eq!(classify_model("o3-mini"), ModelCategory::Chat);
        assert_eq!(classify_model("mystery"), ModelCategory::All);
    }
}
