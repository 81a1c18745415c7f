use axum::Json;
use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::de::DeserializeOwned;

use gomodel_common::GatewayError;
use gomodel_core::SharedState;
use gomodel_guardrails::{
    apply_messages_to_chat, apply_messages_to_responses, messages_from_chat,
    messages_from_responses,
};
use gomodel_protocol::{ChatRequest, EmbeddingsRequest, ResponsesRequest};
use gomodel_provider::RequestContext;
use gomodel_usage::{ExtractedUsage, UsageCaptureStream, UsageEntry};

use crate::error::ApiError;
use crate::layers::RequestId;

const CHAT_ENDPOINT: &str = "/v1/chat/completions";
const RESPONSES_ENDPOINT: &str = "/v1/responses";
const EMBEDDINGS_ENDPOINT: &str = "/v1/embeddings";

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| {
        ApiError(GatewayError::invalid_request(format!("invalid request body: {err}")))
    })
}

fn sse_response(body: Body) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

/// Builds the capture sink that turns the stream's final usage into a
/// ledger entry. Runs at stream close (EOF or client disconnect).
fn usage_sink(
    state: &SharedState,
    request_id: &str,
    provider: &str,
    provider_type: &'static str,
    endpoint: &'static str,
    model: &str,
) -> impl FnOnce(Option<ExtractedUsage>) + Send + 'static {
    let logger = state.usage_logger.clone();
    let pricing = state.pricing_for(model).cloned();
    let request_id = request_id.to_string();
    let provider = provider.to_string();
    let model = model.to_string();
    move |extracted| {
        if let Some(extracted) = extracted {
            logger.write(UsageEntry::from_extracted(
                &request_id,
                &provider,
                provider_type,
                endpoint,
                &model,
                extracted,
                pricing.as_ref(),
            ));
        }
    }
}

fn record_usage(
    state: &SharedState,
    request_id: &str,
    provider: &str,
    provider_type: &'static str,
    endpoint: &str,
    model: &str,
    extracted: Option<ExtractedUsage>,
) {
    if let Some(extracted) = extracted {
        let pricing = state.pricing_for(model);
        state.usage_logger.write(UsageEntry::from_extracted(
            request_id,
            provider,
            provider_type,
            endpoint,
            model,
            extracted,
            pricing,
        ));
    }
}

pub async fn chat_completions(
    State(state): State<SharedState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: ChatRequest = parse_body(&body)?;
    let req = if state.guardrails.is_empty() {
        req
    } else {
        let messages = state.guardrails.run(messages_from_chat(&req)).await?;
        apply_messages_to_chat(&req, messages)
    };

    let provider = state.router.route(&req.model)?;
    let ctx = RequestContext::new(request_id.clone(), CHAT_ENDPOINT);
    let model = req.model.clone();

    if req.wants_stream() {
        let stream = provider.stream_chat(&ctx, req).await?;
        let sink = usage_sink(
            &state,
            &request_id,
            provider.name(),
            provider.provider_type(),
            CHAT_ENDPOINT,
            &model,
        );
        return Ok(sse_response(Body::from_stream(UsageCaptureStream::new(
            stream, sink,
        ))));
    }

    let resp = provider.chat(&ctx, req).await?;
    record_usage(
        &state,
        &request_id,
        provider.name(),
        provider.provider_type(),
        CHAT_ENDPOINT,
        &model,
        gomodel_usage::from_chat_response(&resp),
    );
    Ok(Json(resp).into_response())
}

pub async fn responses(
    State(state): State<SharedState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: ResponsesRequest = parse_body(&body)?;
    let req = if state.guardrails.is_empty() {
        req
    } else {
        let messages = state.guardrails.run(messages_from_responses(&req)).await?;
        apply_messages_to_responses(&req, messages)
    };

    let provider = state.router.route(&req.model)?;
    let ctx = RequestContext::new(request_id.clone(), RESPONSES_ENDPOINT);
    let model = req.model.clone();

    if req.wants_stream() {
        let stream = provider.stream_responses(&ctx, req).await?;
        let sink = usage_sink(
            &state,
            &request_id,
            provider.name(),
            provider.provider_type(),
            RESPONSES_ENDPOINT,
            &model,
        );
        return Ok(sse_response(Body::from_stream(UsageCaptureStream::new(
            stream, sink,
        ))));
    }

    let resp = provider.responses(&ctx, req).await?;
    record_usage(
        &state,
        &request_id,
        provider.name(),
        provider.provider_type(),
        RESPONSES_ENDPOINT,
        &model,
        gomodel_usage::from_responses_response(&resp),
    );
    Ok(Json(resp).into_response())
}

pub async fn embeddings(
    State(state): State<SharedState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: EmbeddingsRequest = parse_body(&body)?;
    let provider = state.router.route(&req.model)?;
    let ctx = RequestContext::new(request_id.clone(), EMBEDDINGS_ENDPOINT);
    let model = req.model.clone();

    let resp = provider.embeddings(&ctx, req).await?;
    record_usage(
        &state,
        &request_id,
        provider.name(),
        provider.provider_type(),
        EMBEDDINGS_ENDPOINT,
        &model,
        gomodel_usage::from_embeddings_response(&resp),
    );
    Ok(Json(resp).into_response())
}

pub async fn list_models(State(state): State<SharedState>) -> Response {
    Json(state.router.models()).into_response()
}

pub async fn health() -> Response {
    Json(serde_json::json!({"status": "ok"})).into_response()
}
