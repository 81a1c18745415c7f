use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use gomodel_common::{
    AuditEntry, GatewayError, ensure_request_id, redact_headers,
};
use gomodel_core::SharedState;

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Accepts or mints the request id and stamps it on the response,
/// including error envelopes and SSE responses.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = ensure_request_id(
        req.headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok()),
    );
    req.extensions_mut().insert(RequestId(id.clone()));
    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    resp
}

/// Master-key gate. `/health` stays open; everything else must present the
/// configured key as a bearer token.
pub async fn auth(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let Some(master_key) = state.config.server.master_key.as_deref() else {
        return next.run(req).await;
    };
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }
    let presented = bearer_token(&req);
    match presented {
        Some(key) if key == master_key => next.run(req).await,
        _ => ApiError(GatewayError::authentication("missing or invalid API key"))
            .into_response(),
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Captures one audit entry per exchange. Bodies and headers are captured
/// only when their config flags are set; sensitive headers are redacted
/// before they leave this function, and the raw api key is only ever stored
/// as a blake3 hash.
pub async fn audit(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let capture = state.config.logging.audit;
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let api_key_hash = if capture.capture_headers {
        bearer_token(&req).map(|key| blake3::hash(key.as_bytes()).to_hex().to_string())
    } else {
        None
    };
    let request_headers = capture
        .capture_headers
        .then(|| redact_headers(headers_to_vec(req.headers()), None));

    let (req, request_body) = if capture.capture_request_body {
        match buffer_request(req, state.body_limit).await {
            Ok(pair) => pair,
            Err(resp) => return resp,
        }
    } else {
        (req, None)
    };

    let resp = next.run(req).await;
    let status_code = resp.status().as_u16();
    let response_headers = capture
        .capture_headers
        .then(|| redact_headers(headers_to_vec(resp.headers()), None));

    let (resp, response_body) = if capture.capture_response_body && !is_event_stream(&resp) {
        buffer_response(resp, state.body_limit).await
    } else {
        (resp, None)
    };

    let mut entry = AuditEntry::new(
        request_id,
        method,
        path,
        status_code,
        start.elapsed().as_nanos() as i64,
    );
    entry.data.api_key_hash = api_key_hash;
    entry.data.request_headers = request_headers;
    entry.data.request_body = request_body;
    entry.data.response_headers = response_headers;
    entry.data.response_body = response_body;
    state.audit_logger.write(entry);

    resp
}

fn headers_to_vec(headers: &axum::http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|text| (name.as_str().to_string(), text.to_string()))
        })
        .collect()
}

fn is_event_stream(resp: &Response) -> bool {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("text/event-stream"))
        .unwrap_or(false)
}

async fn buffer_request(
    req: Request,
    limit: usize,
) -> Result<(Request, Option<String>), Response> {
    let (parts, body) = req.into_parts();
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let req = Request::from_parts(parts, Body::from(bytes));
            Ok((req, Some(text)))
        }
        Err(_) => Err(StatusCode::PAYLOAD_TOO_LARGE.into_response()),
    }
}

async fn buffer_response(resp: Response, limit: usize) -> (Response, Option<String>) {
    let (parts, body) = resp.into_parts();
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            (
                Response::from_parts(parts, Body::from(bytes)),
                Some(text),
            )
        }
        Err(_) => (
            Response::from_parts(parts, Body::empty()),
            None,
        ),
    }
}
