use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Client-facing error classification.
///
/// `CircuitOpen` and `GuardrailBlocked` are internal refinements: the wire
/// type collapses `CircuitOpen` into `provider_error` and `GuardrailBlocked`
/// into `invalid_request_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    Authentication,
    NotFound,
    RateLimit,
    Provider,
    CircuitOpen,
    GuardrailBlocked,
    Internal,
}

impl ErrorKind {
    pub fn wire_type(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest | ErrorKind::GuardrailBlocked => "invalid_request_error",
            ErrorKind::Authentication => "authentication_error",
            ErrorKind::NotFound => "not_found_error",
            ErrorKind::RateLimit => "rate_limit_error",
            ErrorKind::Provider | ErrorKind::CircuitOpen => "provider_error",
            ErrorKind::Internal => "internal_error",
        }
    }

    pub fn default_status(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest | ErrorKind::GuardrailBlocked => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Provider => StatusCode::BAD_GATEWAY,
            ErrorKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    pub param: Option<String>,
    pub code: Option<String>,
    pub status: StatusCode,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            param: None,
            code: None,
            status: kind.default_status(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn model_not_found(model: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("model not found: {model}"))
            .with_param("model")
            .with_code("model_not_found")
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    /// Upstream failure after retries are exhausted. The upstream status is
    /// kept when it is a 5xx; transport errors map to 502.
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::Provider, message);
        if let Some(status) = status
            && let Ok(code) = StatusCode::from_u16(status)
            && code.is_server_error()
        {
            err.status = code;
        }
        err
    }

    pub fn circuit_open(provider: &str) -> Self {
        Self::new(
            ErrorKind::CircuitOpen,
            format!("provider {provider} is temporarily unavailable"),
        )
        .with_code("circuit_open")
    }

    pub fn guardrail(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GuardrailBlocked, message)
    }

    /// Never carries the original error text; callers log the cause.
    pub fn internal() -> Self {
        Self::new(ErrorKind::Internal, "internal server error")
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorBody {
                kind: self.kind.wire_type().to_string(),
                message: self.message.clone(),
                param: self.param.clone(),
                code: self.code.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_open_surfaces_as_provider_error() {
        let err = GatewayError::circuit_open("openai-main");
        assert_eq!(err.kind.wire_type(), "provider_error");
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn provider_error_keeps_upstream_5xx() {
        let err = GatewayError::provider(Some(503), "upstream overloaded");
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        // 4xx statuses never propagate as-is through the provider kind.
        let err = GatewayError::provider(Some(418), "weird upstream");
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn envelope_shape() {
        let err = GatewayError::model_not_found("gpt-x");
        let json = serde_json::to_value(err.envelope()).unwrap();
        assert_eq!(json["error"]["type"], "not_found_error");
        assert_eq!(json["error"]["param"], "model");
        assert_eq!(json["error"]["code"], "model_not_found");
    }
}
