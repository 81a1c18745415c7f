//! Shared types for the gomodel gateway.
//!
//! This crate intentionally does **not** depend on axum, any HTTP client or
//! the storage layer. It carries the error taxonomy, the audit record shape
//! and small validation helpers used on both the edge and the pipelines.

pub mod audit;
pub mod error;
pub mod limits;
pub mod redact;

pub use audit::{AuditCapture, AuditEntry};
pub use error::{ErrorBody, ErrorEnvelope, ErrorKind, GatewayError};
pub use limits::{BODY_LIMIT_MAX, BODY_LIMIT_MIN, parse_body_size_limit};
pub use redact::{REDACTED, is_sensitive_header, redact_headers};

/// Returns the inbound `X-Request-ID` when present and non-empty, otherwise
/// mints a fresh v4 UUID.
pub fn ensure_request_id(inbound: Option<&str>) -> String {
    match inbound.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_passthrough_and_mint() {
        assert_eq!(ensure_request_id(Some("req-1")), "req-1");
        let minted = ensure_request_id(None);
        assert!(uuid::Uuid::parse_str(&minted).is_ok());
        let minted = ensure_request_id(Some("  "));
        assert!(uuid::Uuid::parse_str(&minted).is_ok());
    }
}
