use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Which optional fields the audit middleware captures. All default to off;
/// sensitive headers are redacted before they ever land here.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AuditCapture {
    #[serde(default)]
    pub capture_request_body: bool,
    #[serde(default)]
    pub capture_response_body: bool,
    #[serde(default)]
    pub capture_headers: bool,
}

/// One server-observed HTTP exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub duration_ns: i64,
    pub status_code: u16,
    pub method: String,
    pub path: String,
    pub request_id: String,
    pub data: AuditData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<Vec<(String, String)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Vec<(String, String)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
}

impl AuditEntry {
    pub fn new(
        request_id: String,
        method: String,
        path: String,
        status_code: u16,
        duration_ns: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: OffsetDateTime::now_utc(),
            duration_ns,
            status_code,
            method,
            path,
            request_id,
            data: AuditData::default(),
        }
    }
}
