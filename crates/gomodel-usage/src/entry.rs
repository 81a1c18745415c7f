use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::cost::compute_cost;
use crate::extract::ExtractedUsage;
use crate::pricing::ModelPricing;

/// One record of tokens + cost for a single completed (or
/// streamed-to-completion) model call. Written at most once per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEntry {
    pub id: Uuid,
    pub request_id: String,
    /// Provider-assigned response id, when the upstream reported one.
    pub provider_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub model: String,
    pub provider: String,
    pub endpoint: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    pub caveat: String,
    /// Provider-specific token detail, preserved for later re-pricing.
    pub raw_data: BTreeMap<String, i64>,
}

impl UsageEntry {
    /// Builds the ledger row for one extraction. Batch endpoints are priced
    /// against batch rates; the stream's `response.id`/`response.model`
    /// override the request-side values when present.
    pub fn from_extracted(
        request_id: &str,
        provider: &str,
        provider_type: &str,
        endpoint: &str,
        requested_model: &str,
        extracted: ExtractedUsage,
        pricing: Option<&ModelPricing>,
    ) -> Self {
        let pricing = pricing.map(|p| p.for_endpoint(endpoint));
        let breakdown = compute_cost(
            extracted.input_tokens,
            extracted.output_tokens,
            &extracted.raw_data,
            provider_type,
            pricing.as_ref(),
        );
        Self {
            id: Uuid::new_v4(),
            request_id: request_id.to_string(),
            provider_id: extracted.response_id.unwrap_or_default(),
            timestamp: OffsetDateTime::now_utc(),
            model: extracted
                .model
                .unwrap_or_else(|| requested_model.to_string()),
            provider: provider.to_string(),
            endpoint: endpoint.to_string(),
            input_tokens: extracted.input_tokens,
            output_tokens: extracted.output_tokens,
            total_tokens: extracted.total_tokens,
            input_cost: breakdown.input_cost,
            output_cost: breakdown.output_cost,
            total_cost: breakdown.total_cost,
            caveat: breakdown.caveat,
            raw_data: extracted.raw_data,
        }
    }
}
