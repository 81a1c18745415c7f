use std::collections::BTreeMap;

use gomodel_protocol::{ChatResponse, ChatUsage, EmbeddingsResponse, ResponsesResponse};
use serde_json::Value;

/// Token counts plus provider-specific detail, as pulled from one response
/// or one SSE stream. `raw_data` is always a fresh map (the upstream
/// response's usage object may still be shared).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub raw_data: BTreeMap<String, i64>,
    pub response_id: Option<String>,
    pub model: Option<String>,
}

pub fn from_chat_response(resp: &ChatResponse) -> Option<ExtractedUsage> {
    let usage = resp.usage.as_ref()?;
    let mut raw = numeric_fields(&usage.extra);
    if raw.is_empty() {
        derive_chat_details(usage, &mut raw);
    }
    Some(ExtractedUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: total_or_sum(usage.total_tokens, usage.prompt_tokens, usage.completion_tokens),
        raw_data: raw,
        response_id: Some(resp.id.clone()),
        model: Some(resp.model.clone()),
    })
}

pub fn from_responses_response(resp: &ResponsesResponse) -> Option<ExtractedUsage> {
    let usage = resp.usage.as_ref()?;
    let mut raw = numeric_fields(&usage.extra);
    if raw.is_empty() {
        hoist_details(usage.input_tokens_details.as_ref(), "prompt_", &mut raw);
        hoist_details(usage.output_tokens_details.as_ref(), "completion_", &mut raw);
    }
    Some(ExtractedUsage {
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        total_tokens: total_or_sum(usage.total_tokens, usage.input_tokens, usage.output_tokens),
        raw_data: raw,
        response_id: Some(resp.id.clone()),
        model: Some(resp.model.clone()),
    })
}

pub fn from_embeddings_response(resp: &EmbeddingsResponse) -> Option<ExtractedUsage> {
    let usage = resp.usage.as_ref()?;
    Some(ExtractedUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: 0,
        total_tokens: total_or_sum(usage.total_tokens, usage.prompt_tokens, 0),
        raw_data: numeric_fields(&usage.extra),
        response_id: None,
        model: Some(resp.model.clone()),
    })
}

fn total_or_sum(total: i64, input: i64, output: i64) -> i64 {
    if total > 0 { total } else { input + output }
}

fn numeric_fields(extra: &serde_json::Map<String, Value>) -> BTreeMap<String, i64> {
    let mut out = BTreeMap::new();
    for (key, value) in extra {
        if let Some(value) = value.as_i64()
            && value != 0
        {
            out.insert(key.clone(), value);
        }
    }
    out
}

/// Hoists each numeric sub-field of a token-details object into the raw map
/// under `prompt_`/`completion_` prefixed names, omitting zeros.
pub(crate) fn hoist_details(
    details: Option<&Value>,
    prefix: &str,
    raw: &mut BTreeMap<String, i64>,
) {
    let Some(Value::Object(fields)) = details else {
        return;
    };
    for (key, value) in fields {
        if let Some(value) = value.as_i64()
            && value != 0
        {
            raw.insert(format!("{prefix}{key}"), value);
        }
    }
}

fn derive_chat_details(usage: &ChatUsage, raw: &mut BTreeMap<String, i64>) {
    if let Some(details) = &usage.prompt_tokens_details {
        insert_nonzero(raw, "prompt_cached_tokens", details.cached_tokens);
        insert_nonzero(raw, "prompt_audio_tokens", details.audio_tokens);
        insert_nonzero(raw, "prompt_text_tokens", details.text_tokens);
        insert_nonzero(raw, "prompt_image_tokens", details.image_tokens);
    }
    if let Some(details) = &usage.completion_tokens_details {
        insert_nonzero(raw, "completion_reasoning_tokens", details.reasoning_tokens);
        insert_nonzero(raw, "completion_audio_tokens", details.audio_tokens);
        insert_nonzero(
            raw,
            "completion_accepted_prediction_tokens",
            details.accepted_prediction_tokens,
        );
        insert_nonzero(
            raw,
            "completion_rejected_prediction_tokens",
            details.rejected_prediction_tokens,
        );
    }
}

fn insert_nonzero(raw: &mut BTreeMap<String, i64>, key: &str, value: Option<i64>) {
    if let Some(value) = value
        && value != 0
    {
        raw.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_usage_takes_precedence_over_details() {
        let resp: ChatResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o",
            "choices": [],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 4,
                "total_tokens": 14,
                "cache_read_input_tokens": 3,
                "prompt_tokens_details": {"cached_tokens": 99}
            }
        }))
        .unwrap();
        let extracted = from_chat_response(&resp).unwrap();
        assert_eq!(extracted.raw_data.get("cache_read_input_tokens"), Some(&3));
        // Detail-derived fields are only used when raw_data is empty.
        assert!(!extracted.raw_data.contains_key("prompt_cached_tokens"));
    }

    #[test]
    fn details_derive_prefixed_keys_when_raw_empty() {
        let resp: ChatResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o",
            "choices": [],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 4,
                "total_tokens": 14,
                "prompt_tokens_details": {"cached_tokens": 6, "audio_tokens": 0},
                "completion_tokens_details": {"reasoning_tokens": 2}
            }
        }))
        .unwrap();
        let extracted = from_chat_response(&resp).unwrap();
        assert_eq!(extracted.raw_data.get("prompt_cached_tokens"), Some(&6));
        assert_eq!(
            extracted.raw_data.get("completion_reasoning_tokens"),
            Some(&2)
        );
        // Zero values are omitted.
        assert!(!extracted.raw_data.contains_key("prompt_audio_tokens"));
    }

    #[test]
    fn missing_total_is_summed() {
        let resp: ChatResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o",
            "choices": [],
            "usage": {"prompt_tokens": 7, "completion_tokens": 5}
        }))
        .unwrap();
        let extracted = from_chat_response(&resp).unwrap();
        assert_eq!(extracted.total_tokens, 12);
    }
}
