use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use serde_json::Value;

use crate::cost::extended_usage_fields;
use crate::extract::{ExtractedUsage, hoist_details};

/// Cap on the trailing incomplete remainder. Only applies when the remainder
/// cannot be the start of a real SSE event; an in-progress `data:` frame may
/// exceed it (terminal `response.completed` payloads embed the full response
/// object and routinely outgrow any fixed buffer).
const REMAINDER_CAP: usize = 256 * 1024;

/// Incremental SSE usage scanner.
///
/// Bytes are appended as they arrive; every complete `\n\n`-terminated event
/// is scanned for a usage payload and discarded. The latest extracted usage
/// wins. `finish` makes a last-ditch parse of the unterminated remainder.
#[derive(Debug, Default)]
pub struct SseUsageScanner {
    buf: Vec<u8>,
    // Bytes before this offset are known boundary-free; avoids rescanning
    // the whole remainder on every small read.
    scanned: usize,
    latest: Option<ExtractedUsage>,
}

impl SseUsageScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        loop {
            // Back up one byte: the boundary may straddle the chunk edge.
            let start = self.scanned.saturating_sub(1);
            match find_event_boundary(&self.buf[start..]) {
                Some(offset) => {
                    let end = start + offset;
                    let event: Vec<u8> = self.buf[..end].to_vec();
                    self.buf.drain(..end + 2);
                    self.scanned = 0;
                    self.scan_event(&event);
                }
                None => {
                    self.scanned = self.buf.len();
                    break;
                }
            }
        }
        if self.buf.len() > REMAINDER_CAP && !starts_like_sse_field(&self.buf) {
            let excess = self.buf.len() - REMAINDER_CAP;
            self.buf.drain(..excess);
            self.scanned = self.scanned.saturating_sub(excess);
        }
    }

    pub fn finish(mut self) -> Option<ExtractedUsage> {
        let remainder = std::mem::take(&mut self.buf);
        if !remainder.is_empty() {
            self.scan_event(&remainder);
        }
        self.latest
    }

    fn scan_event(&mut self, event: &[u8]) {
        let Ok(text) = std::str::from_utf8(event) else {
            return;
        };
        for line in text.lines() {
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() || payload == "[DONE]" {
                continue;
            }
            let Ok(value) = serde_json::from_str::<Value>(payload) else {
                continue;
            };
            self.scan_payload(&value);
        }
    }

    fn scan_payload(&mut self, value: &Value) {
        if let Some(usage) = value.get("usage")
            && usage.is_object()
        {
            self.latest = Some(extract_usage_value(usage));
            return;
        }

        let kind = value.get("type").and_then(Value::as_str);
        if matches!(kind, Some("response.completed") | Some("response.done"))
            && let Some(response) = value.get("response")
            && let Some(usage) = response.get("usage")
            && usage.is_object()
        {
            let mut extracted = extract_usage_value(usage);
            extracted.response_id = response
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string);
            extracted.model = response
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_string);
            self.latest = Some(extracted);
        }
    }
}

fn find_event_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == b"\n\n")
}

fn starts_like_sse_field(buf: &[u8]) -> bool {
    const FIELDS: &[&[u8]] = &[b"data:", b"event:", b"id:", b"retry:", b":", b"\n", b"\r"];
    FIELDS.iter().any(|field| buf.starts_with(field))
}

/// Pulls token counts out of one `usage` JSON object. Extended fields come
/// from the cost engine's mapping tables; nested detail objects are hoisted
/// with `prompt_`/`completion_` prefixes.
fn extract_usage_value(usage: &Value) -> ExtractedUsage {
    let input = first_i64(usage, &["prompt_tokens", "input_tokens"]);
    let output = first_i64(usage, &["completion_tokens", "output_tokens"]);
    let total = usage
        .get("total_tokens")
        .and_then(Value::as_i64)
        .unwrap_or(input + output);

    let mut raw = BTreeMap::new();
    for field in extended_usage_fields() {
        if let Some(value) = usage.get(*field).and_then(Value::as_i64)
            && value != 0
        {
            raw.insert(field.to_string(), value);
        }
    }
    hoist_details(usage.get("prompt_tokens_details"), "prompt_", &mut raw);
    hoist_details(usage.get("input_tokens_details"), "prompt_", &mut raw);
    hoist_details(usage.get("completion_tokens_details"), "completion_", &mut raw);
    hoist_details(usage.get("output_tokens_details"), "completion_", &mut raw);

    ExtractedUsage {
        input_tokens: input,
        output_tokens: output,
        total_tokens: total,
        raw_data: raw,
        response_id: None,
        model: None,
    }
}

fn first_i64(value: &Value, keys: &[&str]) -> i64 {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_i64))
        .unwrap_or(0)
}

type UsageSink = Box<dyn FnOnce(Option<ExtractedUsage>) + Send>;

/// Wraps an upstream byte stream, scanning frames as the client reads them
/// and delivering the final usage exactly once when the stream ends, whether
/// by EOF, mid-stream error, or client disconnect (drop).
pub struct UsageCaptureStream {
    inner: tokio::sync::mpsc::Receiver<Bytes>,
    scanner: Option<SseUsageScanner>,
    on_close: Option<UsageSink>,
}

impl UsageCaptureStream {
    pub fn new(
        inner: tokio::sync::mpsc::Receiver<Bytes>,
        on_close: impl FnOnce(Option<ExtractedUsage>) + Send + 'static,
    ) -> Self {
        Self {
            inner,
            scanner: Some(SseUsageScanner::new()),
            on_close: Some(Box::new(on_close)),
        }
    }

    fn finalize(&mut self) {
        if let (Some(scanner), Some(sink)) = (self.scanner.take(), self.on_close.take()) {
            sink(scanner.finish());
        }
    }
}

impl Stream for UsageCaptureStream {
    type Item = Result<Bytes, std::convert::Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                if let Some(scanner) = this.scanner.as_mut() {
                    scanner.push(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                this.finalize();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for UsageCaptureStream {
    fn drop(&mut self) {
        self.finalize();
    }
}
