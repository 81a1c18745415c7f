use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use gomodel_common::GatewayError;
use gomodel_protocol::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, ChatUsage, ModelCategory, ResponseInput,
    ResponsesRequest, ResponsesResponse, ResponsesUsage, ToolCall, ToolCallFunction,
};
use gomodel_protocol::chat::ChatChoice;
use gomodel_resilience::{
    ByteStream, HttpMethod, HttpRequest, HttpResponse, HttpResponseBody, ResilienceEngine,
    SharedHttpClient,
};

use crate::adapter::{DiscoveredModel, ProviderAdapter, RequestContext, failure_to_error};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Chat ↔ Messages translation adapter. System messages lift into the
/// top-level `system` field, `tool_use` blocks round-trip as `tool_calls`,
/// and usage extras are preserved verbatim in `raw_usage`.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    http: SharedHttpClient,
    resilience: Arc<ResilienceEngine>,
}

impl AnthropicProvider {
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
                ("x-api-key".to_string(), self.api_key.clone()),
                ("anthropic-version".to_string(), API_VERSION.to_string()),
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
}

// ---- Messages wire format ----

#[derive(Debug, Serialize)]
struct WireMessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireMessagesResponse {
    id: String,
    model: String,
    #[serde(default)]
    content: Vec<WireContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
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
    created_at: Option<String>,
}

fn build_messages_request(req: &ChatRequest, stream: bool) -> Result<WireMessagesRequest, GatewayError> {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut messages: Vec<WireMessage> = Vec::new();

    for message in &req.messages {
        match message.role {
            ChatRole::System => {
                if let Some(content) = message.content.as_deref() {
                    system_parts.push(content);
                }
            }
            ChatRole::User => messages.push(WireMessage {
                role: "user",
                content: vec![WireContentBlock::Text {
                    text: message.content.clone().unwrap_or_default(),
                }],
            }),
            ChatRole::Assistant => {
                let mut blocks = Vec::new();
                if let Some(content) = &message.content
                    && !content.is_empty()
                {
                    blocks.push(WireContentBlock::Text {
                        text: content.clone(),
                    });
                }
                for call in message.tool_calls.iter().flatten() {
                    blocks.push(WireContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.function.name.clone(),
                        input: serde_json::from_str(&call.function.arguments)
                            .unwrap_or(Value::String(call.function.arguments.clone())),
                    });
                }
                if !blocks.is_empty() {
                    messages.push(WireMessage {
                        role: "assistant",
                        content: blocks,
                    });
                }
            }
            // Tool results arrive as user-role tool_result blocks.
            ChatRole::Tool => {
                let Some(tool_use_id) = message.tool_call_id.clone() else {
                    return Err(GatewayError::invalid_request(
                        "tool message missing tool_call_id",
                    )
                    .with_param("messages"));
                };
                messages.push(WireMessage {
                    role: "user",
                    content: vec![WireContentBlock::ToolResult {
                        tool_use_id,
                        content: Value::String(message.content.clone().unwrap_or_default()),
                    }],
                });
            }
        }
    }

    Ok(WireMessagesRequest {
        model: req.model.clone(),
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system: if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n"))
        },
        temperature: req.temperature,
        top_p: req.top_p,
        tools: translate_tools(req.tools.as_ref()),
        stream: stream.then_some(true),
    })
}

/// OpenAI function tools → Anthropic tool definitions. Anything that is not
/// a function tool is dropped rather than guessed at.
fn translate_tools(tools: Option<&Value>) -> Option<Value> {
    let tools = tools?.as_array()?;
    let translated: Vec<Value> = tools
        .iter()
        .filter_map(|tool| {
            let function = tool.get("function")?;
            let name = function.get("name")?.as_str()?;
            let mut out = Map::new();
            out.insert("name".to_string(), Value::String(name.to_string()));
            if let Some(description) = function.get("description") {
                out.insert("description".to_string(), description.clone());
            }
            if let Some(parameters) = function.get("parameters") {
                out.insert("input_schema".to_string(), parameters.clone());
            }
            Some(Value::Object(out))
        })
        .collect();
    if translated.is_empty() {
        None
    } else {
        Some(Value::Array(translated))
    }
}

fn map_stop_reason(stop_reason: Option<&str>) -> Option<String> {
    stop_reason.map(|reason| {
        match reason {
            "end_turn" | "stop_sequence" => "stop",
            "max_tokens" => "length",
            "tool_use" => "tool_calls",
            other => other,
        }
        .to_string()
    })
}

fn messages_response_to_chat(resp: WireMessagesResponse) -> ChatResponse {
    let mut content = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    for block in resp.content {
        match block {
            WireContentBlock::Text { text } => content.push_str(&text),
            WireContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                kind: "function".to_string(),
                function: ToolCallFunction {
                    name,
                    arguments: input.to_string(),
                },
            }),
            _ => {}
        }
    }

    let usage = resp.usage.map(|usage| ChatUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
        prompt_tokens_details: None,
        completion_tokens_details: None,
        extra: usage.extra,
    });

    ChatResponse {
        id: resp.id,
        object: "chat.completion".to_string(),
        created: OffsetDateTime::now_utc().unix_timestamp(),
        model: resp.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: ChatRole::Assistant,
                content: if content.is_empty() { None } else { Some(content) },
                name: None,
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            },
            finish_reason: map_stop_reason(resp.stop_reason.as_deref()),
        }],
        usage,
        extra: Map::new(),
    }
}

/// The Responses surface is implemented over the Messages call: the
/// instructions become the system prompt and the input collapses to user
/// text.
fn responses_request_to_chat(req: &ResponsesRequest) -> ChatRequest {
    let mut messages = Vec::new();
    if let Some(instructions) = req.instructions.as_deref()
        && !instructions.is_empty()
    {
        messages.push(ChatMessage::text(ChatRole::System, instructions));
    }
    match &req.input {
        Some(ResponseInput::Text(text)) => {
            messages.push(ChatMessage::text(ChatRole::User, text.clone()));
        }
        Some(ResponseInput::Items(items)) => {
            for item in items {
                if let Some(text) = item_text(item) {
                    let role = match item.get("role").and_then(Value::as_str) {
                        Some("assistant") => ChatRole::Assistant,
                        Some("system") => ChatRole::System,
                        _ => ChatRole::User,
                    };
                    messages.push(ChatMessage::text(role, text));
                }
            }
        }
        None => {}
    }

    ChatRequest {
        model: req.model.clone(),
        messages,
        temperature: req.temperature,
        top_p: None,
        max_tokens: req.max_output_tokens,
        stream: None,
        tools: req.tools.clone(),
        tool_choice: None,
        reasoning: None,
        extra: Map::new(),
    }
}

fn item_text(item: &Value) -> Option<String> {
    match item.get("content") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Array(parts)) => {
            let mut out = String::new();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
            (!out.is_empty()).then_some(out)
        }
        _ => item.get("text").and_then(Value::as_str).map(str::to_string),
    }
}

fn chat_response_to_responses(resp: ChatResponse) -> ResponsesResponse {
    let output_text = resp
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone());
    let output = match resp.choices.first() {
        Some(choice) => vec![serde_json::json!({
            "type": "message",
            "role": "assistant",
            "content": [{
                "type": "output_text",
                "text": choice.message.content.clone().unwrap_or_default()
            }]
        })],
        None => Vec::new(),
    };
    let usage = resp.usage.map(|usage| ResponsesUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        input_tokens_details: None,
        output_tokens_details: None,
        extra: usage.extra,
    });

    ResponsesResponse {
        id: resp.id,
        object: "response".to_string(),
        created_at: resp.created,
        model: resp.model,
        output,
        output_text,
        usage,
        extra: Map::new(),
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    async fn chat(
        &self,
        _ctx: &RequestContext,
        req: ChatRequest,
    ) -> Result<ChatResponse, GatewayError> {
        let wire = build_messages_request(&req, false)?;
        let body = Bytes::from(serde_json::to_vec(&wire).map_err(|_| GatewayError::internal())?);
        let response = self.execute(HttpMethod::Post, "/v1/messages", Some(body), false).await?;
        let HttpResponseBody::Bytes(bytes) = response.body else {
            return Err(GatewayError::provider(None, "expected a buffered upstream response"));
        };
        let wire: WireMessagesResponse = serde_json::from_slice(&bytes).map_err(|err| {
            GatewayError::provider(None, format!("undecodable upstream response: {err}"))
        })?;
        Ok(messages_response_to_chat(wire))
    }

    async fn stream_chat(
        &self,
        _ctx: &RequestContext,
        req: ChatRequest,
    ) -> Result<ByteStream, GatewayError> {
        let wire = build_messages_request(&req, true)?;
        let body = Bytes::from(serde_json::to_vec(&wire).map_err(|_| GatewayError::internal())?);
        let response = self.execute(HttpMethod::Post, "/v1/messages", Some(body), true).await?;
        match response.body {
            HttpResponseBody::Stream(stream) => Ok(stream),
            HttpResponseBody::Bytes(bytes) => {
                let (tx, rx) = tokio::sync::mpsc::channel(1);
                let _ = tx.try_send(bytes);
                Ok(rx)
            }
        }
    }

    async fn responses(
        &self,
        ctx: &RequestContext,
        req: ResponsesRequest,
    ) -> Result<ResponsesResponse, GatewayError> {
        let chat = self.chat(ctx, responses_request_to_chat(&req)).await?;
        Ok(chat_response_to_responses(chat))
    }

    async fn stream_responses(
        &self,
        ctx: &RequestContext,
        req: ResponsesRequest,
    ) -> Result<ByteStream, GatewayError> {
        self.stream_chat(ctx, responses_request_to_chat(&req)).await
    }

    async fn list_models(
        &self,
        _ctx: &RequestContext,
    ) -> Result<Vec<DiscoveredModel>, GatewayError> {
        let response = self.execute(HttpMethod::Get, "/v1/models", None, false).await?;
        let HttpResponseBody::Bytes(bytes) = response.body else {
            return Err(GatewayError::provider(None, "expected a buffered upstream response"));
        };
        let list: WireModelList = serde_json::from_slice(&bytes).map_err(|err| {
            GatewayError::provider(None, format!("undecodable upstream response: {err}"))
        })?;
        Ok(list
            .data
            .into_iter()
            .map(|model| DiscoveredModel {
                created: model
                    .created_at
                    .as_deref()
                    .and_then(|at| OffsetDateTime::parse(at, &Rfc3339).ok())
                    .map(|at| at.unix_timestamp())
                    .unwrap_or(0),
                owned_by: "anthropic".to_string(),
                category: ModelCategory::Chat,
                id: model.id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_request(json: Value) -> ChatRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn system_messages_lift_into_the_system_field() {
        let req = chat_request(serde_json::json!({
            "model": "claude-sonnet-4-20250514",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "system", "content": "be kind"},
                {"role": "user", "content": "hi"}
            ]
        }));
        let wire = build_messages_request(&req, false).unwrap();
        assert_eq!(wire.system.as_deref(), Some("be brief\nbe kind"));
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn tool_calls_round_trip() {
        let req = chat_request(serde_json::json!({
            "model": "claude-sonnet-4-20250514",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "tool_calls": [{
                    "id": "toolu_1",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"SF\"}"}
                }]},
                {"role": "tool", "tool_call_id": "toolu_1", "content": "sunny"}
            ]
        }));
        let wire = build_messages_request(&req, false).unwrap();
        let body = serde_json::to_value(&wire).unwrap();
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][1]["content"][0]["input"]["city"], "SF");
        assert_eq!(body["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");

        let response: WireMessagesResponse = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [{"type": "tool_use", "id": "toolu_2", "name": "get_weather",
                         "input": {"city": "LA"}}],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5,
                      "cache_read_input_tokens": 3, "cache_creation_input_tokens": 1}
        }))
        .unwrap();
        let chat = messages_response_to_chat(response);
        let call = &chat.choices[0].message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.name, "get_weather");
        assert_eq!(chat.choices[0].finish_reason.as_deref(), Some("tool_calls"));

        let usage = chat.usage.unwrap();
        assert_eq!(usage.total_tokens, 15);
        assert_eq!(
            usage.extra.get("cache_read_input_tokens"),
            Some(&Value::from(3))
        );
        assert_eq!(
            usage.extra.get("cache_creation_input_tokens"),
            Some(&Value::from(1))
        );
    }

    #[test]
    fn function_tools_translate_to_input_schema() {
        let tools = serde_json::json!([{
            "type": "function",
            "function": {
                "name": "lookup",
                "description": "find things",
                "parameters": {"type": "object", "properties": {}}
            }
        }]);
        let translated = translate_tools(Some(&tools)).unwrap();
        assert_eq!(translated[0]["name"], "lookup");
        assert_eq!(translated[0]["input_schema"]["type"], "object");
        assert!(translated[0].get("function").is_none());
    }

    #[test]
    fn responses_request_collapses_to_chat() {
        let req: ResponsesRequest = serde_json::from_value(serde_json::json!({
            "model": "claude-sonnet-4-20250514",
            "instructions": "be brief",
            "input": [{"role": "user", "content": [{"type": "input_text", "text": "hello"}]}]
        }))
        .unwrap();
        let chat = responses_request_to_chat(&req);
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, ChatRole::System);
        assert_eq!(chat.messages[1].content.as_deref(), Some("hello"));
    }

    #[test]
    fn unknown_content_blocks_are_tolerated() {
        let response: WireMessagesResponse = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "model": "m",
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "answer"}
            ]
        }))
        .unwrap();
        let chat = messages_response_to_chat(response);
        assert_eq!(chat.choices[0].message.content.as_deref(), Some("answer"));
    }
}
