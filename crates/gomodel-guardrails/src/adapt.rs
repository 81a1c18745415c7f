use gomodel_protocol::{ChatMessage, ChatRequest, ChatRole, ResponsesRequest};

use crate::{Message, MessageRole};

/// Chat → messages: a direct copy of the `messages` array. Tool-role
/// messages carry no guardable text and are not represented in the DTO.
pub fn messages_from_chat(req: &ChatRequest) -> Vec<Message> {
    req.messages
        .iter()
        .filter_map(|message| {
            let role = match message.role {
                ChatRole::System => MessageRole::System,
                ChatRole::User => MessageRole::User,
                ChatRole::Assistant => MessageRole::Assistant,
                ChatRole::Tool => return None,
            };
            Some(Message::new(
                role,
                message.content.clone().unwrap_or_default(),
            ))
        })
        .collect()
}

/// Responses → messages: the `instructions` field, when non-empty, becomes a
/// single system message.
pub fn messages_from_responses(req: &ResponsesRequest) -> Vec<Message> {
    match req.instructions.as_deref() {
        Some(instructions) if !instructions.is_empty() => {
            vec![Message::new(MessageRole::System, instructions)]
        }
        _ => Vec::new(),
    }
}

/// Messages → chat: replaces `messages` on a cloned request.
pub fn apply_messages_to_chat(req: &ChatRequest, messages: Vec<Message>) -> ChatRequest {
    let mut out = req.clone();
    out.messages = messages
        .into_iter()
        .map(|message| {
            let role = match message.role {
                MessageRole::System => ChatRole::System,
                MessageRole::User => ChatRole::User,
                MessageRole::Assistant => ChatRole::Assistant,
            };
            ChatMessage::text(role, message.content)
        })
        .collect();
    out
}

/// Messages → responses: system contents concatenate (in order, separated by
/// newlines) into `instructions` on a cloned request. Non-system messages
/// are dropped; the Responses API carries its own `input`.
pub fn apply_messages_to_responses(
    req: &ResponsesRequest,
    messages: Vec<Message>,
) -> ResponsesRequest {
    let mut out = req.clone();
    let instructions: Vec<String> = messages
        .into_iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content)
        .collect();
    out.instructions = if instructions.is_empty() {
        None
    } else {
        Some(instructions.join("\n"))
    };
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_request(messages: Vec<ChatMessage>) -> ChatRequest {
        serde_json::from_value(serde_json::json!({"model": "m", "messages": []}))
            .map(|mut req: ChatRequest| {
                req.messages = messages;
                req
            })
            .unwrap()
    }

    #[test]
    fn chat_round_trip_is_identity() {
        let req = chat_request(vec![
            ChatMessage::text(ChatRole::System, "s"),
            ChatMessage::text(ChatRole::User, "u"),
            ChatMessage::text(ChatRole::Assistant, "a"),
        ]);
        let messages = messages_from_chat(&req);
        let rebuilt = apply_messages_to_chat(&req, messages);
        assert_eq!(rebuilt.messages, req.messages);
    }

    #[test]
    fn responses_adapter_lifts_instructions() {
        let req: ResponsesRequest = serde_json::from_value(serde_json::json!({
            "model": "m",
            "input": "hi",
            "instructions": "be brief"
        }))
        .unwrap();
        let messages = messages_from_responses(&req);
        assert_eq!(messages, vec![Message::new(MessageRole::System, "be brief")]);

        let rebuilt = apply_messages_to_responses(
            &req,
            vec![
                Message::new(MessageRole::System, "one"),
                Message::new(MessageRole::User, "ignored"),
                Message::new(MessageRole::System, "two"),
            ],
        );
        assert_eq!(rebuilt.instructions.as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn empty_instructions_produce_no_messages() {
        let req: ResponsesRequest =
            serde_json::from_value(serde_json::json!({"model": "m", "instructions": ""})).unwrap();
        assert!(messages_from_responses(&req).is_empty());
    }
}
