//! `conversation_context`: folds `UserMessageAdded`, `LLMResponseReceived`,
//! and `ToolExecutionCompleted` into the ordered message list a model call
//! consumes. All other event types are ignored (P4).

use ea_domain::event::{Event, Payload, ToolCallRef};

/// One message in the projected conversation. `role` is implicit in the
/// variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationMessage {
    User {
        text: String,
    },
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolCallRef>,
    },
    Tool {
        tool_call_id: String,
        tool_name: String,
        text: String,
    },
}

/// Pure fold of an event slice into the ordered conversation. Never touches
/// the event log, the clock, or any other external state (P2).
pub fn conversation_context(events: &[Event]) -> Vec<ConversationMessage> {
    let mut messages = Vec::new();

    for event in events {
        match event.payload() {
            Payload::UserMessageAdded { message, .. } => {
                messages.push(ConversationMessage::User { text: message });
            }
            Payload::LLMResponseReceived {
                response_text,
                tool_calls,
                ..
            } => {
                let text = if response_text.is_empty() {
                    None
                } else {
                    Some(response_text)
                };
                if text.is_none() && tool_calls.is_empty() {
                    // Malformed: neither text nor tool calls. Skip entirely.
                    continue;
                }
                messages.push(ConversationMessage::Assistant { text, tool_calls });
            }
            Payload::ToolExecutionCompleted {
                tool_name, result, ..
            } => {
                let text = match &result {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let tool_call_id = event
                    .metadata_str("tool_call_id")
                    .unwrap_or_else(|| tool_name.clone());
                messages.push(ConversationMessage::Tool {
                    tool_call_id,
                    tool_name,
                    text,
                });
            }
            _ => {}
        }
    }

    messages
}
