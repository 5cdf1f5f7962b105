use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::tool::ToolCall;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream names
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A parsed `category[:version]-entityId` stream name.
///
/// The category is everything before the first `-`, including the optional
/// `:version` suffix; category reads match on that prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamName {
    pub category: String,
    pub version: Option<String>,
    pub entity_id: String,
}

impl StreamName {
    pub fn build(category: &str, version: Option<&str>, entity_id: &str) -> String {
        match version {
            Some(v) => format!("{category}:{v}-{entity_id}"),
            None => format!("{category}-{entity_id}"),
        }
    }

    pub fn parse(name: &str) -> Result<StreamName> {
        let (prefix, entity_id) = name
            .split_once('-')
            .ok_or_else(|| Error::Other(format!("invalid stream name: {name}")))?;
        if entity_id.is_empty() {
            return Err(Error::Other(format!("invalid stream name: {name}")));
        }
        let (category, version) = match prefix.split_once(':') {
            Some((c, v)) => (c.to_string(), Some(v.to_string())),
            None => (prefix.to_string(), None),
        };
        if category.is_empty() {
            return Err(Error::Other(format!("invalid stream name: {name}")));
        }
        Ok(StreamName {
            category,
            version,
            entity_id: entity_id.to_string(),
        })
    }

    /// The category prefix as it appears in the stream name (`category` or
    /// `category:version`), used for category-read matching.
    pub fn category_prefix(&self) -> String {
        match &self.version {
            Some(v) => format!("{}:{}", self.category, v),
            None => self.category.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single append-only log record: the common envelope plus a
/// strongly-typed payload decoded from `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub stream_name: String,
    pub event_type: String,
    pub position: i64,
    pub global_position: i64,
    pub time: DateTime<Utc>,
    pub data: Value,
    pub metadata: Option<Value>,
}

impl Event {
    /// Decode `data`/`event_type` into the closed `Payload` representation,
    /// falling back to `Payload::Unknown` for unrecognised types.
    pub fn payload(&self) -> Payload {
        Payload::from_event(self)
    }

    pub fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Domain event catalogue
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRef {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl From<&ToolCall> for ToolCallRef {
    fn from(call: &ToolCall) -> Self {
        ToolCallRef {
            id: call.call_id.clone(),
            name: call.tool_name.clone(),
            arguments: call.arguments.clone(),
        }
    }
}

/// The closed set of domain event types this core recognises. Unknown types
/// on a read are tolerated and ignored by projections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    SessionStarted {
        thread_id: String,
    },
    UserMessageAdded {
        message: String,
        timestamp: DateTime<Utc>,
    },
    LLMCallStarted {
        message_count: usize,
        tool_count: usize,
    },
    LLMResponseReceived {
        response_text: String,
        tool_calls: Vec<ToolCallRef>,
        model_name: String,
        token_usage: std::collections::HashMap<String, u64>,
    },
    LLMCallFailed {
        error_message: String,
        retry_count: u32,
    },
    ToolExecutionRequested {
        tool_name: String,
        arguments: Value,
    },
    ToolExecutionStarted {
        tool_name: String,
        arguments: Value,
    },
    ToolExecutionCompleted {
        tool_name: String,
        result: Value,
        execution_time_ms: u64,
    },
    ToolExecutionFailed {
        tool_name: String,
        error_message: String,
        retry_count: u32,
    },
    SessionTerminationRequested {
        reason: Option<String>,
    },
    SessionCompleted {
        completion_reason: String,
    },
    DisplayPreferenceUpdated {
        instruction: String,
        merged_preferences: String,
        previous_preferences: String,
    },
    PositionUpdated {
        subscriber_id: String,
        position: i64,
    },
    Unknown {
        event_type: String,
        raw: Value,
    },
}

impl Payload {
    pub fn event_type(&self) -> String {
        match self {
            Payload::SessionStarted { .. } => "SessionStarted".to_string(),
            Payload::UserMessageAdded { .. } => "UserMessageAdded".to_string(),
            Payload::LLMCallStarted { .. } => "LLMCallStarted".to_string(),
            Payload::LLMResponseReceived { .. } => "LLMResponseReceived".to_string(),
            Payload::LLMCallFailed { .. } => "LLMCallFailed".to_string(),
            Payload::ToolExecutionRequested { .. } => "ToolExecutionRequested".to_string(),
            Payload::ToolExecutionStarted { .. } => "ToolExecutionStarted".to_string(),
            Payload::ToolExecutionCompleted { .. } => "ToolExecutionCompleted".to_string(),
            Payload::ToolExecutionFailed { .. } => "ToolExecutionFailed".to_string(),
            Payload::SessionTerminationRequested { .. } => {
                "SessionTerminationRequested".to_string()
            }
            Payload::SessionCompleted { .. } => "SessionCompleted".to_string(),
            Payload::DisplayPreferenceUpdated { .. } => "DisplayPreferenceUpdated".to_string(),
            Payload::PositionUpdated { .. } => "PositionUpdated".to_string(),
            Payload::Unknown { event_type, .. } => event_type.clone(),
        }
    }

    fn from_event(event: &Event) -> Payload {
        let data = &event.data;
        match event.event_type.as_str() {
            "SessionStarted" => data
                .get("thread_id")
                .and_then(|v| v.as_str())
                .map(|thread_id| Payload::SessionStarted {
                    thread_id: thread_id.to_string(),
                })
                .unwrap_or_else(|| Payload::unknown(event)),
            "UserMessageAdded" => {
                let message = data.get("message").and_then(|v| v.as_str());
                let timestamp = data
                    .get("timestamp")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(event.time);
                match message {
                    Some(message) => Payload::UserMessageAdded {
                        message: message.to_string(),
                        timestamp,
                    },
                    None => Payload::unknown(event),
                }
            }
            "LLMCallStarted" => Payload::LLMCallStarted {
                message_count: data
                    .get("message_count")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize,
                tool_count: data.get("tool_count").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
            },
            "LLMResponseReceived" => {
                let response_text = data
                    .get("response_text")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let tool_calls: Vec<ToolCallRef> = data
                    .get("tool_calls")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let model_name = data
                    .get("model_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let token_usage = data
                    .get("token_usage")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                Payload::LLMResponseReceived {
                    response_text,
                    tool_calls,
                    model_name,
                    token_usage,
                }
            }
            "LLMCallFailed" => Payload::LLMCallFailed {
                error_message: data
                    .get("error_message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                retry_count: data.get("retry_count").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            },
            "ToolExecutionRequested" => Payload::ToolExecutionRequested {
                tool_name: data
                    .get("tool_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                arguments: data.get("arguments").cloned().unwrap_or(Value::Null),
            },
            "ToolExecutionStarted" => Payload::ToolExecutionStarted {
                tool_name: data
                    .get("tool_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                arguments: data.get("arguments").cloned().unwrap_or(Value::Null),
            },
            "ToolExecutionCompleted" => Payload::ToolExecutionCompleted {
                tool_name: data
                    .get("tool_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                result: data.get("result").cloned().unwrap_or(Value::Null),
                execution_time_ms: data
                    .get("execution_time_ms")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0),
            },
            "ToolExecutionFailed" => Payload::ToolExecutionFailed {
                tool_name: data
                    .get("tool_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                error_message: data
                    .get("error_message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                retry_count: data.get("retry_count").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
            },
            "SessionTerminationRequested" => Payload::SessionTerminationRequested {
                reason: data
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
            },
            "SessionCompleted" => data
                .get("completion_reason")
                .and_then(|v| v.as_str())
                .map(|reason| Payload::SessionCompleted {
                    completion_reason: reason.to_string(),
                })
                .unwrap_or_else(|| Payload::unknown(event)),
            "DisplayPreferenceUpdated" => Payload::DisplayPreferenceUpdated {
                instruction: data
                    .get("instruction")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                merged_preferences: data
                    .get("merged_preferences")
                    .and_then(|v| v.as_str())
                    .unwrap_or("default")
                    .to_string(),
                previous_preferences: data
                    .get("previous_preferences")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
            },
            "PositionUpdated" => Payload::PositionUpdated {
                subscriber_id: data
                    .get("subscriber_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                position: data.get("position").and_then(|v| v.as_i64()).unwrap_or(0),
            },
            _ => Payload::unknown(event),
        }
    }

    fn unknown(event: &Event) -> Payload {
        Payload::Unknown {
            event_type: event.event_type.clone(),
            raw: event.data.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Constructors that validate payload invariants at construction time
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Payload {
    /// `LLMResponseReceived` must carry a non-empty `model_name` and either
    /// non-empty text or at least one tool call.
    pub fn llm_response_received(
        response_text: String,
        tool_calls: Vec<ToolCallRef>,
        model_name: String,
        token_usage: std::collections::HashMap<String, u64>,
    ) -> Result<Payload> {
        if model_name.trim().is_empty() {
            return Err(Error::Other(
                "LLMResponseReceived requires a non-empty model_name".into(),
            ));
        }
        if response_text.is_empty() && tool_calls.is_empty() {
            return Err(Error::Other(
                "LLMResponseReceived requires non-empty text or at least one tool call".into(),
            ));
        }
        Ok(Payload::LLMResponseReceived {
            response_text,
            tool_calls,
            model_name,
            token_usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_name_round_trip_with_version() {
        let name = StreamName::build("agent", Some("v0"), "abc-123");
        let parsed = StreamName::parse(&name).unwrap();
        assert_eq!(parsed.category, "agent");
        assert_eq!(parsed.version.as_deref(), Some("v0"));
        assert_eq!(parsed.entity_id, "abc-123");
    }

    #[test]
    fn stream_name_round_trip_without_version() {
        let name = StreamName::build("subscriberPosition", None, "my-sub");
        let parsed = StreamName::parse(&name).unwrap();
        assert_eq!(parsed.category, "subscriberPosition");
        assert_eq!(parsed.version, None);
        assert_eq!(parsed.entity_id, "my-sub");
    }

    #[test]
    fn stream_name_rejects_missing_entity_id() {
        assert!(StreamName::parse("agent:v0").is_err());
    }

    #[test]
    fn llm_response_received_rejects_empty_text_and_calls() {
        let result = Payload::llm_response_received(
            String::new(),
            Vec::new(),
            "claude-3".to_string(),
            Default::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn llm_response_received_rejects_empty_model_name() {
        let result = Payload::llm_response_received(
            "hi".to_string(),
            Vec::new(),
            String::new(),
            Default::default(),
        );
        assert!(result.is_err());
    }
}
