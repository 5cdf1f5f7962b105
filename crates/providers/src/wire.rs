//! Provider wire-level streaming vocabulary.
//!
//! Each adapter speaks its own SSE dialect; this module is the common
//! representation adapters normalize into before the registry's
//! `ModelClient` layer reshapes them into the public `StreamDelta`
//! contract (`ea_domain::stream::StreamDelta`). Kept separate from that
//! contract because provider streams carry things the public contract
//! doesn't need to expose identically (finish_reason, a `Thinking`
//! variant not every provider emits).

use ea_domain::error::Result;
use ea_domain::stream::BoxStream;

/// Token usage as reported by a provider's wire format.
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn to_token_usage(&self) -> std::collections::HashMap<String, u64> {
        let mut map = std::collections::HashMap::new();
        map.insert("input_tokens".to_string(), self.prompt_tokens as u64);
        map.insert("output_tokens".to_string(), self.completion_tokens as u64);
        map.insert("total_tokens".to_string(), self.total_tokens as u64);
        map
    }
}

/// One event in a provider's native streaming response, prior to
/// normalization into [`ea_domain::stream::StreamDelta`].
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Reasoning/thinking content (not all providers emit this).
    Thinking { text: String },
    /// Incremental assistant text.
    Token { text: String },
    /// A tool call has begun; arguments will follow as deltas.
    ToolCallStarted { call_id: String, tool_name: String },
    /// A partial JSON fragment of a tool call's arguments.
    ToolCallDelta { call_id: String, delta: String },
    /// A tool call is complete, with the full parsed arguments.
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// The stream is complete.
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },
    /// Transport-level failure surfaced mid-stream.
    Error { message: String },
}

pub(crate) type WireStream = BoxStream<'static, Result<StreamEvent>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_token_usage_maps_provider_fields_to_public_keys() {
        let usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        let map = usage.to_token_usage();
        assert_eq!(map.get("input_tokens"), Some(&10));
        assert_eq!(map.get("output_tokens"), Some(&5));
        assert_eq!(map.get("total_tokens"), Some(&15));
    }
}
