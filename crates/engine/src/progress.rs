//! Progress items the streaming processing loop forwards to its caller,
//! independent of (and emitted alongside) the canonical events it appends
//! to the log.

use ea_domain::stream::StreamDelta;
use ea_projections::SessionState;

#[derive(Debug, Clone)]
pub enum AgentProgress {
    /// A raw model delta, forwarded as-is so the caller can render
    /// incremental text and tool-call construction.
    Delta(StreamDelta),
    ToolStarted {
        call_id: String,
        tool_name: String,
    },
    ToolCompleted {
        call_id: String,
        tool_name: String,
        result: serde_json::Value,
    },
    ToolFailed {
        call_id: String,
        tool_name: String,
        error_message: String,
    },
    /// The loop terminated naturally; carries the session state projected
    /// from the final stream read.
    Complete(SessionState),
}
