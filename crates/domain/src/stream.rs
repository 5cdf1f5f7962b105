use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;

/// A boxed async stream, used for model streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// One increment of a streamed model response.
///
/// Ordering invariant: for each tool call `index`, exactly one `ToolCall`
/// delta precedes any `ToolInput{index}` delta; `Done` is strictly last;
/// `Text` and tool-call deltas may interleave freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamDelta {
    /// A non-empty text fragment.
    #[serde(rename = "text")]
    Text { text: String },

    /// A new tool call begins at `index`.
    #[serde(rename = "tool_call")]
    ToolCall {
        index: usize,
        id: String,
        name: String,
    },

    /// A partial JSON fragment of the tool call's input arguments.
    #[serde(rename = "tool_input")]
    ToolInput { index: usize, input_delta: String },

    /// The stream has ended; exactly one of these terminates any sequence.
    #[serde(rename = "done")]
    Done { token_usage: HashMap<String, u64> },

    /// Transport-level failure surfaced mid-stream.
    #[serde(rename = "error")]
    Error { message: String },
}
