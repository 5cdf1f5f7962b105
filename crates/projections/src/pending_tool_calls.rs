//! `pending_tool_calls`: the tool calls awaiting execution after the most
//! recent model response, independent of whatever the loop has already
//! dispatched. Used by `show` to render an in-flight thread's outstanding
//! work without re-running `next_step`.

use ea_domain::event::{Event, Payload, ToolCallRef};

/// The tool calls attached to the most recent `LLMResponseReceived`, or
/// empty if there isn't one or it carried none.
pub fn pending_tool_calls(events: &[Event]) -> Vec<ToolCallRef> {
    events
        .iter()
        .rev()
        .find_map(|event| match event.payload() {
            Payload::LLMResponseReceived { tool_calls, .. } => Some(tool_calls),
            _ => None,
        })
        .unwrap_or_default()
}
