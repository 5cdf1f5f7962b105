//! `next_step`: the decision projection driving the processing loop. Looks
//! only at the last event in the slice — the decision table is exhaustive
//! over every catalogued `Payload` variant plus a catch-all for unknown
//! types.

use ea_domain::error::{Error, Result};
use ea_domain::event::{Event, Payload, ToolCallRef};

/// What the processing loop should do next, derived purely from the most
/// recent event on a thread's stream.
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    CallModel { reason: String },
    ExecuteTools { calls: Vec<ToolCallRef>, reason: String },
    Terminate { reason: String },
}

/// Errors on an empty slice: a thread with no events has no last event to
/// decide from, and callers should treat that as a programming error rather
/// than a legitimate "do nothing" outcome.
pub fn next_step(events: &[Event]) -> Result<NextStep> {
    let last = events
        .last()
        .ok_or_else(|| Error::Other("next_step requires at least one event".into()))?;

    Ok(match last.payload() {
        Payload::UserMessageAdded { .. } => NextStep::CallModel {
            reason: "user_message_added".to_string(),
        },
        Payload::LLMResponseReceived { tool_calls, .. } if !tool_calls.is_empty() => {
            NextStep::ExecuteTools {
                calls: tool_calls,
                reason: "llm_requested_tools".to_string(),
            }
        }
        Payload::LLMResponseReceived { .. } => NextStep::Terminate {
            reason: "llm_response_complete".to_string(),
        },
        Payload::LLMCallFailed { error_message, .. } => NextStep::Terminate {
            reason: format!("llm_call_failed: {error_message}"),
        },
        Payload::ToolExecutionCompleted { .. } => NextStep::CallModel {
            reason: "tool_execution_completed".to_string(),
        },
        Payload::ToolExecutionFailed {
            tool_name,
            error_message,
            ..
        } => NextStep::Terminate {
            reason: format!("tool_execution_failed: {tool_name} - {error_message}"),
        },
        Payload::SessionTerminationRequested { reason } => NextStep::Terminate {
            reason: reason.unwrap_or_else(|| "user_requested".to_string()),
        },
        Payload::SessionCompleted { completion_reason } => NextStep::Terminate {
            reason: completion_reason,
        },
        _ => NextStep::CallModel {
            reason: "unknown_event_type".to_string(),
        },
    })
}

/// Counts of completed steps in a thread so far: how many LLM responses
/// landed and how many tool calls finished. A convenience projection kept
/// from the original for monitoring/debugging use — cheap, pure, and
/// useful from the subscriber framework's handlers or the CLI's `show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepCounts {
    pub llm_calls: usize,
    pub tool_executions: usize,
}

/// Counts `LLMResponseReceived` and `ToolExecutionCompleted` events in
/// `events`. Unlike `next_step`, this looks at every event, not just the
/// last one.
pub fn count_steps_taken(events: &[Event]) -> StepCounts {
    events.iter().fold(StepCounts::default(), |mut counts, e| {
        match e.payload() {
            Payload::LLMResponseReceived { .. } => counts.llm_calls += 1,
            Payload::ToolExecutionCompleted { .. } => counts.tool_executions += 1,
            _ => {}
        }
        counts
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(event_type: &str, data: serde_json::Value) -> Event {
        Event {
            id: Uuid::new_v4(),
            stream_name: "agent:v0-t1".to_string(),
            event_type: event_type.to_string(),
            position: 0,
            global_position: 0,
            time: Utc::now(),
            data,
            metadata: None,
        }
    }

    #[test]
    fn empty_slice_is_an_error() {
        assert!(next_step(&[]).is_err());
    }

    #[test]
    fn user_message_added_calls_model() {
        let events = vec![event(
            "UserMessageAdded",
            json!({"message": "hi", "timestamp": Utc::now().to_rfc3339()}),
        )];
        assert_eq!(
            next_step(&events).unwrap(),
            NextStep::CallModel { reason: "user_message_added".into() }
        );
    }

    #[test]
    fn llm_response_with_tool_calls_executes_tools() {
        let events = vec![event(
            "LLMResponseReceived",
            json!({
                "response_text": "",
                "tool_calls": [{"id": "c1", "name": "add", "arguments": {}}],
                "model_name": "claude",
                "token_usage": {},
            }),
        )];
        match next_step(&events).unwrap() {
            NextStep::ExecuteTools { calls, reason } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(reason, "llm_requested_tools");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn llm_response_without_tool_calls_terminates() {
        let events = vec![event(
            "LLMResponseReceived",
            json!({
                "response_text": "done",
                "tool_calls": [],
                "model_name": "claude",
                "token_usage": {},
            }),
        )];
        assert_eq!(
            next_step(&events).unwrap(),
            NextStep::Terminate { reason: "llm_response_complete".into() }
        );
    }

    #[test]
    fn llm_call_failed_terminates_with_error_message() {
        let events = vec![event(
            "LLMCallFailed",
            json!({"error_message": "rate limited", "retry_count": 2}),
        )];
        assert_eq!(
            next_step(&events).unwrap(),
            NextStep::Terminate { reason: "llm_call_failed: rate limited".into() }
        );
    }

    #[test]
    fn tool_execution_completed_calls_model() {
        let events = vec![event(
            "ToolExecutionCompleted",
            json!({"tool_name": "add", "result": 2, "execution_time_ms": 1}),
        )];
        assert_eq!(
            next_step(&events).unwrap(),
            NextStep::CallModel { reason: "tool_execution_completed".into() }
        );
    }

    #[test]
    fn tool_execution_failed_terminates() {
        let events = vec![event(
            "ToolExecutionFailed",
            json!({"tool_name": "divide", "error_message": "Division by zero", "retry_count": 0}),
        )];
        assert_eq!(
            next_step(&events).unwrap(),
            NextStep::Terminate {
                reason: "tool_execution_failed: divide - Division by zero".into()
            }
        );
    }

    #[test]
    fn session_termination_requested_defaults_reason() {
        let events = vec![event("SessionTerminationRequested", json!({"reason": null}))];
        assert_eq!(
            next_step(&events).unwrap(),
            NextStep::Terminate { reason: "user_requested".into() }
        );
    }

    #[test]
    fn session_completed_terminates_with_completion_reason() {
        let events = vec![event(
            "SessionCompleted",
            json!({"completion_reason": "max_iterations_exceeded"}),
        )];
        assert_eq!(
            next_step(&events).unwrap(),
            NextStep::Terminate { reason: "max_iterations_exceeded".into() }
        );
    }

    #[test]
    fn unrecognised_event_type_calls_model() {
        let events = vec![event("SomethingElseEntirely", json!({}))];
        assert_eq!(
            next_step(&events).unwrap(),
            NextStep::CallModel { reason: "unknown_event_type".into() }
        );
    }

    #[test]
    fn count_steps_taken_is_zero_on_empty_events() {
        assert_eq!(count_steps_taken(&[]), StepCounts::default());
    }

    #[test]
    fn count_steps_taken_counts_across_the_whole_slice() {
        let events = vec![
            event(
                "UserMessageAdded",
                json!({"message": "hi", "timestamp": Utc::now().to_rfc3339()}),
            ),
            event(
                "LLMResponseReceived",
                json!({"response_text": "a", "tool_calls": [], "model_name": "m", "token_usage": {}}),
            ),
            event(
                "ToolExecutionCompleted",
                json!({"tool_name": "add", "result": 2, "execution_time_ms": 1}),
            ),
            event(
                "ToolExecutionCompleted",
                json!({"tool_name": "add", "result": 4, "execution_time_ms": 1}),
            ),
            event(
                "LLMResponseReceived",
                json!({"response_text": "done", "tool_calls": [], "model_name": "m", "token_usage": {}}),
            ),
        ];
        assert_eq!(
            count_steps_taken(&events),
            StepCounts { llm_calls: 2, tool_executions: 2 }
        );
    }

    #[test]
    fn only_the_last_event_is_consulted() {
        let events = vec![
            event(
                "LLMCallFailed",
                json!({"error_message": "boom", "retry_count": 1}),
            ),
            event(
                "UserMessageAdded",
                json!({"message": "retry please", "timestamp": Utc::now().to_rfc3339()}),
            ),
        ];
        assert_eq!(
            next_step(&events).unwrap(),
            NextStep::CallModel { reason: "user_message_added".into() }
        );
    }
}
