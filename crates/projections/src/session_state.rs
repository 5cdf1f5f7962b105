//! `session_state`: the summary projection used for `show`/`list` and for
//! the engine's own iteration bookkeeping. Unlike `next_step`, this one
//! folds the whole slice rather than just inspecting the last event.
//!
//! Status is deliberately conservative: a thread that simply stopped
//! because `next_step` returned `Terminate` (a failed LLM call, a failed
//! tool, a natural end-of-turn) stays `Active` until something writes an
//! explicit `SessionCompleted` or `SessionTerminationRequested` — the
//! processing loop does not lie about completion on the caller's behalf.

use chrono::{DateTime, Utc};

use ea_domain::error::{Error, Result};
use ea_domain::event::{Event, Payload, StreamName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Terminated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub thread_id: String,
    pub status: SessionStatus,
    pub message_count: u64,
    pub llm_call_count: u64,
    pub tool_call_count: u64,
    pub error_count: u64,
    pub session_start_time: Option<DateTime<Utc>>,
    pub session_end_time: Option<DateTime<Utc>>,
    pub last_activity_time: Option<DateTime<Utc>>,
}

/// Errors on an empty slice, for the same reason `next_step` does.
pub fn session_state(events: &[Event]) -> Result<SessionState> {
    let first = events
        .first()
        .ok_or_else(|| Error::Other("session_state requires at least one event".into()))?;
    let last = events.last().expect("non-empty slice has a last element");

    let thread_id = StreamName::parse(&first.stream_name)?.entity_id;

    let mut message_count = 0u64;
    let mut llm_call_count = 0u64;
    let mut tool_call_count = 0u64;
    let mut error_count = 0u64;
    let mut session_start_time = None;
    let mut last_completed: Option<(String, DateTime<Utc>)> = None;
    let mut termination_requested = false;

    for event in events {
        match event.payload() {
            Payload::SessionStarted { .. } => {
                session_start_time.get_or_insert(event.time);
            }
            Payload::UserMessageAdded { .. } => message_count += 1,
            Payload::LLMResponseReceived { .. } => llm_call_count += 1,
            Payload::ToolExecutionCompleted { .. } => tool_call_count += 1,
            Payload::LLMCallFailed { .. } | Payload::ToolExecutionFailed { .. } => error_count += 1,
            Payload::SessionTerminationRequested { .. } => termination_requested = true,
            Payload::SessionCompleted { completion_reason } => {
                termination_requested = false;
                last_completed = Some((completion_reason, event.time));
            }
            _ => {}
        }
    }

    let status = match &last_completed {
        Some((reason, _)) if reason == "success" || reason == "completed" => SessionStatus::Completed,
        Some(_) => SessionStatus::Failed,
        None if termination_requested => SessionStatus::Terminated,
        None => SessionStatus::Active,
    };

    Ok(SessionState {
        thread_id,
        status,
        message_count,
        llm_call_count,
        tool_call_count,
        error_count,
        session_start_time,
        session_end_time: last_completed.map(|(_, time)| time),
        last_activity_time: Some(last.time),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn event(stream: &str, event_type: &str, data: serde_json::Value, time: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            stream_name: stream.to_string(),
            event_type: event_type.to_string(),
            position: 0,
            global_position: 0,
            time,
            data,
            metadata: None,
        }
    }

    #[test]
    fn empty_slice_is_an_error() {
        assert!(session_state(&[]).is_err());
    }

    #[test]
    fn thread_id_comes_from_first_event_stream_name() {
        let now = Utc::now();
        let events = vec![event(
            "agent:v0-abc123",
            "UserMessageAdded",
            json!({"message": "hi", "timestamp": now.to_rfc3339()}),
            now,
        )];
        let state = session_state(&events).unwrap();
        assert_eq!(state.thread_id, "abc123");
        assert_eq!(state.status, SessionStatus::Active);
        assert_eq!(state.message_count, 1);
    }

    #[test]
    fn a_terminal_llm_response_without_explicit_completion_stays_active() {
        let now = Utc::now();
        let events = vec![
            event("agent:v0-t1", "SessionStarted", json!({"thread_id": "t1"}), now),
            event("agent:v0-t1", "UserMessageAdded", json!({"message": "2+2?", "timestamp": now.to_rfc3339()}), now),
            event("agent:v0-t1", "LLMCallStarted", json!({"message_count": 1, "tool_count": 0}), now),
            event(
                "agent:v0-t1",
                "LLMResponseReceived",
                json!({"response_text": "4", "tool_calls": [], "model_name": "m", "token_usage": {}}),
                now,
            ),
        ];
        let state = session_state(&events).unwrap();
        assert_eq!(state.status, SessionStatus::Active);
        assert_eq!(state.message_count, 1);
        assert_eq!(state.llm_call_count, 1);
        assert_eq!(state.tool_call_count, 0);
        assert_eq!(state.error_count, 0);
        assert!(state.session_end_time.is_none());
    }

    #[test]
    fn counts_across_mixed_events_and_completes_on_success_reason() {
        let now = Utc::now();
        let events = vec![
            event("agent:v0-t1", "UserMessageAdded", json!({"message": "hi", "timestamp": now.to_rfc3339()}), now),
            event(
                "agent:v0-t1",
                "LLMResponseReceived",
                json!({"response_text": "", "tool_calls": [{"id": "c1", "name": "add", "arguments": {}}], "model_name": "m", "token_usage": {}}),
                now,
            ),
            event("agent:v0-t1", "ToolExecutionCompleted", json!({"tool_name": "add", "result": 2, "execution_time_ms": 1}), now),
            event(
                "agent:v0-t1",
                "LLMResponseReceived",
                json!({"response_text": "done", "tool_calls": [], "model_name": "m", "token_usage": {}}),
                now,
            ),
            event("agent:v0-t1", "SessionCompleted", json!({"completion_reason": "success"}), now),
        ];
        let state = session_state(&events).unwrap();
        assert_eq!(state.message_count, 1);
        assert_eq!(state.llm_call_count, 2);
        assert_eq!(state.tool_call_count, 1);
        assert_eq!(state.error_count, 0);
        assert_eq!(state.status, SessionStatus::Completed);
        assert!(state.session_end_time.is_some());
    }

    #[test]
    fn session_completed_with_other_reason_is_failed() {
        let now = Utc::now();
        let events = vec![
            event("agent:v0-t1", "UserMessageAdded", json!({"message": "hi", "timestamp": now.to_rfc3339()}), now),
            event("agent:v0-t1", "LLMCallFailed", json!({"error_message": "boom", "retry_count": 3}), now),
            event("agent:v0-t1", "SessionCompleted", json!({"completion_reason": "max_iterations_exceeded"}), now),
        ];
        let state = session_state(&events).unwrap();
        assert_eq!(state.status, SessionStatus::Failed);
        assert_eq!(state.error_count, 1);
    }

    #[test]
    fn termination_requested_without_later_completion_is_terminated() {
        let now = Utc::now();
        let events = vec![
            event("agent:v0-t1", "UserMessageAdded", json!({"message": "hi", "timestamp": now.to_rfc3339()}), now),
            event("agent:v0-t1", "SessionTerminationRequested", json!({"reason": "user_requested"}), now),
        ];
        let state = session_state(&events).unwrap();
        assert_eq!(state.status, SessionStatus::Terminated);
        assert!(state.session_end_time.is_none());
    }
}
