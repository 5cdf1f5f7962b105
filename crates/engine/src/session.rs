//! Thread lifecycle: starting a session, adding further user turns, and
//! requesting termination. These are thin, synchronous-in-spirit wrappers
//! around `EventStore::append` — the processing loop does the actual work
//! of driving a thread forward.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use ea_domain::error::{Error, Result};
use ea_domain::event::StreamName;
use ea_store::EventStore;

/// Starts a new session: generates a fresh thread id, appends
/// `SessionStarted` then `UserMessageAdded` to a brand new stream. Returns
/// the thread id and the stream name it was written to.
///
/// `message` must be non-empty after trimming whitespace.
pub async fn start_session(
    store: &EventStore,
    category: &str,
    version: Option<&str>,
    message: &str,
) -> Result<(String, String)> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(Error::Config("initial message must not be empty".into()));
    }

    let thread_id = Uuid::new_v4().to_string();
    let stream_name = StreamName::build(category, version, &thread_id);

    let pos = store
        .append(
            &stream_name,
            "SessionStarted",
            json!({"thread_id": thread_id}),
            None,
            Some(-1),
        )
        .await?;
    store
        .append(
            &stream_name,
            "UserMessageAdded",
            json!({"message": trimmed, "timestamp": Utc::now().to_rfc3339()}),
            None,
            Some(pos),
        )
        .await?;

    Ok((thread_id, stream_name))
}

/// Appends a further user turn to an existing stream. Does not re-enter the
/// processing loop itself — callers that want the loop to pick this up
/// immediately should call `process_thread`/`process_thread_streaming`
/// afterwards.
pub async fn add_user_message(store: &EventStore, stream_name: &str, message: &str) -> Result<()> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(Error::Config("message must not be empty".into()));
    }
    store
        .append(
            stream_name,
            "UserMessageAdded",
            json!({"message": trimmed, "timestamp": Utc::now().to_rfc3339()}),
            None,
            None,
        )
        .await?;
    Ok(())
}

/// Requests termination: appends `SessionCompleted`. `reason` of `None`
/// records a graceful `"success"` completion; `Some(reason)` records the
/// caller's own reason string (e.g. an operator abort).
pub async fn terminate_session(
    store: &EventStore,
    stream_name: &str,
    reason: Option<&str>,
) -> Result<()> {
    let completion_reason = reason.unwrap_or("success");
    store
        .append(
            stream_name,
            "SessionCompleted",
            json!({"completion_reason": completion_reason}),
            None,
            None,
        )
        .await?;
    Ok(())
}
