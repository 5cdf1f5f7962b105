//! The streaming render orchestrator (§4.H): coordinates a dual-phase
//! stream — the agent's processing loop, then a second model call that
//! renders the resulting event stream as a view — over a single outbound
//! sequence of progress items.
//!
//! This crate is deliberately thin, per spec: it does not speak HTTP or
//! SSE (that's the external streaming HTTP collaborator's job, §6), it
//! does not sanitise HTML (the HTML sanitiser is an external collaborator
//! too), and it does not implement the terminal UI. It only produces the
//! fixed, ordered sequence of progress items the collaborator is expected
//! to frame as `agent_start | agent_delta | agent_complete | html_start |
//! html_chunk | result | error` SSE events.

use futures_util::StreamExt;

use ea_domain::config::EngineConfig;
use ea_domain::error::Result;
use ea_domain::event::StreamName;
use ea_domain::stream::{BoxStream, StreamDelta};
use ea_domain::tool::Message;
use ea_engine::{process_thread_streaming, session, AgentProgress};
use ea_projections::{display_prefs, SessionState};
use ea_providers::{ChatRequest, ModelClient};
use ea_store::EventStore;
use ea_tools::ToolRegistry;

/// One item of the orchestrator's fixed outbound ordering. The
/// `agent_*` items are omitted entirely when no user message is supplied
/// (see `render`'s doc comment).
#[derive(Debug, Clone)]
pub enum ProgressItem {
    AgentStart,
    AgentDelta(StreamDelta),
    AgentComplete(SessionState),
    HtmlStart,
    HtmlChunk(String),
    Result { html: String, display_prefs: String },
    Error { message: String },
}

/// Renders a view of `thread_id`'s event stream, optionally driving a new
/// user turn first. The system prompt used for the render phase describes
/// how the rendering model should turn a JSON event list into a view; it is
/// intentionally generic rather than HTML-specific, since the actual markup
/// dialect (and its sanitisation) belongs to the external rendering
/// collaborator, not this crate.
///
/// Ordering: `agent_start, agent_delta*, agent_complete, html_start,
/// html_chunk*, result` — with the agent-phase items omitted entirely when
/// `user_message` is `None`. On any error, exactly one `Error` item is
/// yielded and the stream ends.
pub fn render(
    store: EventStore,
    agent_model: std::sync::Arc<dyn ModelClient>,
    render_model: std::sync::Arc<dyn ModelClient>,
    tools: ToolRegistry,
    engine_config: EngineConfig,
    category: String,
    version: Option<String>,
    thread_id: String,
    user_message: Option<String>,
    previous_html: Option<String>,
) -> BoxStream<'static, ProgressItem> {
    let stream = async_stream::stream! {
        let stream_name = StreamName::build(&category, version.as_deref(), &thread_id);

        if let Some(message) = user_message {
            yield ProgressItem::AgentStart;

            if let Err(e) = session::add_user_message(&store, &stream_name, &message).await {
                yield ProgressItem::Error { message: e.to_string() };
                return;
            }

            let mut agent_stream = process_thread_streaming(
                store.clone(),
                agent_model,
                tools,
                engine_config,
                stream_name.clone(),
                None,
            );

            loop {
                match agent_stream.next().await {
                    Some(Ok(AgentProgress::Delta(delta))) => {
                        yield ProgressItem::AgentDelta(delta);
                    }
                    Some(Ok(AgentProgress::Complete(state))) => {
                        yield ProgressItem::AgentComplete(state);
                        break;
                    }
                    Some(Ok(_other_progress)) => {
                        // Tool-start/complete/failed progress is forwarded as
                        // part of the agent phase's delta stream by callers
                        // that want it; the orchestrator's fixed ordering
                        // only names agent_delta/agent_complete, so those
                        // are folded away here rather than invented a new
                        // SSE event name the spec doesn't call for.
                    }
                    Some(Err(e)) => {
                        yield ProgressItem::Error { message: e.to_string() };
                        return;
                    }
                    None => break,
                }
            }
        }

        let events = match read_all(&store, &stream_name).await {
            Ok(events) => events,
            Err(e) => {
                yield ProgressItem::Error { message: e.to_string() };
                return;
            }
        };

        let prefs_stream = format!("display-prefs:{thread_id}");
        let prefs_events = match read_all(&store, &prefs_stream).await {
            Ok(events) => events,
            Err(e) => {
                yield ProgressItem::Error { message: e.to_string() };
                return;
            }
        };
        let prefs = display_prefs(&prefs_events);

        yield ProgressItem::HtmlStart;

        let req = build_render_request(&events, &prefs, previous_html.as_deref());
        let mut inner = match render_model.call_stream(&req).await {
            Ok(inner) => inner,
            Err(e) => {
                yield ProgressItem::Error { message: e.to_string() };
                return;
            }
        };

        let mut html = String::new();
        while let Some(item) = inner.next().await {
            match item {
                Ok(StreamDelta::Text { text }) => {
                    html.push_str(&text);
                    yield ProgressItem::HtmlChunk(text);
                }
                Ok(StreamDelta::Error { message }) => {
                    yield ProgressItem::Error { message };
                    return;
                }
                Ok(_) => {
                    // The render phase is a plain text-generation call; it
                    // declares no tools, so tool-call deltas never occur.
                }
                Err(e) => {
                    yield ProgressItem::Error { message: e.to_string() };
                    return;
                }
            }
        }

        yield ProgressItem::Result { html, display_prefs: prefs };
    };

    Box::pin(stream)
}

async fn read_all(store: &EventStore, stream_name: &str) -> Result<Vec<ea_domain::event::Event>> {
    let mut events = Vec::new();
    let mut from_position = 0i64;
    const BATCH: i64 = 500;
    loop {
        let batch = store.read_stream(stream_name, from_position, BATCH).await?;
        let got = batch.len() as i64;
        events.extend(batch);
        if got < BATCH {
            break;
        }
        from_position += got;
    }
    Ok(events)
}

fn build_render_request(
    events: &[ea_domain::event::Event],
    prefs: &str,
    previous_html: Option<&str>,
) -> ChatRequest {
    let system_prompt = format!(
        "Render the following agent event stream as a view for a human to \
         read, honoring these display preferences: {prefs}. Respond with the \
         rendered view only, no commentary."
    );

    let event_summaries: Vec<serde_json::Value> = events
        .iter()
        .map(|e| {
            serde_json::json!({
                "type": e.event_type,
                "position": e.position,
                "data": e.data,
            })
        })
        .collect();

    let mut body = serde_json::json!({ "events": event_summaries }).to_string();
    if let Some(previous) = previous_html {
        body = format!("{body}\n\nPrevious rendering (update incrementally if helpful):\n{previous}");
    }

    ChatRequest {
        messages: vec![Message::system(system_prompt), Message::user(body)],
        tools: Vec::new(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(event_type: &str, data: serde_json::Value) -> ea_domain::event::Event {
        ea_domain::event::Event {
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
    fn render_request_carries_preferences_and_events_as_json() {
        let events = vec![event("UserMessageAdded", json!({"message": "hi"}))];
        let req = build_render_request(&events, "terse", None);
        assert!(req.tools.is_empty());
        assert_eq!(req.messages.len(), 2);
        let system_text = req.messages[0].content.extract_all_text();
        assert!(system_text.contains("terse"));
        let body_text = req.messages[1].content.extract_all_text();
        assert!(body_text.contains("UserMessageAdded"));
    }

    #[test]
    fn render_request_includes_previous_html_when_supplied() {
        let events = vec![event("UserMessageAdded", json!({"message": "hi"}))];
        let req = build_render_request(&events, "default", Some("<p>old</p>"));
        let body_text = req.messages[1].content.extract_all_text();
        assert!(body_text.contains("<p>old</p>"));
    }
}
