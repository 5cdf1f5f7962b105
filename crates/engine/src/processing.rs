//! The processing loop: read -> project next step -> execute -> append,
//! in both a buffered (`process_thread`) and streaming
//! (`process_thread_streaming`) flavor.

use std::time::Duration;

use serde_json::json;

use ea_domain::config::EngineConfig;
use ea_domain::error::{Error, Result};
use ea_domain::event::{Event, ToolCallRef};
use ea_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use ea_projections::{conversation_context, next_step, session_state, ConversationMessage, NextStep, SessionState};
use ea_providers::{ChatRequest, ModelClient};
use ea_store::EventStore;
use ea_tools::{ToolExecutor, ToolRegistry};

const READ_BATCH_SIZE: i64 = 500;

/// Pages through `read_stream` until exhausted. The processing loop always
/// wants the whole thread, never a partial read.
pub(crate) async fn read_all(store: &EventStore, stream_name: &str) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    let mut from_position = 0i64;
    loop {
        let batch = store
            .read_stream(stream_name, from_position, READ_BATCH_SIZE)
            .await?;
        let got = batch.len() as i64;
        events.extend(batch);
        if got < READ_BATCH_SIZE {
            break;
        }
        from_position += got;
    }
    Ok(events)
}

fn to_provider_message(message: ConversationMessage) -> Message {
    match message {
        ConversationMessage::User { text } => Message::user(text),
        ConversationMessage::Assistant { text, tool_calls } => {
            if tool_calls.is_empty() {
                Message::assistant(text.unwrap_or_default())
            } else {
                let mut parts = Vec::new();
                if let Some(text) = text {
                    if !text.is_empty() {
                        parts.push(ContentPart::Text { text });
                    }
                }
                for call in tool_calls {
                    parts.push(ContentPart::ToolUse {
                        id: call.id,
                        name: call.name,
                        input: call.arguments,
                    });
                }
                Message {
                    role: Role::Assistant,
                    content: MessageContent::Parts(parts),
                }
            }
        }
        ConversationMessage::Tool {
            tool_call_id, text, ..
        } => Message::tool_result(tool_call_id, text),
    }
}

pub(crate) fn build_chat_request(
    system_prompt: Option<&str>,
    context: Vec<ConversationMessage>,
    tools: &ToolRegistry,
) -> ChatRequest {
    let mut messages = Vec::with_capacity(context.len() + 1);
    if let Some(system_prompt) = system_prompt {
        if !system_prompt.is_empty() {
            messages.push(Message::system(system_prompt));
        }
    }
    messages.extend(context.into_iter().map(to_provider_message));

    let tool_defs: Vec<ToolDefinition> = tools
        .declarations()
        .into_iter()
        .map(|d| ToolDefinition {
            name: d.name,
            description: d.description,
            parameters: d.parameters,
        })
        .collect();

    ChatRequest {
        messages,
        tools: tool_defs,
        ..Default::default()
    }
}

/// Backoff before a retried LLM call: short and linear in attempt number,
/// matching the spec's "short backoff, bounded" requirement without
/// inventing an elaborate policy the tests don't ask for.
async fn retry_backoff(attempt: u32) {
    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
}

/// Drives a single session stream to termination (or `MaxIterationsExceeded`).
pub async fn process_thread(
    store: &EventStore,
    model: &dyn ModelClient,
    tools: &ToolRegistry,
    config: &EngineConfig,
    stream_name: &str,
    system_prompt: Option<&str>,
) -> Result<SessionState> {
    let mut iteration = 0usize;
    let mut terminated = false;

    while iteration < config.max_iterations {
        let events = read_all(store, stream_name).await?;
        if events.is_empty() {
            return Err(Error::Other(format!(
                "stream '{stream_name}' has no events; call start_session first"
            )));
        }

        match next_step(&events)? {
            NextStep::Terminate { .. } => {
                terminated = true;
                break;
            }
            NextStep::CallModel { .. } => {
                let context = conversation_context(&events);
                let message_count = context.len();
                let req = build_chat_request(system_prompt, context, tools);

                store
                    .append(
                        stream_name,
                        "LLMCallStarted",
                        json!({"message_count": message_count, "tool_count": req.tools.len()}),
                        None,
                        None,
                    )
                    .await?;

                let mut attempt = 0u32;
                let mut last_error = None;
                let mut response = None;
                loop {
                    match model.call(&req).await {
                        Ok(r) => {
                            response = Some(r);
                            break;
                        }
                        Err(e) => {
                            last_error = Some(e);
                            if attempt >= config.max_retries {
                                break;
                            }
                            attempt += 1;
                            retry_backoff(attempt).await;
                        }
                    }
                }

                match response {
                    Some(resp) => {
                        store
                            .append(
                                stream_name,
                                "LLMResponseReceived",
                                json!({
                                    "response_text": resp.text.unwrap_or_default(),
                                    "tool_calls": resp.tool_calls,
                                    "model_name": resp.model_name,
                                    "token_usage": resp.token_usage,
                                }),
                                None,
                                None,
                            )
                            .await?;
                    }
                    None => {
                        let message = last_error.map(|e| e.to_string()).unwrap_or_default();
                        store
                            .append(
                                stream_name,
                                "LLMCallFailed",
                                json!({"error_message": message, "retry_count": attempt}),
                                None,
                                None,
                            )
                            .await?;
                    }
                }
            }
            NextStep::ExecuteTools { calls, .. } => {
                execute_tool_calls(store, tools, stream_name, &calls).await?;
            }
        }

        iteration += 1;
    }

    if !terminated {
        return Err(Error::MaxIterationsExceeded(config.max_iterations));
    }

    let events = read_all(store, stream_name).await?;
    session_state(&events)
}

async fn execute_tool_calls(
    store: &EventStore,
    tools: &ToolRegistry,
    stream_name: &str,
    calls: &[ToolCallRef],
) -> Result<()> {
    let executor = ToolExecutor::new(tools);
    for (index, call) in calls.iter().enumerate() {
        store
            .append(
                stream_name,
                "ToolExecutionRequested",
                json!({"tool_name": call.name, "arguments": call.arguments}),
                Some(json!({"tool_id": call.id, "tool_index": index})),
                None,
            )
            .await?;
        store
            .append(
                stream_name,
                "ToolExecutionStarted",
                json!({"tool_name": call.name, "arguments": call.arguments}),
                Some(json!({"tool_id": call.id, "tool_index": index})),
                None,
            )
            .await?;

        let result = executor.execute(&call.name, call.arguments.clone()).await;
        if result.success {
            store
                .append(
                    stream_name,
                    "ToolExecutionCompleted",
                    json!({
                        "tool_name": result.tool_name,
                        "result": result.result,
                        "execution_time_ms": result.execution_time_ms,
                    }),
                    Some(json!({"tool_call_id": call.id})),
                    None,
                )
                .await?;
        } else {
            store
                .append(
                    stream_name,
                    "ToolExecutionFailed",
                    json!({
                        "tool_name": result.tool_name,
                        "error_message": result.error_message.unwrap_or_default(),
                        "retry_count": 0,
                    }),
                    Some(json!({"tool_call_id": call.id})),
                    None,
                )
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_message_with_tool_calls_carries_text_and_tool_use_parts() {
        let calls = vec![ToolCallRef {
            id: "c1".into(),
            name: "add".into(),
            arguments: json!({"a": 1, "b": 2}),
        }];
        let message = to_provider_message(ConversationMessage::Assistant {
            text: Some("calling add".into()),
            tool_calls: calls,
        });
        match message.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 2);
                assert!(matches!(parts[0], ContentPart::Text { .. }));
                assert!(matches!(parts[1], ContentPart::ToolUse { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn assistant_message_without_tool_calls_is_plain_text() {
        let message = to_provider_message(ConversationMessage::Assistant {
            text: Some("done".into()),
            tool_calls: vec![],
        });
        assert_eq!(message.content.extract_all_text(), "done");
    }
}
