//! The streaming processing loop. Same control flow as `process_thread`,
//! but each model call is driven through `call_stream` and the caller
//! receives deltas and tool-execution progress as they happen, in
//! addition to the canonical events still being appended to the log.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;

use ea_domain::config::EngineConfig;
use ea_domain::error::{Error, Result};
use ea_domain::event::ToolCallRef;
use ea_domain::stream::{BoxStream, StreamDelta};
use ea_projections::{conversation_context, next_step, session_state, NextStep};
use ea_providers::ModelClient;
use ea_store::EventStore;
use ea_tools::{ToolExecutor, ToolRegistry};

use crate::processing::{build_chat_request, read_all};
use crate::progress::AgentProgress;

/// Accumulates a tool call's id/name/argument fragments across a stream,
/// in first-seen index order.
#[derive(Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    args_buffer: String,
}

pub fn process_thread_streaming(
    store: EventStore,
    model: Arc<dyn ModelClient>,
    tools: ToolRegistry,
    config: EngineConfig,
    stream_name: String,
    system_prompt: Option<String>,
) -> BoxStream<'static, Result<AgentProgress>> {
    let stream = async_stream::stream! {
        let mut iteration = 0usize;
        let mut terminated = false;

        while iteration < config.max_iterations {
            let events = match read_all(&store, &stream_name).await {
                Ok(events) => events,
                Err(e) => { yield Err(e); return; }
            };
            if events.is_empty() {
                yield Err(Error::Other(format!(
                    "stream '{stream_name}' has no events; call start_session first"
                )));
                return;
            }

            let step = match next_step(&events) {
                Ok(step) => step,
                Err(e) => { yield Err(e); return; }
            };

            match step {
                NextStep::Terminate { .. } => {
                    terminated = true;
                    break;
                }
                NextStep::CallModel { .. } => {
                    let context = conversation_context(&events);
                    let message_count = context.len();
                    let req = build_chat_request(system_prompt.as_deref(), context, &tools);

                    if let Err(e) = store
                        .append(
                            &stream_name,
                            "LLMCallStarted",
                            json!({"message_count": message_count, "tool_count": req.tools.len()}),
                            None,
                            None,
                        )
                        .await
                    {
                        yield Err(e);
                        return;
                    }

                    let mut inner = match model.call_stream(&req).await {
                        Ok(inner) => inner,
                        Err(e) => {
                            let _ = store
                                .append(
                                    &stream_name,
                                    "LLMCallFailed",
                                    json!({"error_message": e.to_string(), "retry_count": 0}),
                                    None,
                                    None,
                                )
                                .await;
                            yield Err(e);
                            return;
                        }
                    };

                    let mut text = String::new();
                    let mut builders: Vec<ToolCallBuilder> = Vec::new();
                    let mut model_name = model.model_name().to_string();
                    let mut token_usage: HashMap<String, u64> = HashMap::new();
                    let mut stream_error = None;

                    while let Some(item) = inner.next().await {
                        match item {
                            Ok(delta) => {
                                match &delta {
                                    StreamDelta::Text { text: fragment } => text.push_str(fragment),
                                    StreamDelta::ToolCall { index, id, name } => {
                                        if builders.len() <= *index {
                                            builders.resize_with(*index + 1, ToolCallBuilder::default);
                                        }
                                        builders[*index].id = id.clone();
                                        builders[*index].name = name.clone();
                                    }
                                    StreamDelta::ToolInput { index, input_delta } => {
                                        if builders.len() <= *index {
                                            builders.resize_with(*index + 1, ToolCallBuilder::default);
                                        }
                                        builders[*index].args_buffer.push_str(input_delta);
                                    }
                                    StreamDelta::Done { token_usage: usage } => {
                                        token_usage = usage.clone();
                                    }
                                    StreamDelta::Error { message } => {
                                        stream_error = Some(message.clone());
                                    }
                                }
                                yield Ok(AgentProgress::Delta(delta));
                            }
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }

                    if let Some(message) = stream_error {
                        if let Err(e) = store
                            .append(
                                &stream_name,
                                "LLMCallFailed",
                                json!({"error_message": message, "retry_count": 0}),
                                None,
                                None,
                            )
                            .await
                        {
                            yield Err(e);
                            return;
                        }
                    } else {
                        let tool_calls: Vec<ToolCallRef> = builders
                            .into_iter()
                            .filter(|b| !b.id.is_empty())
                            .map(|b| ToolCallRef {
                                id: b.id,
                                name: b.name,
                                arguments: serde_json::from_str(&b.args_buffer)
                                    .unwrap_or(serde_json::Value::Null),
                            })
                            .collect();
                        if model_name.is_empty() {
                            model_name = "unknown".to_string();
                        }
                        if let Err(e) = store
                            .append(
                                &stream_name,
                                "LLMResponseReceived",
                                json!({
                                    "response_text": text,
                                    "tool_calls": tool_calls,
                                    "model_name": model_name,
                                    "token_usage": token_usage,
                                }),
                                None,
                                None,
                            )
                            .await
                        {
                            yield Err(e);
                            return;
                        }
                    }
                }
                NextStep::ExecuteTools { calls, .. } => {
                    let executor = ToolExecutor::new(&tools);
                    for (index, call) in calls.iter().enumerate() {
                        if let Err(e) = store
                            .append(
                                &stream_name,
                                "ToolExecutionRequested",
                                json!({"tool_name": call.name, "arguments": call.arguments}),
                                Some(json!({"tool_id": call.id, "tool_index": index})),
                                None,
                            )
                            .await
                        {
                            yield Err(e);
                            return;
                        }
                        if let Err(e) = store
                            .append(
                                &stream_name,
                                "ToolExecutionStarted",
                                json!({"tool_name": call.name, "arguments": call.arguments}),
                                Some(json!({"tool_id": call.id, "tool_index": index})),
                                None,
                            )
                            .await
                        {
                            yield Err(e);
                            return;
                        }
                        yield Ok(AgentProgress::ToolStarted {
                            call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                        });

                        let result = executor.execute(&call.name, call.arguments.clone()).await;
                        if result.success {
                            let result_value = result.result.clone().unwrap_or(serde_json::Value::Null);
                            if let Err(e) = store
                                .append(
                                    &stream_name,
                                    "ToolExecutionCompleted",
                                    json!({
                                        "tool_name": result.tool_name,
                                        "result": result_value,
                                        "execution_time_ms": result.execution_time_ms,
                                    }),
                                    Some(json!({"tool_call_id": call.id})),
                                    None,
                                )
                                .await
                            {
                                yield Err(e);
                                return;
                            }
                            yield Ok(AgentProgress::ToolCompleted {
                                call_id: call.id.clone(),
                                tool_name: result.tool_name,
                                result: result_value,
                            });
                        } else {
                            let error_message = result.error_message.unwrap_or_default();
                            if let Err(e) = store
                                .append(
                                    &stream_name,
                                    "ToolExecutionFailed",
                                    json!({
                                        "tool_name": result.tool_name,
                                        "error_message": error_message,
                                        "retry_count": 0,
                                    }),
                                    Some(json!({"tool_call_id": call.id})),
                                    None,
                                )
                                .await
                            {
                                yield Err(e);
                                return;
                            }
                            yield Ok(AgentProgress::ToolFailed {
                                call_id: call.id.clone(),
                                tool_name: result.tool_name,
                                error_message,
                            });
                        }
                    }
                }
            }

            iteration += 1;
        }

        if !terminated {
            yield Err(Error::MaxIterationsExceeded(config.max_iterations));
            return;
        }

        match read_all(&store, &stream_name).await {
            Ok(events) => match session_state(&events) {
                Ok(state) => yield Ok(AgentProgress::Complete(state)),
                Err(e) => yield Err(e),
            },
            Err(e) => yield Err(e),
        }
    };

    Box::pin(stream)
}
