use ea_domain::capability::LlmCapabilities;
use ea_domain::error::Result;
use ea_domain::event::ToolCallRef;
use ea_domain::stream::{BoxStream, StreamDelta};
use ea_domain::tool::{Message, ToolCall, ToolDefinition};
use std::collections::HashMap;
use std::sync::Arc;

use crate::wire::{StreamEvent, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature (0.0 – 2.0). `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// When `true`, request the model to respond with valid JSON only.
    pub json_mode: bool,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Textual content of the response.
    pub content: String,
    /// Tool calls emitted by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage information.
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    /// The reason the model stopped generating (e.g. "stop", "tool_calls").
    pub finish_reason: Option<String>,
}

/// A request for text embeddings.
#[derive(Debug, Clone)]
pub struct EmbeddingsRequest {
    /// Input texts to embed.
    pub input: Vec<String>,
    /// Model to use. When `None`, the provider uses its default embedding model.
    pub model: Option<String>,
}

/// An embeddings response.
#[derive(Debug, Clone)]
pub struct EmbeddingsResponse {
    /// One embedding vector per input text.
    pub embeddings: Vec<Vec<f32>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every LLM adapter must implement.
///
/// Implementations are provider-specific adapters (OpenAI-compat, Anthropic,
/// Google Gemini) that translate between our internal types and the wire format
/// of each provider's HTTP API.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and return a stream of wire-level events.
    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// Generate text embeddings.
    async fn embeddings(&self, req: EmbeddingsRequest) -> Result<EmbeddingsResponse>;

    /// The advertised capabilities of this provider/model combination.
    fn capabilities(&self) -> &LlmCapabilities;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Uniform model-client surface
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A normalized, non-streaming model response: the shape the engine's
/// processing loop actually consumes, independent of which provider or
/// router produced it.
#[derive(Debug, Clone)]
pub struct Response {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRef>,
    pub model_name: String,
    pub token_usage: HashMap<String, u64>,
}

/// The uniform interface the engine calls against, hiding whether a single
/// provider or a capability-routed fallback chain sits behind it.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    async fn call(&self, req: &ChatRequest) -> Result<Response>;
    async fn call_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamDelta>>>;
    fn model_name(&self) -> &str;
}

/// Adapts any [`LlmProvider`] into a [`ModelClient`], translating the
/// provider's wire-level response/stream vocabulary into the public
/// contract the engine depends on.
pub struct ProviderModelClient {
    provider: Arc<dyn LlmProvider>,
}

impl ProviderModelClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl ModelClient for ProviderModelClient {
    async fn call(&self, req: &ChatRequest) -> Result<Response> {
        let resp = self.provider.chat(req).await?;
        Ok(Response {
            text: if resp.content.is_empty() { None } else { Some(resp.content) },
            tool_calls: resp.tool_calls.iter().map(ToolCallRef::from).collect(),
            model_name: resp.model,
            token_usage: resp.usage.map(|u| u.to_token_usage()).unwrap_or_default(),
        })
    }

    async fn call_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamDelta>>> {
        use futures_util::StreamExt;

        let mut inner = self.provider.chat_stream(req).await?;
        let stream = async_stream::stream! {
            // call_id -> tool-call index, in first-seen order.
            let mut tool_indices: HashMap<String, usize> = HashMap::new();
            // call_ids that have already had at least one delta emitted --
            // some providers (Anthropic) stream args incrementally, others
            // (Google) only ever send the finished, fully-assembled args.
            let mut deltas_seen: std::collections::HashSet<String> = std::collections::HashSet::new();

            while let Some(item) = inner.next().await {
                match item {
                    Ok(StreamEvent::Thinking { .. }) => {
                        // Reasoning content is not part of the public contract.
                    }
                    Ok(StreamEvent::Token { text }) => {
                        yield Ok(StreamDelta::Text { text });
                    }
                    Ok(StreamEvent::ToolCallStarted { call_id, tool_name }) => {
                        let index = tool_indices.len();
                        tool_indices.insert(call_id.clone(), index);
                        yield Ok(StreamDelta::ToolCall { index, id: call_id, name: tool_name });
                    }
                    Ok(StreamEvent::ToolCallDelta { call_id, delta }) => {
                        let index = *tool_indices.entry(call_id.clone()).or_insert(0);
                        deltas_seen.insert(call_id);
                        yield Ok(StreamDelta::ToolInput { index, input_delta: delta });
                    }
                    Ok(StreamEvent::ToolCallFinished { call_id, arguments, .. }) => {
                        // Providers that never stream deltas carry the whole
                        // argument object here; synthesize a single ToolInput
                        // chunk so the consumer's accumulation logic still works.
                        if !deltas_seen.contains(&call_id) {
                            let index = *tool_indices.entry(call_id).or_insert(0);
                            yield Ok(StreamDelta::ToolInput {
                                index,
                                input_delta: arguments.to_string(),
                            });
                        }
                    }
                    Ok(StreamEvent::Done { usage, .. }) => {
                        yield Ok(StreamDelta::Done {
                            token_usage: usage.map(|u| u.to_token_usage()).unwrap_or_default(),
                        });
                    }
                    Ok(StreamEvent::Error { message }) => {
                        yield Ok(StreamDelta::Error { message });
                    }
                    Err(e) => {
                        yield Err(e);
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        self.provider.provider_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    /// A provider test double whose `chat_stream` replays a fixed script of
    /// wire-level events, used to exercise `ProviderModelClient`'s
    /// translation into the public `StreamDelta` vocabulary without any
    /// network I/O.
    struct ScriptedProvider {
        capabilities: LlmCapabilities,
        script: Vec<Result<StreamEvent>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            unimplemented!("not exercised by these tests")
        }

        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            let events: Vec<Result<StreamEvent>> = self
                .script
                .iter()
                .map(|e| match e {
                    Ok(ev) => Ok(clone_stream_event(ev)),
                    Err(_) => Err(ea_domain::error::Error::Other("scripted error".into())),
                })
                .collect();
            Ok(Box::pin(futures_util::stream::iter(events)))
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!("not exercised by these tests")
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    fn clone_stream_event(event: &StreamEvent) -> StreamEvent {
        match event {
            StreamEvent::Thinking { text } => StreamEvent::Thinking { text: text.clone() },
            StreamEvent::Token { text } => StreamEvent::Token { text: text.clone() },
            StreamEvent::ToolCallStarted { call_id, tool_name } => StreamEvent::ToolCallStarted {
                call_id: call_id.clone(),
                tool_name: tool_name.clone(),
            },
            StreamEvent::ToolCallDelta { call_id, delta } => StreamEvent::ToolCallDelta {
                call_id: call_id.clone(),
                delta: delta.clone(),
            },
            StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                StreamEvent::ToolCallFinished {
                    call_id: call_id.clone(),
                    tool_name: tool_name.clone(),
                    arguments: arguments.clone(),
                }
            }
            StreamEvent::Done { usage, finish_reason } => StreamEvent::Done {
                usage: usage.clone(),
                finish_reason: finish_reason.clone(),
            },
            StreamEvent::Error { message } => StreamEvent::Error { message: message.clone() },
        }
    }

    fn caps() -> LlmCapabilities {
        LlmCapabilities {
            supports_tools: ea_domain::capability::ToolSupport::StrictJson,
            supports_streaming: true,
            supports_json_mode: false,
            supports_vision: false,
            context_window_tokens: None,
            max_output_tokens: None,
        }
    }

    #[tokio::test]
    async fn call_stream_preserves_text_and_precedes_tool_input_with_tool_call() {
        let provider = Arc::new(ScriptedProvider {
            capabilities: caps(),
            script: vec![
                Ok(StreamEvent::Token { text: "Hel".into() }),
                Ok(StreamEvent::Token { text: "lo".into() }),
                Ok(StreamEvent::ToolCallStarted { call_id: "c1".into(), tool_name: "add".into() }),
                Ok(StreamEvent::ToolCallDelta { call_id: "c1".into(), delta: "{\"a\":1".into() }),
                Ok(StreamEvent::ToolCallDelta { call_id: "c1".into(), delta: "}".into() }),
                Ok(StreamEvent::Done { usage: None, finish_reason: Some("tool_calls".into()) }),
            ],
        });
        let client = ProviderModelClient::new(provider);
        let req = ChatRequest::default();
        let deltas: Vec<StreamDelta> = client
            .call_stream(&req)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        // Exactly one ToolCall delta precedes any ToolInput for index 0.
        let tool_call_pos = deltas.iter().position(|d| matches!(d, StreamDelta::ToolCall { .. })).unwrap();
        let first_tool_input_pos = deltas.iter().position(|d| matches!(d, StreamDelta::ToolInput { .. })).unwrap();
        assert!(tool_call_pos < first_tool_input_pos);

        // Done is strictly last.
        assert!(matches!(deltas.last().unwrap(), StreamDelta::Done { .. }));

        // Text deltas concatenate to the expected string.
        let text: String = deltas
            .iter()
            .filter_map(|d| match d {
                StreamDelta::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn call_stream_synthesizes_single_tool_input_for_non_incremental_providers() {
        // Some providers (Google) only ever emit a fully-assembled ToolCallFinished,
        // never a ToolCallDelta. The translation must still produce exactly one
        // ToolInput chunk so downstream accumulation logic works uniformly.
        let provider = Arc::new(ScriptedProvider {
            capabilities: caps(),
            script: vec![
                Ok(StreamEvent::ToolCallStarted { call_id: "c1".into(), tool_name: "add".into() }),
                Ok(StreamEvent::ToolCallFinished {
                    call_id: "c1".into(),
                    tool_name: "add".into(),
                    arguments: serde_json::json!({"a": 1, "b": 2}),
                }),
                Ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) }),
            ],
        });
        let client = ProviderModelClient::new(provider);
        let deltas: Vec<StreamDelta> = client
            .call_stream(&ChatRequest::default())
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        let tool_inputs: Vec<&StreamDelta> = deltas
            .iter()
            .filter(|d| matches!(d, StreamDelta::ToolInput { .. }))
            .collect();
        assert_eq!(tool_inputs.len(), 1);
    }

    #[tokio::test]
    async fn call_maps_empty_content_to_none_text() {
        struct EmptyChatProvider(LlmCapabilities);
        #[async_trait::async_trait]
        impl LlmProvider for EmptyChatProvider {
            async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
                Ok(ChatResponse {
                    content: String::new(),
                    tool_calls: vec![ToolCall {
                        call_id: "c1".into(),
                        tool_name: "add".into(),
                        arguments: serde_json::json!({}),
                    }],
                    usage: None,
                    model: "test-model".into(),
                    finish_reason: Some("tool_calls".into()),
                })
            }
            async fn chat_stream(
                &self,
                _req: &ChatRequest,
            ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
                unimplemented!()
            }
            async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
                unimplemented!()
            }
            fn capabilities(&self) -> &LlmCapabilities {
                &self.0
            }
            fn provider_id(&self) -> &str {
                "empty"
            }
        }

        let client = ProviderModelClient::new(Arc::new(EmptyChatProvider(caps())));
        let resp = client.call(&ChatRequest::default()).await.unwrap();
        assert!(resp.text.is_none());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.model_name, "test-model");
    }
}
