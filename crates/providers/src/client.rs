//! Adapts the capability-driven [`LlmRouter`] into the uniform
//! [`ModelClient`] surface the engine depends on, fixed to one
//! [`ModelRole`] for the lifetime of the client.
//!
//! Non-streaming calls get the router's full fallback chain; streaming
//! calls go straight to the role's primary provider — there is no
//! mid-stream fallback, matching the fact that a stream already in
//! progress cannot be silently replayed against a different provider.

use std::sync::Arc;

use async_trait::async_trait;

use ea_domain::capability::ModelRole;
use ea_domain::error::{Error, Result};
use ea_domain::event::ToolCallRef;
use ea_domain::stream::{BoxStream, StreamDelta};

use crate::router::{role_to_string, LlmRouter};
use crate::traits::{ChatRequest, ModelClient, ProviderModelClient, Response};

pub struct RouterModelClient {
    router: Arc<LlmRouter>,
    role: ModelRole,
    model_name: String,
}

impl RouterModelClient {
    pub fn new(router: Arc<LlmRouter>, role: ModelRole) -> Self {
        let role_str = role_to_string(role);
        let model_name = router
            .registry()
            .model_for_role(&role_str)
            .unwrap_or("unknown")
            .to_string();
        Self {
            router,
            role,
            model_name,
        }
    }
}

#[async_trait]
impl ModelClient for RouterModelClient {
    async fn call(&self, req: &ChatRequest) -> Result<Response> {
        let resp = self.router.chat_for_role(self.role, req.clone()).await?;
        Ok(Response {
            text: if resp.content.is_empty() { None } else { Some(resp.content) },
            tool_calls: resp.tool_calls.iter().map(ToolCallRef::from).collect(),
            model_name: resp.model,
            token_usage: resp.usage.map(|u| u.to_token_usage()).unwrap_or_default(),
        })
    }

    async fn call_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamDelta>>> {
        let role_str = role_to_string(self.role);
        let provider = self.router.registry().for_role(&role_str).ok_or_else(|| {
            Error::Config(format!("no provider configured for role '{role_str}'"))
        })?;
        ProviderModelClient::new(provider).call_stream(req).await
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderRegistry;
    use crate::traits::{ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
    use crate::wire::StreamEvent;
    use ea_domain::capability::LlmCapabilities;
    use ea_domain::config::RoleConfig;
    use ea_domain::stream::BoxStream;
    use std::collections::HashMap;

    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: "hello from stub".into(),
                tool_calls: Vec::new(),
                model: "stub-model".into(),
                finish_reason: Some("stop".into()),
                usage: None,
            })
        }

        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            Ok(Box::pin(futures_util::stream::empty()))
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!("not exercised in this test")
        }

        fn capabilities(&self) -> &LlmCapabilities {
            static CAPS: std::sync::OnceLock<LlmCapabilities> = std::sync::OnceLock::new();
            CAPS.get_or_init(LlmCapabilities::default)
        }

        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn router() -> LlmRouter {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        providers.insert("stub".into(), Arc::new(StubProvider));
        let registry = ProviderRegistry::from_providers(
            providers,
            HashMap::from([("planner".to_string(), "stub/stub-model".to_string())]),
        );
        let role_configs = HashMap::from([(
            "planner".to_string(),
            RoleConfig {
                model: "stub/stub-model".into(),
                require_tools: false,
                require_json: false,
                require_streaming: false,
                fallbacks: Vec::new(),
            },
        )]);
        LlmRouter::new(registry, role_configs, 5_000)
    }

    #[test]
    fn new_resolves_model_name_from_registry() {
        let client = RouterModelClient::new(Arc::new(router()), ModelRole::Planner);
        assert_eq!(client.model_name(), "stub/stub-model");
    }

    #[tokio::test]
    async fn call_delegates_to_router_and_maps_empty_content_to_none() {
        let client = RouterModelClient::new(Arc::new(router()), ModelRole::Planner);
        let resp = client.call(&ChatRequest::default()).await.unwrap();
        assert_eq!(resp.text.as_deref(), Some("hello from stub"));
        assert!(resp.tool_calls.is_empty());
    }
}
