//! HTTP-backed LLM providers.
//!
//! [`HttpProviderFactory`] picks the wire format for a configuration and
//! builds the matching backend around one shared `reqwest::Client`.

pub mod anthropic;
pub mod http;
pub mod openai_compat;

use switchboard_core::llm::box_provider::BoxLlmProvider;
use switchboard_core::llm::provider::ProviderFactory;
use switchboard_types::llm::{InvocationError, ProviderConfig, WireFormat};

use self::anthropic::AnthropicProvider;
use self::openai_compat::OpenAiCompatibleProvider;

/// Create the backend for a resolved configuration.
pub fn create_provider(
    client: &reqwest::Client,
    config: &ProviderConfig,
) -> Result<BoxLlmProvider, InvocationError> {
    match config.kind.wire_format() {
        WireFormat::Anthropic => Ok(BoxLlmProvider::new(AnthropicProvider::new(client.clone(), config))),
        WireFormat::OpenAiCompatible => Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(
            client.clone(),
            config,
        )?)),
    }
}

/// [`ProviderFactory`] for the real HTTP backends.
#[derive(Clone)]
pub struct HttpProviderFactory {
    client: reqwest::Client,
}

impl HttpProviderFactory {
    pub fn new() -> Self {
        Self::with_client(http::http_client())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, config: &ProviderConfig) -> Result<BoxLlmProvider, InvocationError> {
        create_provider(&self.client, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use switchboard_types::llm::ProviderKind;

    fn config(kind: ProviderKind) -> ProviderConfig {
        ProviderConfig::new("cfg", kind, SecretString::from("sk-test-not-real"))
    }

    #[test]
    fn test_factory_picks_backend_by_kind() {
        let factory = HttpProviderFactory::new();
        assert_eq!(factory.create(&config(ProviderKind::Anthropic)).unwrap().name(), "anthropic");
        assert_eq!(factory.create(&config(ProviderKind::ZhipuAi)).unwrap().name(), "zhipuai");
        assert_eq!(factory.create(&config(ProviderKind::Gemini)).unwrap().name(), "gemini");
        assert_eq!(
            factory
                .create(&config(ProviderKind::Compatible("moonshot".to_string())).with_base_url("http://localhost:9000"))
                .unwrap()
                .name(),
            "moonshot"
        );
    }

    #[test]
    fn test_generic_without_base_url_fails() {
        let factory = HttpProviderFactory::new();
        let result = factory.create(&config(ProviderKind::Compatible("moonshot".to_string())));
        assert!(matches!(result, Err(InvocationError::ConfigNotFound { .. })));
    }

    #[tokio::test]
    async fn test_invoker_deadline_over_real_backend() {
        use std::time::Duration;
        use switchboard_core::llm::invoker::ProviderInvoker;
        use switchboard_types::config::InvocationSettings;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"choices": [{"message": {"content": "late"}}]}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let invoker = ProviderInvoker::new(HttpProviderFactory::new(), InvocationSettings::default());
        let cfg = config(ProviderKind::OpenAi).with_base_url(format!("{}/v1", server.uri()));
        let result = invoker.invoke("hello", &cfg, Duration::from_millis(200)).await;

        assert!(!result.success());
        assert_eq!(result.error(), Some(&InvocationError::Timeout { seconds: 1 }));
        assert_eq!(result.provider, "openai");
        assert_eq!(result.model_id, "cfg");
    }

    mod connection_check {
        use super::*;
        use crate::config::store::TomlConfigStore;
        use switchboard_core::llm::fallback::FallbackOrchestrator;
        use switchboard_core::llm::invoker::ProviderInvoker;
        use switchboard_core::llm::resolver::ProviderConfigResolver;
        use switchboard_core::llm::retry::RetryPolicy;
        use switchboard_types::config::{InvocationSettings, ProviderEntry};
        use wiremock::matchers::{body_partial_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn orchestrator(base_url: String) -> FallbackOrchestrator<TomlConfigStore, HttpProviderFactory> {
            let entry = ProviderEntry {
                id: "work".to_string(),
                kind: "openai".to_string(),
                base_url,
                api_key: "sk-test-not-real".to_string(),
                model: "gpt-4o".to_string(),
                temperature: None,
                max_tokens: None,
                caller: None,
                default: false,
            };
            FallbackOrchestrator::new(
                ProviderConfigResolver::new(TomlConfigStore::from_entries(&[entry]), None),
                ProviderInvoker::new(HttpProviderFactory::new(), InvocationSettings::default()),
                RetryPolicy::default(),
            )
        }

        #[tokio::test]
        async fn test_reachable_backend_reports_success() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .and(body_partial_json(serde_json::json!({
                    "model": "gpt-4o",
                    "max_tokens": 10,
                    "messages": [{"role": "user", "content": "Hello"}]
                })))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({"choices": [{"message": {"content": "Hi"}}]})),
                )
                .expect(1)
                .mount(&server)
                .await;

            let result = orchestrator(format!("{}/v1", server.uri()))
                .check_connection("work")
                .await
                .unwrap();
            assert!(result.success());
            assert_eq!(result.model_name, "gpt-4o");
            assert_eq!(result.model_id, "work");
        }

        #[tokio::test]
        async fn test_rejected_key_classified_without_retry() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
                .expect(1)
                .mount(&server)
                .await;

            let result = orchestrator(format!("{}/v1", server.uri()))
                .check_connection("work")
                .await
                .unwrap();
            assert_eq!(
                result.error(),
                Some(&InvocationError::AuthenticationFailure {
                    status: 401,
                    message: "invalid api key".to_string(),
                })
            );
        }
    }
}
