//! Cross-backend fallback chain.
//!
//! Walks a fixed sequence of states, trying the caller's preferred
//! configuration first and the system-wide default last. Within a state,
//! transient failures are retried against the same backend with bounded
//! exponential backoff; anything else advances to the next candidate.
//! Attempts are strictly sequential and a configuration id is attempted at
//! most once per run.

use std::fmt;
use std::time::Duration;

use futures_util::{StreamExt, stream};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use switchboard_types::llm::{InvocationError, InvocationResult, ProviderConfig, StreamChunk};

use crate::repository::config_store::ConfigStore;

use super::invoker::ProviderInvoker;
use super::provider::{ChunkStream, ProviderFactory};
use super::request::Prompt;
use super::resolver::ProviderConfigResolver;
use super::retry::RetryPolicy;

const CONNECTION_CHECK_PROMPT: &str = "Hello";
const CONNECTION_CHECK_MAX_TOKENS: u32 = 10;

/// One orchestrated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackRequest {
    pub prompt: String,
    /// Owner of the configurations to choose from.
    pub caller: String,
    pub preferred_config_id: Option<String>,
    pub system_instruction: Option<String>,
}

impl FallbackRequest {
    pub fn new(prompt: impl Into<String>, caller: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            caller: caller.into(),
            preferred_config_id: None,
            system_instruction: None,
        }
    }

    pub fn with_preferred(mut self, config_id: Option<String>) -> Self {
        self.preferred_config_id = config_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    fn prompt(&self) -> Prompt<'_> {
        Prompt::new(&self.prompt).with_system(self.system_instruction.as_deref())
    }
}

/// Position in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    TryPreferred,
    TryCallerDefault,
    TryAnyAvailable,
    TrySystemDefault,
    Exhausted,
}

impl FallbackState {
    /// The state following this one. `Exhausted` is terminal.
    pub fn next(self) -> Self {
        match self {
            FallbackState::TryPreferred => FallbackState::TryCallerDefault,
            FallbackState::TryCallerDefault => FallbackState::TryAnyAvailable,
            FallbackState::TryAnyAvailable => FallbackState::TrySystemDefault,
            FallbackState::TrySystemDefault | FallbackState::Exhausted => FallbackState::Exhausted,
        }
    }
}

impl fmt::Display for FallbackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FallbackState::TryPreferred => "try_preferred",
            FallbackState::TryCallerDefault => "try_caller_default",
            FallbackState::TryAnyAvailable => "try_any_available",
            FallbackState::TrySystemDefault => "try_system_default",
            FallbackState::Exhausted => "exhausted",
        };
        write!(f, "{s}")
    }
}

/// A stream that has already produced its first chunk.
pub struct StreamSelection {
    /// Every chunk, starting with the one that selected this backend.
    pub stream: ChunkStream,
    pub provider: String,
    pub model_name: String,
    pub model_id: String,
    pub failover_warning: Option<String>,
    /// Invocation attempts made before the stream was selected, this one included.
    pub attempts: u32,
}

impl fmt::Debug for StreamSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSelection")
            .field("provider", &self.provider)
            .field("model_name", &self.model_name)
            .field("model_id", &self.model_id)
            .field("failover_warning", &self.failover_warning)
            .field("attempts", &self.attempts)
            .field("stream", &"<stream>")
            .finish()
    }
}

/// Bookkeeping shared by the buffered and streaming runs.
#[derive(Default)]
struct ChainProgress {
    attempted: Vec<String>,
    failures: Vec<String>,
    attempts: u32,
    /// The configuration the caller would normally get.
    expected_id: Option<String>,
}

impl ChainProgress {
    fn claim(&mut self, config: &ProviderConfig) -> bool {
        if self.attempted.iter().any(|id| *id == config.id) {
            tracing::debug!(config_id = %config.id, "Config already attempted, skipping");
            return false;
        }
        self.attempted.push(config.id.clone());
        true
    }

    fn attempted_ids(&self) -> Vec<&str> {
        self.attempted.iter().map(String::as_str).collect()
    }

    fn failover_warning(&self, used: &ProviderConfig) -> Option<String> {
        let substituted = self.expected_id.as_deref().is_some_and(|id| id != used.id);
        if !substituted && self.failures.is_empty() {
            return None;
        }

        let target = format!("{} ({})", used.kind, used.effective_model());
        let warning = if self.failures.is_empty() {
            let expected = self.expected_id.as_deref().unwrap_or_default();
            format!("Switched to {target}: configuration '{expected}' is unavailable")
        } else {
            format!("Switched to {target} after: {}", self.failures.join("; "))
        };
        tracing::warn!(%warning, config_id = %used.id, "Failover occurred");
        Some(warning)
    }
}

/// Routes one prompt through the fallback chain.
pub struct FallbackOrchestrator<S, F> {
    resolver: ProviderConfigResolver<S>,
    invoker: ProviderInvoker<F>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<S: ConfigStore, F: ProviderFactory> FallbackOrchestrator<S, F> {
    pub fn new(resolver: ProviderConfigResolver<S>, invoker: ProviderInvoker<F>, retry: RetryPolicy) -> Self {
        let timeout = invoker.default_timeout();
        Self {
            resolver,
            invoker,
            retry,
            timeout,
        }
    }

    /// Override the per-attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &ProviderConfigResolver<S> {
        &self.resolver
    }

    /// One short call against the configuration stored under `config_id`
    /// (or the system default, by its id). No retry and no fallback.
    #[tracing::instrument(name = "check_connection", skip(self))]
    pub async fn check_connection(&self, config_id: &str) -> Result<InvocationResult, InvocationError> {
        let config = match self.resolver.by_id(config_id).await {
            Some(config) => config,
            None => self
                .resolver
                .system_default()
                .filter(|system| system.id == config_id)
                .ok_or_else(|| InvocationError::ConfigNotFound {
                    reference: config_id.to_string(),
                })?,
        };
        let config = config.with_max_tokens(CONNECTION_CHECK_MAX_TOKENS);

        let result = self.invoker.invoke(CONNECTION_CHECK_PROMPT, &config, self.timeout).await;
        tracing::info!(
            config_id,
            success = result.success(),
            elapsed_ms = result.elapsed_ms,
            "Connection check finished"
        );
        Ok(result)
    }

    /// Run the chain until a backend answers or every state is exhausted.
    #[tracing::instrument(name = "fallback_run", skip_all, fields(caller = %request.caller))]
    pub async fn run(&self, request: &FallbackRequest) -> InvocationResult {
        let started = Instant::now();
        let mut progress = ChainProgress {
            expected_id: request.preferred_config_id.clone(),
            ..ChainProgress::default()
        };
        let mut state = FallbackState::TryPreferred;

        while state != FallbackState::Exhausted {
            for config in self.candidates(state, request, &mut progress).await {
                if !progress.claim(&config) {
                    continue;
                }

                let (mut result, tries) = self.attempt(state, request.prompt(), &config).await;
                progress.attempts += tries;

                if result.success() {
                    result.failover_warning = progress.failover_warning(&config);
                    return result;
                }
                if let Some(message) = result.error_message() {
                    progress.failures.push(message);
                }
            }
            state = state.next();
        }

        tracing::warn!(
            attempts = progress.attempts,
            tried = progress.attempted.len(),
            "All providers failed"
        );
        InvocationResult::exhausted_after(progress.attempts, progress.failures, started.elapsed())
    }

    /// Run the chain in streaming mode.
    ///
    /// A backend is selected once its stream yields a first chunk. Failures
    /// before that advance the chain; later errors reach the consumer as
    /// stream items, without switching backend mid-answer.
    #[tracing::instrument(name = "fallback_stream", skip_all, fields(caller = %request.caller))]
    pub async fn run_streaming(
        &self,
        request: &FallbackRequest,
        cancel: CancellationToken,
    ) -> Result<StreamSelection, InvocationError> {
        let mut progress = ChainProgress {
            expected_id: request.preferred_config_id.clone(),
            ..ChainProgress::default()
        };
        let mut state = FallbackState::TryPreferred;

        while state != FallbackState::Exhausted {
            for config in self.candidates(state, request, &mut progress).await {
                if cancel.is_cancelled() {
                    return Err(InvocationError::Cancelled);
                }
                if !progress.claim(&config) {
                    continue;
                }

                let (outcome, tries) = self
                    .retry
                    .run(
                        |attempt| {
                            let span = tracing::info_span!(
                                "fallback_attempt",
                                state = %state,
                                attempt,
                                config_id = %config.id,
                            );
                            self.first_chunk(request.prompt(), &config, cancel.clone())
                                .instrument(span)
                        },
                        |outcome: &Result<(StreamChunk, ChunkStream), InvocationError>| {
                            matches!(outcome, Err(e) if e.is_transient())
                        },
                    )
                    .await;
                progress.attempts += tries;

                match outcome {
                    Ok((first, rest)) => {
                        let failover_warning = progress.failover_warning(&config);
                        return Ok(StreamSelection {
                            stream: Box::pin(stream::once(async move { Ok(first) }).chain(rest)),
                            provider: config.kind.to_string(),
                            model_name: config.effective_model().to_string(),
                            model_id: config.id.clone(),
                            failover_warning,
                            attempts: progress.attempts,
                        });
                    }
                    Err(InvocationError::Cancelled) => return Err(InvocationError::Cancelled),
                    Err(err) => {
                        tracing::warn!(state = %state, config_id = %config.id, error = %err, "Stream failed before first chunk");
                        progress
                            .failures
                            .push(format!("{} ({}): {err}", config.kind, config.effective_model()));
                    }
                }
            }
            state = state.next();
        }

        tracing::warn!(attempts = progress.attempts, "All providers failed (streaming)");
        Err(InvocationError::Exhausted {
            attempts: progress.attempts,
            failures: progress.failures,
        })
    }

    /// Configurations to try in `state`.
    async fn candidates(
        &self,
        state: FallbackState,
        request: &FallbackRequest,
        progress: &mut ChainProgress,
    ) -> Vec<ProviderConfig> {
        let found = match state {
            FallbackState::TryPreferred => match request.preferred_config_id.as_deref() {
                Some(id) => self.resolver.by_id(id).await.into_iter().collect(),
                None => Vec::new(),
            },
            FallbackState::TryCallerDefault => {
                let default = self.resolver.caller_default(&request.caller).await;
                if progress.expected_id.is_none() {
                    progress.expected_id = default.as_ref().map(|c| c.id.clone());
                }
                default.into_iter().collect()
            }
            FallbackState::TryAnyAvailable => {
                let exclude = progress.attempted_ids();
                self.resolver.available(&request.caller, &exclude).await
            }
            FallbackState::TrySystemDefault => self.resolver.system_default().into_iter().collect(),
            FallbackState::Exhausted => Vec::new(),
        };

        if found.is_empty() {
            tracing::debug!(state = %state, "No candidate in state, advancing");
        }
        found
    }

    /// Invoke one configuration with bounded retry.
    async fn attempt(&self, state: FallbackState, prompt: Prompt<'_>, config: &ProviderConfig) -> (InvocationResult, u32) {
        self.retry
            .run(
                |attempt| {
                    let span = tracing::info_span!(
                        "fallback_attempt",
                        state = %state,
                        attempt,
                        config_id = %config.id,
                    );
                    self.invoker.invoke(prompt, config, self.timeout).instrument(span)
                },
                |result: &InvocationResult| result.error().is_some_and(InvocationError::is_transient),
            )
            .await
    }

    /// Start a stream and wait for its first chunk.
    async fn first_chunk(
        &self,
        prompt: Prompt<'_>,
        config: &ProviderConfig,
        cancel: CancellationToken,
    ) -> Result<(StreamChunk, ChunkStream), InvocationError> {
        let mut stream = self.invoker.invoke_streaming(prompt, config, self.timeout, cancel);
        match stream.next().await {
            Some(Ok(chunk)) => Ok((chunk, stream)),
            Some(Err(err)) => Err(err),
            None => Err(InvocationError::EmptyResponse {
                field: "stream content".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::box_provider::BoxLlmProvider;
    use crate::llm::provider::LlmProvider;
    use secrecy::SecretString;
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::{Arc, Mutex};
    use switchboard_types::config::InvocationSettings;
    use switchboard_types::error::RepositoryError;
    use switchboard_types::llm::{CompletionRequest, CompletionResponse, ProviderKind};

    // --- Mock backends ---

    #[derive(Clone)]
    enum MockResult {
        Reply(&'static str),
        Fail(InvocationError),
        Chunks(Vec<&'static str>),
    }

    struct MockProvider {
        id: String,
        result: MockResult,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockProvider {
        fn log(&self) {
            self.calls.lock().unwrap().push(self.id.clone());
        }
    }

    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            &self.id
        }

        fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> impl Future<Output = Result<CompletionResponse, InvocationError>> + Send {
            self.log();
            let result = match &self.result {
                MockResult::Reply(text) => Ok(CompletionResponse {
                    content: text.to_string(),
                    model: "mock-model".to_string(),
                }),
                MockResult::Fail(err) => Err(err.clone()),
                MockResult::Chunks(chunks) => Ok(CompletionResponse {
                    content: chunks.concat(),
                    model: "mock-model".to_string(),
                }),
            };
            async move { result }
        }

        fn stream(&self, _request: CompletionRequest) -> ChunkStream {
            self.log();
            let items: Vec<Result<StreamChunk, InvocationError>> = match &self.result {
                MockResult::Reply(text) => vec![Ok(StreamChunk::new(*text))],
                MockResult::Fail(err) => vec![Err(err.clone())],
                MockResult::Chunks(chunks) => {
                    chunks.iter().map(|c| Ok(StreamChunk::new(*c))).collect()
                }
            };
            Box::pin(stream::iter(items))
        }
    }

    #[derive(Default)]
    struct MockFactory {
        results: HashMap<String, MockResult>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ProviderFactory for MockFactory {
        fn create(&self, config: &ProviderConfig) -> Result<BoxLlmProvider, InvocationError> {
            let result = self
                .results
                .get(&config.id)
                .cloned()
                .unwrap_or(MockResult::Fail(InvocationError::from_status(500, "unscripted")));
            Ok(BoxLlmProvider::new(MockProvider {
                id: config.id.clone(),
                result,
                calls: self.calls.clone(),
            }))
        }
    }

    // --- In-memory store ---

    #[derive(Default)]
    struct MemoryStore {
        configs: Vec<ProviderConfig>,
        default_id: Option<String>,
    }

    impl ConfigStore for MemoryStore {
        fn get_config_by_id(
            &self,
            id: &str,
        ) -> impl Future<Output = Result<Option<ProviderConfig>, RepositoryError>> + Send {
            let found = self.configs.iter().find(|c| c.id == id).cloned();
            async move { Ok(found) }
        }

        fn get_caller_default_config(
            &self,
            _caller: &str,
        ) -> impl Future<Output = Result<Option<ProviderConfig>, RepositoryError>> + Send {
            let found = self
                .default_id
                .as_ref()
                .and_then(|id| self.configs.iter().find(|c| &c.id == id).cloned());
            async move { Ok(found) }
        }

        fn list_caller_configs(
            &self,
            _caller: &str,
        ) -> impl Future<Output = Result<Vec<ProviderConfig>, RepositoryError>> + Send {
            let all = self.configs.clone();
            async move { Ok(all) }
        }
    }

    // --- Harness ---

    struct Harness {
        store: MemoryStore,
        factory: MockFactory,
        retry: RetryPolicy,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: MemoryStore::default(),
                factory: MockFactory::default(),
                retry: RetryPolicy::no_retry(),
            }
        }

        fn config(mut self, id: &str, result: MockResult) -> Self {
            let kind = ProviderKind::Compatible(format!("{id}-kind"));
            self.store
                .configs
                .push(ProviderConfig::new(id, kind, SecretString::from("sk-test")).with_model(format!("{id}-model")));
            self.factory.results.insert(id.to_string(), result);
            self
        }

        fn caller_default(mut self, id: &str) -> Self {
            self.store.default_id = Some(id.to_string());
            self
        }

        fn system(mut self, result: MockResult) -> Self {
            self.factory.results.insert("system-default".to_string(), result);
            self
        }

        fn retry(mut self, retry: RetryPolicy) -> Self {
            self.retry = retry;
            self
        }

        fn build(self) -> (FallbackOrchestrator<MemoryStore, MockFactory>, Arc<Mutex<Vec<String>>>) {
            let calls = self.factory.calls.clone();
            let system = ProviderConfig::new("system-default", ProviderKind::ZhipuAi, SecretString::from("sys-key"));
            let resolver = ProviderConfigResolver::new(self.store, Some(system));
            let invoker = ProviderInvoker::new(self.factory, InvocationSettings::default());
            (FallbackOrchestrator::new(resolver, invoker, self.retry), calls)
        }
    }

    fn auth_error() -> InvocationError {
        InvocationError::from_status(401, "bad key")
    }

    fn server_error() -> InvocationError {
        InvocationError::from_status(503, "overloaded")
    }

    fn request(preferred: Option<&str>) -> FallbackRequest {
        FallbackRequest::new("hello", "alice").with_preferred(preferred.map(str::to_string))
    }

    fn calls_of(calls: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        calls.lock().unwrap().clone()
    }

    // --- Buffered ---

    #[tokio::test]
    async fn test_preferred_succeeds() {
        let (orchestrator, calls) = Harness::new()
            .config("pref", MockResult::Reply("from pref"))
            .config("dflt", MockResult::Reply("from default"))
            .caller_default("dflt")
            .build();

        let result = orchestrator.run(&request(Some("pref"))).await;
        assert_eq!(result.content(), Some("from pref"));
        assert_eq!(result.model_id, "pref");
        assert!(result.failover_warning.is_none());
        assert_eq!(calls_of(&calls), vec!["pref"]);
    }

    #[tokio::test]
    async fn test_preferred_fails_caller_default_succeeds() {
        let (orchestrator, calls) = Harness::new()
            .config("pref", MockResult::Fail(auth_error()))
            .config("dflt", MockResult::Reply("from default"))
            .caller_default("dflt")
            .system(MockResult::Reply("from system"))
            .build();

        let result = orchestrator.run(&request(Some("pref"))).await;
        assert_eq!(result.content(), Some("from default"));
        assert_eq!(result.model_id, "dflt");
        assert_eq!(calls_of(&calls), vec!["pref", "dflt"]);

        let warning = result.failover_warning.unwrap();
        assert!(warning.contains("dflt-kind (dflt-model)"), "{warning}");
        assert!(warning.contains("HTTP 401"), "{warning}");
    }

    #[tokio::test]
    async fn test_caller_default_without_preference_has_no_warning() {
        let (orchestrator, _) = Harness::new()
            .config("dflt", MockResult::Reply("ok"))
            .caller_default("dflt")
            .build();

        let result = orchestrator.run(&request(None)).await;
        assert!(result.success());
        assert!(result.failover_warning.is_none());
    }

    #[tokio::test]
    async fn test_missing_preferred_is_substitution() {
        let (orchestrator, calls) = Harness::new()
            .config("dflt", MockResult::Reply("ok"))
            .caller_default("dflt")
            .build();

        let result = orchestrator.run(&request(Some("gone"))).await;
        assert!(result.success());
        assert_eq!(calls_of(&calls), vec!["dflt"]);
        assert!(result.failover_warning.unwrap().contains("'gone' is unavailable"));
    }

    #[tokio::test]
    async fn test_same_config_never_attempted_twice() {
        let (orchestrator, calls) = Harness::new()
            .config("pref", MockResult::Fail(auth_error()))
            .config("other", MockResult::Fail(auth_error()))
            .caller_default("pref")
            .system(MockResult::Fail(auth_error()))
            .build();

        let result = orchestrator.run(&request(Some("pref"))).await;
        assert!(!result.success());
        assert_eq!(calls_of(&calls), vec!["pref", "other", "system-default"]);
    }

    #[tokio::test]
    async fn test_any_available_walks_in_store_order() {
        let (orchestrator, calls) = Harness::new()
            .config("a", MockResult::Fail(auth_error()))
            .config("b", MockResult::Fail(auth_error()))
            .config("c", MockResult::Reply("third time lucky"))
            .build();

        let result = orchestrator.run(&request(None)).await;
        assert_eq!(result.content(), Some("third time lucky"));
        assert_eq!(calls_of(&calls), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_system_default_is_last_resort() {
        let (orchestrator, calls) = Harness::new()
            .config("pref", MockResult::Fail(auth_error()))
            .system(MockResult::Reply("from system"))
            .build();

        let result = orchestrator.run(&request(Some("pref"))).await;
        assert_eq!(result.content(), Some("from system"));
        assert_eq!(result.provider, "zhipuai");
        assert_eq!(calls_of(&calls), vec!["pref", "system-default"]);
    }

    #[tokio::test]
    async fn test_exhaustion_counts_attempts() {
        let (orchestrator, calls) = Harness::new()
            .config("pref", MockResult::Fail(auth_error()))
            .config("dflt", MockResult::Fail(auth_error()))
            .config("spare", MockResult::Fail(auth_error()))
            .caller_default("dflt")
            .system(MockResult::Fail(auth_error()))
            .build();

        let result = orchestrator.run(&request(Some("pref"))).await;
        let Some(InvocationError::Exhausted { attempts, failures }) = result.error() else {
            panic!("expected exhaustion, got {result:?}");
        };
        assert_eq!(*attempts, 4);
        assert_eq!(failures.len(), 4);
        assert_eq!(result.provider, "fallback");
        assert_eq!(result.model_name, "fallback");
        assert_eq!(result.model_id, "fallback");

        // Operators see why each candidate failed.
        let message = result.error_message().unwrap();
        assert!(message.starts_with(
            "All AI providers failed. Please check your AI model configurations and try again. Tried: "
        ));
        assert_eq!(message.matches("authentication failure").count(), 4);
        assert_eq!(calls_of(&calls).len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried_then_advance() {
        let (orchestrator, calls) = Harness::new()
            .config("pref", MockResult::Fail(server_error()))
            .config("dflt", MockResult::Reply("recovered"))
            .caller_default("dflt")
            .retry(RetryPolicy::default())
            .build();

        let result = orchestrator.run(&request(Some("pref"))).await;
        assert_eq!(result.content(), Some("recovered"));
        assert_eq!(calls_of(&calls), vec!["pref", "pref", "pref", "dflt"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_errors_not_retried() {
        let (orchestrator, calls) = Harness::new()
            .config("pref", MockResult::Fail(auth_error()))
            .system(MockResult::Fail(auth_error()))
            .retry(RetryPolicy::default())
            .build();

        let result = orchestrator.run(&request(Some("pref"))).await;
        assert!(matches!(
            result.error(),
            Some(InvocationError::Exhausted { attempts: 2, failures }) if failures.len() == 2
        ));
        assert_eq!(calls_of(&calls), vec!["pref", "system-default"]);
    }

    // --- Connection check ---

    #[tokio::test]
    async fn test_check_connection_calls_only_that_config() {
        let (orchestrator, calls) = Harness::new()
            .config("pref", MockResult::Fail(auth_error()))
            .config("dflt", MockResult::Reply("ok"))
            .caller_default("dflt")
            .system(MockResult::Reply("from system"))
            .build();

        let result = orchestrator.check_connection("pref").await.unwrap();
        assert!(!result.success());
        assert!(matches!(result.error(), Some(InvocationError::AuthenticationFailure { status: 401, .. })));
        assert_eq!(result.model_id, "pref");
        assert_eq!(calls_of(&calls), vec!["pref"]);

        let result = orchestrator.check_connection("dflt").await.unwrap();
        assert_eq!(result.content(), Some("ok"));
        assert!(result.failover_warning.is_none());
    }

    #[tokio::test]
    async fn test_check_connection_resolves_system_default_and_unknown_ids() {
        let (orchestrator, calls) = Harness::new().system(MockResult::Reply("hi")).build();

        let result = orchestrator.check_connection("system-default").await.unwrap();
        assert_eq!(result.content(), Some("hi"));
        assert_eq!(result.provider, "zhipuai");

        let err = orchestrator.check_connection("nope").await.unwrap_err();
        assert_eq!(
            err,
            InvocationError::ConfigNotFound {
                reference: "nope".to_string()
            }
        );
        assert_eq!(calls_of(&calls), vec!["system-default"]);
    }

    #[test]
    fn test_state_sequence() {
        let mut state = FallbackState::TryPreferred;
        let mut seen = vec![state.to_string()];
        while state != FallbackState::Exhausted {
            state = state.next();
            seen.push(state.to_string());
        }
        assert_eq!(
            seen,
            vec![
                "try_preferred",
                "try_caller_default",
                "try_any_available",
                "try_system_default",
                "exhausted"
            ]
        );
        assert_eq!(FallbackState::Exhausted.next(), FallbackState::Exhausted);
    }

    // --- Streaming ---

    #[tokio::test]
    async fn test_stream_fails_over_before_first_chunk() {
        let (orchestrator, calls) = Harness::new()
            .config("pref", MockResult::Fail(auth_error()))
            .config("dflt", MockResult::Chunks(vec!["A", "B", "C"]))
            .caller_default("dflt")
            .build();

        let selection = orchestrator
            .run_streaming(&request(Some("pref")), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(selection.model_id, "dflt");
        assert_eq!(selection.attempts, 2);
        assert!(selection.failover_warning.is_some());

        let text: String = selection
            .stream
            .map(|c| c.unwrap().text)
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(text, "ABC");
        assert_eq!(calls_of(&calls), vec!["pref", "dflt"]);
    }

    #[tokio::test]
    async fn test_stream_exhaustion() {
        let (orchestrator, _) = Harness::new()
            .config("pref", MockResult::Fail(auth_error()))
            .system(MockResult::Chunks(vec![]))
            .build();

        let err = orchestrator
            .run_streaming(&request(Some("pref")), CancellationToken::new())
            .await
            .unwrap_err();
        let InvocationError::Exhausted { attempts, failures } = &err else {
            panic!("expected exhaustion, got {err:?}");
        };
        assert_eq!(*attempts, 2);
        assert_eq!(failures.len(), 2);
        assert!(failures[0].contains("authentication failure"));
    }

    #[tokio::test]
    async fn test_stream_cancelled_before_start() {
        let (orchestrator, calls) = Harness::new()
            .config("pref", MockResult::Chunks(vec!["A"]))
            .build();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator
            .run_streaming(&request(Some("pref")), cancel)
            .await
            .unwrap_err();
        assert_eq!(err, InvocationError::Cancelled);
        assert!(calls_of(&calls).is_empty());
    }
}
