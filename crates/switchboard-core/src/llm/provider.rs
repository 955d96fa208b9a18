//! LlmProvider trait definition.
//!
//! This is the core abstraction that every backend implements.
//! Uses RPITIT for `complete`, and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use switchboard_types::llm::{
    CompletionRequest, CompletionResponse, InvocationError, ProviderConfig, StreamChunk,
};

use super::box_provider::BoxLlmProvider;

/// Boxed stream of text chunks produced by one streaming call.
pub type ChunkStream =
    Pin<Box<dyn Stream<Item = Result<StreamChunk, InvocationError>> + Send + 'static>>;

/// Trait for LLM backends (OpenAI-compatible, Anthropic, etc.).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition) for
/// `complete`. The `stream` method returns a boxed stream because streams
/// need to be object-safe for `BoxLlmProvider`.
///
/// Implementations live in switchboard-infra. They report failures through
/// [`InvocationError`] and never panic on upstream data.
pub trait LlmProvider: Send + Sync {
    /// Provider label (e.g., "anthropic", "deepseek").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, InvocationError>> + Send;

    /// Send a streaming completion request. Returns chunks in arrival order.
    fn stream(&self, request: CompletionRequest) -> ChunkStream;
}

/// Builds the backend that serves a resolved configuration.
///
/// The orchestration layer depends only on this trait, never on concrete
/// backend types.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, config: &ProviderConfig) -> Result<BoxLlmProvider, InvocationError>;
}
