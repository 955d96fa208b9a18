//! Single-backend invocation with a hard deadline.
//!
//! `ProviderInvoker` turns one prompt plus one resolved configuration into
//! exactly one [`InvocationResult`] (or one chunk stream). Every failure,
//! including the deadline firing, is converted into a typed error; nothing
//! escapes as a panic.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use switchboard_types::config::InvocationSettings;
use switchboard_types::llm::{InvocationError, InvocationResult, ProviderConfig, StreamChunk};

use super::box_provider::BoxLlmProvider;
use super::provider::{ChunkStream, ProviderFactory};
use super::request::{Prompt, build_request};

type ChunkSender = mpsc::Sender<Result<StreamChunk, InvocationError>>;

/// Issues calls to one backend at a time.
pub struct ProviderInvoker<F> {
    factory: F,
    settings: InvocationSettings,
}

impl<F: ProviderFactory> ProviderInvoker<F> {
    pub fn new(factory: F, settings: InvocationSettings) -> Self {
        Self { factory, settings }
    }

    pub fn settings(&self) -> &InvocationSettings {
        &self.settings
    }

    /// Deadline applied when the caller does not pick one.
    pub fn default_timeout(&self) -> Duration {
        self.settings.timeout()
    }

    /// Run one buffered completion against `config`.
    #[tracing::instrument(
        name = "invoke",
        skip_all,
        fields(provider = %config.kind, model = %config.effective_model(), config_id = %config.id)
    )]
    pub async fn invoke<'a>(
        &self,
        prompt: impl Into<Prompt<'a>>,
        config: &ProviderConfig,
        timeout: Duration,
    ) -> InvocationResult {
        let prompt = prompt.into();
        let started = Instant::now();
        let outcome = self.complete_within(prompt, config, timeout).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(content) => {
                debug!(elapsed_ms = elapsed.as_millis() as u64, "Invocation succeeded");
                InvocationResult::succeeded(config, content, elapsed)
            }
            Err(err) => {
                warn!(error = %err, elapsed_ms = elapsed.as_millis() as u64, "Invocation failed");
                InvocationResult::failed(config, err, elapsed)
            }
        }
    }

    async fn complete_within(
        &self,
        prompt: Prompt<'_>,
        config: &ProviderConfig,
        timeout: Duration,
    ) -> Result<String, InvocationError> {
        let provider = self.provider_for(config)?;
        let request = build_request(prompt.text, prompt.system, config, &self.settings, false);

        match tokio::time::timeout(timeout, provider.complete(&request)).await {
            Err(_) => Err(InvocationError::timeout(timeout)),
            Ok(Err(err)) => Err(err),
            Ok(Ok(response)) if response.content.trim().is_empty() => {
                Err(InvocationError::EmptyResponse {
                    field: "content".to_string(),
                })
            }
            Ok(Ok(response)) => Ok(response.content),
        }
    }

    /// Start a streaming completion against `config`.
    ///
    /// A producer task pulls frames from the backend and forwards chunks
    /// through a bounded channel; the returned stream is its receiving end.
    /// The producer stops, dropping the upstream response, when the deadline
    /// fires, `cancel` is triggered, or the returned stream is dropped.
    /// Failures arrive as a final `Err` item.
    pub fn invoke_streaming<'a>(
        &self,
        prompt: impl Into<Prompt<'a>>,
        config: &ProviderConfig,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> ChunkStream {
        let prompt = prompt.into();
        let (tx, rx) = mpsc::channel(self.settings.stream_buffer.max(1));

        match self.provider_for(config) {
            Ok(provider) => {
                let request = build_request(prompt.text, prompt.system, config, &self.settings, true);
                let upstream = provider.stream(request);
                let span = tracing::debug_span!(
                    "invoke_stream",
                    provider = %config.kind,
                    model = %config.effective_model(),
                    config_id = %config.id,
                );
                tokio::spawn(tracing::Instrument::instrument(
                    produce_chunks(upstream, tx, timeout, cancel),
                    span,
                ));
            }
            Err(err) => {
                warn!(provider = %config.kind, config_id = %config.id, error = %err, "Cannot start stream");
                // Fresh channel with capacity >= 1, so this cannot fail.
                let _ = tx.try_send(Err(err));
            }
        }

        Box::pin(ReceiverStream::new(rx))
    }

    fn provider_for(&self, config: &ProviderConfig) -> Result<BoxLlmProvider, InvocationError> {
        if !config.has_credentials() {
            return Err(InvocationError::ConfigNotFound {
                reference: format!("{} (no API key configured)", config.id),
            });
        }
        self.factory.create(config)
    }
}

/// Forward upstream chunks until the stream ends, fails, or is stopped.
async fn produce_chunks(
    mut upstream: ChunkStream,
    tx: ChunkSender,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut produced = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(produced, "Stream cancelled by caller");
                let _ = tx.send(Err(InvocationError::Cancelled)).await;
                return;
            }
            _ = tx.closed() => {
                debug!(produced, "Stream consumer dropped");
                return;
            }
            _ = &mut deadline => {
                warn!(produced, "Stream deadline exceeded");
                let _ = tx.send(Err(InvocationError::timeout(timeout))).await;
                return;
            }
            item = upstream.next() => item,
        };

        match next {
            Some(Ok(chunk)) if chunk.text.is_empty() => {}
            Some(Ok(chunk)) => {
                produced += 1;
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            Some(Err(err)) => {
                warn!(produced, error = %err, "Stream failed");
                let _ = tx.send(Err(err)).await;
                return;
            }
            None => {
                if produced == 0 {
                    let _ = tx
                        .send(Err(InvocationError::EmptyResponse {
                            field: "stream content".to_string(),
                        }))
                        .await;
                }
                debug!(produced, "Stream finished");
                return;
            }
        }
    }
}
