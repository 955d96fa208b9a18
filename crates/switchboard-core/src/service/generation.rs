//! Structured generation: prompt in, JSON value out.
//!
//! `StructuredGenerationService` protects credentials in the user's input,
//! runs the fallback chain, extracts a structured value from the answer and
//! restores the credentials inside it. If the answer holds nothing usable
//! (or no backend answered), an action is rebuilt from the input itself.
//! Every call is audited in the background with the protected prompt.

use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use switchboard_types::audit::AuditRecord;
use switchboard_types::extraction::{ExtractionOutcome, SchemaHints};
use switchboard_types::llm::{InvocationError, InvocationResult, StreamChunk};

use crate::audit::AuditQueueHandle;
use crate::extract::ResilientStructuredExtractor;
use crate::llm::fallback::{FallbackOrchestrator, FallbackRequest, StreamSelection};
use crate::llm::provider::{ChunkStream, ProviderFactory};
use crate::repository::config_store::ConfigStore;
use crate::vault::{SensitiveTokenVault, TokenPlaceholderMap};

/// Operation name recorded for HTTP-action generation.
pub const HTTP_ACTION_OPERATION: &str = "http_action_generation";
/// Operation name recorded for plain questions.
pub const ASK_OPERATION: &str = "ask";

const HTTP_ACTION_INSTRUCTIONS: &str = "\
Turn the request below into an HTTP action plan (be concise).
Return only JSON with this structure:
{
  \"actionPlan\": {
    \"actions\": [
      {
        \"name\": \"snake_case_name\",
        \"httpConfig\": {
          \"method\": \"GET|POST|PUT|DELETE|PATCH\",
          \"url\": \"full URL without query string\",
          \"headers\": {\"Header-Name\": \"value\"},
          \"params\": {\"query_param\": \"value\"},
          \"body\": null
        }
      }
    ]
  }
}
Copy URLs, header values and placeholders such as __AUTH_TOKEN_0__ exactly as given.";

/// Channel capacity between the audited stream producer and its consumer.
const STREAM_BUFFER: usize = 64;

/// Input to a structured generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Name recorded in the audit trail.
    pub operation: String,
    pub caller: String,
    pub preferred_config_id: Option<String>,
    /// Task description placed before the user input.
    pub instructions: String,
    pub user_input: String,
    pub hints: SchemaHints,
}

impl GenerationRequest {
    /// HTTP-action generation from a free-form description or curl command.
    pub fn http_action(caller: impl Into<String>, user_input: impl Into<String>) -> Self {
        Self {
            operation: HTTP_ACTION_OPERATION.to_string(),
            caller: caller.into(),
            preferred_config_id: None,
            instructions: HTTP_ACTION_INSTRUCTIONS.to_string(),
            user_input: user_input.into(),
            hints: SchemaHints::action_plan(),
        }
    }

    /// A plain question, sent without instructions.
    pub fn ask(caller: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            operation: ASK_OPERATION.to_string(),
            caller: caller.into(),
            preferred_config_id: None,
            instructions: String::new(),
            user_input: prompt.into(),
            hints: SchemaHints::any(),
        }
    }

    pub fn with_preferred(mut self, config_id: Option<String>) -> Self {
        self.preferred_config_id = config_id;
        self
    }
}

/// Result of a structured generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    /// The invocation result, with credentials restored in its content.
    pub result: InvocationResult,
    pub extraction: ExtractionOutcome,
    /// How many distinct tokens were hidden from the backend.
    pub protected_tokens: usize,
}

/// A live generation stream, audited when it ends.
pub struct GenerationStream {
    /// Raw chunks as produced by the backend. Placeholders are not restored.
    pub stream: ChunkStream,
    pub provider: String,
    pub model_name: String,
    pub model_id: String,
    pub failover_warning: Option<String>,
    placeholders: TokenPlaceholderMap,
}

impl GenerationStream {
    /// Put protected tokens back into text assembled from the chunks.
    pub fn restore(&self, text: &str) -> String {
        SensitiveTokenVault::new().restore(text, &self.placeholders)
    }

    pub fn protected_tokens(&self) -> usize {
        self.placeholders.len()
    }
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream")
            .field("provider", &self.provider)
            .field("model_name", &self.model_name)
            .field("model_id", &self.model_id)
            .field("failover_warning", &self.failover_warning)
            .field("stream", &"<stream>")
            .finish()
    }
}

/// Prompt → fallback chain → structured value, audited.
pub struct StructuredGenerationService<S, F> {
    orchestrator: FallbackOrchestrator<S, F>,
    audit: AuditQueueHandle,
    vault: SensitiveTokenVault,
    extractor: ResilientStructuredExtractor,
}

impl<S: ConfigStore, F: ProviderFactory> StructuredGenerationService<S, F> {
    pub fn new(orchestrator: FallbackOrchestrator<S, F>, audit: AuditQueueHandle) -> Self {
        Self {
            orchestrator,
            audit,
            vault: SensitiveTokenVault::new(),
            extractor: ResilientStructuredExtractor::new(),
        }
    }

    pub fn orchestrator(&self) -> &FallbackOrchestrator<S, F> {
        &self.orchestrator
    }

    #[tracing::instrument(
        name = "generate",
        skip_all,
        fields(operation = %request.operation, caller = %request.caller)
    )]
    pub async fn generate(&self, request: &GenerationRequest) -> GenerationOutcome {
        let started_at = Utc::now();
        let clock = Instant::now();

        let protected = self.vault.protect(&request.user_input);
        let prompt = compose_prompt(&request.instructions, &protected.text);
        let fallback = FallbackRequest::new(prompt.as_str(), request.caller.as_str())
            .with_preferred(request.preferred_config_id.clone());

        let result = self.orchestrator.run(&fallback).await;

        let extraction = match result.content() {
            Some(content) => match self.extractor.extract(content, &request.hints) {
                ExtractionOutcome::Structured { value, strategy } => ExtractionOutcome::Structured {
                    value: self.vault.restore_value(value, &protected.map),
                    strategy,
                },
                _ => {
                    tracing::info!("Response held no structured value, rebuilding from input");
                    self.extractor.reconstruct(&request.user_input)
                }
            },
            None => self.extractor.reconstruct(&request.user_input),
        };

        let record = AuditRecord::new(
            request.operation.as_str(),
            prompt,
            result.clone(),
            started_at,
            clock.elapsed().as_millis() as u64,
        );
        self.audit.enqueue(with_metadata(
            record,
            protected.map.len(),
            &extraction,
            &result.failover_warning,
        ));

        let mut result = result;
        if let Ok(content) = &mut result.outcome {
            *content = self.vault.restore(content, &protected.map);
        }

        GenerationOutcome {
            result,
            extraction,
            protected_tokens: protected.map.len(),
        }
    }

    /// Run the chain without extraction and return the answer with
    /// credentials restored. Audited like [`generate`](Self::generate).
    #[tracing::instrument(
        name = "complete",
        skip_all,
        fields(operation = %request.operation, caller = %request.caller)
    )]
    pub async fn complete(&self, request: &GenerationRequest) -> InvocationResult {
        let started_at = Utc::now();
        let clock = Instant::now();

        let protected = self.vault.protect(&request.user_input);
        let prompt = compose_prompt(&request.instructions, &protected.text);
        let fallback = FallbackRequest::new(prompt.as_str(), request.caller.as_str())
            .with_preferred(request.preferred_config_id.clone());

        let mut result = self.orchestrator.run(&fallback).await;

        let mut record = AuditRecord::new(
            request.operation.as_str(),
            prompt,
            result.clone(),
            started_at,
            clock.elapsed().as_millis() as u64,
        )
        .with_metadata("protected_tokens", protected.map.len());
        if let Some(warning) = &result.failover_warning {
            record = record.with_metadata("failover_warning", warning.as_str());
        }
        self.audit.enqueue(record);

        if let Ok(content) = &mut result.outcome {
            *content = self.vault.restore(content, &protected.map);
        }
        result
    }

    /// Stream the raw answer for progress display.
    ///
    /// The record is audited once the stream ends, is dropped, or fails.
    pub async fn generate_stream(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<GenerationStream, InvocationError> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let protected = self.vault.protect(&request.user_input);
        let prompt = compose_prompt(&request.instructions, &protected.text);
        let fallback = FallbackRequest::new(prompt.as_str(), request.caller.as_str())
            .with_preferred(request.preferred_config_id.clone());

        let selection = match self.orchestrator.run_streaming(&fallback, cancel).await {
            Ok(selection) => selection,
            Err(err) => {
                let result = InvocationResult::exhausted(0, clock.elapsed());
                let result = InvocationResult {
                    outcome: Err(err.clone()),
                    ..result
                };
                let record = AuditRecord::new(
                    request.operation.as_str(),
                    prompt,
                    result,
                    started_at,
                    clock.elapsed().as_millis() as u64,
                )
                .with_metadata("protected_tokens", protected.map.len())
                .with_metadata("streamed", true);
                self.audit.enqueue(record);
                return Err(err);
            }
        };

        let StreamSelection {
            stream: upstream,
            provider,
            model_name,
            model_id,
            failover_warning,
            ..
        } = selection;

        let audited = AuditedStream {
            audit: self.audit.clone(),
            record: AuditRecord::new(
                request.operation.as_str(),
                prompt,
                InvocationResult {
                    provider: provider.clone(),
                    model_name: model_name.clone(),
                    model_id: model_id.clone(),
                    outcome: Ok(String::new()),
                    elapsed_ms: 0,
                    failover_warning: failover_warning.clone(),
                },
                started_at,
                0,
            )
            .with_metadata("protected_tokens", protected.map.len())
            .with_metadata("streamed", true),
            clock,
        };

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(audited.forward(upstream, tx));

        Ok(GenerationStream {
            stream: Box::pin(ReceiverStream::new(rx)),
            provider,
            model_name,
            model_id,
            failover_warning,
            placeholders: protected.map,
        })
    }
}

/// Forwards a selected stream and audits what passed through it.
struct AuditedStream {
    audit: AuditQueueHandle,
    record: AuditRecord,
    clock: Instant,
}

impl AuditedStream {
    async fn forward(
        mut self,
        mut upstream: ChunkStream,
        tx: mpsc::Sender<Result<StreamChunk, InvocationError>>,
    ) {
        let mut content = String::new();
        let mut failure: Option<InvocationError> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = tx.closed() => {
                    failure.get_or_insert(InvocationError::Cancelled);
                    break;
                }
                item = upstream.next() => item,
            };
            let Some(item) = next else {
                break;
            };
            match &item {
                Ok(chunk) => content.push_str(&chunk.text),
                Err(err) => failure = Some(err.clone()),
            }
            if tx.send(item).await.is_err() {
                failure.get_or_insert(InvocationError::Cancelled);
                break;
            }
        }
        // Releases the backend connection before the audit write.
        drop(upstream);

        let elapsed: Duration = self.clock.elapsed();
        self.record.duration_ms = elapsed.as_millis() as u64;
        self.record.result.elapsed_ms = elapsed.as_millis() as u64;
        self.record.result.outcome = match failure {
            Some(err) => Err(err),
            None => Ok(content),
        };
        tracing::debug!(
            record_id = %self.record.id,
            success = self.record.result.success(),
            "Stream finished, auditing"
        );
        self.audit.enqueue(self.record);
    }
}

fn compose_prompt(instructions: &str, input: &str) -> String {
    let instructions = instructions.trim();
    if instructions.is_empty() {
        input.to_string()
    } else {
        format!("{instructions}\n\nINPUT:\n{input}")
    }
}

fn with_metadata(
    record: AuditRecord,
    protected_tokens: usize,
    extraction: &ExtractionOutcome,
    failover_warning: &Option<String>,
) -> AuditRecord {
    let record = record
        .with_metadata("protected_tokens", protected_tokens)
        .with_metadata("strategy", extraction.label());
    match failover_warning {
        Some(warning) => record.with_metadata("failover_warning", warning.as_str()),
        None => record,
    }
}
