//! Shared reqwest plumbing for the HTTP backends.
//!
//! Status classification, body decoding and the SSE body-to-chunk adapter
//! live here so every backend reports failures the same way.

use std::time::Duration;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;

use switchboard_core::llm::frame::{Frame, LineDecoder, StreamFrameParser};
use switchboard_core::llm::provider::ChunkStream;
use switchboard_types::llm::{InvocationError, StreamChunk};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the client shared by every backend.
///
/// No overall request timeout is set here; the invoker owns the deadline.
pub fn http_client() -> reqwest::Client {
    match reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        }
    }
}

/// Map a reqwest failure onto the invocation taxonomy.
///
/// The URL is stripped so query-string credentials never reach logs.
pub(crate) fn transport_error(e: reqwest::Error) -> InvocationError {
    let e = e.without_url();
    if e.is_decode() {
        return InvocationError::MalformedEnvelope {
            detail: e.to_string(),
        };
    }
    InvocationError::Transport {
        message: e.to_string(),
    }
}

/// Pass 2xx responses through; turn anything else into a classified error.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, InvocationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(status = status.as_u16(), body_len = body.len(), "Backend returned error status");
    Err(InvocationError::from_status(status.as_u16(), &body))
}

/// Decode a buffered JSON body into `T`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, InvocationError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|e| InvocationError::MalformedEnvelope {
        detail: format!("response body is not valid JSON: {e}"),
    })
}

/// Adapt an SSE response body into text chunks.
///
/// Reading stops at the `[DONE]` sentinel or when the body ends.
pub(crate) fn sse_chunks(response: reqwest::Response, decode: LineDecoder) -> ChunkStream {
    Box::pin(async_stream::try_stream! {
        let mut parser = StreamFrameParser::with_decoder(decode);
        let mut body = response.bytes_stream();

        while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(transport_error)?;
            for frame in parser.push(&bytes) {
                if let Frame::Text(text) = frame? {
                    yield StreamChunk::new(text);
                }
            }
            if parser.is_done() {
                break;
            }
        }

        for frame in parser.finish() {
            if let Frame::Text(text) = frame? {
                yield StreamChunk::new(text);
            }
        }
    })
}
