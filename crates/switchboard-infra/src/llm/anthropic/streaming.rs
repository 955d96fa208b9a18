//! Anthropic SSE stream.
//!
//! Text arrives in `content_block_delta` events, which the shared frame
//! parser already understands. Anthropic can also report a failure in the
//! middle of a stream with an `error` event; that ends the stream with
//! the classified error.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;

use switchboard_core::llm::frame::{Frame, parse_frame};
use switchboard_core::llm::provider::ChunkStream;
use switchboard_types::llm::InvocationError;

use super::client::MessagesTarget;
use super::types::{AnthropicRequest, StreamErrorPayload};
use crate::llm::http::sse_chunks;

/// Line decoder that fails on in-band error events.
pub fn decode_line(line: &str) -> Result<Frame, InvocationError> {
    if let Some(payload) = line.trim().strip_prefix("data:")
        && let Ok(value) = serde_json::from_str::<Value>(payload.trim())
        && value.get("type").and_then(Value::as_str) == Some("error")
    {
        let error = match serde_json::from_value::<StreamErrorPayload>(value) {
            Ok(payload) => payload.error.into_error(),
            Err(e) => InvocationError::MalformedEnvelope {
                detail: format!("unreadable stream error event: {e}"),
            },
        };
        tracing::warn!(error = %error, "Anthropic stream reported an error");
        return Err(error);
    }
    Ok(parse_frame(line))
}

pub(crate) fn create_anthropic_stream(target: Arc<MessagesTarget>, body: AnthropicRequest) -> ChunkStream {
    Box::pin(async_stream::try_stream! {
        let response = target.post(&body).await?;
        let mut chunks = sse_chunks(response, decode_line);
        while let Some(chunk) = chunks.next().await {
            yield chunk?;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta_passes_through() {
        let frame = decode_line(
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap();
        assert_eq!(frame, Frame::Text("Hi".to_string()));
    }

    #[test]
    fn test_lifecycle_events_ignored() {
        assert_eq!(decode_line("event: message_start").unwrap(), Frame::Ignored);
        assert_eq!(
            decode_line(r#"data: {"type":"message_stop"}"#).unwrap(),
            Frame::Ignored
        );
        assert_eq!(decode_line(r#"data: {"type":"ping"}"#).unwrap(), Frame::Ignored);
    }

    #[test]
    fn test_in_band_error_fails() {
        let err = decode_line(
            r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            InvocationError::RateLimitedOrServerError { status: 529, .. }
        ));
    }
}
