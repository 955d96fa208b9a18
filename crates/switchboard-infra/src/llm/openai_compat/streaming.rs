//! Chat-completions SSE stream.

use std::sync::Arc;

use futures_util::StreamExt;

use switchboard_core::llm::frame::{Frame, parse_frame};
use switchboard_core::llm::provider::ChunkStream;
use switchboard_types::llm::InvocationError;

use super::ChatTarget;
use super::types::ChatRequest;
use crate::llm::http::sse_chunks;

fn decode(line: &str) -> Result<Frame, InvocationError> {
    Ok(parse_frame(line))
}

/// Send `body` and stream the text deltas of the response.
///
/// Request failures surface as the single item of the stream.
pub(crate) fn chat_stream(target: Arc<ChatTarget>, body: ChatRequest) -> ChunkStream {
    Box::pin(async_stream::try_stream! {
        let response = target.post(&body).await?;
        let mut chunks = sse_chunks(response, decode);
        while let Some(chunk) = chunks.next().await {
            yield chunk?;
        }
    })
}
