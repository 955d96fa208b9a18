//! Server-sent-event frame parsing shared by every streaming backend.
//!
//! Backends stream newline-delimited frames. Lines starting with `data:`
//! carry a JSON payload and `data: [DONE]` ends the stream. The payload
//! shape differs between providers, so text is looked up in several places:
//!
//! 1. `choices[0].delta.content` (OpenAI, DeepSeek, ZhipuAI)
//! 2. `choices[0].delta.text`
//! 3. top-level `content`
//! 4. `choices[0].message.content` (some compatible gateways)
//! 5. top-level `delta.text` (Anthropic `content_block_delta`)

use serde_json::Value;

use switchboard_types::llm::InvocationError;

/// Prefix of frames that carry a payload.
const DATA_PREFIX: &str = "data:";
/// Payload that terminates a stream.
const DONE_SENTINEL: &str = "[DONE]";

/// What a single line of a streaming response means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A non-empty piece of model output.
    Text(String),
    /// End-of-stream sentinel.
    Done,
    /// Blank lines, comments, event names, metadata-only or unparseable payloads.
    Ignored,
}

/// Interpret one raw line of a streaming response.
pub fn parse_frame(raw_line: &str) -> Frame {
    let line = raw_line.trim_end_matches(['\r', '\n']);
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };

    let payload = data.trim();
    if payload.is_empty() {
        return Frame::Ignored;
    }
    if payload == DONE_SENTINEL {
        return Frame::Done;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => match frame_text(&value) {
            Some(text) => Frame::Text(text.to_string()),
            None => Frame::Ignored,
        },
        Err(e) => {
            tracing::debug!(error = %e, frame_len = payload.len(), "Skipping unparseable stream frame");
            Frame::Ignored
        }
    }
}

/// First non-empty text field found in a parsed payload.
pub fn frame_text(payload: &Value) -> Option<&str> {
    let choice = payload.pointer("/choices/0");
    [
        choice.and_then(|c| c.pointer("/delta/content")),
        choice.and_then(|c| c.pointer("/delta/text")),
        payload.get("content"),
        choice.and_then(|c| c.pointer("/message/content")),
        payload.pointer("/delta/text"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|text| !text.is_empty())
}

// ---------------------------------------------------------------------------
// StreamFrameParser
// ---------------------------------------------------------------------------

/// Turns one complete line into a frame, or fails the stream.
///
/// Backends that signal errors in-band supply their own decoder; the
/// default is [`parse_frame`], which never fails.
pub type LineDecoder = fn(&str) -> Result<Frame, InvocationError>;

fn decode_default(line: &str) -> Result<Frame, InvocationError> {
    Ok(parse_frame(line))
}

/// Incremental parser over raw response bytes.
///
/// Buffers only the trailing incomplete line, so text is released as soon
/// as the line carrying it is complete. Splitting on `\n` is safe for UTF-8
/// because the newline byte never occurs inside a multi-byte sequence.
#[derive(Debug)]
pub struct StreamFrameParser {
    buffer: Vec<u8>,
    done: bool,
    decode: LineDecoder,
}

impl Default for StreamFrameParser {
    fn default() -> Self {
        Self::with_decoder(decode_default)
    }
}

impl StreamFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decoder(decode: LineDecoder) -> Self {
        Self {
            buffer: Vec::new(),
            done: false,
            decode,
        }
    }

    /// Whether the end-of-stream sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk of bytes and return every frame completed by it, in order.
    ///
    /// A decoding failure is the last item; it ends the stream like the
    /// `[DONE]` sentinel does, and later frames are discarded.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Frame, InvocationError>> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.accept(&line, &mut frames);
        }
        frames
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<Result<Frame, InvocationError>> {
        let mut frames = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.accept(&line, &mut frames);
        }
        frames
    }

    fn accept(&mut self, line: &[u8], frames: &mut Vec<Result<Frame, InvocationError>>) {
        if self.done {
            return;
        }
        let line = String::from_utf8_lossy(line);
        match (self.decode)(&line) {
            Ok(Frame::Ignored) => {}
            Ok(Frame::Done) => {
                self.done = true;
                frames.push(Ok(Frame::Done));
            }
            Ok(text) => frames.push(Ok(text)),
            Err(e) => {
                self.done = true;
                frames.push(Err(e));
            }
        }
    }
}
