//! Server-sent event framing shared by the server and the client.
//!
//! Events travel as `data: <json>\n\n`. The transport may split or merge
//! chunks anywhere, so [`SseLineReader`] buffers partial lines until their
//! terminator arrives and yields only complete `data:` payloads.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};
use thiserror::Error;

use crate::events::RunEvent;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SseError {
    #[error("event stream transport error: {0}")]
    Transport(String),

    #[error("malformed event payload {payload:?}: {message}")]
    Decode { payload: String, message: String },
}

/// Incremental `data:` line extractor.
#[derive(Debug, Default)]
pub struct SseLineReader {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
}

impl SseLineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk and return the payloads of every `data:` line
    /// it completed. Bytes after the last newline stay buffered.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + offset;
            if let Some(payload) = data_payload(&self.buffer[start..end]) {
                payloads.push(payload);
            }
            start = end + 1;
            self.scanned = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        payloads
    }

    /// Flush a final line that never received its terminator.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let value = line.strip_prefix(b"data:")?;
    let value = value.strip_prefix(b" ").unwrap_or(value);
    if value.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(value).into_owned())
}

/// Frame one event for the wire.
pub fn encode_event(event: &RunEvent) -> String {
    match serde_json::to_string(event) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(e) => format!("data: {{\"type\":\"error\",\"message\":\"unencodable event: {e}\"}}\n\n"),
    }
}

struct DecodeState<S> {
    inner: S,
    reader: SseLineReader,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turn a byte-chunk stream into decoded run events, in arrival order.
///
/// A transport error is yielded once and ends the stream.
pub fn decode_events<S, B, E>(inner: S) -> impl Stream<Item = Result<RunEvent, SseError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DecodeState {
        inner,
        reader: SseLineReader::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(payload) = st.pending.pop_front() {
                let item = serde_json::from_str::<RunEvent>(&payload).map_err(|e| SseError::Decode {
                    message: e.to_string(),
                    payload,
                });
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    let payloads = st.reader.feed(chunk.as_ref());
                    st.pending.extend(payloads);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(SseError::Transport(e.to_string())), st));
                }
                None => {
                    st.finished = true;
                    let tail = st.reader.finish();
                    st.pending.extend(tail);
                }
            }
        }
    })
}
