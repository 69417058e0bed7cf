//! Stream adapter parsing Server-Sent Events out of an HTTP byte stream.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_util::{Stream, StreamExt};
use memchr::memmem;

use crate::error::BackendError;

/// Raw bytes are buffered until a full `\n\n`-terminated event arrives;
/// anything larger than this is treated as a protocol violation.
const MAX_PENDING_BYTES: usize = 1_000_000;

/// A parsed SSE event, reduced to the fields the gateway consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Optional `event:` field.
    pub event: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
}

impl SseEvent {
    /// OpenAI-style end-of-stream sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Parses SSE events from a stream of byte chunks, tolerating events split
/// across chunk boundaries (including mid-UTF-8-codepoint splits).
pub struct SseEventStream<S> {
    inner: S,
    pending: Vec<u8>,
    parsed: VecDeque<SseEvent>,
}

impl<S> SseEventStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            pending: Vec::new(),
            parsed: VecDeque::new(),
        }
    }

    /// Drain every complete event out of the pending buffer.
    fn drain_complete_events(&mut self) -> Result<(), BackendError> {
        let finder = memmem::Finder::new(b"\n\n");
        let mut consumed = 0;

        while let Some(offset) = finder.find(&self.pending[consumed..]) {
            let end = consumed + offset;
            let text = std::str::from_utf8(&self.pending[consumed..end])
                .map_err(|e| BackendError::stream(format!("invalid utf-8 in sse event: {e}")))?;
            if let Some(event) = parse_event(text) {
                self.parsed.push_back(event);
            }
            consumed = end + 2;
        }

        if consumed > 0 {
            self.pending.drain(..consumed);
        }
        Ok(())
    }

    /// Flush whatever remains once the upstream closes. Some servers end
    /// the body right after the final event without a trailing blank line.
    fn flush_trailing_event(&mut self) -> Option<SseEvent> {
        if self.pending.is_empty() {
            return None;
        }
        let event = std::str::from_utf8(&self.pending)
            .ok()
            .and_then(|text| parse_event(text.trim()));
        self.pending.clear();
        event
    }
}

fn parse_event(text: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines = Vec::new();

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value.to_string()),
            _ => {}
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

impl<S, E> Stream for SseEventStream<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = Result<SseEvent, BackendError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.parsed.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            let chunk = match ready!(self.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    return Poll::Ready(Some(Err(BackendError::stream(format!(
                        "sse transport error: {}",
                        e.into()
                    )))));
                }
                None => {
                    return Poll::Ready(self.flush_trailing_event().map(Ok));
                }
            };

            self.pending.extend_from_slice(&chunk);
            if self.pending.len() > MAX_PENDING_BYTES {
                self.pending.clear();
                return Poll::Ready(Some(Err(BackendError::stream(
                    "sse event exceeded maximum buffered size",
                ))));
            }

            if let Err(e) = self.drain_complete_events() {
                return Poll::Ready(Some(Err(e)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn byte_stream(
        chunks: Vec<&'static [u8]>,
    ) -> impl Stream<Item = Result<bytes::Bytes, std::io::Error>> + Unpin {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(bytes::Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn parses_back_to_back_events() {
        let mut events = SseEventStream::new(byte_stream(vec![b"data: one\n\ndata: two\n\n"]));

        assert_eq!(events.next().await.unwrap().unwrap().data, "one");
        assert_eq!(events.next().await.unwrap().unwrap().data, "two");
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn reassembles_events_split_across_chunks() {
        let mut events = SseEventStream::new(byte_stream(vec![
            b"data: hel",
            b"lo world\n\ndata: ",
            b"second\n\n",
        ]));

        assert_eq!(events.next().await.unwrap().unwrap().data, "hello world");
        assert_eq!(events.next().await.unwrap().unwrap().data, "second");
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn joins_multiline_data() {
        let mut events = SseEventStream::new(byte_stream(vec![b"data: a\ndata: b\n\n"]));
        assert_eq!(events.next().await.unwrap().unwrap().data, "a\nb");
    }

    #[tokio::test]
    async fn keeps_event_field() {
        let mut events =
            SseEventStream::new(byte_stream(vec![b"event: delta\ndata: payload\n\n"]));
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.event.as_deref(), Some("delta"));
        assert_eq!(event.data, "payload");
    }

    #[tokio::test]
    async fn survives_utf8_split_across_chunks() {
        // "€" is three bytes; split it over the chunk boundary.
        let euro = "€".as_bytes();
        let first: &'static [u8] =
            Box::leak([b"data: price ".as_slice(), &euro[..2]].concat().into_boxed_slice());
        let second: &'static [u8] =
            Box::leak([&euro[2..], b"9\n\n".as_slice()].concat().into_boxed_slice());

        let mut events = SseEventStream::new(byte_stream(vec![first, second]));
        assert_eq!(events.next().await.unwrap().unwrap().data, "price €9");
    }

    #[tokio::test]
    async fn flushes_final_event_without_trailing_blank_line() {
        let mut events =
            SseEventStream::new(byte_stream(vec![b"data: body\n\n", b"data: [DONE]"]));

        assert_eq!(events.next().await.unwrap().unwrap().data, "body");
        let last = events.next().await.unwrap().unwrap();
        assert!(last.is_done());
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn invalid_utf8_surfaces_an_error() {
        let mut events =
            SseEventStream::new(byte_stream(vec![b"data: ok \xff\xfe broken\n\n"]));
        assert!(events.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn comments_and_unknown_fields_are_ignored() {
        let mut events = SseEventStream::new(byte_stream(vec![
            b": keepalive\nretry: 500\ndata: real\n\n",
        ]));
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.data, "real");
        assert_eq!(event.event, None);
    }
}
