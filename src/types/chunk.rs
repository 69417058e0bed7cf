use std::pin::Pin;

use futures::Stream;

use crate::error::BackendError;

/// One incremental unit of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    /// Marks stream termination. Content on a terminal chunk is still
    /// delivered to the caller.
    pub is_last: bool,
}

impl Chunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            is_last: false,
        }
    }

    pub fn terminal(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            is_last: true,
        }
    }
}

/// Single-consumer sequence of chunks produced by a backend.
///
/// The producer behind the stream owns its downstream connection and must
/// release it promptly once the consumer stops polling.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk, BackendError>> + Send>>;
