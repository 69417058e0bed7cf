use std::time::Duration;

use futures::stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::AssistantBackend;
use crate::error::BackendError;
use crate::types::{Chunk, ChunkStream, UserRequest};

const CHUNK_COUNT: usize = 5;

/// Canned backend producing a fixed number of numbered chunks per chat
/// call. Useful for wiring checks and as the dispatch test double.
pub struct MockBackend {
    chunk_delay: Duration,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            chunk_delay: Duration::from_millis(500),
        }
    }

    /// Override the pause between chunks (tests use zero).
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AssistantBackend for MockBackend {
    async fn chat(&self, request: UserRequest) -> Result<ChunkStream, BackendError> {
        let (tx, rx) = mpsc::channel::<Result<Chunk, BackendError>>(4);
        let delay = self.chunk_delay;

        tokio::spawn(async move {
            for i in 1..=CHUNK_COUNT {
                let chunk = Chunk {
                    id: i.to_string(),
                    content: format!("chunk {i}: {}", request.message),
                    is_last: i == CHUNK_COUNT,
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    // Consumer went away; stop producing.
                    debug!("mock chat consumer left, producer stopping");
                    return;
                }
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
            }
        });

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    async fn auto_complete(&self, request: UserRequest) -> Result<String, BackendError> {
        Ok(format!("autocomplete response for: {}", request.message))
    }
}
