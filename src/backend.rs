use crate::error::BackendError;
use crate::types::{ChunkStream, UserRequest};

/// The capability contract every assistant backend satisfies.
///
/// `chat` hands back a lazily produced, single-consumer chunk stream; the
/// dispatcher is its only reader. `auto_complete` is a single blocking call
/// with exactly one result.
#[async_trait::async_trait]
pub trait AssistantBackend: Send + Sync + 'static {
    /// Start a streamed reply for the request.
    async fn chat(&self, request: UserRequest) -> Result<ChunkStream, BackendError>;

    /// Produce a one-shot completion for the request.
    async fn auto_complete(&self, request: UserRequest) -> Result<String, BackendError>;
}
