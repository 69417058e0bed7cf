//! Core types shared by the dispatcher, registry and backends.

pub mod chunk;
pub mod message;
pub mod request;

// Re-export commonly used types
pub use chunk::{Chunk, ChunkStream};
pub use message::{Message, Role};
pub use request::{CodeContext, UserRequest};
