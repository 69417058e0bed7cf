//! A conversational gateway over interchangeable assistant backends.
//!
//! The gateway exposes a streaming `chat` call and a single-shot
//! `auto_complete` call, delegating generation to whichever backend the
//! operator has configured, switchable at runtime without a restart. Around
//! the delegation it keeps a bounded per-session transcript in a replicated
//! key-value store so successive calls carry prior context.

pub mod backend;
pub mod backends;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod registry;
pub mod sse;
pub mod types;

// Re-export core types for easy usage
pub use backend::AssistantBackend;
pub use backends::{manifest, MockBackend, OpenAiCompatBackend};
pub use config::{ConfigSource, MapConfig, BACKEND_KEY};
pub use dispatcher::{ChunkSink, Dispatcher};
pub use error::{BackendError, BackendLoadError, BoxError, GatewayError, StoreError};
pub use history::{HistoryStore, KeyValueBackend, MemoryBackend, VersionedValue};
pub use registry::{AssistantHandle, BackendHandle, BackendRegistry, CATEGORY_ASSISTANT};
pub use types::*;

#[cfg(feature = "etcd")]
pub use history::EtcdBackend;
