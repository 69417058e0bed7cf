//! Per-call orchestration: resolve the active backend, merge session
//! history, invoke, forward the stream, persist the transcript.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::AssistantBackend;
use crate::config::{ConfigSource, BACKEND_KEY};
use crate::error::{BackendLoadError, BoxError, GatewayError};
use crate::history::HistoryStore;
use crate::registry::{AssistantHandle, BackendRegistry, CATEGORY_ASSISTANT};
use crate::types::{Message, UserRequest};

/// Transport seam for streamed replies. One implementation per transport;
/// the dispatcher only ever pushes content in arrival order.
#[async_trait::async_trait]
pub trait ChunkSink: Send {
    async fn send(&mut self, content: &str) -> Result<(), BoxError>;
}

/// Ready-made sink for channel-fed transports.
#[async_trait::async_trait]
impl ChunkSink for tokio::sync::mpsc::Sender<String> {
    async fn send(&mut self, content: &str) -> Result<(), BoxError> {
        tokio::sync::mpsc::Sender::send(self, content.to_string())
            .await
            .map_err(|e| Box::new(e) as BoxError)
    }
}

#[derive(Default)]
struct ActiveBackend {
    name: String,
    handle: Option<Arc<dyn AssistantBackend>>,
}

/// Orchestrates chat and autocomplete calls end to end.
///
/// Persistence policy: the user message is recorded before the backend is
/// invoked; the assistant reply is recorded only after the stream or call
/// completes cleanly. A transport failure, a mid-stream backend error or a
/// dropped call discards the partial reply.
pub struct Dispatcher {
    registry: Arc<BackendRegistry>,
    config: Arc<dyn ConfigSource>,
    history: Option<Arc<HistoryStore>>,
    active: Mutex<ActiveBackend>,
}

impl Dispatcher {
    /// `history` of `None` disables transcript handling entirely, the
    /// degraded mode used when the store medium is unreachable at startup.
    pub fn new(
        registry: Arc<BackendRegistry>,
        config: Arc<dyn ConfigSource>,
        history: Option<Arc<HistoryStore>>,
    ) -> Self {
        Self {
            registry,
            config,
            history,
            active: Mutex::new(ActiveBackend::default()),
        }
    }

    /// Resolve the configured backend, swapping the active handle if the
    /// operator re-pointed the gateway since the last call.
    ///
    /// The lock covers the whole check-load-swap so no call ever observes
    /// a half-updated reference; it is never held across an invocation.
    fn resolve_backend(&self) -> Result<Arc<dyn AssistantBackend>, GatewayError> {
        let name = self.config.get_string(BACKEND_KEY);
        if name.is_empty() {
            return Err(GatewayError::Configuration);
        }

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.name == name {
            if let Some(backend) = &active.handle {
                return Ok(Arc::clone(backend));
            }
        }

        info!(backend = %name, "activating assistant backend");
        self.registry.load(CATEGORY_ASSISTANT, &name)?;
        let handle = self
            .registry
            .get(CATEGORY_ASSISTANT, &name)
            .ok_or_else(|| {
                GatewayError::BackendLoad(BackendLoadError::Unknown {
                    category: CATEGORY_ASSISTANT.to_string(),
                    name: name.clone(),
                })
            })?;
        let backend = AssistantHandle::resolve(&handle)
            .ok_or_else(|| GatewayError::CapabilityMismatch { name: name.clone() })?;

        active.name = name;
        active.handle = Some(Arc::clone(&backend));
        Ok(backend)
    }

    /// Best-effort history read; failures degrade to an empty transcript.
    async fn session_history(&self, session_id: &str) -> Vec<Message> {
        let Some(store) = &self.history else {
            return Vec::new();
        };
        match store.get_history(session_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(session_id, error = %e, "failed to read session history");
                Vec::new()
            }
        }
    }

    /// Best-effort transcript append; failures are logged, never surfaced.
    async fn record(&self, session_id: &str, message: Message) {
        let Some(store) = &self.history else {
            return;
        };
        if let Err(e) = store.append_history(session_id, message).await {
            warn!(session_id, error = %e, "failed to record transcript entry");
        }
    }

    /// Stream a reply for the request into `sink`.
    ///
    /// Chunks are forwarded in arrival order, terminal chunk included;
    /// consumption stops at the first terminal marker. A sink failure
    /// aborts the call with no further sends.
    pub async fn chat<S: ChunkSink>(
        &self,
        mut request: UserRequest,
        sink: &mut S,
    ) -> Result<(), GatewayError> {
        let call_id = Uuid::new_v4();
        let backend = self.resolve_backend()?;

        request.history = self.session_history(&request.session_id).await;
        self.record(&request.session_id, Message::user(request.message.clone()))
            .await;

        let session_id = request.session_id.clone();
        debug!(%call_id, %session_id, "invoking chat backend");
        let mut stream = backend
            .chat(request)
            .await
            .map_err(GatewayError::BackendInvocation)?;

        let mut reply = String::new();
        while let Some(item) = stream.next().await {
            let chunk = item.map_err(GatewayError::BackendInvocation)?;
            sink.send(&chunk.content)
                .await
                .map_err(GatewayError::Transport)?;
            reply.push_str(&chunk.content);
            if chunk.is_last {
                break;
            }
        }
        // Stop polling; a producer still running sees its consumer leave.
        drop(stream);

        self.record(&session_id, Message::assistant(reply)).await;
        debug!(%call_id, %session_id, "chat completed");
        Ok(())
    }

    /// Produce a single completion for the request.
    pub async fn auto_complete(&self, mut request: UserRequest) -> Result<String, GatewayError> {
        let call_id = Uuid::new_v4();
        let backend = self.resolve_backend()?;

        request.history = self.session_history(&request.session_id).await;
        self.record(&request.session_id, Message::user(request.message.clone()))
            .await;

        let session_id = request.session_id.clone();
        debug!(%call_id, %session_id, "invoking autocomplete backend");
        let reply = backend
            .auto_complete(request)
            .await
            .map_err(GatewayError::BackendInvocation)?;

        self.record(&session_id, Message::assistant(reply.clone()))
            .await;
        Ok(reply)
    }
}
