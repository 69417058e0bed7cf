use thiserror::Error;

/// Boxed error type used at the transport seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a backend implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("stream error: {0}")]
    Stream(String),
}

impl BackendError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        BackendError::Api {
            status,
            message: message.into(),
        }
    }

    pub fn stream(message: impl Into<String>) -> Self {
        BackendError::Stream(message.into())
    }
}

/// Errors raised while loading a backend into the registry.
#[derive(Debug, Error)]
pub enum BackendLoadError {
    #[error("no backend named {name:?} registered under category {category:?}")]
    Unknown { category: String, name: String },

    #[error("failed to initialize backend {name:?}: {source}")]
    Init {
        name: String,
        #[source]
        source: BackendError,
    },
}

/// Terminal failures surfaced to the caller of a gateway operation.
///
/// History store failures are deliberately absent here: the interactive
/// path stays available when the transcript cannot be recorded, so
/// [`StoreError`] is logged by the dispatcher and never surfaced.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no assistant backend configured")]
    Configuration,

    #[error(transparent)]
    BackendLoad(#[from] BackendLoadError),

    #[error("backend {name:?} does not implement the assistant contract")]
    CapabilityMismatch { name: String },

    #[error("backend call failed: {0}")]
    BackendInvocation(#[from] BackendError),

    #[error("failed to deliver output to caller: {0}")]
    Transport(BoxError),
}

/// History store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key-value backend error: {0}")]
    Backend(BoxError),

    #[error("history payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    pub fn backend(source: impl Into<BoxError>) -> Self {
        StoreError::Backend(source.into())
    }
}
