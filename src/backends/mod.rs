//! Backend implementations compiled into this gateway.

pub mod mock;
pub mod openai;

pub use mock::MockBackend;
pub use openai::OpenAiCompatBackend;

use std::sync::Arc;

use crate::config::ConfigSource;
use crate::registry::{AssistantHandle, BackendRegistry, CATEGORY_ASSISTANT};

/// Configuration keys read by the OpenAI-compatible factory at load time.
pub const OPENAI_BASE_URL_KEY: &str = "backends.openai.base-url";
pub const OPENAI_MODEL_KEY: &str = "backends.openai.model";
pub const OPENAI_API_KEY_KEY: &str = "backends.openai.api-key";

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// The default manifest: every backend this build can serve, keyed under
/// the assistant category. Factories read their settings when the backend
/// is first loaded, not when the manifest is built.
pub fn manifest(config: Arc<dyn ConfigSource>) -> BackendRegistry {
    let openai_config = Arc::clone(&config);

    BackendRegistry::new()
        .with_factory(CATEGORY_ASSISTANT, "mock", || {
            Ok(AssistantHandle::new(MockBackend::new()))
        })
        .with_factory(CATEGORY_ASSISTANT, "openai", move || {
            let base_url = match openai_config.get_string(OPENAI_BASE_URL_KEY) {
                url if url.is_empty() => DEFAULT_OPENAI_BASE_URL.to_string(),
                url => url,
            };
            let model = match openai_config.get_string(OPENAI_MODEL_KEY) {
                model if model.is_empty() => DEFAULT_OPENAI_MODEL.to_string(),
                model => model,
            };
            let api_key = match openai_config.get_string(OPENAI_API_KEY_KEY) {
                key if key.is_empty() => None,
                key => Some(key),
            };
            let backend = OpenAiCompatBackend::new(base_url, model, api_key)?;
            Ok(AssistantHandle::new(backend))
        })
}
