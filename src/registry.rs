//! Compiled-in backend registry.
//!
//! Backends are registered as factory functions in a manifest fixed at
//! construction time and instantiated on first load. Handles are stored
//! category-opaque; resolving one back into the assistant contract is a
//! runtime check the dispatcher performs per swap.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::backend::AssistantBackend;
use crate::error::{BackendError, BackendLoadError};

/// The single backend category this gateway serves.
pub const CATEGORY_ASSISTANT: &str = "assistant";

/// Category-opaque handle to a loaded backend.
pub type BackendHandle = Arc<dyn Any + Send + Sync>;

/// Handle produced by assistant-category factories.
///
/// A downcast to this type is the capability check: a handle registered
/// under some other category will not resolve.
pub struct AssistantHandle(Arc<dyn AssistantBackend>);

impl AssistantHandle {
    /// Wrap a backend into a registrable handle.
    pub fn new(backend: impl AssistantBackend) -> BackendHandle {
        Self::from_arc(Arc::new(backend))
    }

    /// Wrap an already-shared backend into a registrable handle.
    pub fn from_arc(backend: Arc<dyn AssistantBackend>) -> BackendHandle {
        Arc::new(AssistantHandle(backend))
    }

    /// Recover the assistant contract from an opaque handle.
    pub fn resolve(handle: &BackendHandle) -> Option<Arc<dyn AssistantBackend>> {
        handle
            .downcast_ref::<AssistantHandle>()
            .map(|h| Arc::clone(&h.0))
    }
}

/// Factory constructing one named backend.
pub type BackendFactory = Box<dyn Fn() -> Result<BackendHandle, BackendError> + Send + Sync>;

/// Thread-safe registry of loaded backend handles.
pub struct BackendRegistry {
    factories: HashMap<(String, String), BackendFactory>,
    loaded: Mutex<HashMap<String, HashMap<String, BackendHandle>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Add a factory to the manifest.
    pub fn with_factory<F>(
        mut self,
        category: impl Into<String>,
        name: impl Into<String>,
        factory: F,
    ) -> Self
    where
        F: Fn() -> Result<BackendHandle, BackendError> + Send + Sync + 'static,
    {
        self.factories
            .insert((category.into(), name.into()), Box::new(factory));
        self
    }

    /// Instantiate the named backend if it is not already loaded.
    ///
    /// A loaded entry is reused; the factory runs at most once per
    /// `(category, name)` for the life of the registry.
    pub fn load(&self, category: &str, name: &str) -> Result<(), BackendLoadError> {
        let mut loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());

        if loaded
            .get(category)
            .is_some_and(|names| names.contains_key(name))
        {
            return Ok(());
        }

        let factory = self
            .factories
            .get(&(category.to_string(), name.to_string()))
            .ok_or_else(|| BackendLoadError::Unknown {
                category: category.to_string(),
                name: name.to_string(),
            })?;

        let handle = factory().map_err(|source| BackendLoadError::Init {
            name: name.to_string(),
            source,
        })?;

        loaded
            .entry(category.to_string())
            .or_default()
            .insert(name.to_string(), handle);
        info!(category, name, "loaded backend");
        Ok(())
    }

    /// Look up a previously loaded handle.
    pub fn get(&self, category: &str, name: &str) -> Option<BackendHandle> {
        let loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
        loaded.get(category).and_then(|names| names.get(name)).cloned()
    }

    /// Enumerate loaded backend names per category.
    pub fn list(&self) -> HashMap<String, Vec<String>> {
        let loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
        loaded
            .iter()
            .map(|(category, names)| {
                let mut names: Vec<String> = names.keys().cloned().collect();
                names.sort();
                (category.clone(), names)
            })
            .collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::BackendError;
    use crate::types::{Chunk, ChunkStream, UserRequest};

    struct NullBackend;

    #[async_trait::async_trait]
    impl AssistantBackend for NullBackend {
        async fn chat(&self, _request: UserRequest) -> Result<ChunkStream, BackendError> {
            Ok(Box::pin(futures::stream::empty::<Result<Chunk, BackendError>>()))
        }

        async fn auto_complete(&self, _request: UserRequest) -> Result<String, BackendError> {
            Ok(String::new())
        }
    }

    #[test]
    fn load_runs_each_factory_at_most_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let registry = BackendRegistry::new().with_factory(CATEGORY_ASSISTANT, "null", move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(AssistantHandle::new(NullBackend))
        });

        registry.load(CATEGORY_ASSISTANT, "null").unwrap();
        registry.load(CATEGORY_ASSISTANT, "null").unwrap();
        registry.load(CATEGORY_ASSISTANT, "null").unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_name_fails_to_load() {
        let registry = BackendRegistry::new();
        let err = registry.load(CATEGORY_ASSISTANT, "ghost").unwrap_err();
        assert!(matches!(err, BackendLoadError::Unknown { .. }));
    }

    #[test]
    fn failing_factory_surfaces_init_error() {
        let registry = BackendRegistry::new().with_factory(CATEGORY_ASSISTANT, "broken", || {
            Err(BackendError::stream("missing credentials"))
        });
        let err = registry.load(CATEGORY_ASSISTANT, "broken").unwrap_err();
        assert!(matches!(err, BackendLoadError::Init { .. }));
    }

    #[test]
    fn get_is_none_before_load_and_some_after() {
        let registry = BackendRegistry::new().with_factory(CATEGORY_ASSISTANT, "null", || {
            Ok(AssistantHandle::new(NullBackend))
        });

        assert!(registry.get(CATEGORY_ASSISTANT, "null").is_none());
        registry.load(CATEGORY_ASSISTANT, "null").unwrap();

        let handle = registry.get(CATEGORY_ASSISTANT, "null").unwrap();
        assert!(AssistantHandle::resolve(&handle).is_some());
    }

    #[test]
    fn handles_from_other_categories_do_not_resolve() {
        let registry = BackendRegistry::new().with_factory("telemetry", "sink", || {
            Ok(Arc::new(42_u32) as BackendHandle)
        });
        registry.load("telemetry", "sink").unwrap();

        let handle = registry.get("telemetry", "sink").unwrap();
        assert!(AssistantHandle::resolve(&handle).is_none());
    }

    #[test]
    fn list_enumerates_loaded_names() {
        let registry = BackendRegistry::new()
            .with_factory(CATEGORY_ASSISTANT, "b", || Ok(AssistantHandle::new(NullBackend)))
            .with_factory(CATEGORY_ASSISTANT, "a", || Ok(AssistantHandle::new(NullBackend)));

        registry.load(CATEGORY_ASSISTANT, "b").unwrap();
        registry.load(CATEGORY_ASSISTANT, "a").unwrap();

        let listing = registry.list();
        assert_eq!(
            listing.get(CATEGORY_ASSISTANT).map(Vec::as_slice),
            Some(["a".to_string(), "b".to_string()].as_slice())
        );
    }
}
