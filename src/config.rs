//! Configuration collaborator, reduced to a string accessor.
//!
//! The gateway reads exactly one key at call time: [`BACKEND_KEY`], the name
//! of the active assistant backend. Keeping the accessor behind a trait lets
//! operators re-point the gateway at a different backend without a restart.

use std::collections::HashMap;
use std::sync::RwLock;

/// Configuration key naming the active assistant backend.
pub const BACKEND_KEY: &str = "backends.assistant";

/// Read access to operator configuration.
pub trait ConfigSource: Send + Sync {
    /// Look up a string value. Missing keys read as the empty string.
    fn get_string(&self, key: &str) -> String;
}

/// In-process [`ConfigSource`] backed by a guarded map.
///
/// `set` takes `&self`, so a shared handle can be re-pointed while calls
/// are in flight.
#[derive(Debug, Default)]
pub struct MapConfig {
    values: RwLock<HashMap<String, String>>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for construction time.
    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.into(), value.into());
    }
}

impl ConfigSource for MapConfig {
    fn get_string(&self, key: &str) -> String {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reads_empty() {
        let config = MapConfig::new();
        assert_eq!(config.get_string(BACKEND_KEY), "");
    }

    #[test]
    fn set_replaces_value_at_runtime() {
        let config = MapConfig::new().with(BACKEND_KEY, "mock");
        assert_eq!(config.get_string(BACKEND_KEY), "mock");

        config.set(BACKEND_KEY, "openai");
        assert_eq!(config.get_string(BACKEND_KEY), "openai");
    }
}
