use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::kv::{KeyValueBackend, VersionedValue};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct MemoryEntry {
    data: Vec<u8>,
    version: i64,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// In-process [`KeyValueBackend`] with the same conditional-write and
/// expiry semantics as the replicated medium. Used by tests and by
/// single-process deployments that can tolerate a volatile transcript.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    revision: AtomicI64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_revision(&self) -> i64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(VersionedValue {
                data: entry.data.clone(),
                version: entry.version,
            })),
            None => Ok(None),
        }
    }

    async fn write_if(
        &self,
        key: &str,
        data: Vec<u8>,
        expected: Option<i64>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let current = entries.get(key).filter(|entry| !entry.expired());
        let matches = match (expected, current) {
            (None, None) => true,
            (Some(version), Some(entry)) => entry.version == version,
            _ => false,
        };
        if !matches {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            MemoryEntry {
                data,
                version: self.next_revision(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(true)
    }
}
