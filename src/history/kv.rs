use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// A stored value together with the version token observed at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub data: Vec<u8>,
    /// Medium-assigned revision; the compare token for conditional writes.
    pub version: i64,
}

/// The replicated key-value medium behind the history store.
///
/// Conflict resolution uses the medium's native conditional write
/// exclusively; no client-side lock coordinates concurrent writers.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Read a key and its current version.
    async fn read(&self, key: &str) -> Result<Option<VersionedValue>, StoreError>;

    /// Conditional write. `expected` of `None` requires the key to be
    /// absent; `Some(version)` requires the stored version to match.
    /// Returns `false` when the condition failed.
    async fn write_if(
        &self,
        key: &str,
        data: Vec<u8>,
        expected: Option<i64>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;
}
