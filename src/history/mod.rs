//! Bounded, conflict-safe per-session transcript storage.
//!
//! Appends run an optimistic read-append-trim-write cycle against the
//! medium's conditional-write primitive, so concurrent appenders for one
//! session never lose a message and never apply a stale trim. Different
//! sessions never contend.

#[cfg(feature = "etcd")]
pub mod etcd;
pub mod kv;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::Message;

#[cfg(feature = "etcd")]
pub use etcd::EtcdBackend;
pub use kv::{KeyValueBackend, VersionedValue};
pub use memory::MemoryBackend;

/// Fixed pause between conflicting write attempts.
const CONFLICT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Append-only, size-bounded message sequence per session.
pub struct HistoryStore {
    kv: Arc<dyn KeyValueBackend>,
    max_items: usize,
    ttl: Option<Duration>,
}

impl HistoryStore {
    pub fn new(kv: Arc<dyn KeyValueBackend>, max_items: usize) -> Self {
        Self {
            kv,
            max_items,
            ttl: None,
        }
    }

    /// Let the medium expire each session after `ttl` of inactivity.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn key(session_id: &str) -> String {
        format!("/sessions/{session_id}/history")
    }

    /// Append one message, trimming to the newest `max_items` entries.
    ///
    /// Version conflicts retry the whole cycle after a short pause,
    /// unbounded, until success or a non-conflict failure. Every committed
    /// write therefore reflects all appends committed before it.
    pub async fn append_history(
        &self,
        session_id: &str,
        message: Message,
    ) -> Result<(), StoreError> {
        let key = Self::key(session_id);

        loop {
            let current = self.kv.read(&key).await?;
            let (mut history, expected) = match &current {
                Some(value) => {
                    let version = value.version;
                    match serde_json::from_slice::<Vec<Message>>(&value.data) {
                        Ok(history) => (history, Some(version)),
                        Err(e) => {
                            // A corrupt payload should not wedge the
                            // session; restart the sequence.
                            warn!(session_id, error = %e, "stored history is corrupt, resetting");
                            (Vec::new(), Some(version))
                        }
                    }
                }
                None => (Vec::new(), None),
            };

            history.push(message.clone());
            if history.len() > self.max_items {
                let excess = history.len() - self.max_items;
                history.drain(..excess);
            }
            let data = serde_json::to_vec(&history)?;

            if self.kv.write_if(&key, data, expected, self.ttl).await? {
                return Ok(());
            }

            debug!(session_id, "history append conflicted, retrying");
            tokio::time::sleep(CONFLICT_RETRY_DELAY).await;
        }
    }

    /// Read up to the newest `max_items` messages, oldest first. Unknown
    /// sessions read as empty.
    pub async fn get_history(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let key = Self::key(session_id);
        let Some(value) = self.kv.read(&key).await? else {
            return Ok(Vec::new());
        };

        let mut history: Vec<Message> = serde_json::from_slice(&value.data)?;
        if history.len() > self.max_items {
            let excess = history.len() - self.max_items;
            history.drain(..excess);
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn store(max_items: usize) -> (HistoryStore, Arc<MemoryBackend>) {
        let kv = Arc::new(MemoryBackend::new());
        (HistoryStore::new(Arc::clone(&kv) as Arc<dyn KeyValueBackend>, max_items), kv)
    }

    fn message(content: &str) -> Message {
        Message {
            role: Role::User,
            content: content.to_string(),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn unknown_session_reads_empty() {
        let (store, _) = store(3);
        assert!(store.get_history("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appends_trim_oldest_first() {
        let (store, _) = store(3);
        for content in ["m1", "m2", "m3", "m4"] {
            store.append_history("s", message(content)).await.unwrap();
        }

        let history = store.get_history("s").await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn sessions_do_not_share_history() {
        let (store, _) = store(5);
        store.append_history("a", message("for a")).await.unwrap();
        store.append_history("b", message("for b")).await.unwrap();

        let a = store.get_history("a").await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].content, "for a");
    }

    #[tokio::test]
    async fn concurrent_appends_lose_nothing() {
        let kv = Arc::new(MemoryBackend::new());
        let store = Arc::new(HistoryStore::new(
            Arc::clone(&kv) as Arc<dyn KeyValueBackend>,
            64,
        ));

        let mut tasks = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store
                    .append_history("shared", message(&format!("msg-{i}")))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let history = store.get_history("shared").await.unwrap();
        assert_eq!(history.len(), 32);

        let mut contents: Vec<String> =
            history.iter().map(|m| m.content.clone()).collect();
        contents.sort();
        contents.dedup();
        assert_eq!(contents.len(), 32);
    }

    #[tokio::test]
    async fn concurrent_appends_respect_the_bound() {
        let kv = Arc::new(MemoryBackend::new());
        let store = Arc::new(HistoryStore::new(
            Arc::clone(&kv) as Arc<dyn KeyValueBackend>,
            5,
        ));

        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store
                    .append_history("bounded", message(&format!("msg-{i}")))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let history = store.get_history("bounded").await.unwrap();
        assert_eq!(history.len(), 5);
    }

    #[tokio::test]
    async fn corrupt_payload_resets_on_append() {
        let (store, kv) = store(3);
        kv.write_if(
            "/sessions/s/history",
            b"not json".to_vec(),
            None,
            None,
        )
        .await
        .unwrap();

        store.append_history("s", message("fresh")).await.unwrap();
        let history = store.get_history("s").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "fresh");
    }

    #[tokio::test]
    async fn corrupt_payload_errors_on_read() {
        let (store, kv) = store(3);
        kv.write_if(
            "/sessions/s/history",
            b"not json".to_vec(),
            None,
            None,
        )
        .await
        .unwrap();

        let err = store.get_history("s").await.unwrap_err();
        assert!(matches!(err, StoreError::Codec(_)));
    }

    #[tokio::test]
    async fn ttl_expires_a_session() {
        let kv = Arc::new(MemoryBackend::new());
        let store = HistoryStore::new(Arc::clone(&kv) as Arc<dyn KeyValueBackend>, 3)
            .with_ttl(Duration::from_millis(10));

        store.append_history("s", message("soon gone")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get_history("s").await.unwrap().is_empty());
    }
}
