//! etcd-backed key-value medium.

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, PutOptions, Txn, TxnOp};

use super::kv::{KeyValueBackend, VersionedValue};
use crate::error::StoreError;

/// [`KeyValueBackend`] over an etcd cluster.
///
/// `mod_revision` is the compare token; first writes compare on
/// `version == 0`, i.e. key absence. Each TTL-carrying write grants its
/// own lease, matching how the sequence key is kept alive per update.
pub struct EtcdBackend {
    client: Client,
}

impl EtcdBackend {
    /// Connect to the cluster at the given endpoints.
    pub async fn connect<E: AsRef<str>>(endpoints: &[E]) -> Result<Self, StoreError> {
        let client = Client::connect(endpoints, None)
            .await
            .map_err(StoreError::backend)?;
        Ok(Self { client })
    }

    /// Wrap an already-connected client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeyValueBackend for EtcdBackend {
    async fn read(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        let mut client = self.client.clone();
        let response = client.get(key, None).await.map_err(StoreError::backend)?;
        Ok(response.kvs().first().map(|kv| VersionedValue {
            data: kv.value().to_vec(),
            version: kv.mod_revision(),
        }))
    }

    async fn write_if(
        &self,
        key: &str,
        data: Vec<u8>,
        expected: Option<i64>,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut client = self.client.clone();

        let put_options = match ttl {
            Some(ttl) => {
                let lease = client
                    .lease_grant(ttl.as_secs().max(1) as i64, None)
                    .await
                    .map_err(StoreError::backend)?;
                Some(PutOptions::new().with_lease(lease.id()))
            }
            None => None,
        };

        let compare = match expected {
            Some(revision) => Compare::mod_revision(key, CompareOp::Equal, revision),
            None => Compare::version(key, CompareOp::Equal, 0),
        };

        let txn = Txn::new()
            .when([compare])
            .and_then([TxnOp::put(key, data, put_options)]);
        let response = client.txn(txn).await.map_err(StoreError::backend)?;
        Ok(response.succeeded())
    }
}
