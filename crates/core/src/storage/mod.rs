//! Module of MemStorage and the entries moved between nodes.

pub mod memory;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::dht::Did;
use crate::error::Result;
pub use crate::storage::memory::MemStorage;

/// Key value storage interface
#[async_trait]
pub trait KvStorageInterface<V> {
    /// Get a cache entry by `key`.
    async fn get(&self, key: &str) -> Result<Option<V>>;

    /// Put `entry` in the cache under `key`.
    async fn put(&self, key: &str, value: &V) -> Result<()>;

    /// Snapshot of every entry.
    async fn get_all(&self) -> Result<Vec<(String, V)>>;

    /// Remove an `entry` by `key`.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Delete all values.
    async fn clear(&self) -> Result<()>;

    /// Get the current storage usage.
    async fn count(&self) -> Result<u32>;
}

/// The storage type held by a node.
pub type NodeStorage = Box<dyn KvStorageInterface<Vec<u8>> + Send + Sync>;

/// A stored pair as it travels between nodes during migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

impl Entry {
    /// Position of the key on the ring.
    pub fn did(&self) -> Did {
        Did::hash(&self.key)
    }
}

impl From<(String, Vec<u8>)> for Entry {
    fn from((key, value): (String, Vec<u8>)) -> Self {
        Self { key, value }
    }
}

mod base64_bytes {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;

    pub fn serialize<S>(value: &[u8], s: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        s.serialize_str(&base64::encode(value))
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Vec<u8>, D::Error>
    where D: Deserializer<'de> {
        let s = String::deserialize(d)?;
        base64::decode(s).map_err(serde::de::Error::custom)
    }
}
