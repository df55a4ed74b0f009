//! Room persistence: a small key-value interface, its backends, and the
//! room repository on top

pub mod fs;
pub mod memory;
pub mod queue;
pub mod supabase;

pub use fs::FsKv;
pub use memory::MemoryKv;
pub use queue::Persistence;
pub use supabase::{SupabaseError, SupabaseKv};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{Config, StoreBackend};
use crate::game::Game;
use crate::room::RoomId;

/// Key prefix for persisted rooms
pub const ROOM_KEY_PREFIX: &str = "room:";

pub fn room_key(room_id: &str) -> String {
    format!("{ROOM_KEY_PREFIX}{room_id}")
}

/// Persisted form of a room. Membership is transient and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: RoomId,
    pub name: String,
    pub password: String,
    pub game: Game,
    /// Room revision at snapshot time; older records never overwrite newer
    /// ones in the write-behind queue
    #[serde(default)]
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
}

/// Opaque key-value store
pub enum KvStore {
    Memory(MemoryKv),
    Fs(FsKv),
    Supabase(SupabaseKv),
}

impl KvStore {
    pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        match self {
            KvStore::Memory(kv) => {
                kv.put(key, value);
                Ok(())
            }
            KvStore::Fs(kv) => kv.put(key, &value).await,
            KvStore::Supabase(kv) => kv.put(key, &value).await,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            KvStore::Memory(kv) => Ok(kv.get(key)),
            KvStore::Fs(kv) => kv.get(key).await,
            KvStore::Supabase(kv) => kv.get(key).await,
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self {
            KvStore::Memory(kv) => {
                kv.delete(key);
                Ok(())
            }
            KvStore::Fs(kv) => kv.delete(key).await,
            KvStore::Supabase(kv) => kv.delete(key).await,
        }
    }

    /// Every entry whose key starts with `prefix`
    pub async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        match self {
            KvStore::Memory(kv) => Ok(kv.scan_prefix(prefix)),
            KvStore::Fs(kv) => kv.scan_prefix(prefix).await,
            KvStore::Supabase(kv) => kv.scan_prefix(prefix).await,
        }
    }
}

/// Saves, deletes and restores rooms through a [`KvStore`]
pub struct RoomRepository {
    kv: KvStore,
}

impl RoomRepository {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Open the backend selected in the configuration
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        let kv = match config.store_backend {
            StoreBackend::Memory => KvStore::Memory(MemoryKv::new()),
            StoreBackend::Fs => KvStore::Fs(FsKv::open(&config.data_dir).await?),
            StoreBackend::Supabase => KvStore::Supabase(SupabaseKv::new(config)?),
        };
        info!(backend = ?config.store_backend, "Room store opened");
        Ok(Self::new(kv))
    }

    pub async fn save(&self, record: &RoomRecord) -> Result<(), StoreError> {
        let value = serde_json::to_vec(record)?;
        self.kv.put(&room_key(&record.id), value).await
    }

    pub async fn delete(&self, room_id: &str) -> Result<(), StoreError> {
        self.kv.delete(&room_key(room_id)).await
    }

    pub async fn load(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        match self.kv.get(&room_key(room_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every decodable room. Undecodable entries are logged and skipped.
    pub async fn load_all(&self) -> Result<Vec<RoomRecord>, StoreError> {
        let entries = self.kv.scan_prefix(ROOM_KEY_PREFIX).await?;
        let records = entries
            .into_iter()
            .filter_map(|(key, bytes)| match serde_json::from_slice::<RoomRecord>(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping undecodable room record");
                    None
                }
            })
            .collect();
        Ok(records)
    }
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode or decode record: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Supabase error: {0}")]
    Supabase(#[from] SupabaseError),

    #[error("Invalid stored value for key {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Rule;

    fn record(id: &str) -> RoomRecord {
        RoomRecord {
            id: id.into(),
            name: format!("room {id}"),
            password: String::new(),
            game: Game::new(Rule::Phase),
            revision: 1,
            saved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn repository_round_trips_records() {
        let repo = RoomRepository::new(KvStore::Memory(MemoryKv::new()));
        let saved = record("0a0b0c0d");
        repo.save(&saved).await.unwrap();

        assert_eq!(repo.load("0a0b0c0d").await.unwrap(), Some(saved));
        repo.delete("0a0b0c0d").await.unwrap();
        assert_eq!(repo.load("0a0b0c0d").await.unwrap(), None);
    }

    #[tokio::test]
    async fn load_all_skips_garbage_and_foreign_keys() {
        let kv = MemoryKv::new();
        kv.put("room:bad", b"{not json".to_vec());
        kv.put("other:1", b"{}".to_vec());
        let repo = RoomRepository::new(KvStore::Memory(kv));
        repo.save(&record("11111111")).await.unwrap();
        repo.save(&record("22222222")).await.unwrap();

        let mut ids: Vec<String> = repo.load_all().await.unwrap().into_iter().map(|r| r.id).collect();
        ids.sort();
        assert_eq!(ids, ["11111111", "22222222"]);
    }

    #[test]
    fn unknown_room_loads_as_none() {
        let repo = RoomRepository::new(KvStore::Memory(MemoryKv::new()));
        let loaded = tokio_test::block_on(repo.load("ffffffff"));
        assert!(matches!(loaded, Ok(None)));
    }

    #[test]
    fn stored_json_carries_expected_fields() {
        let value = serde_json::to_value(record("abcdef01")).unwrap();
        for field in ["id", "name", "password", "game", "revision", "saved_at"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(room_key("abcdef01"), "room:abcdef01");
    }

    #[test]
    fn records_without_revision_load_as_zero() {
        let mut value = serde_json::to_value(record("abcdef02")).unwrap();
        value.as_object_mut().unwrap().remove("revision");
        let loaded: RoomRecord = serde_json::from_value(value).unwrap();
        assert_eq!(loaded.revision, 0);
    }
}
