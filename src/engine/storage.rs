// Wingmate Engine — Persistent Storage
// Bucket-oriented key/value persistence for the process-wide state:
// settings, stats, preferences, chat_style. Whole objects are read,
// default-merged, modified, and written back; writers hold no lock across
// buckets, and last-writer-wins races are acceptable because updates are
// infrequent and idempotent at the field level.

use std::collections::HashMap;
use std::path::PathBuf;

use log::info;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::atoms::error::EngineResult;
use crate::atoms::traits::StoreBackend;
use crate::atoms::types::{PreferenceProfile, Settings, Stats, StyleProfile};

// ── Bucket names ───────────────────────────────────────────────────────────

pub const BUCKET_SETTINGS: &str = "settings";
pub const BUCKET_STATS: &str = "stats";
pub const BUCKET_PREFERENCES: &str = "preferences";
pub const BUCKET_CHAT_STYLE: &str = "chat_style";

// ── In-memory backend ──────────────────────────────────────────────────────

/// Volatile backend for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryStore {
    fn get_raw(&self, bucket: &str) -> EngineResult<Option<String>> {
        Ok(self.buckets.lock().get(bucket).cloned())
    }

    fn set_raw(&self, bucket: &str, json: &str) -> EngineResult<()> {
        self.buckets.lock().insert(bucket.to_string(), json.to_string());
        Ok(())
    }
}

// ── SQLite backend ─────────────────────────────────────────────────────────

/// Get the default path for the coordinator's database.
fn default_db_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_default();
    let dir = home.join(".wingmate");
    std::fs::create_dir_all(&dir).ok();
    dir.join("state.db")
}

/// Durable backend: one `buckets` table, one row per bucket.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the default location.
    pub fn open_default() -> EngineResult<Self> {
        Self::open(default_db_path())
    }

    /// Open (or create) the database at `path` and initialize tables.
    pub fn open(path: PathBuf) -> EngineResult<Self> {
        info!("[storage] Opening store at {:?}", path);
        let conn = Connection::open(&path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS buckets (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;

        Ok(SqliteStore { conn: Mutex::new(conn) })
    }
}

impl StoreBackend for SqliteStore {
    fn get_raw(&self, bucket: &str) -> EngineResult<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT value FROM buckets WHERE key = ?1")?;
        let mut rows = stmt.query(params![bucket])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn set_raw(&self, bucket: &str, json: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO buckets (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![bucket, json],
        )?;
        Ok(())
    }
}

// ── Typed wrapper ──────────────────────────────────────────────────────────

/// Typed access to the store buckets. Every read deserializes with
/// `#[serde(default)]` semantics, so values written by an older schema are
/// merged with current defaults instead of failing.
pub struct Storage {
    backend: Box<dyn StoreBackend>,
}

impl Storage {
    pub fn new(backend: Box<dyn StoreBackend>) -> Self {
        Storage { backend }
    }

    fn get<T: DeserializeOwned + Default>(&self, bucket: &str) -> T {
        match self.backend.get_raw(bucket) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_default(),
            Ok(None) => T::default(),
            Err(e) => {
                log::warn!("[storage] read of bucket '{}' failed: {}", bucket, e);
                T::default()
            }
        }
    }

    fn set<T: Serialize>(&self, bucket: &str, value: &T) -> EngineResult<()> {
        let json = serde_json::to_string(value)?;
        self.backend.set_raw(bucket, &json)
    }

    // ── Settings ───────────────────────────────────────────────────────

    pub fn settings(&self) -> Settings {
        self.get(BUCKET_SETTINGS)
    }

    pub fn update_settings(&self, apply: impl FnOnce(&mut Settings)) -> EngineResult<Settings> {
        let mut settings = self.settings();
        apply(&mut settings);
        self.set(BUCKET_SETTINGS, &settings)?;
        Ok(settings)
    }

    // ── Stats ──────────────────────────────────────────────────────────

    pub fn stats(&self) -> Stats {
        self.get(BUCKET_STATS)
    }

    pub fn update_stats(&self, apply: impl FnOnce(&mut Stats)) -> EngineResult<Stats> {
        let mut stats = self.stats();
        apply(&mut stats);
        stats.last_active = Some(chrono::Utc::now());
        self.set(BUCKET_STATS, &stats)?;
        Ok(stats)
    }

    // ── Learning profiles ──────────────────────────────────────────────

    pub fn preferences(&self) -> PreferenceProfile {
        self.get(BUCKET_PREFERENCES)
    }

    pub fn set_preferences(&self, profile: &PreferenceProfile) -> EngineResult<()> {
        self.set(BUCKET_PREFERENCES, profile)
    }

    pub fn chat_style(&self) -> StyleProfile {
        self.get(BUCKET_CHAT_STYLE)
    }

    pub fn set_chat_style(&self, profile: &StyleProfile) -> EngineResult<()> {
        self.set(BUCKET_CHAT_STYLE, profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let storage = Storage::new(Box::new(MemoryStore::new()));
        let updated = storage
            .update_settings(|s| {
                s.auto_decide = true;
                s.api_key = "sk-test".into();
            })
            .unwrap();
        assert!(updated.auto_decide);

        let read = storage.settings();
        assert!(read.auto_decide);
        assert_eq!(read.api_key, "sk-test");
        assert!(read.learn_preferences); // untouched default survives the merge
    }

    #[test]
    fn missing_bucket_reads_as_defaults() {
        let storage = Storage::new(Box::new(MemoryStore::new()));
        let stats = storage.stats();
        assert_eq!(stats.decisions, 0);
        assert!(stats.last_active.is_none());
    }

    #[test]
    fn corrupt_bucket_degrades_to_defaults() {
        let backend = MemoryStore::new();
        backend.set_raw(BUCKET_STATS, "not json at all").unwrap();
        let storage = Storage::new(Box::new(backend));
        assert_eq!(storage.stats().decisions, 0);
    }

    #[test]
    fn update_stats_stamps_last_active() {
        let storage = Storage::new(Box::new(MemoryStore::new()));
        let stats = storage.update_stats(|s| s.chats += 1).unwrap();
        assert_eq!(stats.chats, 1);
        assert!(stats.last_active.is_some());
    }

    #[test]
    fn sqlite_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("state.db")).unwrap();
        store.set_raw(BUCKET_SETTINGS, r#"{"auto_decide":true}"#).unwrap();
        let read = store.get_raw(BUCKET_SETTINGS).unwrap().unwrap();
        assert!(read.contains("auto_decide"));

        // Overwrite goes through the upsert path.
        store.set_raw(BUCKET_SETTINGS, r#"{"auto_decide":false}"#).unwrap();
        let read = store.get_raw(BUCKET_SETTINGS).unwrap().unwrap();
        assert!(read.contains("false"));
    }
}
