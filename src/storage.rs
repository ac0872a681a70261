use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};

use crate::errors::StudyError;
use crate::models::{LibraryItem, ReviewSchedule};
use crate::log_store_operation;

pub const LIBRARY_KEY: &str = "library";
pub const SCHEDULE_KEY: &str = "review_schedule";

/// Durable storage supplied by the host: JSON values under string keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Value>, StudyError>;

    async fn save(&self, key: &str, value: Value) -> Result<(), StudyError>;
}

/// SQLite-backed key-value store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self, StudyError> {
        let pool = if database_url.contains(":memory:") {
            // Every connection to an in-memory database sees its own empty
            // database, so keep exactly one alive for the pool's lifetime.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(database_url)
                .await?
        } else {
            SqlitePool::connect(database_url).await?
        };
        let store = SqliteStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StudyError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_records (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        log_store_operation!(info, "migrate", "key-value table ready");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, StudyError> {
        let started = Instant::now();
        let row = sqlx::query("SELECT value FROM kv_records WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .inspect_err(|e| {
                log_store_operation!(error, "load", key = key, error = e);
            })?;

        let value = match row {
            Some(row) => Some(serde_json::from_str(&row.get::<String, _>("value"))?),
            None => None,
        };

        log_store_operation!(
            debug,
            "load",
            key = key,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(value)
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), StudyError> {
        let started = Instant::now();
        sqlx::query(
            r#"
            INSERT INTO kv_records (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(&value)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .inspect_err(|e| {
            log_store_operation!(error, "save", key = key, error = e);
        })?;

        log_store_operation!(
            debug,
            "save",
            key = key,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(())
    }
}

/// Process-local store, used by tests and ephemeral hosts
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, StudyError> {
        let records = self
            .records
            .read()
            .map_err(|_| StudyError::Storage("memory store lock poisoned".to_string()))?;
        Ok(records.get(key).cloned())
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), StudyError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StudyError::Storage("memory store lock poisoned".to_string()))?;
        records.insert(key.to_string(), value);
        Ok(())
    }
}

/// Typed access to the two persisted collections.
///
/// Writers take `write_lock()` for the whole read-modify-write so that
/// concurrent mutations from this process never overwrite each other.
#[derive(Clone)]
pub struct StudyStore {
    backend: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

/// Proof that the holder owns a store's write lock. Only
/// `StudyStore::write_lock` builds one, and saves check that it came from the
/// same store (or a clone of it).
pub struct WriteGuard<'a> {
    lock: &'a Arc<Mutex<()>>,
    _held: MutexGuard<'a, ()>,
}

impl StudyStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub async fn write_lock(&self) -> WriteGuard<'_> {
        WriteGuard {
            lock: &self.write_lock,
            _held: self.write_lock.lock().await,
        }
    }

    fn check_guard(&self, guard: &WriteGuard<'_>) -> Result<(), StudyError> {
        if Arc::ptr_eq(guard.lock, &self.write_lock) {
            Ok(())
        } else {
            Err(StudyError::Storage(
                "write guard belongs to a different store".to_string(),
            ))
        }
    }

    pub async fn load_library(&self) -> Result<Vec<LibraryItem>, StudyError> {
        match self.backend.load(LIBRARY_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn save_library(
        &self,
        guard: &WriteGuard<'_>,
        items: &[LibraryItem],
    ) -> Result<(), StudyError> {
        self.check_guard(guard)?;
        self.backend
            .save(LIBRARY_KEY, serde_json::to_value(items)?)
            .await
    }

    pub async fn load_schedules(&self) -> Result<BTreeMap<String, ReviewSchedule>, StudyError> {
        match self.backend.load(SCHEDULE_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(BTreeMap::new()),
        }
    }

    pub async fn save_schedules(
        &self,
        guard: &WriteGuard<'_>,
        schedules: &BTreeMap<String, ReviewSchedule>,
    ) -> Result<(), StudyError> {
        self.check_guard(guard)?;
        self.backend
            .save(SCHEDULE_KEY, serde_json::to_value(schedules)?)
            .await
    }
}
