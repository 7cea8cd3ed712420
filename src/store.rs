use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::metrics;

pub const NOTIFICATIONS_KEY: &str = "notifications";
pub const POSTS_KEY: &str = "posts";
pub const STORIES_KEY: &str = "stories";
pub const USERS_KEY: &str = "users";
pub const RECENT_SEARCHES_KEY: &str = "recentSearches";

/// String key/value persistence, the shape of browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> impl Future<Output = StoreResult<Option<String>>> + Send;
    fn set_item(&self, key: &str, value: &str) -> impl Future<Output = StoreResult<()>> + Send;
    fn remove_item(&self, key: &str) -> impl Future<Output = StoreResult<()>> + Send;
}

#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.items
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.items()?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        self.items()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        self.items()?.remove(key);
        Ok(())
    }
}

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub async fn init_sqlite_pool(database_url: &str) -> StoreResult<Pool<Sqlite>> {
    info!("Initializing sqlite record store");
    // An in-memory database lives only as long as its single connection
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

impl KeyValueStore for SqliteStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            r#"
            SELECT value FROM kv_store
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

pub enum StoreBackend {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl KeyValueStore for StoreBackend {
    async fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        match self {
            StoreBackend::Memory(store) => store.get_item(key).await,
            StoreBackend::Sqlite(store) => store.get_item(key).await,
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        match self {
            StoreBackend::Memory(store) => store.set_item(key, value).await,
            StoreBackend::Sqlite(store) => store.set_item(key, value).await,
        }
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        match self {
            StoreBackend::Memory(store) => store.remove_item(key).await,
            StoreBackend::Sqlite(store) => store.remove_item(key).await,
        }
    }
}

/// Whole-collection typed access over a key/value backend.
///
/// Every read returns the full collection and every write replaces it. Backend
/// and decoding failures are logged and swallowed: a failed read yields an
/// empty collection and a failed write is dropped.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<StoreBackend>,
}

impl RecordStore {
    pub fn new(backend: StoreBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(StoreBackend::Memory(MemoryStore::new()))
    }

    /// `memory` selects the in-process backend, anything else is a sqlite URL.
    pub async fn connect(storage_url: &str) -> StoreResult<Self> {
        if storage_url == "memory" {
            info!("Using in-memory record store");
            return Ok(Self::in_memory());
        }

        let pool = init_sqlite_pool(storage_url).await?;
        Ok(Self::new(StoreBackend::Sqlite(SqliteStore::new(pool))))
    }

    pub fn backend(&self) -> &StoreBackend {
        &self.backend
    }

    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.backend.get_item(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read collection, treating as empty");
                metrics::STORAGE_FAILURES.inc();
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(records) => {
                debug!(key = %key, count = records.len(), "Loaded collection");
                records
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Stored collection is unreadable, treating as empty");
                metrics::STORAGE_FAILURES.inc();
                Vec::new()
            }
        }
    }

    pub async fn save<T: Serialize>(&self, key: &str, records: &[T]) {
        let raw = match serde_json::to_string(records) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode collection, write dropped");
                metrics::STORAGE_FAILURES.inc();
                return;
            }
        };

        if let Err(e) = self.backend.set_item(key, &raw).await {
            warn!(key = %key, error = %e, "Failed to write collection, write dropped");
            metrics::STORAGE_FAILURES.inc();
            return;
        }

        debug!(key = %key, count = records.len(), "Saved collection");
    }

    /// Drop a whole collection. Later loads see it as empty.
    pub async fn clear(&self, key: &str) {
        if let Err(e) = self.backend.remove_item(key).await {
            warn!(key = %key, error = %e, "Failed to clear collection");
            metrics::STORAGE_FAILURES.inc();
            return;
        }

        debug!(key = %key, "Cleared collection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MiniUser;
    use pretty_assertions::assert_eq;

    fn user(id: &str) -> MiniUser {
        MiniUser {
            id: id.to_string(),
            username: format!("user_{}", id),
            fullname: None,
            img_url: format!("https://img.test/{}.png", id),
        }
    }

    async fn sqlite_store() -> RecordStore {
        let pool = init_sqlite_pool("sqlite::memory:").await.unwrap();
        RecordStore::new(StoreBackend::Sqlite(SqliteStore::new(pool)))
    }

    #[tokio::test]
    async fn test_missing_key_loads_empty() {
        let store = RecordStore::in_memory();
        let users: Vec<MiniUser> = store.load(USERS_KEY).await;
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_memory_and_sqlite_behave_alike() {
        for store in [RecordStore::in_memory(), sqlite_store().await] {
            store.save(USERS_KEY, &[user("u1"), user("u2")]).await;
            store.save(USERS_KEY, &[user("u3")]).await;

            let users: Vec<MiniUser> = store.load(USERS_KEY).await;
            assert_eq!(users, vec![user("u3")]);

            store.clear(USERS_KEY).await;
            let users: Vec<MiniUser> = store.load(USERS_KEY).await;
            assert!(users.is_empty());
        }
    }

    #[tokio::test]
    async fn test_corrupt_payload_loads_empty() {
        let store = RecordStore::in_memory();
        store
            .backend()
            .set_item(STORIES_KEY, "{not json")
            .await
            .unwrap();

        let users: Vec<MiniUser> = store.load(STORIES_KEY).await;
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_backend_degrades_to_empty() {
        let pool = init_sqlite_pool("sqlite::memory:").await.unwrap();
        let sqlite = SqliteStore::new(pool);
        sqlite.close().await;
        let store = RecordStore::new(StoreBackend::Sqlite(sqlite));

        // Neither call may fail loudly
        store.save(USERS_KEY, &[user("u1")]).await;
        store.clear(USERS_KEY).await;
        let users: Vec<MiniUser> = store.load(USERS_KEY).await;
        assert!(users.is_empty());
    }
}
