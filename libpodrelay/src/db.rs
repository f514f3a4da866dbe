//! Durable key-value storage for Podrelay
//!
//! Everything the engine persists (credentials, dedup marks, daily logs,
//! last results, automation status) is a JSON document addressed by
//! `(namespace, key)`. The engine only talks to the [`KvStore`] trait;
//! [`Database`] backs it with SQLite and [`MemoryStore`] keeps it in process.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::{Result, StoreError};

/// How many times a read-modify-write is retried before giving up
const MAX_UPDATE_ATTEMPTS: u32 = 16;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Returns whether a value was removed
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Keys in a namespace, sorted ascending
    async fn keys(&self, namespace: &str) -> Result<Vec<String>>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` meaning "absent"). Returns whether the write happened.
    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool>;

    fn backend_name(&self) -> &str;
}

/// Read and decode a JSON document
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    namespace: &str,
    key: &str,
) -> Result<Option<T>> {
    match store.get(namespace, key).await? {
        Some(raw) => Ok(Some(
            serde_json::from_str(&raw).map_err(StoreError::Serialization)?,
        )),
        None => Ok(None),
    }
}

/// Encode and write a JSON document (last writer wins)
pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    namespace: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value).map_err(StoreError::Serialization)?;
    store.put(namespace, key, &raw).await
}

/// Atomically transform a JSON document
///
/// `f` may run more than once when another writer races us; it must be a
/// pure function of its input.
pub async fn update_json<T, F>(
    store: &dyn KvStore,
    namespace: &str,
    key: &str,
    mut f: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned + Send,
    F: FnMut(Option<T>) -> Result<T> + Send,
{
    for _ in 0..MAX_UPDATE_ATTEMPTS {
        let current = store.get(namespace, key).await?;
        let decoded = match current.as_deref() {
            Some(raw) => Some(serde_json::from_str(raw).map_err(StoreError::Serialization)?),
            None => None,
        };
        let next = f(decoded)?;
        let encoded = serde_json::to_string(&next).map_err(StoreError::Serialization)?;

        if store
            .compare_and_swap(namespace, key, current.as_deref(), &encoded)
            .await?
        {
            return Ok(next);
        }
        tracing::debug!("Concurrent update of {}/{}, retrying", namespace, key);
    }

    Err(StoreError::Contention {
        namespace: namespace.to_string(),
        key: key.to_string(),
        attempts: MAX_UPDATE_ATTEMPTS,
    }
    .into())
}

/// SQLite-backed store
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
            }
        }

        // Forward slashes work on both Windows and Unix; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(StoreError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KvStore for Database {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT value FROM kv_entries WHERE namespace = ? AND key = ?
            "#,
        )
        .bind(namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(row.map(|r| r.0))
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (namespace, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, key)
            DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM kv_entries WHERE namespace = ? AND key = ?
            "#,
        )
        .bind(namespace)
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT key FROM kv_entries WHERE namespace = ? ORDER BY key ASC
            "#,
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = match expected {
            None => sqlx::query(
                r#"
                INSERT INTO kv_entries (namespace, key, value, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(namespace, key) DO NOTHING
                "#,
            )
            .bind(namespace)
            .bind(key)
            .bind(new)
            .bind(now)
            .execute(&self.pool)
            .await,
            Some(expected) => sqlx::query(
                r#"
                UPDATE kv_entries SET value = ?, updated_at = ?
                WHERE namespace = ? AND key = ? AND value = ?
                "#,
            )
            .bind(new)
            .bind(now)
            .bind(namespace)
            .bind(key)
            .bind(expected)
            .execute(&self.pool)
            .await,
        }
        .map_err(StoreError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}

/// In-process store, used by tests
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert((namespace.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }

    async fn keys(&self, namespace: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn compare_and_swap(
        &self,
        namespace: &str,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let slot = (namespace.to_string(), key.to_string());
        if entries.get(&slot).map(String::as_str) != expected {
            return Ok(false);
        }
        entries.insert(slot, new.to_string());
        Ok(true)
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        (temp_dir, db)
    }

    async fn exercise_basic_operations(store: &dyn KvStore) {
        assert_eq!(store.get("ns", "a").await.unwrap(), None);

        store.put("ns", "b", "2").await.unwrap();
        store.put("ns", "a", "1").await.unwrap();
        store.put("other", "z", "9").await.unwrap();
        assert_eq!(store.get("ns", "a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.keys("ns").await.unwrap(), vec!["a", "b"]);

        store.put("ns", "a", "one").await.unwrap();
        assert_eq!(store.get("ns", "a").await.unwrap().as_deref(), Some("one"));

        assert!(store.delete("ns", "a").await.unwrap());
        assert!(!store.delete("ns", "a").await.unwrap());
        assert_eq!(store.keys("ns").await.unwrap(), vec!["b"]);
    }

    async fn exercise_compare_and_swap(store: &dyn KvStore) {
        assert!(store.compare_and_swap("ns", "k", None, "v1").await.unwrap());
        // Already present: insert-if-absent loses
        assert!(!store.compare_and_swap("ns", "k", None, "v2").await.unwrap());
        // Stale expectation loses
        assert!(!store
            .compare_and_swap("ns", "k", Some("v0"), "v2")
            .await
            .unwrap());
        assert!(store
            .compare_and_swap("ns", "k", Some("v1"), "v2")
            .await
            .unwrap());
        assert_eq!(store.get("ns", "k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_sqlite_basic_operations() {
        let (_temp, db) = setup_test_db().await;
        exercise_basic_operations(&db).await;
    }

    #[tokio::test]
    async fn test_sqlite_compare_and_swap() {
        let (_temp, db) = setup_test_db().await;
        exercise_compare_and_swap(&db).await;
    }

    #[tokio::test]
    async fn test_memory_basic_operations() {
        exercise_basic_operations(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_memory_compare_and_swap() {
        exercise_compare_and_swap(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("state.db");
        let path = db_path.to_string_lossy().to_string();

        {
            let db = Database::new(&path).await.unwrap();
            db.put("automation", "status", "{}").await.unwrap();
        }

        let db = Database::new(&path).await.unwrap();
        assert_eq!(
            db.get("automation", "status").await.unwrap().as_deref(),
            Some("{}")
        );
    }

    #[tokio::test]
    async fn test_update_json_applies_transformation() {
        let store = MemoryStore::new();
        let first: u32 = update_json(&store, "counters", "runs", |current: Option<u32>| {
            Ok(current.unwrap_or(0) + 1)
        })
        .await
        .unwrap();
        let second: u32 = update_json(&store, "counters", "runs", |current: Option<u32>| {
            Ok(current.unwrap_or(0) + 1)
        })
        .await
        .unwrap();

        assert_eq!((first, second), (1, 2));
        let stored: Option<u32> = get_json(&store, "counters", "runs").await.unwrap();
        assert_eq!(stored, Some(2));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let (_temp, db) = setup_test_db().await;
        let db = std::sync::Arc::new(db);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                update_json(db.as_ref(), "counters", "hits", |current: Option<u32>| {
                    Ok(current.unwrap_or(0) + 1)
                })
                .await
                .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let hits: Option<u32> = get_json(db.as_ref(), "counters", "hits").await.unwrap();
        assert_eq!(hits, Some(8));
    }

    #[tokio::test]
    async fn test_get_json_rejects_garbage() {
        let store = MemoryStore::new();
        store.put("ns", "k", "not json").await.unwrap();
        let result: Result<Option<u32>> = get_json(&store, "ns", "k").await;
        assert!(matches!(
            result,
            Err(crate::error::PodrelayError::Store(StoreError::Serialization(_)))
        ));
    }
}
