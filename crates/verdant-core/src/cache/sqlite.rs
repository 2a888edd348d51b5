//! SQLite-backed cache namespace.

use super::traits::{CacheEntry, CacheMeta, CacheStats, CacheStorage};
use crate::error::{Result, VerdantError};
use crate::http::{Request, Response};
use chrono::{DateTime, Utc};
use reqwest::Method;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// SQLite-based cache storage.
///
/// Every named cache lives in one shared database file, so the namespace
/// survives process restarts. Thread-safe via an internal mutex on the
/// connection.
pub struct SqliteCacheStorage {
    conn: Arc<Mutex<Connection>>,
}

type EntryRow = (u16, String, Vec<u8>, i64, String);

impl SqliteCacheStorage {
    /// Open (or create) the namespace database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VerdantError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| VerdantError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // WAL keeps readers from blocking behind the single writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| VerdantError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::from_connection(conn)
    }

    /// A throwaway namespace that lives only as long as this value.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| VerdantError::Database {
            message: format!("Failed to open in-memory cache database: {}", e),
            source: Some(e),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| VerdantError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- One row per named cache
            CREATE TABLE IF NOT EXISTS caches (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            -- One stored response per (cache, request identity)
            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_name TEXT NOT NULL,
                request_key TEXT NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                size_bytes INTEGER NOT NULL,
                cached_at TEXT NOT NULL,
                seq INTEGER NOT NULL,
                PRIMARY KEY (cache_name, request_key)
            );

            -- Unscoped lookups pick the newest write for a request
            CREATE INDEX IF NOT EXISTS idx_entries_key_seq
                ON cache_entries(request_key, seq);
            "#,
        )
        .map_err(|e| VerdantError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    fn ensure_cache(conn: &Connection, name: &str) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
            params![name, Utc::now().to_rfc3339()],
        )
        .map_err(|e| VerdantError::Database {
            message: format!("Failed to create cache '{}': {}", name, e),
            source: Some(e),
        })?;
        Ok(())
    }

    fn insert_entry(
        conn: &Connection,
        name: &str,
        request: &Request,
        response: &Response,
    ) -> Result<()> {
        if *request.method() != Method::GET {
            return Err(VerdantError::NotCacheable {
                url: request.url().to_string(),
                reason: format!("method {}", request.method()),
            });
        }
        if !response.ok() || response.is_partial() {
            return Err(VerdantError::NotCacheable {
                url: request.url().to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        let headers = serde_json::to_string(response.headers())?;
        let body = response.body().as_ref();
        let size_bytes = body.len() as i64;

        let seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM cache_entries",
            [],
            |row| row.get(0),
        )?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (cache_name, request_key, method, url, status, headers, body, size_bytes, cached_at, seq)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                name,
                request.cache_key(),
                request.method().as_str(),
                request.url().as_str(),
                response.status(),
                headers,
                body,
                size_bytes,
                Utc::now().to_rfc3339(),
                seq
            ],
        )
        .map_err(|e| VerdantError::Database {
            message: format!("Failed to store cache entry: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    fn row_to_response(status: u16, headers_json: &str, body: Vec<u8>) -> Result<Response> {
        let headers: Vec<(String, String)> = serde_json::from_str(headers_json)?;
        Ok(Response::from_parts(status, headers, body))
    }

    fn parse_time(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl CacheStorage for SqliteCacheStorage {
    fn create(&self, name: &str) -> Result<()> {
        let conn = self.lock()?;
        Self::ensure_cache(&conn, name)
    }

    fn has(&self, name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM caches WHERE name = ?1",
                params![name],
                |_| Ok(true),
            )
            .optional()
            .map_err(|e| VerdantError::Database {
                message: format!("Failed to check cache '{}': {}", name, e),
                source: Some(e),
            })?
            .unwrap_or(false);
        Ok(exists)
    }

    fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        Ok(self.entry(name, request)?.map(|e| e.response))
    }

    fn match_any(&self, request: &Request) -> Result<Option<Response>> {
        let conn = self.lock()?;

        let row: Option<(u16, String, Vec<u8>)> = conn
            .query_row(
                r#"
                SELECT status, headers, body
                FROM cache_entries
                WHERE request_key = ?1
                ORDER BY seq DESC
                LIMIT 1
                "#,
                params![request.cache_key()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| VerdantError::Database {
                message: format!("Failed to query caches: {}", e),
                source: Some(e),
            })?;

        match row {
            Some((status, headers, body)) => Ok(Some(Self::row_to_response(status, &headers, body)?)),
            None => Ok(None),
        }
    }

    fn entry(&self, name: &str, request: &Request) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        let key = request.cache_key();

        let row: Option<EntryRow> = conn
            .query_row(
                r#"
                SELECT status, headers, body, size_bytes, cached_at
                FROM cache_entries
                WHERE cache_name = ?1 AND request_key = ?2
                "#,
                params![name, key],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| VerdantError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let (status, headers, body, size_bytes, cached_at) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        Ok(Some(CacheEntry {
            cache_name: name.to_string(),
            request_key: key,
            response: Self::row_to_response(status, &headers, body)?,
            cached_at: Self::parse_time(&cached_at).unwrap_or_else(Utc::now),
            size_bytes: size_bytes as u64,
        }))
    }

    fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::ensure_cache(&tx, name)?;
        Self::insert_entry(&tx, name, request, response)?;

        tx.commit()?;
        Ok(())
    }

    fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::ensure_cache(&tx, name)?;
        for (request, response) in entries {
            // Dropping the transaction on error rolls back earlier inserts
            Self::insert_entry(&tx, name, request, response)?;
        }

        tx.commit()?;
        debug!("Stored {} entries in '{}'", entries.len(), name);
        Ok(())
    }

    fn keys(&self, name: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT request_key FROM cache_entries WHERE cache_name = ?1 ORDER BY seq")
            .map_err(|e| VerdantError::Database {
                message: format!("Failed to prepare keys query: {}", e),
                source: Some(e),
            })?;

        let keys = stmt
            .query_map(params![name], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn delete_entry(&self, name: &str, request: &Request) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE cache_name = ?1 AND request_key = ?2",
                params![name, request.cache_key()],
            )
            .map_err(|e| VerdantError::Database {
                message: format!("Failed to delete cache entry: {}", e),
                source: Some(e),
            })?;
        Ok(deleted > 0)
    }

    fn list_names(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name FROM caches ORDER BY name")
            .map_err(|e| VerdantError::Database {
                message: format!("Failed to prepare cache list query: {}", e),
                source: Some(e),
            })?;

        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let entries = tx.execute(
            "DELETE FROM cache_entries WHERE cache_name = ?1",
            params![name],
        )?;
        let existed = tx.execute("DELETE FROM caches WHERE name = ?1", params![name])? > 0;

        tx.commit().map_err(|e| VerdantError::Database {
            message: format!("Failed to delete cache '{}': {}", name, e),
            source: Some(e),
        })?;

        if existed {
            debug!("Deleted cache '{}' ({} entries)", name, entries);
        }
        Ok(existed)
    }

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT c.name, c.created_at, COUNT(e.request_key), COALESCE(SUM(e.size_bytes), 0)
                FROM caches c
                LEFT JOIN cache_entries e ON e.cache_name = c.name
                GROUP BY c.name, c.created_at
                ORDER BY c.name
                "#,
            )
            .map_err(|e| VerdantError::Database {
                message: format!("Failed to prepare stats query: {}", e),
                source: Some(e),
            })?;

        let caches: Vec<CacheMeta> = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let created_at: String = row.get(1)?;
                let entry_count: i64 = row.get(2)?;
                let total_size_bytes: i64 = row.get(3)?;
                Ok(CacheMeta {
                    name,
                    entry_count: entry_count as usize,
                    total_size_bytes: total_size_bytes as u64,
                    created_at: Self::parse_time(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(CacheStats {
            total_entries: caches.iter().map(|c| c.entry_count).sum(),
            total_size_bytes: caches.iter().map(|c| c.total_size_bytes).sum(),
            caches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, SqliteCacheStorage) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("caches.sqlite");
        let storage = SqliteCacheStorage::open(&db_path).unwrap();
        (temp_dir, storage)
    }

    fn req(path: &str) -> Request {
        Request::get(&format!("https://example.com{}", path)).unwrap()
    }

    fn page(body: &str) -> Response {
        Response::new(200)
            .with_header("content-type", "text/html")
            .with_body(body.to_string())
    }

    #[test]
    fn test_put_and_match() {
        let (_temp, storage) = create_test_storage();

        storage.put("static-v1", &req("/"), &page("home")).unwrap();

        let hit = storage.match_in("static-v1", &req("/")).unwrap().unwrap();
        assert_eq!(hit.status(), 200);
        assert_eq!(hit.header("content-type"), Some("text/html"));
        assert_eq!(hit.body().as_ref(), b"home");
    }

    #[test]
    fn test_put_replaces_entry() {
        let (_temp, storage) = create_test_storage();

        storage.put("static-v1", &req("/"), &page("old")).unwrap();
        storage.put("static-v1", &req("/"), &page("new")).unwrap();

        let hit = storage.match_in("static-v1", &req("/")).unwrap().unwrap();
        assert_eq!(hit.body().as_ref(), b"new");
        assert_eq!(storage.keys("static-v1").unwrap().len(), 1);
    }

    #[test]
    fn test_put_rejects_failed_response() {
        let (_temp, storage) = create_test_storage();

        let err = storage
            .put("static-v1", &req("/missing"), &Response::new(404))
            .unwrap_err();
        assert!(matches!(err, VerdantError::NotCacheable { .. }));
        assert!(storage.match_in("static-v1", &req("/missing")).unwrap().is_none());
    }

    #[test]
    fn test_put_rejects_partial_content() {
        let (_temp, storage) = create_test_storage();
        let partial = Response::new(206).with_body("ab");

        let err = storage
            .put("static-v1", &req("/main.js"), &partial)
            .unwrap_err();
        assert!(err.to_string().contains("status 206"));
        assert!(storage.match_in("static-v1", &req("/main.js")).unwrap().is_none());
    }

    #[test]
    fn test_put_rejects_non_get() {
        let (_temp, storage) = create_test_storage();
        let post = Request::new(Method::POST, req("/api/items").url().clone());

        let err = storage.put("api-v1", &post, &page("{}")).unwrap_err();
        assert!(err.to_string().contains("method POST"));
        assert!(!storage.has("api-v1").unwrap());
    }

    #[test]
    fn test_put_all_is_atomic() {
        let (_temp, storage) = create_test_storage();

        let entries = vec![
            (req("/"), page("home")),
            (req("/broken"), Response::new(500)),
        ];
        assert!(storage.put_all("static-v1", &entries).is_err());
        assert!(storage.match_in("static-v1", &req("/")).unwrap().is_none());
        assert!(!storage.has("static-v1").unwrap());

        let entries = vec![(req("/"), page("home")), (req("/contato"), page("c"))];
        storage.put_all("static-v1", &entries).unwrap();
        assert_eq!(storage.keys("static-v1").unwrap().len(), 2);
    }

    #[test]
    fn test_match_missing_cache_is_miss() {
        let (_temp, storage) = create_test_storage();
        assert!(storage.match_in("nope", &req("/")).unwrap().is_none());
        assert!(!storage.has("nope").unwrap());
    }

    #[test]
    fn test_match_any_prefers_latest_write() {
        let (_temp, storage) = create_test_storage();

        storage.put("api-v1", &req("/api/x"), &page("first")).unwrap();
        storage.put("static-v1", &req("/api/x"), &page("second")).unwrap();

        let hit = storage.match_any(&req("/api/x")).unwrap().unwrap();
        assert_eq!(hit.body().as_ref(), b"second");

        storage.put("api-v1", &req("/api/x"), &page("third")).unwrap();
        let hit = storage.match_any(&req("/api/x")).unwrap().unwrap();
        assert_eq!(hit.body().as_ref(), b"third");
    }

    #[test]
    fn test_create_is_idempotent() {
        let (_temp, storage) = create_test_storage();

        storage.create("images-v1").unwrap();
        storage.create("images-v1").unwrap();

        assert!(storage.has("images-v1").unwrap());
        assert_eq!(storage.list_names().unwrap(), vec!["images-v1"]);
    }

    #[test]
    fn test_delete_cache_removes_entries() {
        let (_temp, storage) = create_test_storage();

        storage.put("a", &req("/1"), &page("1")).unwrap();
        storage.put("b", &req("/1"), &page("1")).unwrap();

        assert!(storage.delete("a").unwrap());
        assert!(!storage.delete("a").unwrap());

        assert_eq!(storage.list_names().unwrap(), vec!["b"]);
        assert!(storage.match_in("a", &req("/1")).unwrap().is_none());
        assert!(storage.match_in("b", &req("/1")).unwrap().is_some());
    }

    #[test]
    fn test_delete_entry() {
        let (_temp, storage) = create_test_storage();

        storage.put("a", &req("/1"), &page("1")).unwrap();
        storage.put("a", &req("/2"), &page("2")).unwrap();

        assert!(storage.delete_entry("a", &req("/1")).unwrap());
        assert_eq!(storage.keys("a").unwrap(), vec!["GET https://example.com/2"]);
    }

    #[test]
    fn test_entry_metadata() {
        let (_temp, storage) = create_test_storage();

        storage.put("a", &req("/logo.png"), &page("12345")).unwrap();

        let entry = storage.entry("a", &req("/logo.png")).unwrap().unwrap();
        assert_eq!(entry.size_bytes, 5);
        assert_eq!(entry.request_key, "GET https://example.com/logo.png");
        assert!(entry.cached_at <= Utc::now());
    }

    #[test]
    fn test_stats() {
        let (_temp, storage) = create_test_storage();

        storage.put("a", &req("/1"), &page("12345")).unwrap();
        storage.put("a", &req("/2"), &page("67890")).unwrap();
        storage.put("b", &req("/1"), &page("abcde")).unwrap();
        storage.create("empty").unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_size_bytes, 15);
        assert_eq!(stats.caches.len(), 3);
        assert_eq!(stats.caches[2].name, "empty");
        assert_eq!(stats.caches[2].entry_count, 0);
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("caches.sqlite");

        {
            let storage = SqliteCacheStorage::open(&db_path).unwrap();
            storage.put("static-v1", &req("/"), &page("home")).unwrap();
        }

        let storage = SqliteCacheStorage::open(&db_path).unwrap();
        assert_eq!(storage.list_names().unwrap(), vec!["static-v1"]);
        let hit = storage.match_in("static-v1", &req("/")).unwrap().unwrap();
        assert_eq!(hit.body().as_ref(), b"home");
    }
}
