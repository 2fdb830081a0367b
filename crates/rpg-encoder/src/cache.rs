//! Content-addressed persistent cache of extracted semantic features.
//!
//! Rows carry the source-content hash they were computed from; reads that
//! miss on hash or exceed the TTL delete the row and report a miss, so
//! stale features never leak into a fresh encode.

use anyhow::{Context, Result};
use rpg_core::node::SemanticFeature;
use rpg_core::revision::hex_prefix;
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

/// Length of the hex-encoded content hash.
const HASH_LEN: usize = 16;

/// Persistent key/value store of semantic features.
///
/// Safe for concurrent readers and a single writer per row: the store runs
/// in WAL journal mode and every write is immediate (no buffering), so
/// `save()` is a no-op.
pub struct SemanticCache {
    conn: Mutex<Connection>,
    ttl_secs: u64,
}

impl SemanticCache {
    /// Open (or create) a cache database at the given path.
    pub fn open(path: &Path, ttl_secs: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open cache at {}", path.display()))?;
        Self::init(conn, ttl_secs)
    }

    /// In-memory cache for tests.
    pub fn in_memory(ttl_secs: u64) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, ttl_secs)
    }

    fn init(conn: Connection, ttl_secs: u64) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS features (
                key TEXT PRIMARY KEY,
                feature TEXT NOT NULL,
                hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_features_created_at
                ON features (created_at);",
        )
        .context("failed to initialize cache schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_secs,
        })
    }

    /// Cache key for an entity: `"{filePath}:{type}:{name}"`.
    pub fn cache_key(file_path: &str, entity_type: &str, name: &str) -> String {
        format!("{file_path}:{entity_type}:{name}")
    }

    /// 16-hex-digit content hash over the entity's identity and source.
    pub fn content_hash(
        file_path: &str,
        entity_type: &str,
        name: &str,
        parent: Option<&str>,
        source_code: Option<&str>,
        documentation: Option<&str>,
    ) -> String {
        let mut hasher = Sha256::new();
        for part in [
            file_path,
            entity_type,
            name,
            parent.unwrap_or(""),
            source_code.unwrap_or(""),
            documentation.unwrap_or(""),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"|");
        }
        hex_prefix(&hasher.finalize(), HASH_LEN)
    }

    /// Look up a feature. Hash mismatches and expired rows are deleted and
    /// reported as misses.
    pub fn get(&self, key: &str, hash: &str) -> Result<Option<SemanticFeature>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT feature, hash, created_at FROM features WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .context("cache read failed")?;

        let Some((feature_json, stored_hash, created_at)) = row else {
            return Ok(None);
        };

        let expired = now_secs().saturating_sub(created_at) > self.ttl_secs as i64;
        if stored_hash != hash || expired {
            conn.execute("DELETE FROM features WHERE key = ?1", params![key])
                .context("cache eviction failed")?;
            return Ok(None);
        }

        let feature: SemanticFeature =
            serde_json::from_str(&feature_json).context("corrupt cache row")?;
        Ok(Some(feature))
    }

    /// Whether a fresh entry exists for the key/hash pair.
    pub fn has(&self, key: &str, hash: &str) -> Result<bool> {
        Ok(self.get(key, hash)?.is_some())
    }

    /// Upsert a feature.
    pub fn set(&self, key: &str, hash: &str, feature: &SemanticFeature) -> Result<()> {
        let feature_json = serde_json::to_string(feature)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO features (key, feature, hash, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 feature = excluded.feature,
                 hash = excluded.hash,
                 created_at = excluded.created_at",
            params![key, feature_json, hash, now_secs()],
        )
        .context("cache write failed")?;
        Ok(())
    }

    /// Delete all entries.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM features", [])
            .context("cache clear failed")?;
        Ok(())
    }

    /// Delete expired entries; returns how many were removed.
    pub fn purge(&self) -> Result<usize> {
        let cutoff = now_secs() - self.ttl_secs as i64;
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute(
                "DELETE FROM features WHERE created_at < ?1",
                params![cutoff],
            )
            .context("cache purge failed")?;
        Ok(removed)
    }

    /// Writes are durable immediately; kept for interface symmetry.
    pub fn save(&self) {}

    /// Close the underlying connection.
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().unwrap();
        conn.close()
            .map_err(|(_, e)| anyhow::anyhow!("failed to close cache: {e}"))
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(desc: &str) -> SemanticFeature {
        SemanticFeature::new(desc)
    }

    #[test]
    fn test_round_trip() {
        let cache = SemanticCache::in_memory(3600).unwrap();
        let key = SemanticCache::cache_key("a.py", "function", "load");
        let hash = SemanticCache::content_hash("a.py", "function", "load", None, Some("def load(): pass"), None);

        assert!(cache.get(&key, &hash).unwrap().is_none());
        cache.set(&key, &hash, &feature("load stored rows")).unwrap();
        let hit = cache.get(&key, &hash).unwrap().unwrap();
        assert_eq!(hit.description, "load stored rows");
        assert!(cache.has(&key, &hash).unwrap());
    }

    #[test]
    fn test_hash_mismatch_evicts() {
        let cache = SemanticCache::in_memory(3600).unwrap();
        let key = SemanticCache::cache_key("a.py", "function", "load");
        cache.set(&key, "aaaa", &feature("load stored rows")).unwrap();
        // Source changed — different hash misses and deletes the row
        assert!(cache.get(&key, "bbbb").unwrap().is_none());
        // Even the original hash now misses: the row is gone
        assert!(cache.get(&key, "aaaa").unwrap().is_none());
    }

    #[test]
    fn test_ttl_expiry_evicts() {
        let cache = SemanticCache::in_memory(0).unwrap();
        let key = SemanticCache::cache_key("a.py", "function", "load");
        cache.set(&key, "aaaa", &feature("load stored rows")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(cache.get(&key, "aaaa").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces() {
        let cache = SemanticCache::in_memory(3600).unwrap();
        let key = SemanticCache::cache_key("a.py", "function", "load");
        cache.set(&key, "aaaa", &feature("first version")).unwrap();
        cache.set(&key, "bbbb", &feature("second version")).unwrap();
        let hit = cache.get(&key, "bbbb").unwrap().unwrap();
        assert_eq!(hit.description, "second version");
    }

    #[test]
    fn test_clear_and_purge_idempotent() {
        let cache = SemanticCache::in_memory(3600).unwrap();
        cache.set("k", "h", &feature("x")).unwrap();
        cache.clear().unwrap();
        cache.clear().unwrap();
        assert!(cache.get("k", "h").unwrap().is_none());
        assert_eq!(cache.purge().unwrap(), 0);
    }

    #[test]
    fn test_content_hash_is_16_hex_and_sensitive() {
        let a = SemanticCache::content_hash("a.py", "function", "f", None, Some("x"), None);
        let b = SemanticCache::content_hash("a.py", "function", "f", None, Some("y"), None);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_persistent_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cache.db");
        {
            let cache = SemanticCache::open(&path, 3600).unwrap();
            cache.set("k", "h", &feature("persist me")).unwrap();
            cache.close().unwrap();
        }
        let cache = SemanticCache::open(&path, 3600).unwrap();
        assert_eq!(
            cache.get("k", "h").unwrap().unwrap().description,
            "persist me"
        );
    }
}
