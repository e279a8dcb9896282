//! In-memory working copies of active conversations.
//!
//! The cache is a write-through LRU in front of the durable store: every
//! save lands on disk first, then refreshes the cache, so eviction never
//! needs a flush and a miss is never a correctness problem. Entries are
//! cloned out — in-flight handlers never share a pointer with the cache.
//!
//! Records that have no conversation ID yet (pre-language greetings) live
//! *only* here, keyed by their opaque session ID.

use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use parking_lot::Mutex;

use tb_domain::conversation::{ConversationId, ConversationRecord};
use tb_domain::Result;

use crate::conversations::ConversationStore;

pub struct SessionCache {
    inner: Mutex<LruCache<String, ConversationRecord>>,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, key: &str) -> Option<ConversationRecord> {
        self.inner.lock().get(key).cloned()
    }

    pub fn put(&self, key: String, record: ConversationRecord) {
        self.inner.lock().put(key, record);
    }

    pub fn remove(&self, key: &str) {
        self.inner.lock().pop(key);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Cache key for records that only exist pre-ID.
fn session_key(session_id: &str) -> String {
    format!("sess:{session_id}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Repo facade
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One load/save surface over the cache + store pair.
pub struct ConversationRepo {
    cache: SessionCache,
    store: ConversationStore,
}

impl ConversationRepo {
    pub fn new(conversations_dir: &Path, cache_capacity: usize) -> Result<Self> {
        Ok(Self {
            cache: SessionCache::new(cache_capacity),
            store: ConversationStore::new(conversations_dir)?,
        })
    }

    /// Load by conversation ID; cache first, disk on miss.
    pub fn load(&self, id: &str) -> Result<Option<ConversationRecord>> {
        if let Some(rec) = self.cache.get(id) {
            return Ok(Some(rec));
        }
        let loaded = self.store.load(id)?;
        if let Some(rec) = &loaded {
            self.cache.put(id.to_string(), rec.clone());
        }
        Ok(loaded)
    }

    /// Persist then refresh the cache (write-through).
    pub fn save(&self, record: &ConversationRecord) -> Result<()> {
        self.store.save(record)?;
        if let Some(id) = record.storage_key() {
            self.cache.put(id.as_str().to_string(), record.clone());
        }
        Ok(())
    }

    /// Fetch a pre-ID record by its session key. Cache-only by design:
    /// abandoned greetings evaporate with the process.
    pub fn load_session(&self, session_id: &str) -> Option<ConversationRecord> {
        self.cache.get(&session_key(session_id))
    }

    /// Stash a pre-ID record under its session key.
    pub fn save_session(&self, record: &ConversationRecord) {
        self.cache
            .put(session_key(&record.session_id), record.clone());
    }

    /// First durable save after ID assignment: writes the record under its
    /// new ID and drops the session-keyed cache entry.
    pub fn promote(&self, record: &ConversationRecord, id: &ConversationId) -> Result<()> {
        debug_assert_eq!(record.storage_key(), Some(id));
        self.save(record)?;
        self.cache.remove(&session_key(&record.session_id));
        Ok(())
    }

    pub fn exists(&self, id: &str) -> bool {
        self.cache.get(id).is_some() || self.store.exists(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(session: &str, id: Option<&str>) -> ConversationRecord {
        let mut rec = ConversationRecord::new_session(session.into());
        rec.conversation_id = id.map(|i| i.parse().unwrap());
        rec
    }

    #[test]
    fn lru_evicts_oldest() {
        let cache = SessionCache::new(2);
        cache.put("a".into(), record("a", None));
        cache.put("b".into(), record("b", None));
        cache.put("c".into(), record("c", None));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn write_through_survives_cache_miss() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConversationRepo::new(dir.path(), 1).unwrap();

        let a = record("s-a", Some("AA1111"));
        let b = record("s-b", Some("BB2222"));
        repo.save(&a).unwrap();
        repo.save(&b).unwrap(); // evicts AA1111 from the cache

        // Still loadable from disk.
        let loaded = repo.load("AA1111").unwrap().unwrap();
        assert_eq!(loaded.session_id, "s-a");
    }

    #[test]
    fn session_records_stay_in_memory_only() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConversationRepo::new(dir.path(), 8).unwrap();

        let rec = record("sess-9", None);
        repo.save_session(&rec);
        assert!(repo.load_session("sess-9").is_some());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn promote_rekeys_from_session_to_id() {
        let dir = tempfile::tempdir().unwrap();
        let repo = ConversationRepo::new(dir.path(), 8).unwrap();

        let mut rec = record("sess-1", None);
        repo.save_session(&rec);

        let id: ConversationId = "CC3333".parse().unwrap();
        rec.conversation_id = Some(id.clone());
        repo.promote(&rec, &id).unwrap();

        assert!(repo.load_session("sess-1").is_none());
        assert!(repo.load("CC3333").unwrap().is_some());
    }
}
