//! Conversation ID reservation.
//!
//! Allocates never-repeated `[A-Z]{2}[0-9]{4}` identifiers. The used set
//! lives in a single on-disk JSON array guarded by an exclusive-create
//! lock file, and is rewritten via a sibling temp file + rename so a crash
//! can never leave it half-written.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use tb_domain::conversation::ConversationId;
use tb_domain::trace::TraceEvent;
use tb_domain::{Error, Result};

/// Bounded attempts to grab the lock file before surfacing a 5xx.
const LOCK_ATTEMPTS: u32 = 50;
/// Bounded random draws before declaring the ID space saturated.
const DRAW_ATTEMPTS: u32 = 100;
/// A lock older than this is presumed orphaned by a dead process.
const STALE_LOCK_SECS: u64 = 60;

pub struct IdReserver {
    used_path: PathBuf,
    lock_path: PathBuf,
}

/// RAII lock-file guard; deletes the file on drop so the lock is released
/// on every exit path, including panics.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release id lock");
        }
    }
}

impl IdReserver {
    pub fn new(used_path: PathBuf, lock_path: PathBuf) -> Result<Self> {
        if let Some(dir) = used_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            used_path,
            lock_path,
        })
    }

    /// Remove a lock file left behind by a crashed process.
    ///
    /// Called at startup and by the periodic sweeper. Only locks older
    /// than [`STALE_LOCK_SECS`] are reclaimed; a younger lock belongs to
    /// a live reservation.
    pub fn reclaim_stale_lock(&self) -> Result<bool> {
        let meta = match std::fs::metadata(&self.lock_path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .unwrap_or_default();
        if age.as_secs() < STALE_LOCK_SECS {
            return Ok(false);
        }
        std::fs::remove_file(&self.lock_path)?;
        TraceEvent::StaleLockReclaimed {
            age_secs: age.as_secs(),
        }
        .emit();
        Ok(true)
    }

    /// Reserve a fresh, globally unique conversation ID.
    pub async fn reserve(&self) -> Result<ConversationId> {
        let _guard = self.acquire_lock().await?;

        let mut used = self.load_used()?;
        let mut draws = 0u32;
        let candidate = {
            let seen: HashSet<&str> = used.iter().map(String::as_str).collect();
            let mut found = None;
            for _ in 0..DRAW_ATTEMPTS {
                draws += 1;
                let c = draw_candidate();
                if !seen.contains(c.as_str()) {
                    found = Some(c);
                    break;
                }
            }
            found
        };
        let id_str = candidate.ok_or(Error::IdExhausted)?;

        used.push(id_str.clone());
        self.persist_used(&used)?;

        TraceEvent::ConversationIdReserved {
            conversation_id: id_str.clone(),
            draw_attempts: draws,
        }
        .emit();

        // The format is correct by construction.
        id_str.parse().map_err(Error::Other)
    }

    // ── Private ──────────────────────────────────────────────────────

    /// Exclusive-create the lock file, retrying with jittered backoff.
    async fn acquire_lock(&self) -> Result<LockGuard> {
        for _ in 0..LOCK_ATTEMPTS {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(_) => {
                    return Ok(LockGuard {
                        path: self.lock_path.clone(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let jitter = rand::thread_rng().gen_range(5..25);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::LockBusy("id reservation lock".into()))
    }

    fn load_used(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(&self.used_path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist_used(&self, used: &[String]) -> Result<()> {
        let tmp = self.used_path.with_extension("json.tmp");
        let json = serde_json::to_string(used)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.used_path)?;
        Ok(())
    }
}

fn draw_candidate() -> String {
    let mut rng = rand::thread_rng();
    let a = rng.gen_range(b'A'..=b'Z') as char;
    let b = rng.gen_range(b'A'..=b'Z') as char;
    let n: u16 = rng.gen_range(0..10_000);
    format!("{a}{b}{n:04}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    fn reserver(dir: &Path) -> IdReserver {
        IdReserver::new(dir.join("used_ids.json"), dir.join("used_ids.lock")).unwrap()
    }

    #[test]
    fn candidates_match_format() {
        for _ in 0..500 {
            let c = draw_candidate();
            assert!(ConversationId::is_valid(&c), "bad candidate {c}");
        }
    }

    #[tokio::test]
    async fn reserve_persists_and_is_unique() {
        let dir = tempfile::tempdir().unwrap();
        let r = reserver(dir.path());

        let a = r.reserve().await.unwrap();
        let b = r.reserve().await.unwrap();
        assert_ne!(a, b);

        let raw = std::fs::read_to_string(dir.path().join("used_ids.json")).unwrap();
        let used: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(used.len(), 2);
        assert!(used.contains(&a.as_str().to_string()));

        // Lock released.
        assert!(!dir.path().join("used_ids.lock").exists());
    }

    #[tokio::test]
    async fn concurrent_reservations_stay_unique() {
        let dir = tempfile::tempdir().unwrap();
        let r = Arc::new(reserver(dir.path()));

        let mut handles = Vec::new();
        for _ in 0..200 {
            let r = r.clone();
            handles.push(tokio::spawn(async move { r.reserve().await.unwrap() }));
        }

        let mut ids = HashSet::new();
        for h in handles {
            assert!(ids.insert(h.await.unwrap()), "duplicate id reserved");
        }
        assert_eq!(ids.len(), 200);

        let raw = std::fs::read_to_string(dir.path().join("used_ids.json")).unwrap();
        let used: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(used.len(), 200);
        assert!(!dir.path().join("used_ids.lock").exists());
    }

    #[tokio::test]
    async fn stale_lock_is_reclaimed_fresh_lock_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let r = reserver(dir.path());

        std::fs::write(dir.path().join("used_ids.lock"), b"").unwrap();
        // Fresh lock: untouched.
        assert!(!r.reclaim_stale_lock().unwrap());
        assert!(dir.path().join("used_ids.lock").exists());
    }

    #[tokio::test]
    async fn existing_used_set_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let r = reserver(dir.path());

        std::fs::write(dir.path().join("used_ids.json"), "[\"AB1234\"]").unwrap();
        let id = r.reserve().await.unwrap();
        assert_ne!(id.as_str(), "AB1234");

        let raw = std::fs::read_to_string(dir.path().join("used_ids.json")).unwrap();
        let used: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(used.len(), 2);
        assert_eq!(used[0], "AB1234");
    }
}
