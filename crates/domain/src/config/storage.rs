use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{env_parse, env_str};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persistence tree layout:
///
/// ```text
/// <data_root>/
///   conversations/<ID>.json
///   tickets/<ID>.json
///   uploads/<ID>/<ts>-<rand>.<ext>
///   ids/used_ids.json
///   ids/used_ids.lock
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "d_data_root")]
    pub data_root: PathBuf,
    /// Session cache capacity (records).
    #[serde(default = "d_cache_capacity")]
    pub cache_capacity: usize,
    /// Upload size cap in bytes (decoded).
    #[serde(default = "d_upload_max")]
    pub upload_max_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: d_data_root(),
            cache_capacity: d_cache_capacity(),
            upload_max_bytes: d_upload_max(),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            data_root: PathBuf::from(env_str("DATA_ROOT", "./data")),
            cache_capacity: env_parse("CACHE_CAPACITY", d_cache_capacity()),
            upload_max_bytes: env_parse("UPLOAD_MAX_BYTES", d_upload_max()),
        }
    }

    pub fn conversations_dir(&self) -> PathBuf {
        self.data_root.join("conversations")
    }

    pub fn tickets_dir(&self) -> PathBuf {
        self.data_root.join("tickets")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_root.join("uploads")
    }

    pub fn ids_dir(&self) -> PathBuf {
        self.data_root.join("ids")
    }

    pub fn used_ids_file(&self) -> PathBuf {
        self.ids_dir().join("used_ids.json")
    }

    pub fn used_ids_lock(&self) -> PathBuf {
        self.ids_dir().join("used_ids.lock")
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_data_root() -> PathBuf {
    PathBuf::from("./data")
}
fn d_cache_capacity() -> usize {
    256
}
fn d_upload_max() -> usize {
    5 * 1024 * 1024
}
