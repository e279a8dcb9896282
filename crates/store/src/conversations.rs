//! Durable conversation store.
//!
//! One JSON document per conversation under `conversations/<ID>.json`.
//! Every save goes through a sibling temp file + rename so a crash mid-write
//! can never clobber the previous valid record. The ID is validated against
//! `^[A-Z]{2}[0-9]{4}$` before any path is built from it.

use std::path::{Path, PathBuf};

use regex::Regex;

use tb_domain::conversation::{ConversationRecord, TranscriptEvent, SCHEMA_VERSION};
use tb_domain::trace::TraceEvent;
use tb_domain::{Error, Result};

pub struct ConversationStore {
    dir: PathBuf,
    id_pattern: Regex,
}

impl ConversationStore {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        // Compiled once per store, same as the startup-compiled pattern sets
        // elsewhere in the stack.
        let id_pattern = Regex::new("^[A-Z]{2}[0-9]{4}$")
            .map_err(|e| Error::Other(format!("id pattern: {e}")))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            id_pattern,
        })
    }

    /// Validate the ID and build the record path. Rejecting before joining
    /// keeps traversal payloads (`../`, absolute paths) off the filesystem.
    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if !self.id_pattern.is_match(id) {
            return Err(Error::Validation(format!("invalid conversation id: {id:?}")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.exists()).unwrap_or(false)
    }

    /// Load a record, migrating old schema versions forward.
    pub fn load(&self, id: &str) -> Result<Option<ConversationRecord>> {
        let path = self.path_for(id)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut record: ConversationRecord =
            serde_json::from_str(&raw).map_err(|_| Error::CorruptedRecord(id.to_string()))?;
        migrate(&mut record, id);
        Ok(Some(record))
    }

    /// Atomic full replace of a record. The temp file is a sibling of the
    /// final path so the rename never crosses a volume boundary.
    pub fn save(&self, record: &ConversationRecord) -> Result<()> {
        let id = record
            .storage_key()
            .ok_or_else(|| Error::Validation("record has no conversation id".into()))?;
        let path = self.path_for(id.as_str())?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load → push → save. The record must already exist.
    pub fn append(&self, id: &str, event: TranscriptEvent) -> Result<()> {
        let mut record = self
            .load(id)?
            .ok_or_else(|| Error::NotFound(format!("conversation {id}")))?;
        record.append_event(event);
        self.save(&record)
    }
}

/// Forward-migrate a loaded record.
///
/// `1.0.0 → 2.0.0` is automatic: the new optional fields already default
/// through serde, so only the version stamp moves. Versions newer than this
/// build understands are marked incompatible and routed to a cold start.
fn migrate(record: &mut ConversationRecord, id: &str) {
    if record.schema_version == SCHEMA_VERSION {
        return;
    }
    if record.schema_version == "1.0.0" {
        let from = std::mem::replace(&mut record.schema_version, SCHEMA_VERSION.to_string());
        TraceEvent::RecordMigrated {
            conversation_id: id.to_string(),
            from_version: from,
            to_version: SCHEMA_VERSION.to_string(),
        }
        .emit();
        return;
    }
    tracing::warn!(
        conversation_id = id,
        schema_version = %record.schema_version,
        "unknown schema version, marking record legacy_incompatible"
    );
    record.legacy_incompatible = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_domain::conversation::SystemEventName;

    fn record(id: &str) -> ConversationRecord {
        let mut rec = ConversationRecord::new_session("sess-1".into());
        rec.conversation_id = Some(id.parse().unwrap());
        rec
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();

        let mut rec = record("AB1234");
        rec.push_user_text("no enciende");
        store.save(&rec).unwrap();

        let loaded = store.load("AB1234").unwrap().unwrap();
        assert_eq!(loaded.conversation_id, rec.conversation_id);
        assert_eq!(loaded.transcript.len(), 1);
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        assert!(store.load("ZZ0000").unwrap().is_none());
    }

    #[test]
    fn traversal_ids_are_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        for bad in ["../etc", "AB12345", "ab1234", "AB123", "AÑ1234", ""] {
            match store.load(bad) {
                Err(Error::Validation(_)) => {}
                other => panic!("expected validation error for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn append_pushes_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        store.save(&record("CD5678")).unwrap();

        let mut probe = record("CD5678");
        probe.push_system(SystemEventName::FallbackUsed, serde_json::json!({}));
        store
            .append("CD5678", probe.transcript.pop().unwrap())
            .unwrap();

        let loaded = store.load("CD5678").unwrap().unwrap();
        assert_eq!(loaded.transcript.len(), 1);
    }

    #[test]
    fn stale_temp_file_does_not_shadow_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();

        let rec = record("EF9012");
        store.save(&rec).unwrap();
        // Simulate a crashed write: garbage temp file next to the record.
        std::fs::write(dir.path().join("EF9012.json.tmp"), b"{garbage").unwrap();

        let loaded = store.load("EF9012").unwrap().unwrap();
        assert_eq!(loaded.conversation_id, rec.conversation_id);
    }

    #[test]
    fn corrupted_record_is_a_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("GH3456.json"), b"not json at all").unwrap();
        match store.load("GH3456") {
            Err(Error::CorruptedRecord(id)) => assert_eq!(id, "GH3456"),
            other => panic!("expected CorruptedRecord, got {other:?}"),
        }
    }

    #[test]
    fn v1_record_migrates_forward() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();

        let mut rec = record("IJ7890");
        rec.schema_version = "1.0.0".into();
        // Write without going through save() migration side effects.
        let json = serde_json::to_string(&rec).unwrap();
        std::fs::write(dir.path().join("IJ7890.json"), json).unwrap();

        let loaded = store.load("IJ7890").unwrap().unwrap();
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert!(!loaded.legacy_incompatible);
    }

    #[test]
    fn future_schema_marks_legacy_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::new(dir.path()).unwrap();

        let mut rec = record("KL1122");
        rec.schema_version = "9.0.0".into();
        let json = serde_json::to_string(&rec).unwrap();
        std::fs::write(dir.path().join("KL1122.json"), json).unwrap();

        let loaded = store.load("KL1122").unwrap().unwrap();
        assert!(loaded.legacy_incompatible);
        assert_eq!(loaded.schema_version, "9.0.0");
    }
}
