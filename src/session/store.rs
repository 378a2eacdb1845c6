//! Filesystem session store.
//!
//! Records live as `{persist_dir}/{session_id}.json`. Writes are atomic
//! (temp file, fsync, rename) so a crash mid-save never corrupts an
//! existing record. Loading picks the newest file by modification time.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{AgentError, Result};

use super::record::SessionRecord;

/// JSON-file session store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Open a store, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AgentError::Session(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Atomically write a record. Returns the file path.
    pub fn save(&self, record: &SessionRecord) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.json", record.session_id));
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| AgentError::Session(format!("serialize failed: {e}")))?;

        let tmp = self.dir.join(format!(".{}.tmp", record.session_id));
        std::fs::write(&tmp, json.as_bytes())
            .map_err(|e| AgentError::Session(format!("write {} failed: {e}", tmp.display())))?;
        if let Ok(file) = std::fs::File::open(&tmp) {
            let _ = file.sync_all();
        }
        std::fs::rename(&tmp, &path)
            .map_err(|e| AgentError::Session(format!("rename to {} failed: {e}", path.display())))?;

        debug!("session saved to {}", path.display());
        Ok(path)
    }

    /// Load the most recently modified record, if any. Unreadable files
    /// are skipped with a warning rather than failing the load.
    pub fn load_latest(&self) -> Result<Option<SessionRecord>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| AgentError::Session(format!("cannot read {}: {e}", self.dir.display())))?;

        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("session_"));
            if !is_record {
                continue;
            }
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }

        let Some((_, path)) = newest else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| AgentError::Session(format!("cannot read {}: {e}", path.display())))?;
        match serde_json::from_str(&text) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("skipping corrupt session file {}: {e}", path.display());
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        let mut record = SessionRecord::new("test-model");
        record.set_history(&[Message::user("hi"), Message::assistant("hello")]);
        record.turns = 1;
        let path = store.save(&record).unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("session_"));

        let loaded = store.load_latest().unwrap().expect("record present");
        assert_eq!(loaded, record);
    }

    #[test]
    fn load_latest_picks_newest_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        let mut old = SessionRecord::new("m");
        old.session_id = "session_1000".into();
        store.save(&old).unwrap();

        let mut new = SessionRecord::new("m");
        new.session_id = "session_2000".into();
        new.turns = 3;
        // Ensure a later mtime even on coarse filesystems.
        std::thread::sleep(std::time::Duration::from_millis(20));
        store.save(&new).unwrap();

        let loaded = store.load_latest().unwrap().unwrap();
        assert_eq!(loaded.session_id, "session_2000");
        assert_eq!(loaded.turns, 3);
    }

    #[test]
    fn empty_store_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        assert!(store.load_latest().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("session_123.json"), "{not valid").unwrap();
        assert!(store.load_latest().unwrap().is_none());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        store.save(&SessionRecord::new("m")).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
