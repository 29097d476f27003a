use crate::{FileRecord, LedgerEntries, LedgerError, LedgerStore};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whole-ledger JSON snapshot: `{ "<path>": { "mtime": .., "hash": ".." } }`.
///
/// Every persist rewrites the full file through a temp file and a rename, so
/// a process killed mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn malformed(&self, source: serde_json::Error) -> LedgerError {
        LedgerError::Malformed {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl LedgerStore for JsonSnapshotStore {
    async fn load(&self) -> Result<LedgerEntries, LedgerError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no ledger snapshot yet, starting empty");
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let map: Map<String, Value> = serde_json::from_str(&raw).map_err(|e| self.malformed(e))?;
        let mut entries = Vec::with_capacity(map.len());
        for (path, value) in map {
            let record: FileRecord = serde_json::from_value(value).map_err(|e| self.malformed(e))?;
            entries.push((path, record));
        }
        Ok(entries)
    }

    async fn persist(
        &self,
        _path: &str,
        _record: &FileRecord,
        snapshot: &[(String, FileRecord)],
    ) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }

        let mut map = Map::with_capacity(snapshot.len());
        for (path, record) in snapshot {
            map.insert(
                path.clone(),
                serde_json::to_value(record).map_err(|e| self.malformed(e))?,
            );
        }
        let bytes = serde_json::to_vec(&map).map_err(|e| self.malformed(e))?;

        let temp_path = self.path.with_extension("json.tmp");
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            self.io_err(e)
        })?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            self.io_err(e)
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(mtime: f64, hash: &str) -> FileRecord {
        FileRecord {
            mtime,
            hash: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let temp = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(temp.path().join("uploaded_files.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persist_then_load_keeps_insertion_order() {
        let temp = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(temp.path().join("state/uploaded_files.json"));
        let snapshot = vec![
            ("/z/last.pdf".to_string(), rec(3.5, "c")),
            ("/a/first.pdf".to_string(), rec(1.25, "a")),
        ];
        store
            .persist("/a/first.pdf", &snapshot[1].1, &snapshot)
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!temp.path().join("state/uploaded_files.json.tmp").exists());
    }

    #[tokio::test]
    async fn loads_snapshot_written_by_older_agent() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("uploaded_files.json");
        fs::write(
            &path,
            r#"{"/docs/a.txt": {"mtime": 1712345678.123456, "hash": "abc"}, "/docs/b.pdf": {"mtime": 1712345679, "hash": "def"}}"#,
        )
        .unwrap();

        let loaded = JsonSnapshotStore::new(&path).load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].0, "/docs/a.txt");
        assert_eq!(loaded[0].1.mtime, 1712345678.123456);
        assert_eq!(loaded[1].1, rec(1712345679.0, "def"));
    }

    #[tokio::test]
    async fn malformed_snapshot_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("uploaded_files.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        let err = JsonSnapshotStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, LedgerError::Malformed { .. }));
    }
}
