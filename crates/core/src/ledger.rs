//! In-memory view of every successfully uploaded path, backed by a
//! [`LedgerStore`] that is written through on each mutation.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use storage::{FileRecord, LedgerError, LedgerStore};

/// Path -> last uploaded fingerprint, in insertion order, with a content-hash
/// index. Positions never move once assigned (nothing is ever removed), so
/// the smallest position in a hash bucket is the first match a linear scan
/// would find.
pub struct UploadLedger {
    store: Arc<dyn LedgerStore>,
    entries: Vec<(String, FileRecord)>,
    positions: HashMap<String, usize>,
    by_hash: HashMap<String, BTreeSet<usize>>,
}

impl UploadLedger {
    pub async fn open(store: Arc<dyn LedgerStore>) -> Result<Self, LedgerError> {
        let loaded = store.load().await?;
        let mut ledger = Self {
            store,
            entries: Vec::with_capacity(loaded.len()),
            positions: HashMap::with_capacity(loaded.len()),
            by_hash: HashMap::new(),
        };
        for (path, record) in loaded {
            ledger.upsert(path, record);
        }
        Ok(ledger)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileRecord)> {
        self.entries.iter().map(|(p, r)| (p.as_str(), r))
    }

    pub fn lookup(&self, path: &str) -> Option<&FileRecord> {
        self.positions.get(path).map(|&i| &self.entries[i].1)
    }

    /// First path, in ledger order, whose content hash is `hash`.
    pub fn find_by_hash(&self, hash: &str) -> Option<&str> {
        self.by_hash
            .get(hash)
            .and_then(|set| set.iter().next())
            .map(|&i| self.entries[i].0.as_str())
    }

    /// Like [`find_by_hash`](Self::find_by_hash) but never returns `path` itself.
    pub fn find_other_by_hash(&self, hash: &str, path: &str) -> Option<&str> {
        self.by_hash.get(hash).and_then(|set| {
            set.iter()
                .map(|&i| self.entries[i].0.as_str())
                .find(|p| *p != path)
        })
    }

    /// Upserts the record and persists before returning.
    ///
    /// On `Err` the in-memory record is already updated; only the durable
    /// copy is stale.
    pub async fn record_upload(
        &mut self,
        path: &str,
        mtime: f64,
        hash: &str,
    ) -> Result<(), LedgerError> {
        let record = FileRecord {
            mtime,
            hash: hash.to_string(),
        };
        self.upsert(path.to_string(), record.clone());
        self.store.persist(path, &record, &self.entries).await
    }

    fn upsert(&mut self, path: String, record: FileRecord) {
        match self.positions.get(&path) {
            Some(&i) => {
                let old_hash = std::mem::replace(&mut self.entries[i].1, record.clone()).hash;
                if let Some(set) = self.by_hash.get_mut(&old_hash) {
                    set.remove(&i);
                    if set.is_empty() {
                        self.by_hash.remove(&old_hash);
                    }
                }
                self.by_hash.entry(record.hash).or_default().insert(i);
            }
            None => {
                let i = self.entries.len();
                self.by_hash.entry(record.hash.clone()).or_default().insert(i);
                self.positions.insert(path.clone(), i);
                self.entries.push((path, record));
            }
        }
    }
}
