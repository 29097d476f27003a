use crate::{FileRecord, LedgerEntries, LedgerError, LedgerStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-process ledger store. Keeps the last persisted snapshot and can be
/// switched into a failing mode to exercise persistence errors.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<LedgerEntries>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: LedgerEntries) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Self::default()
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful persist calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> LedgerEntries {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self) -> Result<LedgerEntries, LedgerError> {
        Ok(self.snapshot())
    }

    async fn persist(
        &self,
        _path: &str,
        _record: &FileRecord,
        snapshot: &[(String, FileRecord)],
    ) -> Result<(), LedgerError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("memory store set to fail".into()));
        }
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| LedgerError::Rejected("memory store lock poisoned".into()))?;
        *guard = snapshot.to_vec();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
