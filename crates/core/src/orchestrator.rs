//! One scan pass: walks every configured folder and decides, file by file,
//! whether to skip, upload, or recognize a copy of something already sent.

use crate::config::{AppConfig, ConfigError, WorkspaceMapping};
use crate::fingerprint::{self, epoch_secs, Fingerprint};
use crate::ledger::UploadLedger;
use crate::naming::{is_transient_name, CopyHeuristic};
use globset::{Glob, GlobSet, GlobSetBuilder};
use providers::{SinkError, UploadSink};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::task;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Filters and limits applied to every candidate.
#[derive(Debug, Clone)]
pub struct ScanPolicy {
    extensions: HashSet<String>,
    settle: Duration,
    excludes: GlobSet,
    copies: CopyHeuristic,
    upload_timeout: Duration,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            extensions: ["pdf", "docx", "txt"].iter().map(|e| e.to_string()).collect(),
            settle: Duration::from_secs(5),
            excludes: GlobSet::empty(),
            copies: CopyHeuristic::default(),
            upload_timeout: Duration::from_secs(60),
        }
    }
}

impl ScanPolicy {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ConfigError> {
        let copies = CopyHeuristic::with_extra(&cfg.scan.copy_patterns)
            .map_err(|e| ConfigError::Invalid(format!("scan.copy_patterns: {e}")))?;
        let excludes = build_globset(&cfg.scan.exclude)
            .map_err(|e| ConfigError::Invalid(format!("scan.exclude: {e}")))?;
        Ok(Self {
            extensions: cfg
                .scan
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            settle: cfg.scan.settle(),
            excludes,
            copies,
            upload_timeout: cfg.sink.timeout(),
        })
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn with_excludes(mut self, patterns: &[String]) -> Result<Self, globset::Error> {
        self.excludes = build_globset(patterns)?;
        Ok(self)
    }

    /// True while `mtime` is younger than the settle window at `now`.
    fn is_settling(&self, mtime: f64, now: SystemTime) -> bool {
        epoch_secs(now) - mtime < self.settle.as_secs_f64()
    }

    fn accepts_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(Glob::new(pat)?);
    }
    builder.build()
}

/// Outcome for a single candidate file.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Transient,
    UnsupportedExtension,
    Settling,
    Unreadable,
    Unchanged,
    Duplicate { of: String },
    Uploaded { persisted: bool },
    UploadFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateReport {
    pub path: String,
    pub duplicate_of: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassSummary {
    pub discovered: usize,
    pub uploaded: usize,
    pub unchanged: usize,
    pub filtered: usize,
    pub settling: usize,
    pub unreadable: usize,
    pub upload_failures: usize,
    pub persistence_failures: usize,
    pub walk_errors: usize,
    pub missing_folders: usize,
    pub duplicates: Vec<DuplicateReport>,
    /// Shutdown was requested before the pass finished.
    pub interrupted: bool,
}

impl PassSummary {
    fn tally(&mut self, path: &Path, decision: Decision) {
        self.discovered += 1;
        match decision {
            Decision::Transient | Decision::UnsupportedExtension => self.filtered += 1,
            Decision::Settling => self.settling += 1,
            Decision::Unreadable => self.unreadable += 1,
            Decision::Unchanged => self.unchanged += 1,
            Decision::Duplicate { of } => self.duplicates.push(DuplicateReport {
                path: path.to_string_lossy().into_owned(),
                duplicate_of: of,
            }),
            Decision::Uploaded { persisted } => {
                self.uploaded += 1;
                if !persisted {
                    self.persistence_failures += 1;
                }
            }
            Decision::UploadFailed => self.upload_failures += 1,
        }
    }
}

/// Owns the ledger for the lifetime of the agent; passes never overlap
/// because every pass needs `&mut self`.
pub struct ScanOrchestrator {
    mappings: Vec<WorkspaceMapping>,
    policy: ScanPolicy,
    ledger: UploadLedger,
    sink: Arc<dyn UploadSink>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ScanOrchestrator {
    pub fn new(
        mappings: Vec<WorkspaceMapping>,
        policy: ScanPolicy,
        ledger: UploadLedger,
        sink: Arc<dyn UploadSink>,
    ) -> Self {
        Self {
            mappings,
            policy,
            ledger,
            sink,
            shutdown: None,
        }
    }

    /// Stops a running pass between two candidates once the flag turns true.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn ledger(&self) -> &UploadLedger {
        &self.ledger
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    pub async fn run_pass(&mut self) -> PassSummary {
        self.run_pass_at(SystemTime::now()).await
    }

    /// Runs a pass treating `now` as the current time for the settle window.
    pub async fn run_pass_at(&mut self, now: SystemTime) -> PassSummary {
        let mut summary = PassSummary::default();
        let mappings = self.mappings.clone();
        'mappings: for mapping in &mappings {
            for folder in &mapping.folders {
                let root = absolute(folder);
                if !root.is_dir() {
                    warn!(folder = %root.display(), "configured folder not found, skipping");
                    summary.missing_folders += 1;
                    continue;
                }

                let (tx, mut rx) = mpsc::channel(100);
                let excludes = self.policy.excludes.clone();
                let walker = task::spawn_blocking(move || walk(root, &excludes, tx));

                while let Some(item) = rx.recv().await {
                    if self.shutdown_requested() {
                        summary.interrupted = true;
                        break;
                    }
                    match item {
                        Ok(path) => {
                            let decision = self
                                .decide(&path, &mapping.workspace_slugs, now)
                                .await;
                            summary.tally(&path, decision);
                        }
                        Err(e) => {
                            warn!(
                                path = ?e.path(),
                                error = %e,
                                "failed to read directory entry"
                            );
                            summary.walk_errors += 1;
                        }
                    }
                }
                // Dropping the receiver stops the walker at its next send.
                drop(rx);
                if let Err(e) = walker.await {
                    warn!(error = %e, "directory walker task failed");
                    summary.walk_errors += 1;
                }
                if summary.interrupted {
                    break 'mappings;
                }
            }
        }
        if summary.uploaded > 0 || !summary.duplicates.is_empty() {
            info!(
                uploaded = summary.uploaded,
                duplicates = summary.duplicates.len(),
                unchanged = summary.unchanged,
                failures = summary.upload_failures,
                "scan pass complete"
            );
        } else {
            debug!(
                discovered = summary.discovered,
                unchanged = summary.unchanged,
                "scan pass complete, nothing to upload"
            );
        }
        summary
    }

    /// Full decision sequence for one candidate. Every gate is final: a file
    /// stopped by one step never reaches a later one.
    pub async fn decide(&mut self, path: &Path, slugs: &[String], now: SystemTime) -> Decision {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if is_transient_name(&name) {
            return Decision::Transient;
        }
        if !self.policy.accepts_extension(path) {
            return Decision::UnsupportedExtension;
        }

        let mtime = match fingerprint::modified(path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat file, retrying next pass");
                return Decision::Unreadable;
            }
        };
        if self.policy.is_settling(mtime, now) {
            debug!(path = %path.display(), "recently modified, waiting for writes to settle");
            return Decision::Settling;
        }

        let Fingerprint { mtime, hash } = match hash_file(path).await {
            Ok(fp) => fp,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot fingerprint file, retrying next pass");
                return Decision::Unreadable;
            }
        };
        // The hashed bytes belong to this mtime; a write since the first stat
        // restarts the window.
        if self.policy.is_settling(mtime, now) {
            debug!(path = %path.display(), "modified while hashing, waiting for writes to settle");
            return Decision::Settling;
        }

        let key = path.to_string_lossy().into_owned();
        if let Some(known) = self.ledger.lookup(&key) {
            if known.mtime == mtime && known.hash == hash {
                return Decision::Unchanged;
            }
        }

        if self.policy.copies.is_copy_name(&name) {
            if let Some(original) = self.ledger.find_other_by_hash(&hash, &key) {
                info!(
                    path = %path.display(),
                    duplicate_of = original,
                    "probable copy of an uploaded file, not uploading"
                );
                return Decision::Duplicate {
                    of: original.to_string(),
                };
            }
        }

        if let Err(e) = self.upload(path, slugs).await {
            warn!(
                path = %path.display(),
                workspaces = %slugs.join(","),
                error = %e,
                "upload failed, will retry next pass"
            );
            return Decision::UploadFailed;
        }
        info!(path = %path.display(), workspaces = %slugs.join(","), "uploaded");

        match self.ledger.record_upload(&key, mtime, &hash).await {
            Ok(()) => Decision::Uploaded { persisted: true },
            Err(e) => {
                error!(
                    path = %path.display(),
                    error = %e,
                    "upload succeeded but the ledger could not be persisted"
                );
                Decision::Uploaded { persisted: false }
            }
        }
    }

    async fn upload(&self, path: &Path, slugs: &[String]) -> Result<(), SinkError> {
        let timeout = self.policy.upload_timeout;
        match tokio::time::timeout(timeout, self.sink.upload(path, slugs)).await {
            Ok(res) => res,
            Err(_) => Err(SinkError::Timeout(timeout)),
        }
    }
}

async fn hash_file(path: &Path) -> anyhow::Result<Fingerprint> {
    let owned = path.to_path_buf();
    Ok(task::spawn_blocking(move || fingerprint::fingerprint(&owned)).await??)
}

fn walk(root: PathBuf, excludes: &GlobSet, tx: mpsc::Sender<Result<PathBuf, walkdir::Error>>) {
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !excludes.is_match(e.path()))
    {
        let item = match entry {
            Ok(e) if e.file_type().is_file() => Ok(e.into_path()),
            Ok(_) => continue,
            Err(e) => Err(e),
        };
        if tx.blocking_send(item).is_err() {
            // Receiver dropped, stop walking.
            break;
        }
    }
}

/// Absolute, lexically normalized form of a configured folder: `.` is
/// dropped and `..` pops a component. Symlinks are left alone.
fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_name =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_name {
                    out.pop();
                } else if !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use storage::MemoryLedgerStore;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
    }

    #[async_trait::async_trait]
    impl UploadSink for RecordingSink {
        async fn upload(&self, file: &Path, workspaces: &[String]) -> Result<(), SinkError> {
            self.calls
                .lock()
                .unwrap()
                .push((file.to_path_buf(), workspaces.to_vec()));
            Ok(())
        }
    }

    struct HangingSink;

    #[async_trait::async_trait]
    impl UploadSink for HangingSink {
        async fn upload(&self, _file: &Path, _workspaces: &[String]) -> Result<(), SinkError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn later() -> SystemTime {
        SystemTime::now() + Duration::from_secs(60)
    }

    async fn orchestrator(root: &Path, sink: Arc<dyn UploadSink>) -> ScanOrchestrator {
        let ledger = UploadLedger::open(Arc::new(MemoryLedgerStore::new()))
            .await
            .unwrap();
        ScanOrchestrator::new(
            vec![WorkspaceMapping {
                folders: vec![root.to_path_buf()],
                workspace_slugs: vec!["team".into()],
            }],
            ScanPolicy::default(),
            ledger,
            sink,
        )
    }

    #[test]
    fn folder_paths_are_normalized_lexically() {
        assert_eq!(
            normalize(Path::new("/home/u/./docs/../inbox/")),
            PathBuf::from("/home/u/inbox")
        );
        assert_eq!(normalize(Path::new("/../docs")), PathBuf::from("/docs"));
        assert_eq!(
            absolute(Path::new("/srv/./a/b/..")),
            PathBuf::from("/srv/a")
        );
        let rel = absolute(Path::new("./docs"));
        assert!(rel.is_absolute());
        assert!(rel.ends_with("docs"));
        assert!(!rel.components().any(|c| c == Component::CurDir));
    }

    #[test]
    fn settle_window_is_measured_from_given_mtime() {
        let policy = ScanPolicy::default();
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        assert!(policy.is_settling(999.0, now));
        assert!(policy.is_settling(1_001.0, now));
        assert!(!policy.is_settling(995.0, now));
        assert!(!policy.is_settling(900.0, now));
    }

    #[tokio::test]
    async fn transient_file_is_never_fingerprinted() {
        let temp = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut orch = orchestrator(temp.path(), sink.clone()).await;
        // A path that does not exist would be Unreadable if it got that far.
        let decision = orch
            .decide(&temp.path().join("~$gone.docx"), &["team".into()], later())
            .await;
        assert_eq!(decision, Decision::Transient);
    }

    #[tokio::test]
    async fn vanished_file_is_unreadable_without_record() {
        let temp = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut orch = orchestrator(temp.path(), sink.clone()).await;
        let decision = orch
            .decide(&temp.path().join("gone.pdf"), &["team".into()], later())
            .await;
        assert_eq!(decision, Decision::Unreadable);
        assert!(orch.ledger().is_empty());
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extension_check_is_case_insensitive() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("SCAN.PDF"), "x").unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut orch = orchestrator(temp.path(), sink.clone()).await;
        let summary = orch.run_pass_at(later()).await;
        assert_eq!(summary.uploaded, 1);
    }

    #[tokio::test]
    async fn hung_sink_times_out_and_leaves_ledger_untouched() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "x").unwrap();
        let mut orch = orchestrator(temp.path(), Arc::new(HangingSink)).await;
        orch.policy = orch
            .policy
            .clone()
            .with_upload_timeout(Duration::from_millis(50));

        let summary = orch.run_pass_at(later()).await;
        assert_eq!(summary.upload_failures, 1);
        assert_eq!(summary.uploaded, 0);
        assert!(orch.ledger().is_empty());
    }

    #[tokio::test]
    async fn excluded_directories_are_not_walked() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("skip")).unwrap();
        fs::write(temp.path().join("skip/a.txt"), "x").unwrap();
        fs::write(temp.path().join("b.txt"), "y").unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut orch = orchestrator(temp.path(), sink.clone()).await;
        orch.policy = orch
            .policy
            .clone()
            .with_excludes(&["**/skip".to_string()])
            .unwrap();

        let summary = orch.run_pass_at(later()).await;
        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.uploaded, 1);
    }

    #[tokio::test]
    async fn missing_folder_is_counted_not_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let mut orch = orchestrator(&temp.path().join("absent"), sink).await;
        let summary = orch.run_pass_at(later()).await;
        assert_eq!(summary.missing_folders, 1);
        assert_eq!(summary.discovered, 0);
    }

    #[tokio::test]
    async fn shutdown_flag_stops_pass_between_files() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "1").unwrap();
        fs::write(temp.path().join("b.txt"), "2").unwrap();
        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = watch::channel(true);
        let mut orch = orchestrator(temp.path(), sink.clone()).await.with_shutdown(rx);

        let summary = orch.run_pass_at(later()).await;
        assert!(summary.interrupted);
        assert_eq!(summary.discovered, 0);
        assert!(sink.calls.lock().unwrap().is_empty());
        drop(tx);
    }
}
