use cli::report;
use storage::{FileRecord, JsonSnapshotStore, LedgerStore};
use syncagent_core::agent;
use syncagent_core::config::{
    AppConfig, LedgerBackend, LedgerConfig, ScanConfig, SinkConfig, WorkspaceMapping,
};

fn config_for(ledger_path: &std::path::Path, backend: LedgerBackend) -> AppConfig {
    AppConfig {
        api_key: "k".into(),
        workspace_mapping: vec![WorkspaceMapping {
            folders: vec!["docs".into()],
            workspace_slugs: vec!["team".into()],
        }],
        sink: SinkConfig::default(),
        scan: ScanConfig::default(),
        ledger: LedgerConfig {
            backend,
            path: ledger_path.to_string_lossy().into_owned(),
        },
        dry_run: true,
    }
}

#[tokio::test]
async fn lists_records_from_json_ledger_in_order() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("uploaded_files.json");
    let snapshot = vec![
        (
            "/docs/b.pdf".to_string(),
            FileRecord {
                mtime: 0.0,
                hash: "bbbb".into(),
            },
        ),
        (
            "/docs/a.txt".to_string(),
            FileRecord {
                mtime: 1.5,
                hash: "aaaa".into(),
            },
        ),
    ];
    JsonSnapshotStore::new(&path)
        .persist("/docs/a.txt", &snapshot[1].1, &snapshot)
        .await
        .unwrap();

    let ledger = agent::open_ledger(&config_for(&path, LedgerBackend::Json))
        .await
        .unwrap();
    let rows = report::ledger_rows(&ledger);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].path, "/docs/b.pdf");
    assert_eq!(rows[0].modified, "1970-01-01T00:00:00+00:00");
    assert_eq!(rows[1].hash, "aaaa");
}

#[tokio::test]
async fn empty_sqlite_ledger_lists_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ledger.db");
    let ledger = agent::open_ledger(&config_for(&path, LedgerBackend::Sqlite))
        .await
        .unwrap();
    assert!(report::ledger_rows(&ledger).is_empty());
}

#[tokio::test]
async fn corrupt_json_ledger_fails_startup() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("uploaded_files.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(agent::open_ledger(&config_for(&path, LedgerBackend::Json))
        .await
        .is_err());
}
