use chrono::{DateTime, Utc};
use serde::Serialize;
use syncagent_core::ledger::UploadLedger;
use syncagent_core::orchestrator::PassSummary;

#[derive(Debug, Serialize)]
pub struct LedgerRow {
    pub path: String,
    pub mtime: f64,
    pub modified: String,
    pub hash: String,
}

pub fn ledger_rows(ledger: &UploadLedger) -> Vec<LedgerRow> {
    ledger
        .iter()
        .map(|(path, record)| LedgerRow {
            path: path.to_string(),
            mtime: record.mtime,
            modified: format_mtime(record.mtime),
            hash: record.hash.clone(),
        })
        .collect()
}

/// RFC 3339 rendering of a ledger timestamp; falls back to the raw number
/// when it is out of chrono's range.
pub fn format_mtime(mtime: f64) -> String {
    let secs = mtime.trunc() as i64;
    let nanos = ((mtime - mtime.trunc()) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| mtime.to_string())
}

pub fn summary_line(summary: &PassSummary) -> String {
    let mut line = format!(
        "scan: discovered {}, uploaded {}, unchanged {}, duplicates {}, settling {}, filtered {}",
        summary.discovered,
        summary.uploaded,
        summary.unchanged,
        summary.duplicates.len(),
        summary.settling,
        summary.filtered,
    );
    let problems = summary.unreadable
        + summary.upload_failures
        + summary.persistence_failures
        + summary.walk_errors
        + summary.missing_folders;
    if problems > 0 {
        line.push_str(&format!(
            "; unreadable {}, upload failures {}, ledger write failures {}, walk errors {}, missing folders {}",
            summary.unreadable,
            summary.upload_failures,
            summary.persistence_failures,
            summary.walk_errors,
            summary.missing_folders,
        ));
    }
    if summary.interrupted {
        line.push_str(" (interrupted)");
    }
    line
}
