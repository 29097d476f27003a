//! Upload sinks: the remote document store files are pushed into.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub mod document_api;
pub mod noop;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to read {path:?} for upload: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("upload rejected with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upload rejected: {0}")]
    Rejected(String),
    #[error("upload timed out after {0:?}")]
    Timeout(Duration),
}

/// Accepts one file for a whole set of destination workspaces.
///
/// A call either succeeds for every slug in `workspaces` or fails as a whole;
/// implementations never split the set into several requests.
#[async_trait::async_trait]
pub trait UploadSink: Send + Sync {
    async fn upload(&self, file: &Path, workspaces: &[String]) -> Result<(), SinkError>;
}
