use crate::{SinkError, UploadSink};
use std::path::Path;
use tracing::info;

/// Accepts every upload without sending anything. Used for dry runs.
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait::async_trait]
impl UploadSink for NoopSink {
    async fn upload(&self, file: &Path, workspaces: &[String]) -> Result<(), SinkError> {
        info!(
            path = %file.display(),
            workspaces = %workspaces.join(","),
            "dry run: upload skipped"
        );
        Ok(())
    }
}
