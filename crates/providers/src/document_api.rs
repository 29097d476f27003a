use crate::{SinkError, UploadSink};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const UPLOAD_PATH: &str = "/api/v1/document/upload";

#[derive(Clone)]
pub struct DocumentApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Multipart upload to the document API, bearer-token authenticated.
#[derive(Clone)]
pub struct DocumentApiSink {
    client: Client,
    cfg: Arc<DocumentApiConfig>,
}

impl DocumentApiSink {
    pub fn new(cfg: DocumentApiConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| SinkError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            cfg: Arc::new(cfg),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.cfg.base_url.trim_end_matches('/'), UPLOAD_PATH)
    }
}

#[derive(Deserialize)]
struct UploadApiResponse {
    success: Option<bool>,
    error: Option<String>,
}

#[async_trait::async_trait]
impl UploadSink for DocumentApiSink {
    async fn upload(&self, file: &Path, workspaces: &[String]) -> Result<(), SinkError> {
        let content = tokio::fs::read(file).await.map_err(|e| SinkError::Read {
            path: file.to_path_buf(),
            source: e,
        })?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let form = Form::new()
            .part("file", Part::bytes(content).file_name(file_name))
            .text("addToWorkspaces", workspaces.join(","));

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.cfg.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::Timeout(self.cfg.timeout)
                } else {
                    SinkError::RequestFailed(e.to_string())
                }
            })?;

        let status = resp.status();
        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(e) => {
                debug!(
                    path = %file.display(),
                    status = status.as_u16(),
                    error = %e,
                    "cannot read response body"
                );
                Bytes::new()
            }
        };
        if !status.is_success() {
            return Err(SinkError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        // Some deployments answer 200 with `success: false` in the body.
        if let Ok(parsed) = serde_json::from_slice::<UploadApiResponse>(&body) {
            if parsed.success == Some(false) {
                return Err(SinkError::Rejected(
                    parsed.error.unwrap_or_else(|| "unknown error".to_string()),
                ));
            }
        }
        debug!(path = %file.display(), status = status.as_u16(), "upload accepted");
        Ok(())
    }
}
