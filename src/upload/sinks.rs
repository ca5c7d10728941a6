//! Concrete reqwest-backed `UploadHost`/`RemoteIngestHost` implementations,
//! each built from a `Client::builder()` with per-host request timeouts.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::UploadError;

use super::host::{RemoteIngestHost, UploadHost};

fn build_client(host_label: &'static str) -> Result<reqwest::Client, UploadError> {
    reqwest::Client::builder()
    .timeout(Duration::from_secs(300))
    .build()
    .map_err(|err| UploadError::Failed(host_label.to_string(), err.to_string()))
}

#[derive(Deserialize)]
struct UrlResponse {
    url: String,
}

/// A generic local-file upload sink backed by a multipart POST that returns
/// `{"url": "..."}` (Seedbox/Drive/Mirror/OneClick/GeneralFile all speak
/// this shape in practice; hosts with a different wire contract get their
/// own type).
pub struct GenericFormUploadHost {
    label: &'static str,
    endpoint: String,
    field_name: &'static str,
}

impl GenericFormUploadHost {
    pub fn new(label: &'static str, endpoint: impl Into<String>, field_name: &'static str) -> Self {
        Self {
            label,
            endpoint: endpoint.into(),
            field_name,
        }
    }
}

#[async_trait]
impl UploadHost for GenericFormUploadHost {
    async fn upload(&self, local_path: &Path) -> Result<String, UploadError> {
        let client = build_client(self.label)?;
        let bytes = tokio::fs::read(local_path)
        .await
        .map_err(|err| UploadError::Failed(self.label.to_string(), err.to_string()))?;
        let filename = local_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output.mp4")
        .to_string();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new().part(self.field_name, part);

        let response = client
        .post(&self.endpoint)
        .multipart(form)
        .send()
        .await
        .map_err(|err| UploadError::Failed(self.label.to_string(), err.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Failed(
                    self.label.to_string(),
                    format!("HTTP {}", response.status()),
                ));
        }

        let body: UrlResponse = response
        .json()
        .await
        .map_err(|err| UploadError::Failed(self.label.to_string(), err.to_string()))?;
        Ok(body.url)
    }
}

/// A generic remote-ingest sink (mirror-from-URL) that also speaks
/// `{"url": "..."}`.
pub struct GenericFormRemoteHost {
    label: &'static str,
    endpoint: String,
}

impl GenericFormRemoteHost {
    pub fn new(label: &'static str, endpoint: impl Into<String>) -> Self {
        Self {
            label,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RemoteIngestHost for GenericFormRemoteHost {
    async fn remote(&self, source_url: &str, filename: &str) -> Result<String, UploadError> {
        let client = build_client(self.label)?;
        let response = client
        .post(&self.endpoint)
        .json(&serde_json::json!({ "url": source_url, "filename": filename }))
        .send()
        .await
        .map_err(|err| UploadError::Failed(self.label.to_string(), err.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Failed(
                    self.label.to_string(),
                    format!("HTTP {}", response.status()),
                ));
        }

        let body: UrlResponse = response
        .json()
        .await
        .map_err(|err| UploadError::Failed(self.label.to_string(), err.to_string()))?;
        Ok(body.url)
    }
}

/// FilePress: mirrors a Drive URL. The source API has historically returned
/// several different JSON shapes for success; this implementation pins the
/// one documented shape and treats anything else as a
/// hard failure rather than guessing.
pub struct FilePressHost {
    endpoint: String,
}

impl FilePressHost {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RemoteIngestHost for FilePressHost {
    async fn remote(&self, source_url: &str, filename: &str) -> Result<String, UploadError> {
        let client = build_client("FilePress")?;
        let response = client
        .post(&self.endpoint)
        .json(&serde_json::json!({ "url": source_url, "filename": filename }))
        .send()
        .await
        .map_err(|err| UploadError::Failed("FilePress".to_string(), err.to_string()))?;

        if !response.status().is_success() {
            return Err(UploadError::Failed(
                    "FilePress".to_string(),
                    format!("HTTP {}", response.status()),
                ));
        }

        let raw: serde_json::Value = response
        .json()
        .await
        .map_err(|err| UploadError::Failed("FilePress".to_string(), err.to_string()))?;

        match raw.get("url").and_then(|v| v.as_str()) {
            Some(url) => Ok(url.to_string()),
            None => Err(UploadError::Failed(
                    "FilePress".to_string(),
                    format!("unrecognized response shape: {raw}"),
                )),
        }
    }
}
