//! Leech and Convert pipelines: thin wrappers reusing the
//! Downloader and Process Runner, bypassing the Encoder and Upload
//! Fanout entirely.

use std::path::Path;
use std::sync::Arc;

use crate::downloader::Downloader;
use crate::encoder::Encoder;
use crate::error::JobError;
use crate::ids::UserId;
use crate::process::CancelToken;
use crate::upload::UploadHost;

/// Probed media facts needed to hand a file to the chat transport as a
/// video.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

/// `leech`: download -> hand off to the `Notifier`'s "send as video"
/// operation, no encoding. The actual "send as video" call is the
/// transport's job; this returns the probed facts the caller needs to
/// make that call.
pub fn leech(
    downloader: &Downloader,
    encoder: &Encoder,
    user: UserId,
    url: &str,
    dest: &Path,
    timeout: std::time::Duration,
    cancel: &CancelToken,
) -> Result<MediaProbe, JobError> {
    downloader
    .download(user, url, dest, timeout, cancel, |_progress| {})
    .map_err(JobError::from)?;

    let duration_seconds = encoder.probe_duration_seconds(dest).unwrap_or(0.0);
    let dimensions = encoder.probe_dimensions(dest).unwrap_or(crate::encoder::VideoDimensions {
            width: 0,
            height: 0,
        });
    Ok(MediaProbe {
            width: dimensions.width,
            height: dimensions.height,
            duration_seconds,
        })
}

/// `convert`: download -> upload to Seedbox only, bypassing the full
/// nine-host fanout DAG.
pub async fn convert(
    downloader: &Downloader,
    seedbox: Arc<dyn UploadHost>,
    user: UserId,
    url: &str,
    dest: &Path,
    timeout: std::time::Duration,
    cancel: &CancelToken,
) -> Result<String, JobError> {
    downloader
    .download(user, url, dest, timeout, cancel, |_progress| {})
    .map_err(JobError::from)?;

    seedbox.upload(dest).await.map_err(JobError::from)
}
