use thiserror::Error;

/// Process Runner error kinds.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("process exited with status {code:?}: {stderr_tail}")]
    NonZeroExit { code: Option<i32>, stderr_tail: String },
}

/// Downloader error kinds.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("download timed out")]
    Timeout,
    #[error("cancelled")]
    Cancelled,
    #[error("downloaded file is missing or empty: {0}")]
    EmptyOutput(String),
}

/// Encoder error kinds. `NoSubtitle` is a suspension signal, not a
/// failure — the Worker interprets it via the `is_suspension` helper below.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("no matching subtitle stream and no external subtitle supplied")]
    NoSubtitle,
    #[error("cancelled")]
    Cancelled,
    #[error("encode failed: {0}")]
    Failed(String),
}

impl EncodeError {
    pub fn is_suspension(&self) -> bool {
        matches!(self, EncodeError::NoSubtitle)
    }
}

/// Per-host upload error. Never escapes the fanout to fail a job.
#[derive(Debug, Error, Clone)]
pub enum UploadError {
    #[error("host {0} is disabled")]
    HostDisabled(String),
    #[error("upload to {0} failed: {1}")]
    Failed(String, String),
    #[error("skipped: dependency {0} failed")]
    SkippedDueToFailedDependency(String),
}

/// Top-level error surfaced to the Worker / user.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("download failed: {0}")]
    DownloadFailed(#[from] DownloadError),
    #[error("encode failed: {0}")]
    EncodeFailed(#[source] EncodeError),
    /// Surfaces only from pipelines that bypass the fanout's per-host error
    /// absorption (`convert`, ) — inside a real fanout, upload errors
    /// never reach this type.
    #[error("upload failed: {0}")]
    UploadFailed(#[from] UploadError),
    #[error("cancelled")]
    Cancelled,
}

impl JobError {
    /// First 200 characters of the cause.
    pub fn user_message(&self) -> String {
        let full = self.to_string();
        full.chars().take(200).collect()
    }
}
