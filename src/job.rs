//! Job: state record for one user request, owned by the Queue while
//! waiting and by the Worker while running.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ids::{CacheId, JobId, UserId};
use crate::notifier::MessageHandle;
use crate::recipe::{AudioProfile, EncodeMode, Resolution, SubtitleStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Encode,
    Leech,
    Convert,
    Mirror,
    MultihostUpload,
}

/// Where the job's input comes from: a fresh URL, or a file already sitting
/// in the Raw Cache.
#[derive(Debug, Clone)]
pub enum JobSource {
    Url(String),
    Cache(CacheId),
}

#[derive(Debug, Clone)]
pub enum SubtitleSource {
    ExternalFile(PathBuf),
    EmbeddedAuto,
    None,
}

/// Terminal state a job finalizes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
    Suspended,
}

pub type CancelToken = Arc<AtomicBool>;

/// One user request through the pipeline from admission to terminal state.
/// Mutated only by the worker owning it.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub owner: UserId,
    pub kind: JobKind,
    pub source: JobSource,
    /// Set once the Downloader (or a cache hit) has produced a local file;
    /// re-entry after a subtitle-suspension resume skips straight past the
    /// download phase when this is already populated.
    pub downloaded_file: Option<PathBuf>,
    pub display_name: String,
    pub resolution_queue: VecDeque<Resolution>,
    pub crf: std::collections::BTreeMap<Resolution, i32>,
    pub mode: EncodeMode,
    pub audio: AudioProfile,
    pub subtitle_source: SubtitleSource,
    pub subtitle_style: SubtitleStyle,
    pub cancel: CancelToken,
    pub status_message: Option<MessageHandle>,
    pub state: JobState,
}

impl Job {
    pub fn new(owner: UserId, kind: JobKind, source: JobSource, display_name: String) -> Self {
        Self {
            id: JobId::new(),
            owner,
            kind,
            source,
            downloaded_file: None,
            display_name,
            resolution_queue: VecDeque::new(),
            crf: std::collections::BTreeMap::new(),
            mode: EncodeMode::Crf,
            audio: AudioProfile::HeAac,
            subtitle_source: SubtitleSource::EmbeddedAuto,
            subtitle_style: SubtitleStyle::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            status_message: None,
            state: JobState::Pending,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn crf_for(&self, resolution: Resolution, default_crf: i32) -> i32 {
        self.crf.get(&resolution).copied().unwrap_or(default_crf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_pending_and_uncancelled() {
        let job = Job::new(
            UserId(1),
            JobKind::Encode,
            JobSource::Url("https://example/video.mkv".into()),
            "Video".into(),
        );
        assert_eq!(job.state, JobState::Pending);
        assert!(!job.is_cancelled());
    }

    #[test]
    fn cancel_sets_the_shared_flag() {
        let job = Job::new(
            UserId(1),
            JobKind::Encode,
            JobSource::Url("https://example/video.mkv".into()),
            "Video".into(),
        );
        let cancel_handle = job.cancel.clone();
        job.cancel();
        assert!(cancel_handle.load(Ordering::SeqCst));
    }
}
