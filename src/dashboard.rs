//! Dashboard Snapshot: per-active-job mutable state rendered
//! by the Progress Reporter. Each writer owns disjoint keys — the active
//! phase owns its own fields, each upload host owns its own map entry — so
//! no single mutex serializes every writer against every other.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::recipe::Resolution;
use crate::sync_ext::MutexExt;
use crate::upload::HostKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Download,
    Encode,
    Upload,
    Finalizing,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadProgress {
    pub percent: Option<f64>,
    pub total_bytes: Option<u64>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EncodeProgress {
    pub status: String,
    pub percent: Option<f64>,
    pub eta: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Default)]
pub struct HostSlot {
    pub status: Option<HostStatus>,
    pub url: Option<String>,
}

#[derive(Debug, Default)]
struct DashboardInner {
    phase: Option<Phase>,
    download: DownloadProgress,
    encode: BTreeMap<Resolution, EncodeProgress>,
    upload: BTreeMap<(Resolution, HostKind), HostSlot>,
}

/// Shared, concurrently-written snapshot for one active job. Wrapped in a
/// single mutex (`sync_ext::MutexExt`) for implementation simplicity;
/// callers still only ever touch their own keys, so contention is limited
/// to the brief critical sections below.
#[derive(Default)]
pub struct DashboardSnapshot {
    inner: Mutex<DashboardInner>,
}

impl DashboardSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_phase(&self, phase: Phase) {
        self.inner.lock_unpoisoned().phase = Some(phase);
    }

    pub fn phase(&self) -> Option<Phase> {
        self.inner.lock_unpoisoned().phase
    }

    pub fn update_download(&self, progress: DownloadProgress) {
        self.inner.lock_unpoisoned().download = progress;
    }

    pub fn update_encode(&self, resolution: Resolution, progress: EncodeProgress) {
        self.inner
        .lock_unpoisoned()
        .encode
        .insert(resolution, progress);
    }

    pub fn update_host(&self, resolution: Resolution, host: HostKind, slot: HostSlot) {
        self.inner
        .lock_unpoisoned()
        .upload
        .insert((resolution, host), slot);
    }

    /// Pure render of the current snapshot into a single chat message body.
    pub fn render(&self, display_name: &str) -> String {
        let inner = self.inner.lock_unpoisoned();
        let mut out = format!("{display_name}\n");
        match inner.phase {
            Some(Phase::Download) => {
                let d = &inner.download;
                out.push_str(&format!(
                        "Downloading: {:.1}%{}{}{}\n",
                        d.percent.unwrap_or(0.0),
                        d.total_bytes.map(|b| format!(" of {b}B")).unwrap_or_default(),
                        d.speed.as_ref().map(|s| format!(" at {s}")).unwrap_or_default(),
                        d.eta.as_ref().map(|e| format!(" ETA {e}")).unwrap_or_default(),
                    ));
            }
            Some(Phase::Encode) => {
                for (resolution, progress) in &inner.encode {
                    out.push_str(&format!(
                            "{}: {} {:.1}%\n",
                            resolution.tag(),
                            progress.status,
                            progress.percent.unwrap_or(0.0)
                        ));
                }
            }
            Some(Phase::Upload) => {
                for ((resolution, host), slot) in &inner.upload {
                    out.push_str(&format!(
                            "{} {:?}: {:?}\n",
                            resolution.tag(),
                            host,
                            slot.status.unwrap_or(HostStatus::Pending)
                        ));
                }
            }
            Some(Phase::Finalizing) => out.push_str("Finalizing...\n"),
            None => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_reflects_current_phase_without_mutating_state() {
        let snapshot = DashboardSnapshot::new();
        snapshot.set_phase(Phase::Download);
        snapshot.update_download(DownloadProgress {
                percent: Some(55.6),
                total_bytes: Some(100),
                speed: Some("1MB/s".into()),
                eta: Some("01:00".into()),
            });
        let first = snapshot.render("video.mkv");
        let second = snapshot.render("video.mkv");
        assert_eq!(first, second);
        assert!(first.contains("55.6%"));
    }
}
