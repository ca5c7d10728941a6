//! Job-execution engine: the orchestrator that wires the
//! Downloader, Encoder, Upload Fanout, Raw Cache, Suspension Registry,
//! History, and Notifier into a single pipeline the Worker drives.
//!
//! `run_job` is meant to be handed to `queue::run_once` as its `pipeline`
//! closure (`queue.rs` keeps dispatch free of these concerns; this module
//! supplies the concrete dataflow).

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{CacheOrigin, RawCache};
use crate::config::EngineConfig;
use crate::dashboard::{DashboardSnapshot, DownloadProgress, EncodeProgress as DashEncodeProgress, Phase};
use crate::downloader::Fetcher;
use crate::encoder::{EncodeRequest, Transcoder};
use crate::error::{EncodeError, JobError};
use crate::history::{HistoryStore, ResultMetadata};
use crate::ids::CacheId;
use crate::ids::UserId;
use crate::job::{Job, JobKind, JobSource, JobState};
use crate::naming::output_filename;
use crate::notifier::{MessageHandle, Notifier};
use crate::queue::Queue;
use crate::recipe::Resolution;
use crate::reporter;
use crate::suspension::{PendingSubtitleEntry, SuspensionRegistry};
use crate::upload::HostSet;

/// Everything a running job needs, independent of any particular chat
/// transport.
pub struct EngineEnv {
    pub config: EngineConfig,
    pub fetcher: Arc<dyn Fetcher>,
    pub transcoder: Arc<dyn Transcoder>,
    pub cache: Arc<RawCache>,
    pub suspension: Arc<SuspensionRegistry>,
    pub history: Arc<HistoryStore>,
    pub notifier: Arc<dyn Notifier>,
    pub hosts: Arc<HostSet>,
    /// Handle onto the fanout runtime; `Handle::spawn` works from any
    /// thread, which is what lets a detached fanout be launched from the
    /// Worker's plain OS thread without blocking it.
    pub runtime: tokio::runtime::Handle,
}

/// Dispatches on job kind. This is the function a host process
/// feeds to `queue::run_once` as its pipeline closure.
pub fn run_job(job: &mut Job, env: &EngineEnv) {
    match job.kind {
        JobKind::Encode => run_encode_job(job, env),
        JobKind::Leech => run_leech_job(job, env),
        JobKind::Convert => run_convert_job(job, env),
        JobKind::Mirror => run_mirror_job(job, env),
        JobKind::MultihostUpload => run_multihost_job(job, env),
    }
}

enum InputOutcome {
    Cancelled,
    Failed(JobError),
}

/// Produces a local file for the job's input, skipping the download phase
/// entirely when `downloaded_file` is already populated. Always returns the backing cache id
/// so callers downstream (notably suspension) can park it without a second
/// `Raw Cache` write.
fn resolve_input(
    job: &mut Job,
    env: &EngineEnv,
    dashboard: &DashboardSnapshot,
) -> Result<(PathBuf, CacheId), InputOutcome> {
    if let Some(path) = job.downloaded_file.clone() {
        let cache_id = match &job.source {
            JobSource::Cache(id) => *id,
            JobSource::Url(_) => env
            .cache
            .add(path.clone(), &job.display_name, CacheOrigin::Downloaded)
            .map_err(|err| InputOutcome::Failed(JobError::InvalidInput(err.to_string())))?,
        };
        return Ok((path, cache_id));
    }

    match job.source.clone() {
        JobSource::Cache(id) => {
            let entry = env
            .cache
            .get(id)
            .ok_or_else(|| InputOutcome::Failed(JobError::InvalidInput(format!("cache id {id} not found"))))?;
            job.downloaded_file = Some(entry.path.clone());
            Ok((entry.path, id))
        }
        JobSource::Url(url) => {
            dashboard.set_phase(Phase::Download);
            let dest = env.config.layout.raw_cache_dir.join(format!("{}.download", job.id));
            let mut on_progress = |line: crate::downloader::DownloadProgressLine| {
                dashboard.update_download(DownloadProgress {
                        percent: line.percent,
                        total_bytes: line.total_bytes,
                        speed: line.speed,
                        eta: line.eta,
                    });
            };
            let result = env.fetcher.download(
                job.owner,
                &url,
                &dest,
                env.config.download_timeout,
                &job.cancel,
                &mut on_progress,
            );
            match result {
                Ok(()) => {
                    let cache_id = env
                    .cache
                    .add(dest.clone(), &job.display_name, CacheOrigin::Downloaded)
                    .map_err(|err| InputOutcome::Failed(JobError::InvalidInput(err.to_string())))?;
                    job.downloaded_file = Some(dest.clone());
                    Ok((dest, cache_id))
                }
                Err(err) => {
                    if job.is_cancelled() {
                        Err(InputOutcome::Cancelled)
                    } else {
                        Err(InputOutcome::Failed(JobError::from(err)))
                    }
                }
            }
        }
    }
}

/// Bundles the Dashboard Snapshot, status message, and Progress Reporter
/// thread shared by every pipeline kind. Opened once at the top of a
/// job run and `finish()`ed once the pipeline's own work is done, before
/// the caller decides how to finalize the job.
struct ReporterSession {
    dashboard: Arc<DashboardSnapshot>,
    status_message: MessageHandle,
    stop: Arc<std::sync::atomic::AtomicBool>,
    join: std::thread::JoinHandle<()>,
}

impl ReporterSession {
    /// Returns `None` if even posting the first status message fails; the
    /// caller finalizes the job as Failed in that case.
    fn start(job: &mut Job, env: &EngineEnv) -> Option<Self> {
        let dashboard = Arc::new(DashboardSnapshot::new());
        let status_message = env.notifier.send(job.owner, &dashboard.render(&job.display_name)).ok()?;
        job.status_message = Some(status_message.clone());
        let (stop, join) = reporter::spawn(
            env.notifier.clone(),
            dashboard.clone(),
            status_message.clone(),
            job.display_name.clone(),
        );
        Some(Self { dashboard, status_message, stop, join })
    }

    fn finish(self) -> MessageHandle {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.join.join();
        self.status_message
    }
}

enum EncodeOutcome {
    Done,
    Cancelled,
    Suspended { input_path: PathBuf, cache_id: CacheId },
    Failed(JobError),
}

fn run_encode_job(job: &mut Job, env: &EngineEnv) {
    let Some(session) = ReporterSession::start(job, env) else {
        job.state = JobState::Failed;
        return;
    };
    let dashboard = session.dashboard.clone();

    let outcome = run_encode_dataflow(job, env, &dashboard);

    let status_message = session.finish();

    match outcome {
        EncodeOutcome::Done => {
            dashboard.set_phase(Phase::Finalizing);
            let _ = env.notifier.delete(&status_message);
            job.state = JobState::Done;
        }
        EncodeOutcome::Cancelled => {
            job.state = JobState::Cancelled;
        }
        EncodeOutcome::Suspended { input_path, cache_id } => {
            let _ = env.notifier.delete(&status_message);
            let prompt = env
            .notifier
            .send(
                job.owner,
                "No matching subtitle stream found. Reply with a subtitle file to continue, or /cancel to drop this job.",
            )
            .ok();
            env.suspension.suspend(PendingSubtitleEntry {
                    job: job.clone(),
                    downloaded_file: input_path,
                    status_message: prompt,
                    cache_id,
                });
            job.state = JobState::Suspended;
        }
        EncodeOutcome::Failed(err) => {
            let _ = env.notifier.send(job.owner, &format!("Failed: {}", err.user_message()));
            job.state = JobState::Failed;
        }
    }
}

/// The per-resolution encode loop plus detached fanout spawn. Returns without
/// encoding the remaining resolutions the moment cancellation, suspension,
/// or a genuine encode failure is observed; resolutions already fanned out
/// keep running on the Tokio runtime regardless of how this returns.
fn run_encode_dataflow(job: &mut Job, env: &EngineEnv, dashboard: &Arc<DashboardSnapshot>) -> EncodeOutcome {
    if job.is_cancelled() {
        return EncodeOutcome::Cancelled;
    }

    let (input_path, cache_id) = match resolve_input(job, env, dashboard) {
        Ok(pair) => pair,
        Err(InputOutcome::Cancelled) => return EncodeOutcome::Cancelled,
        Err(InputOutcome::Failed(err)) => return EncodeOutcome::Failed(err),
    };
    let input_size = std::fs::metadata(&input_path).map(|m| m.len()).unwrap_or(0);

    dashboard.set_phase(Phase::Encode);
    let resolutions: Vec<Resolution> = job.resolution_queue.iter().copied().collect();

    for resolution in resolutions {
        if job.is_cancelled() {
            return EncodeOutcome::Cancelled;
        }

        let crf = job.crf_for(resolution, 23);
        let output_path = env
        .config
        .layout
        .output_dir
        .join(output_filename(&job.display_name, resolution));
        let pass_log_prefix = env
        .config
        .layout
        .output_dir
        .join(format!("{}-{}", job.id, resolution.tag()));
        let pass_log_prefix = pass_log_prefix.display().to_string();
        let watermark = env
        .config
        .watermark_enabled
        .then(|| (env.config.watermark_text.as_str(), env.config.watermark_duration_seconds));

        let request = EncodeRequest {
            input: &input_path,
            output: &output_path,
            resolution,
            crf,
            mode: job.mode,
            audio: job.audio,
            subtitle_source: &job.subtitle_source,
            subtitle_style: &job.subtitle_style,
            watermark,
            pass_log_prefix: &pass_log_prefix,
        };

        let started = Instant::now();
        let dashboard_for_progress = dashboard.clone();
        let result = env.transcoder.encode(job.owner, &request, &job.cancel, &mut |progress: crate::encoder::EncodeProgress| {
                dashboard_for_progress.update_encode(
                    resolution,
                    DashEncodeProgress {
                        status: progress.status,
                        percent: Some(progress.percent),
                        eta: None,
                    },
                );
            });

        match result {
            Ok(output) => {
                let encode_time_seconds = started.elapsed().as_secs_f64();
                let output_size_bytes = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
                let metadata = ResultMetadata {
                    duration_seconds: env.transcoder.probe_duration_seconds(&input_path),
                    input_size_bytes: input_size,
                    output_size_bytes,
                    encode_time_seconds,
                };
                spawn_fanout(env, dashboard, output, resolution, job.display_name.clone(), metadata);
            }
            Err(EncodeError::NoSubtitle) => {
                return EncodeOutcome::Suspended { input_path, cache_id };
            }
            Err(EncodeError::Cancelled) => return EncodeOutcome::Cancelled,
            Err(other) => return EncodeOutcome::Failed(JobError::EncodeFailed(other)),
        }
    }

    EncodeOutcome::Done
}

/// Launches one resolution's upload fanout onto the engine's Tokio runtime
/// and returns immediately without awaiting it.
fn spawn_fanout(
    env: &EngineEnv,
    dashboard: &Arc<DashboardSnapshot>,
    output_path: PathBuf,
    resolution: Resolution,
    display_name: String,
    metadata: ResultMetadata,
) {
    let hosts = env.hosts.clone();
    let toggles = env.config.hosts.clone();
    let history = env.history.clone();
    let dashboard = dashboard.clone();
    env.runtime.spawn(async move {
            crate::upload::run_fanout(hosts, toggles, output_path, resolution, display_name, dashboard, history, metadata).await;
        });
}

/// `leech`: download, probe facts, hand a text summary back to the
/// user. The actual "send as video" call belongs to the chat transport
/// and is out of scope here.
fn run_leech_job(job: &mut Job, env: &EngineEnv) {
    let Some(session) = ReporterSession::start(job, env) else {
        job.state = JobState::Failed;
        return;
    };
    let dashboard = session.dashboard.clone();

    let result = resolve_input(job, env, &dashboard);

    let status_message = session.finish();

    match result {
        Ok((path, _cache_id)) => {
            let (width, height) = env.transcoder.probe_dimensions(&path);
            let duration_seconds = env.transcoder.probe_duration_seconds(&path);
            let _ = env.notifier.delete(&status_message);
            let _ = env.notifier.send(
                job.owner,
                &format!(
                    "{}: {}x{}, {:.1}s ({})",
                    job.display_name,
                    width,
                    height,
                    duration_seconds,
                    path.display()
                ),
            );
            job.state = JobState::Done;
        }
        Err(InputOutcome::Cancelled) => job.state = JobState::Cancelled,
        Err(InputOutcome::Failed(err)) => {
            let _ = env.notifier.send(job.owner, &format!("Failed: {}", err.user_message()));
            job.state = JobState::Failed;
        }
    }
}

/// `convert`: download, then upload to Seedbox alone, bypassing the
/// full nine-host DAG.
fn run_convert_job(job: &mut Job, env: &EngineEnv) {
    run_single_host_job(job, env, crate::upload::HostKind::Seedbox)
}

/// `fp`: FilePress mirror. Reuses the dependency-aware fanout
/// restricted to Drive (direct) and FilePress (Drive-dependent) by
/// disabling every other host for this job; the resolution tag is a fixed
/// `1080p` sentinel since these pipelines carry no resolution ladder of
/// their own (recorded as an Open Question resolution in DESIGN.md).
fn run_mirror_job(job: &mut Job, env: &EngineEnv) {
    let mut toggles = crate::config::HostToggles {
        seedbox: false,
        drive: true,
        mirror: false,
        one_click: false,
        general_file: false,
        filepress: true,
        abyss: false,
        turbovid: false,
        vidhide: false,
    };
    toggles.drive &= env.config.hosts.drive;
    toggles.filepress &= env.config.hosts.filepress;
    run_fanout_only_job(job, env, toggles)
}

/// `up`: download then fan out to a fixed subset of direct-upload
/// hosts (the hosts with no inter-host dependency), skipping the
/// Drive/Seedbox-gated embed and mirror hosts entirely.
fn run_multihost_job(job: &mut Job, env: &EngineEnv) {
    let mut toggles = crate::config::HostToggles {
        seedbox: true,
        drive: true,
        mirror: true,
        one_click: true,
        general_file: true,
        filepress: false,
        abyss: false,
        turbovid: false,
        vidhide: false,
    };
    toggles.seedbox &= env.config.hosts.seedbox;
    toggles.drive &= env.config.hosts.drive;
    toggles.mirror &= env.config.hosts.mirror;
    toggles.one_click &= env.config.hosts.one_click;
    toggles.general_file &= env.config.hosts.general_file;
    run_fanout_only_job(job, env, toggles)
}

fn run_single_host_job(job: &mut Job, env: &EngineEnv, kind: crate::upload::HostKind) {
    let Some(session) = ReporterSession::start(job, env) else {
        job.state = JobState::Failed;
        return;
    };
    let dashboard = session.dashboard.clone();

    let result = resolve_input(job, env, &dashboard);

    let status_message = session.finish();

    let path = match result {
        Ok((path, _cache_id)) => path,
        Err(InputOutcome::Cancelled) => {
            job.state = JobState::Cancelled;
            return;
        }
        Err(InputOutcome::Failed(err)) => {
            let _ = env.notifier.send(job.owner, &format!("Failed: {}", err.user_message()));
            job.state = JobState::Failed;
            return;
        }
    };

    let Some(host) = env.hosts.local(kind) else {
        let _ = env.notifier.delete(&status_message);
        let _ = env.notifier.send(job.owner, &format!("{kind:?} is disabled"));
        job.state = JobState::Done;
        return;
    };

    let outcome = env.runtime.block_on(host.upload(&path));
    let _ = env.notifier.delete(&status_message);
    match outcome {
        Ok(url) => {
            let _ = env.notifier.send(job.owner, &format!("{:?}: {}", kind, url));
        }
        Err(err) => {
            // Non-goals: upload failures are surfaced but do not fail the job.
            let _ = env.notifier.send(job.owner, &format!("{kind:?} upload failed: {err}"));
        }
    }
    job.state = JobState::Done;
}

fn run_fanout_only_job(job: &mut Job, env: &EngineEnv, toggles: crate::config::HostToggles) {
    let Some(session) = ReporterSession::start(job, env) else {
        job.state = JobState::Failed;
        return;
    };
    let dashboard = session.dashboard.clone();

    let result = resolve_input(job, env, &dashboard);

    let status_message = session.finish();

    let path = match result {
        Ok((path, _cache_id)) => path,
        Err(InputOutcome::Cancelled) => {
            job.state = JobState::Cancelled;
            return;
        }
        Err(InputOutcome::Failed(err)) => {
            let _ = env.notifier.send(job.owner, &format!("Failed: {}", err.user_message()));
            job.state = JobState::Failed;
            return;
        }
    };

    let _ = env.notifier.delete(&status_message);

    let hosts = env.hosts.clone();
    let history = env.history.clone();
    let display_name = job.display_name.clone();
    let metadata = ResultMetadata {
        duration_seconds: env.transcoder.probe_duration_seconds(&path),
        input_size_bytes: std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
        output_size_bytes: std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
        encode_time_seconds: 0.0,
    };
    env.runtime.block_on(crate::upload::run_fanout(
            hosts,
            toggles,
            path,
            Resolution::P1080,
            display_name,
            dashboard.clone(),
            history,
            metadata,
        ));
    job.state = JobState::Done;
}

/// Handles an inbound subtitle upload: pops the oldest pending entry
/// for `user`, attaches the subtitle and the already-downloaded file to the
/// job, and prepends it at the head of the queue. Returns
/// `false` if the user has nothing pending.
pub fn resume_with_subtitle(env: &EngineEnv, queue: &Queue, user: UserId, subtitle_path: PathBuf) -> bool {
    let Some(entry) = env.suspension.pop_oldest(user) else {
        return false;
    };
    let mut job = entry.job;
    job.subtitle_source = crate::job::SubtitleSource::ExternalFile(subtitle_path);
    job.downloaded_file = Some(entry.downloaded_file);
    job.source = JobSource::Cache(entry.cache_id);
    job.state = JobState::Pending;
    queue.resubmit_at_head(job);
    true
}
