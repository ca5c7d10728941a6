//! Encoder: CRF / two-pass / hybrid modes, subtitle resolution,
//! filter chain construction, progress from time-position tokens divided by
//! a once-per-input duration probe.

mod filters;
mod progress;
pub mod subtitle;

pub use progress::parse_time_position_seconds;
pub use subtitle::{resolve as resolve_subtitle, ResolvedSubtitle, SubtitleStreamInfo};

use std::path::{Path, PathBuf};

use crate::error::EncodeError;
use crate::ids::UserId;
use crate::job::SubtitleSource;
use crate::process::{CancelToken, ProcessRunner};
use crate::recipe::{effective_mode, AudioProfile, EncodeMode, Resolution, SubtitleStyle};

#[derive(Debug, Clone)]
pub struct EncodeProgress {
    pub status: String,
    pub percent: f64,
}

pub struct EncodeRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub resolution: Resolution,
    pub crf: i32,
    pub mode: EncodeMode,
    pub audio: AudioProfile,
    pub subtitle_source: &'a SubtitleSource,
    pub subtitle_style: &'a SubtitleStyle,
    pub watermark: Option<(&'a str, f64)>,
    /// Unique prefix for this job's two-pass log files, e.g.
    /// `<job-id>-<resolution>`; cleanup globs on this prefix.
    pub pass_log_prefix: &'a str,
}

/// Probed frame dimensions, needed by `leech` to hand the file to the chat transport as a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait seam over `Encoder::encode`, so job-execution logic can be tested
/// against a fake transcoder without spawning a real ffmpeg process.
pub trait Transcoder: Send + Sync {
    fn encode(
        &self,
        user: UserId,
        request: &EncodeRequest,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(EncodeProgress),
    ) -> Result<PathBuf, EncodeError>;

    /// Infallible probes used for result metadata and the `leech` pipeline;
    /// failures collapse to zero rather than propagating, matching the
    /// fallback the concrete `Encoder` already applies internally.
    fn probe_duration_seconds(&self, input: &Path) -> f64;
    fn probe_dimensions(&self, input: &Path) -> (u32, u32);
}

pub struct Encoder {
    runner: ProcessRunner,
    ffmpeg: String,
    ffprobe: String,
}

impl Encoder {
    pub fn new(runner: ProcessRunner, ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            runner,
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Probes duration once per input: spawn ffprobe, parse one text line,
    /// cache the result on the job.
    pub fn probe_duration_seconds(&self, input: &Path) -> anyhow::Result<f64> {
        let output = std::process::Command::new(&self.ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("default=nw=1:nk=1")
        .arg(input)
        .output()?;
        if !output.status.success() {
            anyhow::bail!(
                "ffprobe failed for {}: {}",
                input.display(),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().next().unwrap_or_default().trim().parse().unwrap_or(0.0))
    }

    /// Probes frame width/height once per input. Left as a thin
    /// wrapper over `ffprobe`'s stream-dimension query; the exact flag
    /// shape is an external-tool detail out of scope.
    pub fn probe_dimensions(&self, input: &Path) -> anyhow::Result<VideoDimensions> {
        let output = std::process::Command::new(&self.ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height")
        .arg("-of")
        .arg("csv=s=x:p=0")
        .arg(input)
        .output()?;
        if !output.status.success() {
            anyhow::bail!(
                "ffprobe failed for {}: {}",
                input.display(),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let line = text.lines().next().unwrap_or_default().trim();
        let mut parts = line.split('x');
        let width = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        let height = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        Ok(VideoDimensions { width, height })
    }

    pub fn probe_subtitle_streams(&self, _input: &Path) -> anyhow::Result<Vec<SubtitleStreamInfo>> {
        // Left as a seam: the exact ffprobe stream-enumeration invocation is
        // an external-tool flag detail out of scope. Callers inject a
        // fake implementation in tests.
        Ok(Vec::new())
    }

    /// Runs the encode for one resolution, returning the output path on
    /// success or raising `EncodeError::NoSubtitle` as a suspension signal
    /// rather than a failure.
    pub fn encode(
        &self,
        user: UserId,
        request: &EncodeRequest,
        cancel: &CancelToken,
        mut on_progress: impl FnMut(EncodeProgress),
    ) -> Result<PathBuf, EncodeError> {
        let embedded = self
        .probe_subtitle_streams(request.input)
        .unwrap_or_default();
        let subtitle = subtitle::resolve(request.subtitle_source, &embedded);
        if subtitle == ResolvedSubtitle::NoSubtitle {
            return Err(EncodeError::NoSubtitle);
        }

        let duration = self
        .probe_duration_seconds(request.input)
        .unwrap_or(0.0);
        let filter_chain = filters::build_filter_chain(
            request.resolution,
            &subtitle,
            request.subtitle_style,
            request.watermark,
        );

        let mode = effective_mode(request.mode, request.resolution);
        match mode {
            EncodeMode::Crf => self.run_crf_pass(user, request, &filter_chain, duration, cancel, &mut on_progress)?,
            EncodeMode::Twopass => self.run_two_pass(user, request, &filter_chain, duration, cancel, &mut on_progress)?,
            EncodeMode::Hybrid => unreachable!("effective_mode never returns Hybrid"),
        }

        Ok(request.output.to_path_buf())
    }

    fn run_single_pass(
        &self,
        user: UserId,
        args: Vec<String>,
        duration: f64,
        cancel: &CancelToken,
        status: &str,
        on_progress: &mut impl FnMut(EncodeProgress),
    ) -> Result<(), EncodeError> {
        self.runner
        .run(user, &self.ffmpeg, &args, None, cancel, false, |line| {
                if let Some(elapsed) = progress::parse_time_position_seconds(line) {
                    let percent = if duration > 0.0 {
                        (elapsed / duration * 100.0).clamp(0.0, 100.0)
                    } else {
                        0.0
                    };
                    on_progress(EncodeProgress {
                            status: status.to_string(),
                            percent,
                        });
                }
            })
        .map_err(|err| match err {
                crate::error::ProcessError::Cancelled => EncodeError::Cancelled,
                other => EncodeError::Process(other),
            })?;
        Ok(())
    }

    fn run_crf_pass(
        &self,
        user: UserId,
        request: &EncodeRequest,
        filter_chain: &str,
        duration: f64,
        cancel: &CancelToken,
        on_progress: &mut impl FnMut(EncodeProgress),
    ) -> Result<(), EncodeError> {
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            request.input.display().to_string(),
            "-vf".to_string(),
            filter_chain.to_string(),
            "-crf".to_string(),
            request.crf.to_string(),
            "-c:a".to_string(),
            request.audio.codec_name().to_string(),
            "-b:a".to_string(),
            format!("{}k", request.audio.bitrate_kbps(request.resolution)),
            request.output.display().to_string(),
        ];
        self.run_single_pass(user, args, duration, cancel, "crf", on_progress)
    }

    fn run_two_pass(
        &self,
        user: UserId,
        request: &EncodeRequest,
        filter_chain: &str,
        duration: f64,
        cancel: &CancelToken,
        on_progress: &mut impl FnMut(EncodeProgress),
    ) -> Result<(), EncodeError> {
        let bitrate = format!("{}k", request.resolution.two_pass_bitrate_kbps());
        let pass_log = format!("{}-passlog", request.pass_log_prefix);

        let pass1 = vec![
            "-y".to_string(),
            "-i".to_string(),
            request.input.display().to_string(),
            "-vf".to_string(),
            filter_chain.to_string(),
            "-b:v".to_string(),
            bitrate.clone(),
            "-pass".to_string(),
            "1".to_string(),
            "-passlogfile".to_string(),
            pass_log.clone(),
            "-an".to_string(),
            "-f".to_string(),
            "null".to_string(),
            null_sink().to_string(),
        ];
        self.run_single_pass(user, pass1, duration, cancel, "two-pass (1/2)", on_progress)?;

        let pass2 = vec![
            "-y".to_string(),
            "-i".to_string(),
            request.input.display().to_string(),
            "-vf".to_string(),
            filter_chain.to_string(),
            "-b:v".to_string(),
            bitrate,
            "-pass".to_string(),
            "2".to_string(),
            "-passlogfile".to_string(),
            pass_log.clone(),
            "-c:a".to_string(),
            request.audio.codec_name().to_string(),
            "-b:a".to_string(),
            format!("{}k", request.audio.bitrate_kbps(request.resolution)),
            request.output.display().to_string(),
        ];
        self.run_single_pass(user, pass2, duration, cancel, "two-pass (2/2)", on_progress)?;

        cleanup_pass_logs(&pass_log);
        Ok(())
    }
}

impl Transcoder for Encoder {
    fn encode(
        &self,
        user: UserId,
        request: &EncodeRequest,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(EncodeProgress),
    ) -> Result<PathBuf, EncodeError> {
        Encoder::encode(self, user, request, cancel, |p| on_progress(p))
    }

    fn probe_duration_seconds(&self, input: &Path) -> f64 {
        Encoder::probe_duration_seconds(self, input).unwrap_or(0.0)
    }

    fn probe_dimensions(&self, input: &Path) -> (u32, u32) {
        Encoder::probe_dimensions(self, input)
        .map(|d| (d.width, d.height))
        .unwrap_or((0, 0))
    }
}

#[cfg(unix)]
fn null_sink() -> &'static str {
    "/dev/null"
}

#[cfg(windows)]
fn null_sink() -> &'static str {
    "NUL"
}

/// Removes every file whose name begins with `pass_log_prefix`, rather than
/// a hardcoded pair of names, so leftover pass-N logs from a crashed prior
/// run are swept too.
fn cleanup_pass_logs(pass_log_prefix: &str) {
    let prefix_path = Path::new(pass_log_prefix);
    let dir = prefix_path.parent().unwrap_or_else(|| Path::new("."));
    let file_prefix = prefix_path
    .file_name()
    .and_then(|n| n.to_str())
    .unwrap_or(pass_log_prefix)
    .to_string();

    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(&file_prefix) {
                let _ = std::fs::remove_file(entry.path());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;
    use crate::process::ActiveProcessRegistry;

    #[test]
    fn a_pre_cancelled_run_surfaces_as_encode_error_cancelled_not_failed() {
        let runner = ProcessRunner::new(Arc::new(ActiveProcessRegistry::new()));
        let encoder = Encoder::new(runner, "sleep", "ffprobe");
        let cancel: CancelToken = Arc::new(AtomicBool::new(true));

        let result = encoder.run_single_pass(UserId(1), vec!["5".to_string()], 0.0, &cancel, "crf", &mut |_| {});

        assert!(matches!(result, Err(EncodeError::Cancelled)));
    }

    #[test]
    fn cleanup_pass_logs_removes_every_file_matching_the_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("job42-passlog");
        std::fs::write(format!("{}-0.log", prefix.display()), "x").unwrap();
        std::fs::write(format!("{}-0.log.mbtree", prefix.display()), "x").unwrap();
        std::fs::write(dir.path().join("unrelated.log"), "x").unwrap();

        cleanup_pass_logs(prefix.to_str().unwrap());

        let remaining: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
        assert_eq!(remaining, vec!["unrelated.log".to_string()]);
    }
}
