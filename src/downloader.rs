//! Downloader: wraps an external URL-fetcher subprocess (a
//! `yt-dlp`-shaped CLI). Line parsing follows the standard
//! regex-based progress-token style used throughout this crate.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::DownloadError;
use crate::ids::UserId;
use crate::process::{CancelToken, ProcessRunner};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadProgressLine {
    pub percent: Option<f64>,
    pub total_bytes: Option<u64>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").unwrap());
static SIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"of\s+~?\s*([0-9.]+\s*[A-Za-z]+)").unwrap());
static SPEED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"at\s+([0-9.]+\s*[A-Za-z]+/s)").unwrap());
static ETA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"ETA\s+(\d{1,2}:\d{2})").unwrap());

/// Parses one stdout/stderr line for a percent token and the optional `of
/// <size>`, `at <speed>`, `ETA <mm:ss>` companions. Returns `None`
/// when the line carries no percent token at all.
pub fn parse_progress_line(line: &str) -> Option<DownloadProgressLine> {
    let percent = PERCENT_RE
    .captures(line)?
    .get(1)?
    .as_str()
    .parse::<f64>()
    .ok()?
    .clamp(0.0, 100.0);

    Some(DownloadProgressLine {
            percent: Some(percent),
            total_bytes: None,
            speed: SPEED_RE.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str().to_string()),
            eta: ETA_RE.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str().to_string()),
        })
    .map(|mut p| {
            if let Some(size) = SIZE_RE.captures(line).and_then(|c| c.get(1)) {
                p.total_bytes = parse_size_to_bytes(size.as_str());
            }
            p
        })
}

fn parse_size_to_bytes(text: &str) -> Option<u64> {
    let text = text.trim();
    let split_at = text.find(|c: char| c.is_ascii_alphabetic())?;
    let (number, unit) = text.split_at(split_at);
    let number: f64 = number.trim().parse().ok()?;
    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => 1024.0 * 1024.0,
        "GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((number * multiplier) as u64)
}

/// Strips query strings, percent-decodes, and collapses duplicate
/// extensions (e.g. `.mp4.mp4` -> `.mp4`). Best-effort, never fails the
/// job.
pub fn probe_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = without_query.rsplit('/').next().unwrap_or(without_query);
    let decoded = percent_decode(last_segment);
    collapse_duplicate_extension(&decoded)
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn collapse_duplicate_extension(name: &str) -> String {
    if let Some(dot) = name.rfind('.') {
        let ext = &name[dot..];
        if !ext.is_empty() && name[..dot].ends_with(ext) {
            return name[..dot].to_string();
        }
    }
    name.to_string()
}

/// Trait seam over `Downloader::download`, so the job-execution engine can
/// be exercised against a fake fetcher in tests without spawning a real
/// subprocess (same pattern as `Notifier`/`UploadHost`).
pub trait Fetcher: Send + Sync {
    fn download(
        &self,
        user: UserId,
        url: &str,
        dest: &Path,
        timeout: std::time::Duration,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(DownloadProgressLine),
    ) -> Result<(), DownloadError>;
}

/// Downloads `url` into `dest`, wiring `on_progress` to every parsed
/// progress line. On success, `dest` exists and is non-empty. A
/// cancelled download is distinguished from a failure so the caller never
/// reports it as one (`ProcessError::Cancelled` maps straight through).
pub struct Downloader {
    runner: ProcessRunner,
    program: String,
}

impl Downloader {
    pub fn new(runner: ProcessRunner, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    pub fn download(
        &self,
        user: UserId,
        url: &str,
        dest: &Path,
        timeout: std::time::Duration,
        cancel: &CancelToken,
        mut on_progress: impl FnMut(DownloadProgressLine),
    ) -> Result<(), DownloadError> {
        let args = vec!["-o".to_string(), dest.display().to_string(), url.to_string()];
        let outcome = self.runner.run(
            user,
            &self.program,
            &args,
            Some(timeout),
            cancel,
            false,
            |line| {
                if let Some(progress) = parse_progress_line(line) {
                    on_progress(progress);
                }
            },
        );

        match outcome {
            Ok(_) => {
                if !dest.exists() || std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0) == 0 {
                    return Err(DownloadError::EmptyOutput(dest.display().to_string()));
                }
                Ok(())
            }
            Err(err) => Err(DownloadError::from(err)),
        }
    }
}

impl Fetcher for Downloader {
    fn download(
        &self,
        user: UserId,
        url: &str,
        dest: &Path,
        timeout: std::time::Duration,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(DownloadProgressLine),
    ) -> Result<(), DownloadError> {
        Downloader::download(self, user, url, dest, timeout, cancel, |p| on_progress(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_progress_line_recognises_fractional_and_integer_percent() {
        let low = parse_progress_line("[download] 0.0% of 10.0MB at 1.0MB/s ETA 00:10").unwrap();
        assert_eq!(low.percent, Some(0.0));
        assert_eq!(low.total_bytes, Some(10 * 1024 * 1024));
        assert_eq!(low.speed.as_deref(), Some("1.0MB/s"));
        assert_eq!(low.eta.as_deref(), Some("00:10"));

        let high = parse_progress_line("[download] 55.6% of ~20.0MB at 2.0MB/s ETA 00:05").unwrap();
        assert_eq!(high.percent, Some(55.6));
    }

    #[test]
    fn parse_progress_line_ignores_lines_without_a_percent_token() {
        assert!(parse_progress_line("Destination: video.mp4").is_none());
    }

    #[test]
    fn percent_never_escapes_the_zero_to_hundred_range() {
        let over = parse_progress_line("150% done").unwrap();
        assert_eq!(over.percent, Some(100.0));
    }

    #[test]
    fn probe_name_strips_query_decodes_and_collapses_duplicate_extension() {
        assert_eq!(
            probe_name("https://example.com/path/My%20Video.mp4.mp4?token=abc"),
            "My Video.mp4"
        );
    }
}
