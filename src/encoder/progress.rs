//! Encoder progress: time-position tokens from ffmpeg stderr
//! (`time=00:01:23.45`) divided by the probed duration.

use once_cell::sync::Lazy;
use regex::Regex;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"time=(\d{2}):(\d{2}):(\d{2})(?:\.(\d+))?").unwrap()
    });

/// Parses a `time=HH:MM:SS.ms` token into elapsed seconds, or `None` if the
/// line carries no such token.
pub fn parse_time_position_seconds(line: &str) -> Option<f64> {
    let captures = TIME_RE.captures(line)?;
    let hours: f64 = captures[1].parse().ok()?;
    let minutes: f64 = captures[2].parse().ok()?;
    let seconds: f64 = captures[3].parse().ok()?;
    let fraction: f64 = captures
    .get(4)
    .and_then(|m| format!("0.{}", m.as_str()).parse().ok())
    .unwrap_or(0.0);
    Some(hours * 3600.0 + minutes * 60.0 + seconds + fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_time_token_with_fractional_seconds() {
        let elapsed = parse_time_position_seconds("frame=100 fps=25 time=00:01:23.45 bitrate=N/A").unwrap();
        assert!((elapsed - 83.45).abs() < 1e-6);
    }

    #[test]
    fn parses_time_token_without_fractional_seconds() {
        let elapsed = parse_time_position_seconds("time=00:00:05 speed=1x").unwrap();
        assert!((elapsed - 5.0).abs() < 1e-6);
    }

    #[test]
    fn returns_none_for_lines_without_a_time_token() {
        assert!(parse_time_position_seconds("Stream mapping:").is_none());
    }
}
