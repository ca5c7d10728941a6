//! Subtitle resolution: external path wins outright; otherwise the
//! first embedded stream whose language tag matches Indonesian by substring.
//!
//! An explicit `none` subtitle source skips the filter entirely and is not
//! a suspension trigger — only an `embedded-auto` miss raises `no-subtitle`.

use crate::job::SubtitleSource;

/// One subtitle stream as reported by a probe (stream index + language
/// tag, e.g. `ind`, `eng`, `indonesian`).
#[derive(Debug, Clone)]
pub struct SubtitleStreamInfo {
    pub index: usize,
    pub language_tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSubtitle {
    ExternalFile(std::path::PathBuf),
    EmbeddedStream(usize),
    /// User explicitly requested no subtitles; no filter, no suspension.
    Skip,
    /// Non-failure suspension signal: `embedded-auto` found no
    /// matching stream and no external subtitle was supplied.
    NoSubtitle,
}

pub fn resolve(
    subtitle_source: &SubtitleSource,
    embedded_streams: &[SubtitleStreamInfo],
) -> ResolvedSubtitle {
    match subtitle_source {
        SubtitleSource::ExternalFile(path) => ResolvedSubtitle::ExternalFile(path.clone()),
        SubtitleSource::None => ResolvedSubtitle::Skip,
        SubtitleSource::EmbeddedAuto => embedded_streams
        .iter()
        .find(|stream| is_indonesian(&stream.language_tag))
        .map(|stream| ResolvedSubtitle::EmbeddedStream(stream.index))
        .unwrap_or(ResolvedSubtitle::NoSubtitle),
    }
}

fn is_indonesian(language_tag: &str) -> bool {
    let lower = language_tag.to_ascii_lowercase();
    lower.starts_with("ind") || lower.contains("indonesian")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streams(tags: &[&str]) -> Vec<SubtitleStreamInfo> {
        tags.iter()
        .enumerate()
        .map(|(index, tag)| SubtitleStreamInfo {
                index,
                language_tag: tag.to_string(),
            })
        .collect()
    }

    #[test]
    fn external_file_always_wins() {
        let resolved = resolve(
            &SubtitleSource::ExternalFile("/tmp/subs.srt".into()),
            &streams(&["ind"]),
        );
        assert_eq!(resolved, ResolvedSubtitle::ExternalFile("/tmp/subs.srt".into()));
    }

    #[test]
    fn embedded_auto_matches_ind_prefix_and_indonesian_substring() {
        assert_eq!(
            resolve(&SubtitleSource::EmbeddedAuto, &streams(&["eng", "ind"])),
            ResolvedSubtitle::EmbeddedStream(1)
        );
        assert_eq!(
            resolve(&SubtitleSource::EmbeddedAuto, &streams(&["eng", "Indonesian"])),
            ResolvedSubtitle::EmbeddedStream(1)
        );
    }

    #[test]
    fn embedded_auto_with_no_match_raises_no_subtitle() {
        assert_eq!(
            resolve(&SubtitleSource::EmbeddedAuto, &streams(&["eng", "fra"])),
            ResolvedSubtitle::NoSubtitle
        );
    }

    #[test]
    fn explicit_none_skips_without_probing_or_suspending() {
        assert_eq!(resolve(&SubtitleSource::None, &streams(&["ind"])), ResolvedSubtitle::Skip);
    }
}
