//! Output filename conventions: the cleaned display
//! name suffixed with the resolution tag and `.mp4`, with series episodes
//! renamed to a canonical `SxxExx` form.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::recipe::Resolution;

static EPISODE_RE: Lazy<Regex> =
Lazy::new(|| Regex::new(r"(?i)s(\d{1,2})[._-]?e(\d{1,3})").unwrap());

/// Strips characters illegal in filenames on common filesystems, collapsing
/// runs of whitespace to a single space.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = false;
    for ch in name.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => None,
            c if c.is_whitespace() => Some(' '),
            c => Some(c),
        };
        match mapped {
            Some(' ') => {
                if !last_was_space {
                    out.push(' ');
                }
                last_was_space = true;
            }
            Some(c) => {
                out.push(c);
                last_was_space = false;
            }
            None => {}
        }
    }
    out.trim().to_string()
}

/// Rewrites the first `S<digits>E<digits>`-shaped match (any separator, any
/// case) into the canonical `S<02>E<02>` form, e.g. `s1.e2` -> `S01E02`.
fn canonicalize_episode_tag(name: &str) -> String {
    match EPISODE_RE.captures(name) {
        Some(caps) => {
            let season: u32 = caps[1].parse().unwrap_or(0);
            let episode: u32 = caps[2].parse().unwrap_or(0);
            let canonical = format!("S{season:02}E{episode:02}");
            let whole = caps.get(0).unwrap();
            format!("{}{}{}", &name[..whole.start()], canonical, &name[whole.end()..])
        }
        None => name.to_string(),
    }
}

/// Cleans a raw display name (as produced by `Downloader::probe_name` or
/// supplied by the user) for use both as a human-facing label and as the
/// base of an output filename.
pub fn clean_display_name(raw: &str) -> String {
    let sanitized = sanitize(raw);
    canonicalize_episode_tag(&sanitized)
}

/// Builds `<cleaned-display-name>.<resolution-tag>.mp4`.
pub fn output_filename(display_name: &str, resolution: Resolution) -> String {
    format!("{}.{}.mp4", clean_display_name(display_name), resolution.tag())
}
