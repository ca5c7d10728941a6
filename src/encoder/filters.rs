//! Filter chain construction: `scale`, `subtitles`, and an optional
//! `drawtext` watermark.

use crate::config::{WATERMARK_FADE_IN_SECONDS, WATERMARK_FADE_OUT_SECONDS};
use crate::encoder::subtitle::ResolvedSubtitle;
use crate::recipe::{Resolution, SubtitleStyle};

fn style_force_style(style: &SubtitleStyle) -> String {
    format!(
        "FontName={},FontSize={},MarginV={},Bold={}",
        style.font_name,
        style.font_size,
        style.margin,
        if style.bold { 1 } else { 0 }
    )
}

fn subtitles_filter(subtitle: &ResolvedSubtitle, style: &SubtitleStyle) -> Option<String> {
    let force_style = style_force_style(style);
    match subtitle {
        ResolvedSubtitle::ExternalFile(path) => Some(format!(
                "subtitles={}:force_style='{}'",
                escape_path(path),
                force_style
            )),
        ResolvedSubtitle::EmbeddedStream(index) => Some(format!(
                "subtitles=si={}:force_style='{}'",
                index, force_style
            )),
        ResolvedSubtitle::Skip | ResolvedSubtitle::NoSubtitle => None,
    }
}

fn escape_path(path: &std::path::Path) -> String {
    path.display().to_string().replace(':', "\\:").replace('\'', "\\'")
}

/// Builds the watermark `drawtext` filter, centered near the top, fading in
/// over the first second and out over the last two seconds of the first
/// `watermark_duration_seconds` of the video.
fn watermark_filter(text: &str, duration_seconds: f64) -> String {
    let fade_out_start = (duration_seconds - WATERMARK_FADE_OUT_SECONDS).max(0.0);
    format!(
        "drawtext=text='{text}':x=(w-text_w)/2:y=h*0.05:\
        enable='between(t,0,{duration_seconds})':\
        alpha='if(lt(t,{fade_in}),t/{fade_in},if(lt(t,{fade_out_start}),1,\
                max(0,({duration_seconds}-t)/{fade_out})))'",
        text = text.replace('\'', "\\'"),
        fade_in = WATERMARK_FADE_IN_SECONDS,
        fade_out_start = fade_out_start,
        fade_out = WATERMARK_FADE_OUT_SECONDS,
        duration_seconds = duration_seconds,
    )
}

/// Joins `scale`, `subtitles`, and optional `drawtext` into a single
/// `-vf`-ready filter chain.
pub fn build_filter_chain(
    resolution: Resolution,
    subtitle: &ResolvedSubtitle,
    style: &SubtitleStyle,
    watermark: Option<(&str, f64)>,
) -> String {
    let mut filters = vec![format!("scale=-2:{}", resolution.height())];
    if let Some(subtitles) = subtitles_filter(subtitle, style) {
        filters.push(subtitles);
    }
    if let Some((text, duration_seconds)) = watermark {
        filters.push(watermark_filter(text, duration_seconds));
    }
    filters.join(",")
}
