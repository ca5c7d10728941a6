use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Watermark fade timings, in seconds, applied within the first
/// `watermark_duration_seconds` of the encoded output.
pub const WATERMARK_FADE_IN_SECONDS: f64 = 1.0;
pub const WATERMARK_FADE_OUT_SECONDS: f64 = 2.0;

/// Reporter tick interval.
pub const REPORTER_TICK: Duration = Duration::from_secs(4);

/// Ambient, file-backed configuration: layout roots, per-host toggles,
/// watermark/timeout knobs. Whole-file load/save, mirroring the shape of
/// the standard `AppSettings` pattern used elsewhere in this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// On-disk layout roots.
    pub layout: Layout,
    /// Per-host enable flags.
    pub hosts: HostToggles,
    /// Download hard timeout; default 30 minutes.
    #[serde(with = "duration_secs")]
    pub download_timeout: Duration,
    /// Whether the drawtext watermark filter is enabled.
    pub watermark_enabled: bool,
    pub watermark_text: String,
    /// Duration, in seconds, the watermark is shown for before disappearing.
    pub watermark_duration_seconds: f64,
    /// Stderr tail length captured for `NonZeroExit` errors.
    pub stderr_capture_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            hosts: HostToggles::default(),
            download_timeout: Duration::from_secs(30 * 60),
            watermark_enabled: false,
            watermark_text: String::new(),
            watermark_duration_seconds: 10.0,
            stderr_capture_limit: 8192,
        }
    }
}

impl EngineConfig {
    pub fn load_or_default(path: &Path) -> Self {
        std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// The four on-disk folders named in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub raw_cache_dir: PathBuf,
    pub manual_drop_dir: PathBuf,
    pub output_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        let root = PathBuf::from("data");
        Self {
            raw_cache_dir: root.join("raw"),
            manual_drop_dir: root.join("manual_drop"),
            output_dir: root.join("output"),
            state_dir: root.join("state"),
        }
    }
}

impl Layout {
    pub fn cache_registry_path(&self) -> PathBuf {
        self.state_dir.join("cache_registry.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.state_dir.join("history.json")
    }

    pub fn templates_path(&self) -> PathBuf {
        self.state_dir.join("templates.json")
    }

    pub fn auth_list_path(&self) -> PathBuf {
        self.state_dir.join("auth.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostToggles {
    pub seedbox: bool,
    pub drive: bool,
    pub mirror: bool,
    pub one_click: bool,
    pub general_file: bool,
    pub filepress: bool,
    pub abyss: bool,
    pub turbovid: bool,
    pub vidhide: bool,
}

impl Default for HostToggles {
    fn default() -> Self {
        Self {
            seedbox: true,
            drive: true,
            mirror: true,
            one_click: true,
            general_file: true,
            filepress: true,
            abyss: true,
            turbovid: true,
            vidhide: true,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_download_timeout_is_thirty_minutes() {
        let config = EngineConfig::default();
        assert_eq!(config.download_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = EngineConfig::default();
        config.watermark_enabled = true;
        config.watermark_text = "sample".into();
        config.save(&path).unwrap();

        let loaded = EngineConfig::load_or_default(&path);
        assert!(loaded.watermark_enabled);
        assert_eq!(loaded.watermark_text, "sample");
    }
}
