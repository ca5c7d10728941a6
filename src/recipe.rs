//! Recipe / Template: named, persisted preset captured by value into a
//! Job at submission time. The catalogue *backend* is out of scope; the
//! shape and a default JSON-file `TemplateStore` are in scope.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl Resolution {
    pub fn height(self) -> u32 {
        match self {
            Resolution::P360 => 360,
            Resolution::P480 => 480,
            Resolution::P720 => 720,
            Resolution::P1080 => 1080,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Resolution::P360 => "360p",
            Resolution::P480 => "480p",
            Resolution::P720 => "720p",
            Resolution::P1080 => "1080p",
        }
    }

    /// Two-pass target video bitrate in kbps.
    pub fn two_pass_bitrate_kbps(self) -> u32 {
        match self {
            Resolution::P360 => 300,
            Resolution::P480 => 540,
            Resolution::P720 => 850,
            Resolution::P1080 => 2100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeMode {
    Crf,
    Twopass,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioProfile {
    AacLc,
    HeAac,
}

impl AudioProfile {
    /// Stereo bitrate ladder in kbps per resolution.
    pub fn bitrate_kbps(self, resolution: Resolution) -> u32 {
        match (self, resolution) {
            (AudioProfile::HeAac, Resolution::P360) => 40,
            (AudioProfile::HeAac, Resolution::P480) => 48,
            (AudioProfile::HeAac, Resolution::P720) => 112,
            (AudioProfile::HeAac, Resolution::P1080) => 128,
            (AudioProfile::AacLc, Resolution::P360) => 64,
            (AudioProfile::AacLc, Resolution::P480) => 96,
            (AudioProfile::AacLc, Resolution::P720) => 128,
            (AudioProfile::AacLc, Resolution::P1080) => 160,
        }
    }

    pub fn codec_name(self) -> &'static str {
        match self {
            AudioProfile::AacLc => "aac",
            AudioProfile::HeAac => "libfdk_aac",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleStyle {
    pub font_name: String,
    pub font_size: u32,
    pub margin: u32,
    pub bold: bool,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 16,
            margin: 25,
            bold: false,
        }
    }
}

/// Resolves `Recipe::mode` for a given resolution, encoding the `hybrid`
/// semantics of: two-pass for 360p, CRF for everything else, unless the
/// recipe requests `twopass` uniformly.
pub fn effective_mode(mode: EncodeMode, resolution: Resolution) -> EncodeMode {
    match mode {
        EncodeMode::Hybrid if resolution == Resolution::P360 => EncodeMode::Twopass,
        EncodeMode::Hybrid => EncodeMode::Crf,
        other => other,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub name: String,
    pub resolutions: Vec<Resolution>,
    /// Per-resolution CRF override; falls back to `crf` when absent.
    #[serde(default)]
    pub res_crf: BTreeMap<String, i32>,
    pub crf: i32,
    pub audio: AudioProfile,
    pub mode: EncodeMode,
    pub font_size: u32,
    pub margin: u32,
}

impl Recipe {
    pub fn crf_for(&self, resolution: Resolution) -> i32 {
        self.res_crf
        .get(resolution.tag())
        .copied()
        .unwrap_or(self.crf)
    }
}

/// Port for the template catalogue.
pub trait TemplateStore: Send + Sync {
    fn load(&self) -> anyhow::Result<BTreeMap<String, Recipe>>;
    fn save(&self, key: &str, recipe: &Recipe) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Default JSON-file implementation matching the wire format: an object
/// keyed by template key.
pub struct JsonFileTemplateStore {
    path: PathBuf,
}

impl JsonFileTemplateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TemplateStore for JsonFileTemplateStore {
    fn load(&self) -> anyhow::Result<BTreeMap<String, Recipe>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(_) => Ok(BTreeMap::new()),
        }
    }

    fn save(&self, key: &str, recipe: &Recipe) -> anyhow::Result<()> {
        let mut all = self.load()?;
        all.insert(key.to_string(), recipe.clone());
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut all = self.load()?;
        all.remove(key);
        std::fs::write(&self.path, serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe() -> Recipe {
        Recipe {
            name: "default".into(),
            resolutions: vec![Resolution::P720],
            res_crf: BTreeMap::new(),
            crf: 23,
            audio: AudioProfile::HeAac,
            mode: EncodeMode::Crf,
            font_size: 16,
            margin: 25,
        }
    }

    #[test]
    fn hybrid_uses_two_pass_for_360p_and_crf_otherwise() {
        assert_eq!(
            effective_mode(EncodeMode::Hybrid, Resolution::P360),
            EncodeMode::Twopass
        );
        assert_eq!(
            effective_mode(EncodeMode::Hybrid, Resolution::P720),
            EncodeMode::Crf
        );
        assert_eq!(
            effective_mode(EncodeMode::Hybrid, Resolution::P1080),
            EncodeMode::Crf
        );
    }

    #[test]
    fn explicit_twopass_is_honored_uniformly_across_resolutions() {
        for resolution in [Resolution::P360, Resolution::P720, Resolution::P1080] {
            assert_eq!(
                effective_mode(EncodeMode::Twopass, resolution),
                EncodeMode::Twopass
            );
        }
    }

    #[test]
    fn template_save_then_load_yields_equal_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileTemplateStore::new(dir.path().join("templates.json"));
        let recipe = recipe();
        store.save("default", &recipe).unwrap();

        let loaded = store.load().unwrap();
        let round_tripped = &loaded["default"];
        assert_eq!(round_tripped.name, recipe.name);
        assert_eq!(round_tripped.crf, recipe.crf);
        assert_eq!(round_tripped.resolutions, recipe.resolutions);
    }

    #[test]
    fn crf_for_resolution_falls_back_to_recipe_default() {
        let mut recipe = recipe();
        recipe.res_crf.insert("1080p".to_string(), 20);
        assert_eq!(recipe.crf_for(Resolution::P1080), 20);
        assert_eq!(recipe.crf_for(Resolution::P720), 23);
    }
}
