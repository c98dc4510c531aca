//! JSON project manifest produced by the content build.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{
    CategoryDefinition, CueDefinition, MiniFormat, RpcCurve, RpcVariable, SoundDefinition,
    SourceFormat, DISTANCE_VARIABLE, ORIENTATION_ANGLE_VARIABLE,
};
use crate::{Error, Result};

/// Project-wide categories, variables and curves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub categories: Vec<CategoryDefinition>,
    pub variables: Vec<RpcVariable>,
    pub rpc_curves: Vec<RpcCurve>,
}

impl GlobalSettings {
    /// Global variables in declaration order.
    pub fn global_variables(&self) -> Vec<RpcVariable> {
        self.variables.iter().filter(|v| v.is_global).cloned().collect()
    }

    /// Per-cue variable template in declaration order, with the reserved
    /// positioning variables appended when absent.
    pub fn instance_variables(&self) -> Vec<RpcVariable> {
        let mut vars: Vec<RpcVariable> =
            self.variables.iter().filter(|v| !v.is_global).cloned().collect();

        for name in [DISTANCE_VARIABLE, ORIENTATION_ANGLE_VARIABLE] {
            if !vars.iter().any(|v| v.name == name) {
                vars.push(RpcVariable::reserved(name));
            }
        }
        vars
    }

    pub fn category(&self, name: &str) -> Option<&CategoryDefinition> {
        self.categories.iter().find(|c| c.name == name)
    }
}

/// One wave inside a wave bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveEntryDefinition {
    /// Raw data file, relative to the manifest.
    pub file: String,
    #[serde(default)]
    pub format: Option<SourceFormat>,
    /// Packed format word, used when `format` is absent.
    #[serde(default)]
    pub mini_format: Option<u32>,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub block_align: usize,
    /// Loop region start in decoded PCM bytes.
    #[serde(default)]
    pub loop_start: usize,
    /// Loop region length in decoded PCM bytes; 0 loops to the end.
    #[serde(default)]
    pub loop_length: usize,
}

/// Format, sample rate and block alignment of a wave entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFormat {
    pub format: SourceFormat,
    pub sample_rate: u32,
    pub block_align: usize,
}

impl WaveEntryDefinition {
    /// Resolve the explicit format, falling back to the packed word.
    pub fn resolve_format(&self) -> Result<ResolvedFormat> {
        if let Some(format) = self.format {
            return Ok(ResolvedFormat {
                format,
                sample_rate: self.sample_rate,
                block_align: self.block_align,
            });
        }

        let Some(raw) = self.mini_format else {
            return Err(Error::UnsupportedFormat(format!(
                "wave '{}' declares no format",
                self.file
            )));
        };
        let mini = MiniFormat::decode(raw);
        Ok(ResolvedFormat {
            format: mini.source_format()?,
            sample_rate: mini.sample_rate,
            block_align: mini.block_align(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveBankDefinition {
    pub name: String,
    #[serde(default)]
    pub entries: Vec<WaveEntryDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundBankDefinition {
    pub name: String,
    #[serde(default)]
    pub sounds: Vec<SoundDefinition>,
    #[serde(default)]
    pub cues: Vec<CueDefinition>,
}

impl SoundBankDefinition {
    pub fn cue(&self, name: &str) -> Option<&CueDefinition> {
        self.cues.iter().find(|c| c.name == name)
    }
}

/// Everything the runtime loads for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectManifest {
    pub settings: GlobalSettings,
    pub wave_banks: Vec<WaveBankDefinition>,
    pub sound_banks: Vec<SoundBankDefinition>,
}

impl ProjectManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn wave_bank(&self, name: &str) -> Option<&WaveBankDefinition> {
        self.wave_banks.iter().find(|b| b.name == name)
    }

    pub fn sound_bank(&self, name: &str) -> Option<&SoundBankDefinition> {
        self.sound_banks.iter().find(|b| b.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RpcParameter, WaveCodec};

    const MANIFEST: &str = r#"{
        "settings": {
            "categories": [{ "name": "Music", "max_instances": 1, "fade_out_secs": 0.5 }],
            "variables": [
                { "name": "Speed", "min_value": 0.0, "max_value": 100.0 },
                { "name": "Time", "is_global": true, "is_public": false }
            ],
            "rpc_curves": [
                { "variable": 0, "parameter": "volume",
                  "points": [{ "position": 0.0, "value": -12.0 }, { "position": 100.0, "value": 0.0 }] }
            ]
        },
        "wave_banks": [{ "name": "Waves", "entries": [
            { "file": "theme.adpcm", "format": "stereo_ms_adpcm", "sample_rate": 44100,
              "block_align": 140, "loop_start": 0 }
        ]}],
        "sound_banks": [{ "name": "Sounds",
            "sounds": [{ "category": "Music", "wave": { "bank": "Waves", "index": 0 },
                         "loop_count": 255, "rpc_curves": [0] }],
            "cues": [{ "name": "Theme", "sounds": [0], "instance_limit": 1,
                       "limit_behavior": "fail_to_play" }]
        }]
    }"#;

    #[test]
    fn test_manifest_parse() {
        let manifest = ProjectManifest::from_json(MANIFEST).unwrap();

        let music = manifest.settings.category("Music").unwrap();
        assert_eq!(music.instance_cap(), Some(1));
        assert_eq!(music.volume, 1.0);

        let sounds = manifest.sound_bank("Sounds").unwrap();
        let cue = sounds.cue("Theme").unwrap();
        assert_eq!(cue.instance_cap(), Some(1));
        assert!(sounds.sounds[0].loops_forever());
        assert_eq!(manifest.settings.rpc_curves[0].parameter, RpcParameter::Volume);

        let wave = &manifest.wave_bank("Waves").unwrap().entries[0];
        let resolved = wave.resolve_format().unwrap();
        assert_eq!(resolved.format, SourceFormat::StereoMsAdpcm);
        assert_eq!(resolved.block_align, 140);
    }

    #[test]
    fn test_variable_split() {
        let manifest = ProjectManifest::from_json(MANIFEST).unwrap();

        let globals = manifest.settings.global_variables();
        assert_eq!(globals.len(), 1);
        assert_eq!(globals[0].name, "Time");

        let names: Vec<String> = manifest
            .settings
            .instance_variables()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, ["Speed", DISTANCE_VARIABLE, ORIENTATION_ANGLE_VARIABLE]);
    }

    #[test]
    fn test_mini_format_entry() {
        let mini = MiniFormat {
            codec: WaveCodec::Pcm,
            channels: 1,
            sample_rate: 22050,
            alignment: 2,
            bits_per_sample: 16,
        };
        let entry = WaveEntryDefinition {
            file: "click.raw".into(),
            format: None,
            mini_format: Some(mini.encode()),
            sample_rate: 0,
            block_align: 0,
            loop_start: 0,
            loop_length: 0,
        };
        let resolved = entry.resolve_format().unwrap();
        assert_eq!(resolved.format, SourceFormat::Mono16);
        assert_eq!(resolved.sample_rate, 22050);

        let missing = WaveEntryDefinition {
            mini_format: None,
            ..entry
        };
        assert!(matches!(
            missing.resolve_format(),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
