//! Wave banks and sound banks.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use cuebank_core::{
    CueDefinition, Error, Result, SoundBankDefinition, SoundDefinition, WaveBankDefinition,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::cue::Cue;
use super::engine::AudioEngine;
use crate::source::CompressedAudioSource;
use crate::stream::LoopRegion;

/// One decodable wave and its loop region.
#[derive(Debug, Clone)]
pub struct WaveEntry {
    pub source: Arc<CompressedAudioSource>,
    pub loop_region: LoopRegion,
}

impl WaveEntry {
    pub fn new(source: CompressedAudioSource) -> Self {
        Self {
            source: Arc::new(source),
            loop_region: LoopRegion::default(),
        }
    }

    #[must_use]
    pub fn with_loop_region(mut self, loop_region: LoopRegion) -> Self {
        self.loop_region = loop_region;
        self
    }
}

/// Named collection of wave data.
#[derive(Debug, Clone)]
pub struct WaveBank {
    name: String,
    entries: Vec<WaveEntry>,
}

impl WaveBank {
    pub fn new(name: impl Into<String>, entries: Vec<WaveEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    /// Read every entry's data file, relative to `base_dir`.
    pub fn load(definition: &WaveBankDefinition, base_dir: &Path) -> Result<Self> {
        let mut entries = Vec::with_capacity(definition.entries.len());

        for entry in &definition.entries {
            let resolved = entry.resolve_format()?;
            let data = Bytes::from(std::fs::read(base_dir.join(&entry.file))?);
            let source = CompressedAudioSource::new(
                data,
                resolved.format,
                resolved.sample_rate,
                resolved.block_align,
            )?;
            debug!(
                file = %entry.file,
                format = ?resolved.format,
                bytes = source.length(),
                "Loaded wave"
            );
            entries.push(
                WaveEntry::new(source)
                    .with_loop_region(LoopRegion::new(entry.loop_start, entry.loop_length)),
            );
        }

        info!(bank = %definition.name, waves = entries.len(), "Wave bank loaded");
        Ok(Self::new(definition.name.clone(), entries))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<&WaveEntry> {
        self.entries.get(index)
    }
}

/// A cue definition and the number of times it has been replaced.
#[derive(Debug, Clone)]
struct CueEntry {
    definition: CueDefinition,
    version: u64,
}

/// Sound bank contents shared by its handle and every cue created from it.
#[derive(Debug)]
pub(crate) struct BankShared {
    name: String,
    sounds: Vec<SoundDefinition>,
    cues: RwLock<Vec<CueEntry>>,
}

impl BankShared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn sound(&self, index: usize) -> Result<&SoundDefinition> {
        self.sounds.get(index).ok_or_else(|| {
            Error::NotFound(format!("sound {index} in bank '{}'", self.name))
        })
    }

    pub(crate) fn cue(&self, name: &str) -> Option<(CueDefinition, u64)> {
        self.cues
            .read()
            .iter()
            .find(|c| c.definition.name == name)
            .map(|c| (c.definition.clone(), c.version))
    }

    /// The current definition, if it is newer than `seen`.
    pub(crate) fn newer_cue(&self, name: &str, seen: u64) -> Option<(CueDefinition, u64)> {
        self.cues
            .read()
            .iter()
            .find(|c| c.definition.name == name && c.version != seen)
            .map(|c| (c.definition.clone(), c.version))
    }

    fn check_cue(&self, cue: &CueDefinition) -> Result<()> {
        if cue.sounds.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "cue '{}' has no sounds",
                cue.name
            )));
        }
        if let Some(&bad) = cue.sounds.iter().find(|&&i| i >= self.sounds.len()) {
            return Err(Error::NotFound(format!(
                "cue '{}' references sound {bad}, bank '{}' has {}",
                cue.name,
                self.name,
                self.sounds.len()
            )));
        }
        Ok(())
    }
}

/// Cues and sounds loaded from one sound bank definition.
#[derive(Clone)]
pub struct SoundBank {
    engine: AudioEngine,
    shared: Arc<BankShared>,
}

impl SoundBank {
    pub fn new(engine: &AudioEngine, definition: SoundBankDefinition) -> Result<Self> {
        let shared = BankShared {
            name: definition.name,
            sounds: definition.sounds,
            cues: RwLock::new(Vec::new()),
        };
        for cue in &definition.cues {
            shared.check_cue(cue)?;
        }
        *shared.cues.write() = definition
            .cues
            .into_iter()
            .map(|definition| CueEntry {
                definition,
                version: 0,
            })
            .collect();

        info!(
            bank = %shared.name,
            sounds = shared.sounds.len(),
            cues = shared.cues.read().len(),
            "Sound bank loaded"
        );
        Ok(Self {
            engine: engine.clone(),
            shared: Arc::new(shared),
        })
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn cue_names(&self) -> Vec<String> {
        self.shared
            .cues
            .read()
            .iter()
            .map(|c| c.definition.name.clone())
            .collect()
    }

    /// Create a prepared cue.
    pub fn get_cue(&self, name: &str) -> Result<Cue> {
        let (definition, version) = self
            .shared
            .cue(name)
            .ok_or_else(|| Error::NotFound(format!("cue '{name}' in bank '{}'", self.name())))?;
        Ok(self
            .engine
            .create_cue(Arc::clone(&self.shared), definition, version))
    }

    /// Play a cue without keeping a handle to it.
    pub fn play_cue(&self, name: &str) -> Result<()> {
        let cue = self.get_cue(name)?;
        cue.play()
    }

    /// Swap in a new definition for an existing cue. Playing instances
    /// restart with it on the next engine update.
    pub fn replace_cue(&self, definition: CueDefinition) -> Result<()> {
        self.shared.check_cue(&definition)?;

        let mut cues = self.shared.cues.write();
        let entry = cues
            .iter_mut()
            .find(|c| c.definition.name == definition.name)
            .ok_or_else(|| {
                Error::NotFound(format!("cue '{}' in bank '{}'", definition.name, self.shared.name))
            })?;

        entry.version += 1;
        info!(cue = %definition.name, version = entry.version, "Cue definition replaced");
        entry.definition = definition;
        Ok(())
    }
}

impl std::fmt::Debug for SoundBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundBank")
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuebank_core::{SourceFormat, WaveEntryDefinition, WaveRef};

    fn shared(sounds: usize) -> BankShared {
        BankShared {
            name: "Effects".into(),
            sounds: (0..sounds)
                .map(|i| SoundDefinition::new("Default", WaveRef { bank: "w".into(), index: i }))
                .collect(),
            cues: RwLock::new(vec![CueEntry {
                definition: CueDefinition::new("Boom", vec![0]),
                version: 0,
            }]),
        }
    }

    #[test]
    fn test_check_cue_rejects_bad_sounds() {
        let bank = shared(2);
        assert!(bank.check_cue(&CueDefinition::new("Ok", vec![0, 1])).is_ok());
        assert!(matches!(
            bank.check_cue(&CueDefinition::new("Bad", vec![2])),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            bank.check_cue(&CueDefinition::new("Empty", Vec::new())),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_newer_cue_tracks_version() {
        let bank = shared(1);
        assert!(bank.newer_cue("Boom", 0).is_none());

        bank.cues.write()[0].version = 1;
        let (definition, version) = bank.newer_cue("Boom", 0).unwrap();
        assert_eq!(definition.name, "Boom");
        assert_eq!(version, 1);
        assert!(bank.newer_cue("Boom", 1).is_none());
        assert!(bank.newer_cue("Missing", 0).is_none());
    }

    #[test]
    fn test_wave_bank_load() {
        let dir = std::env::temp_dir().join(format!("cuebank-wave-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tone.raw"), vec![0u8; 400]).unwrap();

        let definition = WaveBankDefinition {
            name: "Waves".into(),
            entries: vec![WaveEntryDefinition {
                file: "tone.raw".into(),
                format: Some(SourceFormat::Mono16),
                mini_format: None,
                sample_rate: 22050,
                block_align: 2,
                loop_start: 100,
                loop_length: 200,
            }],
        };
        let bank = WaveBank::load(&definition, &dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(bank.name(), "Waves");
        assert_eq!(bank.len(), 1);
        let entry = bank.entry(0).unwrap();
        assert_eq!(entry.source.length(), 400);
        assert_eq!(entry.loop_region, LoopRegion::new(100, 200));
    }

    #[test]
    fn test_wave_bank_missing_file() {
        let definition = WaveBankDefinition {
            name: "Waves".into(),
            entries: vec![WaveEntryDefinition {
                file: "does-not-exist.raw".into(),
                format: Some(SourceFormat::Mono8),
                mini_format: None,
                sample_rate: 8000,
                block_align: 1,
                loop_start: 0,
                loop_length: 0,
            }],
        };
        assert!(matches!(
            WaveBank::load(&definition, Path::new("/nonexistent")),
            Err(Error::Io(_))
        ));
    }
}
