//! Sound and cue definitions.

use serde::{Deserialize, Serialize};

use super::RpcCurve;

/// Loop count meaning "loop forever".
pub const INFINITE_LOOPS: u8 = 255;
/// Instance limit meaning "no limit".
pub const NO_INSTANCE_LIMIT: u8 = 255;

/// What happens when a cue is played at its instance limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitBehavior {
    /// Drop the new request.
    FailToPlay,
    Queue,
    #[default]
    ReplaceOldest,
    ReplaceQuietest,
    ReplaceLowestPriority,
}

/// Location of a wave inside a loaded wave bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveRef {
    /// Wave bank name.
    pub bank: String,
    /// Entry index inside the bank.
    pub index: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    LowPass,
    BandPass,
    HighPass,
}

/// Static filter authored on a sound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    #[serde(default)]
    pub mode: FilterMode,
    /// Cutoff in Hz.
    pub frequency: f32,
    #[serde(default = "default_q")]
    pub q_factor: f32,
}

const fn default_q() -> f32 {
    1.0
}

/// One playable sound variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundDefinition {
    /// Category name.
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Pitch offset in octaves.
    #[serde(default)]
    pub pitch: f32,
    #[serde(default)]
    pub use_reverb: bool,
    /// Indices into the project's curve table.
    #[serde(default)]
    pub rpc_curves: Vec<usize>,
    pub wave: WaveRef,
    /// Extra passes over the loop region; 255 loops forever.
    #[serde(default)]
    pub loop_count: u8,
    #[serde(default)]
    pub filter: Option<FilterSettings>,
}

fn default_category() -> String {
    "Default".to_string()
}

const fn default_volume() -> f32 {
    1.0
}

impl SoundDefinition {
    pub fn new(category: impl Into<String>, wave: WaveRef) -> Self {
        Self {
            category: category.into(),
            volume: 1.0,
            pitch: 0.0,
            use_reverb: false,
            rpc_curves: Vec::new(),
            wave,
            loop_count: 0,
            filter: None,
        }
    }

    pub const fn loops_forever(&self) -> bool {
        self.loop_count == INFINITE_LOOPS
    }

    /// Resolve this sound's curve indices against a curve table, skipping
    /// indices that point outside it.
    pub fn curves<'a>(&'a self, table: &'a [RpcCurve]) -> impl Iterator<Item = &'a RpcCurve> + 'a {
        self.rpc_curves.iter().filter_map(|&i| table.get(i))
    }
}

/// A named cue and its candidate sound variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueDefinition {
    pub name: String,
    /// Indices into the owning sound bank's sound list.
    pub sounds: Vec<usize>,
    /// Concurrent instance cap; 255 means unlimited.
    #[serde(default = "default_instance_limit")]
    pub instance_limit: u8,
    #[serde(default)]
    pub limit_behavior: LimitBehavior,
}

const fn default_instance_limit() -> u8 {
    NO_INSTANCE_LIMIT
}

impl CueDefinition {
    pub fn new(name: impl Into<String>, sounds: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            sounds,
            instance_limit: NO_INSTANCE_LIMIT,
            limit_behavior: LimitBehavior::default(),
        }
    }

    /// Get the instance limit, if one applies.
    pub const fn instance_cap(&self) -> Option<usize> {
        if self.instance_limit > 0 && self.instance_limit < NO_INSTANCE_LIMIT {
            Some(self.instance_limit as usize)
        } else {
            None
        }
    }
}
