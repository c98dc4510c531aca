//! Sound category definitions.

use serde::{Deserialize, Serialize};

use super::sound::NO_INSTANCE_LIMIT;

/// A named group of sounds sharing volume, fades and an instance cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub name: String,
    /// Concurrent cue cap; 255 means unlimited.
    #[serde(default = "default_max_instances")]
    pub max_instances: u8,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub fade_in_secs: f32,
    #[serde(default)]
    pub fade_out_secs: f32,
}

const fn default_max_instances() -> u8 {
    NO_INSTANCE_LIMIT
}

const fn default_volume() -> f32 {
    1.0
}

impl CategoryDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_instances: NO_INSTANCE_LIMIT,
            volume: 1.0,
            fade_in_secs: 0.0,
            fade_out_secs: 0.0,
        }
    }

    /// Get the instance cap, if one applies.
    pub const fn instance_cap(&self) -> Option<usize> {
        if self.max_instances == 0 || self.max_instances == NO_INSTANCE_LIMIT {
            None
        } else {
            Some(self.max_instances as usize)
        }
    }
}
