//! Core domain types for cuebank.

pub mod category;
pub mod curve;
pub mod format;
pub mod manifest;
pub mod sound;
pub mod spatial;
pub mod variable;

pub use category::CategoryDefinition;
pub use curve::{RpcCurve, RpcParameter, RpcPoint};
pub use format::{MiniFormat, SourceFormat, WaveCodec, FLAG_16BIT, FLAG_ADPCM, FLAG_STEREO};
pub use manifest::{
    GlobalSettings, ProjectManifest, ResolvedFormat, SoundBankDefinition, WaveBankDefinition,
    WaveEntryDefinition,
};
pub use sound::{
    CueDefinition, FilterMode, FilterSettings, LimitBehavior, SoundDefinition, WaveRef,
    INFINITE_LOOPS, NO_INSTANCE_LIMIT,
};
pub use spatial::{AudioEmitter, AudioListener, Vector3};
pub use variable::{RpcVariable, DISTANCE_VARIABLE, ORIENTATION_ANGLE_VARIABLE};
