//! # cuebank-audio
//!
//! Streaming playback and the cue runtime for cuebank.
//!
//! Features:
//! - MS-ADPCM block decoding with seekable, caching cursors
//! - One worker thread per stream feeding a fixed ring of buffers
//! - Software mixer and low-latency cpal output
//! - Cue engine with RPC curves, categories and instance limits

pub mod adpcm;
pub mod buffer;
pub mod config;
pub mod filter;
pub mod mixer;
pub mod output;
pub mod signal;
pub mod sink;
pub mod source;
pub mod stream;
pub mod xact;

pub use config::{EngineConfig, OutputConfig, StreamConfig};
pub use mixer::{ConsumeMode, Mixer};
pub use output::OutputDevice;
pub use sink::{VoiceFormat, VoiceHandle, VoiceParams, VoiceSink, VoiceState};
pub use source::{CompressedAudioSource, DecodeCursor};
pub use stream::{LoopRegion, StopReason, StreamEvent, StreamHandle, StreamRequest, StreamState};
pub use xact::{AudioCategory, AudioEngine, Cue, CueState, SoundBank, StopOptions, WaveBank};
