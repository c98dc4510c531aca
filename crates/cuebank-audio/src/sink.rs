//! Output voice contract consumed by the streaming scheduler.

use cuebank_core::{FilterSettings, Result};

use crate::signal::Signal;

/// Opaque id of a voice created by a [`VoiceSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle(pub u64);

/// PCM layout a voice consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Whether submitted buffers hold compressed blocks rather than PCM.
    pub compressed: bool,
}

impl VoiceFormat {
    pub const fn pcm(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Self {
        Self {
            channels,
            sample_rate,
            bits_per_sample,
            compressed: false,
        }
    }

    pub const fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Mix parameters pushed to a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceParams {
    /// Linear gain, never negative.
    pub volume: f32,
    /// Octaves; playback rate scales by `2^pitch`.
    pub pitch: f32,
    /// Linear reverb send level.
    pub reverb_mix: f32,
    pub filter: Option<FilterSettings>,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 0.0,
            reverb_mix: 0.0,
            filter: None,
        }
    }
}

impl VoiceParams {
    /// Rate multiplier for the pitch offset.
    pub fn playback_rate(&self) -> f32 {
        self.pitch.exp2()
    }
}

/// Device that plays submitted PCM buffers on streaming voices.
///
/// Every method is non-blocking. Buffers play in submission order and
/// `signal` is raised each time one finishes.
pub trait VoiceSink: Send + Sync {
    fn create_voice(&self, format: VoiceFormat, signal: Signal) -> Result<VoiceHandle>;

    /// Queue a buffer. The sink copies the bytes.
    fn submit_buffer(&self, voice: VoiceHandle, pcm: &[u8]) -> Result<()>;

    /// Buffers finished since the previous call.
    fn buffers_finished(&self, voice: VoiceHandle) -> Result<usize>;

    fn play(&self, voice: VoiceHandle) -> Result<()>;

    fn pause(&self, voice: VoiceHandle) -> Result<()>;

    fn resume(&self, voice: VoiceHandle) -> Result<()>;

    /// Stop and flush queued buffers; flushed buffers count as finished.
    fn stop(&self, voice: VoiceHandle) -> Result<()>;

    fn set_params(&self, voice: VoiceHandle, params: &VoiceParams) -> Result<()>;

    fn state(&self, voice: VoiceHandle) -> Result<VoiceState>;

    /// Destroy the voice and its buffers.
    fn release(&self, voice: VoiceHandle) -> Result<()>;
}
