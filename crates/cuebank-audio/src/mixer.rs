//! Software voice mixer.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use cuebank_core::{Error, Result};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::filter::StateVariableFilter;
use crate::signal::Signal;
use crate::sink::{VoiceFormat, VoiceHandle, VoiceParams, VoiceSink, VoiceState};

/// How submitted buffers get consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumeMode {
    /// Buffers finish as `render` plays them, or when `complete` is called.
    #[default]
    Manual,
    /// Buffers finish as soon as they are submitted.
    Immediate,
}

struct Voice {
    format: VoiceFormat,
    state: VoiceState,
    queue: VecDeque<Vec<u8>>,
    /// Fractional frame position inside the front buffer.
    position: f64,
    finished_pending: usize,
    submitted: u64,
    finished: u64,
    params: VoiceParams,
    filter: Option<StateVariableFilter>,
    signal: Signal,
}

impl Voice {
    fn finish(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.finished_pending += count;
        self.finished += count as u64;
        self.signal.notify();
    }

    fn frame(&self, buffer: &[u8], index: usize, channel: usize) -> f32 {
        let channels = usize::from(self.format.channels);
        let channel = channel.min(channels - 1);
        if self.format.bits_per_sample == 8 {
            let sample = buffer[index * channels + channel];
            (f32::from(sample) - 128.0) / 128.0
        } else {
            let at = (index * channels + channel) * 2;
            f32::from(i16::from_le_bytes([buffer[at], buffer[at + 1]])) / 32768.0
        }
    }

    /// Mix this voice into `out`, finishing buffers as they are used up.
    fn render(&mut self, out: &mut [f32], channels: usize, sample_rate: u32) {
        let step = f64::from(self.format.sample_rate) / f64::from(sample_rate)
            * f64::from(self.params.playback_rate());
        let gain = self.params.volume;
        let frame_bytes = self.format.bytes_per_frame();
        let source_channels = usize::from(self.format.channels);

        let mut finished = 0;
        for frame in out.chunks_exact_mut(channels) {
            let Some(front) = self.queue.front() else {
                break;
            };
            let frames = front.len() / frame_bytes;
            let index = self.position as usize;

            if index < frames {
                for (c, sample) in frame.iter_mut().enumerate() {
                    let value = match (source_channels, c) {
                        (1, _) => self.frame(front, index, 0),
                        (_, 0 | 1) if channels > 1 => self.frame(front, index, c),
                        (_, 0) => (self.frame(front, index, 0) + self.frame(front, index, 1)) * 0.5,
                        _ => 0.0,
                    };
                    *sample += value * gain;
                }
            }

            self.position += step;
            while let Some(front) = self.queue.front() {
                let frames = (front.len() / frame_bytes) as f64;
                if self.position < frames {
                    break;
                }
                self.position -= frames;
                self.queue.pop_front();
                finished += 1;
            }
        }
        self.finish(finished);
    }
}

/// [`VoiceSink`] that mixes voices in software.
///
/// `render` pulls mixed frames for an output device. Tests drive it directly
/// or use [`ConsumeMode::Immediate`].
pub struct Mixer {
    voices: Mutex<HashMap<u64, Voice>>,
    next_id: AtomicU64,
    mode: ConsumeMode,
    submitted: AtomicU64,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(ConsumeMode::Manual)
    }
}

impl Mixer {
    pub fn new(mode: ConsumeMode) -> Self {
        Self {
            voices: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            mode,
            submitted: AtomicU64::new(0),
        }
    }

    pub const fn mode(&self) -> ConsumeMode {
        self.mode
    }

    fn with_voice<T>(&self, voice: VoiceHandle, f: impl FnOnce(&mut Voice) -> T) -> Result<T> {
        let mut voices = self.voices.lock();
        let entry = voices.get_mut(&voice.0).ok_or(Error::VoiceNotFound(voice.0))?;
        Ok(f(entry))
    }

    /// Finish up to `count` queued buffers. Returns how many finished.
    pub fn complete(&self, voice: VoiceHandle, count: usize) -> Result<usize> {
        self.with_voice(voice, |v| {
            let n = count.min(v.queue.len());
            v.queue.drain(..n);
            if v.queue.is_empty() {
                v.position = 0.0;
            }
            v.finish(n);
            n
        })
    }

    /// Mix every playing voice into interleaved `out`, overwriting it.
    pub fn render(&self, out: &mut [f32], channels: usize, sample_rate: u32) {
        out.fill(0.0);
        if channels == 0 || sample_rate == 0 {
            return;
        }

        let mut voices = self.voices.lock();
        for voice in voices.values_mut() {
            if voice.state == VoiceState::Playing {
                voice.render(out, channels, sample_rate);
            }
        }
    }

    /// Buffers submitted across all voices, released ones included.
    pub fn total_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    pub fn voice_count(&self) -> usize {
        self.voices.lock().len()
    }

    /// Buffers submitted to `voice`.
    pub fn submitted_count(&self, voice: VoiceHandle) -> Result<u64> {
        self.with_voice(voice, |v| v.submitted)
    }

    /// Buffers `voice` has finished.
    pub fn finished_count(&self, voice: VoiceHandle) -> Result<u64> {
        self.with_voice(voice, |v| v.finished)
    }

    /// Buffers waiting to play on `voice`.
    pub fn queued(&self, voice: VoiceHandle) -> Result<usize> {
        self.with_voice(voice, |v| v.queue.len())
    }

    pub fn params(&self, voice: VoiceHandle) -> Result<VoiceParams> {
        self.with_voice(voice, |v| v.params)
    }
}

impl VoiceSink for Mixer {
    fn create_voice(&self, format: VoiceFormat, signal: Signal) -> Result<VoiceHandle> {
        if format.compressed {
            return Err(Error::UnsupportedFormat(
                "mixer voices take decoded PCM only".into(),
            ));
        }
        if !(1..=2).contains(&format.channels)
            || !matches!(format.bits_per_sample, 8 | 16)
            || format.sample_rate == 0
        {
            return Err(Error::UnsupportedFormat(format!(
                "{} channel {}-bit PCM at {} Hz",
                format.channels, format.bits_per_sample, format.sample_rate
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.voices.lock().insert(
            id,
            Voice {
                format,
                state: VoiceState::Stopped,
                queue: VecDeque::new(),
                position: 0.0,
                finished_pending: 0,
                submitted: 0,
                finished: 0,
                params: VoiceParams::default(),
                filter: None,
                signal,
            },
        );
        debug!(voice = id, ?format, "Voice created");
        Ok(VoiceHandle(id))
    }

    fn submit_buffer(&self, voice: VoiceHandle, pcm: &[u8]) -> Result<()> {
        let mode = self.mode;
        self.with_voice(voice, |v| {
            let mut buffer = pcm.to_vec();
            if let Some(filter) = v.filter.as_mut() {
                let channels = usize::from(v.format.channels);
                if v.format.bits_per_sample == 8 {
                    filter.process_pcm8(&mut buffer, channels);
                } else {
                    filter.process_pcm16(&mut buffer, channels);
                }
            }

            v.submitted += 1;
            match mode {
                ConsumeMode::Manual => v.queue.push_back(buffer),
                ConsumeMode::Immediate => v.finish(1),
            }
            trace!(voice = voice.0, bytes = pcm.len(), "Buffer submitted");
        })?;
        self.submitted.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn buffers_finished(&self, voice: VoiceHandle) -> Result<usize> {
        self.with_voice(voice, |v| std::mem::take(&mut v.finished_pending))
    }

    fn play(&self, voice: VoiceHandle) -> Result<()> {
        self.with_voice(voice, |v| v.state = VoiceState::Playing)
    }

    fn pause(&self, voice: VoiceHandle) -> Result<()> {
        self.with_voice(voice, |v| {
            if v.state == VoiceState::Playing {
                v.state = VoiceState::Paused;
            }
        })
    }

    fn resume(&self, voice: VoiceHandle) -> Result<()> {
        self.with_voice(voice, |v| {
            if v.state == VoiceState::Paused {
                v.state = VoiceState::Playing;
            }
        })
    }

    fn stop(&self, voice: VoiceHandle) -> Result<()> {
        self.with_voice(voice, |v| {
            v.state = VoiceState::Stopped;
            let flushed = v.queue.len();
            v.queue.clear();
            v.position = 0.0;
            v.finish(flushed);
        })
    }

    fn set_params(&self, voice: VoiceHandle, params: &VoiceParams) -> Result<()> {
        self.with_voice(voice, |v| {
            v.params = VoiceParams {
                volume: params.volume.max(0.0),
                ..*params
            };
            let rate = v.format.sample_rate;
            match (params.filter, v.filter.as_mut()) {
                (Some(settings), Some(filter)) => filter.configure(settings, rate),
                (Some(settings), None) => v.filter = Some(StateVariableFilter::new(settings, rate)),
                (None, _) => v.filter = None,
            }
        })
    }

    fn state(&self, voice: VoiceHandle) -> Result<VoiceState> {
        self.with_voice(voice, |v| v.state)
    }

    fn release(&self, voice: VoiceHandle) -> Result<()> {
        if self.voices.lock().remove(&voice.0).is_none() {
            return Err(Error::VoiceNotFound(voice.0));
        }
        debug!(voice = voice.0, "Voice released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn mono16(mixer: &Mixer, rate: u32) -> (VoiceHandle, Signal) {
        let signal = Signal::new();
        let voice = mixer
            .create_voice(VoiceFormat::pcm(1, rate, 16), signal.clone())
            .unwrap();
        (voice, signal)
    }

    fn constant(value: i16, frames: usize) -> Vec<u8> {
        std::iter::repeat(value.to_le_bytes()).take(frames).flatten().collect()
    }

    #[test]
    fn test_manual_complete() {
        let mixer = Mixer::default();
        let (voice, signal) = mono16(&mixer, 44100);

        for _ in 0..3 {
            mixer.submit_buffer(voice, &[0; 8]).unwrap();
        }
        assert_eq!(mixer.buffers_finished(voice).unwrap(), 0);

        assert_eq!(mixer.complete(voice, 2).unwrap(), 2);
        assert!(signal.wait(Duration::from_millis(10)));
        assert_eq!(mixer.buffers_finished(voice).unwrap(), 2);
        assert_eq!(mixer.buffers_finished(voice).unwrap(), 0);
        assert_eq!(mixer.queued(voice).unwrap(), 1);
    }

    #[test]
    fn test_immediate_mode() {
        let mixer = Mixer::new(ConsumeMode::Immediate);
        let (voice, signal) = mono16(&mixer, 44100);

        mixer.submit_buffer(voice, &[0; 4]).unwrap();
        mixer.submit_buffer(voice, &[0; 4]).unwrap();
        assert!(signal.try_take());
        assert_eq!(mixer.buffers_finished(voice).unwrap(), 2);
        assert_eq!(mixer.total_submitted(), 2);
    }

    #[test]
    fn test_render_mono_to_stereo() {
        let mixer = Mixer::default();
        let (voice, _) = mono16(&mixer, 48000);
        mixer.submit_buffer(voice, &constant(16384, 4)).unwrap();

        let mut out = [1.0f32; 8];
        mixer.render(&mut out, 2, 48000);
        assert!(out.iter().all(|&s| s == 0.0), "stopped voices are silent");

        mixer.play(voice).unwrap();
        mixer
            .set_params(voice, &VoiceParams { volume: 0.5, ..VoiceParams::default() })
            .unwrap();
        mixer.render(&mut out, 2, 48000);
        assert!(out.iter().all(|&s| s == 0.25));
        assert_eq!(mixer.buffers_finished(voice).unwrap(), 1);
    }

    #[test]
    fn test_pitch_consumes_faster() {
        let mixer = Mixer::default();
        let (voice, _) = mono16(&mixer, 48000);
        mixer.submit_buffer(voice, &constant(100, 8)).unwrap();
        mixer.submit_buffer(voice, &constant(100, 8)).unwrap();
        mixer.play(voice).unwrap();
        mixer
            .set_params(voice, &VoiceParams { pitch: 1.0, ..VoiceParams::default() })
            .unwrap();

        let mut out = [0.0f32; 8];
        mixer.render(&mut out, 1, 48000);
        assert_eq!(mixer.buffers_finished(voice).unwrap(), 2);
    }

    #[test]
    fn test_stop_flushes_queue() {
        let mixer = Mixer::default();
        let (voice, _) = mono16(&mixer, 22050);
        mixer.submit_buffer(voice, &[0; 4]).unwrap();
        mixer.submit_buffer(voice, &[0; 4]).unwrap();
        mixer.play(voice).unwrap();

        mixer.stop(voice).unwrap();
        assert_eq!(mixer.state(voice).unwrap(), VoiceState::Stopped);
        assert_eq!(mixer.buffers_finished(voice).unwrap(), 2);
        assert_eq!(mixer.queued(voice).unwrap(), 0);
    }

    #[test]
    fn test_pause_resume_and_release() {
        let mixer = Mixer::default();
        let (voice, _) = mono16(&mixer, 22050);

        mixer.pause(voice).unwrap();
        assert_eq!(mixer.state(voice).unwrap(), VoiceState::Stopped);
        mixer.play(voice).unwrap();
        mixer.pause(voice).unwrap();
        assert_eq!(mixer.state(voice).unwrap(), VoiceState::Paused);
        mixer.resume(voice).unwrap();
        assert_eq!(mixer.state(voice).unwrap(), VoiceState::Playing);

        mixer.release(voice).unwrap();
        assert!(matches!(mixer.state(voice), Err(Error::VoiceNotFound(_))));
        assert!(matches!(mixer.release(voice), Err(Error::VoiceNotFound(_))));
        assert_eq!(mixer.voice_count(), 0);
    }

    #[test]
    fn test_rejects_unsupported_formats() {
        let mixer = Mixer::default();
        let compressed = VoiceFormat {
            compressed: true,
            ..VoiceFormat::pcm(2, 44100, 16)
        };
        assert!(matches!(
            mixer.create_voice(compressed, Signal::new()),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            mixer.create_voice(VoiceFormat::pcm(6, 44100, 16), Signal::new()),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
