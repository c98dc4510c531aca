//! State-variable filter applied to PCM buffers before submission.

use std::f32::consts::PI;

use cuebank_core::{FilterMode, FilterSettings};

/// Chamberlin state-variable filter with per-channel state.
#[derive(Debug, Clone)]
pub struct StateVariableFilter {
    mode: FilterMode,
    coefficient: f32,
    damping: f32,
    enabled: bool,
    /// Band and low outputs of the previous sample, per channel.
    state: [[f32; 2]; 2],
}

impl StateVariableFilter {
    pub fn new(settings: FilterSettings, sample_rate: u32) -> Self {
        let mut filter = Self {
            mode: settings.mode,
            coefficient: 0.0,
            damping: 0.0,
            enabled: false,
            state: [[0.0; 2]; 2],
        };
        filter.configure(settings, sample_rate);
        filter
    }

    /// Change parameters, keeping the running state.
    pub fn configure(&mut self, settings: FilterSettings, sample_rate: u32) {
        self.mode = settings.mode;
        self.enabled = settings.q_factor > 0.0 && settings.frequency.is_finite() && sample_rate > 0;
        if !self.enabled {
            return;
        }

        let normalized = (settings.frequency / sample_rate as f32).clamp(0.0, 0.5);
        self.coefficient = (2.0 * (PI * normalized).sin()).min(1.0);
        self.damping = 1.0 / settings.q_factor;
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn reset(&mut self) {
        self.state = [[0.0; 2]; 2];
    }

    /// Filter interleaved signed 16-bit little-endian samples in place.
    pub fn process_pcm16(&mut self, pcm: &mut [u8], channels: usize) {
        if !self.enabled {
            return;
        }
        let channels = channels.clamp(1, 2);

        for (i, bytes) in pcm.chunks_exact_mut(2).enumerate() {
            let x = f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) / 32768.0;
            let y = self.tick(i % channels, x);
            let out = ((y * 32767.0 + 0.5) as i32).clamp(i32::from(i16::MIN), i32::from(i16::MAX));
            bytes.copy_from_slice(&(out as i16).to_le_bytes());
        }
    }

    /// Filter interleaved unsigned 8-bit samples in place.
    pub fn process_pcm8(&mut self, pcm: &mut [u8], channels: usize) {
        if !self.enabled {
            return;
        }
        let channels = channels.clamp(1, 2);

        for (i, sample) in pcm.iter_mut().enumerate() {
            let x = (f32::from(*sample) - 128.0) / 128.0;
            let y = self.tick(i % channels, x);
            let out = ((y * 127.0 + 0.5) as i32).clamp(-128, 127);
            *sample = (out + 128) as u8;
        }
    }

    fn tick(&mut self, channel: usize, x: f32) -> f32 {
        let [band, low] = self.state[channel];

        let high = x - low - self.damping * band;
        let band = self.coefficient.mul_add(high, band);
        let low = self.coefficient.mul_add(band, low);
        self.state[channel] = [band, low];

        match self.mode {
            FilterMode::LowPass => low,
            FilterMode::BandPass => band,
            FilterMode::HighPass => high,
        }
    }
}
