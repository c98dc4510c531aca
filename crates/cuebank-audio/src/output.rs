//! Audio output using cpal.

use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, SampleRate, Stream, StreamConfig,
};
use crossbeam_channel::{bounded, Sender};
use cuebank_core::{Error, Result};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::OutputConfig;
use crate::mixer::{ConsumeMode, Mixer};
use crate::signal::Signal;
use crate::sink::{VoiceFormat, VoiceHandle, VoiceParams, VoiceSink, VoiceState};

/// Process-scoped output service.
///
/// A dedicated thread owns the cpal stream (it is not `Send`) and pulls mixed
/// frames from a [`Mixer`]. Construct once at startup, share it as a
/// [`VoiceSink`], and call [`shutdown`](Self::shutdown) when done.
pub struct OutputDevice {
    mixer: Arc<Mixer>,
    config: OutputConfig,
    device_name: String,
    shutdown_tx: Sender<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl OutputDevice {
    /// Open the configured device, or the host default.
    pub fn start(requested: &OutputConfig) -> Result<Arc<Self>> {
        let mixer = Arc::new(Mixer::new(ConsumeMode::Manual));
        let (ready_tx, ready_rx) = bounded::<Result<(OutputConfig, String)>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let thread_mixer = Arc::clone(&mixer);
        let thread_config = requested.clone();
        let thread = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match open_stream(&thread_config, thread_mixer) {
                Ok((stream, actual, name)) => {
                    let _ = ready_tx.send(Ok((actual, name)));
                    let _ = shutdown_rx.recv();
                    drop(stream);
                    debug!("Audio output thread exiting");
                }
                Err(e) => {
                    error!("Failed to initialize audio output: {e}");
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {e}")))?;

        let (config, device_name) = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread exited during startup".to_string()))??;

        info!(
            "Audio output initialized: {} Hz, {} channels, device: {}",
            config.sample_rate, config.channels, device_name
        );

        Ok(Arc::new(Self {
            mixer,
            config,
            device_name,
            shutdown_tx,
            thread: Mutex::new(Some(thread)),
        }))
    }

    /// Close the stream and join the output thread. Idempotent.
    pub fn shutdown(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        let _ = self.shutdown_tx.try_send(());
        if thread.join().is_err() {
            warn!("Audio output thread panicked");
        }
        info!("Audio output shut down");
    }

    pub const fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// Get the negotiated output configuration.
    pub const fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.config.channels
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl VoiceSink for OutputDevice {
    fn create_voice(&self, format: VoiceFormat, signal: Signal) -> Result<VoiceHandle> {
        self.mixer.create_voice(format, signal)
    }

    fn submit_buffer(&self, voice: VoiceHandle, pcm: &[u8]) -> Result<()> {
        self.mixer.submit_buffer(voice, pcm)
    }

    fn buffers_finished(&self, voice: VoiceHandle) -> Result<usize> {
        self.mixer.buffers_finished(voice)
    }

    fn play(&self, voice: VoiceHandle) -> Result<()> {
        self.mixer.play(voice)
    }

    fn pause(&self, voice: VoiceHandle) -> Result<()> {
        self.mixer.pause(voice)
    }

    fn resume(&self, voice: VoiceHandle) -> Result<()> {
        self.mixer.resume(voice)
    }

    fn stop(&self, voice: VoiceHandle) -> Result<()> {
        self.mixer.stop(voice)
    }

    fn set_params(&self, voice: VoiceHandle, params: &VoiceParams) -> Result<()> {
        self.mixer.set_params(voice, params)
    }

    fn state(&self, voice: VoiceHandle) -> Result<VoiceState> {
        self.mixer.state(voice)
    }

    fn release(&self, voice: VoiceHandle) -> Result<()> {
        self.mixer.release(voice)
    }
}

fn find_device(requested: &OutputConfig) -> Result<Device> {
    let host = cpal::default_host();

    match &requested.device {
        Some(name) => host
            .output_devices()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to list devices: {e}")))?
            .find(|d| d.name().is_ok_and(|n| &n == name))
            .ok_or_else(|| Error::DeviceUnavailable(format!("No output device named '{name}'"))),
        None => host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("No output device found".to_string())),
    }
}

/// Prefer a device config matching the requested layout, else the default.
fn choose_config(device: &Device, requested: &OutputConfig) -> Result<(SampleFormat, StreamConfig)> {
    let matching = device.supported_output_configs().ok().and_then(|mut configs| {
        configs.find(|c| {
            c.channels() == requested.channels
                && c.min_sample_rate().0 <= requested.sample_rate
                && c.max_sample_rate().0 >= requested.sample_rate
        })
    });

    let supported = match matching {
        Some(range) => range.with_sample_rate(SampleRate(requested.sample_rate)),
        None => device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?,
    };

    debug!("Supported output config: {:?}", supported);
    Ok((supported.sample_format(), supported.into()))
}

fn open_stream(requested: &OutputConfig, mixer: Arc<Mixer>) -> Result<(Stream, OutputConfig, String)> {
    let device = find_device(requested)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using audio output device: {device_name}");

    let (sample_format, config) = choose_config(&device, requested)?;

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer)?,
        _ => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {sample_format:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

    let actual = OutputConfig {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
        buffer_size: requested.buffer_size,
        device: Some(device_name.clone()),
    };
    Ok((stream, actual, device_name))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    mixer: Arc<Mixer>,
) -> Result<Stream> {
    let channels = usize::from(config.channels);
    let sample_rate = config.sample_rate.0;
    let mut scratch: Vec<f32> = Vec::new();

    let err_fn = |err| {
        error!("Audio stream error: {err}");
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                mixer.render(&mut scratch, channels, sample_rate);

                for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                    // Soft clipping using tanh for smooth limiting
                    let limited = if s.abs() > 0.9 { s.tanh() } else { s };
                    *out = T::from_sample(limited);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}

/// Get the default output device name.
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device().and_then(|d| d.name().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices() {
        // This test may fail on CI without audio hardware
        let result = list_output_devices();
        // Just ensure it doesn't panic
        let _ = result;
    }

    #[test]
    fn test_unknown_device_rejected() {
        let config = OutputConfig {
            device: Some("no such output device".to_string()),
            ..OutputConfig::default()
        };
        assert!(OutputDevice::start(&config).is_err());
    }
}
