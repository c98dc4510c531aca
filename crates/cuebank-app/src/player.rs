//! Loads a project into an engine and plays cues from it.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use cuebank_audio::{AudioEngine, Cue, EngineConfig, SoundBank, VoiceSink};
use cuebank_core::ProjectManifest;
use tracing::{debug, info};

/// Engine tick interval.
pub const TICK: Duration = Duration::from_millis(16);

pub struct Player {
    engine: AudioEngine,
    banks: Vec<SoundBank>,
}

impl Player {
    /// Build an engine for `manifest`, reading wave data relative to `base_dir`.
    pub fn load(
        sink: Arc<dyn VoiceSink>,
        manifest: &ProjectManifest,
        base_dir: &Path,
        config: &EngineConfig,
    ) -> Result<Self> {
        let engine = AudioEngine::new(sink, &manifest.settings, config)
            .context("Failed to create audio engine")?;

        for wave_bank in &manifest.wave_banks {
            engine
                .load_wave_bank(wave_bank, base_dir)
                .with_context(|| format!("Failed to load wave bank '{}'", wave_bank.name))?;
        }

        let banks = manifest
            .sound_banks
            .iter()
            .map(|definition| {
                SoundBank::new(&engine, definition.clone())
                    .with_context(|| format!("Failed to load sound bank '{}'", definition.name))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { engine, banks })
    }

    pub const fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    /// Find a cue by name in the first bank that defines it.
    pub fn cue(&self, name: &str) -> Result<Cue> {
        let bank = self
            .banks
            .iter()
            .find(|bank| bank.cue_names().iter().any(|n| n == name))
            .with_context(|| format!("No sound bank defines cue '{name}'"))?;
        Ok(bank.get_cue(name)?)
    }

    /// Play a cue and tick the engine until it stops. Returns the play time.
    ///
    /// Fails if the cue's instance limit dropped the request.
    pub fn play_until_stopped(&self, name: &str) -> Result<Duration> {
        let cue = self.cue(name)?;
        cue.play().with_context(|| format!("Failed to play cue '{name}'"))?;
        if !cue.is_playing() {
            bail!("Cue '{name}' did not start; its instance limit is reached");
        }
        info!(cue = name, "Playing");

        let started = Instant::now();
        let mut last = started;
        while cue.is_playing() {
            std::thread::sleep(TICK);
            let now = Instant::now();
            self.engine.update(now - last);
            last = now;

            if let Some(elapsed) = cue.elapsed() {
                debug!(cue = name, elapsed = elapsed.as_secs_f32(), "Tick");
            }
        }

        let played = started.elapsed();
        info!(cue = name, seconds = played.as_secs_f32(), "Cue stopped");
        Ok(played)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cuebank_audio::{ConsumeMode, Mixer};

    const MANIFEST: &str = r#"{
        "settings": {
            "categories": [{ "name": "Effects", "max_instances": 4 }]
        },
        "wave_banks": [{
            "name": "Waves",
            "entries": [{ "file": "blip.raw", "format": "mono16", "sample_rate": 8000, "block_align": 2 }]
        }],
        "sound_banks": [{
            "name": "Sfx",
            "sounds": [{ "category": "Effects", "wave": { "bank": "Waves", "index": 0 }, "loop_count": 1 }],
            "cues": [{ "name": "Blip", "sounds": [0] }]
        }]
    }"#;

    fn project_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("cuebank-app-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("blip.raw"), vec![0u8; 4000]).unwrap();
        dir
    }

    fn config() -> EngineConfig {
        EngineConfig::from_json(r#"{"stream":{"buffer_size":1024,"wait_timeout_ms":10},"rng_seed":1}"#)
            .unwrap()
    }

    #[test]
    fn test_play_until_stopped() {
        let dir = project_dir("play");
        let manifest = ProjectManifest::from_json(MANIFEST).unwrap();
        let mixer = Arc::new(Mixer::new(ConsumeMode::Immediate));

        let player = Player::load(mixer.clone(), &manifest, &dir, &config()).unwrap();
        player.play_until_stopped("Blip").unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        // Two passes of 4000 bytes in 1024 byte buffers.
        assert_eq!(mixer.total_submitted(), 8);
        assert_eq!(player.engine().active_cue_count(), 0);
    }

    #[test]
    fn test_dropped_request_returns() {
        let dir = project_dir("limit");
        let json = MANIFEST.replace(
            r#""sounds": [0] }"#,
            r#""sounds": [0], "instance_limit": 1, "limit_behavior": "fail_to_play" }"#,
        );
        let manifest = ProjectManifest::from_json(&json).unwrap();
        let mixer = Arc::new(Mixer::new(ConsumeMode::Manual));

        let player = Player::load(mixer, &manifest, &dir, &config()).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        let held = player.cue("Blip").unwrap();
        held.play().unwrap();

        let err = player.play_until_stopped("Blip").unwrap_err();
        assert!(err.to_string().contains("did not start"));
        assert!(held.is_playing());
    }

    #[test]
    fn test_unknown_cue() {
        let dir = project_dir("unknown");
        let manifest = ProjectManifest::from_json(MANIFEST).unwrap();
        let mixer = Arc::new(Mixer::new(ConsumeMode::Manual));

        let player = Player::load(mixer, &manifest, &dir, &config()).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        assert!(player.cue("Missing").is_err());
    }

    #[test]
    fn test_missing_wave_file() {
        let manifest = ProjectManifest::from_json(MANIFEST).unwrap();
        let mixer = Arc::new(Mixer::new(ConsumeMode::Manual));
        let err = Player::load(mixer, &manifest, Path::new("/nonexistent"), &config())
            .err()
            .unwrap();
        assert!(err.to_string().contains("Waves"));
    }
}
