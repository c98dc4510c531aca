//! Category bookkeeping and fades.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::Arc;

use cuebank_core::{CategoryDefinition, Result};
use tracing::debug;

use super::cue::{CueId, StopOptions};
use super::engine::EngineInner;
use crate::sink::VoiceParams;
use crate::stream::StreamHandle;

/// Linear gain ramp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Fade {
    elapsed: f32,
    duration: f32,
    rising: bool,
}

impl Fade {
    pub(crate) const fn fade_in(duration: f32) -> Self {
        Self {
            elapsed: 0.0,
            duration,
            rising: true,
        }
    }

    pub(crate) const fn fade_out(duration: f32) -> Self {
        Self {
            elapsed: 0.0,
            duration,
            rising: false,
        }
    }

    pub(crate) fn gain(&self) -> f32 {
        let t = if self.duration > 0.0 {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        if self.rising {
            t
        } else {
            1.0 - t
        }
    }

    /// Advance by `dt` seconds. Returns true once the ramp is complete.
    pub(crate) fn advance(&mut self, dt: f32) -> bool {
        self.elapsed += dt;
        self.elapsed >= self.duration
    }
}

/// A stream detached from its cue, ramping down before it stops.
pub(crate) struct FadeOut {
    stream: StreamHandle,
    params: VoiceParams,
    fade: Fade,
}

impl FadeOut {
    pub(crate) fn new(stream: StreamHandle, params: VoiceParams, duration: f32) -> Self {
        Self {
            stream,
            params,
            fade: Fade::fade_out(duration),
        }
    }

    /// Step the ramp. Returns false once the stream has been stopped.
    pub(crate) fn advance(&mut self, dt: f32) -> bool {
        if self.fade.advance(dt) || self.stream.is_stopped() {
            self.stream.stop();
            return false;
        }

        let params = VoiceParams {
            volume: self.params.volume * self.fade.gain(),
            ..self.params
        };
        if let Err(e) = self.stream.set_params(&params) {
            debug!("Fade-out voice already gone: {e}");
            self.stream.stop();
            return false;
        }
        true
    }
}

/// Runtime state of one category.
#[derive(Debug, Clone)]
pub(crate) struct CategoryState {
    pub(crate) definition: CategoryDefinition,
    pub(crate) volume: f32,
    /// Playing cues, oldest first.
    playing: Vec<CueId>,
}

impl CategoryState {
    pub(crate) fn new(definition: CategoryDefinition) -> Self {
        Self {
            volume: definition.volume.max(0.0),
            definition,
            playing: Vec::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.definition.name
    }

    pub(crate) fn add(&mut self, cue: CueId) {
        if !self.playing.contains(&cue) {
            self.playing.push(cue);
        }
    }

    pub(crate) fn remove(&mut self, cue: CueId) {
        self.playing.retain(|&c| c != cue);
    }

    pub(crate) fn playing(&self) -> &[CueId] {
        &self.playing
    }

    pub(crate) fn oldest(&self) -> Option<CueId> {
        self.playing.first().copied()
    }

    /// True when another cue would exceed the instance cap.
    pub(crate) fn is_full(&self) -> bool {
        self.definition
            .instance_cap()
            .is_some_and(|cap| self.playing.len() >= cap)
    }

    pub(crate) fn fade_in_secs(&self) -> f32 {
        self.definition.fade_in_secs.max(0.0)
    }

    pub(crate) fn fade_out_secs(&self) -> f32 {
        self.definition.fade_out_secs.max(0.0)
    }
}

/// Handle to a category owned by an [`AudioEngine`](super::AudioEngine).
#[derive(Clone)]
pub struct AudioCategory {
    engine: Arc<EngineInner>,
    index: usize,
    name: String,
}

impl AudioCategory {
    pub(crate) fn new(engine: Arc<EngineInner>, index: usize, name: String) -> Self {
        Self {
            engine,
            index,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn volume(&self) -> f32 {
        self.engine.registry.lock().categories[self.index].volume
    }

    /// Set the linear volume and push it to every playing cue.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        let mut reg = self.engine.registry.lock();
        reg.categories[self.index].volume = volume.max(0.0);

        let playing = reg.categories[self.index].playing().to_vec();
        for id in playing {
            self.engine.push_params(&mut reg, id)?;
        }
        Ok(())
    }

    pub fn playing_count(&self) -> usize {
        self.engine.registry.lock().categories[self.index].playing().len()
    }

    pub fn stop(&self, options: StopOptions) {
        let mut reg = self.engine.registry.lock();
        let playing = reg.categories[self.index].playing().to_vec();
        debug!(category = %self.name, count = playing.len(), "Stopping category");
        for id in playing {
            reg.stop_cue(id, options);
        }
    }

    pub fn pause(&self) -> Result<()> {
        let mut reg = self.engine.registry.lock();
        let playing = reg.categories[self.index].playing().to_vec();
        for id in playing {
            reg.pause_cue(id)?;
        }
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut reg = self.engine.registry.lock();
        let playing = reg.categories[self.index].playing().to_vec();
        for id in playing {
            reg.resume_cue(id)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AudioCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCategory")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_ramps() {
        let mut fade = Fade::fade_in(1.0);
        assert_eq!(fade.gain(), 0.0);
        assert!(!fade.advance(0.25));
        assert!((fade.gain() - 0.25).abs() < 1e-6);
        assert!(fade.advance(1.0));
        assert_eq!(fade.gain(), 1.0);

        let mut fade = Fade::fade_out(2.0);
        assert_eq!(fade.gain(), 1.0);
        fade.advance(0.5);
        assert!((fade.gain() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_category_tracks_oldest() {
        let mut definition = CategoryDefinition::new("Music");
        definition.max_instances = 2;
        let mut category = CategoryState::new(definition);

        category.add(CueId(4));
        category.add(CueId(2));
        category.add(CueId(4));
        assert_eq!(category.playing(), &[CueId(4), CueId(2)]);
        assert_eq!(category.oldest(), Some(CueId(4)));
        assert!(category.is_full());

        category.remove(CueId(4));
        assert_eq!(category.oldest(), Some(CueId(2)));
        assert!(!category.is_full());
    }

    #[test]
    fn test_uncapped_category_never_full() {
        let mut category = CategoryState::new(CategoryDefinition::new("Default"));
        for i in 0..300 {
            category.add(CueId(i));
        }
        assert!(!category.is_full());
        assert_eq!(category.name(), "Default");
    }
}
