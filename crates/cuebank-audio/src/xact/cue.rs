//! Cue instances and the handle callers play them through.

use std::sync::Arc;
use std::time::Duration;

use cuebank_core::{
    AudioEmitter, AudioListener, CueDefinition, Error, Result, RpcCurve, RpcParameter,
    SoundDefinition, Vector3, DISTANCE_VARIABLE, ORIENTATION_ANGLE_VARIABLE,
};
use tracing::{debug, trace};

use super::bank::BankShared;
use super::category::Fade;
use super::engine::EngineInner;
use super::rpc::RpcResult;
use super::spatial::Positioning;
use super::variables::VariableBank;
use crate::sink::{VoiceHandle, VoiceParams};
use crate::stream::StreamHandle;

/// Engine-unique cue instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CueId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CueState {
    /// Created, never played.
    Prepared,
    Playing,
    Paused,
    #[default]
    Stopped,
}

/// How [`Cue::stop`] treats the voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopOptions {
    /// Fade out over the category's fade-out time, then stop.
    AsAuthored,
    #[default]
    Immediate,
}

/// Runtime state of one cue, owned by the engine registry.
pub(crate) struct CueInstance {
    pub(crate) name: String,
    pub(crate) bank: Arc<BankShared>,
    pub(crate) definition: CueDefinition,
    /// Definition version this instance was built from.
    pub(crate) version: u64,
    pub(crate) variables: VariableBank,
    pub(crate) state: CueState,
    /// Seconds since play began; negative while stopped.
    pub(crate) time: f32,
    /// Bank sound index of the resolved variant.
    pub(crate) sound: Option<usize>,
    /// Position of the resolved variant in the definition's sound list.
    pub(crate) variant_index: Option<usize>,
    pub(crate) stream: Option<StreamHandle>,
    pub(crate) category: Option<usize>,
    pub(crate) volume: f32,
    pub(crate) pitch: f32,
    pub(crate) rpc: RpcResult,
    /// Last parameters pushed to the voice.
    pub(crate) params: Option<VoiceParams>,
    pub(crate) fade_in: Option<Fade>,
    pub(crate) applied_3d: bool,
    pub(crate) played: bool,
    pub(crate) relative_velocity: Vector3,
    pitch_controlled: Option<bool>,
    /// The owning handle was dropped; remove once stopped.
    pub(crate) disposed: bool,
}

impl CueInstance {
    pub(crate) fn new(
        bank: Arc<BankShared>,
        definition: CueDefinition,
        version: u64,
        variables: VariableBank,
    ) -> Self {
        Self {
            name: definition.name.clone(),
            bank,
            definition,
            version,
            variables,
            state: CueState::Prepared,
            time: -1.0,
            sound: None,
            variant_index: None,
            stream: None,
            category: None,
            volume: 1.0,
            pitch: 0.0,
            rpc: RpcResult::default(),
            params: None,
            fade_in: None,
            applied_3d: false,
            played: false,
            relative_velocity: Vector3::ZERO,
            pitch_controlled: None,
            disposed: false,
        }
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.time >= 0.0
    }

    /// Install a replacement definition; cached lookups are recomputed.
    pub(crate) fn reload(&mut self, definition: CueDefinition, version: u64) {
        self.definition = definition;
        self.version = version;
        self.pitch_controlled = None;
    }

    /// The sound a query should look at: the playing variant, else the
    /// first candidate.
    fn reference_sound(&self) -> Option<&SoundDefinition> {
        let index = self.sound.or_else(|| self.definition.sounds.first().copied())?;
        self.bank.sound(index).ok()
    }

    pub(crate) fn is_pitch_controlled_by_rpc(&mut self, curves: &[RpcCurve]) -> bool {
        if let Some(controlled) = self.pitch_controlled {
            return controlled;
        }
        let Some(sound) = self.reference_sound() else {
            return false;
        };
        let controlled = sound
            .curves(curves)
            .any(|c| c.parameter == RpcParameter::Pitch);
        self.pitch_controlled = Some(controlled);
        controlled
    }

    /// Combine cue, category, curve and sound settings into voice parameters.
    pub(crate) fn compose(&self, sound: &SoundDefinition, category_volume: f32) -> VoiceParams {
        let fade = self.fade_in.map_or(1.0, |f| f.gain());
        let volume = self.volume * category_volume * self.rpc.volume * sound.volume * fade;

        // Curve filter values only adjust a filter the sound already has.
        let filter = sound.filter.map(|mut filter| {
            if let Some(frequency) = self.rpc.filter_frequency {
                filter.frequency = frequency;
            }
            if let Some(q_factor) = self.rpc.filter_q_factor {
                filter.q_factor = q_factor;
            }
            filter
        });

        VoiceParams {
            volume: volume.max(0.0),
            pitch: self.rpc.pitch + self.pitch + sound.pitch,
            reverb_mix: if sound.use_reverb { self.rpc.reverb_mix } else { 0.0 },
            filter,
        }
    }

    /// Record listener/emitter geometry into the positioning variables.
    pub(crate) fn apply_3d(&mut self, listener: &AudioListener, emitter: &AudioEmitter) -> Result<()> {
        listener.validate()?;
        emitter.validate()?;
        if self.played && !self.applied_3d {
            return Err(Error::OrderingViolation(format!(
                "cue '{}' was played without 3D positioning; apply_3d must precede play",
                self.name
            )));
        }

        let positioning = Positioning::compute(listener, emitter);
        self.variables
            .set_internal(DISTANCE_VARIABLE, positioning.distance)?;
        self.variables
            .set_internal(ORIENTATION_ANGLE_VARIABLE, positioning.angle)?;
        self.relative_velocity = positioning.relative_velocity;
        self.applied_3d = true;

        trace!(
            cue = %self.name,
            distance = positioning.distance,
            angle = positioning.angle,
            "Applied 3D positioning"
        );
        Ok(())
    }
}

/// A playable cue created by a [`SoundBank`](super::SoundBank).
///
/// Dropping the handle disposes the cue once it is no longer playing, so a
/// dropped cue still finishes.
pub struct Cue {
    engine: Arc<EngineInner>,
    id: CueId,
    name: String,
}

impl Cue {
    pub(crate) fn new(engine: Arc<EngineInner>, id: CueId, name: String) -> Self {
        Self { engine, id, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn id(&self) -> CueId {
        self.id
    }

    fn with<T>(&self, f: impl FnOnce(&mut CueInstance) -> T) -> Result<T> {
        let mut reg = self.engine.registry.lock();
        let cue = reg
            .cues
            .get_mut(&self.id)
            .ok_or_else(|| Error::NotFound(format!("cue '{}' was released", self.name)))?;
        Ok(f(cue))
    }

    /// Start playback. Playing an already playing cue restarts it.
    pub fn play(&self) -> Result<()> {
        let mut reg = self.engine.registry.lock();
        self.engine.play(&mut reg, self.id)
    }

    pub fn pause(&self) -> Result<()> {
        self.engine.registry.lock().pause_cue(self.id)
    }

    pub fn resume(&self) -> Result<()> {
        self.engine.registry.lock().resume_cue(self.id)
    }

    /// Stop playback. Category bookkeeping is released before this returns;
    /// the stream worker winds down shortly after. Idempotent.
    pub fn stop(&self, options: StopOptions) {
        self.engine.registry.lock().stop_cue(self.id, options);
    }

    pub fn state(&self) -> CueState {
        self.with(|c| c.state).unwrap_or_default()
    }

    /// True while playing or paused.
    pub fn is_playing(&self) -> bool {
        self.with(|c| c.is_playing()).unwrap_or(false)
    }

    pub fn is_paused(&self) -> bool {
        self.state() == CueState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == CueState::Stopped
    }

    pub fn is_prepared(&self) -> bool {
        self.state() == CueState::Prepared
    }

    pub fn set_variable(&self, name: &str, value: f32) -> Result<()> {
        self.with(|c| c.variables.set(name, value))?
    }

    pub fn get_variable(&self, name: &str) -> Result<f32> {
        self.with(|c| c.variables.get(name))?
    }

    pub fn volume(&self) -> f32 {
        self.with(|c| c.volume).unwrap_or(0.0)
    }

    /// Set the cue's own linear volume and push it to the voice.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        let mut reg = self.engine.registry.lock();
        if let Some(cue) = reg.cues.get_mut(&self.id) {
            cue.volume = volume.max(0.0);
        }
        self.engine.push_params(&mut reg, self.id)
    }

    pub fn pitch(&self) -> f32 {
        self.with(|c| c.pitch).unwrap_or(0.0)
    }

    /// Set the cue's own pitch offset in octaves and push it to the voice.
    pub fn set_pitch(&self, pitch: f32) -> Result<()> {
        let mut reg = self.engine.registry.lock();
        if let Some(cue) = reg.cues.get_mut(&self.id) {
            cue.pitch = pitch;
        }
        self.engine.push_params(&mut reg, self.id)
    }

    /// Update the distance and orientation variables from a listener and
    /// emitter.
    ///
    /// A cue that has been played without positioning cannot start using
    /// it later; that returns [`Error::OrderingViolation`].
    pub fn apply_3d(&self, listener: &AudioListener, emitter: &AudioEmitter) -> Result<()> {
        self.with(|c| c.apply_3d(listener, emitter))?
    }

    pub fn is_pitch_controlled_by_rpc(&self) -> bool {
        let curves = self.engine.rpc_curves();
        self.with(|c| c.is_pitch_controlled_by_rpc(curves))
            .unwrap_or(false)
    }

    /// Parameters most recently pushed to the voice, if it has played.
    pub fn voice_parameters(&self) -> Option<VoiceParams> {
        self.with(|c| c.params).ok().flatten()
    }

    /// Doppler velocity from the last [`apply_3d`](Self::apply_3d).
    pub fn relative_velocity(&self) -> Vector3 {
        self.with(|c| c.relative_velocity).unwrap_or(Vector3::ZERO)
    }

    /// Which candidate sound the last play chose.
    pub fn variant_index(&self) -> Option<usize> {
        self.with(|c| c.variant_index).ok().flatten()
    }

    /// Play time accumulated by engine updates, while playing.
    pub fn elapsed(&self) -> Option<Duration> {
        self.with(|c| c.is_playing().then(|| Duration::from_secs_f32(c.time)))
            .ok()
            .flatten()
    }

    /// Voice of the active stream.
    pub fn voice(&self) -> Option<VoiceHandle> {
        self.with(|c| c.stream.as_ref().map(StreamHandle::voice))
            .ok()
            .flatten()
    }
}

impl Drop for Cue {
    fn drop(&mut self) {
        let mut reg = self.engine.registry.lock();
        let remove = match reg.cues.get_mut(&self.id) {
            Some(cue) => {
                cue.disposed = true;
                !cue.is_playing()
            }
            None => false,
        };
        if remove {
            reg.cues.remove(&self.id);
            debug!(cue = %self.name, "Cue disposed");
        }
    }
}

impl std::fmt::Debug for Cue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cue")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
