//! Cue engine: registry, play/stop transitions and the per-tick update.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cuebank_core::{
    CategoryDefinition, CueDefinition, Error, GlobalSettings, LimitBehavior, Result, RpcCurve,
    RpcVariable, WaveBankDefinition, WaveRef,
};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use super::bank::{BankShared, WaveBank, WaveEntry};
use super::category::{AudioCategory, CategoryState, Fade, FadeOut};
use super::cue::{Cue, CueId, CueInstance, CueState, StopOptions};
use super::rpc::RpcResult;
use super::variables::VariableBank;
use crate::config::{EngineConfig, StreamConfig};
use crate::sink::VoiceSink;
use crate::stream::{StreamHandle, StreamRequest};

const DEFAULT_CATEGORY: &str = "Default";

/// Shared playback state. Every read-modify-write happens under the
/// engine's update lock.
pub(crate) struct Registry {
    pub(crate) globals: VariableBank,
    pub(crate) categories: Vec<CategoryState>,
    pub(crate) cues: HashMap<CueId, CueInstance>,
    /// Playing cues, oldest first.
    active: Vec<CueId>,
    fading: Vec<FadeOut>,
    rng: StdRng,
    next_id: u64,
}

impl Registry {
    fn cue(&self, id: CueId) -> Result<&CueInstance> {
        self.cues
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("cue instance {}", id.0)))
    }

    /// Index of the named category, created with defaults if unknown.
    fn category_index(&mut self, name: &str) -> usize {
        if let Some(i) = self.categories.iter().position(|c| c.name() == name) {
            return i;
        }
        warn!(category = name, "Unknown category, creating it with defaults");
        self.categories
            .push(CategoryState::new(CategoryDefinition::new(name)));
        self.categories.len() - 1
    }

    /// Stop a cue and release its bookkeeping, keeping the instance.
    fn detach(&mut self, id: CueId, options: StopOptions) {
        let Some(cue) = self.cues.get_mut(&id) else {
            return;
        };
        let was_playing = cue.is_playing();
        cue.time = -1.0;
        cue.state = CueState::Stopped;
        cue.fade_in = None;
        let category = cue.category.take();
        let stream = cue.stream.take();
        let params = cue.params.unwrap_or_default();
        if was_playing {
            debug!(cue = %cue.name, ?options, "Cue stopped");
        }

        self.active.retain(|&c| c != id);
        let fade_out = category.map_or(0.0, |c| {
            self.categories[c].remove(id);
            self.categories[c].fade_out_secs()
        });

        if let Some(stream) = stream {
            match options {
                StopOptions::AsAuthored if fade_out > 0.0 => {
                    self.fading.push(FadeOut::new(stream, params, fade_out));
                }
                _ => stream.stop(),
            }
        }
    }

    pub(crate) fn stop_cue(&mut self, id: CueId, options: StopOptions) {
        self.detach(id, options);
        if self.cues.get(&id).is_some_and(|c| c.disposed) {
            self.cues.remove(&id);
        }
    }

    pub(crate) fn pause_cue(&mut self, id: CueId) -> Result<()> {
        let cue = self
            .cues
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("cue instance {}", id.0)))?;
        if cue.state == CueState::Playing {
            if let Some(stream) = &cue.stream {
                stream.pause()?;
            }
            cue.state = CueState::Paused;
            debug!(cue = %cue.name, "Cue paused");
        }
        Ok(())
    }

    pub(crate) fn resume_cue(&mut self, id: CueId) -> Result<()> {
        let cue = self
            .cues
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("cue instance {}", id.0)))?;
        if cue.state == CueState::Paused {
            if let Some(stream) = &cue.stream {
                stream.resume()?;
            }
            cue.state = CueState::Playing;
            debug!(cue = %cue.name, "Cue resumed");
        }
        Ok(())
    }
}

pub(crate) struct EngineInner {
    sink: Arc<dyn VoiceSink>,
    stream_config: StreamConfig,
    rpc_curves: Vec<RpcCurve>,
    instance_variables: Vec<RpcVariable>,
    wave_banks: RwLock<HashMap<String, Arc<WaveBank>>>,
    /// The update lock.
    pub(crate) registry: Mutex<Registry>,
}

impl EngineInner {
    pub(crate) fn rpc_curves(&self) -> &[RpcCurve] {
        &self.rpc_curves
    }

    fn wave(&self, wave: &WaveRef) -> Result<WaveEntry> {
        let banks = self.wave_banks.read();
        let bank = banks
            .get(&wave.bank)
            .ok_or_else(|| Error::NotFound(format!("wave bank '{}'", wave.bank)))?;
        bank.entry(wave.index).cloned().ok_or_else(|| {
            Error::NotFound(format!("wave {} in bank '{}'", wave.index, wave.bank))
        })
    }

    /// Start a cue, applying instance limits and category caps first.
    pub(crate) fn play(&self, reg: &mut Registry, id: CueId) -> Result<()> {
        let cue = reg.cue(id)?;
        let name = cue.name.clone();
        let cap = cue.definition.instance_cap();
        let behavior = cue.definition.limit_behavior;
        let sounds = cue.definition.sounds.clone();
        let bank = Arc::clone(&cue.bank);

        let evict = match cap {
            Some(cap) => {
                let others = reg
                    .active
                    .iter()
                    .copied()
                    .filter(|&other| other != id && reg.cues.get(&other).is_some_and(|c| c.name == name))
                    .collect::<Vec<_>>();
                if others.len() < cap {
                    None
                } else if behavior == LimitBehavior::FailToPlay {
                    debug!(cue = %name, cap, "Instance limit reached, dropping play request");
                    return Ok(());
                } else {
                    if behavior != LimitBehavior::ReplaceOldest {
                        debug!(cue = %name, ?behavior, "Limit behavior falls back to replacing the oldest instance");
                    }
                    others.first().copied()
                }
            }
            None => None,
        };

        // Resolve everything that can fail before touching other cues.
        let variant = if sounds.len() > 1 {
            reg.rng.random_range(0..sounds.len())
        } else {
            0
        };
        let sound_index = *sounds
            .get(variant)
            .ok_or_else(|| Error::NotFound(format!("cue '{name}' has no sounds")))?;
        let sound = bank.sound(sound_index)?;
        let wave = self.wave(&sound.wave)?;

        // One stream per cue; playing again restarts.
        if reg.cue(id)?.stream.is_some() {
            reg.detach(id, StopOptions::Immediate);
        }
        if let Some(oldest) = evict {
            info!(cue = %name, "Instance limit reached, stopping oldest instance");
            reg.stop_cue(oldest, StopOptions::Immediate);
        }

        let category = reg.category_index(&sound.category);
        if reg.categories[category].is_full() {
            if let Some(oldest) = reg.categories[category].oldest() {
                info!(
                    category = reg.categories[category].name(),
                    "Category at capacity, stopping oldest cue"
                );
                reg.stop_cue(oldest, StopOptions::Immediate);
            }
        }
        let category_volume = reg.categories[category].volume;
        let fade_in = reg.categories[category].fade_in_secs();

        let rpc = RpcResult::evaluate(sound, &self.rpc_curves, &reg.globals, &reg.cue(id)?.variables);
        let cue = reg
            .cues
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("cue instance {}", id.0)))?;
        cue.rpc = rpc;
        cue.fade_in = (fade_in > 0.0).then(|| Fade::fade_in(fade_in));
        let params = cue.compose(sound, category_volume);

        let mut request = StreamRequest::new(wave.source);
        request.loop_count = sound.loop_count;
        request.loop_region = wave.loop_region;
        request.params = params;
        let stream = StreamHandle::start(Arc::clone(&self.sink), request, &self.stream_config)?;

        cue.stream = Some(stream);
        cue.sound = Some(sound_index);
        cue.variant_index = Some(variant);
        cue.time = 0.0;
        cue.state = CueState::Playing;
        cue.played = true;
        cue.category = Some(category);
        cue.params = Some(params);

        reg.categories[category].add(id);
        if !reg.active.contains(&id) {
            reg.active.push(id);
        }
        info!(
            cue = %name,
            variant,
            category = reg.categories[category].name(),
            "Cue playing"
        );
        Ok(())
    }

    /// Recompose a cue's voice parameters and send them to its stream.
    pub(crate) fn push_params(&self, reg: &mut Registry, id: CueId) -> Result<()> {
        let cue = reg.cue(id)?;
        let (Some(sound_index), Some(stream)) = (cue.sound, cue.stream.as_ref()) else {
            return Ok(());
        };
        let category_volume = cue.category.map_or(1.0, |c| reg.categories[c].volume);
        let params = cue.compose(cue.bank.sound(sound_index)?, category_volume);
        let result = stream.set_params(&params);

        if let Some(cue) = reg.cues.get_mut(&id) {
            cue.params = Some(params);
        }
        result
    }

    fn update(&self, reg: &mut Registry, dt: f32) {
        reg.fading.retain_mut(|fade| fade.advance(dt));

        for id in reg.active.clone() {
            if let Err(e) = self.update_cue(reg, id, dt) {
                if e.is_playback_fatal() {
                    warn!(cue = id.0, "Cue failed during update, stopping it: {e}");
                    reg.stop_cue(id, StopOptions::Immediate);
                } else {
                    debug!(cue = id.0, "Cue update incomplete: {e}");
                }
            }
        }
    }

    fn update_cue(&self, reg: &mut Registry, id: CueId, dt: f32) -> Result<()> {
        let Some(cue) = reg.cues.get_mut(&id) else {
            return Ok(());
        };

        if let Some((definition, version)) = cue.bank.newer_cue(&cue.name, cue.version) {
            let paused = cue.state == CueState::Paused;
            info!(cue = %cue.name, version, "Cue definition changed, restarting");
            cue.reload(definition, version);
            self.play(reg, id)?;
            if paused {
                reg.pause_cue(id)?;
            }
            return Ok(());
        }

        if !cue.is_playing() {
            return Ok(());
        }
        let running = matches!(&cue.stream, Some(stream) if !stream.is_stopped());
        if !running {
            debug!(cue = %cue.name, "Cue finished");
            reg.stop_cue(id, StopOptions::Immediate);
            return Ok(());
        }

        if cue.state == CueState::Playing {
            cue.time += dt;
            if cue.fade_in.as_mut().is_some_and(|fade| fade.advance(dt)) {
                cue.fade_in = None;
            }
        }

        let Some(sound_index) = cue.sound else {
            return Ok(());
        };
        let bank = Arc::clone(&cue.bank);
        let sound = bank.sound(sound_index)?;
        let rpc = RpcResult::evaluate(sound, &self.rpc_curves, &reg.globals, &reg.cue(id)?.variables);
        if let Some(cue) = reg.cues.get_mut(&id) {
            cue.rpc = rpc;
        }
        self.push_params(reg, id)
    }
}

/// Owns categories, global variables, wave banks and every cue instance.
///
/// Cheap to clone; clones share one engine. Call [`update`](Self::update)
/// once per tick.
#[derive(Clone)]
pub struct AudioEngine {
    inner: Arc<EngineInner>,
}

impl AudioEngine {
    pub fn new(
        sink: Arc<dyn VoiceSink>,
        settings: &GlobalSettings,
        config: &EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut categories: Vec<CategoryState> = settings
            .categories
            .iter()
            .cloned()
            .map(CategoryState::new)
            .collect();
        if !categories.iter().any(|c| c.name() == DEFAULT_CATEGORY) {
            categories.push(CategoryState::new(CategoryDefinition::new(DEFAULT_CATEGORY)));
        }

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        info!(
            categories = categories.len(),
            curves = settings.rpc_curves.len(),
            variables = settings.variables.len(),
            "Audio engine created"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                sink,
                stream_config: config.stream.clone(),
                rpc_curves: settings.rpc_curves.clone(),
                instance_variables: settings.instance_variables(),
                wave_banks: RwLock::new(HashMap::new()),
                registry: Mutex::new(Registry {
                    globals: VariableBank::new(settings.global_variables()),
                    categories,
                    cues: HashMap::new(),
                    active: Vec::new(),
                    fading: Vec::new(),
                    rng,
                    next_id: 0,
                }),
            }),
        })
    }

    pub fn sink(&self) -> &Arc<dyn VoiceSink> {
        &self.inner.sink
    }

    /// Register a wave bank, replacing any bank with the same name.
    pub fn add_wave_bank(&self, bank: WaveBank) {
        let name = bank.name().to_string();
        if self
            .inner
            .wave_banks
            .write()
            .insert(name.clone(), Arc::new(bank))
            .is_some()
        {
            warn!(bank = %name, "Replaced wave bank");
        }
    }

    pub fn load_wave_bank(&self, definition: &WaveBankDefinition, base_dir: &Path) -> Result<()> {
        self.add_wave_bank(WaveBank::load(definition, base_dir)?);
        Ok(())
    }

    /// Advance every playing cue by `dt`.
    ///
    /// A cue that fails is stopped; the others still update.
    pub fn update(&self, dt: Duration) {
        let mut reg = self.inner.registry.lock();
        self.inner.update(&mut reg, dt.as_secs_f32());
    }

    pub fn category(&self, name: &str) -> Result<AudioCategory> {
        let reg = self.inner.registry.lock();
        let index = reg
            .categories
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| Error::NotFound(format!("category '{name}'")))?;
        Ok(AudioCategory::new(
            Arc::clone(&self.inner),
            index,
            name.to_string(),
        ))
    }

    pub fn set_global_variable(&self, name: &str, value: f32) -> Result<()> {
        self.inner.registry.lock().globals.set(name, value)
    }

    pub fn get_global_variable(&self, name: &str) -> Result<f32> {
        self.inner.registry.lock().globals.get(name)
    }

    /// Cues currently playing or paused.
    pub fn active_cue_count(&self) -> usize {
        self.inner.registry.lock().active.len()
    }

    pub fn stop_all(&self, options: StopOptions) {
        let mut reg = self.inner.registry.lock();
        for id in reg.active.clone() {
            reg.stop_cue(id, options);
        }
    }

    pub(crate) fn create_cue(
        &self,
        bank: Arc<BankShared>,
        definition: CueDefinition,
        version: u64,
    ) -> Cue {
        let mut reg = self.inner.registry.lock();
        let id = CueId(reg.next_id);
        reg.next_id += 1;

        let name = definition.name.clone();
        let variables = VariableBank::new(self.inner.instance_variables.clone());
        debug!(cue = %name, bank = bank.name(), id = id.0, "Cue prepared");
        reg.cues
            .insert(id, CueInstance::new(bank, definition, version, variables));
        Cue::new(Arc::clone(&self.inner), id, name)
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("curves", &self.inner.rpc_curves.len())
            .finish_non_exhaustive()
    }
}
