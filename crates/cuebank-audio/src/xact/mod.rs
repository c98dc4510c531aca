//! Cue runtime.
//!
//! Sound banks hand out [`Cue`]s; the [`AudioEngine`] owns their state,
//! evaluates RPC curves each [`update`](AudioEngine::update) and keeps
//! category bookkeeping. All state changes go through one update lock.

mod bank;
mod category;
mod cue;
mod engine;
mod rpc;
mod spatial;
mod variables;

pub use bank::{SoundBank, WaveBank, WaveEntry};
pub use category::AudioCategory;
pub use cue::{Cue, CueId, CueState, StopOptions};
pub use engine::AudioEngine;
pub use rpc::{volume_from_decibels, RpcResult};
pub use spatial::Positioning;
pub use variables::VariableBank;
