//! Runtime parameter control evaluation.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use cuebank_core::{Error, Result, RpcCurve, RpcParameter, SoundDefinition};
use tracing::warn;

use super::variables::VariableBank;

/// Convert a gain in decibels to a linear multiplier.
pub fn volume_from_decibels(decibels: f32) -> f32 {
    10f32.powf(decibels / 20.0)
}

/// Combined output of every curve attached to a sound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpcResult {
    pub volume: f32,
    /// Octaves, within `[-1, 1]`.
    pub pitch: f32,
    pub reverb_mix: f32,
    pub filter_frequency: Option<f32>,
    pub filter_q_factor: Option<f32>,
}

impl Default for RpcResult {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 0.0,
            reverb_mix: 1.0,
            filter_frequency: None,
            filter_q_factor: None,
        }
    }
}

impl RpcResult {
    /// Fold one curve output into the result.
    ///
    /// Volume and reverb values are hundredths of a decibel, pitch values are
    /// cents. Filter values overwrite whatever came before.
    pub fn apply(&mut self, parameter: &RpcParameter, value: f32) -> Result<()> {
        match parameter {
            RpcParameter::Volume => self.volume *= volume_from_decibels(value / 100.0),
            RpcParameter::Pitch => self.pitch += value / 1200.0,
            RpcParameter::ReverbSend => self.reverb_mix *= volume_from_decibels(value / 100.0),
            RpcParameter::FilterFrequency => self.filter_frequency = Some(value),
            RpcParameter::FilterQFactor => self.filter_q_factor = Some(value),
            RpcParameter::Unsupported(name) => {
                return Err(Error::UnsupportedParameter(name.clone()));
            }
        }
        Ok(())
    }

    /// Clamp pitch to one octave either way and volume to non-negative.
    pub fn finish(mut self) -> Self {
        self.pitch = self.pitch.clamp(-1.0, 1.0);
        self.volume = self.volume.max(0.0);
        self
    }

    /// Evaluate every curve on `sound`.
    ///
    /// A curve that cannot be evaluated is logged and skipped; the rest still
    /// contribute.
    pub fn evaluate(
        sound: &SoundDefinition,
        curves: &[RpcCurve],
        globals: &VariableBank,
        locals: &VariableBank,
    ) -> Self {
        let mut result = Self::default();

        for curve in sound.curves(curves) {
            if let Err(e) = result.evaluate_curve(curve, globals, locals) {
                warn!(parameter = curve.parameter.as_str(), "Skipping RPC curve: {e}");
            }
        }
        result.finish()
    }

    fn evaluate_curve(
        &mut self,
        curve: &RpcCurve,
        globals: &VariableBank,
        locals: &VariableBank,
    ) -> Result<()> {
        let bank = if curve.is_global { globals } else { locals };
        let input = bank.value_at(curve.variable).ok_or_else(|| {
            Error::NotFound(format!(
                "{} variable index {}",
                if curve.is_global { "global" } else { "instance" },
                curve.variable
            ))
        })?;
        self.apply(&curve.parameter, curve.evaluate(input))
    }
}
