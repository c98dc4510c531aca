//! Runtime parameter control (RPC) curves.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

/// Voice parameter driven by a curve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RpcParameter {
    /// Decibel offset, multiplied into the voice volume.
    Volume,
    /// Cents, added to the voice pitch.
    Pitch,
    /// Decibel offset, multiplied into the reverb send.
    ReverbSend,
    /// Filter cutoff in Hz.
    FilterFrequency,
    FilterQFactor,
    /// Any name without a runtime mapping.
    Unsupported(String),
}

impl RpcParameter {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Volume => "volume",
            Self::Pitch => "pitch",
            Self::ReverbSend => "reverb_send",
            Self::FilterFrequency => "filter_frequency",
            Self::FilterQFactor => "filter_q_factor",
            Self::Unsupported(name) => name,
        }
    }

    pub const fn is_filter(&self) -> bool {
        matches!(self, Self::FilterFrequency | Self::FilterQFactor)
    }
}

impl From<String> for RpcParameter {
    fn from(name: String) -> Self {
        match name.as_str() {
            "volume" => Self::Volume,
            "pitch" => Self::Pitch,
            "reverb_send" => Self::ReverbSend,
            "filter_frequency" => Self::FilterFrequency,
            "filter_q_factor" => Self::FilterQFactor,
            _ => Self::Unsupported(name),
        }
    }
}

impl From<RpcParameter> for String {
    fn from(parameter: RpcParameter) -> Self {
        parameter.as_str().to_string()
    }
}

/// Single control point on a curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RpcPoint {
    /// Input variable value.
    pub position: f32,
    /// Output parameter value.
    pub value: f32,
}

impl RpcPoint {
    pub const fn new(position: f32, value: f32) -> Self {
        Self { position, value }
    }
}

/// Piecewise linear mapping from a variable to a voice parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCurve {
    /// Index into the global or instance variable list.
    pub variable: usize,
    /// Whether `variable` indexes the global list.
    #[serde(default)]
    pub is_global: bool,
    pub parameter: RpcParameter,
    /// Control points ordered by ascending position.
    pub points: Vec<RpcPoint>,
}

impl RpcCurve {
    /// Evaluate the curve at `position`.
    ///
    /// Positions outside the point range clamp to the first or last value.
    /// A curve with no points evaluates to zero.
    pub fn evaluate(&self, position: f32) -> f32 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 0.0;
        };

        if position <= first.position {
            return first.value;
        }
        if position >= last.position {
            return last.value;
        }

        // First point strictly past the input; never 0 or len here.
        let upper = self.points.partition_point(|p| p.position <= position);
        let a = self.points[upper - 1];
        let b = self.points[upper];

        let span = b.position - a.position;
        if span <= 0.0 {
            return b.value;
        }
        a.value + (b.value - a.value) * ((position - a.position) / span)
    }
}
