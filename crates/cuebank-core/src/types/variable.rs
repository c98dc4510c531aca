//! Named variables that feed RPC curves.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

/// Instance variable written by 3D positioning with the emitter distance.
pub const DISTANCE_VARIABLE: &str = "Distance";
/// Instance variable written by 3D positioning with the emitter angle in degrees.
pub const ORIENTATION_ANGLE_VARIABLE: &str = "OrientationAngle";

/// A global or per-cue variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcVariable {
    pub name: String,
    #[serde(default)]
    pub initial_value: f32,
    #[serde(default = "default_min")]
    pub min_value: f32,
    #[serde(default = "default_max")]
    pub max_value: f32,
    /// Whether callers may read and write it by name.
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub is_global: bool,
    /// Current value, always within `[min_value, max_value]`.
    #[serde(skip)]
    value: Option<f32>,
}

const fn default_min() -> f32 {
    f32::MIN
}

const fn default_max() -> f32 {
    f32::MAX
}

const fn default_true() -> bool {
    true
}

impl RpcVariable {
    pub fn new(name: impl Into<String>, initial_value: f32, min_value: f32, max_value: f32) -> Self {
        Self {
            name: name.into(),
            initial_value,
            min_value,
            max_value,
            is_public: true,
            is_global: false,
            value: None,
        }
    }

    /// Unbounded, non-public instance variable maintained by the runtime.
    pub fn reserved(name: impl Into<String>) -> Self {
        Self {
            is_public: false,
            ..Self::new(name, 0.0, f32::MIN, f32::MAX)
        }
    }

    pub fn value(&self) -> f32 {
        self.value
            .unwrap_or_else(|| self.initial_value.clamp(self.min_value, self.max_value))
    }

    /// Store `value`, clamped into the variable's range.
    pub fn set_value(&mut self, value: f32) {
        self.value = Some(value.clamp(self.min_value, self.max_value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_value_clamps() {
        let mut v = RpcVariable::new("Speed", 0.0, -1.0, 10.0);
        v.set_value(25.0);
        assert_eq!(v.value(), 10.0);
        v.set_value(-4.0);
        assert_eq!(v.value(), -1.0);
    }

    #[test]
    fn test_deserialize_defaults() {
        let v: RpcVariable = serde_json::from_str(r#"{"name":"RPM","initial_value":3.5}"#).unwrap();
        assert!(v.is_public);
        assert!(!v.is_global);
        assert_eq!(v.value(), 3.5);
    }

    #[test]
    fn test_reserved_is_private() {
        let v = RpcVariable::reserved(DISTANCE_VARIABLE);
        assert!(!v.is_public);
        assert_eq!(v.value(), 0.0);
    }
}
