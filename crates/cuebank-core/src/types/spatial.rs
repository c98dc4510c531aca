//! Listener and emitter positioning.

use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);
    pub const FORWARD: Self = Self::new(0.0, 0.0, -1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x.mul_add(other.x, self.y.mul_add(other.y, self.z * other.z))
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y.mul_add(other.z, -(self.z * other.y)),
            self.z.mul_add(other.x, -(self.x * other.z)),
            self.x.mul_add(other.y, -(self.y * other.x)),
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 0.0 {
            self / len
        } else {
            Self::ZERO
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vector3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vector3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vector3 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

/// The point of view sounds are heard from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioListener {
    pub position: Vector3,
    pub forward: Vector3,
    pub up: Vector3,
    pub velocity: Vector3,
}

impl Default for AudioListener {
    fn default() -> Self {
        Self {
            position: Vector3::ZERO,
            forward: Vector3::FORWARD,
            up: Vector3::UP,
            velocity: Vector3::ZERO,
        }
    }
}

impl AudioListener {
    /// Check that every vector is usable for positioning.
    pub fn validate(&self) -> Result<()> {
        validate_frame(
            "listener",
            &[self.position, self.forward, self.up, self.velocity],
            self.forward,
        )
    }
}

/// A sound's position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioEmitter {
    pub position: Vector3,
    pub forward: Vector3,
    pub up: Vector3,
    pub velocity: Vector3,
    /// Multiplier applied to the relative velocity.
    pub doppler_scale: f32,
}

impl Default for AudioEmitter {
    fn default() -> Self {
        Self {
            position: Vector3::ZERO,
            forward: Vector3::FORWARD,
            up: Vector3::UP,
            velocity: Vector3::ZERO,
            doppler_scale: 1.0,
        }
    }
}

impl AudioEmitter {
    pub fn validate(&self) -> Result<()> {
        if !self.doppler_scale.is_finite() || self.doppler_scale < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "emitter doppler scale {} is not a finite non-negative number",
                self.doppler_scale
            )));
        }
        validate_frame(
            "emitter",
            &[self.position, self.forward, self.up, self.velocity],
            self.forward,
        )
    }
}

fn validate_frame(what: &str, vectors: &[Vector3], forward: Vector3) -> Result<()> {
    if vectors.iter().any(|v| !v.is_finite()) {
        return Err(Error::InvalidArgument(format!(
            "{what} has a non-finite vector"
        )));
    }
    if forward.length() == 0.0 {
        return Err(Error::InvalidArgument(format!(
            "{what} forward vector is zero"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_math() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 1.0, 0.0);
        assert_eq!(a.dot(b), 0.0);
        assert_eq!(a.cross(b), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(Vector3::new(3.0, 4.0, 0.0).length(), 5.0);
        assert_eq!(Vector3::new(0.0, 0.0, 8.0).normalized(), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(Vector3::ZERO.normalized(), Vector3::ZERO);
    }

    #[test]
    fn test_validate() {
        assert!(AudioListener::default().validate().is_ok());
        assert!(AudioEmitter::default().validate().is_ok());

        let listener = AudioListener {
            forward: Vector3::ZERO,
            ..AudioListener::default()
        };
        assert!(matches!(listener.validate(), Err(Error::InvalidArgument(_))));

        let emitter = AudioEmitter {
            position: Vector3::new(f32::NAN, 0.0, 0.0),
            ..AudioEmitter::default()
        };
        assert!(matches!(emitter.validate(), Err(Error::InvalidArgument(_))));
    }
}
