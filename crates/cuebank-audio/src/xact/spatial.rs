//! Listener/emitter geometry feeding the positioning variables.

use cuebank_core::{AudioEmitter, AudioListener, Vector3};

/// Distance, orientation angle and Doppler velocity of an emitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Positioning {
    pub distance: f32,
    /// Degrees between the listener's forward vector and the emitter.
    pub angle: f32,
    /// Emitter velocity relative to the listener, scaled by the emitter's
    /// Doppler factor.
    pub relative_velocity: Vector3,
}

impl Positioning {
    pub fn compute(listener: &AudioListener, emitter: &AudioEmitter) -> Self {
        let offset = emitter.position - listener.position;
        let distance = offset.length();
        let direction = if distance > 0.0 { offset / distance } else { offset };

        let slope = direction.dot(listener.forward.normalized()).clamp(-1.0, 1.0);
        let angle = slope.acos().to_degrees();

        Self {
            distance,
            angle,
            relative_velocity: (emitter.velocity - listener.velocity) * emitter.doppler_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitter_at(position: Vector3) -> AudioEmitter {
        AudioEmitter {
            position,
            ..AudioEmitter::default()
        }
    }

    #[test]
    fn test_emitter_in_front() {
        let p = Positioning::compute(&AudioListener::default(), &emitter_at(Vector3::new(0.0, 0.0, -5.0)));
        assert!((p.distance - 5.0).abs() < 1e-6);
        assert!(p.angle.abs() < 1e-3);
    }

    #[test]
    fn test_emitter_beside_and_behind() {
        let listener = AudioListener::default();
        let side = Positioning::compute(&listener, &emitter_at(Vector3::new(3.0, 0.0, 0.0)));
        assert!((side.angle - 90.0).abs() < 1e-3);

        let behind = Positioning::compute(&listener, &emitter_at(Vector3::new(0.0, 0.0, 2.0)));
        assert!((behind.angle - 180.0).abs() < 1e-3);
    }

    #[test]
    fn test_coincident_positions() {
        let p = Positioning::compute(&AudioListener::default(), &AudioEmitter::default());
        assert_eq!(p.distance, 0.0);
        assert!((p.angle - 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_relative_velocity_scaled() {
        let listener = AudioListener {
            velocity: Vector3::new(1.0, 0.0, 0.0),
            ..AudioListener::default()
        };
        let emitter = AudioEmitter {
            velocity: Vector3::new(5.0, 0.0, 0.0),
            doppler_scale: 0.5,
            ..AudioEmitter::default()
        };
        let p = Positioning::compute(&listener, &emitter);
        assert_eq!(p.relative_velocity, Vector3::new(2.0, 0.0, 0.0));
    }
}
