//! Buffer pools for streaming playback.

pub mod ring;

pub use ring::BufferRing;
