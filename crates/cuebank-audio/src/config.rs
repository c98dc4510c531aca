//! Engine configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::Path;
use std::time::Duration;

use cuebank_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Streaming scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Buffers per stream.
    pub buffer_count: usize,
    /// Bytes per buffer.
    pub buffer_size: usize,
    /// Longest the worker sleeps before rechecking for a stop request.
    pub wait_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_count: 4,
            buffer_size: 32768,
            wait_timeout_ms: 100,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_count < 2 {
            return Err(Error::InvalidArgument(format!(
                "buffer_count must be at least 2, got {}",
                self.buffer_count
            )));
        }
        if self.buffer_size == 0 || self.buffer_size % 4 != 0 {
            return Err(Error::InvalidArgument(format!(
                "buffer_size must be a non-zero multiple of 4, got {}",
                self.buffer_size
            )));
        }
        if !(1..=1000).contains(&self.wait_timeout_ms) {
            return Err(Error::InvalidArgument(format!(
                "wait_timeout_ms must be within 1..=1000, got {}",
                self.wait_timeout_ms
            )));
        }
        Ok(())
    }

    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

/// Audio output stream configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: u32,
    /// Output device name; the host default when unset.
    pub device: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            buffer_size: 1024,
            device: None,
        }
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub stream: StreamConfig,
    pub output: OutputConfig,
    /// Seed for variant selection; entropy-seeded when unset.
    pub rng_seed: Option<u64>,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.stream.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.stream.buffer_count, 4);
        assert_eq!(config.stream.buffer_size, 32768);
        assert_eq!(config.stream.wait_timeout(), Duration::from_millis(100));
        assert_eq!(config.output.sample_rate, 48000);
        assert_eq!(config.output.channels, 2);
        assert!(config.rng_seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(r#"{"stream":{"buffer_count":8},"rng_seed":7}"#).unwrap();
        assert_eq!(config.stream.buffer_count, 8);
        assert_eq!(config.stream.buffer_size, 32768);
        assert_eq!(config.rng_seed, Some(7));
    }

    #[test]
    fn test_validate_rejects() {
        for json in [
            r#"{"stream":{"buffer_count":1}}"#,
            r#"{"stream":{"buffer_size":1022}}"#,
            r#"{"stream":{"buffer_size":0}}"#,
            r#"{"stream":{"wait_timeout_ms":0}}"#,
            r#"{"stream":{"wait_timeout_ms":5000}}"#,
        ] {
            assert!(
                matches!(EngineConfig::from_json(json), Err(Error::InvalidArgument(_))),
                "{json}"
            );
        }
        assert!(matches!(EngineConfig::from_json("{"), Err(Error::Json(_))));
    }
}
