//! Wave data format descriptors.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Samples are 16 bits wide (8 bits when clear).
pub const FLAG_16BIT: u8 = 1;
/// Two interleaved channels (mono when clear).
pub const FLAG_STEREO: u8 = 1 << 1;
/// Data is Microsoft ADPCM compressed.
pub const FLAG_ADPCM: u8 = 1 << 2;

const KNOWN_FLAGS: u8 = FLAG_16BIT | FLAG_STEREO | FLAG_ADPCM;

/// Layout of the bytes backing a wave entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
    MonoMsAdpcm,
    StereoMsAdpcm,
}

impl SourceFormat {
    /// Parse from persisted format flags.
    pub fn from_flags(flags: u8) -> Result<Self> {
        if flags & !KNOWN_FLAGS != 0 {
            return Err(Error::UnsupportedFormat(format!(
                "unknown format flags {flags:#04x}"
            )));
        }

        let adpcm = flags & FLAG_ADPCM != 0;
        let stereo = flags & FLAG_STEREO != 0;
        let wide = flags & FLAG_16BIT != 0;

        match (adpcm, stereo, wide) {
            (false, false, false) => Ok(Self::Mono8),
            (false, false, true) => Ok(Self::Mono16),
            (false, true, false) => Ok(Self::Stereo8),
            (false, true, true) => Ok(Self::Stereo16),
            (true, false, true) => Ok(Self::MonoMsAdpcm),
            (true, true, true) => Ok(Self::StereoMsAdpcm),
            (true, _, false) => Err(Error::UnsupportedFormat(
                "MS-ADPCM must decode to 16-bit samples".to_string(),
            )),
        }
    }

    /// Get the persisted flag representation.
    pub const fn flags(self) -> u8 {
        match self {
            Self::Mono8 => 0,
            Self::Mono16 => FLAG_16BIT,
            Self::Stereo8 => FLAG_STEREO,
            Self::Stereo16 => FLAG_STEREO | FLAG_16BIT,
            Self::MonoMsAdpcm => FLAG_ADPCM | FLAG_16BIT,
            Self::StereoMsAdpcm => FLAG_ADPCM | FLAG_STEREO | FLAG_16BIT,
        }
    }

    pub const fn channels(self) -> u16 {
        match self {
            Self::Mono8 | Self::Mono16 | Self::MonoMsAdpcm => 1,
            Self::Stereo8 | Self::Stereo16 | Self::StereoMsAdpcm => 2,
        }
    }

    /// Bit depth of the decoded PCM.
    pub const fn bits_per_sample(self) -> u16 {
        match self {
            Self::Mono8 | Self::Stereo8 => 8,
            _ => 16,
        }
    }

    pub const fn is_adpcm(self) -> bool {
        matches!(self, Self::MonoMsAdpcm | Self::StereoMsAdpcm)
    }

    /// Bytes in one decoded PCM frame (one sample for every channel).
    pub const fn bytes_per_frame(self) -> usize {
        (self.channels() as usize) * (self.bits_per_sample() as usize / 8)
    }
}

/// Codec field of a packed wave bank format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WaveCodec {
    Pcm,
    Xma,
    MsAdpcm,
    Wma,
}

/// Packed 32-bit wave bank format descriptor.
///
/// Bits 0-1 codec, 2-4 channels, 5-22 sample rate, 23-30 alignment, 31 bit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiniFormat {
    pub codec: WaveCodec,
    pub channels: u16,
    pub sample_rate: u32,
    pub alignment: u16,
    pub bits_per_sample: u16,
}

impl MiniFormat {
    /// Unpack a raw format word.
    pub const fn decode(raw: u32) -> Self {
        let codec = match raw & 0x3 {
            0 => WaveCodec::Pcm,
            1 => WaveCodec::Xma,
            2 => WaveCodec::MsAdpcm,
            _ => WaveCodec::Wma,
        };

        Self {
            codec,
            channels: ((raw >> 2) & 0x7) as u16,
            sample_rate: (raw >> 5) & 0x3_FFFF,
            alignment: ((raw >> 23) & 0xFF) as u16,
            bits_per_sample: if raw >> 31 == 1 { 16 } else { 8 },
        }
    }

    /// Pack back into a raw format word.
    pub const fn encode(&self) -> u32 {
        let codec = match self.codec {
            WaveCodec::Pcm => 0,
            WaveCodec::Xma => 1,
            WaveCodec::MsAdpcm => 2,
            WaveCodec::Wma => 3,
        };
        let wide = if self.bits_per_sample == 16 { 1 } else { 0 };

        codec
            | ((self.channels as u32 & 0x7) << 2)
            | ((self.sample_rate & 0x3_FFFF) << 5)
            | ((self.alignment as u32 & 0xFF) << 23)
            | (wide << 31)
    }

    /// Map to a decodable source format.
    pub fn source_format(&self) -> Result<SourceFormat> {
        let stereo = match self.channels {
            1 => false,
            2 => true,
            n => {
                return Err(Error::UnsupportedFormat(format!(
                    "{n} channel wave data"
                )))
            }
        };

        match (self.codec, stereo, self.bits_per_sample) {
            (WaveCodec::Pcm, false, 8) => Ok(SourceFormat::Mono8),
            (WaveCodec::Pcm, false, _) => Ok(SourceFormat::Mono16),
            (WaveCodec::Pcm, true, 8) => Ok(SourceFormat::Stereo8),
            (WaveCodec::Pcm, true, _) => Ok(SourceFormat::Stereo16),
            (WaveCodec::MsAdpcm, false, _) => Ok(SourceFormat::MonoMsAdpcm),
            (WaveCodec::MsAdpcm, true, _) => Ok(SourceFormat::StereoMsAdpcm),
            (codec, _, _) => Err(Error::UnsupportedFormat(format!(
                "no decoder for {codec:?}"
            ))),
        }
    }

    /// Compressed block alignment in bytes.
    pub const fn block_align(&self) -> usize {
        match self.codec {
            WaveCodec::MsAdpcm => (self.alignment as usize + 22) * self.channels as usize,
            _ => self.alignment as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_round_trip() {
        for format in [
            SourceFormat::Mono8,
            SourceFormat::Mono16,
            SourceFormat::Stereo8,
            SourceFormat::Stereo16,
            SourceFormat::MonoMsAdpcm,
            SourceFormat::StereoMsAdpcm,
        ] {
            assert_eq!(SourceFormat::from_flags(format.flags()).unwrap(), format);
        }
    }

    #[test]
    fn test_flags_rejected() {
        assert!(matches!(
            SourceFormat::from_flags(FLAG_ADPCM),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            SourceFormat::from_flags(0x10),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_frame_sizes() {
        assert_eq!(SourceFormat::Mono8.bytes_per_frame(), 1);
        assert_eq!(SourceFormat::Stereo16.bytes_per_frame(), 4);
        assert_eq!(SourceFormat::MonoMsAdpcm.bytes_per_frame(), 2);
        assert_eq!(SourceFormat::StereoMsAdpcm.bytes_per_frame(), 4);
    }

    #[test]
    fn test_mini_format_adpcm() {
        let format = MiniFormat {
            codec: WaveCodec::MsAdpcm,
            channels: 2,
            sample_rate: 44100,
            alignment: 48,
            bits_per_sample: 16,
        };
        let decoded = MiniFormat::decode(format.encode());

        assert_eq!(decoded, format);
        assert_eq!(decoded.block_align(), (48 + 22) * 2);
        assert_eq!(
            decoded.source_format().unwrap(),
            SourceFormat::StereoMsAdpcm
        );
    }

    #[test]
    fn test_mini_format_unsupported_codec() {
        let format = MiniFormat {
            codec: WaveCodec::Xma,
            channels: 2,
            sample_rate: 48000,
            alignment: 4,
            bits_per_sample: 16,
        };
        assert!(matches!(
            format.source_format(),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
