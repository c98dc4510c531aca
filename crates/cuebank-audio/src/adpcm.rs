//! Microsoft ADPCM block decoding.
//!
//! A block starts with a per-channel header (predictor index, delta and the
//! two most recent samples) followed by 4-bit nibbles, high nibble first.
//! Stereo payload bytes carry the left sample in the high nibble and the right
//! sample in the low nibble. Output is 16-bit little-endian PCM.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use cuebank_core::{Error, Result};

/// Step size scaling indexed by the encoded nibble.
pub const ADAPTATION_TABLE: [i32; 16] = [
    230, 230, 230, 230, 307, 409, 512, 614, 768, 614, 512, 409, 307, 230, 230, 230,
];

/// First predictor coefficient, indexed by the block predictor byte.
pub const COEFF1: [i32; 7] = [256, 512, 0, 192, 240, 460, 392];

/// Second predictor coefficient, indexed by the block predictor byte.
pub const COEFF2: [i32; 7] = [0, -256, 0, 64, 0, -208, -232];

/// Header bytes per channel: predictor index, delta, sample1, sample2.
pub const HEADER_BYTES_PER_CHANNEL: usize = 7;

/// Adaptive predictor state for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub coeff1: i32,
    pub coeff2: i32,
    pub delta: i32,
    pub sample1: i32,
    pub sample2: i32,
}

impl ChannelState {
    /// Decode one nibble and advance the predictor.
    ///
    /// Arithmetic wraps on overflow so malformed data degrades into noise
    /// instead of aborting playback.
    pub fn expand_nibble(&mut self, nibble: u8) -> i16 {
        let nibble = nibble & 0x0F;
        let signed = i32::from(nibble) - if nibble & 0x08 == 0 { 0 } else { 0x10 };

        let predicted = self
            .sample1
            .wrapping_mul(self.coeff1)
            .wrapping_add(self.sample2.wrapping_mul(self.coeff2))
            / 256;
        let predictor = predicted
            .wrapping_add(signed.wrapping_mul(self.delta))
            .clamp(i32::from(i16::MIN), i32::from(i16::MAX));

        self.sample2 = self.sample1;
        self.sample1 = predictor;
        self.delta = (ADAPTATION_TABLE[usize::from(nibble)].wrapping_mul(self.delta) / 256).max(16);

        predictor as i16
    }
}

/// Decoded PCM bytes produced by one block of `block_len` compressed bytes.
///
/// Blocks too short to hold a full header produce nothing.
pub const fn block_pcm_len(block_len: usize, channels: usize) -> usize {
    if channels == 0 {
        return 0;
    }
    let per_channel = block_len / channels;
    if per_channel < HEADER_BYTES_PER_CHANNEL {
        return 0;
    }
    ((per_channel - HEADER_BYTES_PER_CHANNEL) * 2 + 2) * 2 * channels
}

/// Total decoded PCM bytes for `data_len` compressed bytes.
pub const fn pcm_length(data_len: usize, block_align: usize, channels: usize) -> usize {
    if block_align == 0 {
        return 0;
    }
    (data_len / block_align) * block_pcm_len(block_align, channels)
        + block_pcm_len(data_len % block_align, channels)
}

/// Number of payload bytes that decode within a block of `block_len` bytes.
///
/// A stereo block with an odd trailing byte leaves that byte undecoded.
pub const fn payload_bytes(block_len: usize, channels: usize) -> usize {
    let pcm = block_pcm_len(block_len, channels);
    if pcm == 0 {
        return 0;
    }
    (pcm - 4 * channels) / 4
}

/// Load each channel's predictor state from a block header.
///
/// `block` must hold at least `7 * states.len()` bytes.
pub fn read_header(block: &[u8], states: &mut [ChannelState]) {
    let channels = states.len();
    let word = |offset: usize| i32::from(i16::from_le_bytes([block[offset], block[offset + 1]]));

    for (c, state) in states.iter_mut().enumerate() {
        let predictor = usize::from(block[c]).min(COEFF1.len() - 1);
        state.coeff1 = COEFF1[predictor];
        state.coeff2 = COEFF2[predictor];

        state.delta = word(channels + c * 2);
        state.sample1 = word(channels * 3 + c * 2);
        state.sample2 = word(channels * 5 + c * 2);
    }
}

/// Write the two header frames, oldest sample first.
///
/// `out` must hold at least `4 * states.len()` bytes.
pub fn write_header_pcm(states: &[ChannelState], out: &mut [u8]) {
    let channels = states.len();
    for (c, state) in states.iter().enumerate() {
        let older = (state.sample2 as i16).to_le_bytes();
        let newer = (state.sample1 as i16).to_le_bytes();
        out[c * 2..c * 2 + 2].copy_from_slice(&older);
        out[channels * 2 + c * 2..channels * 2 + c * 2 + 2].copy_from_slice(&newer);
    }
}

/// Decode one payload byte into two 16-bit samples.
pub fn expand_byte(byte: u8, states: &mut [ChannelState]) -> [u8; 4] {
    let last = states.len() - 1;
    let first = states[0].expand_nibble(byte >> 4);
    let second = states[last].expand_nibble(byte & 0x0F);

    let [a, b] = first.to_le_bytes();
    let [c, d] = second.to_le_bytes();
    [a, b, c, d]
}

/// Decode a single block, appending its PCM to `out`.
pub fn decode_block(block: &[u8], states: &mut [ChannelState], out: &mut Vec<u8>) {
    let channels = states.len();
    let payload = payload_bytes(block.len(), channels);
    if block_pcm_len(block.len(), channels) == 0 {
        return;
    }

    read_header(block, states);
    let mut header = [0u8; 8];
    write_header_pcm(states, &mut header);
    out.extend_from_slice(&header[..4 * channels]);

    let start = HEADER_BYTES_PER_CHANNEL * channels;
    for &byte in &block[start..start + payload] {
        out.extend_from_slice(&expand_byte(byte, states));
    }
}

/// Decode a whole compressed buffer in one pass.
pub fn decode(data: &[u8], channels: usize, block_align: usize) -> Result<Vec<u8>> {
    validate_layout(channels, block_align)?;

    let mut states = [ChannelState::default(); 2];
    let states = &mut states[..channels];
    let mut out = Vec::with_capacity(pcm_length(data.len(), block_align, channels));

    for block in data.chunks(block_align) {
        decode_block(block, states, &mut out);
    }
    Ok(out)
}

/// Check that a channel count and block alignment describe decodable blocks.
pub fn validate_layout(channels: usize, block_align: usize) -> Result<()> {
    if !(1..=2).contains(&channels) {
        return Err(Error::UnsupportedFormat(format!(
            "MS-ADPCM with {channels} channels"
        )));
    }
    if block_align < HEADER_BYTES_PER_CHANNEL * channels {
        return Err(Error::InvalidArgument(format!(
            "block alignment {block_align} cannot hold a {channels} channel header"
        )));
    }
    Ok(())
}
