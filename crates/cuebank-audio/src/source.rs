//! Compressed audio sources and seekable decode cursors.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cuebank_core::{Error, MiniFormat, Result, SourceFormat};
use tracing::trace;

use crate::adpcm::{self, ChannelState, HEADER_BYTES_PER_CHANNEL};

/// Immutable wave data plus the metadata needed to decode it.
///
/// Shared read-only between any number of cursors.
#[derive(Debug, Clone)]
pub struct CompressedAudioSource {
    data: Bytes,
    format: SourceFormat,
    sample_rate: u32,
    block_align: usize,
    length: usize,
}

impl CompressedAudioSource {
    pub fn new(
        data: impl Into<Bytes>,
        format: SourceFormat,
        sample_rate: u32,
        block_align: usize,
    ) -> Result<Self> {
        let data = data.into();
        if sample_rate == 0 {
            return Err(Error::InvalidArgument("sample rate must be non-zero".into()));
        }

        let channels = usize::from(format.channels());
        let length = if format.is_adpcm() {
            adpcm::validate_layout(channels, block_align)?;
            adpcm::pcm_length(data.len(), block_align, channels)
        } else {
            data.len()
        };

        Ok(Self {
            data,
            format,
            sample_rate,
            block_align,
            length,
        })
    }

    /// Build from a packed wave bank format word.
    pub fn from_mini_format(data: impl Into<Bytes>, raw_format: u32) -> Result<Self> {
        let mini = MiniFormat::decode(raw_format);
        Self::new(data, mini.source_format()?, mini.sample_rate, mini.block_align())
    }

    /// Decoded PCM length in bytes.
    pub const fn length(&self) -> usize {
        self.length
    }

    pub fn duration(&self) -> Duration {
        let bytes_per_second = u64::from(self.sample_rate) * self.format.bytes_per_frame() as u64;
        Duration::from_secs_f64(self.length as f64 / bytes_per_second as f64)
    }

    pub const fn format(&self) -> SourceFormat {
        self.format
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn block_align(&self) -> usize {
        self.block_align
    }

    /// Raw compressed bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Open a new cursor positioned at the start.
    pub fn cursor(self: &Arc<Self>) -> DecodeCursor {
        DecodeCursor::new(Arc::clone(self))
    }

    /// Decoded PCM bytes produced by one full block.
    fn block_pcm(&self) -> usize {
        adpcm::block_pcm_len(self.block_align, self.channels())
    }

    fn channels(&self) -> usize {
        usize::from(self.format.channels())
    }
}

/// Per-playback read position into a source.
///
/// Reads may start anywhere. Bytes decoded past the end of a request are
/// cached and served to the next sequential read.
#[derive(Debug)]
pub struct DecodeCursor {
    source: Option<Arc<CompressedAudioSource>>,
    /// Compressed offset of the next undecoded unit.
    read_head: usize,
    /// PCM offset of the first cached byte (or of `read_head` when empty).
    pcm_head: usize,
    states: [ChannelState; 2],
    cache: [u8; 8],
    cache_len: usize,
    restarts: u32,
}

impl DecodeCursor {
    pub fn new(source: Arc<CompressedAudioSource>) -> Self {
        let mut cursor = Self::detached();
        cursor.source = Some(source);
        cursor
    }

    /// A cursor with no source; reads fail until one is set.
    pub const fn detached() -> Self {
        Self {
            source: None,
            read_head: 0,
            pcm_head: 0,
            states: [ChannelState {
                coeff1: 0,
                coeff2: 0,
                delta: 0,
                sample1: 0,
                sample2: 0,
            }; 2],
            cache: [0; 8],
            cache_len: 0,
            restarts: 0,
        }
    }

    /// Retarget to another source, clearing all decode state.
    pub fn set_source(&mut self, source: Option<Arc<CompressedAudioSource>>) {
        *self = Self::detached();
        self.source = source;
    }

    /// Detach from the current source.
    pub fn reset(&mut self) {
        self.set_source(None);
    }

    pub fn source(&self) -> Option<&Arc<CompressedAudioSource>> {
        self.source.as_ref()
    }

    /// PCM offset the next sequential read starts at.
    pub const fn position(&self) -> usize {
        self.pcm_head
    }

    /// Compressed offset of the next undecoded byte.
    pub const fn read_head(&self) -> usize {
        self.read_head
    }

    /// Seek back to `pcm_offset` for another pass and count the restart.
    pub fn restart(&mut self, pcm_offset: usize) -> Result<()> {
        let source = self.require_source()?;
        self.seek(&source, pcm_offset);
        self.restarts += 1;
        trace!(offset = pcm_offset, restarts = self.restarts, "Decode cursor restarted");
        Ok(())
    }

    /// Number of restarts since the source was set.
    pub const fn restart_count(&self) -> u32 {
        self.restarts
    }

    /// Fill `dest` with decoded PCM starting at byte `start`.
    ///
    /// Bytes past the end of the source are zero-filled. Returns how many
    /// bytes came from the source.
    pub fn read_into(&mut self, dest: &mut [u8], start: usize) -> Result<usize> {
        let source = self.require_source()?;

        let produced = if source.format.is_adpcm() {
            if start != self.pcm_head {
                self.seek(&source, start);
            }
            self.decode_into(&source, dest)
        } else {
            let available = source.length.saturating_sub(start).min(dest.len());
            if available > 0 {
                dest[..available].copy_from_slice(&source.data[start..start + available]);
            }
            self.pcm_head = start + available;
            self.read_head = self.pcm_head;
            available
        };

        dest[produced..].fill(0);
        Ok(produced)
    }

    fn require_source(&self) -> Result<Arc<CompressedAudioSource>> {
        self.source
            .clone()
            .ok_or_else(|| Error::InvalidArgument("decode cursor has no source".into()))
    }

    /// Serve the cache, then decode whole units until `dest` is full.
    fn decode_into(&mut self, source: &CompressedAudioSource, dest: &mut [u8]) -> usize {
        let mut written = self.drain_cache(dest);

        let mut unit = [0u8; 8];
        while written < dest.len() {
            let Some(len) = self.next_unit(source, &mut unit) else {
                break;
            };

            let take = len.min(dest.len() - written);
            dest[written..written + take].copy_from_slice(&unit[..take]);
            written += take;
            self.pcm_head += take;

            if take < len {
                self.cache[..len - take].copy_from_slice(&unit[take..len]);
                self.cache_len = len - take;
            }
        }
        written
    }

    fn drain_cache(&mut self, dest: &mut [u8]) -> usize {
        let take = self.cache_len.min(dest.len());
        dest[..take].copy_from_slice(&self.cache[..take]);
        self.cache.copy_within(take..self.cache_len, 0);
        self.cache_len -= take;
        self.pcm_head += take;
        take
    }

    /// Position at `pcm_offset` by decoding from the start of its block.
    fn seek(&mut self, source: &CompressedAudioSource, pcm_offset: usize) {
        self.cache_len = 0;

        let block_pcm = source.block_pcm();
        if pcm_offset >= source.length || block_pcm == 0 {
            self.read_head = source.data.len();
            self.pcm_head = pcm_offset;
            return;
        }

        let block = pcm_offset / block_pcm;
        self.read_head = block * source.block_align;
        self.pcm_head = block * block_pcm;

        let mut unit = [0u8; 8];
        while let Some(len) = self.next_unit(source, &mut unit) {
            if self.pcm_head + len > pcm_offset {
                let skip = pcm_offset - self.pcm_head;
                self.cache[..len - skip].copy_from_slice(&unit[skip..len]);
                self.cache_len = len - skip;
                break;
            }
            self.pcm_head += len;
        }
        self.pcm_head = pcm_offset;
    }

    /// Decode the header or payload byte at `read_head` into `unit`.
    fn next_unit(&mut self, source: &CompressedAudioSource, unit: &mut [u8; 8]) -> Option<usize> {
        let channels = source.channels();
        let header_len = HEADER_BYTES_PER_CHANNEL * channels;
        let states = &mut self.states[..channels];

        loop {
            let data = &source.data;
            if self.read_head >= data.len() {
                return None;
            }

            let block_start = self.read_head - self.read_head % source.block_align;
            let block_len = source.block_align.min(data.len() - block_start);
            if adpcm::block_pcm_len(block_len, channels) == 0 {
                self.read_head = data.len();
                return None;
            }

            let offset = self.read_head - block_start;
            if offset == 0 {
                adpcm::read_header(&data[block_start..block_start + header_len], states);
                adpcm::write_header_pcm(states, unit);
                self.read_head += header_len;
                return Some(4 * channels);
            }

            if offset < header_len + adpcm::payload_bytes(block_len, channels) {
                *unit = [0; 8];
                unit[..4].copy_from_slice(&adpcm::expand_byte(data[self.read_head], states));
                self.read_head += 1;
                return Some(4);
            }

            // Undecodable trailing byte; move on to the next block.
            self.read_head = block_start + block_len;
        }
    }
}
