//! Streaming buffer scheduler.
//!
//! Each playing stream owns one worker thread, one decode cursor and one
//! buffer ring. The worker keeps the voice fed, restarts at the loop region
//! while loops remain, and tears the voice down once drained or stopped.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use cuebank_core::{Error, Result, INFINITE_LOOPS};
use tracing::{debug, error, info, trace, warn};

use crate::buffer::BufferRing;
use crate::config::StreamConfig;
use crate::signal::Signal;
use crate::sink::{VoiceFormat, VoiceHandle, VoiceParams, VoiceSink};
use crate::source::{CompressedAudioSource, DecodeCursor};

/// Lifecycle of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Filling = 0,
    Playing = 1,
    Draining = 2,
    Stopped = 3,
}

impl StreamState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Filling,
            1 => Self::Playing,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Every buffer played.
    Finished,
    /// `stop` was called.
    Requested,
    /// The sink or decoder failed.
    Error(String),
}

/// Notifications from a stream worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Started,
    /// Decoding went back to the loop start; `count` is the total so far.
    LoopRestarted { count: u32 },
    /// No data left to queue.
    Draining,
    Stopped { reason: StopReason },
}

/// PCM byte range replayed while loops remain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopRegion {
    pub start: usize,
    /// Zero means "to the end of the source".
    pub length: usize,
}

impl LoopRegion {
    pub const fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    /// Frame-aligned `[start, end)` inside a source of `length` bytes, or
    /// `None` when the region is empty.
    fn bounds(&self, length: usize, frame: usize) -> Option<(usize, usize)> {
        let start = self.start - self.start % frame;
        let end = if self.length == 0 {
            length
        } else {
            self.start.saturating_add(self.length).min(length)
        };
        let end = end - end % frame;
        (start < end).then_some((start, end))
    }
}

/// Everything needed to start a stream.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub source: Arc<CompressedAudioSource>,
    /// Extra passes over the loop region; 255 loops forever.
    pub loop_count: u8,
    pub loop_region: LoopRegion,
    /// Voice parameters applied before playback starts.
    pub params: VoiceParams,
}

impl StreamRequest {
    pub fn new(source: Arc<CompressedAudioSource>) -> Self {
        Self {
            source,
            loop_count: 0,
            loop_region: LoopRegion::default(),
            params: VoiceParams::default(),
        }
    }
}

struct StreamShared {
    state: AtomicU8,
    stop_requested: AtomicBool,
    loops: AtomicU32,
}

impl StreamShared {
    fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

/// Owner's view of a running stream. Dropping it stops the stream.
pub struct StreamHandle {
    voice: VoiceHandle,
    sink: Arc<dyn VoiceSink>,
    shared: Arc<StreamShared>,
    wake: Signal,
    done: Signal,
    events: Receiver<StreamEvent>,
}

impl StreamHandle {
    /// Create a voice, queue the first buffers, start playback and hand the
    /// stream to a worker thread.
    pub fn start(
        sink: Arc<dyn VoiceSink>,
        request: StreamRequest,
        config: &StreamConfig,
    ) -> Result<Self> {
        config.validate()?;

        let source = request.source;
        let format = source.format();
        let wake = Signal::new();
        let voice = sink.create_voice(
            VoiceFormat::pcm(format.channels(), source.sample_rate(), format.bits_per_sample()),
            wake.clone(),
        )?;

        let shared = Arc::new(StreamShared {
            state: AtomicU8::new(StreamState::Filling as u8),
            stop_requested: AtomicBool::new(false),
            loops: AtomicU32::new(0),
        });
        let done = Signal::new();
        let (event_tx, events) = unbounded();

        let feeder = Feeder::new(&source, request.loop_count, request.loop_region);
        let mut worker = StreamWorker {
            sink: Arc::clone(&sink),
            voice,
            feeder,
            ring: BufferRing::new(config.buffer_count, config.buffer_size),
            wake: wake.clone(),
            done: done.clone(),
            shared: Arc::clone(&shared),
            events: event_tx,
            timeout: config.wait_timeout(),
        };

        if let Err(e) = worker.prime(&request.params) {
            worker.teardown(StopReason::Error(e.to_string()));
            return Err(e);
        }

        let cleanup = Arc::clone(&sink);
        std::thread::Builder::new()
            .name("stream-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                let _ = cleanup.release(voice);
                Error::Internal(format!("Failed to spawn stream worker: {e}"))
            })?;

        Ok(Self {
            voice,
            sink,
            shared,
            wake,
            done,
            events,
        })
    }

    pub const fn voice(&self) -> VoiceHandle {
        self.voice
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == StreamState::Stopped
    }

    /// Passes restarted so far.
    pub fn loops_played(&self) -> u32 {
        self.shared.loops.load(Ordering::Acquire)
    }

    /// Ask the worker to stop. Returns immediately; idempotent.
    pub fn stop(&self) {
        if !self.shared.stop_requested.swap(true, Ordering::AcqRel) {
            debug!(voice = self.voice.0, "Stream stop requested");
        }
        self.wake.notify();
    }

    pub fn pause(&self) -> Result<()> {
        self.sink.pause(self.voice)
    }

    pub fn resume(&self) -> Result<()> {
        self.sink.resume(self.voice)
    }

    pub fn set_params(&self, params: &VoiceParams) -> Result<()> {
        self.sink.set_params(self.voice, params)
    }

    /// Block until the worker has torn down, up to `timeout`.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        self.is_stopped() || self.done.wait(timeout) || self.is_stopped()
    }

    pub const fn events(&self) -> &Receiver<StreamEvent> {
        &self.events
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Result of filling one buffer.
#[derive(Debug, Default, PartialEq, Eq)]
struct Fill {
    bytes: usize,
    restarts: u32,
    exhausted: bool,
}

/// Walks a source front to back, jumping to the loop start while loops remain.
struct Feeder {
    cursor: DecodeCursor,
    head: usize,
    end: usize,
    region: Option<(usize, usize)>,
    loop_count: u8,
    times_played: u32,
}

impl Feeder {
    fn new(source: &Arc<CompressedAudioSource>, loop_count: u8, region: LoopRegion) -> Self {
        let frame = source.format().bytes_per_frame();
        let end = source.length() - source.length() % frame;

        Self {
            cursor: source.cursor(),
            head: 0,
            end,
            region: region.bounds(end, frame),
            loop_count,
            times_played: 0,
        }
    }

    fn loops_remaining(&self) -> bool {
        self.region.is_some()
            && (self.loop_count == INFINITE_LOOPS || self.times_played < u32::from(self.loop_count))
    }

    fn segment_end(&self) -> usize {
        match self.region {
            Some((_, end)) if self.loops_remaining() && self.head <= end => end,
            _ => self.end,
        }
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<Fill> {
        let mut fill = Fill::default();

        while fill.bytes < buf.len() {
            let end = self.segment_end();
            if self.head >= end {
                match self.region {
                    Some((start, _)) if self.loops_remaining() => {
                        self.cursor.restart(start)?;
                        self.head = start;
                        self.times_played += 1;
                        fill.restarts += 1;
                        continue;
                    }
                    _ => {
                        fill.exhausted = true;
                        break;
                    }
                }
            }

            let n = (buf.len() - fill.bytes).min(end - self.head);
            self.cursor
                .read_into(&mut buf[fill.bytes..fill.bytes + n], self.head)?;
            fill.bytes += n;
            self.head += n;
        }

        if !fill.exhausted && self.head >= self.end && !self.loops_remaining() {
            fill.exhausted = true;
        }
        Ok(fill)
    }
}

struct StreamWorker {
    sink: Arc<dyn VoiceSink>,
    voice: VoiceHandle,
    feeder: Feeder,
    ring: BufferRing,
    wake: Signal,
    done: Signal,
    shared: Arc<StreamShared>,
    events: Sender<StreamEvent>,
    timeout: Duration,
}

impl StreamWorker {
    /// Fill and submit every buffer, then start the voice.
    fn prime(&mut self, params: &VoiceParams) -> Result<()> {
        self.sink.set_params(self.voice, params)?;
        self.refill()?;

        self.sink.play(self.voice)?;
        self.shared.set_state(StreamState::Playing);
        let _ = self.events.send(StreamEvent::Started);
        info!(
            voice = self.voice.0,
            buffers = self.ring.in_flight(),
            "Stream started"
        );

        if self.ring.is_finished() {
            self.enter_draining();
        }
        Ok(())
    }

    fn run(mut self) {
        let reason = loop {
            if self.shared.stop_requested() {
                break StopReason::Requested;
            }
            if self.ring.is_finished() && self.ring.in_flight() == 0 {
                break StopReason::Finished;
            }

            self.wake.wait(self.timeout);

            if let Err(e) = self.service() {
                error!(voice = self.voice.0, "Stream worker failed: {e}");
                break StopReason::Error(e.to_string());
            }
        };

        self.teardown(reason);
    }

    /// Reclaim finished buffers and queue replacements.
    fn service(&mut self) -> Result<()> {
        let finished = self.sink.buffers_finished(self.voice)?;
        let released = self.ring.release(finished);
        if released > 0 {
            trace!(voice = self.voice.0, released, "Buffers finished");
        }

        self.refill()?;
        if self.ring.is_finished() && self.shared.state() == StreamState::Playing {
            self.enter_draining();
        }
        Ok(())
    }

    fn refill(&mut self) -> Result<()> {
        while !self.ring.is_finished() && !self.shared.stop_requested() {
            let Some(buf) = self.ring.next_free() else {
                break;
            };

            let fill = self.feeder.fill(buf)?;
            if fill.bytes > 0 {
                self.sink.submit_buffer(self.voice, &buf[..fill.bytes])?;
                self.ring.mark_submitted();
            }

            for _ in 0..fill.restarts {
                let count = self.shared.loops.fetch_add(1, Ordering::AcqRel) + 1;
                debug!(voice = self.voice.0, count, "Stream loop restarted");
                let _ = self.events.send(StreamEvent::LoopRestarted { count });
            }

            if fill.exhausted {
                self.ring.set_finished();
            }
        }
        Ok(())
    }

    fn enter_draining(&self) {
        debug!(voice = self.voice.0, "Stream draining");
        self.shared.set_state(StreamState::Draining);
        let _ = self.events.send(StreamEvent::Draining);
    }

    fn teardown(&self, reason: StopReason) {
        if let Err(e) = self.sink.stop(self.voice) {
            warn!(voice = self.voice.0, "Failed to stop voice: {e}");
        }
        if let Err(e) = self.sink.release(self.voice) {
            warn!(voice = self.voice.0, "Failed to release voice: {e}");
        }

        self.shared.set_state(StreamState::Stopped);
        info!(voice = self.voice.0, ?reason, "Stream stopped");
        let _ = self.events.send(StreamEvent::Stopped { reason });
        self.done.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::{ConsumeMode, Mixer};
    use cuebank_core::SourceFormat;

    fn pcm_source(bytes: usize) -> Arc<CompressedAudioSource> {
        let data: Vec<u8> = (0..bytes).map(|i| (i % 251) as u8).collect();
        Arc::new(CompressedAudioSource::new(data, SourceFormat::Mono16, 8000, 2).unwrap())
    }

    fn small_config() -> StreamConfig {
        StreamConfig {
            buffer_count: 3,
            buffer_size: 64,
            wait_timeout_ms: 20,
        }
    }

    fn collect_events(handle: &StreamHandle) -> Vec<StreamEvent> {
        handle.events().try_iter().collect()
    }

    #[test]
    fn test_loop_region_bounds() {
        assert_eq!(LoopRegion::new(0, 0).bounds(100, 2), Some((0, 100)));
        assert_eq!(LoopRegion::new(11, 20).bounds(100, 4), Some((8, 28)));
        assert_eq!(LoopRegion::new(90, 50).bounds(100, 2), Some((90, 100)));
        assert_eq!(LoopRegion::new(100, 0).bounds(100, 2), None);
    }

    #[test]
    fn test_feeder_plays_once_without_loops() {
        let source = pcm_source(100);
        let mut feeder = Feeder::new(&source, 0, LoopRegion::default());

        let mut buf = [0u8; 64];
        let first = feeder.fill(&mut buf).unwrap();
        assert_eq!(first.bytes, 64);
        assert!(!first.exhausted);

        let second = feeder.fill(&mut buf).unwrap();
        assert_eq!(second.bytes, 36);
        assert!(second.exhausted);
    }

    #[test]
    fn test_feeder_loops_seamlessly() {
        let source = pcm_source(40);
        let mut feeder = Feeder::new(&source, 2, LoopRegion::new(20, 0));

        let mut buf = [0u8; 64];
        let fill = feeder.fill(&mut buf).unwrap();
        assert_eq!(fill.bytes, 64);
        assert_eq!(fill.restarts, 2);
        assert!(!fill.exhausted);

        // 40 bytes, then the 20 byte loop twice leaves 4 bytes of the last pass.
        assert_eq!(buf[40..44], buf[20..24]);
        assert_eq!(buf[60..64], buf[20..24]);

        let fill = feeder.fill(&mut buf).unwrap();
        assert_eq!(fill.bytes, 16);
        assert!(fill.exhausted);
    }

    #[test]
    fn test_stream_plays_to_completion() {
        let mixer = Arc::new(Mixer::new(ConsumeMode::Immediate));
        let handle =
            StreamHandle::start(mixer.clone(), StreamRequest::new(pcm_source(1000)), &small_config())
                .unwrap();

        assert!(handle.wait_stopped(Duration::from_secs(5)));
        assert_eq!(mixer.total_submitted(), 16);
        assert_eq!(mixer.voice_count(), 0);

        let events = collect_events(&handle);
        assert_eq!(events.first(), Some(&StreamEvent::Started));
        assert!(events.contains(&StreamEvent::Draining));
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Stopped {
                reason: StopReason::Finished
            })
        );
    }

    #[test]
    fn test_stop_halts_submissions() {
        let mixer = Arc::new(Mixer::new(ConsumeMode::Manual));
        let handle =
            StreamHandle::start(mixer.clone(), StreamRequest::new(pcm_source(10_000)), &small_config())
                .unwrap();
        assert_eq!(handle.state(), StreamState::Playing);
        assert_eq!(mixer.total_submitted(), 3);

        handle.stop();
        handle.stop();
        assert!(handle.wait_stopped(Duration::from_secs(5)));

        let submitted = mixer.total_submitted();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(mixer.total_submitted(), submitted);
        assert!(matches!(
            mixer.state(handle.voice()),
            Err(Error::VoiceNotFound(_))
        ));
    }

    #[test]
    fn test_never_more_than_ring_in_flight() {
        let mixer = Arc::new(Mixer::new(ConsumeMode::Manual));
        let handle =
            StreamHandle::start(mixer.clone(), StreamRequest::new(pcm_source(10_000)), &small_config())
                .unwrap();
        let voice = handle.voice();

        for _ in 0..5 {
            assert!(mixer.queued(voice).unwrap() <= 3);
            mixer.complete(voice, 1).unwrap();
            std::thread::sleep(Duration::from_millis(30));
        }
        assert_eq!(mixer.queued(voice).unwrap(), 3);
        assert_eq!(mixer.total_submitted(), 8);
    }
}
