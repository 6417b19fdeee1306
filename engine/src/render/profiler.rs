//! GPU Pass Timings
//!
//! Each frame pass writes a begin and end timestamp when the adapter
//! supports `TIMESTAMP_QUERY`. Results are read back without blocking: the
//! readback buffer is polled once per frame and given up on after
//! [`MAX_READBACK_ATTEMPTS`] frames, in which case the previous timings stay
//! visible. [`QueryReadback`] holds that state machine and needs no device.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use super::frame_plan::PassKind;

/// Frames a readback may stay unmapped before its results are dropped.
pub const MAX_READBACK_ATTEMPTS: u32 = 4;

const QUERY_COUNT: u32 = PassKind::ALL.len() as u32 * 2;

const MAP_WAITING: u8 = 0;
const MAP_OK: u8 = 1;
const MAP_FAILED: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadbackState {
    Idle,
    Recording,
    Pending { attempts: u32 },
    /// Results were abandoned; waiting for the map to land so the buffer
    /// can be reused
    Draining,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadbackOutcome {
    Idle,
    NotReady,
    Ready,
    Abandoned,
    Discarded,
}

#[derive(Clone, Debug)]
pub struct QueryReadback {
    state: ReadbackState,
    max_attempts: u32,
}

impl Default for QueryReadback {
    fn default() -> Self {
        Self::new(MAX_READBACK_ATTEMPTS)
    }
}

impl QueryReadback {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: ReadbackState::Idle,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn state(&self) -> ReadbackState {
        self.state
    }

    /// Start recording a frame. Fails while a previous frame is in flight.
    pub fn begin_recording(&mut self) -> bool {
        if self.state == ReadbackState::Idle {
            self.state = ReadbackState::Recording;
            true
        } else {
            false
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state == ReadbackState::Recording
    }

    /// The recorded frame was submitted and its buffer map requested.
    pub fn submitted(&mut self) {
        if self.state == ReadbackState::Recording {
            self.state = ReadbackState::Pending { attempts: 0 };
        }
    }

    /// Recording ended without anything worth reading.
    pub fn cancel(&mut self) {
        if self.state == ReadbackState::Recording {
            self.state = ReadbackState::Idle;
        }
    }

    /// Advance one frame given whether the buffer map has completed.
    pub fn poll(&mut self, mapped: bool) -> ReadbackOutcome {
        match self.state {
            ReadbackState::Idle | ReadbackState::Recording => ReadbackOutcome::Idle,
            ReadbackState::Pending { .. } | ReadbackState::Draining if mapped => {
                let outcome = if self.state == ReadbackState::Draining {
                    ReadbackOutcome::Discarded
                } else {
                    ReadbackOutcome::Ready
                };
                self.state = ReadbackState::Idle;
                outcome
            }
            ReadbackState::Pending { attempts } => {
                let attempts = attempts + 1;
                if attempts >= self.max_attempts {
                    self.state = ReadbackState::Draining;
                    ReadbackOutcome::Abandoned
                } else {
                    self.state = ReadbackState::Pending { attempts };
                    ReadbackOutcome::NotReady
                }
            }
            ReadbackState::Draining => ReadbackOutcome::NotReady,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassTiming {
    pub pass: PassKind,
    pub milliseconds: f64,
}

struct QueryResources {
    query_set: wgpu::QuerySet,
    resolve: wgpu::Buffer,
    readback: wgpu::Buffer,
    map_state: Arc<AtomicU8>,
    period_ns: f32,
}

pub struct GpuProfiler {
    resources: Option<QueryResources>,
    readback: QueryReadback,
    /// Passes that wrote timestamps in the frame being recorded
    recording: Vec<PassKind>,
    /// Passes of the frame whose results are in flight
    in_flight: Vec<PassKind>,
    timings: Vec<PassTiming>,
}

impl GpuProfiler {
    /// Returns a disabled profiler when timestamps are unsupported.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, timestamps: bool) -> Self {
        let resources = timestamps.then(|| {
            let size = QUERY_COUNT as u64 * std::mem::size_of::<u64>() as u64;
            QueryResources {
                query_set: device.create_query_set(&wgpu::QuerySetDescriptor {
                    label: Some("Pass Timestamps"),
                    ty: wgpu::QueryType::Timestamp,
                    count: QUERY_COUNT,
                }),
                resolve: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Timestamp Resolve"),
                    size,
                    usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                }),
                readback: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Timestamp Readback"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                map_state: Arc::new(AtomicU8::new(MAP_WAITING)),
                period_ns: queue.get_timestamp_period(),
            }
        });
        log::info!(
            "[GpuProfiler] pass timestamps {}",
            if resources.is_some() { "enabled" } else { "unavailable" }
        );
        Self {
            resources,
            readback: QueryReadback::default(),
            recording: Vec::new(),
            in_flight: Vec::new(),
            timings: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.resources.is_some()
    }

    pub fn begin_frame(&mut self) {
        self.recording.clear();
        if self.resources.is_some() && !self.readback.begin_recording() {
            log::trace!("[GpuProfiler] previous readback in flight, not timing this frame");
        }
    }

    /// Timestamp writes for one render pass of `pass`. The first render
    /// pass of a frame pass writes the begin stamp; every one writes the
    /// end stamp, so the last one wins.
    pub fn timestamp_writes(&mut self, pass: PassKind) -> Option<wgpu::RenderPassTimestampWrites<'_>> {
        if !self.readback.is_recording() {
            return None;
        }
        let resources = self.resources.as_ref()?;
        let (begin, end) = timestamp_slots(&mut self.recording, pass);
        Some(wgpu::RenderPassTimestampWrites {
            query_set: &resources.query_set,
            beginning_of_pass_write_index: begin,
            end_of_pass_write_index: Some(end),
        })
    }

    /// Copy the frame's queries into the readback buffer.
    pub fn resolve(&mut self, encoder: &mut wgpu::CommandEncoder) {
        let Some(resources) = &self.resources else {
            return;
        };
        if !self.readback.is_recording() {
            return;
        }
        if self.recording.is_empty() {
            self.readback.cancel();
            return;
        }
        encoder.resolve_query_set(&resources.query_set, 0..QUERY_COUNT, &resources.resolve, 0);
        encoder.copy_buffer_to_buffer(&resources.resolve, 0, &resources.readback, 0, resources.resolve.size());
    }

    /// Request the map after the frame's command buffer was submitted.
    pub fn after_submit(&mut self) {
        let Some(resources) = &self.resources else {
            return;
        };
        if !self.readback.is_recording() {
            return;
        }
        resources.map_state.store(MAP_WAITING, Ordering::Release);
        let state = Arc::clone(&resources.map_state);
        resources.readback.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            state.store(if result.is_ok() { MAP_OK } else { MAP_FAILED }, Ordering::Release);
        });
        self.in_flight = std::mem::take(&mut self.recording);
        self.readback.submitted();
    }

    /// Non-blocking readback step, called once per frame.
    pub fn poll(&mut self, device: &wgpu::Device) {
        let Some(resources) = &self.resources else {
            return;
        };
        if matches!(self.readback.state(), ReadbackState::Idle | ReadbackState::Recording) {
            return;
        }
        if let Err(err) = device.poll(wgpu::PollType::Poll) {
            log::warn!("[GpuProfiler] device poll failed: {err}");
        }
        let map_state = resources.map_state.load(Ordering::Acquire);
        match self.readback.poll(map_state != MAP_WAITING) {
            ReadbackOutcome::Ready if map_state == MAP_OK => {
                let timings = {
                    let data = resources.readback.slice(..).get_mapped_range();
                    let stamps: &[u64] = bytemuck::cast_slice(&data);
                    pass_timings(&self.in_flight, stamps, resources.period_ns)
                };
                resources.readback.unmap();
                self.timings = timings;
            }
            ReadbackOutcome::Ready => {
                log::warn!("[GpuProfiler] timestamp readback failed to map, keeping previous timings");
            }
            ReadbackOutcome::Discarded => {
                if map_state == MAP_OK {
                    resources.readback.unmap();
                }
            }
            ReadbackOutcome::Abandoned => {
                log::debug!(
                    "[GpuProfiler] readback not ready after {MAX_READBACK_ATTEMPTS} frames, keeping stale timings"
                );
            }
            ReadbackOutcome::NotReady | ReadbackOutcome::Idle => {}
        }
    }

    /// Most recent completed timings; stale when readbacks were abandoned.
    pub fn timings(&self) -> &[PassTiming] {
        &self.timings
    }
}

/// Query indices for the next render pass of `pass`: the begin slot only
/// when `pass` has not recorded yet this frame, and always the end slot.
fn timestamp_slots(recording: &mut Vec<PassKind>, pass: PassKind) -> (Option<u32>, u32) {
    let slot = pass as u32 * 2;
    let first = !recording.contains(&pass);
    if first {
        recording.push(pass);
    }
    (first.then_some(slot), slot + 1)
}

/// Convert raw begin/end ticks into milliseconds per pass.
pub fn pass_timings(passes: &[PassKind], stamps: &[u64], period_ns: f32) -> Vec<PassTiming> {
    passes
        .iter()
        .filter_map(|pass| {
            let slot = *pass as usize * 2;
            let (begin, end) = (*stamps.get(slot)?, *stamps.get(slot + 1)?);
            let ticks = end.saturating_sub(begin);
            Some(PassTiming {
                pass: *pass,
                milliseconds: ticks as f64 * period_ns as f64 / 1_000_000.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_on_first_poll() {
        let mut readback = QueryReadback::default();
        assert!(readback.begin_recording());
        readback.submitted();
        assert_eq!(readback.poll(true), ReadbackOutcome::Ready);
        assert_eq!(readback.state(), ReadbackState::Idle);
    }

    #[test]
    fn test_no_recording_while_in_flight() {
        let mut readback = QueryReadback::default();
        readback.begin_recording();
        readback.submitted();
        assert!(!readback.begin_recording());
    }

    #[test]
    fn test_abandoned_after_bounded_attempts() {
        let mut readback = QueryReadback::new(3);
        readback.begin_recording();
        readback.submitted();
        assert_eq!(readback.poll(false), ReadbackOutcome::NotReady);
        assert_eq!(readback.poll(false), ReadbackOutcome::NotReady);
        assert_eq!(readback.poll(false), ReadbackOutcome::Abandoned);
        assert_eq!(readback.state(), ReadbackState::Draining);
        // late results are thrown away, then recording resumes
        assert_eq!(readback.poll(false), ReadbackOutcome::NotReady);
        assert_eq!(readback.poll(true), ReadbackOutcome::Discarded);
        assert!(readback.begin_recording());
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut readback = QueryReadback::default();
        readback.begin_recording();
        readback.cancel();
        assert_eq!(readback.poll(false), ReadbackOutcome::Idle);
    }

    #[test]
    fn test_sub_passes_span_first_begin_to_last_end() {
        let mut recording = Vec::new();
        let slot = PassKind::BloomBlur as u32 * 2;
        // three render passes of one kind, interleaved with another kind
        assert_eq!(timestamp_slots(&mut recording, PassKind::BloomBlur), (Some(slot), slot + 1));
        assert_eq!(timestamp_slots(&mut recording, PassKind::BloomBlur), (None, slot + 1));
        timestamp_slots(&mut recording, PassKind::ToneMap);
        assert_eq!(timestamp_slots(&mut recording, PassKind::BloomBlur), (None, slot + 1));
        assert_eq!(recording, vec![PassKind::BloomBlur, PassKind::ToneMap]);

        // the resolved span is the first begin to the last end
        let mut stamps = vec![0u64; QUERY_COUNT as usize];
        stamps[slot as usize] = 100;
        stamps[slot as usize + 1] = 900;
        let timings = pass_timings(&[PassKind::BloomBlur], &stamps, 1_000_000.0);
        assert!((timings[0].milliseconds - 800.0).abs() < 1e-6);
    }

    #[test]
    fn test_pass_timings_use_period() {
        let mut stamps = vec![0u64; QUERY_COUNT as usize];
        let slot = PassKind::Lighting as usize * 2;
        stamps[slot] = 1_000;
        stamps[slot + 1] = 3_000;
        let timings = pass_timings(&[PassKind::Lighting], &stamps, 1.0);
        assert_eq!(timings.len(), 1);
        assert!((timings[0].milliseconds - 0.002).abs() < 1e-9);
    }
}
