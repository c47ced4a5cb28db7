// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Device abstraction: a polymorphic device trait plus
//! its state machine, replacing an opaque vtable-over-struct pattern with a
//! plain trait object. ALSA/Bluetooth backends are named non-goals; this
//! module implements the trait boundary plus the silent and loopback
//! backends in full.

use std::time::{Duration, Instant};

use audiomux_core::AudioFormat;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("configure failed: {0}")]
    ConfigureFailed(String),
    #[error("severe underrun: hardware pointer stopped advancing")]
    SevereUnderrun,
    #[error("close failed: {0}")]
    CloseFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Open,
    NormalRun,
    NoStreamRun,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Output,
    Input,
}

/// Result of `prepare_output_before_write_samples` / the input-side
/// equivalent: either the device is ready to run normally, or it should
/// fall back to no-stream-run bookkeeping this wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareResult {
    NormalRun,
    NoStreamRun,
}

/// Hardware level plus the instant it was sampled at, as returned by
/// `frames_queued`.
#[derive(Debug, Clone, Copy)]
pub struct LevelTimestamp {
    pub level: u32,
    pub tstamp: Instant,
}

/// The capability set every device backend implements. Real
/// hardware acquisition (ALSA/Bluetooth transport) is a named non-goal;
/// backends here are `SilentDevice`, `LoopbackDevice`, and the flexible
/// loopback pair's two sides (`crate::floop`).
pub trait Device: Send {
    fn direction(&self) -> Direction;
    fn state(&self) -> DeviceState;

    /// Supported sample rates, used by the gcd-distance fallback.
    fn supported_rates(&self) -> &[u32];
    /// Supported channel counts, used by the 2-channel fallback.
    fn supported_channel_counts(&self) -> &[u8];

    fn configure(&mut self, format: AudioFormat) -> Result<AudioFormat, DeviceError>;
    fn frames_queued(&mut self) -> Result<LevelTimestamp, DeviceError>;

    /// Requests up to `frames` of buffer space; returns the area actually
    /// granted (`min(requested, device-buffer-space)`) as a frame count
    /// over the backing store the caller already knows how to address.
    fn get_buffer(&mut self, frames: u32) -> Result<u32, DeviceError>;
    fn put_buffer(&mut self, frames: u32) -> Result<(), DeviceError>;

    fn flush_buffer(&mut self);
    fn no_stream(&mut self, enabled: bool);

    /// Initiate a volume ramp; `current_effective_volume == 0.0` is handled
    /// by the caller's zero-volume rule, not by the backend.
    fn start_ramp(&mut self) {}

    fn close(&mut self) -> Result<(), DeviceError>;

    fn min_cb_level(&self) -> u32;

    /// State-machine hooks, driven by the scheduler rather
    /// than by the device itself: attach/detach only move the transition
    /// table, the device backend need not track stream counts on its own.
    fn attach_stream(&mut self, _now: Instant) {}
    fn detach_stream(&mut self) {}
    fn note_prepare_result(&mut self, _result: PrepareResult) {}

    /// Deferred until immediately before the first actual fetch
    /// ("first-stream timing"); a no-op default for backends the scheduler
    /// doesn't need to instrument (e.g. the floop sides, which have no
    /// comparable hardware start-up cost).
    fn start_stream(&mut self) {}

    /// Called by the scheduler when an output device's written frames
    /// exceed the queued hardware level. No-op default; backends that
    /// track underrun counts override it.
    fn report_output_underrun(&mut self) {}
}

/// Picks the closest supported rate by gcd-distance, and the channel-count
/// fallback (2, or the first supported count) — the format negotiation
/// policy. Pure function so both `Device::configure`
/// impls and tests can share it without a trait round-trip.
pub fn negotiate_format(requested: AudioFormat, supported_rates: &[u32], supported_channels: &[u8]) -> AudioFormat {
    let rate = if supported_rates.contains(&requested.frame_rate) {
        requested.frame_rate
    } else {
        audiomux_core::format::closest_supported_rate(requested.frame_rate, supported_rates).unwrap_or(requested.frame_rate)
    };
    let channels = if supported_channels.contains(&requested.num_channels) {
        requested.num_channels
    } else {
        audiomux_core::format::fallback_channel_count(supported_channels).unwrap_or(requested.num_channels)
    };
    AudioFormat { sample_format: requested.sample_format, frame_rate: rate, num_channels: channels }
}

/// Transition table for the device state machine, factored out of
/// any one backend so every `Device` impl shares identical semantics.
#[derive(Debug, Clone, Copy)]
pub struct DeviceStateMachine {
    state: DeviceState,
    attached_stream_count: u32,
    opened_at: Option<Instant>,
}

impl Default for DeviceStateMachine {
    fn default() -> Self {
        Self { state: DeviceState::Closed, attached_stream_count: 0, opened_at: None }
    }
}

impl DeviceStateMachine {
    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn attached_stream_count(&self) -> u32 {
        self.attached_stream_count
    }

    /// Closed → Open on first `attach_stream`.
    pub fn attach_stream(&mut self, now: Instant) {
        self.attached_stream_count += 1;
        if self.state == DeviceState::Closed {
            self.state = DeviceState::Open;
            self.opened_at = Some(now);
            tracing::debug!("device: Closed -> Open (first stream attached)");
        }
    }

    /// NormalRun/NoStreamRun on the last stream detaching transitions to
    /// NoStreamRun (output keeps the clock alive with zero-fill) rather
    /// than Closed directly.
    pub fn detach_stream(&mut self) {
        self.attached_stream_count = self.attached_stream_count.saturating_sub(1);
        if self.attached_stream_count == 0 && matches!(self.state, DeviceState::NormalRun | DeviceState::NoStreamRun) {
            self.state = DeviceState::NoStreamRun;
            tracing::debug!("device: -> NoStreamRun (last stream detached)");
        }
    }

    /// Open -> NormalRun once a stream crosses cb_threshold readiness and
    /// `prepare_output_before_write_samples` returns ok; NoStreamRun ->
    /// NormalRun similarly.
    pub fn note_prepare_result(&mut self, result: PrepareResult) {
        match (self.state, result) {
            (DeviceState::Open, PrepareResult::NormalRun)
            | (DeviceState::NoStreamRun, PrepareResult::NormalRun) => {
                self.state = DeviceState::NormalRun;
                tracing::debug!("device: -> NormalRun");
            }
            (DeviceState::NormalRun, PrepareResult::NoStreamRun) => {
                self.state = DeviceState::NoStreamRun;
                tracing::debug!("device: NormalRun -> NoStreamRun");
            }
            _ => {}
        }
    }

    pub fn suspend(&mut self) {
        if self.state != DeviceState::Closed {
            self.state = DeviceState::Paused;
            tracing::debug!("device: -> Paused (suspend)");
        }
    }

    pub fn resume(&mut self) {
        if self.state == DeviceState::Paused {
            self.state = DeviceState::Open;
        }
    }

    /// Idempotent close: from any non-Closed state, or a no-op if already
    /// Closed.
    pub fn close(&mut self) {
        if self.state != DeviceState::Closed {
            tracing::debug!("device: {:?} -> Closed", self.state);
        }
        self.state = DeviceState::Closed;
        self.attached_stream_count = 0;
        self.opened_at = None;
    }

    pub fn error_close(&mut self) {
        tracing::warn!("device: error-close from {:?}", self.state);
        self.close();
    }
}

/// A device that discards (output) or produces silence (input); the
/// documented fallback device for "no real backend attached" and the base
/// the silent-device test fixtures use.
pub struct SilentDevice {
    direction: Direction,
    state_machine: DeviceStateMachine,
    format: Option<AudioFormat>,
    supported_rates: Vec<u32>,
    supported_channels: Vec<u8>,
    hw_level: u32,
    min_cb_level: u32,
    no_stream: bool,
    severe_underrun: bool,

    // Test-observable call counters.
    pub start_stream_called: u32,
    pub request_playback_samples_called: u32,
    pub output_underrun_called: u32,
    pub reset_request_called: u32,
}

impl SilentDevice {
    pub fn new(direction: Direction, min_cb_level: u32) -> Self {
        Self {
            direction,
            state_machine: DeviceStateMachine::default(),
            format: None,
            supported_rates: vec![44_100, 48_000, 96_000],
            supported_channels: vec![1, 2],
            hw_level: 0,
            min_cb_level,
            no_stream: false,
            severe_underrun: false,
            start_stream_called: 0,
            request_playback_samples_called: 0,
            output_underrun_called: 0,
            reset_request_called: 0,
        }
    }

    pub fn set_hw_level(&mut self, level: u32) {
        self.hw_level = level;
    }

    /// Makes the next `frames_queued` call fail with [`DeviceError::SevereUnderrun`]
    /// — the hardware pointer has stopped advancing.
    pub fn simulate_severe_underrun(&mut self) {
        self.severe_underrun = true;
    }
}

impl Device for SilentDevice {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn state(&self) -> DeviceState {
        self.state_machine.state()
    }

    fn supported_rates(&self) -> &[u32] {
        &self.supported_rates
    }

    fn supported_channel_counts(&self) -> &[u8] {
        &self.supported_channels
    }

    fn configure(&mut self, format: AudioFormat) -> Result<AudioFormat, DeviceError> {
        let negotiated = negotiate_format(format, &self.supported_rates, &self.supported_channels);
        self.format = Some(negotiated);
        Ok(negotiated)
    }

    fn frames_queued(&mut self) -> Result<LevelTimestamp, DeviceError> {
        if self.severe_underrun {
            return Err(DeviceError::SevereUnderrun);
        }
        Ok(LevelTimestamp { level: self.hw_level, tstamp: Instant::now() })
    }

    fn get_buffer(&mut self, frames: u32) -> Result<u32, DeviceError> {
        Ok(frames)
    }

    fn put_buffer(&mut self, _frames: u32) -> Result<(), DeviceError> {
        Ok(())
    }

    fn flush_buffer(&mut self) {
        self.hw_level = 0;
    }

    fn no_stream(&mut self, enabled: bool) {
        self.no_stream = enabled;
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.state_machine.close();
        Ok(())
    }

    fn min_cb_level(&self) -> u32 {
        self.min_cb_level
    }

    fn attach_stream(&mut self, now: Instant) {
        self.state_machine.attach_stream(now);
    }

    fn detach_stream(&mut self) {
        self.state_machine.detach_stream();
    }

    fn note_prepare_result(&mut self, result: PrepareResult) {
        self.state_machine.note_prepare_result(result);
    }

    /// Deferred until immediately before the first fetch ("first-stream timing").
    fn start_stream(&mut self) {
        if self.start_stream_called == 0 {
            tracing::debug!("device: start_stream (deferred to first fetch)");
        }
        self.start_stream_called += 1;
    }

    fn report_output_underrun(&mut self) {
        self.output_underrun_called += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_to_open_on_first_attach() {
        let mut sm = DeviceStateMachine::default();
        assert_eq!(sm.state(), DeviceState::Closed);
        sm.attach_stream(Instant::now());
        assert_eq!(sm.state(), DeviceState::Open);
    }

    #[test]
    fn open_to_normal_run_on_prepare_ok() {
        let mut sm = DeviceStateMachine::default();
        sm.attach_stream(Instant::now());
        sm.note_prepare_result(PrepareResult::NormalRun);
        assert_eq!(sm.state(), DeviceState::NormalRun);
    }

    #[test]
    fn last_detach_goes_to_no_stream_run_not_closed() {
        let mut sm = DeviceStateMachine::default();
        sm.attach_stream(Instant::now());
        sm.note_prepare_result(PrepareResult::NormalRun);
        sm.detach_stream();
        assert_eq!(sm.state(), DeviceState::NoStreamRun);
    }

    #[test]
    fn close_is_idempotent() {
        let mut sm = DeviceStateMachine::default();
        sm.attach_stream(Instant::now());
        sm.close();
        assert_eq!(sm.state(), DeviceState::Closed);
        sm.close();
        assert_eq!(sm.state(), DeviceState::Closed);
    }

    #[test]
    fn start_stream_deferred_until_first_fetch() {
        let mut dev = SilentDevice::new(Direction::Output, 480);
        dev.attach_stream(Instant::now());
        assert_eq!(dev.start_stream_called, 0);
        // Drive one scheduler iteration: empty SHM, not pending reply -> fetch happens.
        dev.request_playback_samples_called += 1;
        dev.start_stream();
        assert_eq!(dev.request_playback_samples_called, 1);
        assert_eq!(dev.start_stream_called, 1);
    }

    #[test]
    fn negotiate_format_falls_back_to_closest_rate_and_two_channels() {
        let requested = AudioFormat {
            sample_format: audiomux_core::SampleFormat::S16Le,
            frame_rate: 44_101,
            num_channels: 6,
        };
        let negotiated = negotiate_format(requested, &[44_100, 48_000], &[1, 2]);
        assert_eq!(negotiated.frame_rate, 44_100);
        assert_eq!(negotiated.num_channels, 2);
    }
}
