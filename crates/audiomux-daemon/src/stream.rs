// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Stream abstraction: the server-side handle for a
//! client stream. Owns fetch cadence, SHM binding, and the
//! missed-callback/drain-ms bookkeeping layered on top.

use std::time::Duration;

use audiomux_core::AudioFormat;

use crate::metrics::{MissedCallbackCounter, MissedCallbackExemptions};

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("cb_threshold {requested} exceeds used_size/2 ({max})")]
    CbThresholdTooLarge { requested: u32, max: u32 },
    #[error("format negotiation failed: {0}")]
    FormatNegotiation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Playback,
    Capture,
    LoopbackPostMix,
    LoopbackPostDsp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Media,
    VoiceCommunication,
    SpeechRecognition,
    ProAudio,
    Accessibility,
    Default,
}

/// Mirrors `audiomux_ipc::ids::ClientMessageId`'s `client_type` domain —
/// kept as a daemon-local enum so the floop matching logic and the
/// wire payload's raw `u8` stay decoupled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    Unknown,
    Test,
    Chrome,
    Arc,
    ArcVm,
    Crosvm,
    PluginVm,
    Borealis,
    Lacros,
    Legacy,
    Pcm,
    SoundCardInit,
    ServerStream,
}

impl ClientType {
    /// Bit position for the `client_types_mask` bitmap floop pairs match
    /// against.
    pub fn bit(self) -> u64 {
        1u64 << (self as u64)
    }
}

bitflags::bitflags! {
    /// Per-stream flags, mirroring `audiomux_ipc::messages::StreamFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StreamFlags: u32 {
        const BULK_AUDIO_OK = 1 << 0;
        const USE_DEV_TIMING = 1 << 1;
        const TRIGGER_ONLY = 1 << 2;
        const SIDE_TONE_REQUEST = 1 << 3;
    }
}

impl StreamFlags {
    pub fn exemptions(self) -> MissedCallbackExemptions {
        MissedCallbackExemptions {
            bulk_audio_ok: self.contains(StreamFlags::BULK_AUDIO_OK),
            use_dev_timing: self.contains(StreamFlags::USE_DEV_TIMING),
            trigger_only: self.contains(StreamFlags::TRIGGER_ONLY),
        }
    }
}

/// Server-side identity: 64-bit stream id with the client id folded into
/// the upper bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

impl StreamId {
    pub fn new(client_id: u32, stream_index: u32) -> Self {
        Self(((client_id as u64) << 32) | stream_index as u64)
    }

    pub fn client_id(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

pub struct Stream {
    pub id: StreamId,
    pub direction: StreamDirection,
    pub stream_type: StreamType,
    pub client_type: ClientType,
    pub cb_threshold: u32,
    pub flags: StreamFlags,
    pub format: AudioFormat,
    pub used_size: u32,
    pub pinned_dev_idx: Option<u32>,

    next_cb_ts: Duration,
    longest_fetch_interval: Duration,
    last_fetch_ts: Option<Duration>,
    pending_reply: bool,
    missed_callbacks: MissedCallbackCounter,
    stream_start: Duration,
}

impl Stream {
    pub fn new(
        id: StreamId,
        direction: StreamDirection,
        stream_type: StreamType,
        client_type: ClientType,
        cb_threshold: u32,
        used_size: u32,
        flags: StreamFlags,
        format: AudioFormat,
        pinned_dev_idx: Option<u32>,
        now: Duration,
    ) -> Result<Self, StreamError> {
        let max = used_size / 2;
        if cb_threshold > max {
            return Err(StreamError::CbThresholdTooLarge { requested: cb_threshold, max });
        }
        Ok(Self {
            id,
            direction,
            stream_type,
            client_type,
            cb_threshold,
            flags,
            format,
            used_size,
            pinned_dev_idx,
            next_cb_ts: now,
            longest_fetch_interval: Duration::ZERO,
            last_fetch_ts: None,
            pending_reply: false,
            missed_callbacks: MissedCallbackCounter::default(),
            stream_start: now,
        })
    }

    pub fn is_pending_reply(&self) -> bool {
        self.pending_reply
    }

    pub fn next_cb_ts(&self) -> Duration {
        self.next_cb_ts
    }

    pub fn missed_callback_count(&self) -> u64 {
        self.missed_callbacks.count()
    }

    /// Sleep interval derived from `cb_threshold / frame_rate`.
    pub fn cb_interval(&self) -> Duration {
        Duration::from_secs_f64(self.cb_threshold as f64 / self.format.frame_rate as f64)
    }

    /// Set the stream's very first `next_cb_ts` per the three rules: no
    /// known hw level, a known hw level, or joining a populated device
    /// (take the earliest sibling deadline).
    pub fn initial_next_cb_ts(now: Duration, current_hw_level: Option<u32>, cb_threshold: u32, frame_rate: u32, sibling_earliest: Option<Duration>) -> Duration {
        if let Some(earliest) = sibling_earliest {
            return earliest;
        }
        match current_hw_level {
            None => now,
            Some(level) => {
                let extra_frames = level.saturating_sub(cb_threshold);
                now + Duration::from_secs_f64(extra_frames as f64 / frame_rate as f64)
            }
        }
    }

    /// Record the fetch-interval, re-arm `next_cb_ts`, and update the
    /// missed-callback counter if the previous deadline was missed. Returns
    /// whether this call counted as a missed callback.
    pub fn request_playback_samples(&mut self, now: Duration) -> bool {
        let missed = self.pending_reply;
        if missed {
            self.missed_callbacks.note_missed(self.flags.exemptions(), now - self.stream_start);
        }

        if let Some(last) = self.last_fetch_ts {
            let interval = now.saturating_sub(last);
            if interval > self.longest_fetch_interval {
                self.longest_fetch_interval = interval;
            }
        }
        self.last_fetch_ts = Some(now);
        self.pending_reply = true;
        self.next_cb_ts = now + self.cb_interval();
        missed
    }

    /// Called once the client has written (playback) or the server has
    /// delivered (capture) data, clearing the pending-reply latch.
    pub fn mark_fulfilled(&mut self) {
        self.pending_reply = false;
    }

    /// Milliseconds of audio remaining in the SHM. Always 0
    /// for capture streams; for playback it is derived from the write
    /// offset still unread, rounded up.
    pub fn drain_ms_remaining(&self, write_offset_bytes: u32, frame_bytes: u32) -> u32 {
        if self.direction != StreamDirection::Playback {
            return 0;
        }
        if write_offset_bytes == 0 {
            return 0;
        }
        let frames = write_offset_bytes / frame_bytes.max(1);
        let ms_per_frame = 1000.0 / self.format.frame_rate as f64;
        (frames as f64 * ms_per_frame).ceil() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiomux_core::SampleFormat;

    fn fmt() -> AudioFormat {
        AudioFormat { sample_format: SampleFormat::S16Le, frame_rate: 48_000, num_channels: 2 }
    }

    fn mk_stream(cb_threshold: u32, used_size: u32) -> Stream {
        Stream::new(
            StreamId::new(1, 0),
            StreamDirection::Playback,
            StreamType::Media,
            ClientType::Chrome,
            cb_threshold,
            used_size,
            StreamFlags::empty(),
            fmt(),
            None,
            Duration::ZERO,
        )
        .unwrap()
    }

    #[test]
    fn cb_threshold_at_half_used_size_is_accepted() {
        assert!(mk_stream(2048, 4096).cb_threshold == 2048);
    }

    #[test]
    fn cb_threshold_over_half_used_size_is_rejected() {
        let err = Stream::new(
            StreamId::new(1, 0),
            StreamDirection::Playback,
            StreamType::Media,
            ClientType::Chrome,
            2049,
            4096,
            StreamFlags::empty(),
            fmt(),
            None,
            Duration::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, StreamError::CbThresholdTooLarge { .. }));
    }

    #[test]
    fn missed_callback_detected_on_second_consecutive_request() {
        let mut s = mk_stream(480, 4096);
        assert!(!s.request_playback_samples(Duration::ZERO));
        // Client never replied (pending_reply still true) before the next fetch.
        assert!(s.request_playback_samples(s.cb_interval()));
        assert_eq!(s.missed_callback_count(), 1);
    }

    #[test]
    fn mark_fulfilled_prevents_missed_callback_detection() {
        let mut s = mk_stream(480, 4096);
        s.request_playback_samples(Duration::ZERO);
        s.mark_fulfilled();
        assert!(!s.request_playback_samples(s.cb_interval()));
        assert_eq!(s.missed_callback_count(), 0);
    }

    #[test]
    fn drain_ms_remaining_rounds_up_to_whole_milliseconds() {
        let s = mk_stream(480, 4096 * 4);
        let frame_bytes = 4; // 2ch * S16
        assert_eq!(s.drain_ms_remaining(1 * frame_bytes, frame_bytes), 1);
        assert_eq!(s.drain_ms_remaining(479 * frame_bytes, frame_bytes), 10);
        assert_eq!(s.drain_ms_remaining(0, frame_bytes), 0);
    }

    #[test]
    fn capture_stream_drain_ms_is_always_zero() {
        let mut s = mk_stream(480, 4096);
        s.direction = StreamDirection::Capture;
        assert_eq!(s.drain_ms_remaining(2000, 4), 0);
    }

    #[test]
    fn bulk_audio_ok_exempts_from_missed_callback() {
        let mut s = Stream::new(
            StreamId::new(1, 0),
            StreamDirection::Playback,
            StreamType::Media,
            ClientType::Chrome,
            480,
            4096,
            StreamFlags::BULK_AUDIO_OK,
            fmt(),
            None,
            Duration::ZERO,
        )
        .unwrap();
        s.request_playback_samples(Duration::ZERO);
        s.request_playback_samples(s.cb_interval());
        assert_eq!(s.missed_callback_count(), 0);
    }
}
