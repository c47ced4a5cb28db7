// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dev-stream binding: the per-(stream, device) shim
//! that owns offsets, wake timing, and the format converter between a
//! stream and the device it's attached to.

use std::time::Duration;

use crate::stream::StreamId;

/// Per-device offset bookkeeping for one attached stream. Split out of
/// [`DevStream`] so the "copy the first existing dev-stream's offset"
/// invariant can be tested without a full binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevOffset {
    frames: u32,
}

impl DevOffset {
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn update(&mut self, frames: u32) {
        self.frames = frames;
    }
}

/// One (stream, device) attachment.
pub struct DevStream {
    pub stream_id: StreamId,
    pub device_idx: u32,
    offset: DevOffset,
    next_wake: Duration,
    last_fetch: Option<Duration>,
    running: bool,
}

impl DevStream {
    /// Attaches `stream_id` to `device_idx`. `existing_offsets` is every
    /// other dev-stream currently attached to the same device, in attach
    /// order; per the "first-stream copies the offset" rule the
    /// newcomer's offset is initialized from the *first* entry, not left
    /// at zero, whenever the device already has attachments.
    pub fn attach(stream_id: StreamId, device_idx: u32, now: Duration, existing_offsets: &[DevOffset]) -> Self {
        let offset = match existing_offsets.first() {
            Some(first) => *first,
            None => DevOffset::default(),
        };
        Self {
            stream_id,
            device_idx,
            offset,
            next_wake: now,
            last_fetch: None,
            running: false,
        }
    }

    pub fn offset(&self) -> DevOffset {
        self.offset
    }

    pub fn offset_mut(&mut self) -> &mut DevOffset {
        &mut self.offset
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn next_wake(&self) -> Duration {
        self.next_wake
    }

    pub fn note_fetch(&mut self, now: Duration) {
        self.last_fetch = Some(now);
    }

    pub fn last_fetch(&self) -> Option<Duration> {
        self.last_fetch
    }

    /// Computes the next instant this dev-stream needs service.
    /// `curr_level` is the device's current hardware/mix-buffer fill in
    /// frames, `cap_limit` is the cap-limiting stream's threshold (only
    /// meaningful when `is_cap_limit_stream` is true for *some* dev-stream
    /// on the device — passed through unconditionally here since this
    /// function is pure and per-dev-stream).
    pub fn wake_time(&self, curr_level: u32, level_tstamp: Duration, cb_threshold: u32, frame_rate: u32, cap_limit: u32, is_cap_limit_stream: bool) -> Duration {
        let effective_threshold = if is_cap_limit_stream { cap_limit.max(cb_threshold) } else { cb_threshold };
        if curr_level >= effective_threshold {
            return level_tstamp;
        }
        let needed = effective_threshold - curr_level;
        level_tstamp + Duration::from_secs_f64(needed as f64 / frame_rate as f64)
    }

    pub fn set_next_wake(&mut self, wake: Duration) {
        self.next_wake = wake;
    }
}

/// Per-device collection of attached dev-streams, in attach order — the
/// scheduler services attached dev-streams on one device in attach order.
#[derive(Default)]
pub struct DevStreamList {
    entries: Vec<DevStream>,
}

impl DevStreamList {
    pub fn attach(&mut self, stream_id: StreamId, device_idx: u32, now: Duration) -> usize {
        let existing: Vec<DevOffset> = self.entries.iter().map(|d| d.offset()).collect();
        self.entries.push(DevStream::attach(stream_id, device_idx, now, &existing));
        self.entries.len() - 1
    }

    pub fn detach(&mut self, stream_id: StreamId) {
        self.entries.retain(|d| d.stream_id != stream_id);
    }

    pub fn iter(&self) -> impl Iterator<Item = &DevStream> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DevStream> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest `next_wake` across all attached dev-streams.
    pub fn min_wake_time(&self) -> Option<Duration> {
        self.entries.iter().map(|d| d.next_wake()).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(i: u32) -> StreamId {
        StreamId::new(1, i)
    }

    #[test]
    fn first_attach_gets_zero_offset() {
        let mut list = DevStreamList::default();
        list.attach(sid(0), 0, Duration::ZERO);
        assert_eq!(list.iter().next().unwrap().offset().frames(), 0);
    }

    #[test]
    fn second_attach_copies_first_offset() {
        let mut list = DevStreamList::default();
        list.attach(sid(0), 0, Duration::ZERO);
        list.iter_mut().next().unwrap().offset_mut().update(30);

        list.attach(sid(1), 0, Duration::from_millis(10));

        let offsets: Vec<u32> = list.iter().map(|d| d.offset().frames()).collect();
        assert_eq!(offsets, vec![30, 30]);
    }

    #[test]
    fn detach_removes_only_the_matching_stream() {
        let mut list = DevStreamList::default();
        list.attach(sid(0), 0, Duration::ZERO);
        list.attach(sid(1), 0, Duration::ZERO);
        list.detach(sid(0));
        assert_eq!(list.len(), 1);
        assert_eq!(list.iter().next().unwrap().stream_id, sid(1));
    }

    #[test]
    fn min_wake_time_across_two_streams() {
        let mut list = DevStreamList::default();
        list.attach(sid(0), 0, Duration::ZERO);
        list.attach(sid(1), 0, Duration::ZERO);
        let mut iter = list.iter_mut();
        iter.next().unwrap().set_next_wake(Duration::new(1, 500));
        iter.next().unwrap().set_next_wake(Duration::new(1, 1000));
        assert_eq!(list.min_wake_time(), Some(Duration::new(1, 500)));
    }

    #[test]
    fn wake_time_returns_now_when_already_past_threshold() {
        let ds = DevStream::attach(sid(0), 0, Duration::ZERO, &[]);
        let now = Duration::from_secs(5);
        let wake = ds.wake_time(1000, now, 480, 48_000, 0, false);
        assert_eq!(wake, now);
    }

    #[test]
    fn wake_time_extrapolates_from_remaining_frames() {
        let ds = DevStream::attach(sid(0), 0, Duration::ZERO, &[]);
        let now = Duration::from_secs(5);
        let wake = ds.wake_time(0, now, 480, 48_000, 0, false);
        assert_eq!(wake, now + Duration::from_millis(10));
    }
}
