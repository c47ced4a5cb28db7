// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Metrics the scheduler accumulates but does not push anywhere:
//! missed-callback counting, the stream-creation-failure sparse histogram,
//! and the busyloop counter. A metrics aggregation sink is a named
//! non-goal, so these are exposed as read-only snapshots rather than a push
//! API.

use std::collections::HashMap;
use std::time::Duration;

/// Bits mirroring `StreamFlags` in `audiomux-ipc` that exempt a stream from
/// missed-callback accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissedCallbackExemptions {
    pub bulk_audio_ok: bool,
    pub use_dev_timing: bool,
    pub trigger_only: bool,
}

impl MissedCallbackExemptions {
    pub fn any(&self) -> bool {
        self.bulk_audio_ok || self.use_dev_timing || self.trigger_only
    }
}

/// Per-stream missed-callback counter. `note_missed` records the
/// time-since-stream-start on only the first two occurrences, as a sparse
/// metrics emission rather than one event per miss.
#[derive(Debug, Clone, Default)]
pub struct MissedCallbackCounter {
    count: u64,
    first_two_occurrences: Vec<Duration>,
}

impl MissedCallbackCounter {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn first_two_occurrences(&self) -> &[Duration] {
        &self.first_two_occurrences
    }

    /// Record a missed callback unless `exemptions` exempts the stream.
    /// Returns whether the counter actually incremented.
    pub fn note_missed(&mut self, exemptions: MissedCallbackExemptions, time_since_start: Duration) -> bool {
        if exemptions.any() {
            return false;
        }
        self.count += 1;
        if self.count <= 2 {
            self.first_two_occurrences.push(time_since_start);
        }
        true
    }
}

/// Stream-creation failure codes fed into the sparse histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamCreationFailure {
    StreamAddFailed,
    StreamConnectFailed,
    StreamCreateFailed,
}

/// Fixed-bucket histogram over [`StreamCreationFailure`], exposed as a
/// read-only snapshot rather than pushed to an external sink (the sink
/// itself is a named non-goal).
#[derive(Debug, Clone, Default)]
pub struct StreamFailureHistogram {
    buckets: HashMap<StreamCreationFailure, u64>,
}

impl StreamFailureHistogram {
    pub fn record(&mut self, kind: StreamCreationFailure) {
        *self.buckets.entry(kind).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> HashMap<StreamCreationFailure, u64> {
        self.buckets.clone()
    }
}

/// Tracks consecutive zero-wait scheduler wakes. An event fires exactly on
/// the 1→2 transition; it does not
/// re-fire on the third, fourth, ... consecutive zero-wait wake, only after
/// an intervening non-zero wait resets the counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusyloopCounter {
    consecutive_zero_waits: u32,
}

impl BusyloopCounter {
    /// Feed the computed wait duration for this wake. Returns `true` exactly
    /// when a busyloop event should be emitted this wake.
    pub fn note_wait(&mut self, wait: Duration) -> bool {
        if wait.is_zero() {
            self.consecutive_zero_waits += 1;
            self.consecutive_zero_waits == 2
        } else {
            self.consecutive_zero_waits = 0;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missed_callback_records_first_two_only() {
        let mut counter = MissedCallbackCounter::default();
        let exempt = MissedCallbackExemptions::default();
        for i in 0..5u64 {
            counter.note_missed(exempt, Duration::from_millis(i));
        }
        assert_eq!(counter.count(), 5);
        assert_eq!(counter.first_two_occurrences().len(), 2);
    }

    #[test]
    fn exempt_stream_never_increments() {
        let mut counter = MissedCallbackCounter::default();
        let exempt = MissedCallbackExemptions { bulk_audio_ok: true, ..Default::default() };
        assert!(!counter.note_missed(exempt, Duration::ZERO));
        assert_eq!(counter.count(), 0);
    }

    #[test]
    fn busyloop_emits_only_on_second_consecutive_zero_wait() {
        let mut busyloop = BusyloopCounter::default();
        assert!(!busyloop.note_wait(Duration::ZERO)); // 1st zero wait
        assert!(busyloop.note_wait(Duration::ZERO)); // 2nd: emits
        assert!(!busyloop.note_wait(Duration::ZERO)); // 3rd: no re-emit
        assert!(!busyloop.note_wait(Duration::from_millis(1))); // resets
        assert!(!busyloop.note_wait(Duration::ZERO)); // 1st again
        assert!(busyloop.note_wait(Duration::ZERO)); // 2nd again: emits
    }

    #[test]
    fn stream_failure_histogram_counts_by_kind() {
        let mut hist = StreamFailureHistogram::default();
        hist.record(StreamCreationFailure::StreamAddFailed);
        hist.record(StreamCreationFailure::StreamAddFailed);
        hist.record(StreamCreationFailure::StreamConnectFailed);
        let snap = hist.snapshot();
        assert_eq!(snap[&StreamCreationFailure::StreamAddFailed], 2);
        assert_eq!(snap[&StreamCreationFailure::StreamConnectFailed], 1);
    }
}
