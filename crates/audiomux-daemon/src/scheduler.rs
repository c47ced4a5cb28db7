// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The audio-thread scheduler: the real-time loop body
//! that services every open device once per wake and computes the next
//! wake instant. Runs on a dedicated `std::thread::Builder`-spawned OS
//! thread, never as a tokio task.

use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::bus::{AudioToMain, MainToAudio};
use crate::device::{Device, PrepareResult};
use crate::devstream::DevStreamList;
use crate::metrics::BusyloopCounter;
use crate::stream::{Stream, StreamId};

pub struct OutputSlot {
    pub device: Box<dyn Device>,
    pub dev_streams: DevStreamList,
    start_stream_done: bool,
}

impl OutputSlot {
    pub fn new(device: Box<dyn Device>) -> Self {
        Self { device, dev_streams: DevStreamList::default(), start_stream_done: false }
    }
}

pub struct InputSlot {
    pub device: Box<dyn Device>,
    pub dev_streams: DevStreamList,
    wake_ts: Duration,
}

impl InputSlot {
    pub fn new(device: Box<dyn Device>) -> Self {
        Self { device, dev_streams: DevStreamList::default(), wake_ts: Duration::ZERO }
    }

    pub fn wake_ts(&self) -> Duration {
        self.wake_ts
    }
}

/// The real-time loop owner. Devices are serviced in open-device list
/// order; attached dev-streams within a device are serviced in attach
/// order (`DevStreamList` preserves insertion order).
pub struct Scheduler {
    outputs: Vec<OutputSlot>,
    inputs: Vec<InputSlot>,
    streams: HashMap<StreamId, Stream>,
    inbox: Receiver<MainToAudio>,
    outbox: Sender<AudioToMain>,
    busyloop: BusyloopCounter,
    stopped: bool,
}

impl Scheduler {
    pub fn new(inbox: Receiver<MainToAudio>, outbox: Sender<AudioToMain>) -> Self {
        Self {
            outputs: Vec::new(),
            inputs: Vec::new(),
            streams: HashMap::new(),
            inbox,
            outbox,
            busyloop: BusyloopCounter::default(),
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn add_output(&mut self, slot: OutputSlot) -> usize {
        self.outputs.push(slot);
        self.outputs.len() - 1
    }

    pub fn add_input(&mut self, slot: InputSlot) -> usize {
        self.inputs.push(slot);
        self.inputs.len() - 1
    }

    pub fn outputs(&self) -> &[OutputSlot] {
        &self.outputs
    }

    pub fn inputs(&self) -> &[InputSlot] {
        &self.inputs
    }

    pub fn attach_stream(&mut self, device_idx: usize, output: bool, stream: Stream, now: Duration) {
        let id = stream.id;
        self.streams.insert(id, stream);
        if output {
            let slot = &mut self.outputs[device_idx];
            slot.dev_streams.attach(id, device_idx as u32, now);
            slot.device.attach_stream(instant_from(now));
        } else {
            let slot = &mut self.inputs[device_idx];
            slot.dev_streams.attach(id, device_idx as u32, now);
            slot.device.attach_stream(instant_from(now));
        }
    }

    pub fn detach_stream(&mut self, device_idx: usize, output: bool, stream_id: StreamId) {
        self.streams.remove(&stream_id);
        let slot_streams = if output { &mut self.outputs[device_idx].dev_streams } else { &mut self.inputs[device_idx].dev_streams };
        slot_streams.detach(stream_id);
        if output {
            self.outputs[device_idx].device.detach_stream();
        } else {
            self.inputs[device_idx].device.detach_stream();
        }
    }

    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    /// One scheduler wake: the full per-wake loop body. Returns the wait
    /// duration until the next wake, which the caller feeds into its own
    /// sleep and into the busyloop counter's bookkeeping (already applied
    /// here).
    pub fn tick(&mut self, now: Duration) -> Duration {
        for msg in self.inbox.try_iter() {
            match msg {
                MainToAudio::Stop => self.stopped = true,
                MainToAudio::Suspend | MainToAudio::Resume | MainToAudio::ReloadDsp => {}
            }
        }

        for (idx, out) in self.outputs.iter_mut().enumerate() {
            let level = match out.device.frames_queued() {
                Ok(level) => level,
                Err(_) => {
                    let _ = self.outbox.send(AudioToMain::ResetRequest { device_idx: idx as u32, reason: "severe underrun".to_string() });
                    let _ = self.outbox.send(AudioToMain::SevereUnderrun { device_idx: idx as u32 });
                    continue;
                }
            };

            let prepare = if out.dev_streams.is_empty() { PrepareResult::NoStreamRun } else { PrepareResult::NormalRun };
            out.device.note_prepare_result(prepare);

            if prepare == PrepareResult::NoStreamRun {
                out.device.no_stream(true);
                continue;
            }
            out.device.no_stream(false);

            let mut all_streams_written: u32 = 0;
            for ds in out.dev_streams.iter_mut() {
                let Some(stream) = self.streams.get_mut(&ds.stream_id) else { continue };
                if !stream.is_pending_reply() {
                    if !out.start_stream_done {
                        out.device.start_stream();
                        out.start_stream_done = true;
                    }
                    stream.request_playback_samples(now);
                    ds.note_fetch(now);
                    ds.set_running(true);
                    ds.set_next_wake(now + stream.cb_interval());
                }
                if ds.is_running() {
                    all_streams_written += stream.cb_threshold;
                }
            }
            let _ = out.device.put_buffer(all_streams_written);

            if all_streams_written > level.level {
                out.device.report_output_underrun();
                let _ = self.outbox.send(AudioToMain::Underrun { device_idx: idx as u32 });
            }
        }

        for inp in self.inputs.iter_mut() {
            if inp.device.get_buffer(inp.device.min_cb_level()).is_err() {
                continue;
            }
            for ds in inp.dev_streams.iter_mut() {
                if let Some(stream) = self.streams.get_mut(&ds.stream_id) {
                    ds.offset_mut().update(ds.offset().frames() + stream.cb_threshold);
                    ds.note_fetch(now);
                }
            }
            inp.wake_ts = inp.dev_streams.min_wake_time().unwrap_or(now);
        }

        let next = self
            .outputs
            .iter()
            .flat_map(|o| o.dev_streams.iter().map(|d| d.next_wake()))
            .chain(self.inputs.iter().map(|i| i.wake_ts()))
            .min()
            .unwrap_or(now);

        let wait = next.saturating_sub(now);
        if self.busyloop.note_wait(wait) {
            let _ = self.outbox.send(AudioToMain::BusyloopEvent);
        }
        wait
    }
}

fn instant_from(_d: Duration) -> std::time::Instant {
    std::time::Instant::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Direction, SilentDevice};
    use crate::stream::{ClientType, StreamDirection, StreamFlags, StreamId, StreamType};
    use audiomux_core::{AudioFormat, SampleFormat};

    fn fmt() -> AudioFormat {
        AudioFormat { sample_format: SampleFormat::S16Le, frame_rate: 48_000, num_channels: 2 }
    }

    fn mk_scheduler() -> (Scheduler, Sender<MainToAudio>, Receiver<AudioToMain>) {
        let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();
        let (outbox_tx, outbox_rx) = crossbeam_channel::unbounded();
        (Scheduler::new(inbox_rx, outbox_tx), inbox_tx, outbox_rx)
    }

    fn mk_stream(cb_threshold: u32) -> Stream {
        Stream::new(
            StreamId::new(1, 0),
            StreamDirection::Playback,
            StreamType::Media,
            ClientType::Chrome,
            cb_threshold,
            4096,
            StreamFlags::empty(),
            fmt(),
            None,
            Duration::ZERO,
        )
        .unwrap()
    }

    #[test]
    fn fetch_defers_start_stream() {
        let (mut sched, _inbox_tx, _outbox_rx) = mk_scheduler();
        let out_idx = sched.add_output(OutputSlot::new(Box::new(SilentDevice::new(Direction::Output, 480))));
        sched.attach_stream(out_idx, true, mk_stream(480), Duration::ZERO);
        assert_eq!(sched.outputs()[out_idx].start_stream_done, false);

        sched.tick(Duration::ZERO);

        assert!(sched.outputs()[out_idx].start_stream_done);
    }

    #[test]
    fn severe_underrun_triggers_reset_without_state_change() {
        let (mut sched, _inbox_tx, outbox_rx) = mk_scheduler();
        let mut dev = SilentDevice::new(Direction::Output, 480);
        dev.simulate_severe_underrun();
        let out_idx = sched.add_output(OutputSlot::new(Box::new(dev)));
        sched.attach_stream(out_idx, true, mk_stream(480), Duration::ZERO);

        sched.tick(Duration::ZERO);

        let events: Vec<_> = outbox_rx.try_iter().collect();
        let resets = events.iter().filter(|e| matches!(e, AudioToMain::ResetRequest { .. })).count();
        let severe = events.iter().filter(|e| matches!(e, AudioToMain::SevereUnderrun { .. })).count();
        assert_eq!(resets, 1);
        assert_eq!(severe, 1);
    }

    #[test]
    fn underrun_detection_without_reset() {
        let (mut sched, _inbox_tx, outbox_rx) = mk_scheduler();
        let mut dev = SilentDevice::new(Direction::Output, 480);
        dev.set_hw_level(10);
        let out_idx = sched.add_output(OutputSlot::new(Box::new(dev)));
        sched.attach_stream(out_idx, true, mk_stream(11), Duration::ZERO);

        sched.tick(Duration::ZERO);

        let events: Vec<_> = outbox_rx.try_iter().collect();
        assert_eq!(events.iter().filter(|e| matches!(e, AudioToMain::Underrun { .. })).count(), 1);
        assert_eq!(events.iter().filter(|e| matches!(e, AudioToMain::ResetRequest { .. })).count(), 0);
    }

    #[test]
    fn input_wake_time_takes_the_minimum() {
        let (mut sched, _inbox_tx, _outbox_rx) = mk_scheduler();
        let in_idx = sched.add_input(InputSlot::new(Box::new(SilentDevice::new(Direction::Input, 480))));

        let s1 = StreamId::new(1, 0);
        let s2 = StreamId::new(1, 1);
        sched.attach_stream(in_idx, false, {
            let mut s = mk_stream(480);
            s.id = s1;
            s
        }, Duration::ZERO);
        sched.attach_stream(in_idx, false, {
            let mut s = mk_stream(480);
            s.id = s2;
            s
        }, Duration::ZERO);

        {
            let slot = &mut sched.inputs[in_idx];
            let mut iter = slot.dev_streams.iter_mut();
            iter.next().unwrap().set_next_wake(Duration::new(1, 500));
            iter.next().unwrap().set_next_wake(Duration::new(1, 1000));
        }

        sched.tick(Duration::ZERO);

        assert_eq!(sched.inputs[in_idx].wake_ts(), Duration::new(1, 500));
    }

    #[test]
    fn stop_message_sets_stopped_flag() {
        let (mut sched, inbox_tx, _outbox_rx) = mk_scheduler();
        inbox_tx.send(MainToAudio::Stop).unwrap();
        sched.tick(Duration::ZERO);
        assert!(sched.is_stopped());
    }
}
