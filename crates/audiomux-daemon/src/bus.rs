// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Main/audio message bus: a tagged-message channel
//! between the audio thread and the main thread, plus the notification
//! subscriber map consulted on system-state-change events. `crossbeam-channel`
//! stands in for a hand-built eventfd-backed queue — this crate's thread
//! model has no epoll loop to integrate with directly, and
//! `crossbeam-channel`'s `Receiver::recv_timeout` gives the scheduler the
//! same "block until either a message arrives or a deadline passes" wait
//! primitive.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use audiomux_ipc::NotificationKind;

pub type ClientId = u32;

/// Messages the audio thread posts to the main thread.
#[derive(Debug, Clone)]
pub enum AudioToMain {
    ResetRequest { device_idx: u32, reason: String },
    SevereUnderrun { device_idx: u32 },
    Underrun { device_idx: u32 },
    BusyloopEvent,
    StateChanged(NotificationKind),
}

/// Messages the main thread posts to the audio thread inbox.
#[derive(Debug, Clone)]
pub enum MainToAudio {
    ReloadDsp,
    Suspend,
    Resume,
    Stop,
}

/// One direction of the bus: a sender plus the paired receiver. Each
/// addressable thread owns one of these in each direction.
pub struct Bus<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Bus<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }

    /// Drains everything currently queued without blocking: consumes
    /// pending control messages from the audio-thread inbox.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Blocks until a message arrives or `timeout` elapses, matching the
    /// scheduler's top-of-loop multiplexed wait.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }
}

impl<T> Default for Bus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// `register_notification`'s subscriber map: which
/// connected clients receive which kind of system-state-change message.
#[derive(Default)]
pub struct NotificationSubscribers {
    subscribers: HashMap<NotificationKind, HashSet<ClientId>>,
}

impl NotificationSubscribers {
    pub fn register(&mut self, client: ClientId, kind: NotificationKind, enabled: bool) {
        let set = self.subscribers.entry(kind).or_default();
        if enabled {
            set.insert(client);
        } else {
            set.remove(&client);
        }
    }

    pub fn subscribers_for(&self, kind: NotificationKind) -> Vec<ClientId> {
        self.subscribers.get(&kind).map(|s| s.iter().copied().collect()).unwrap_or_default()
    }

    pub fn clear_client(&mut self, client: ClientId) {
        for set in self.subscribers.values_mut() {
            set.remove(&client);
        }
    }
}

/// Dispatch dispatch-inline shortcut: a producer already running on
/// the main thread invokes the handler directly instead of round-tripping
/// through the channel.
pub fn in_main_thread() -> bool {
    std::thread::current().name() != Some("audio")
}

pub fn dispatch_inline<F: FnOnce()>(handler: F) {
    handler();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_collects_everything_queued_without_blocking() {
        let bus: Bus<MainToAudio> = Bus::new();
        let tx = bus.sender();
        tx.send(MainToAudio::Suspend).unwrap();
        tx.send(MainToAudio::ReloadDsp).unwrap();
        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
    }

    #[test]
    fn register_then_unregister_removes_subscriber() {
        let mut subs = NotificationSubscribers::default();
        subs.register(1, NotificationKind::NodesChanged, true);
        subs.register(2, NotificationKind::NodesChanged, true);
        assert_eq!(subs.subscribers_for(NotificationKind::NodesChanged).len(), 2);

        subs.register(1, NotificationKind::NodesChanged, false);
        assert_eq!(subs.subscribers_for(NotificationKind::NodesChanged), vec![2]);
    }

    #[test]
    fn clear_client_removes_from_every_kind() {
        let mut subs = NotificationSubscribers::default();
        subs.register(5, NotificationKind::NodesChanged, true);
        subs.register(5, NotificationKind::OutputVolumeChanged, true);
        subs.clear_client(5);
        assert!(subs.subscribers_for(NotificationKind::NodesChanged).is_empty());
        assert!(subs.subscribers_for(NotificationKind::OutputVolumeChanged).is_empty());
    }

    #[test]
    fn in_main_thread_is_true_off_the_named_audio_thread() {
        assert!(in_main_thread());
        let handle = std::thread::Builder::new()
            .name("audio".to_string())
            .spawn(|| in_main_thread())
            .unwrap();
        assert!(!handle.join().unwrap());
    }
}
