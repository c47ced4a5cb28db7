// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The kinds of system-state-change notification a client can subscribe to
//! via `REGISTER_NOTIFICATION`. `audiomux-daemon` keeps
//! a `HashMap<NotificationKind, HashSet<ClientId>>` behind the audio-thread
//! mailbox and consults it whenever one of these events occurs.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    OutputVolumeChanged,
    OutputMuteChanged,
    CaptureGainChanged,
    CaptureMuteChanged,
    NodesChanged,
    ActiveNodeChanged,
    OutputNodeVolumeChanged,
    NodeLeftRightSwappedChanged,
    InputNodeGainChanged,
    NumActiveStreamsChanged,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 10] = [
        NotificationKind::OutputVolumeChanged,
        NotificationKind::OutputMuteChanged,
        NotificationKind::CaptureGainChanged,
        NotificationKind::CaptureMuteChanged,
        NotificationKind::NodesChanged,
        NotificationKind::ActiveNodeChanged,
        NotificationKind::OutputNodeVolumeChanged,
        NotificationKind::NodeLeftRightSwappedChanged,
        NotificationKind::InputNodeGainChanged,
        NotificationKind::NumActiveStreamsChanged,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_kinds_are_distinct() {
        let mut set = std::collections::HashSet::new();
        for kind in NotificationKind::ALL {
            assert!(set.insert(kind), "duplicate in ALL");
        }
    }
}
