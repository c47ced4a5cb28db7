// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Payload layouts for the control messages. Only the messages
//! the audio-thread core actually consumes or produces are modeled in
//! detail (`connect_stream` / `connected` / `stream_connected` /
//! `request_floop` / `request_floop_ready`); the remaining ids in
//! [`crate::ClientMessageId`] / [`crate::ServerMessageId`] exist so the id
//! space is complete and a debug dumper can name every message, but their
//! payloads are main-thread concerns (volume/mute state, node enumeration,
//! D-Bus-adjacent bookkeeping) outside this crate's scope.

use bytemuck::{Pod, Zeroable};

use crate::format::WireFormat;

/// Per-stream flags. Plain bit constants rather than a `bitflags!`
/// dependency — the set is small and fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamFlags(pub u32);

impl StreamFlags {
    pub const BULK_AUDIO_OK: u32 = 1 << 0;
    pub const USE_DEV_TIMING: u32 = 1 << 1;
    pub const TRIGGER_ONLY: u32 = 1 << 2;
    pub const SIDE_TONE_REQUEST: u32 = 1 << 3;

    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    /// True if this stream is exempt from missed-callback accounting.
    pub fn exempt_from_missed_callback(self) -> bool {
        self.has(Self::BULK_AUDIO_OK) || self.has(Self::USE_DEV_TIMING) || self.has(Self::TRIGGER_ONLY)
    }
}

/// `CONNECT_STREAM` payload (client→server).
///
/// The client-provided SHM region's file descriptor travels as ancillary
/// data alongside this message, not inline — this struct carries only the
/// negotiable scalar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ConnectStreamPayload {
    pub client_id: u32,
    pub stream_id: u32,
    pub direction: u8,
    pub stream_type: u8,
    pub client_type: u8,
    _pad: u8,
    pub flags: u32,
    pub effects: u32,
    pub cb_threshold: u32,
    pub format: WireFormat,
    pub shm_max_size: u32,
    /// Pinned device index, or `u32::MAX` for "no pinned device".
    pub pinned_dev_idx: u32,
}

/// `CONNECTED` payload (server→client): assigns the client its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ConnectedPayload {
    pub client_id: u32,
}

/// `STREAM_CONNECTED` payload (server→client).
///
/// Carries the negotiated format (post-fallback) and the SHM
/// region size the server actually allocated. Input SHM fd then output SHM
/// fd travel as ancillary data on the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct StreamConnectedPayload {
    pub stream_id: u32,
    pub format: WireFormat,
    pub shm_size: u32,
    pub effects: u32,
    /// Negative `errno`-style value; `0` means the format was granted as
    /// requested, nonzero means a fallback was applied.
    pub err: i32,
}

/// `REQUEST_FLOOP` payload (client→server): ask for a flexible-loopback
/// pair matching `client_types_mask`.
///
/// Design note: tags are opaque 64-bit values that must round-trip exactly
/// — no pointer-sized cast is introduced anywhere in this path (a
/// `uintptr_t` cast on a `uint64_t` tag would silently truncate it on
/// 32-bit platforms), and `tag` is stored and echoed back as a full `u64`
/// in [`RequestFloopReadyPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RequestFloopPayload {
    pub client_types_mask: u64,
    pub tag: u64,
}

/// `REQUEST_FLOOP_READY` payload (server→client): echoes `tag` and reports
/// the assigned flexible-loopback device id (or `u32::MAX` on failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RequestFloopReadyPayload {
    pub tag: u64,
    pub dev_idx: u32,
    _pad: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_stream_payload_is_pod_sized_as_expected() {
        // Sanity check the repr(C) layout has no surprise padding beyond
        // what's declared; not a stability guarantee across platforms, just
        // a regression guard for this crate's own (de)serialization.
        assert_eq!(std::mem::size_of::<ConnectStreamPayload>() % 4, 0);
    }

    #[test]
    fn request_floop_tag_round_trips_as_full_u64() {
        let tag: u64 = 0xDEAD_BEEF_0000_0001;
        let req = RequestFloopPayload {
            client_types_mask: 1 << 3,
            tag,
        };
        let bytes = bytemuck::bytes_of(&req);
        let back: RequestFloopPayload = *bytemuck::from_bytes(bytes);
        assert_eq!(back.tag, tag);
        assert_ne!(back.tag, tag & 0xFFFF_FFFF, "tag must not be 32-bit truncated");
    }

    #[test]
    fn stream_flags_exemptions() {
        let f = StreamFlags(StreamFlags::TRIGGER_ONLY);
        assert!(f.exempt_from_missed_callback());
        let g = StreamFlags(0);
        assert!(!g.exempt_from_missed_callback());
    }
}
