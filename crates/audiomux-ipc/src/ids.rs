// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Message ids and the common `(length, id)` header every control message
//! begins with.
//!
//! Client and server id sets are disjoint by construction: client ids occupy
//! `0..0x8000_0000` and server ids occupy `0x8000_0000..`, so a single `u32`
//! discriminant can be dispatched without knowing which side produced it
//! (useful for a debug dumper that just wants to print "what is this").

use crate::WireError;

/// Bytes occupied by the `(u32 length, u32 id)` header.
pub const HEADER_BYTES: usize = 8;

macro_rules! message_id_enum {
    ($name:ident, $base:expr, { $($variant:ident = $n:expr,)* }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $($variant = $base + $n,)*
        }

        impl $name {
            pub fn from_u32(v: u32) -> Option<Self> {
                match v {
                    $(x if x == $base + $n => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn as_u32(self) -> u32 {
                self as u32
            }
        }
    };
}

message_id_enum!(ClientMessageId, 0u32, {
    ConnectStream = 0,
    DisconnectStream = 1,
    SetSystemVolume = 2,
    SetSystemMute = 3,
    SetUserMute = 4,
    SetSystemMuteLocked = 5,
    SetCaptureMute = 6,
    SetCaptureMuteLocked = 7,
    SetNodeAttr = 8,
    SelectNode = 9,
    AddActiveNode = 10,
    RmActiveNode = 11,
    ReloadDsp = 12,
    DumpAudioThread = 13,
    DumpServerInfo = 14,
    DumpSnapshots = 15,
    AddTestDev = 16,
    TestDevCommand = 17,
    Suspend = 18,
    Resume = 19,
    GetHotwordModels = 20,
    SetHotwordModel = 21,
    RegisterNotification = 22,
    SetAecDump = 23,
    ReloadAecConfig = 24,
    SetBtWbsEnabled = 25,
    GetAtlogFd = 26,
    SetAecRef = 27,
    RequestFloop = 28,
});

message_id_enum!(ServerMessageId, 0x8000_0000u32, {
    Connected = 0,
    StreamConnected = 1,
    AudioDebugInfoReady = 2,
    GetHotwordModelsReady = 3,
    AtlogFdReady = 4,
    RequestFloopReady = 5,
    OutputVolumeChanged = 6,
    OutputMuteChanged = 7,
    CaptureGainChanged = 8,
    CaptureMuteChanged = 9,
    NodesChanged = 10,
    ActiveNodeChanged = 11,
    OutputNodeVolumeChanged = 12,
    NodeLeftRightSwappedChanged = 13,
    InputNodeGainChanged = 14,
    NumActiveStreamsChanged = 15,
});

/// The `(length, id)` header common to every control message.
///
/// `length` is the total message length including this 8-byte header, so a
/// reader can `read_exact(length)` once it has peeked the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub length: u32,
    pub id: u32,
}

impl MessageHeader {
    pub fn new(id: u32, payload_len: usize) -> Self {
        Self {
            length: (HEADER_BYTES + payload_len) as u32,
            id,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_BYTES] {
        let mut out = [0u8; HEADER_BYTES];
        out[0..4].copy_from_slice(&self.length.to_le_bytes());
        out[4..8].copy_from_slice(&self.id.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_BYTES {
            return Err(WireError::TooShort {
                need: HEADER_BYTES,
                got: bytes.len(),
            });
        }
        let length = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let id = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        Ok(Self { length, id })
    }

    /// Payload length implied by `self.length`, validated against the number
    /// of bytes actually received so far.
    pub fn payload_len(&self, total_received: usize) -> Result<usize, WireError> {
        if self.length as usize != total_received {
            return Err(WireError::LengthMismatch {
                declared: self.length,
                actual: total_received,
            });
        }
        Ok(total_received - HEADER_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_ids_are_disjoint() {
        assert!(ClientMessageId::ConnectStream.as_u32() < 0x8000_0000);
        assert!(ServerMessageId::Connected.as_u32() >= 0x8000_0000);
    }

    #[test]
    fn header_round_trips() {
        let h = MessageHeader::new(ClientMessageId::ConnectStream.as_u32(), 40);
        let bytes = h.encode();
        let decoded = MessageHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, h);
        assert_eq!(decoded.length as usize, HEADER_BYTES + 40);
    }

    #[test]
    fn unknown_client_id_does_not_parse() {
        assert!(ClientMessageId::from_u32(0xffff).is_none());
    }

    #[test]
    fn header_too_short_is_an_error() {
        assert_eq!(
            MessageHeader::decode(&[1, 2, 3]),
            Err(WireError::TooShort { need: HEADER_BYTES, got: 3 })
        );
    }
}
