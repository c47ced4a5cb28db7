// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-stream audio message channel: a tiny fixed-size message sent
//! over the stream's dedicated socketpair, distinct from the control socket.
//! `F::request_playback_samples` (see `audiomux-daemon`) writes
//! [`AudioMessageId::RequestData`]; the client writes
//! [`AudioMessageId::DataReady`] (playback) or
//! [`AudioMessageId::DataCaptured`] (capture) once it has serviced the SHM
//! buffer.

use bytemuck::{Pod, Zeroable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AudioMessageId {
    RequestData = 0,
    DataReady = 1,
    DataCaptured = 2,
}

impl AudioMessageId {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::RequestData),
            1 => Some(Self::DataReady),
            2 => Some(Self::DataCaptured),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct AudioMessage {
    pub id: u32,
    pub error: i32,
    pub frames: u32,
}

impl AudioMessage {
    pub fn request_data() -> Self {
        Self { id: AudioMessageId::RequestData as u32, error: 0, frames: 0 }
    }

    pub fn data_ready(frames: u32) -> Self {
        Self { id: AudioMessageId::DataReady as u32, error: 0, frames }
    }

    pub fn data_captured(frames: u32) -> Self {
        Self { id: AudioMessageId::DataCaptured as u32, error: 0, frames }
    }

    pub fn error(id: AudioMessageId, error: i32) -> Self {
        Self { id: id as u32, error, frames: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let msg = AudioMessage::data_ready(480);
        let bytes = bytemuck::bytes_of(&msg);
        let back: AudioMessage = *bytemuck::from_bytes(bytes);
        assert_eq!(back, msg);
        assert_eq!(AudioMessageId::from_u32(back.id), Some(AudioMessageId::DataReady));
    }
}
