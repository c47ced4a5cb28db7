// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The wire encoding of a negotiated stream format.
//!
//! This mirrors `audiomux_core::format::AudioFormat::pack`/`unpack` exactly
//! (same byte layout: `u8 sample_format, u32 frame_rate, u8 num_channels`)
//! but is defined independently so this crate stays a dependency leaf —
//! `audiomux-daemon` converts between the two at the boundary where it
//! depends on both.

use bytemuck::{Pod, Zeroable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct WireFormat {
    pub sample_format: u8,
    _pad: [u8; 3],
    pub frame_rate: u32,
    pub num_channels: u8,
    _pad2: [u8; 3],
}

impl WireFormat {
    pub fn new(sample_format: u8, frame_rate: u32, num_channels: u8) -> Self {
        Self {
            sample_format,
            _pad: [0; 3],
            frame_rate,
            num_channels,
            _pad2: [0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_round_trips_through_bytes() {
        let f = WireFormat::new(3, 48_000, 2);
        let bytes = bytemuck::bytes_of(&f);
        let back: WireFormat = *bytemuck::from_bytes(bytes);
        assert_eq!(back, f);
    }
}
