// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sample formats and the audio format descriptor shared by every module
//! that moves frames around: the ring buffer's audio-area view, the format
//! converter, the DSP graph, and the wire protocol.

use serde::{Deserialize, Serialize};

/// Sample encodings the server negotiates with clients and devices.
///
/// A small, fixed set of PCM encodings; float is included because the DSP
/// graph and builtin plugins operate on `f32` internally regardless of the
/// wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SampleFormat {
    S16Le = 0,
    S24Le = 1,
    S32Le = 2,
    Float32Le = 3,
}

impl SampleFormat {
    /// Bytes occupied by one sample in this format.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::S24Le => 4, // stored in a 32-bit container, top byte unused
            SampleFormat::S32Le => 4,
            SampleFormat::Float32Le => 4,
        }
    }

    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SampleFormat::S16Le),
            1 => Some(SampleFormat::S24Le),
            2 => Some(SampleFormat::S32Le),
            3 => Some(SampleFormat::Float32Le),
            _ => None,
        }
    }
}

/// A fully negotiated stream/device format: encoding, channel count, and
/// frame rate.
///
/// Channel *layout* (which physical speaker each channel index maps to) is
/// deliberately not modeled beyond a channel count: the source's channel-map
/// negotiation is out of scope here, and the DSP rewrites that care about
/// physical layout (`swap_lr`, `quad_rotation`, see [`crate::dsp`]) key off
/// channel count alone, exactly as the declarative DSP description does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub frame_rate: u32,
    pub num_channels: u8,
}

impl AudioFormat {
    pub const fn new(sample_format: SampleFormat, frame_rate: u32, num_channels: u8) -> Self {
        Self {
            sample_format,
            frame_rate,
            num_channels,
        }
    }

    /// Bytes occupied by one frame (all channels) in this format.
    pub const fn frame_bytes(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.num_channels as usize
    }

    /// Pack into the little-endian wire representation used by the control
    /// protocol (`u8 format, u32 frame_rate, u8 num_channels`, no padding).
    pub fn pack(&self) -> [u8; 6] {
        let mut out = [0u8; 6];
        out[0] = self.sample_format as u8;
        out[1..5].copy_from_slice(&self.frame_rate.to_le_bytes());
        out[5] = self.num_channels;
        out
    }

    /// Inverse of [`AudioFormat::pack`].
    pub fn unpack(bytes: &[u8; 6]) -> Option<Self> {
        let sample_format = SampleFormat::from_u8(bytes[0])?;
        let frame_rate = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let num_channels = bytes[5];
        Some(Self {
            sample_format,
            frame_rate,
            num_channels,
        })
    }
}

/// Distance metric used by the closest-supported-rate fallback: the
/// number of "beats" between `requested` and `candidate` when both are
/// expressed as multiples of their gcd. Smaller is closer; a perfect match
/// is distance 1.
pub fn rate_distance(requested: u32, candidate: u32) -> u32 {
    if requested == 0 || candidate == 0 {
        return u32::MAX;
    }
    let g = gcd(requested, candidate);
    requested / g
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Picks the supported rate closest to `requested` by [`rate_distance`],
/// breaking ties by listed order. Returns `None` if `supported` is empty.
pub fn closest_supported_rate(requested: u32, supported: &[u32]) -> Option<u32> {
    supported
        .iter()
        .copied()
        .min_by_key(|&candidate| rate_distance(requested, candidate))
}

/// Picks a fallback channel count: 2 if supported, else the first
/// listed candidate. Returns `None` if `supported` is empty.
pub fn fallback_channel_count(supported: &[u8]) -> Option<u8> {
    if supported.contains(&2) {
        Some(2)
    } else {
        supported.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let f = AudioFormat::new(SampleFormat::S16Le, 48_000, 2);
        assert_eq!(AudioFormat::unpack(&f.pack()).unwrap(), f);

        let f = AudioFormat::new(SampleFormat::Float32Le, 44_100, 6);
        assert_eq!(AudioFormat::unpack(&f.pack()).unwrap(), f);
    }

    #[test]
    fn closest_rate_prefers_exact_match() {
        assert_eq!(closest_supported_rate(48_000, &[44_100, 48_000, 96_000]), Some(48_000));
    }

    #[test]
    fn closest_rate_falls_back_to_nearest_multiple() {
        // 44100 vs candidates 48000/96000: gcd(44100,48000)=300 -> distance 147
        // gcd(44100,96000)=300 -> distance 147 too, first listed wins the tie.
        assert_eq!(closest_supported_rate(44_100, &[48_000, 96_000]), Some(48_000));
    }

    #[test]
    fn channel_fallback_prefers_stereo() {
        assert_eq!(fallback_channel_count(&[1, 2, 6]), Some(2));
        assert_eq!(fallback_channel_count(&[1, 6]), Some(1));
        assert_eq!(fallback_channel_count(&[]), None);
    }
}
