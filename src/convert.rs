// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Format and rate converter.
//!
//! A converter is a pure function of its negotiated `from`/`to` formats and
//! its accumulated resample phase: given the same input bytes and the same
//! prior call history it always produces the same output bytes. It never
//! decides what to do when a format can't be satisfied — that fallback
//! policy (closest supported rate, channel-count fallback) lives one layer
//! up, in the device configuration path, using [`crate::format`]'s
//! `closest_supported_rate` and `fallback_channel_count`.
//!
//! Internally every sample is widened to `f32` in `[-1.0, 1.0]` regardless
//! of wire format, since that's also the representation the DSP graph (see
//! [`crate::dsp`]) operates on.

use crate::format::{AudioFormat, SampleFormat};

/// Stateful sample-format + channel-remap + linear-resample pipeline between
/// two negotiated formats.
///
/// The resample stage is the only part that carries state across calls (a
/// fractional input-frame position, plus the last input frame for
/// interpolation continuity at call boundaries); [`Converter::reset`] clears
/// it explicitly, e.g. after a stream underrun discontinuity.
pub struct Converter {
    from: AudioFormat,
    to: AudioFormat,
    /// Fractional position, in input frames, of the next output frame.
    pos: f64,
    /// Last remapped input frame seen, used as the left interpolation anchor
    /// for the first output frame of the next call.
    last_frame: Vec<f32>,
    primed: bool,
}

impl Converter {
    pub fn new(from: AudioFormat, to: AudioFormat) -> Self {
        let last_frame = vec![0.0f32; to.num_channels as usize];
        Self {
            from,
            to,
            pos: 0.0,
            last_frame,
            primed: false,
        }
    }

    pub fn from_format(&self) -> AudioFormat {
        self.from
    }

    pub fn to_format(&self) -> AudioFormat {
        self.to
    }

    /// Clear resample phase and interpolation history. Must be called after
    /// any discontinuity in the input stream (underrun, seek, device
    /// restart) so the next call doesn't interpolate across a gap.
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.last_frame.iter_mut().for_each(|v| *v = 0.0);
        self.primed = false;
    }

    /// Upper bound on output frames this converter can produce from
    /// `input_frames` of input at the current rate ratio. Callers should
    /// size their output buffer to at least this many frames before calling
    /// [`Converter::convert`].
    pub fn max_output_frames(&self, input_frames: usize) -> usize {
        if self.from.frame_rate == self.to.frame_rate {
            return input_frames;
        }
        let num = input_frames as u64 * self.to.frame_rate as u64;
        (num / self.from.frame_rate as u64) as usize + 2
    }

    /// Convert `input` (raw bytes in `from` format) into `output` (raw bytes
    /// in `to` format). Returns `(input_frames_consumed, output_frames_written)`.
    ///
    /// Consumes as many whole input frames as fit in `input` and produces as
    /// many output frames as fit in `output`, whichever limit is reached
    /// first; callers that need every input frame consumed should size
    /// `output` per [`Converter::max_output_frames`].
    pub fn convert(&mut self, input: &[u8], output: &mut [u8]) -> (usize, usize) {
        let in_frame_bytes = self.from.frame_bytes();
        let out_frame_bytes = self.to.frame_bytes();
        if in_frame_bytes == 0 || out_frame_bytes == 0 {
            return (0, 0);
        }
        let in_frames = input.len() / in_frame_bytes;

        let mut remapped: Vec<f32> = Vec::with_capacity(in_frames * self.to.num_channels as usize);
        for f in 0..in_frames {
            let frame = &input[f * in_frame_bytes..(f + 1) * in_frame_bytes];
            let decoded = decode_frame(frame, self.from.sample_format, self.from.num_channels);
            remapped.extend(remap_channels(&decoded, self.to.num_channels));
        }

        let to_channels = self.to.num_channels as usize;
        let out_capacity_frames = output.len() / out_frame_bytes;

        if self.from.frame_rate == self.to.frame_rate {
            let n = in_frames.min(out_capacity_frames);
            for f in 0..n {
                let frame = &remapped[f * to_channels..(f + 1) * to_channels];
                encode_frame(frame, self.to.sample_format, &mut output[f * out_frame_bytes..(f + 1) * out_frame_bytes]);
            }
            if n > 0 {
                self.last_frame.copy_from_slice(&remapped[(n - 1) * to_channels..n * to_channels]);
                self.primed = true;
            }
            return (n, n);
        }

        let ratio = self.from.frame_rate as f64 / self.to.frame_rate as f64;
        let mut out_frames_written = 0usize;
        let mut consumed_up_to = 0usize;

        while out_frames_written < out_capacity_frames {
            let src_idx = self.pos.floor() as isize;
            let frac = self.pos - src_idx as f64;

            let left: &[f32] = if src_idx < 0 {
                &self.last_frame
            } else if (src_idx as usize) < in_frames {
                &remapped[src_idx as usize * to_channels..(src_idx as usize + 1) * to_channels]
            } else {
                break;
            };
            let right_idx = src_idx + 1;
            let right: &[f32] = if right_idx < 0 {
                &self.last_frame
            } else if (right_idx as usize) < in_frames {
                &remapped[right_idx as usize * to_channels..(right_idx as usize + 1) * to_channels]
            } else {
                break;
            };

            let out_off = out_frames_written * out_frame_bytes;
            let mut interpolated = vec![0f32; to_channels];
            for c in 0..to_channels {
                interpolated[c] = left[c] as f64 as f32 * (1.0 - frac) as f32 + right[c] * frac as f32;
            }
            encode_frame(&interpolated, self.to.sample_format, &mut output[out_off..out_off + out_frame_bytes]);

            out_frames_written += 1;
            self.pos += ratio;
            consumed_up_to = consumed_up_to.max((self.pos.floor() as isize).max(0) as usize);
        }

        let consumed = consumed_up_to.min(in_frames);
        self.pos -= consumed as f64;
        if consumed > 0 {
            self.last_frame.copy_from_slice(&remapped[(consumed - 1) * to_channels..consumed * to_channels]);
            self.primed = true;
        }

        (consumed, out_frames_written)
    }
}

fn decode_frame(frame: &[u8], format: SampleFormat, channels: u8) -> Vec<f32> {
    let bps = format.bytes_per_sample();
    (0..channels as usize)
        .map(|c| decode_sample(&frame[c * bps..(c + 1) * bps], format))
        .collect()
}

fn decode_sample(bytes: &[u8], format: SampleFormat) -> f32 {
    match format {
        SampleFormat::S16Le => {
            let v = i16::from_le_bytes([bytes[0], bytes[1]]);
            v as f32 / 32768.0
        }
        SampleFormat::S24Le => {
            let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
            let signed = (raw << 8) >> 8; // sign-extend the 24-bit value
            signed as f32 / 8_388_608.0
        }
        SampleFormat::S32Le => {
            let v = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            v as f32 / 2_147_483_648.0
        }
        SampleFormat::Float32Le => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

fn encode_frame(samples: &[f32], format: SampleFormat, out: &mut [u8]) {
    let bps = format.bytes_per_sample();
    for (c, &s) in samples.iter().enumerate() {
        encode_sample(s, format, &mut out[c * bps..(c + 1) * bps]);
    }
}

fn encode_sample(sample: f32, format: SampleFormat, out: &mut [u8]) {
    let clamped = sample.clamp(-1.0, 1.0);
    match format {
        SampleFormat::S16Le => {
            let v = (clamped * 32767.0).round() as i16;
            out.copy_from_slice(&v.to_le_bytes());
        }
        SampleFormat::S24Le => {
            let v = (clamped * 8_388_607.0).round() as i32;
            let bytes = v.to_le_bytes();
            out[0] = bytes[0];
            out[1] = bytes[1];
            out[2] = bytes[2];
            out[3] = 0;
        }
        SampleFormat::S32Le => {
            let v = (clamped as f64 * 2_147_483_647.0).round() as i32;
            out.copy_from_slice(&v.to_le_bytes());
        }
        SampleFormat::Float32Le => {
            out.copy_from_slice(&clamped.to_le_bytes());
        }
    }
}

/// Fold `channels` down to or up from `target` count.
///
/// Downmix averages the extra source channels into the last target channel;
/// upmix repeats the last source channel into the extra target channels.
/// This matches the simple fixed permutation the builtin `swap_lr` /
/// `quad_rotation` DSP plugins expect to operate on rather than any
/// psychoacoustic mixing curve.
fn remap_channels(channels: &[f32], target: u8) -> Vec<f32> {
    let target = target as usize;
    if channels.len() == target {
        return channels.to_vec();
    }
    if channels.is_empty() {
        return vec![0.0; target];
    }
    if channels.len() > target {
        let mut out = channels[..target.saturating_sub(1).max(0)].to_vec();
        let rest = &channels[out.len()..];
        let avg = rest.iter().sum::<f32>() / rest.len() as f32;
        out.push(avg);
        while out.len() < target {
            out.push(avg);
        }
        out
    } else {
        let mut out = channels.to_vec();
        let last = *channels.last().unwrap();
        out.resize(target, last);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_format_passes_samples_through() {
        let fmt = AudioFormat::new(SampleFormat::S16Le, 48_000, 2);
        let mut conv = Converter::new(fmt, fmt);
        let input: [u8; 8] = [0x00, 0x10, 0x00, 0x20, 0x00, 0x30, 0x00, 0x40];
        let mut output = [0u8; 8];
        let (consumed, written) = conv.convert(&input, &mut output);
        assert_eq!((consumed, written), (2, 2));
        assert_eq!(input, output);
    }

    #[test]
    fn upsampling_produces_more_frames_than_consumed() {
        let from = AudioFormat::new(SampleFormat::Float32Le, 24_000, 1);
        let to = AudioFormat::new(SampleFormat::Float32Le, 48_000, 1);
        let mut conv = Converter::new(from, to);
        let mut input = Vec::new();
        for s in [0.0f32, 0.5, 1.0, -0.5] {
            input.extend_from_slice(&s.to_le_bytes());
        }
        let max_out = conv.max_output_frames(4);
        let mut output = vec![0u8; max_out * to.frame_bytes()];
        let (consumed, written) = conv.convert(&input, &mut output);
        assert_eq!(consumed, 4);
        assert!(written >= 7, "expected roughly double the frames, got {written}");
    }

    #[test]
    fn reset_clears_interpolation_history() {
        let from = AudioFormat::new(SampleFormat::S16Le, 48_000, 1);
        let to = AudioFormat::new(SampleFormat::S16Le, 44_100, 1);
        let mut conv = Converter::new(from, to);
        conv.pos = 3.7;
        conv.last_frame[0] = 0.3;
        conv.reset();
        assert_eq!(conv.pos, 0.0);
        assert_eq!(conv.last_frame[0], 0.0);
        assert!(!conv.primed);
    }

    #[test]
    fn channel_upmix_and_downmix() {
        assert_eq!(remap_channels(&[0.5], 2), vec![0.5, 0.5]);
        assert_eq!(remap_channels(&[1.0, -1.0], 1), vec![0.0]);
    }
}
