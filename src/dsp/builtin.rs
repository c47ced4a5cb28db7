// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The builtin plugins every graph can use without loading a shared object:
//! `source`, `sink`, `swap_lr`, `quad_rotation`.
//!
//! `source` and `sink` are no-ops at the graph edge: the scheduler writes a
//! source's output buffers directly (capture hardware, or a flexible
//! loopback's recycled stream) before running the graph, and reads a sink's
//! input buffers directly (the device's mix buffer) after. `swap_lr` and
//! `quad_rotation` perform the actual channel permutation themselves, using
//! a fixed port table; [`crate::dsp::ini`] rebinds the downstream sink's
//! input ports 1:1 to this plugin's same-indexed outputs, so the reordering
//! only ever happens here, inside the run step, and a disabled instance
//! (bypassed by the graph) leaves the sink reading unswapped audio rather
//! than silence.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Source,
    Sink,
    SwapLr,
    QuadRotation,
}

impl BuiltinKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "source" => Some(Self::Source),
            "sink" => Some(Self::Sink),
            "swap_lr" => Some(Self::SwapLr),
            "quad_rotation" => Some(Self::QuadRotation),
            _ => None,
        }
    }

    /// Fixed output-port <- input-port mapping for the channel rewrites.
    /// `swap_lr` swaps the first two channels; `quad_rotation` rotates all
    /// four by one position, undoing a fixed hardware wiring quirk rather
    /// than a parameterized rotation amount.
    fn permutation(self) -> &'static [usize] {
        match self {
            BuiltinKind::SwapLr => &[1, 0],
            BuiltinKind::QuadRotation => &[2, 3, 0, 1],
            BuiltinKind::Source | BuiltinKind::Sink => &[],
        }
    }

    /// Run this builtin against already-connected input/output scratch
    /// buffers. `source`/`sink` do nothing — see module docs.
    pub fn run(self, inputs: &[Vec<f32>], outputs: &mut [Vec<f32>]) {
        match self {
            BuiltinKind::Source | BuiltinKind::Sink => {}
            BuiltinKind::SwapLr | BuiltinKind::QuadRotation => {
                for (dest, &src) in self.permutation().iter().enumerate() {
                    outputs[dest].copy_from_slice(&inputs[src]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_lr_run_swaps_the_two_channels() {
        let inputs = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let mut outputs = vec![vec![0.0; 2], vec![0.0; 2]];
        BuiltinKind::SwapLr.run(&inputs, &mut outputs);
        assert_eq!(outputs, vec![vec![3.0, 4.0], vec![1.0, 2.0]]);
    }

    #[test]
    fn quad_rotation_run_rotates_four_channels() {
        let inputs = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let mut outputs = vec![vec![0.0]; 4];
        BuiltinKind::QuadRotation.run(&inputs, &mut outputs);
        assert_eq!(outputs, vec![vec![3.0], vec![4.0], vec![1.0], vec![2.0]]);
    }

    #[test]
    fn source_and_sink_leave_buffers_untouched() {
        let inputs = vec![vec![9.0]];
        let mut outputs = vec![vec![1.0]];
        BuiltinKind::Source.run(&inputs, &mut outputs);
        assert_eq!(outputs, vec![vec![1.0]]);
        BuiltinKind::Sink.run(&inputs, &mut outputs);
        assert_eq!(outputs, vec![vec![1.0]]);
    }
}
