// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A noise gate: an attack/release envelope follower that silences audio
//! below a threshold. Ships as a `cdylib` the daemon's [`NativeLoader`]
//! `dlopen`s by library name, exporting `audiomux_plugin_entry` (the DSP
//! graph's "library" key resolution) via [`audiomux_plugin_api::declare_plugin`].
//!
//! [`NativeLoader`]: audiomux_plugin_api — the loader itself lives in
//! `audiomux-core::dsp::loader`, not this crate.

use abi_stable::std_types::{RResult, RSlice, RSliceMut, RString, RVec};
use audiomux_plugin_api::{
    declare_plugin, ActivationContext, AudioEffect, ParameterCurve, ParameterInfo, PluginCategory,
    PluginError, PluginInfo,
};

const THRESHOLD_PARAM: u32 = 0;
const ATTACK_PARAM: u32 = 1;
const RELEASE_PARAM: u32 = 2;
const PARAM_COUNT: u32 = 3;

const THRESHOLD_MIN_DB: f32 = -80.0;
const THRESHOLD_MAX_DB: f32 = 0.0;
const ATTACK_MIN_MS: f32 = 0.1;
const ATTACK_MAX_MS: f32 = 100.0;
const RELEASE_MIN_MS: f32 = 1.0;
const RELEASE_MAX_MS: f32 = 2000.0;

/// Envelope-follower noise gate, one instance per channel pair handed to it
/// (channel count is taken from `inputs.len()` at `process` time rather
/// than fixed at construction, so the same plugin binary serves mono or
/// stereo flows declared in the DSP ini).
pub struct NoiseGate {
    sample_rate: f32,
    threshold_db: f32,
    attack_ms: f32,
    release_ms: f32,
    envelope: f32,
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            threshold_db: -45.0,
            attack_ms: 2.0,
            release_ms: 150.0,
            envelope: 0.0,
        }
    }
}

impl NoiseGate {
    fn threshold_linear(&self) -> f32 {
        audiomux_plugin_api::db_to_linear(self.threshold_db)
    }

    fn attack_coeff(&self) -> f32 {
        (-1.0 / (self.attack_ms * 0.001 * self.sample_rate)).exp()
    }

    fn release_coeff(&self) -> f32 {
        (-1.0 / (self.release_ms * 0.001 * self.sample_rate)).exp()
    }
}

impl AudioEffect for NoiseGate {
    fn info(&self) -> PluginInfo {
        PluginInfo::new("org.audiomux.dynamics.noise-gate", "Noise Gate")
            .with_vendor("AudioMux Contributors")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_category(PluginCategory::Dynamics)
            .with_channels(2, 2)
    }

    fn activate(&mut self, context: ActivationContext) {
        self.sample_rate = context.sample_rate;
        self.envelope = 0.0;
    }

    fn deactivate(&mut self) {
        self.envelope = 0.0;
    }

    fn process(&mut self, inputs: RSlice<RSlice<f32>>, mut outputs: RSliceMut<RSliceMut<f32>>) {
        let threshold = self.threshold_linear();
        let attack = self.attack_coeff();
        let release = self.release_coeff();

        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            let frames = input.len().min(output.len());
            for i in 0..frames {
                let sample = input[i];
                let rectified = sample.abs();
                let coeff = if rectified > self.envelope { attack } else { release };
                self.envelope = rectified + coeff * (self.envelope - rectified);
                let gain = if self.envelope >= threshold { 1.0 } else { 0.0 };
                output[i] = sample * gain;
            }
        }
    }

    fn parameter_count(&self) -> u32 {
        PARAM_COUNT
    }

    fn parameter_info(&self, index: u32) -> abi_stable::std_types::ROption<ParameterInfo> {
        use abi_stable::std_types::ROption;
        let info = match index {
            THRESHOLD_PARAM => ParameterInfo::new(index, "threshold", "Threshold", THRESHOLD_MIN_DB, THRESHOLD_MAX_DB, -45.0)
                .with_unit("dB")
                .with_curve(ParameterCurve::Linear),
            ATTACK_PARAM => ParameterInfo::new(index, "attack", "Attack", ATTACK_MIN_MS, ATTACK_MAX_MS, 2.0)
                .with_unit("ms")
                .with_curve(ParameterCurve::Logarithmic),
            RELEASE_PARAM => ParameterInfo::new(index, "release", "Release", RELEASE_MIN_MS, RELEASE_MAX_MS, 150.0)
                .with_unit("ms")
                .with_curve(ParameterCurve::Logarithmic),
            _ => return ROption::RNone,
        };
        ROption::RSome(info)
    }

    fn get_parameter(&self, index: u32) -> f32 {
        match index {
            THRESHOLD_PARAM => audiomux_plugin_api::normalize(self.threshold_db, THRESHOLD_MIN_DB, THRESHOLD_MAX_DB, ParameterCurve::Linear),
            ATTACK_PARAM => audiomux_plugin_api::normalize(self.attack_ms, ATTACK_MIN_MS, ATTACK_MAX_MS, ParameterCurve::Logarithmic),
            RELEASE_PARAM => audiomux_plugin_api::normalize(self.release_ms, RELEASE_MIN_MS, RELEASE_MAX_MS, ParameterCurve::Logarithmic),
            _ => 0.0,
        }
    }

    fn set_parameter(&mut self, index: u32, value: f32) {
        match index {
            THRESHOLD_PARAM => self.threshold_db = audiomux_plugin_api::denormalize(value, THRESHOLD_MIN_DB, THRESHOLD_MAX_DB, ParameterCurve::Linear),
            ATTACK_PARAM => self.attack_ms = audiomux_plugin_api::denormalize(value, ATTACK_MIN_MS, ATTACK_MAX_MS, ParameterCurve::Logarithmic),
            RELEASE_PARAM => self.release_ms = audiomux_plugin_api::denormalize(value, RELEASE_MIN_MS, RELEASE_MAX_MS, ParameterCurve::Logarithmic),
            _ => {}
        }
    }

    fn save_state(&self) -> RVec<u8> {
        let mut bytes = Vec::with_capacity(12);
        bytes.extend_from_slice(&self.threshold_db.to_le_bytes());
        bytes.extend_from_slice(&self.attack_ms.to_le_bytes());
        bytes.extend_from_slice(&self.release_ms.to_le_bytes());
        bytes.into()
    }

    fn load_state(&mut self, data: RSlice<u8>) -> RResult<(), PluginError> {
        if data.len() != 12 {
            return RResult::RErr(PluginError::StateLoadFailed(RString::from(format!(
                "expected 12 bytes, got {}",
                data.len()
            ))));
        }
        let threshold = f32::from_le_bytes(data[0..4].try_into().unwrap());
        let attack = f32::from_le_bytes(data[4..8].try_into().unwrap());
        let release = f32::from_le_bytes(data[8..12].try_into().unwrap());
        self.threshold_db = threshold;
        self.attack_ms = attack;
        self.release_ms = release;
        RResult::ROk(())
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

declare_plugin!(NoiseGate);

#[cfg(test)]
mod tests {
    use super::*;
    use abi_stable::std_types::RSlice as OwnedRSlice;

    fn gate() -> NoiseGate {
        let mut g = NoiseGate::default();
        g.activate(ActivationContext { sample_rate: 48_000.0, max_block_size: 256 });
        g
    }

    #[test]
    fn silence_below_threshold_is_gated_closed() {
        let mut g = gate();
        g.threshold_db = -20.0;
        let input = vec![0.001f32; 64];
        let mut output = vec![0.0f32; 64];
        {
            let inputs = vec![OwnedRSlice::from(input.as_slice())];
            let mut out_slices = vec![abi_stable::std_types::RSliceMut::from(output.as_mut_slice())];
            g.process(RSlice::from(inputs.as_slice()), RSliceMut::from(out_slices.as_mut_slice()));
        }
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn loud_signal_passes_through_once_envelope_rises() {
        let mut g = gate();
        g.threshold_db = -20.0;
        let input = vec![0.5f32; 256];
        let mut output = vec![0.0f32; 256];
        {
            let inputs = vec![OwnedRSlice::from(input.as_slice())];
            let mut out_slices = vec![abi_stable::std_types::RSliceMut::from(output.as_mut_slice())];
            g.process(RSlice::from(inputs.as_slice()), RSliceMut::from(out_slices.as_mut_slice()));
        }
        assert!(output.last().copied().unwrap_or(0.0) != 0.0);
    }

    #[test]
    fn parameter_round_trips_through_normalize_denormalize() {
        let mut g = gate();
        g.set_parameter(THRESHOLD_PARAM, 0.5);
        let back = g.get_parameter(THRESHOLD_PARAM);
        assert!((back - 0.5).abs() < 0.01);
    }

    #[test]
    fn state_save_load_round_trips() {
        let mut g = gate();
        g.threshold_db = -30.0;
        g.attack_ms = 5.0;
        g.release_ms = 300.0;
        let saved = g.save_state();

        let mut g2 = NoiseGate::default();
        g2.load_state(RSlice::from(saved.as_slice())).unwrap();
        assert_eq!(g2.threshold_db, -30.0);
        assert_eq!(g2.attack_ms, 5.0);
        assert_eq!(g2.release_ms, 300.0);
    }
}
