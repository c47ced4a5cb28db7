// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flexible loopback engine: a paired input/output
//! device that recycles classified playback streams into a synthetic
//! capture stream. The pair's shared state is held behind `Arc`, with each
//! side's device carrying a back-reference to it rather than recovered via
//! pointer arithmetic from an embedded-struct layout.

use std::sync::Arc;

use parking_lot::Mutex;

use audiomux_core::sfh::super_fast_hash;

use crate::stream::ClientType;

/// State shared by both halves of a floop pair.
pub struct FloopPairState {
    pub name: String,
    pub client_types_mask: u64,
    stable_id: u32,
    input_active: Mutex<bool>,
    shared_buffer: Mutex<Vec<f32>>,
}

impl FloopPairState {
    pub fn new(name: impl Into<String>, client_types_mask: u64) -> Arc<Self> {
        let name = name.into();
        let stable_id = stable_id(&name, client_types_mask);
        Arc::new(Self {
            name,
            client_types_mask,
            stable_id,
            input_active: Mutex::new(false),
            shared_buffer: Mutex::new(Vec::new()),
        })
    }

    pub fn stable_id(&self) -> u32 {
        self.stable_id
    }

    pub fn is_input_active(&self) -> bool {
        *self.input_active.lock()
    }

    /// `input_device.configure_dev`'s B→D transition: flips the
    /// active flag *before* anything re-evaluates attachment, since
    /// `match_output_stream` is defined to return false while inactive.
    pub fn activate_input(&self) {
        *self.input_active.lock() = true;
        tracing::debug!(name = %self.name, "floop: input activated");
    }

    /// `input_device.close_dev`'s D→B transition: deactivate, drop
    /// all attachments (owned by the caller, see [`FloopOutputDevice`]),
    /// reset the shared buffer.
    pub fn deactivate_input(&self) {
        *self.input_active.lock() = false;
        self.shared_buffer.lock().clear();
        tracing::debug!(name = %self.name, "floop: input deactivated");
    }

    /// Identity check a playback stream must pass to attach to the output
    /// side: `direction == playback AND input_active AND mask bit set`.
    /// Direction is checked by the caller (only playback streams are ever
    /// offered); this takes the client type alone.
    pub fn match_output_stream(&self, client_type: ClientType) -> bool {
        self.is_input_active() && (self.client_types_mask & client_type.bit()) != 0
    }

    fn write_frames(&self, frames: &[f32]) {
        let mut buf = self.shared_buffer.lock();
        buf.clear();
        buf.extend_from_slice(frames);
    }

    /// Input-side `get_buffer`: serves whatever the output side last wrote,
    /// or explicit zero-filled frames if no playback stream is currently
    /// feeding the pair — "has capture, no playback" yields silence rather
    /// than an empty buffer.
    fn read_frames(&self, frame_count: usize) -> Vec<f32> {
        let buf = self.shared_buffer.lock();
        if buf.is_empty() {
            vec![0.0; frame_count]
        } else {
            let mut out = buf.clone();
            out.resize(frame_count, 0.0);
            out
        }
    }
}

/// `stable_id` computation: fold the device name, then the pair's parameter
/// bytes seeded with the name hash, so two pairs sharing a name but
/// differing in `client_types_mask` are distinguishable rather than
/// colliding on name alone.
pub fn stable_id(name: &str, client_types_mask: u64) -> u32 {
    let name_hash = super_fast_hash(name.as_bytes(), 0);
    super_fast_hash(&client_types_mask.to_le_bytes(), name_hash)
}

/// The output half: a ring-buffer sink that accepts only matching
/// classified playback streams while the paired input is active.
pub struct FloopOutputDevice {
    pub state: Arc<FloopPairState>,
    attached_client_types: Vec<ClientType>,
}

impl FloopOutputDevice {
    pub fn new(state: Arc<FloopPairState>) -> Self {
        Self { state, attached_client_types: Vec::new() }
    }

    /// Offers a playback stream for attachment; returns whether it was
    /// accepted. Re-evaluation after `activate_input` should call this for
    /// every currently-open playback stream, re-evaluating each one for
    /// attachment.
    pub fn try_attach(&mut self, client_type: ClientType) -> bool {
        if self.state.match_output_stream(client_type) {
            self.attached_client_types.push(client_type);
            true
        } else {
            false
        }
    }

    pub fn attached_count(&self) -> usize {
        self.attached_client_types.len()
    }

    pub fn write_mixed(&self, frames: &[f32]) {
        self.state.write_frames(frames);
    }

    /// Detaches every stream; called on the input side's `close_dev`.
    pub fn detach_all(&mut self) {
        self.attached_client_types.clear();
    }
}

/// The input half: a synthetic capture device serving recycled playback
/// audio, or zero-fill when idle.
pub struct FloopInputDevice {
    pub state: Arc<FloopPairState>,
}

impl FloopInputDevice {
    pub fn new(state: Arc<FloopPairState>) -> Self {
        Self { state }
    }

    /// Order matters: activation happens before any attachment
    /// re-evaluation is attempted by the caller.
    pub fn configure_dev(&self) {
        self.state.activate_input();
    }

    /// Deactivate, then the caller detaches the paired output's
    /// streams and the shared buffer is reset.
    pub fn close_dev(&self, output: &mut FloopOutputDevice) {
        output.detach_all();
        self.state.deactivate_input();
    }

    pub fn get_buffer(&self, frame_count: usize) -> Vec<f32> {
        self.state.read_frames(frame_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_ordering_flips_on_configure_dev() {
        let state = FloopPairState::new("loopback", ClientType::Chrome.bit());
        assert!(!state.match_output_stream(ClientType::Chrome));

        let input = FloopInputDevice::new(state.clone());
        input.configure_dev();

        assert!(state.match_output_stream(ClientType::Chrome));
        assert!(!state.match_output_stream(ClientType::Arc));
    }

    #[test]
    fn stable_id_distinguishes_params() {
        let a = stable_id("loopback", ClientType::Chrome.bit());
        let b = stable_id("loopback", ClientType::Arc.bit());
        assert_ne!(a, b);
    }

    #[test]
    fn close_dev_detaches_streams_and_resets_buffer() {
        let state = FloopPairState::new("loopback", ClientType::Chrome.bit());
        let input = FloopInputDevice::new(state.clone());
        let mut output = FloopOutputDevice::new(state.clone());
        input.configure_dev();
        output.try_attach(ClientType::Chrome);
        assert_eq!(output.attached_count(), 1);

        input.close_dev(&mut output);

        assert_eq!(output.attached_count(), 0);
        assert!(!state.is_input_active());
    }

    #[test]
    fn capture_with_no_playback_gets_zero_fill_not_empty() {
        let state = FloopPairState::new("loopback", ClientType::Chrome.bit());
        let input = FloopInputDevice::new(state);
        let frames = input.get_buffer(16);
        assert_eq!(frames.len(), 16);
        assert!(frames.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn capture_serves_last_written_playback_frames() {
        let state = FloopPairState::new("loopback", ClientType::Chrome.bit());
        let input = FloopInputDevice::new(state.clone());
        let output = FloopOutputDevice::new(state);
        output.write_mixed(&[0.5, 0.25]);
        let frames = input.get_buffer(2);
        assert_eq!(frames, vec![0.5, 0.25]);
    }
}
