// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `audiomux-core`: the real-time engine underneath the `audiomux` daemon.
//!
//! This crate owns the mechanism shared by every audio-moving component —
//! byte ring buffers, the SHM double-buffer layout, format/rate conversion,
//! and the DSP plugin graph — but none of the policy that decides *when*
//! those mechanisms run. Scheduling, device/stream lifecycle, and the
//! flexible loopback engine live in the `audiomux-daemon` crate, which
//! depends on this one.

pub mod convert;
pub mod dsp;
pub mod format;
pub mod ringbuf;
pub mod sfh;
pub mod shm;

pub use dsp::{DspEnv, DspIni, Graph, GraphError, NativeLoader, PluginLoader, ReloadableGraph};
pub use format::{AudioFormat, SampleFormat};
pub use ringbuf::{AudioArea, ByteBuffer};
pub use shm::StreamShm;
