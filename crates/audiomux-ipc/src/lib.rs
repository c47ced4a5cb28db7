// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Wire protocol for the control socket between audiomux clients and the
//! daemon.
//!
//! This crate defines the *contract* only: message IDs, packed payload
//! layouts, and socket path discovery. The socket transport itself (accept
//! loop, ancillary-fd passing for the per-stream SHM regions, the
//! client-library wrapper) is a named non-goal — those live on the main
//! thread and in a separate client library, both out of scope for the
//! audio-thread core this crate supports.
//!
//! Every control message is length-prefixed: a `u32` byte length followed by
//! a `u32` message id, then a fixed-layout payload. Client→server and
//! server→client ids are disjoint ranges so a single `u32` discriminant never
//! collides regardless of which side sent it.

mod audio_message;
mod format;
mod ids;
mod messages;
mod notify;
mod socket;

pub use audio_message::{AudioMessage, AudioMessageId};
pub use format::WireFormat;
pub use ids::{ClientMessageId, MessageHeader, ServerMessageId, HEADER_BYTES};
pub use messages::{
    ConnectStreamPayload, ConnectedPayload, RequestFloopPayload, RequestFloopReadyPayload,
    StreamConnectedPayload, StreamFlags,
};
pub use notify::NotificationKind;
pub use socket::{socket_path, SocketKind, MAX_SOCKET_PATH_LEN};

/// Errors decoding a wire message.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("message too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("declared length {declared} does not match {actual} bytes received")]
    LengthMismatch { declared: u32, actual: usize },
    #[error("unknown message id {0}")]
    UnknownId(u32),
    #[error("socket path {path:?} is {len} bytes, over the {max}-byte limit")]
    PathTooLong { path: String, len: usize, max: usize },
}
