// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Well-known control-socket paths under a configurable runtime directory.

use crate::WireError;

/// `sockaddr_un.sun_path` is 108 bytes on Linux, including the NUL
/// terminator; keep one byte of headroom for it here since callers pass a
/// path without the terminator.
pub const MAX_SOCKET_PATH_LEN: usize = 107;

/// Which of the server's well-known sockets a client wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    /// The main control socket (`CONNECT_STREAM` and friends).
    Control,
    /// Playback-only variant exposed to sandboxed VM clients.
    Playback,
    /// Capture-only variant exposed to sandboxed VM clients.
    Capture,
    /// VM-specific control socket variant (crosvm/ARCVM/plugin-vm/Borealis).
    Vm,
}

impl SocketKind {
    fn file_name(self) -> &'static str {
        match self {
            SocketKind::Control => ".audiomux_socket",
            SocketKind::Playback => ".audiomux_playback",
            SocketKind::Capture => ".audiomux_capture",
            SocketKind::Vm => ".audiomux_vm_socket",
        }
    }
}

/// Build the full socket path for `kind` under `runtime_dir`, validating it
/// fits in `sockaddr_un.sun_path`.
pub fn socket_path(runtime_dir: &str, kind: SocketKind) -> Result<String, WireError> {
    let path = format!("{}/{}", runtime_dir.trim_end_matches('/'), kind.file_name());
    if path.len() > MAX_SOCKET_PATH_LEN {
        return Err(WireError::PathTooLong {
            len: path.len(),
            max: MAX_SOCKET_PATH_LEN,
            path,
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_control_path() {
        assert_eq!(
            socket_path("/run/audiomux", SocketKind::Control).unwrap(),
            "/run/audiomux/.audiomux_socket"
        );
    }

    #[test]
    fn rejects_overlong_runtime_dir() {
        let long_dir = "/run/".to_string() + &"x".repeat(200);
        assert!(matches!(
            socket_path(&long_dir, SocketKind::Control),
            Err(WireError::PathTooLong { .. })
        ));
    }
}
