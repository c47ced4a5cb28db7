// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Top-level error aggregation, mirroring the daemon's `ServiceError`
//! pattern but split across the three classes of error handling:
//! recoverable (logged, surfaced to the client), device-local (triggers a
//! reset request), and fatal (`main` exits non-zero).

use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::stream::StreamError;
use audiomux_core::dsp::DspIniError;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    DspIni(#[from] DspIniError),
    #[error("fatal startup error: {0}")]
    Fatal(String),
}

impl DaemonError {
    /// `main` consults this to choose the process exit code.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DaemonError::Fatal(_))
    }
}
