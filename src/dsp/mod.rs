// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The DSP pipeline: a directed graph of plugin instances
//! compiled from the declarative description in [`ini`] and executed per
//! block by [`graph::Graph`].
//!
//! - [`ini`] parses the section-keyed description and performs the
//!   `swap_lr`/`quad_rotation` post-parse rewrites.
//! - [`expr`] is the tiny boolean expression language a plugin's `disable`
//!   key is written in.
//! - [`builtin`] implements the zero-dependency `source`/`sink`/`swap_lr`/
//!   `quad_rotation` plugins every graph can use without loading a shared
//!   library.
//! - [`loader`] resolves a plugin's `library` key (`"builtin"` or a shared
//!   object path) to a runnable instance and compiles an [`ini::DspIni`]
//!   into a [`graph::Graph`].

pub mod builtin;
pub mod expr;
pub mod graph;
pub mod ini;
pub mod loader;

pub use expr::DisableExpr;
pub use graph::{DspEnv, Graph, GraphError, ReloadableGraph};
pub use ini::{DspIni, DspIniError, MAX_MOCK_INI_CHANNELS};
pub use loader::{NativeLoader, PluginLoadError, PluginLoader};
