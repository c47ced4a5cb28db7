// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Resolving a plugin's `library` key to a runnable instance.
//!
//! `"builtin"` resolves in-process to one of [`crate::dsp::builtin::BuiltinKind`].
//! Anything else is the path to a shared object exporting
//! `audiomux_plugin_entry` (see `audiomux-plugin-api::declare_plugin!`),
//! loaded with `libloading`. The loaded `libloading::Library` is kept
//! alongside the instantiated plugin for as long as the plugin is in the
//! graph — dropping it while the plugin is still live would unmap code the
//! plugin's vtable points into.

use std::path::Path;

use audiomux_plugin_api::{ActivationContext, PluginBox, PluginEntry, API_VERSION_MAJOR};
use libloading::{Library, Symbol};

use crate::dsp::builtin::BuiltinKind;

#[derive(Debug, thiserror::Error)]
pub enum PluginLoadError {
    #[error("failed to load shared library {0:?}: {1}")]
    LoadFailed(String, libloading::Error),
    #[error("shared library {0:?} does not export audiomux_plugin_entry: {1}")]
    MissingEntryPoint(String, libloading::Error),
    #[error("shared library {0:?} declares API major version {1}, host expects {2}")]
    ApiVersionMismatch(String, u32, u32),
}

/// Either a builtin kind or a loaded native plugin instance.
pub enum LoadedPlugin {
    Builtin(BuiltinKind),
    Native {
        // Held only to keep the library mapped for the plugin's lifetime;
        // never accessed directly once loaded.
        _library: Library,
        instance: PluginBox,
    },
}

/// Resolves a plugin's `library` key to a [`LoadedPlugin`].
pub trait PluginLoader {
    fn load(&self, library: &str, label: &str, sample_rate: f32, max_block_size: u32) -> Result<LoadedPlugin, PluginLoadError>;
}

/// The production loader: builtins resolve in-process, anything else is
/// `dlopen`'d from `plugin_dir`.
pub struct NativeLoader {
    pub plugin_dir: std::path::PathBuf,
}

impl NativeLoader {
    pub fn new(plugin_dir: impl Into<std::path::PathBuf>) -> Self {
        Self { plugin_dir: plugin_dir.into() }
    }
}

impl PluginLoader for NativeLoader {
    fn load(&self, library: &str, label: &str, sample_rate: f32, max_block_size: u32) -> Result<LoadedPlugin, PluginLoadError> {
        if library == "builtin" {
            let kind = BuiltinKind::from_label(label)
                .unwrap_or(BuiltinKind::Sink); // unknown builtin label degrades to a no-op sink rather than failing compile
            return Ok(LoadedPlugin::Builtin(kind));
        }

        let path: std::path::PathBuf = if Path::new(library).is_absolute() {
            library.into()
        } else {
            self.plugin_dir.join(library)
        };
        let path_str = path.display().to_string();

        // SAFETY: the loaded library is expected to export a well-formed
        // `audiomux_plugin_entry` per the plugin-api contract; this is the
        // same trust boundary every native-plugin host accepts.
        let lib = unsafe { Library::new(&path) }
            .map_err(|e| PluginLoadError::LoadFailed(path_str.clone(), e))?;

        let entry: PluginEntry = unsafe {
            let sym: Symbol<unsafe extern "C" fn() -> PluginEntry> =
                lib.get(b"audiomux_plugin_entry\0")
                    .map_err(|e| PluginLoadError::MissingEntryPoint(path_str.clone(), e))?;
            sym()
        };

        if entry.api_version_major != API_VERSION_MAJOR {
            return Err(PluginLoadError::ApiVersionMismatch(
                path_str,
                entry.api_version_major,
                API_VERSION_MAJOR,
            ));
        }

        let mut instance = (entry.create)();
        instance.activate(ActivationContext {
            sample_rate,
            max_block_size,
        });

        Ok(LoadedPlugin::Native { _library: lib, instance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BuiltinOnlyLoader;
    impl PluginLoader for BuiltinOnlyLoader {
        fn load(&self, library: &str, label: &str, _sr: f32, _blk: u32) -> Result<LoadedPlugin, PluginLoadError> {
            assert_eq!(library, "builtin");
            Ok(LoadedPlugin::Builtin(BuiltinKind::from_label(label).unwrap()))
        }
    }

    #[test]
    fn builtin_loader_resolves_known_labels() {
        let loader = BuiltinOnlyLoader;
        match loader.load("builtin", "sink", 48_000.0, 480).unwrap() {
            LoadedPlugin::Builtin(BuiltinKind::Sink) => {}
            _ => panic!("expected builtin sink"),
        }
    }
}
