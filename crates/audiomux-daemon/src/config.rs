// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Server configuration: the runtime-dir root for socket
//! discovery, declarative DSP file paths per device purpose, the
//! audio-thread scheduling priority policy, and floop pair definitions.
//! Persisted under `directories::ProjectDirs`, matching the daemon's
//! existing `ConfigManager` pattern.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("no config directory found for this platform")]
    NoConfigDir,
}

/// Audio-thread real-time scheduling policy: try real-time priority 12,
/// fall back to a nice value. Failure to elevate is logged, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default = "default_rt_priority")]
    pub realtime_priority: u8,
    #[serde(default = "default_nice_fallback")]
    pub nice_fallback: i8,
}

fn default_rt_priority() -> u8 {
    12
}

fn default_nice_fallback() -> i8 {
    -10
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            realtime_priority: default_rt_priority(),
            nice_fallback: default_nice_fallback(),
        }
    }
}

/// One declarative DSP pipeline file, bound to the device purpose it
/// applies to ("playback" / "capture", mirroring `PluginDef::purpose`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DspFileConfig {
    pub purpose: String,
    pub path: PathBuf,
}

/// A flexible loopback pair definition: which client types feed it. This is
/// normally established over the control-plane RPC; here it is config so the
/// floop engine can be exercised without the connection-accept/control-message
/// loop that RPC rides on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloopPairConfig {
    pub name: String,
    #[serde(default)]
    pub client_types_mask: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Directory socket paths are created under; defaults to
    /// `ProjectDirs::runtime_dir()` when unset.
    #[serde(default)]
    pub runtime_dir: Option<PathBuf>,
    #[serde(default)]
    pub dsp_files: Vec<DspFileConfig>,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub floop_pairs: Vec<FloopPairConfig>,
}

impl ServerConfig {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Loads and saves [`ServerConfig`] under the platform config directory,
/// matching the daemon's existing `ConfigManager` idiom.
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = directories::ProjectDirs::from("com", "audiomux", "audiomux")
            .map(|d| d.config_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)?;
        fs::create_dir_all(&config_dir)?;
        tracing::debug!("config directory: {:?}", config_dir);
        Ok(Self { config_dir })
    }

    fn config_path(&self) -> PathBuf {
        self.config_dir.join("server.toml")
    }

    pub fn load(&self) -> Result<ServerConfig, ConfigError> {
        let path = self.config_path();
        if !path.exists() {
            tracing::debug!("no server config found, using defaults");
            return Ok(ServerConfig::default());
        }
        let content = fs::read_to_string(&path)?;
        let config = ServerConfig::from_toml(&content)?;
        tracing::info!("loaded server config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, config: &ServerConfig) -> Result<(), ConfigError> {
        let path = self.config_path();
        fs::write(&path, config.to_toml()?)?;
        tracing::debug!("saved server config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let cfg = ServerConfig {
            runtime_dir: Some(PathBuf::from("/run/audiomux")),
            dsp_files: vec![DspFileConfig {
                purpose: "playback".to_string(),
                path: PathBuf::from("/etc/audiomux/dsp.ini"),
            }],
            scheduling: SchedulingConfig::default(),
            floop_pairs: vec![FloopPairConfig { name: "echo-cancel".to_string(), client_types_mask: 4 }],
        };
        let toml = cfg.to_toml().unwrap();
        let back = ServerConfig::from_toml(&toml).unwrap();
        assert_eq!(back.floop_pairs.len(), 1);
        assert_eq!(back.floop_pairs[0].client_types_mask, 4);
    }

    #[test]
    fn defaults_apply_when_fields_missing() {
        let cfg = ServerConfig::from_toml("").unwrap();
        assert_eq!(cfg.scheduling.realtime_priority, 12);
        assert_eq!(cfg.scheduling.nice_fallback, -10);
        assert!(cfg.floop_pairs.is_empty());
    }
}
