//! Host settings.
//!
//! Settings live in a TOML file under the platform config directory
//! (`~/.config/modular-host/settings.toml` on Linux). Every section and
//! field has a default, so a partial or missing file is fine.
//!
//! ```toml
//! [audio]
//! sample_rate = 48000
//! block_size = 256
//! output_channels = 2
//!
//! [features]
//! unlocked = ["effects"]
//!
//! [[plugins.user_plugins]]
//! format = "builtin"
//! uri = "osc.sine"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::{DeviceConfig, EngineSettings};
use crate::plugin::PluginDescriptor;

const APP_NAME: &str = "modular-host";
const SETTINGS_FILE: &str = "settings.toml";

/// Default directory searched for extension modules.
pub const DEFAULT_MODULE_PATH: &str = "/usr/local/lib/modular-host/modules";

/// Environment variable overriding the module search path.
pub const MODULE_PATH_ENV: &str = "MODULAR_HOST_MODULE_PATH";

/// Errors from reading or writing the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write settings file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    fn read_file(path: &Path, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write_file(path: &Path, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.to_path_buf(),
            source,
        }
    }

    fn create_dir(path: &Path, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Audio and MIDI device selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub block_size: usize,
    pub input_channels: usize,
    pub output_channels: usize,
    /// Output device by name; the system default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<String>,
    /// MIDI input port by name; MIDI is not opened when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi_input: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 256,
            input_channels: 0,
            output_channels: 2,
            output_device: None,
            midi_input: None,
        }
    }
}

/// Engine capacities, mirrored into [`EngineSettings`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_nodes: usize,
    pub max_buffers: usize,
    pub command_queue_size: usize,
    pub retire_queue_size: usize,
    pub reuse_buffers: bool,
    pub max_events_per_block: usize,
    pub stop_timeout_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineSettings::default();
        Self {
            max_nodes: defaults.max_nodes,
            max_buffers: defaults.max_buffers,
            command_queue_size: defaults.command_queue_size,
            retire_queue_size: defaults.retire_queue_size,
            reuse_buffers: defaults.reuse_buffers,
            max_events_per_block: defaults.max_events_per_block,
            stop_timeout_ms: defaults.stop_timeout.as_millis() as u64,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// The user's plugin list, restored at startup.
    pub user_plugins: Vec<PluginDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    /// Directories searched for extension modules.
    pub search_path: Vec<PathBuf>,
    /// Extension modules loaded at startup.
    pub autoload: Vec<String>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            search_path: vec![PathBuf::from(DEFAULT_MODULE_PATH)],
            autoload: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    /// Feature ids the static feature gate treats as unlocked.
    pub unlocked: Vec<String>,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            unlocked: vec![crate::modules::EFFECTS_FEATURE.to_string()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Everything in `settings.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub engine: EngineSection,
    pub plugins: PluginSettings,
    pub modules: ModuleSettings,
    pub features: FeatureSettings,
    pub log: LogSettings,
}

impl Settings {
    /// `<config_dir>/modular-host/settings.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join(SETTINGS_FILE)
    }

    /// Loads settings from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::read_file(path, e)),
        };
        let settings = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Loads from [`Settings::default_path`].
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(Self::default_path())
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes the settings to `path`, creating its directory if needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let engine = &self.engine;
        EngineSettings {
            max_nodes: engine.max_nodes,
            max_buffers: engine.max_buffers,
            command_queue_size: engine.command_queue_size,
            retire_queue_size: engine.retire_queue_size,
            reuse_buffers: engine.reuse_buffers,
            max_events_per_block: engine.max_events_per_block,
            stop_timeout: Duration::from_millis(engine.stop_timeout_ms),
        }
    }

    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new(self.audio.sample_rate, self.audio.block_size)
            .with_channels(self.audio.input_channels, self.audio.output_channels)
    }

    /// Directories searched for extension modules: `MODULAR_HOST_MODULE_PATH`
    /// when set, otherwise `modules.search_path`.
    pub fn module_search_path(&self) -> Vec<PathBuf> {
        match std::env::var_os(MODULE_PATH_ENV) {
            Some(value) if !value.is_empty() => std::env::split_paths(&value).collect(),
            _ => self.modules.search_path.clone(),
        }
    }
}
