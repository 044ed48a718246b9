//! Studio configuration, read from a TOML file.
//!
//! ```toml
//! [persistence]
//! compression_level = 6
//! scratch_limit = 268435456
//! free_host_copies = true
//! project_dir = "/home/me/projects"
//!
//! [persistence.buffers]
//! staging = 65536
//! output = 65536
//! input = 65536
//!
//! [startup]
//! splash_frames = 90
//! intro_ms = 1500
//!
//! [ui]
//! transition_ms = 750
//! message_ms = 5000
//! ```
//!
//! Every field is optional; missing ones take their default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{CodecBuffers, CompressionLevel};
use crate::scratch::DEFAULT_SCRATCH_LIMIT;

/// Default application name for the data directory.
pub const DEFAULT_APP_NAME: &str = "lumen_studio";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("cannot read config '{}': {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("invalid config '{}': {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
  #[error("cannot serialize config: {0}")]
  Serialize(#[from] toml::ser::Error),
  #[error("cannot write config '{}': {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
  pub compression_level: CompressionLevel,
  pub buffers: CodecBuffers,
  /// Upper bound of the decompression scratch buffer in bytes.
  pub scratch_limit: usize,
  /// Drop host copies of GPU-resident resources while a project loads.
  pub free_host_copies: bool,
  /// Where projects are saved; the platform data directory when unset.
  pub project_dir: Option<PathBuf>,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      compression_level: CompressionLevel::DEFAULT,
      buffers: CodecBuffers::default(),
      scratch_limit: DEFAULT_SCRATCH_LIMIT,
      free_host_copies: true,
      project_dir: None,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
  pub splash_frames: u32,
  pub intro_ms: u64,
}

impl Default for StartupConfig {
  fn default() -> Self {
    Self {
      splash_frames: 90,
      intro_ms: 1500,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
  /// Length of the fade after a project was swapped in.
  pub transition_ms: u64,
  /// Lifetime of status messages.
  pub message_ms: u64,
}

impl Default for UiConfig {
  fn default() -> Self {
    Self {
      transition_ms: 750,
      message_ms: 5000,
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
  pub persistence: PersistenceConfig,
  pub startup: StartupConfig,
  pub ui: UiConfig,
}

impl StudioConfig {
  /// Config with every delay set to zero, for headless runs.
  pub fn immediate() -> Self {
    Self {
      startup: StartupConfig {
        splash_frames: 0,
        intro_ms: 0,
      },
      ui: UiConfig {
        transition_ms: 0,
        ..UiConfig::default()
      },
      ..Self::default()
    }
  }

  /// Reads `path`, falling back to defaults when the file does not exist.
  pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
      Ok(contents) => contents,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        log::info!("no config at {}, using defaults", path.display());
        return Ok(Self::default());
      }
      Err(source) => {
        return Err(ConfigError::Read {
          path: path.to_owned(),
          source,
        });
      }
    };
    let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
      path: path.to_owned(),
      source,
    })?;
    log::info!("loaded config from {}", path.display());
    Ok(config)
  }

  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    let contents = toml::to_string_pretty(self)?;
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
        path: path.to_owned(),
        source,
      })?;
    }
    std::fs::write(path, contents).map_err(|source| ConfigError::Write {
      path: path.to_owned(),
      source,
    })
  }

  pub fn intro_duration(&self) -> Duration {
    Duration::from_millis(self.startup.intro_ms)
  }

  pub fn transition_duration(&self) -> Duration {
    Duration::from_millis(self.ui.transition_ms)
  }

  pub fn message_lifetime(&self) -> Duration {
    Duration::from_millis(self.ui.message_ms)
  }

  /// Configured project directory, or the platform default.
  pub fn project_dir(&self) -> PathBuf {
    self
      .persistence
      .project_dir
      .clone()
      .unwrap_or_else(|| default_project_dir(DEFAULT_APP_NAME))
  }
}

/// Returns the default project directory for the given app name.
///
/// Uses OS-standard data directories:
/// - Linux: `~/.local/share/<app_name>/projects/`
/// - Windows: `%APPDATA%/<app_name>/projects/`
/// - macOS: `~/Library/Application Support/<app_name>/projects/`
#[cfg(feature = "native")]
pub fn default_project_dir(app_name: &str) -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(app_name)
    .join("projects")
}

/// Without a platform data directory projects live next to the executable.
#[cfg(not(feature = "native"))]
pub fn default_project_dir(_app_name: &str) -> PathBuf {
  PathBuf::from("projects")
}
