use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::overlay::domain::overlay_config::OverlayConfig;
use crate::shared::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_BACKEND, DEFAULT_DEVICE,
    DEFAULT_DEVICE_PIXEL_FORMAT, DEFAULT_FRAME_RATE, DEFAULT_VIDEO_SIZE,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("overlay text references unknown value '{{{0}}}'")]
    UnknownPlaceholder(String),
    #[error("overlay text has an unterminated placeholder")]
    UnterminatedPlaceholder,
    #[error("{0}")]
    Invalid(String),
}

/// Which capture driver to open and how.
///
/// Values are handed to the device layer verbatim; invalid ones surface as a
/// device-open failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub backend: String,
    pub device: String,
    pub frame_rate: String,
    pub video_size: String,
    pub pixel_format: String,
    pub extra_options: BTreeMap<String, String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            device: DEFAULT_DEVICE.to_string(),
            frame_rate: DEFAULT_FRAME_RATE.to_string(),
            video_size: DEFAULT_VIDEO_SIZE.to_string(),
            pixel_format: DEFAULT_DEVICE_PIXEL_FORMAT.to_string(),
            extra_options: BTreeMap::new(),
        }
    }
}

impl DeviceConfig {
    /// Capture options in the order they are handed to the device layer.
    /// Empty values are left out so the driver picks its own default.
    pub fn options(&self) -> Vec<(String, String)> {
        let fixed = [
            ("framerate", &self.frame_rate),
            ("video_size", &self.video_size),
            ("pixel_format", &self.pixel_format),
        ];
        fixed
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.to_string(), v.clone()))
            .chain(
                self.extra_options
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            )
            .collect()
    }

    /// Parses `video_size` as `WxH`.
    pub fn video_dimensions(&self) -> Option<(u32, u32)> {
        let (w, h) = self.video_size.split_once(['x', 'X'])?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

/// Everything a capture session is configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub device: DeviceConfig,
    pub overlay: OverlayConfig,
    /// Raw filter-chain description. Overrides `overlay` when set.
    pub filter_description: Option<String>,
    /// Fail the read when the filter graph rejects a frame instead of
    /// logging and pulling anyway.
    pub strict_filter_push: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            overlay: OverlayConfig::default(),
            filter_description: None,
            strict_filter_push: false,
        }
    }
}

impl ReaderConfig {
    /// `<config dir>/overlaycam/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Loads the default config file, or defaults when there is none.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(write_err)
    }

    /// The filter-chain description the graph is built from.
    pub fn filter_description(&self) -> Result<String, ConfigError> {
        match &self.filter_description {
            Some(raw) if raw.trim().is_empty() => {
                Err(ConfigError::Invalid("filter description is empty".into()))
            }
            Some(raw) => Ok(raw.clone()),
            None => self.overlay.to_filter_description(),
        }
    }
}
