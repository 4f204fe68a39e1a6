//! Configuration file handling for visionsnap.
//!
//! Loads configuration from `<config dir>/visionsnap/config.toml` or a custom
//! path, then applies `CUSTOM_VISION_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::camera::{CameraSettings, Resolution};
use crate::vision::{WorkflowSettings, DEFAULT_ENDPOINT};

pub const TRAINING_KEY_ENV: &str = "CUSTOM_VISION_TRAINING_KEY";
pub const PREDICTION_KEY_ENV: &str = "CUSTOM_VISION_PREDICTION_KEY";
pub const ENDPOINT_ENV: &str = "CUSTOM_VISION_ENDPOINT";
pub const PROJECT_ID_ENV: &str = "CUSTOM_VISION_PROJECT_ID";

/// Configuration file structure for visionsnap.
/// Loaded from the default path (or a custom path via --config).
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisionConfig {
    pub endpoint: String,
    pub training_key: String,
    pub prediction_key: String,
    pub project_name: String,
    pub project_id: Option<Uuid>,
    pub iteration_id: Option<Uuid>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            training_key: String::new(),
            prediction_key: String::new(),
            project_name: "planogram3".to_string(),
            project_id: None,
            iteration_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Base for the relative paths below
    pub root: PathBuf,
    /// Directory holding `valid/` and `invalid/` training images
    pub images: PathBuf,
    /// Where snapshots are written
    pub snapshot: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            images: PathBuf::from("Images"),
            snapshot: PathBuf::from("Evaluated").join("evaluated.jpg"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub device: u32,
    pub mirror: bool,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: 0,
            mirror: false,
            width: Resolution::MEDIUM.width,
            height: Resolution::MEDIUM.height,
            fps: 30,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file '{}' not found", .path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config file '{}': {source}", .path.display())]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {name}: {message}")]
    InvalidEnv { name: &'static str, message: String },
}

impl Config {
    /// Load configuration from a file path and apply environment overrides.
    ///
    /// With no path, a missing default file yields the defaults. An explicit
    /// path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load only the file layer, without environment overrides.
    pub fn load_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path.is_some();
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if !path.exists() {
            if explicit {
                return Err(ConfigError::NotFound { path });
            }
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(TRAINING_KEY_ENV) {
            self.vision.training_key = key;
        }
        if let Some(key) = get(PREDICTION_KEY_ENV) {
            self.vision.prediction_key = key;
        }
        if let Some(endpoint) = get(ENDPOINT_ENV) {
            self.vision.endpoint = endpoint;
        }
        if let Some(id) = get(PROJECT_ID_ENV) {
            let id = Uuid::parse_str(id.trim()).map_err(|e| ConfigError::InvalidEnv {
                name: PROJECT_ID_ENV,
                message: e.to_string(),
            })?;
            self.vision.project_id = Some(id);
        }
        Ok(())
    }

    /// Absolute-or-root-relative path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.paths.root.join(&self.paths.snapshot)
    }

    /// Directory containing the `valid/` and `invalid/` training sets.
    pub fn images_root(&self) -> PathBuf {
        self.paths.root.join(&self.paths.images)
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            project_name: self.vision.project_name.clone(),
            images_root: self.images_root(),
            poll_interval: Duration::from_millis(self.training.poll_interval_ms.max(1)),
            training_timeout: Duration::from_secs(self.training.timeout_secs),
            iteration_id: self.vision.iteration_id,
        }
    }

    pub fn camera_settings(&self) -> CameraSettings {
        CameraSettings {
            device_index: self.camera.device,
            resolution: Resolution {
                width: self.camera.width,
                height: self.camera.height,
            },
            fps: self.camera.fps,
            mirror: self.camera.mirror,
        }
    }
}

/// Mask a secret for display, keeping the last four characters.
pub fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count == 0 {
        "(not set)".to_string()
    } else if count <= 4 {
        "*".repeat(count)
    } else {
        let tail: String = key.chars().skip(count - 4).collect();
        format!("{}{}", "*".repeat(count - 4), tail)
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "visionsnap")
        .map(|d| d.config_dir().to_path_buf().join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/visionsnap/config.toml")
        })
}

/// Contents written by `config init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# visionsnap configuration

[vision]
# Service endpoint of the Custom Vision resource
endpoint = "https://southcentralus.api.cognitive.microsoft.com"
# Keys may also come from CUSTOM_VISION_TRAINING_KEY / CUSTOM_VISION_PREDICTION_KEY
training_key = ""
prediction_key = ""
# Name used when creating a new project
project_name = "planogram3"
# Attach to an existing project instead of creating one
# project_id = "00000000-0000-0000-0000-000000000000"
# Iteration used for predictions when none was trained this session
# iteration_id = "00000000-0000-0000-0000-000000000000"

[paths]
# Base directory for the relative paths below
root = "."
# Holds valid/ and invalid/ training images
images = "Images"
# Snapshot written by snapshot-and-evaluate
snapshot = "Evaluated/evaluated.jpg"

[training]
# Delay between training status checks
poll_interval_ms = 1000
# Give up waiting for training after this long
timeout_secs = 600

[camera]
# Camera device index (see list-cameras)
device = 0
# Mirror horizontally
mirror = false
# Requested capture resolution
width = 640
height = 480
fps = 30
"#;
