//! Scenario and robot configuration
//!
//! Both files are JSON. Relative paths inside a file are resolved against the
//! directory holding that file.
//!
//! # Scenario file
//!
//! ```json
//! {
//!     "time":   { "mode": "controlled", "period": 0.1 },
//!     "data":   { "mode": "compute", "coordinates": { "north": 0, "east": 0, "yaw": 0 } },
//!     "ground": { "image": "mat.png", "scale": 0.1 }
//! }
//! ```
//!
//! In read mode `data` is `{ "mode": "read", "filename": "recording.json" }`.
//!
//! # Robot file
//!
//! ```json
//! {
//!     "design":     { "filename": "robot.json", "ldu": 0.04 },
//!     "abaqus":     "abaqus.json",
//!     "components": [ { "port": "A", "type": "Motor", "id": "54696", "index": 0 },
//!                     { "port": "A", "type": "Wheel", "id": "39367PB01", "index": 0, "spin": 1 } ]
//! }
//! ```

use crate::clock::ClockMode;
use crate::core::Port;
use crate::error::{Error, Result};
use crate::model::PartKind;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Clock section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeConfig {
    pub mode: ClockMode,

    /// Seconds per step, required in controlled mode
    #[serde(default)]
    pub period: Option<f64>,
}

/// Initial robot placement on the mat (centimetres, yaw in degrees)
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Coordinates {
    pub north: f64,
    pub east: f64,
    pub yaw: f64,
}

/// Where component measurements come from
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DataConfig {
    /// Live kinematics
    Compute { coordinates: Coordinates },
    /// Recorded channel table
    Read { filename: PathBuf },
}

/// Ground mat image
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroundConfig {
    pub image: PathBuf,
    /// Centimetres per pixel
    pub scale: f64,
}

/// Complete scenario description
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub time: TimeConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub ground: Option<GroundConfig>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ScenarioConfig {
    /// Load a scenario file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Self = read_json(path)?;
        config.base_dir = parent_dir(path);
        log::info!("Loaded scenario configuration from {}", path.display());
        Ok(config)
    }

    /// Parse a scenario from a JSON string, resolving paths against `base_dir`
    pub fn from_json(json: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: Self = parse_json(json, "scenario")?;
        config.base_dir = base_dir.into();
        Ok(config)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }
}

/// CAD design reference
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DesignConfig {
    pub filename: PathBuf,
    /// Centimetres per design unit
    pub ldu: f64,
}

/// One physical part bound to a hub port
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub port: Port,
    #[serde(rename = "type")]
    pub kind: PartKind,
    /// Hardware part number
    pub id: String,
    /// Occurrence of `id` in the design, counted from zero
    pub index: usize,
    /// Wheel rotation relative to its motor
    #[serde(default)]
    pub spin: Option<f64>,
}

/// Static robot description
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RobotConfig {
    pub design: DesignConfig,
    pub abaqus: PathBuf,
    pub components: Vec<ComponentConfig>,

    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl RobotConfig {
    /// Load a robot file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Self = read_json(path)?;
        config.base_dir = parent_dir(path);
        log::info!(
            "Loaded robot configuration from {} ({} components)",
            path.display(),
            config.components.len()
        );
        Ok(config)
    }

    pub fn from_json(json: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: Self = parse_json(json, "robot")?;
        config.base_dir = base_dir.into();
        Ok(config)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }
}

/// Read and parse a JSON file, reporting failures as configuration errors
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_json(&content, &path.display().to_string())
}

fn parse_json<T: DeserializeOwned>(content: &str, what: &str) -> Result<T> {
    serde_json::from_str(content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", what, e)))
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}
