//! Lookup tables ("abaqus") for motor speed curves and wheel diameters.
//!
//! The table file is JSON organised as sheet → topic → key → value:
//!
//! ```json
//! {
//!     "motor-command":  { "speed":    { "0": 0.0, "50": 8.7, "100": 17.4 } },
//!     "wheel-diameter": { "diameter": { "39367PB01": 5.6 } }
//! }
//! ```
//!
//! Sheets only group topics in the file; lookups go by topic and key.

use crate::config::read_json;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Topic holding motor angular speed (rad/s) per command percentage
pub const SPEED: &str = "speed";
/// Topic holding wheel diameter (cm) per part number
pub const DIAMETER: &str = "diameter";

type Sheet = HashMap<String, HashMap<String, f64>>;

/// Topic → key → value lookup
#[derive(Debug, Clone, Default)]
pub struct Abaqus {
    topics: HashMap<String, HashMap<String, f64>>,
}

impl Abaqus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every sheet of a table file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let sheets: HashMap<String, Sheet> = read_json(path.as_ref())?;
        let mut abaqus = Self::new();
        for (sheet, topics) in sheets {
            log::debug!("Abaqus sheet '{}': {} topics", sheet, topics.len());
            for (topic, values) in topics {
                abaqus.topics.entry(topic).or_default().extend(values);
            }
        }
        Ok(abaqus)
    }

    /// Add or replace one entry
    pub fn insert(&mut self, topic: &str, key: &str, value: f64) {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Builder form of [`Abaqus::insert`]
    pub fn with(mut self, topic: &str, key: &str, value: f64) -> Self {
        self.insert(topic, key, value);
        self
    }

    pub fn get(&self, topic: &str, key: &str) -> Result<f64> {
        let values = self
            .topics
            .get(topic)
            .ok_or_else(|| Error::Config(format!("Unknown abaqus topic: {}", topic)))?;
        values.get(key).copied().ok_or_else(|| {
            Error::Config(format!("Unknown abaqus key: {} for topic {}", key, topic))
        })
    }

    /// Angular speed in rad/s for a signed command percentage
    pub fn motor_speed(&self, command: f64) -> Result<f64> {
        let key = (command.abs().round() as i64).to_string();
        let magnitude = self.get(SPEED, &key)?;
        Ok(magnitude.copysign(command))
    }

    /// Wheel radius in centimetres
    pub fn wheel_radius(&self, id: &str) -> Result<f64> {
        Ok(self.get(DIAMETER, id)? * 0.5)
    }

    /// Linear speed table from 0 to 100 for tests and demos
    pub fn linear_speed_table(max_speed: f64) -> Self {
        let mut abaqus = Self::new();
        for command in 0..=100 {
            abaqus.insert(
                SPEED,
                &command.to_string(),
                max_speed * command as f64 / 100.0,
            );
        }
        abaqus
    }
}
