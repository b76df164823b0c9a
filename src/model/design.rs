//! Robot design file: the list of parts with their placement.
//!
//! The file stands in for the CAD export. Positions are in design units and
//! scaled to centimetres by `ldu`; angles are degrees. Coordinates are
//! north-east-down with the ground plane at `down = 0`, so parts above the
//! ground have a negative `down`.
//!
//! ```json
//! { "parts": [ { "id": "54696", "north": 0, "east": -125, "down": -62.5, "roll": 90 } ] }
//! ```

use crate::config::read_json;
use crate::core::Pose;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct DesignFile {
    parts: Vec<DesignPart>,
}

#[derive(Debug, Deserialize)]
struct DesignPart {
    id: String,
    #[serde(default)]
    north: f64,
    #[serde(default)]
    east: f64,
    #[serde(default)]
    down: f64,
    #[serde(default)]
    roll: f64,
    #[serde(default)]
    pitch: f64,
    #[serde(default)]
    yaw: f64,
}

/// A part as placed in the design, before port assignment
#[derive(Debug, Clone, PartialEq)]
pub struct RawPart {
    pub id: String,
    /// Absolute placement in centimetres
    pub pose: Pose,
}

impl RawPart {
    /// Placement from centimetres and degrees
    pub fn new(id: &str, north: f64, east: f64, down: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            id: id.to_string(),
            pose: Pose::new(
                north,
                east,
                down,
                roll.to_radians(),
                pitch.to_radians(),
                yaw.to_radians(),
            ),
        }
    }
}

/// Read a design file and scale it to centimetres
pub fn load_design<P: AsRef<Path>>(path: P, ldu: f64) -> Result<Vec<RawPart>> {
    if ldu.is_nan() || ldu <= 0.0 {
        return Err(Error::Config(format!("design ldu must be positive, got {}", ldu)));
    }
    let design: DesignFile = read_json(path.as_ref())?;
    let parts: Vec<RawPart> = design
        .parts
        .into_iter()
        .map(|p| {
            RawPart::new(
                &p.id,
                p.north * ldu,
                p.east * ldu,
                p.down * ldu,
                p.roll,
                p.pitch,
                p.yaw,
            )
        })
        .collect();
    log::debug!("Design {}: {} parts", path.as_ref().display(), parts.len());
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn test_load_scales_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("robot.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{ "parts": [
                {{ "id": "54696", "north": 10, "east": -125, "down": -62.5, "roll": 90 }},
                {{ "id": "3001" }}
            ] }}"#
        )
        .unwrap();

        let parts = load_design(&path, 0.04).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].id, "54696");
        assert_relative_eq!(parts[0].pose.north(), 0.4, epsilon = 1e-12);
        assert_relative_eq!(parts[0].pose.east(), -5.0, epsilon = 1e-12);
        assert_relative_eq!(parts[0].pose.down(), -2.5, epsilon = 1e-12);
        let (roll, _, _) = parts[0].pose.euler_degrees();
        assert_relative_eq!(roll, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_ldu() {
        assert!(matches!(
            load_design("does-not-matter.json", 0.0),
            Err(Error::Config(_))
        ));
    }
}
