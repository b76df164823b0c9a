//! Shared fixtures: robot and scenario files written to a temp directory

#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Linear speed at command 100, in rad/s
pub const MAX_SPEED: f64 = 10.0;
pub const WHEEL_DIAMETER: f64 = 5.0;

pub fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

/// Two 54696 motors on A and B driving wheels 10 cm apart, a downward
/// colour sensor on C, a distance sensor on D and a 54675 motor on F
pub fn write_robot(dir: &Path) -> PathBuf {
    // Design units are millimetres
    let design = json!({
        "parts": [
            { "id": "54696", "north": 0, "east": -50, "down": -25, "roll": 90 },
            { "id": "54696", "north": 0, "east": 50, "down": -25, "roll": -90 },
            { "id": "39367PB01", "north": 0, "east": -50, "down": -25, "roll": 90 },
            { "id": "39367PB01", "north": 0, "east": 50, "down": -25, "roll": -90 },
            { "id": "37308C01", "north": 50, "east": 0, "down": -10, "pitch": -90 },
            { "id": "37316C01", "north": 60, "east": 0, "down": -30 },
            { "id": "54675", "north": -40, "east": 0, "down": -60 },
            { "id": "BB1142C01", "north": 0, "east": 0, "down": -60 },
            { "id": "3001", "north": 0, "east": 0, "down": -80 }
        ]
    });
    write_json(dir, "design.json", &design);

    let speeds: serde_json::Map<String, Value> = (0..=100)
        .map(|c| (c.to_string(), json!(MAX_SPEED * c as f64 / 100.0)))
        .collect();
    let abaqus = json!({
        "motor-command": { "speed": speeds },
        "wheel-diameter": { "diameter": { "39367PB01": WHEEL_DIAMETER } }
    });
    write_json(dir, "abaqus.json", &abaqus);

    let robot = json!({
        "design": { "filename": "design.json", "ldu": 0.1 },
        "abaqus": "abaqus.json",
        "components": [
            { "port": "A", "type": "Motor", "id": "54696", "index": 0 },
            { "port": "B", "type": "Motor", "id": "54696", "index": 1 },
            { "port": "A", "type": "Wheel", "id": "39367PB01", "index": 0, "spin": 1 },
            { "port": "B", "type": "Wheel", "id": "39367PB01", "index": 1, "spin": 1 },
            { "port": "C", "type": "ColorSensor", "id": "37308C01", "index": 0 },
            { "port": "D", "type": "DistanceSensor", "id": "37316C01", "index": 0 },
            { "port": "F", "type": "Motor", "id": "54675", "index": 0 }
        ]
    });
    write_json(dir, "robot.json", &robot)
}

/// Controlled clock at 0.1 s, computed data starting at `coordinates`
pub fn write_compute_scenario(dir: &Path, north: f64, east: f64, yaw: f64, ground: Option<Value>) -> PathBuf {
    let mut scenario = json!({
        "time": { "mode": "controlled", "period": 0.1 },
        "data": { "mode": "compute", "coordinates": { "north": north, "east": east, "yaw": yaw } }
    });
    if let Some(ground) = ground {
        scenario["ground"] = ground;
    }
    write_json(dir, "scenario.json", &scenario)
}

/// Temp directory holding a robot and a compute scenario at the origin
pub fn fixture() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let robot = write_robot(dir.path());
    let scenario = write_compute_scenario(dir.path(), 0.0, 0.0, 0.0, None);
    (dir, scenario, robot)
}

pub fn args(pairs: &[(&str, spike_sim::Value)]) -> spike_sim::Args {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
