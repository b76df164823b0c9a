//! Physical part catalogue and per-part static data.

use crate::core::{Pose, Port, Side};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hardware part numbers per kind
const MOTOR_IDS: &[&str] = &["54696", "54675"];
const WHEEL_IDS: &[&str] = &["39367PB01", "49295C01", "32020C01"];
const COLOR_SENSOR_IDS: &[&str] = &["37308C01"];
const DISTANCE_SENSOR_IDS: &[&str] = &["37316C01"];
const FORCE_SENSOR_IDS: &[&str] = &["37312C01"];
const HUB_IDS: &[&str] = &["BB1142C01"];

/// Kind of physical part found in a robot design
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartKind {
    Motor,
    Wheel,
    ColorSensor,
    DistanceSensor,
    ForceSensor,
    Hub,
}

impl PartKind {
    /// Classify a hardware part number. Structural parts return `None`.
    pub fn from_id(id: &str) -> Option<Self> {
        if WHEEL_IDS.contains(&id) {
            Some(PartKind::Wheel)
        } else if COLOR_SENSOR_IDS.contains(&id) {
            Some(PartKind::ColorSensor)
        } else if DISTANCE_SENSOR_IDS.contains(&id) {
            Some(PartKind::DistanceSensor)
        } else if FORCE_SENSOR_IDS.contains(&id) {
            Some(PartKind::ForceSensor)
        } else if MOTOR_IDS.contains(&id) {
            Some(PartKind::Motor)
        } else if HUB_IDS.contains(&id) {
            Some(PartKind::Hub)
        } else {
            None
        }
    }

    /// Parts plugged into a hub port with a cable
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            PartKind::Motor | PartKind::ColorSensor | PartKind::DistanceSensor | PartKind::ForceSensor
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartKind::Motor => "Motor",
            PartKind::Wheel => "Wheel",
            PartKind::ColorSensor => "ColorSensor",
            PartKind::DistanceSensor => "DistanceSensor",
            PartKind::ForceSensor => "ForceSensor",
            PartKind::Hub => "Hub",
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Motor mounting data
#[derive(Debug, Clone, PartialEq)]
pub struct MotorSpec {
    /// +1 when a clockwise command drives the attached wheel forward
    pub clockwise: f64,
    /// Index of the wheel this motor drives
    pub wheel: Option<usize>,
}

/// Wheel geometry
#[derive(Debug, Clone, PartialEq)]
pub struct WheelSpec {
    /// Index of the driving motor
    pub motor: usize,
    /// Centimetres
    pub radius: f64,
    pub side: Side,
    pub spin: f64,
}

/// Kind-specific static data
#[derive(Debug, Clone, PartialEq)]
pub enum PartRole {
    Motor(MotorSpec),
    Wheel(WheelSpec),
    ColorSensor,
    DistanceSensor,
    ForceSensor,
    Hub,
}

/// A part of the robot with its fixed placement
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub id: String,
    pub port: Option<Port>,
    /// Pose relative to the wheel centre, fixed after configuration
    pub relative: Pose,
    pub role: PartRole,
}

impl Part {
    pub fn kind(&self) -> PartKind {
        match self.role {
            PartRole::Motor(_) => PartKind::Motor,
            PartRole::Wheel(_) => PartKind::Wheel,
            PartRole::ColorSensor => PartKind::ColorSensor,
            PartRole::DistanceSensor => PartKind::DistanceSensor,
            PartRole::ForceSensor => PartKind::ForceSensor,
            PartRole::Hub => PartKind::Hub,
        }
    }

    pub fn motor(&self) -> Option<&MotorSpec> {
        match &self.role {
            PartRole::Motor(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn wheel(&self) -> Option<&WheelSpec> {
        match &self.role {
            PartRole::Wheel(spec) => Some(spec),
            _ => None,
        }
    }
}

/// Sign telling whether a clockwise command moves the robot forward
///
/// Computed from the motor's mounting orientation: the sign of the world Y
/// component of its Z axis once rolled, pitched and yawed.
pub fn clockwise_sign(pose: &Pose) -> f64 {
    let (roll, pitch, yaw) = pose.euler();
    let y_for_z = roll.cos() * pitch.sin() * yaw.sin() - roll.sin() * yaw.cos();
    if y_for_z < 0.0 {
        -1.0
    } else {
        1.0
    }
}
