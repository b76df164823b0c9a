//! Static robot model
//!
//! Built once from the robot configuration, immutable afterwards. Holds every
//! part bound to a port (plus the hub), each with its pose relative to the
//! wheel centre, and the derived drive geometry.
//!
//! # Construction
//!
//! ```text
//! design parts ──► select by id + index ──► assign ports ──► pair wheels
//!                                                              │
//!                 relative poses ◄── wheel centre ◄────────────┘
//! ```
//!
//! Exactly two driven wheels are required.

pub mod abaqus;
pub mod design;
mod parts;

pub use abaqus::Abaqus;
pub use design::{load_design, RawPart};
pub use parts::{clockwise_sign, MotorSpec, Part, PartKind, PartRole, WheelSpec};

use crate::config::{ComponentConfig, RobotConfig};
use crate::core::{Pose, Port, Side};
use crate::error::{Error, Result};
use nalgebra::Vector3;
use std::collections::BTreeMap;

/// Immutable robot topology
#[derive(Debug, Clone)]
pub struct RobotModel {
    parts: Vec<Part>,
    ports: BTreeMap<Port, PartKind>,
    wheels: [usize; 2],
    track_width: f64,
    altitude: f64,
    abaqus: Abaqus,
}

/// Part selected from the design, before wheel pairing
struct Selected {
    raw: RawPart,
    kind: PartKind,
    port: Option<Port>,
    spin: Option<f64>,
}

impl RobotModel {
    /// Load the design and lookup tables named by a robot configuration
    pub fn load(config: &RobotConfig) -> Result<Self> {
        let raw = load_design(config.resolve(&config.design.filename), config.design.ldu)?;
        let abaqus = Abaqus::load(config.resolve(&config.abaqus))?;
        Self::build(raw, &config.components, abaqus)
    }

    /// Assemble the model from design parts and port assignments
    pub fn build(raw: Vec<RawPart>, components: &[ComponentConfig], abaqus: Abaqus) -> Result<Self> {
        let selected = select_parts(&raw, components)?;

        // Wheel centre is the reference point for every relative pose
        let wheel_positions: Vec<Vector3<f64>> = selected
            .iter()
            .filter(|s| s.kind == PartKind::Wheel && driving_motor(&selected, s.port).is_some())
            .map(|s| s.raw.pose.translation)
            .collect();
        if wheel_positions.len() != 2 {
            return Err(Error::Config(format!(
                "Can not manage other than 2 wheels yet (found {})",
                wheel_positions.len()
            )));
        }
        let center = Pose {
            translation: (wheel_positions[0] + wheel_positions[1]) * 0.5,
            ..Pose::identity()
        };

        // Parts are laid out in selection order, wheels last
        let mut parts = Vec::with_capacity(selected.len());
        let mut index_of = vec![None; selected.len()];
        for (i, s) in selected.iter().enumerate() {
            let role = match s.kind {
                PartKind::Motor => PartRole::Motor(MotorSpec {
                    clockwise: clockwise_sign(&s.raw.pose),
                    wheel: None,
                }),
                PartKind::ColorSensor => PartRole::ColorSensor,
                PartKind::DistanceSensor => PartRole::DistanceSensor,
                PartKind::ForceSensor => PartRole::ForceSensor,
                PartKind::Hub => PartRole::Hub,
                PartKind::Wheel => continue,
            };
            index_of[i] = Some(parts.len());
            parts.push(Part {
                id: s.raw.id.clone(),
                port: s.port,
                relative: s.raw.pose.relative_to(&center),
                role,
            });
        }

        let mut wheels = Vec::with_capacity(2);
        for s in selected.iter().filter(|s| s.kind == PartKind::Wheel) {
            let Some(motor_sel) = driving_motor(&selected, s.port) else {
                log::warn!("Wheel {} on port {:?} has no motor, ignored", s.raw.id, s.port);
                continue;
            };
            let motor = index_of[motor_sel].ok_or_else(|| {
                Error::Config(format!("Motor for wheel {} was not kept", s.raw.id))
            })?;
            let wheel = parts.len();
            parts.push(Part {
                id: s.raw.id.clone(),
                port: s.port,
                relative: s.raw.pose.relative_to(&center),
                role: PartRole::Wheel(WheelSpec {
                    motor,
                    radius: abaqus.wheel_radius(&s.raw.id)?,
                    side: Side::Left,
                    spin: s.spin.unwrap_or(1.0),
                }),
            });
            if let PartRole::Motor(spec) = &mut parts[motor].role {
                spec.wheel = Some(wheel);
            }
            wheels.push(wheel);
        }
        let wheels = [wheels[0], wheels[1]];

        // Side from lateral offset: the wheel further west is on the left
        let east = |i: usize| parts[i].relative.east();
        let (left, right) = if east(wheels[0]) < east(wheels[1]) {
            (wheels[0], wheels[1])
        } else {
            (wheels[1], wheels[0])
        };
        for (index, side) in [(left, Side::Left), (right, Side::Right)] {
            if let PartRole::Wheel(spec) = &mut parts[index].role {
                spec.side = side;
            }
        }

        let track_width = parts[wheels[0]].relative.distance(&parts[wheels[1]].relative);
        if track_width <= 0.0 {
            return Err(Error::Config("Wheels share the same position".to_string()));
        }

        let ports = parts
            .iter()
            .filter(|p| p.kind().is_connected())
            .filter_map(|p| p.port.map(|port| (port, p.kind())))
            .collect();

        let model = Self {
            parts,
            ports,
            wheels: [left, right],
            track_width,
            altitude: center.down(),
            abaqus,
        };
        log::info!(
            "Robot model: {} parts, track width {:.2} cm, altitude {:.2} cm",
            model.parts.len(),
            model.track_width,
            model.altitude
        );
        Ok(model)
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, index: usize) -> &Part {
        &self.parts[index]
    }

    /// Kind of cabled part on each occupied port
    pub fn ports(&self) -> &BTreeMap<Port, PartKind> {
        &self.ports
    }

    pub fn port_kind(&self, port: Port) -> Option<PartKind> {
        self.ports.get(&port).copied()
    }

    /// Index of the part of `kind` cabled on `port`
    pub fn find(&self, port: Port, kind: PartKind) -> Option<usize> {
        self.parts
            .iter()
            .position(|p| p.port == Some(port) && p.kind() == kind)
    }

    /// Index of the motor on `port`
    pub fn motor(&self, port: Port) -> Option<usize> {
        self.find(port, PartKind::Motor)
    }

    /// Left and right wheel indices
    pub fn wheels(&self) -> [usize; 2] {
        self.wheels
    }

    /// Distance between the two wheels in centimetres
    pub fn track_width(&self) -> f64 {
        self.track_width
    }

    /// Height of the wheel centre (down axis, centimetres)
    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn abaqus(&self) -> &Abaqus {
        &self.abaqus
    }

    /// Two distinct motors of the same hardware type
    pub fn pairable(&self, left: Port, right: Port) -> bool {
        if left == right {
            return false;
        }
        match (self.motor(left), self.motor(right)) {
            (Some(l), Some(r)) => self.parts[l].id == self.parts[r].id,
            _ => false,
        }
    }
}

/// Pick the `index`-th design occurrence of each configured part number
fn select_parts(raw: &[RawPart], components: &[ComponentConfig]) -> Result<Vec<Selected>> {
    let mut chosen: Vec<(usize, &ComponentConfig)> = Vec::with_capacity(components.len());

    for comp in components {
        let occurrences: Vec<usize> = raw
            .iter()
            .enumerate()
            .filter(|(_, p)| p.id == comp.id)
            .map(|(i, _)| i)
            .collect();
        if occurrences.is_empty() {
            return Err(Error::Config(format!(
                "Component {} not found in design for port {}",
                comp.id, comp.port
            )));
        }
        let raw_index = *occurrences.get(comp.index).ok_or_else(|| {
            Error::Config(format!(
                "Not enough {} components in design for port {} (index {}, found {})",
                comp.id,
                comp.port,
                comp.index,
                occurrences.len()
            ))
        })?;

        let actual = PartKind::from_id(&comp.id);
        if actual != Some(comp.kind) {
            return Err(Error::Config(format!(
                "Expected type {} does not match part {} on port {}",
                comp.kind, comp.id, comp.port
            )));
        }

        if comp.kind.is_connected() {
            let clash = chosen
                .iter()
                .any(|(_, other)| other.port == comp.port && other.kind.is_connected());
            if clash {
                return Err(Error::Config(format!(
                    "2 parts with hub connection on port {}",
                    comp.port
                )));
            }
        }
        chosen.push((raw_index, comp));
    }

    let mut selected: Vec<Selected> = chosen
        .into_iter()
        .map(|(i, comp)| Selected {
            raw: raw[i].clone(),
            kind: comp.kind,
            port: Some(comp.port),
            spin: comp.spin,
        })
        .collect();

    // The hub has no port but its pose is still tracked
    for part in raw {
        if PartKind::from_id(&part.id) == Some(PartKind::Hub) {
            selected.push(Selected {
                raw: part.clone(),
                kind: PartKind::Hub,
                port: None,
                spin: None,
            });
        }
    }
    Ok(selected)
}

fn driving_motor(selected: &[Selected], port: Option<Port>) -> Option<usize> {
    let port = port?;
    selected
        .iter()
        .position(|s| s.kind == PartKind::Motor && s.port == Some(port))
}

/// Canonical two-wheel robot used across unit tests
///
/// Motors on A (left) and B (right) 10 cm apart driving 2.5 cm wheels, a
/// downward colour sensor on C, a distance sensor on D, a force sensor on E
/// and a motor of another type on F.
#[cfg(test)]
pub(crate) fn test_robot() -> RobotModel {
    let raw = vec![
        RawPart::new("54696", 0.0, -5.0, -2.5, 90.0, 0.0, 0.0),
        RawPart::new("54696", 0.0, 5.0, -2.5, -90.0, 0.0, 0.0),
        RawPart::new("39367PB01", 0.0, -5.0, -2.5, 90.0, 0.0, 0.0),
        RawPart::new("39367PB01", 0.0, 5.0, -2.5, -90.0, 0.0, 0.0),
        RawPart::new("37308C01", 5.0, 0.0, -1.0, 0.0, -90.0, 0.0),
        RawPart::new("37316C01", 6.0, 0.0, -3.0, 0.0, 0.0, 0.0),
        RawPart::new("37312C01", -3.0, 0.0, -6.0, 0.0, 0.0, 0.0),
        RawPart::new("54675", -4.0, 0.0, -6.0, 0.0, 0.0, 0.0),
        RawPart::new("BB1142C01", 0.0, 0.0, -6.0, 0.0, 0.0, 0.0),
        RawPart::new("3001", 0.0, 0.0, -8.0, 0.0, 0.0, 0.0),
    ];
    let component = |port: Port, kind: PartKind, id: &str, index: usize, spin: Option<f64>| {
        ComponentConfig {
            port,
            kind,
            id: id.to_string(),
            index,
            spin,
        }
    };
    let components = vec![
        component(Port::A, PartKind::Motor, "54696", 0, None),
        component(Port::B, PartKind::Motor, "54696", 1, None),
        component(Port::A, PartKind::Wheel, "39367PB01", 0, Some(1.0)),
        component(Port::B, PartKind::Wheel, "39367PB01", 1, Some(1.0)),
        component(Port::C, PartKind::ColorSensor, "37308C01", 0, None),
        component(Port::D, PartKind::DistanceSensor, "37316C01", 0, None),
        component(Port::E, PartKind::ForceSensor, "37312C01", 0, None),
        component(Port::F, PartKind::Motor, "54675", 0, None),
    ];
    let abaqus = Abaqus::linear_speed_table(10.0).with(abaqus::DIAMETER, "39367PB01", 5.0);
    RobotModel::build(raw, &components, abaqus).expect("test robot must build")
}
