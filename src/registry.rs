//! Port and side bookkeeping for live API components
//!
//! A control program creates components (a motor on port A, the left
//! button, the light matrix...) and registers them before use. Registration
//! is an atomic check-and-insert against the robot model:
//!
//! | Kind | Binding | Rejected when |
//! |------|---------|---------------|
//! | Motor, ColorSensor, DistanceSensor, ForceSensor | one port | port missing, extra, unused, of another kind, taken |
//! | MotorPair | two ports | motors not registered, same port, not pairable, pair exists |
//! | Button | one side | side missing, extra, unknown, taken |
//! | LightMatrix, MotionSensor, Speaker, StatusLight | hub | any port given, already created |
//! | Timer | none | any port given |
//!
//! Every scenario tick pushes a [`Measurement`] into each registered
//! component, computed from the dynamics or replayed from recorded data.

use crate::core::{Port, Side, Value};
use crate::data::RecordedData;
use crate::dynamics::DynamicsStatus;
use crate::error::{poisoned, Error, Result};
use crate::hub::{HubStatus, PIXELS};
use crate::model::{PartKind, RobotModel};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Colour readings are scaled from 8-bit RGB to the sensor's 10-bit range
const COLOR_SCALE: f64 = 1024.0 / 255.0;

/// Reflected light reported in compute mode
const REFLECTED: f64 = 1024.0;

/// API component kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ComponentKind {
    Motor,
    MotorPair,
    ColorSensor,
    DistanceSensor,
    ForceSensor,
    Button,
    LightMatrix,
    MotionSensor,
    Speaker,
    StatusLight,
    Timer,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Motor => "Motor",
            ComponentKind::MotorPair => "MotorPair",
            ComponentKind::ColorSensor => "ColorSensor",
            ComponentKind::DistanceSensor => "DistanceSensor",
            ComponentKind::ForceSensor => "ForceSensor",
            ComponentKind::Button => "Button",
            ComponentKind::LightMatrix => "LightMatrix",
            ComponentKind::MotionSensor => "MotionSensor",
            ComponentKind::Speaker => "Speaker",
            ComponentKind::StatusLight => "StatusLight",
            ComponentKind::Timer => "Timer",
        }
    }

    /// Physical part a port-bound component needs on its port
    fn part_kind(&self) -> Option<PartKind> {
        match self {
            ComponentKind::Motor => Some(PartKind::Motor),
            ComponentKind::ColorSensor => Some(PartKind::ColorSensor),
            ComponentKind::DistanceSensor => Some(PartKind::DistanceSensor),
            ComponentKind::ForceSensor => Some(PartKind::ForceSensor),
            _ => None,
        }
    }

    /// Human-readable name used in error messages
    fn label(&self) -> &'static str {
        match self {
            ComponentKind::Motor => "motor",
            ComponentKind::MotorPair => "motor pair",
            ComponentKind::ColorSensor => "color sensor",
            ComponentKind::DistanceSensor => "distance sensor",
            ComponentKind::ForceSensor => "force sensor",
            ComponentKind::Button => "button",
            ComponentKind::LightMatrix => "light matrix",
            ComponentKind::MotionSensor => "motion sensor",
            ComponentKind::Speaker => "speaker",
            ComponentKind::StatusLight => "status light",
            ComponentKind::Timer => "timer",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a registered component is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    Port(Port),
    Pair { left: Port, right: Port },
    Side(Side),
    /// Integrated in the hub, or not attached at all
    Hub,
}

/// Handle returned by registration and passed back with every command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComponentRef {
    pub kind: ComponentKind,
    pub binding: Binding,
    /// Unique per registration; refs issued before a reset stop matching
    pub serial: u64,
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.binding {
            Binding::Port(port) => write!(f, "{}({})", self.kind, port),
            Binding::Pair { left, right } => write!(f, "{}({}, {})", self.kind, left, right),
            Binding::Side(side) => write!(f, "{}({})", self.kind, side),
            Binding::Hub => write!(f, "{}", self.kind),
        }
    }
}

/// Reading pushed into a component on each tick
///
/// Fields are `None` when the source has no value, e.g. a recording that
/// ended or a gesture in compute mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Measurement {
    Motion {
        yaw: Option<f64>,
        pitch: Option<f64>,
        roll: Option<f64>,
        gesture: Option<String>,
    },
    Motor {
        degrees: Option<f64>,
    },
    Color {
        red: Option<f64>,
        green: Option<f64>,
        blue: Option<f64>,
        ambient: Option<f64>,
        reflected: Option<f64>,
    },
    Distance {
        centimeters: Option<f64>,
    },
    Force {
        newtons: Option<f64>,
    },
    Button {
        pressed: Option<bool>,
    },
    LightMatrix {
        pixels: [u8; PIXELS],
    },
    StatusLight {
        on: bool,
        color: String,
    },
    Speaker {
        beeping: bool,
        note: u8,
        volume: u8,
    },
}

/// A live API object fed by the scenario
pub trait Component: Send + Sync {
    fn kind(&self) -> ComponentKind;

    /// Accept the latest measurement
    fn read(&self, measurement: &Measurement) -> Result<()>;
}

/// Component that keeps the last measurement it was given
#[derive(Debug)]
pub struct SimComponent {
    kind: ComponentKind,
    last: Mutex<Option<Measurement>>,
}

impl SimComponent {
    pub fn new(kind: ComponentKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            last: Mutex::new(None),
        })
    }

    /// Last measurement received, if any
    pub fn last(&self) -> Result<Option<Measurement>> {
        Ok(self.last.lock().map_err(poisoned("component"))?.clone())
    }
}

impl Component for SimComponent {
    fn kind(&self) -> ComponentKind {
        self.kind
    }

    fn read(&self, measurement: &Measurement) -> Result<()> {
        *self.last.lock().map_err(poisoned("component"))? = Some(measurement.clone());
        Ok(())
    }
}

struct Entry {
    reference: ComponentRef,
    component: Arc<dyn Component>,
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<Entry>,
    next_serial: u64,
}

impl RegistryState {
    fn find(&self, predicate: impl Fn(&ComponentRef) -> bool) -> Option<&ComponentRef> {
        self.entries
            .iter()
            .map(|e| &e.reference)
            .find(|r| predicate(r))
    }
}

/// Registered components, one lock for the whole table
#[derive(Default)]
pub struct ComponentRegistry {
    state: Mutex<RegistryState>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.state.lock().map_err(poisoned("registry"))
    }

    /// Forget every registration; the robot model is untouched
    pub fn reset(&self) -> Result<()> {
        self.lock()?.entries.clear();
        log::debug!("Component registrations cleared");
        Ok(())
    }

    /// Whether `reference` is still registered
    pub fn contains(&self, reference: &ComponentRef) -> Result<bool> {
        Ok(self
            .lock()?
            .find(|r| r.serial == reference.serial)
            .is_some())
    }

    /// Every live registration
    pub fn registered(&self) -> Result<Vec<ComponentRef>> {
        Ok(self.lock()?.entries.iter().map(|e| e.reference).collect())
    }

    /// Check `component` against the model and current registrations and
    /// insert it
    ///
    /// `port1` and `port2` are port letters, or a button side for buttons.
    pub fn register(
        &self,
        model: &RobotModel,
        component: Arc<dyn Component>,
        port1: Option<&str>,
        port2: Option<&str>,
    ) -> Result<ComponentRef> {
        let kind = component.kind();
        let mut state = self.lock()?;

        let binding = match kind {
            ComponentKind::Motor
            | ComponentKind::ColorSensor
            | ComponentKind::DistanceSensor
            | ComponentKind::ForceSensor => {
                Binding::Port(check_port(&state, model, kind, port1, port2)?)
            }
            ComponentKind::MotorPair => check_pair(&state, model, port1, port2)?,
            ComponentKind::Button => Binding::Side(check_side(&state, port1, port2)?),
            ComponentKind::LightMatrix
            | ComponentKind::MotionSensor
            | ComponentKind::Speaker
            | ComponentKind::StatusLight => {
                check_no_port(kind, port1, port2)?;
                if state.find(|r| r.kind == kind).is_some() {
                    return Err(Error::Config(format!("{} already created", capitalize(kind.label()))));
                }
                Binding::Hub
            }
            ComponentKind::Timer => {
                check_no_port(kind, port1, port2)?;
                Binding::Hub
            }
        };

        let reference = ComponentRef {
            kind,
            binding,
            serial: state.next_serial,
        };
        state.next_serial += 1;
        state.entries.push(Entry {
            reference,
            component,
        });
        log::debug!("Registered {}", reference);
        Ok(reference)
    }

    /// Push compute-mode measurements into every registered component
    pub fn measure_from_dynamics(&self, status: &DynamicsStatus, hub: &HubStatus) -> Result<()> {
        let readings = {
            let state = self.lock()?;
            state
                .entries
                .iter()
                .filter_map(|entry| {
                    let measurement = match entry.reference.binding {
                        Binding::Port(port) => match entry.reference.kind {
                            ComponentKind::Motor => Some(Measurement::Motor {
                                degrees: status.motor(port).map(|m| m.degrees),
                            }),
                            ComponentKind::ColorSensor => status.color(port).map(|c| Measurement::Color {
                                red: Some(c.red * COLOR_SCALE),
                                green: Some(c.green * COLOR_SCALE),
                                blue: Some(c.blue * COLOR_SCALE),
                                ambient: Some(0.0),
                                reflected: Some(REFLECTED),
                            }),
                            // No physical model for distance and force
                            _ => None,
                        },
                        Binding::Side(side) => Some(Measurement::Button {
                            pressed: Some(hub.is_pressed(side)),
                        }),
                        Binding::Hub if entry.reference.kind == ComponentKind::MotionSensor => {
                            Some(Measurement::Motion {
                                yaw: Some(status.yaw),
                                pitch: Some(status.pitch),
                                roll: Some(status.roll),
                                gesture: None,
                            })
                        }
                        Binding::Hub => hub_measurement(entry.reference.kind, hub),
                        Binding::Pair { .. } => None,
                    };
                    measurement.map(|m| (Arc::clone(&entry.component), m))
                })
                .collect::<Vec<_>>()
        };
        push(readings)
    }

    /// Push read-mode measurements replayed from `data` at `time`
    ///
    /// Hub-integrated outputs still come from the hub state.
    pub fn measure_from_data(&self, data: &RecordedData, time: f64, hub: &HubStatus) -> Result<()> {
        let number = |channel: String| -> Result<Option<f64>> {
            Ok(data.extrapolate(&channel, time)?.and_then(|v| v.as_f64()))
        };

        let mut readings = Vec::new();
        {
            let state = self.lock()?;
            for entry in &state.entries {
                let reference = entry.reference;
                let measurement = match (reference.kind, reference.binding) {
                    (ComponentKind::MotionSensor, _) => Some(Measurement::Motion {
                        yaw: number("yaw".to_string())?,
                        pitch: number("pitch".to_string())?,
                        roll: number("roll".to_string())?,
                        gesture: data.extrapolate("gesture", time)?.and_then(|v| match v {
                            Value::String(s) => Some(s),
                            _ => None,
                        }),
                    }),
                    (ComponentKind::Button, Binding::Side(side)) => Some(Measurement::Button {
                        pressed: data
                            .extrapolate(&format!("{}_is_pressed", side), time)?
                            .and_then(|v| as_bool(&v)),
                    }),
                    (ComponentKind::Motor, Binding::Port(port)) => Some(Measurement::Motor {
                        degrees: number(format!("{}_degrees", port))?,
                    }),
                    (ComponentKind::DistanceSensor, Binding::Port(port)) => Some(Measurement::Distance {
                        centimeters: number(format!("{}_distance", port))?,
                    }),
                    (ComponentKind::ColorSensor, Binding::Port(port)) => Some(Measurement::Color {
                        red: number(format!("{}_red", port))?,
                        green: number(format!("{}_green", port))?,
                        blue: number(format!("{}_blue", port))?,
                        ambient: number(format!("{}_ambiant", port))?,
                        reflected: number(format!("{}_reflected", port))?,
                    }),
                    (ComponentKind::ForceSensor, Binding::Port(port)) => Some(Measurement::Force {
                        newtons: number(format!("{}_force", port))?,
                    }),
                    (kind, Binding::Hub) => hub_measurement(kind, hub),
                    _ => None,
                };
                if let Some(measurement) = measurement {
                    readings.push((Arc::clone(&entry.component), measurement));
                }
            }
        }
        push(readings)
    }
}

fn push(readings: Vec<(Arc<dyn Component>, Measurement)>) -> Result<()> {
    for (component, measurement) in readings {
        component.read(&measurement)?;
    }
    Ok(())
}

/// Measurement of a hub-integrated output
fn hub_measurement(kind: ComponentKind, hub: &HubStatus) -> Option<Measurement> {
    match kind {
        ComponentKind::LightMatrix => Some(Measurement::LightMatrix {
            pixels: hub.light_matrix,
        }),
        ComponentKind::StatusLight => Some(Measurement::StatusLight {
            on: hub.status_light.on,
            color: hub.status_light.color.clone(),
        }),
        ComponentKind::Speaker => Some(Measurement::Speaker {
            beeping: hub.speaker.beeping,
            note: hub.speaker.note,
            volume: hub.speaker.volume,
        }),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        other => other.as_f64().map(|v| v != 0.0),
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_port(name: &str) -> Result<Port> {
    name.parse()
        .map_err(|_| Error::Config(format!("Port {} not used on robot", name)))
}

fn check_port(
    state: &RegistryState,
    model: &RobotModel,
    kind: ComponentKind,
    port1: Option<&str>,
    port2: Option<&str>,
) -> Result<Port> {
    let label = kind.label();
    let name = port1.ok_or_else(|| Error::Config(format!("No port provided for {}", label)))?;
    if port2.is_some() {
        return Err(Error::Config(format!("More than one port provided for {}", label)));
    }
    let port = parse_port(name)?;
    let hosted = model
        .port_kind(port)
        .ok_or_else(|| Error::Config(format!("Port {} not used on robot", port)))?;
    if Some(hosted) != kind.part_kind() {
        return Err(Error::Config(format!("Port {} does not host a {}", port, label)));
    }
    if state
        .find(|r| r.kind == kind && r.binding == Binding::Port(port))
        .is_some()
    {
        return Err(Error::Config(format!(
            "{} already created on port {}",
            capitalize(label),
            port
        )));
    }
    Ok(port)
}

fn check_pair(
    state: &RegistryState,
    model: &RobotModel,
    port1: Option<&str>,
    port2: Option<&str>,
) -> Result<Binding> {
    let left = port1.ok_or_else(|| Error::Config("No left port provided for motor pair".to_string()))?;
    let right =
        port2.ok_or_else(|| Error::Config("No right port provided for motor pair".to_string()))?;
    let (left, right) = (parse_port(left)?, parse_port(right)?);

    for port in [left, right] {
        let registered = state
            .find(|r| r.kind == ComponentKind::Motor && r.binding == Binding::Port(port))
            .is_some();
        if !registered {
            return Err(Error::Config(format!("Motor not created on port {}", port)));
        }
    }
    if left == right {
        return Err(Error::Config(format!(
            "Motor pair needs two different ports, got {} twice",
            left
        )));
    }
    if state.find(|r| r.kind == ComponentKind::MotorPair).is_some() {
        return Err(Error::Config("Motorpair already created".to_string()));
    }
    if !model.pairable(left, right) {
        return Err(Error::Config(format!(
            "Motors on ports {} and {} are not pairable",
            left, right
        )));
    }
    Ok(Binding::Pair { left, right })
}

fn check_side(state: &RegistryState, port1: Option<&str>, port2: Option<&str>) -> Result<Side> {
    let name = port1.ok_or_else(|| Error::Config("No side provided for button".to_string()))?;
    if port2.is_some() {
        return Err(Error::Config("More than one side provided for button".to_string()));
    }
    let side: Side = name.parse()?;
    if state
        .find(|r| r.kind == ComponentKind::Button && r.binding == Binding::Side(side))
        .is_some()
    {
        return Err(Error::Config(format!("Button already created on side {}", side)));
    }
    Ok(side)
}

fn check_no_port(kind: ComponentKind, port1: Option<&str>, port2: Option<&str>) -> Result<()> {
    if port1.is_some() || port2.is_some() {
        return Err(Error::Config(format!(
            "No port can be specified for {}",
            kind.label()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use crate::model::test_robot;
    use std::collections::HashMap;

    fn register(
        registry: &ComponentRegistry,
        model: &RobotModel,
        kind: ComponentKind,
        port1: Option<&str>,
        port2: Option<&str>,
    ) -> Result<ComponentRef> {
        registry.register(model, SimComponent::new(kind), port1, port2)
    }

    fn is_config<T>(result: Result<T>) -> bool {
        matches!(result, Err(Error::Config(_)))
    }

    #[test]
    fn test_port_bound_rejections() {
        let model = test_robot();
        let registry = ComponentRegistry::new();
        let motor = ComponentKind::Motor;

        assert!(is_config(register(&registry, &model, motor, None, None)));
        assert!(is_config(register(&registry, &model, motor, Some("A"), Some("B"))));
        assert!(is_config(register(&registry, &model, motor, Some("Z"), None)));
        assert!(is_config(register(&registry, &model, motor, Some("C"), None)));

        let reference = register(&registry, &model, motor, Some("A"), None).unwrap();
        assert_eq!(reference.binding, Binding::Port(Port::A));
        assert_eq!(reference.to_string(), "Motor(A)");
        assert!(is_config(register(&registry, &model, motor, Some("A"), None)));

        register(&registry, &model, ComponentKind::ColorSensor, Some("C"), None).unwrap();
        register(&registry, &model, ComponentKind::DistanceSensor, Some("D"), None).unwrap();
        register(&registry, &model, ComponentKind::ForceSensor, Some("E"), None).unwrap();
        assert!(is_config(register(
            &registry,
            &model,
            ComponentKind::ForceSensor,
            Some("D"),
            None
        )));
    }

    #[test]
    fn test_pair_rejections() {
        let model = test_robot();
        let registry = ComponentRegistry::new();
        let pair = ComponentKind::MotorPair;

        assert!(is_config(register(&registry, &model, pair, Some("A"), Some("B"))));
        register(&registry, &model, ComponentKind::Motor, Some("A"), None).unwrap();
        assert!(is_config(register(&registry, &model, pair, Some("A"), Some("B"))));
        register(&registry, &model, ComponentKind::Motor, Some("B"), None).unwrap();
        register(&registry, &model, ComponentKind::Motor, Some("F"), None).unwrap();

        assert!(is_config(register(&registry, &model, pair, Some("A"), None)));
        assert!(is_config(register(&registry, &model, pair, Some("A"), Some("A"))));
        assert!(is_config(register(&registry, &model, pair, Some("A"), Some("F"))));

        let reference = register(&registry, &model, pair, Some("A"), Some("B")).unwrap();
        assert_eq!(
            reference.binding,
            Binding::Pair {
                left: Port::A,
                right: Port::B
            }
        );
        assert!(is_config(register(&registry, &model, pair, Some("B"), Some("A"))));
    }

    #[test]
    fn test_hub_integrated_rejections() {
        let model = test_robot();
        let registry = ComponentRegistry::new();

        assert!(is_config(register(&registry, &model, ComponentKind::Button, None, None)));
        assert!(is_config(register(
            &registry,
            &model,
            ComponentKind::Button,
            Some("up"),
            None
        )));
        register(&registry, &model, ComponentKind::Button, Some("left"), None).unwrap();
        assert!(is_config(register(
            &registry,
            &model,
            ComponentKind::Button,
            Some("left"),
            None
        )));
        register(&registry, &model, ComponentKind::Button, Some("right"), None).unwrap();

        for kind in [
            ComponentKind::LightMatrix,
            ComponentKind::MotionSensor,
            ComponentKind::Speaker,
            ComponentKind::StatusLight,
        ] {
            assert!(is_config(register(&registry, &model, kind, Some("A"), None)));
            register(&registry, &model, kind, None, None).unwrap();
            assert!(is_config(register(&registry, &model, kind, None, None)));
        }

        assert!(is_config(register(&registry, &model, ComponentKind::Timer, Some("A"), None)));
        register(&registry, &model, ComponentKind::Timer, None, None).unwrap();
        register(&registry, &model, ComponentKind::Timer, None, None).unwrap();
    }

    #[test]
    fn test_reset_invalidates_references() {
        let model = test_robot();
        let registry = ComponentRegistry::new();
        let reference = register(&registry, &model, ComponentKind::Motor, Some("A"), None).unwrap();
        assert!(registry.contains(&reference).unwrap());

        registry.reset().unwrap();
        assert!(!registry.contains(&reference).unwrap());
        assert!(registry.registered().unwrap().is_empty());

        let again = register(&registry, &model, ComponentKind::Motor, Some("A"), None).unwrap();
        assert_ne!(again.serial, reference.serial);
    }

    #[test]
    fn test_measure_from_data() {
        let model = test_robot();
        let registry = ComponentRegistry::new();
        let motor = SimComponent::new(ComponentKind::Motor);
        let button = SimComponent::new(ComponentKind::Button);
        let matrix = SimComponent::new(ComponentKind::LightMatrix);
        registry.register(&model, motor.clone(), Some("A"), None).unwrap();
        registry.register(&model, button.clone(), Some("left"), None).unwrap();
        registry.register(&model, matrix.clone(), None, None).unwrap();

        let mut columns: HashMap<String, Vec<Value>> = HashMap::new();
        columns.insert("time".to_string(), vec![0.0.into(), 1.0.into()]);
        columns.insert("A_degrees".to_string(), vec![0.into(), 90.into()]);
        columns.insert("left_is_pressed".to_string(), vec![false.into(), true.into()]);
        let data = RecordedData::from_columns(columns).unwrap();

        let hub = Hub::new().status().unwrap();
        registry.measure_from_data(&data, 0.5, &hub).unwrap();

        assert_eq!(
            motor.last().unwrap(),
            Some(Measurement::Motor {
                degrees: Some(45.0)
            })
        );
        assert_eq!(
            button.last().unwrap(),
            Some(Measurement::Button {
                pressed: Some(false)
            })
        );
        assert_eq!(
            matrix.last().unwrap(),
            Some(Measurement::LightMatrix { pixels: [0; PIXELS] })
        );

        // Missing channel is a configuration fault
        let force = SimComponent::new(ComponentKind::ForceSensor);
        registry.register(&model, force, Some("E"), None).unwrap();
        assert!(is_config(registry.measure_from_data(&data, 0.5, &hub)));
    }
}
