//! Kinematics engine
//!
//! Integrates the chassis pose from commanded wheel speeds and exposes the
//! motor and motor-pair command entry points.
//!
//! # Extrapolation
//!
//! Each scenario tick calls [`Dynamics::extrapolate`] with the current world
//! time. For the elapsed `dt`:
//!
//! ```text
//! v = (v_left + v_right) / 2          chassis linear speed (cm/s)
//! w = (v_right - v_left) / track      chassis angular speed (rad/s)
//! pose = pose.exp(v·dt, 0, 0, 0, 0, -w·dt)
//! ```
//!
//! Motor displacements advance by `speed·dt` first; a motor running towards
//! a rotation target stops on it mid-interval, and the wheel arcs feeding the
//! pose come from that same rotation. Every part pose is then re-derived from
//! the new chassis pose and colour sensors re-sample the ground.
//!
//! # Wheel speed
//!
//! `v_wheel = motor_speed × radius × clockwise_sign`, where the sign comes
//! from how the motor is mounted. Pair commands drive the left motor
//! counterclockwise and the right motor clockwise, so mirrored motors move
//! the robot forward for a positive speed.
//!
//! # Locking
//!
//! All dynamic state sits behind one mutex. Command entry points validate
//! against the immutable model and return a [`Drive`]; its first poll issues
//! the motor speeds under a single lock, later polls only read.

mod motion;
pub mod rules;

pub use motion::Drive;
pub use rules::EPSILON;

use crate::clock::WorldClock;
use crate::commands::CommandHandle;
use crate::config::Coordinates;
use crate::core::{Direction, Pose, Port, Rotation, Side, StopAction, Twist};
use crate::error::{poisoned, Error, Result};
use crate::ground::Ground;
use crate::model::{PartKind, PartRole, RobotModel};
use motion::{Plan, Setting};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Per-motor dynamic fields
#[derive(Debug, Clone, Default)]
struct MotorState {
    /// rad/s
    speed: f64,
    /// Accumulated rotation in radians, never wrapped
    displacement: f64,
    stop_action: StopAction,
    stall_detection: bool,
    /// Displacement (rad) a relative rotation stops at
    target: Option<f64>,
}

impl MotorState {
    fn new() -> Self {
        Self {
            stall_detection: true,
            ..Default::default()
        }
    }

    /// Rotate for `dt` seconds and return the angle turned (rad)
    ///
    /// A motor with a target stops exactly on it, partway through the
    /// interval if needed.
    fn advance(&mut self, dt: f64) -> f64 {
        let travel = self.speed * dt;
        if let Some(target) = self.target {
            let remaining = target - self.displacement;
            if travel * remaining >= 0.0 && travel.abs() >= remaining.abs() {
                self.displacement = target;
                self.speed = 0.0;
                self.target = None;
                return remaining;
            }
        }
        self.displacement += travel;
        travel
    }
}

#[derive(Debug, Clone, Default)]
struct ColorState {
    /// Last ground sample, 0-255 per channel
    rgb: [f64; 3],
    lights: [u8; 3],
}

struct DynamicsState {
    time: f64,
    origin: Pose,
    pose: Pose,
    /// Absolute pose per model part
    absolute: Vec<Pose>,
    motors: BTreeMap<Port, MotorState>,
    colors: BTreeMap<Port, ColorState>,
    ground: Option<Arc<dyn Ground>>,
}

/// Motor fields as reported by [`Dynamics::status`]
#[derive(Debug, Clone, Serialize)]
pub struct MotorStatus {
    /// Accumulated rotation in degrees
    pub degrees: f64,
    /// Degrees per second
    pub speed: f64,
    pub clockwise: f64,
    pub stop_action: StopAction,
    pub stall_detection: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WheelStatus {
    pub radius: f64,
    pub side: Side,
    pub spin: f64,
    /// Linear speed in cm/s
    pub speed: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColorStatus {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
    pub lights: [u8; 3],
}

/// One part in a status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PartStatus {
    pub kind: PartKind,
    pub id: String,
    pub port: Option<Port>,
    pub pose: Pose,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motor: Option<MotorStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wheel: Option<WheelStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorStatus>,
}

/// Consistent snapshot of the robot state
#[derive(Debug, Clone, Serialize)]
pub struct DynamicsStatus {
    pub time: f64,
    pub north: f64,
    pub east: f64,
    pub down: f64,
    /// Degrees in (-180, 180]
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub parts: Vec<PartStatus>,
}

impl DynamicsStatus {
    /// Motor fields for the motor on `port`
    pub fn motor(&self, port: Port) -> Option<&MotorStatus> {
        self.parts
            .iter()
            .find(|p| p.port == Some(port) && p.kind == PartKind::Motor)
            .and_then(|p| p.motor.as_ref())
    }

    /// Colour fields for the sensor on `port`
    pub fn color(&self, port: Port) -> Option<&ColorStatus> {
        self.parts
            .iter()
            .find(|p| p.port == Some(port) && p.kind == PartKind::ColorSensor)
            .and_then(|p| p.color.as_ref())
    }
}

/// Kinematics engine shared by the scenario loop and callers
pub struct Dynamics {
    model: RobotModel,
    clock: Arc<WorldClock>,
    state: Mutex<DynamicsState>,
}

impl Dynamics {
    /// Engine at the origin with every motor at rest
    pub fn new(model: RobotModel, clock: Arc<WorldClock>) -> Self {
        let origin = Pose::new(0.0, 0.0, model.altitude(), 0.0, 0.0, 0.0);
        let motors = model
            .parts()
            .iter()
            .filter(|p| p.kind() == PartKind::Motor)
            .filter_map(|p| p.port.map(|port| (port, MotorState::new())))
            .collect();
        let colors = model
            .parts()
            .iter()
            .filter(|p| p.kind() == PartKind::ColorSensor)
            .filter_map(|p| p.port.map(|port| (port, ColorState::default())))
            .collect();
        let mut state = DynamicsState {
            time: 0.0,
            origin,
            pose: origin,
            absolute: vec![Pose::identity(); model.parts().len()],
            motors,
            colors,
            ground: None,
        };
        derive_parts(&model, &mut state);

        Self {
            model,
            clock,
            state: Mutex::new(state),
        }
    }

    pub fn model(&self) -> &RobotModel {
        &self.model
    }

    fn lock(&self) -> Result<MutexGuard<'_, DynamicsState>> {
        self.state.lock().map_err(poisoned("dynamics"))
    }

    /// Place the robot and attach the ground mat, then reset
    pub fn configure(&self, coordinates: Coordinates, ground: Option<Arc<dyn Ground>>) -> Result<()> {
        {
            let mut state = self.lock()?;
            state.origin = Pose::new(
                coordinates.north,
                coordinates.east,
                self.model.altitude(),
                0.0,
                0.0,
                coordinates.yaw.to_radians(),
            );
            state.ground = ground;
        }
        log::info!(
            "Dynamics configured at north {} east {} yaw {}",
            coordinates.north,
            coordinates.east,
            coordinates.yaw
        );
        self.reset()
    }

    /// Back to the configured origin at time zero with motors at rest
    pub fn reset(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.time = 0.0;
        state.pose = state.origin;
        for motor in state.motors.values_mut() {
            *motor = MotorState::new();
        }
        for color in state.colors.values_mut() {
            *color = ColorState::default();
        }
        derive_parts(&self.model, &mut state);
        sample_colors(&self.model, &mut state);
        log::debug!("Dynamics reset");
        Ok(())
    }

    /// Advance the world to `time` (seconds)
    pub fn extrapolate(&self, time: f64) -> Result<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let dt = time - state.time;

        let turned: BTreeMap<Port, f64> = state
            .motors
            .iter_mut()
            .map(|(port, motor)| (*port, motor.advance(dt)))
            .collect();

        // Wheel arcs over dt, from the same rotation the motors made
        let [left, right] = self.model.wheels();
        let (left, right) = (
            self.wheel_travel(left, &turned),
            self.wheel_travel(right, &turned),
        );
        let linear = (left + right) / 2.0;
        let angular = (right - left) / self.model.track_width();
        state.pose = state
            .pose
            .exp(&Twist::new(linear, 0.0, 0.0, 0.0, 0.0, -angular));

        derive_parts(&self.model, state);
        sample_colors(&self.model, state);
        state.time = time;
        Ok(())
    }

    /// Linear speed (cm/s) of a wheel
    fn wheel_speed(&self, state: &DynamicsState, wheel: usize) -> f64 {
        self.wheel_arc(wheel, |port| state.motors.get(&port).map_or(0.0, |m| m.speed))
    }

    /// Distance (cm) rolled by a wheel given each motor's rotation
    fn wheel_travel(&self, wheel: usize, turned: &BTreeMap<Port, f64>) -> f64 {
        self.wheel_arc(wheel, |port| turned.get(&port).copied().unwrap_or(0.0))
    }

    fn wheel_arc(&self, wheel: usize, angle: impl Fn(Port) -> f64) -> f64 {
        let Some(spec) = self.model.part(wheel).wheel() else {
            return 0.0;
        };
        let motor = self.model.part(spec.motor);
        let clockwise = motor.motor().map_or(1.0, |m| m.clockwise);
        let angle = motor.port.map_or(0.0, angle);
        angle * spec.radius * clockwise
    }

    /// Set a motor's commanded speed from a command percentage
    fn apply(&self, state: &mut DynamicsState, port: Port, command: f64, rotation: Rotation) -> Result<()> {
        let speed = self.model.abaqus().motor_speed(command)? * rotation.sign();
        let motor = state
            .motors
            .get_mut(&port)
            .ok_or_else(|| Error::Runtime(format!("Port {} does not host a motor", port)))?;
        motor.speed = speed;
        motor.target = None;
        log::debug!("Motor {} command {} -> {:.3} rad/s", port, command, speed);
        Ok(())
    }

    /// Current chassis pose
    pub fn pose(&self) -> Result<Pose> {
        Ok(self.lock()?.pose)
    }

    /// Time of the last extrapolation
    pub fn time(&self) -> Result<f64> {
        Ok(self.lock()?.time)
    }

    /// Accumulated rotation of the motor on `port`, in degrees
    pub fn motor_degrees(&self, port: Port) -> Result<f64> {
        let state = self.lock()?;
        motor_state(&state, port).map(|m| m.displacement.to_degrees())
    }

    /// Commanded speed of the motor on `port`, in rad/s
    pub fn motor_speed(&self, port: Port) -> Result<f64> {
        let state = self.lock()?;
        motor_state(&state, port).map(|m| m.speed)
    }

    /// Snapshot of pose and every part
    pub fn status(&self) -> Result<DynamicsStatus> {
        let state = self.lock()?;
        let (roll, pitch, yaw) = state.pose.euler_degrees();

        let parts = self
            .model
            .parts()
            .iter()
            .enumerate()
            .map(|(i, part)| {
                let motor = match (&part.role, part.port) {
                    (PartRole::Motor(spec), Some(port)) => {
                        state.motors.get(&port).map(|m| MotorStatus {
                            degrees: m.displacement.to_degrees(),
                            speed: m.speed.to_degrees(),
                            clockwise: spec.clockwise,
                            stop_action: m.stop_action,
                            stall_detection: m.stall_detection,
                        })
                    }
                    _ => None,
                };
                let wheel = part.wheel().map(|spec| WheelStatus {
                    radius: spec.radius,
                    side: spec.side,
                    spin: spec.spin,
                    speed: self.wheel_speed(&state, i),
                });
                let color = match (&part.role, part.port) {
                    (PartRole::ColorSensor, Some(port)) => {
                        state.colors.get(&port).map(|c| ColorStatus {
                            red: c.rgb[0],
                            green: c.rgb[1],
                            blue: c.rgb[2],
                            lights: c.lights,
                        })
                    }
                    _ => None,
                };
                PartStatus {
                    kind: part.kind(),
                    id: part.id.clone(),
                    port: part.port,
                    pose: state.absolute[i],
                    motor,
                    wheel,
                    color,
                }
            })
            .collect();

        Ok(DynamicsStatus {
            time: state.time,
            north: state.pose.north(),
            east: state.pose.east(),
            down: state.pose.down(),
            yaw,
            pitch,
            roll,
            parts,
        })
    }

    fn check_motor(&self, port: Port) -> Result<()> {
        if self.model.motor(port).is_none() {
            return Err(Error::Runtime(format!("Port {} does not host a motor", port)));
        }
        Ok(())
    }

    fn check_pair(&self, left: Port, right: Port) -> Result<()> {
        self.check_motor(left)?;
        self.check_motor(right)?;
        if !self.model.pairable(left, right) {
            return Err(Error::Runtime(format!(
                "The motors on ports {} and {} could not be paired",
                left, right
            )));
        }
        Ok(())
    }

    fn drive(self: &Arc<Self>, plan: Plan) -> CommandHandle {
        Box::new(Drive::new(Arc::clone(self), plan))
    }

    // ------------------------------------------------------------------
    // Single motor
    // ------------------------------------------------------------------

    /// Run at `speed` until superseded
    pub fn start_motor(self: &Arc<Self>, port: Port, speed: f64) -> Result<CommandHandle> {
        self.check_motor(port)?;
        Ok(self.drive(Plan::Start(vec![(port, speed, Rotation::Clockwise)])))
    }

    /// Run at `power` until superseded
    pub fn start_motor_at_power(self: &Arc<Self>, port: Port, power: f64) -> Result<CommandHandle> {
        self.start_motor(port, power)
    }

    pub fn stop_motor(self: &Arc<Self>, port: Port) -> Result<CommandHandle> {
        self.start_motor(port, 0.0)
    }

    /// Rotate by `degrees`; the direction is the sign of `speed * degrees`
    pub fn run_motor_for_degrees(
        self: &Arc<Self>,
        port: Port,
        speed: f64,
        degrees: f64,
    ) -> Result<CommandHandle> {
        self.check_motor(port)?;
        Ok(self.drive(Plan::ForDegrees {
            port,
            speed,
            degrees,
        }))
    }

    /// Rotate to an absolute position in [0, 360)
    pub fn run_motor_to_position(
        self: &Arc<Self>,
        port: Port,
        speed: f64,
        degrees: f64,
        direction: Direction,
    ) -> Result<CommandHandle> {
        self.check_motor(port)?;
        Ok(self.drive(Plan::ToPosition {
            port,
            speed,
            degrees,
            direction,
        }))
    }

    /// Rotate until the degree counter reads `degrees`
    pub fn run_motor_to_degrees_counted(
        self: &Arc<Self>,
        port: Port,
        speed: f64,
        degrees: f64,
    ) -> Result<CommandHandle> {
        self.check_motor(port)?;
        Ok(self.drive(Plan::ToCounted {
            port,
            speed,
            degrees,
        }))
    }

    pub fn run_motor_for_rotations(
        self: &Arc<Self>,
        port: Port,
        speed: f64,
        rotations: f64,
    ) -> Result<CommandHandle> {
        self.run_motor_for_degrees(port, speed, rotations * 360.0)
    }

    /// Run for a span of world-clock time, then stop
    pub fn run_motor_for_seconds(
        self: &Arc<Self>,
        port: Port,
        speed: f64,
        seconds: f64,
    ) -> Result<CommandHandle> {
        self.check_motor(port)?;
        Ok(self.drive(Plan::ForSeconds {
            port,
            speed,
            seconds,
        }))
    }

    /// Overwrite the degree counter
    pub fn set_degrees_counted(self: &Arc<Self>, port: Port, degrees: f64) -> Result<CommandHandle> {
        self.check_motor(port)?;
        Ok(self.drive(Plan::Set(
            vec![port],
            Setting::DegreesCounted(degrees.to_radians()),
        )))
    }

    pub fn set_stop_action(self: &Arc<Self>, port: Port, action: StopAction) -> Result<CommandHandle> {
        self.check_motor(port)?;
        Ok(self.drive(Plan::Set(vec![port], Setting::StopAction(action))))
    }

    pub fn set_stall_detection(self: &Arc<Self>, port: Port, enabled: bool) -> Result<CommandHandle> {
        self.check_motor(port)?;
        Ok(self.drive(Plan::Set(vec![port], Setting::StallDetection(enabled))))
    }

    // ------------------------------------------------------------------
    // Motor pair
    // ------------------------------------------------------------------

    /// Drive with a steering split until superseded
    pub fn start_pair(
        self: &Arc<Self>,
        left: Port,
        right: Port,
        steering: f64,
        speed: f64,
    ) -> Result<CommandHandle> {
        let (l, r) = rules::steering_speeds(steering, speed);
        self.start_pair_tank(left, right, l, r)
    }

    pub fn start_pair_at_power(
        self: &Arc<Self>,
        left: Port,
        right: Port,
        steering: f64,
        power: f64,
    ) -> Result<CommandHandle> {
        self.start_pair(left, right, steering, power)
    }

    /// Drive each side at its own speed until superseded
    pub fn start_pair_tank(
        self: &Arc<Self>,
        left: Port,
        right: Port,
        left_speed: f64,
        right_speed: f64,
    ) -> Result<CommandHandle> {
        self.check_pair(left, right)?;
        Ok(self.drive(Plan::Start(vec![
            (left, left_speed, Rotation::Counterclockwise),
            (right, right_speed, Rotation::Clockwise),
        ])))
    }

    pub fn start_pair_tank_at_power(
        self: &Arc<Self>,
        left: Port,
        right: Port,
        left_power: f64,
        right_power: f64,
    ) -> Result<CommandHandle> {
        self.start_pair_tank(left, right, left_power, right_power)
    }

    pub fn stop_pair(self: &Arc<Self>, left: Port, right: Port) -> Result<CommandHandle> {
        self.start_pair_tank(left, right, 0.0, 0.0)
    }

    /// Drive `amount` centimetres with a steering split
    pub fn run_pair_move(
        self: &Arc<Self>,
        left: Port,
        right: Port,
        amount: f64,
        steering: f64,
        speed: f64,
    ) -> Result<CommandHandle> {
        let (l, r) = rules::steering_speeds(steering, speed);
        self.run_pair_move_tank(left, right, amount, l, r)
    }

    /// Drive `amount` centimetres with per-side speeds
    ///
    /// A negative amount reverses both speeds.
    pub fn run_pair_move_tank(
        self: &Arc<Self>,
        left: Port,
        right: Port,
        amount: f64,
        left_speed: f64,
        right_speed: f64,
    ) -> Result<CommandHandle> {
        self.check_pair(left, right)?;
        let flip = if amount < 0.0 { -1.0 } else { 1.0 };
        Ok(self.drive(Plan::Move {
            left,
            right,
            distance: amount.abs(),
            left_speed: left_speed * flip,
            right_speed: right_speed * flip,
        }))
    }

    pub fn set_pair_stop_action(
        self: &Arc<Self>,
        left: Port,
        right: Port,
        action: StopAction,
    ) -> Result<CommandHandle> {
        self.check_pair(left, right)?;
        Ok(self.drive(Plan::Set(vec![left, right], Setting::StopAction(action))))
    }

    // ------------------------------------------------------------------
    // Colour sensor
    // ------------------------------------------------------------------

    /// Set the three sensor lights (0-100 each)
    pub fn light_up(self: &Arc<Self>, port: Port, lights: [u8; 3]) -> Result<CommandHandle> {
        if self.model.find(port, PartKind::ColorSensor).is_none() {
            return Err(Error::Runtime(format!(
                "Port {} does not host a color sensor",
                port
            )));
        }
        Ok(self.drive(Plan::Set(vec![port], Setting::Lights(lights))))
    }
}

fn motor_state(state: &DynamicsState, port: Port) -> Result<&MotorState> {
    state
        .motors
        .get(&port)
        .ok_or_else(|| Error::Runtime(format!("Port {} does not host a motor", port)))
}

/// Re-derive every part's absolute pose from the chassis pose
fn derive_parts(model: &RobotModel, state: &mut DynamicsState) {
    for (absolute, part) in state.absolute.iter_mut().zip(model.parts()) {
        *absolute = state.pose.compose(&part.relative);
    }
}

/// Sample the ground along each colour sensor's viewing axis
fn sample_colors(model: &RobotModel, state: &mut DynamicsState) {
    let Some(ground) = state.ground.clone() else {
        return;
    };
    for (i, part) in model.parts().iter().enumerate() {
        if part.kind() != PartKind::ColorSensor {
            continue;
        }
        let Some(color) = part.port.and_then(|port| state.colors.get_mut(&port)) else {
            continue;
        };
        let pose = state.absolute[i];
        let axis = pose.heading();
        if axis.z > 0.0 {
            let t = -pose.down() / axis.z;
            color.rgb = ground.color(pose.north() + t * axis.x, pose.east() + t * axis.y);
        } else {
            color.rgb = [0.0; 3];
        }
    }
}
