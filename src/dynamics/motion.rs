//! Poll-able motor commands and their completion conditions.

use super::rules::{position_delta, signed_rotation, EPSILON};
use super::{Dynamics, DynamicsState};
use crate::commands::{Command, CommandState};
use crate::core::{Direction, Port, Rotation, StopAction};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Motor setting applied without motion
#[derive(Debug, Clone, Copy)]
pub(crate) enum Setting {
    /// Radians
    DegreesCounted(f64),
    StopAction(StopAction),
    StallDetection(bool),
    Lights([u8; 3]),
}

/// What a command will do once issued
#[derive(Debug, Clone)]
pub(crate) enum Plan {
    /// Set speeds (command %, direction) and return
    Start(Vec<(Port, f64, Rotation)>),
    Set(Vec<Port>, Setting),
    ForDegrees {
        port: Port,
        speed: f64,
        degrees: f64,
    },
    ToPosition {
        port: Port,
        speed: f64,
        degrees: f64,
        direction: Direction,
    },
    ToCounted {
        port: Port,
        speed: f64,
        degrees: f64,
    },
    ForSeconds {
        port: Port,
        speed: f64,
        seconds: f64,
    },
    Move {
        left: Port,
        right: Port,
        /// Centimetres, unsigned
        distance: f64,
        left_speed: f64,
        right_speed: f64,
    },
}

/// Completion condition evaluated on each poll
#[derive(Debug, Clone)]
enum Goal {
    Reached,
    /// Displacement of `port` crosses `target` (rad) in direction `sign`
    Rotation { port: Port, target: f64, sign: f64 },
    /// World clock reaches `until`
    Elapsed { port: Port, until: f64 },
    /// Mean wheel travel reaches `distance`
    Travel {
        ports: [Port; 2],
        /// (port, displacement at start, wheel radius)
        wheels: Vec<(Port, f64, f64)>,
        wheel_count: f64,
        distance: f64,
    },
}

enum Stage {
    Idle(Plan),
    Running(Goal),
    Done,
}

/// Motor or pair command bound to the engine
pub struct Drive {
    dynamics: Arc<Dynamics>,
    stage: Stage,
}

impl Drive {
    pub(crate) fn new(dynamics: Arc<Dynamics>, plan: Plan) -> Self {
        Self {
            dynamics,
            stage: Stage::Idle(plan),
        }
    }

    fn advance(&mut self, goal: Goal) -> Result<bool> {
        if self.dynamics.reached(&goal)? {
            self.dynamics.conclude(&goal)?;
            self.stage = Stage::Done;
            Ok(false)
        } else {
            self.stage = Stage::Running(goal);
            Ok(true)
        }
    }
}

impl Command for Drive {
    fn poll(&mut self) -> Result<bool> {
        match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Idle(plan) => {
                log::debug!("Issuing {:?}", plan);
                let goal = self.dynamics.issue(plan)?;
                self.advance(goal)
            }
            Stage::Running(goal) => self.advance(goal),
            Stage::Done => Ok(false),
        }
    }

    fn state(&self) -> CommandState {
        match self.stage {
            Stage::Idle(_) => CommandState::Idle,
            Stage::Running(_) => CommandState::Running,
            Stage::Done => CommandState::Done,
        }
    }
}

impl Dynamics {
    /// Apply a plan's speeds or settings under one lock and derive its goal
    fn issue(&self, plan: Plan) -> Result<Goal> {
        // Clock first: the clock lock is never taken while holding ours
        let now = self.clock.time()?;
        let mut guard = self.lock()?;
        let state = &mut *guard;

        match plan {
            Plan::Start(commands) => {
                for (port, command, rotation) in commands {
                    self.apply(state, port, command, rotation)?;
                }
                Ok(Goal::Reached)
            }
            Plan::Set(ports, setting) => {
                for port in ports {
                    self.set(state, port, setting)?;
                }
                Ok(Goal::Reached)
            }
            Plan::ForDegrees {
                port,
                speed,
                degrees,
            } => self.rotate(state, port, speed, degrees),
            Plan::ToPosition {
                port,
                speed,
                degrees,
                direction,
            } => {
                let current = super::motor_state(state, port)?.displacement.to_degrees();
                let (speed, delta) = position_delta(current, degrees, speed, direction);
                log::debug!(
                    "Motor {} to position {}: {} degrees at {}",
                    port,
                    degrees,
                    delta,
                    speed
                );
                self.rotate(state, port, speed, delta)
            }
            Plan::ToCounted {
                port,
                speed,
                degrees,
            } => {
                let current = super::motor_state(state, port)?.displacement.to_degrees();
                self.rotate(state, port, speed.abs(), degrees - current)
            }
            Plan::ForSeconds {
                port,
                speed,
                seconds,
            } => {
                self.apply(state, port, speed, Rotation::Clockwise)?;
                Ok(Goal::Elapsed {
                    port,
                    until: now + seconds,
                })
            }
            Plan::Move {
                left,
                right,
                distance,
                left_speed,
                right_speed,
            } => {
                self.apply(state, left, left_speed, Rotation::Counterclockwise)?;
                self.apply(state, right, right_speed, Rotation::Clockwise)?;

                let mut wheels = Vec::with_capacity(2);
                let mut moving = false;
                for port in [left, right] {
                    let Some(index) = self.model.motor(port) else {
                        continue;
                    };
                    let Some(wheel) = self.model.part(index).motor().and_then(|m| m.wheel) else {
                        continue;
                    };
                    let Some(spec) = self.model.part(wheel).wheel() else {
                        continue;
                    };
                    let motor = super::motor_state(state, port)?;
                    moving |= motor.speed != 0.0;
                    wheels.push((port, motor.displacement, spec.radius));
                }

                if distance <= EPSILON || !moving {
                    if distance > EPSILON {
                        log::warn!(
                            "Pair {}{} asked to move {} cm without wheel speed",
                            left,
                            right,
                            distance
                        );
                    }
                    return Ok(Goal::Travel {
                        ports: [left, right],
                        wheels: Vec::new(),
                        wheel_count: 1.0,
                        distance: 0.0,
                    });
                }
                Ok(Goal::Travel {
                    ports: [left, right],
                    wheels,
                    wheel_count: self.model.wheels().len() as f64,
                    distance,
                })
            }
        }
    }

    /// Start a relative rotation and return its target
    fn rotate(&self, state: &mut DynamicsState, port: Port, speed: f64, degrees: f64) -> Result<Goal> {
        let (command, delta) = signed_rotation(speed, degrees);
        self.apply(state, port, command, Rotation::Clockwise)?;
        let motor = state
            .motors
            .get_mut(&port)
            .ok_or_else(|| Error::Runtime(format!("Port {} does not host a motor", port)))?;
        let target = motor.displacement + delta;

        if motor.speed == 0.0 && delta.abs() > EPSILON {
            log::warn!(
                "Motor {} asked to rotate {:.1} degrees at zero speed",
                port,
                degrees
            );
            return Ok(Goal::Rotation {
                port,
                target: motor.displacement,
                sign: 1.0,
            });
        }
        motor.target = Some(target);
        let sign = if delta < 0.0 { -1.0 } else { 1.0 };
        Ok(Goal::Rotation { port, target, sign })
    }

    fn set(&self, state: &mut DynamicsState, port: Port, setting: Setting) -> Result<()> {
        if let Setting::Lights(lights) = setting {
            let color = state.colors.get_mut(&port).ok_or_else(|| {
                Error::Runtime(format!("Port {} does not host a color sensor", port))
            })?;
            color.lights = lights;
            return Ok(());
        }

        let motor = state
            .motors
            .get_mut(&port)
            .ok_or_else(|| Error::Runtime(format!("Port {} does not host a motor", port)))?;
        match setting {
            Setting::DegreesCounted(radians) => motor.displacement = radians,
            Setting::StopAction(action) => motor.stop_action = action,
            Setting::StallDetection(enabled) => motor.stall_detection = enabled,
            Setting::Lights(_) => {}
        }
        Ok(())
    }

    fn reached(&self, goal: &Goal) -> Result<bool> {
        match goal {
            Goal::Reached => Ok(true),
            Goal::Elapsed { until, .. } => Ok(self.clock.time()? >= until - EPSILON),
            Goal::Rotation { port, target, sign } => {
                let state = self.lock()?;
                let current = super::motor_state(&state, *port)?.displacement;
                Ok(sign * current >= sign * target - EPSILON)
            }
            Goal::Travel {
                wheels,
                wheel_count,
                distance,
                ..
            } => {
                let state = self.lock()?;
                let mut travelled = 0.0;
                for (port, start, radius) in wheels {
                    let current = super::motor_state(&state, *port)?.displacement;
                    travelled += (current - start).abs() * radius;
                }
                Ok(travelled / wheel_count >= distance - EPSILON)
            }
        }
    }

    /// Stop what the goal started
    fn conclude(&self, goal: &Goal) -> Result<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        match goal {
            Goal::Reached => {}
            Goal::Rotation { port, .. } | Goal::Elapsed { port, .. } => {
                self.apply(state, *port, 0.0, Rotation::Clockwise)?;
            }
            Goal::Travel { ports, .. } => {
                for port in ports {
                    self.apply(state, *port, 0.0, Rotation::Clockwise)?;
                }
            }
        }
        Ok(())
    }
}
