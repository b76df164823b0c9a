//! spike-sim - Hardware-free simulation of a SPIKE-style robotics hub
//!
//! Control programs written against the hub's motor, sensor and display API
//! run against a [`Scenario`] instead of a real robot. A background loop
//! advances a world clock, integrates differential-drive kinematics and
//! feeds every registered component the measurements it would observe.
//!
//! ## Timing
//!
//! - `realtime`: the loop free-runs on the wall clock
//! - `controlled`: time only moves when the caller invokes [`Scenario::step`]
//!
//! ## Data
//!
//! - `compute`: measurements come from the kinematics engine and the ground mat
//! - `read`: measurements are replayed from a recorded channel table

pub mod clock;
pub mod commands;
pub mod config;
pub mod core;
pub mod data;
pub mod dynamics;
pub mod error;
pub mod ground;
pub mod hub;
pub mod model;
pub mod registry;
pub mod scenario;

// Re-export commonly used types
pub use clock::{ClockMode, WorldClock};
pub use commands::{Command, CommandHandle, CommandState};
pub use config::{RobotConfig, ScenarioConfig};
pub use crate::core::{Args, Port, Side, Value};
pub use dynamics::{Dynamics, DynamicsStatus};
pub use error::{Error, Result};
pub use model::RobotModel;
pub use registry::{Component, ComponentKind, ComponentRef, Measurement, SimComponent};
pub use scenario::Scenario;
