//! Core types shared by the engine, the registry and the command layer.

pub mod geometry;
pub mod types;

pub use geometry::{fold_degrees, Pose, Twist};
pub use types::{Args, Direction, Port, Rotation, Side, StopAction, Value};
