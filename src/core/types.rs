//! Core data types for ports, command arguments and motor conventions.
//!
//! Key types:
//! - [`Port`]: The six hub connectors `A`..`F`
//! - [`Value`]: Typed command argument and recorded channel values
//! - [`Rotation`]: Direction a single motor command is issued in

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Hub connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Port {
    /// All ports in hub order
    pub const ALL: [Port; 6] = [Port::A, Port::B, Port::C, Port::D, Port::E, Port::F];

    /// Port letter
    pub fn as_str(&self) -> &'static str {
        match self {
            Port::A => "A",
            Port::B => "B",
            Port::C => "C",
            Port::D => "D",
            Port::E => "E",
            Port::F => "F",
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Port {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" => Ok(Port::A),
            "B" => Ok(Port::B),
            "C" => Ok(Port::C),
            "D" => Ok(Port::D),
            "E" => Ok(Port::E),
            "F" => Ok(Port::F),
            other => Err(Error::InvalidParameter(format!("unknown port '{}'", other))),
        }
    }
}

/// Hub button side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            other => Err(Error::Config(format!(
                "button side '{}' is neither left nor right",
                other
            ))),
        }
    }
}

/// Direction in which a single motor command is issued
///
/// A clockwise command keeps the sign of the commanded value, a
/// counterclockwise command negates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise,
    Counterclockwise,
}

impl Rotation {
    #[inline]
    pub fn sign(&self) -> f64 {
        match self {
            Rotation::Clockwise => 1.0,
            Rotation::Counterclockwise => -1.0,
        }
    }
}

/// Traversal requested by `run_to_position`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Clockwise,
    Counterclockwise,
    ShortestPath,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clockwise" => Ok(Direction::Clockwise),
            "counterclockwise" => Ok(Direction::Counterclockwise),
            "shortest path" => Ok(Direction::ShortestPath),
            other => Err(Error::InvalidParameter(format!(
                "direction '{}' is none of the allowed values",
                other
            ))),
        }
    }
}

/// What a motor does once stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopAction {
    Coast,
    #[default]
    Brake,
    Hold,
}

impl FromStr for StopAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "coast" => Ok(StopAction::Coast),
            "brake" => Ok(StopAction::Brake),
            "hold" => Ok(StopAction::Hold),
            other => Err(Error::InvalidParameter(format!(
                "stop action '{}' is not in the list of allowed values",
                other
            ))),
        }
    }
}

/// Runtime argument and channel values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    None,
}

impl Value {
    /// Numeric view, integers widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Named command arguments
pub type Args = HashMap<String, Value>;
