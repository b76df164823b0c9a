//! Typed command requests parsed from `(name, args)`
//!
//! Parsing happens before anything is issued: an unknown name is an
//! [`Error::UnknownCommand`], a missing or mistyped argument an
//! [`Error::InvalidParameter`].

use crate::core::{Args, Direction, StopAction, Value};
use crate::error::{Error, Result};
use crate::hub;
use crate::registry::ComponentKind;

/// Command percentages are clamped to this range
const PERCENT: f64 = 100.0;

/// Playable MIDI notes
const NOTES: std::ops::RangeInclusive<i64> = 44..=123;

#[derive(Debug, Clone, PartialEq)]
pub enum MotorRequest {
    RunToPosition {
        speed: f64,
        degrees: f64,
        direction: Direction,
    },
    RunToDegreesCounted {
        speed: f64,
        degrees: f64,
    },
    RunForDegrees {
        speed: f64,
        degrees: f64,
    },
    RunForRotations {
        speed: f64,
        rotations: f64,
    },
    RunForSeconds {
        speed: f64,
        seconds: f64,
    },
    Start {
        speed: f64,
    },
    StartAtPower {
        power: f64,
    },
    Stop,
    SetDegreesCounted {
        degrees: f64,
    },
    SetStallDetection {
        enabled: bool,
    },
    SetStopAction {
        action: StopAction,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PairRequest {
    Start {
        steering: f64,
        speed: f64,
    },
    Move {
        amount: f64,
        steering: f64,
        speed: f64,
    },
    Stop,
    StartAtPower {
        steering: f64,
        power: f64,
    },
    StartTank {
        left_speed: f64,
        right_speed: f64,
    },
    MoveTank {
        amount: f64,
        left_speed: f64,
        right_speed: f64,
    },
    StartTankAtPower {
        left_power: f64,
        right_power: f64,
    },
    SetStopAction {
        action: StopAction,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColorSensorRequest {
    LightUp { lights: [u8; 3] },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LightMatrixRequest {
    ShowImage { image: String, brightness: u8 },
    SetPixel { x: usize, y: usize, brightness: u8 },
    Write { text: String },
    Off,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeakerRequest {
    Beep { note: u8, seconds: f64 },
    StartBeep { note: u8 },
    Stop,
    SetVolume { volume: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusLightRequest {
    On { color: String },
    Off,
}

/// A validated command for one component kind
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Motor(MotorRequest),
    Pair(PairRequest),
    ColorSensor(ColorSensorRequest),
    LightMatrix(LightMatrixRequest),
    Speaker(SpeakerRequest),
    StatusLight(StatusLightRequest),
}

impl Request {
    /// Validate `name` and `args` against what `kind` understands
    pub fn parse(kind: ComponentKind, name: &str, args: &Args) -> Result<Self> {
        let unknown = || Error::UnknownCommand {
            component: kind.as_str(),
            name: name.to_string(),
        };
        let request = match kind {
            ComponentKind::Motor => parse_motor(name, args)?.map(Request::Motor),
            ComponentKind::MotorPair => parse_pair(name, args)?.map(Request::Pair),
            ComponentKind::ColorSensor => parse_color_sensor(name, args)?.map(Request::ColorSensor),
            ComponentKind::LightMatrix => parse_light_matrix(name, args)?.map(Request::LightMatrix),
            ComponentKind::Speaker => parse_speaker(name, args)?.map(Request::Speaker),
            ComponentKind::StatusLight => parse_status_light(name, args)?.map(Request::StatusLight),
            ComponentKind::DistanceSensor
            | ComponentKind::ForceSensor
            | ComponentKind::Button
            | ComponentKind::MotionSensor
            | ComponentKind::Timer => None,
        };
        request.ok_or_else(unknown)
    }
}

// Each parser returns Ok(None) for a name it does not know

fn parse_motor(name: &str, args: &Args) -> Result<Option<MotorRequest>> {
    let request = match name {
        "run_to_position" => {
            let degrees = number(args, "degrees")?;
            if !(0.0..360.0).contains(&degrees) {
                return Err(Error::InvalidParameter(format!(
                    "degrees {} is not in [0, 359]",
                    degrees
                )));
            }
            let direction = match optional(args, "direction") {
                Some(_) => text(args, "direction")?.parse()?,
                None => Direction::ShortestPath,
            };
            MotorRequest::RunToPosition {
                speed: percent(args, "speed")?,
                degrees,
                direction,
            }
        }
        "run_to_degrees_counted" => MotorRequest::RunToDegreesCounted {
            speed: percent(args, "speed")?,
            degrees: number(args, "degrees")?,
        },
        "run_for_degrees" => MotorRequest::RunForDegrees {
            speed: percent(args, "speed")?,
            degrees: number(args, "degrees")?,
        },
        "run_for_rotations" => MotorRequest::RunForRotations {
            speed: percent(args, "speed")?,
            rotations: number(args, "rotations")?,
        },
        "run_for_seconds" => MotorRequest::RunForSeconds {
            speed: percent(args, "speed")?,
            seconds: number(args, "seconds")?,
        },
        "start" => MotorRequest::Start {
            speed: percent(args, "speed")?,
        },
        "start_at_power" => MotorRequest::StartAtPower {
            power: percent(args, "power")?,
        },
        "stop" => MotorRequest::Stop,
        "set_degrees_counted" => MotorRequest::SetDegreesCounted {
            degrees: number(args, "degrees")?,
        },
        "set_stall_detection" => MotorRequest::SetStallDetection {
            enabled: flag(args, "stop_when_stalled")?,
        },
        "set_stop_action" => MotorRequest::SetStopAction {
            action: text(args, "action")?.parse()?,
        },
        _ => return Ok(None),
    };
    Ok(Some(request))
}

fn parse_pair(name: &str, args: &Args) -> Result<Option<PairRequest>> {
    let request = match name {
        "start" => PairRequest::Start {
            steering: percent(args, "steering")?,
            speed: percent(args, "speed")?,
        },
        "move" => PairRequest::Move {
            amount: number(args, "amount")?,
            steering: percent(args, "steering")?,
            speed: percent(args, "speed")?,
        },
        "stop" => PairRequest::Stop,
        "start_at_power" => PairRequest::StartAtPower {
            steering: percent(args, "steering")?,
            power: percent(args, "power")?,
        },
        "start_tank" => PairRequest::StartTank {
            left_speed: percent(args, "left_speed")?,
            right_speed: percent(args, "right_speed")?,
        },
        "move_tank" => PairRequest::MoveTank {
            amount: number(args, "amount")?,
            left_speed: percent(args, "left_speed")?,
            right_speed: percent(args, "right_speed")?,
        },
        "start_tank_at_power" => PairRequest::StartTankAtPower {
            left_power: percent(args, "left_power")?,
            right_power: percent(args, "right_power")?,
        },
        "set_stop_action" => PairRequest::SetStopAction {
            action: text(args, "action")?.parse()?,
        },
        _ => return Ok(None),
    };
    Ok(Some(request))
}

fn parse_color_sensor(name: &str, args: &Args) -> Result<Option<ColorSensorRequest>> {
    let request = match name {
        "light_up" => ColorSensorRequest::LightUp {
            lights: [
                level(args, "light1")?,
                level(args, "light2")?,
                level(args, "light3")?,
            ],
        },
        _ => return Ok(None),
    };
    Ok(Some(request))
}

fn parse_light_matrix(name: &str, args: &Args) -> Result<Option<LightMatrixRequest>> {
    let request = match name {
        "show_image" => {
            let image = text(args, "image")?;
            if hub::image(image).is_none() {
                return Err(Error::InvalidParameter(format!(
                    "image '{}' is not in the list of allowed values",
                    image
                )));
            }
            let brightness = match optional(args, "brightness") {
                Some(_) => level(args, "brightness")?,
                None => 100,
            };
            LightMatrixRequest::ShowImage {
                image: image.to_string(),
                brightness,
            }
        }
        "set_pixel" => LightMatrixRequest::SetPixel {
            x: coordinate(args, "x")?,
            y: coordinate(args, "y")?,
            brightness: level(args, "brightness")?,
        },
        "write" => LightMatrixRequest::Write {
            text: text(args, "text")?.to_string(),
        },
        "off" => LightMatrixRequest::Off,
        _ => return Ok(None),
    };
    Ok(Some(request))
}

fn parse_speaker(name: &str, args: &Args) -> Result<Option<SpeakerRequest>> {
    let request = match name {
        "beep" => SpeakerRequest::Beep {
            note: note(args)?,
            seconds: number(args, "seconds")?,
        },
        "start_beep" => SpeakerRequest::StartBeep { note: note(args)? },
        "stop" => SpeakerRequest::Stop,
        "set_volume" => SpeakerRequest::SetVolume {
            volume: number(args, "volume")?.clamp(0.0, PERCENT).round() as u8,
        },
        _ => return Ok(None),
    };
    Ok(Some(request))
}

fn parse_status_light(name: &str, args: &Args) -> Result<Option<StatusLightRequest>> {
    let request = match name {
        "on" => StatusLightRequest::On {
            color: status_color(args)?,
        },
        "off" => StatusLightRequest::Off,
        _ => return Ok(None),
    };
    Ok(Some(request))
}

// ----------------------------------------------------------------------
// Argument accessors
// ----------------------------------------------------------------------

fn optional<'a>(args: &'a Args, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|v| !matches!(v, Value::None))
}

fn required<'a>(args: &'a Args, key: &str) -> Result<&'a Value> {
    optional(args, key)
        .ok_or_else(|| Error::InvalidParameter(format!("missing argument '{}'", key)))
}

fn number(args: &Args, key: &str) -> Result<f64> {
    required(args, key)?
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::InvalidParameter(format!("argument '{}' must be a number", key)))
}

fn integer(args: &Args, key: &str) -> Result<i64> {
    match required(args, key)? {
        Value::Int(v) => Ok(*v),
        Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Ok(*v as i64),
        _ => Err(Error::InvalidParameter(format!(
            "argument '{}' must be an integer",
            key
        ))),
    }
}

fn text<'a>(args: &'a Args, key: &str) -> Result<&'a str> {
    match required(args, key)? {
        Value::String(s) => Ok(s),
        _ => Err(Error::InvalidParameter(format!(
            "argument '{}' must be a string",
            key
        ))),
    }
}

fn flag(args: &Args, key: &str) -> Result<bool> {
    match required(args, key)? {
        Value::Bool(b) => Ok(*b),
        _ => Err(Error::InvalidParameter(format!(
            "argument '{}' must be a boolean",
            key
        ))),
    }
}

/// Speed, power or steering, clamped to [-100, 100]
fn percent(args: &Args, key: &str) -> Result<f64> {
    Ok(number(args, key)?.clamp(-PERCENT, PERCENT))
}

/// Brightness or light level in [0, 100]
fn level(args: &Args, key: &str) -> Result<u8> {
    let value = integer(args, key)?;
    u8::try_from(value)
        .ok()
        .filter(|v| f64::from(*v) <= PERCENT)
        .ok_or_else(|| Error::InvalidParameter(format!("{} {} is not in [0, 100]", key, value)))
}

/// Light matrix coordinate in [0, 4]
fn coordinate(args: &Args, key: &str) -> Result<usize> {
    let value = integer(args, key)?;
    usize::try_from(value)
        .ok()
        .filter(|v| *v < 5)
        .ok_or_else(|| Error::InvalidParameter(format!("{} {} is not in [0, 4]", key, value)))
}

fn note(args: &Args) -> Result<u8> {
    let value = integer(args, "note")?;
    if !NOTES.contains(&value) {
        return Err(Error::InvalidParameter(format!(
            "note {} is not in [{}, {}]",
            value,
            NOTES.start(),
            NOTES.end()
        )));
    }
    Ok(value as u8)
}

fn status_color(args: &Args) -> Result<String> {
    let color = text(args, "color")?;
    if !hub::STATUS_COLORS.contains(&color) {
        return Err(Error::InvalidParameter(format!(
            "color '{}' is not in the list of allowed values",
            color
        )));
    }
    Ok(color.to_string())
}
