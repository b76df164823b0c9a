//! Hub-integrated outputs and inputs
//!
//! The hub carries a 5x5 light matrix, a status light, two buttons and a
//! speaker. None of them has a physical model; their state is whatever the
//! last command or button event left behind.

use crate::clock::WorldClock;
use crate::commands::{Action, CommandHandle, Immediate, Sequence, Timed};
use crate::core::Side;
use crate::error::{poisoned, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Number of light matrix pixels
pub const PIXELS: usize = 25;

/// Colours accepted by the status light
pub const STATUS_COLORS: [&str; 11] = [
    "azure", "black", "blue", "cyan", "green", "orange", "pink", "red", "violet", "yellow",
    "white",
];

const BLANK: [u8; PIXELS] = [0; PIXELS];

#[rustfmt::skip]
const HAPPY: [u8; PIXELS] = [
    1, 1, 0, 1, 1,
    1, 1, 0, 1, 1,
    0, 0, 0, 0, 0,
    1, 0, 0, 0, 1,
    0, 1, 1, 1, 0,
];

#[rustfmt::skip]
const HEART: [u8; PIXELS] = [
    0, 1, 0, 1, 0,
    1, 1, 1, 1, 1,
    1, 1, 1, 1, 1,
    0, 1, 1, 1, 0,
    0, 0, 1, 0, 0,
];

/// Image catalogue
///
/// Only HAPPY and HEART carry a pattern so far; the other names are accepted
/// and render blank.
const IMAGES: &[(&str, [u8; PIXELS])] = &[
    ("ANGRY", BLANK),
    ("ARROW_E", BLANK),
    ("ARROW_N", BLANK),
    ("ARROW_NE", BLANK),
    ("ARROW_NW", BLANK),
    ("ARROW_S", BLANK),
    ("ARROW_SE", BLANK),
    ("ARROW_SW", BLANK),
    ("ARROW_W", BLANK),
    ("ASLEEP", BLANK),
    ("BUTTERFLY", BLANK),
    ("CHESSBOARD", BLANK),
    ("CLOCK1", BLANK),
    ("CLOCK10", BLANK),
    ("CLOCK11", BLANK),
    ("CLOCK12", BLANK),
    ("CLOCK2", BLANK),
    ("CLOCK3", BLANK),
    ("CLOCK4", BLANK),
    ("CLOCK5", BLANK),
    ("CLOCK6", BLANK),
    ("CLOCK7", BLANK),
    ("CLOCK8", BLANK),
    ("CLOCK9", BLANK),
    ("CONFUSED", BLANK),
    ("COW", BLANK),
    ("DIAMOND", BLANK),
    ("DIAMOND_SMALL", BLANK),
    ("DUCK", BLANK),
    ("FABULOUS", BLANK),
    ("GHOST", BLANK),
    ("GIRAFFE", BLANK),
    ("GO_RIGHT", BLANK),
    ("GO_LEFT", BLANK),
    ("GO_UP", BLANK),
    ("GO_DOWN", BLANK),
    ("HAPPY", HAPPY),
    ("HEART", HEART),
    ("HEART_SMALL", BLANK),
    ("HOUSE", BLANK),
    ("MEH", BLANK),
    ("MUSIC_CROTCHET", BLANK),
    ("MUSIC_QUAVER", BLANK),
    ("MUSIC_QUAVERS", BLANK),
    ("NO", BLANK),
    ("PACMAN", BLANK),
    ("PITCHFORK", BLANK),
    ("RABBIT", BLANK),
    ("ROLLERSKATE", BLANK),
    ("SAD", BLANK),
    ("SILLY", BLANK),
    ("SKULL", BLANK),
    ("SMILE", BLANK),
    ("SNAKE", BLANK),
    ("SQUARE", BLANK),
    ("SQUARE_SMALL", BLANK),
    ("STICKFIGURE", BLANK),
    ("SURPRISED", BLANK),
    ("SWORD", BLANK),
    ("TARGET", BLANK),
    ("TORTOISE", BLANK),
    ("TRIANGLE", BLANK),
    ("TRIANGLE_LEFT", BLANK),
    ("TSHIRT", BLANK),
    ("UMBRELLA", BLANK),
    ("XMAS", BLANK),
    ("YES", BLANK),
];

/// Pattern of a named image (1 = lit)
pub fn image(name: &str) -> Option<[u8; PIXELS]> {
    IMAGES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, pixels)| *pixels)
}

/// Pattern shown for one character of a `write` command
///
/// Letter glyphs are blank for now, as is anything that is not a letter.
fn glyph(_letter: char) -> [u8; PIXELS] {
    BLANK
}

#[derive(Debug, Clone)]
struct HubState {
    matrix: [u8; PIXELS],
    status_on: bool,
    status_color: String,
    left_pressed: bool,
    right_pressed: bool,
    beeping: bool,
    note: u8,
    volume: u8,
}

impl Default for HubState {
    fn default() -> Self {
        Self {
            matrix: BLANK,
            status_on: false,
            status_color: "white".to_string(),
            left_pressed: false,
            right_pressed: false,
            beeping: false,
            note: 0,
            volume: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonStatus {
    pub side: Side,
    pub pressed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusLightStatus {
    pub color: String,
    pub on: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeakerStatus {
    pub volume: u8,
    pub note: u8,
    pub beeping: bool,
}

/// Snapshot of every hub-integrated output and input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubStatus {
    pub buttons: [ButtonStatus; 2],
    pub light_matrix: [u8; PIXELS],
    pub status_light: StatusLightStatus,
    pub speaker: SpeakerStatus,
}

impl HubStatus {
    pub fn is_pressed(&self, side: Side) -> bool {
        self.buttons
            .iter()
            .any(|b| b.side == side && b.pressed)
    }
}

/// Hub state shared between the scenario loop and commands
#[derive(Debug, Default)]
pub struct Hub {
    state: Mutex<HubState>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HubState>> {
        self.state.lock().map_err(poisoned("hub"))
    }

    /// Blank matrix, status light off, buttons released, speaker silent
    pub fn reset(&self) -> Result<()> {
        *self.lock()? = HubState::default();
        Ok(())
    }

    pub fn status(&self) -> Result<HubStatus> {
        let state = self.lock()?;
        Ok(HubStatus {
            buttons: [
                ButtonStatus {
                    side: Side::Left,
                    pressed: state.left_pressed,
                },
                ButtonStatus {
                    side: Side::Right,
                    pressed: state.right_pressed,
                },
            ],
            light_matrix: state.matrix,
            status_light: StatusLightStatus {
                color: state.status_color.clone(),
                on: state.status_on,
            },
            speaker: SpeakerStatus {
                volume: state.volume,
                note: state.note,
                beeping: state.beeping,
            },
        })
    }

    pub fn push_button(&self, side: Side) -> Result<()> {
        self.set_button(side, true)
    }

    pub fn release_button(&self, side: Side) -> Result<()> {
        self.set_button(side, false)
    }

    fn set_button(&self, side: Side, pressed: bool) -> Result<()> {
        let mut state = self.lock()?;
        match side {
            Side::Left => state.left_pressed = pressed,
            Side::Right => state.right_pressed = pressed,
        }
        log::debug!("Button {} pressed: {}", side, pressed);
        Ok(())
    }

    fn update(self: &Arc<Self>, apply: impl FnOnce(&mut HubState) + Send + 'static) -> Action {
        let hub = Arc::clone(self);
        Box::new(move || {
            apply(&mut *hub.lock()?);
            Ok(())
        })
    }

    fn immediate(self: &Arc<Self>, apply: impl FnOnce(&mut HubState) + Send + 'static) -> CommandHandle {
        Box::new(Immediate::new(self.update(apply)))
    }

    // ------------------------------------------------------------------
    // Light matrix
    // ------------------------------------------------------------------

    /// Light the image's pixels at `brightness`, clear the others
    ///
    /// Unknown names are rejected when the request is parsed; here they
    /// render blank.
    pub fn show_image(self: &Arc<Self>, name: &str, brightness: u8) -> CommandHandle {
        let pattern = image(name).unwrap_or(BLANK);
        self.immediate(move |state| {
            for (pixel, lit) in state.matrix.iter_mut().zip(pattern) {
                *pixel = if lit != 0 { brightness } else { 0 };
            }
        })
    }

    /// `x` counts from the left, `y` from the top
    pub fn set_pixel(self: &Arc<Self>, x: usize, y: usize, brightness: u8) -> CommandHandle {
        let index = x + 5 * y;
        self.immediate(move |state| {
            if let Some(pixel) = state.matrix.get_mut(index) {
                *pixel = brightness;
            }
        })
    }

    /// Show `text` one character per poll
    pub fn write(self: &Arc<Self>, text: &str) -> CommandHandle {
        let steps = text
            .chars()
            .map(|letter| {
                let pattern = glyph(letter.to_ascii_uppercase());
                self.update(move |state| state.matrix = pattern)
            })
            .collect();
        Box::new(Sequence::new(steps))
    }

    pub fn matrix_off(self: &Arc<Self>) -> CommandHandle {
        self.immediate(|state| state.matrix = BLANK)
    }

    // ------------------------------------------------------------------
    // Status light
    // ------------------------------------------------------------------

    pub fn status_light_on(self: &Arc<Self>, color: &str) -> CommandHandle {
        let color = color.to_string();
        self.immediate(move |state| {
            state.status_on = true;
            state.status_color = color;
        })
    }

    pub fn status_light_off(self: &Arc<Self>) -> CommandHandle {
        self.immediate(|state| state.status_on = false)
    }

    // ------------------------------------------------------------------
    // Speaker
    // ------------------------------------------------------------------

    /// Beep for `seconds` of world-clock time
    pub fn beep(self: &Arc<Self>, clock: Arc<WorldClock>, note: u8, seconds: f64) -> CommandHandle {
        let start = self.update(move |state| {
            state.note = note;
            state.beeping = true;
        });
        let finish = self.update(|state| state.beeping = false);
        Box::new(Timed::new(clock, seconds, start, finish))
    }

    pub fn start_beep(self: &Arc<Self>, note: u8) -> CommandHandle {
        self.immediate(move |state| {
            state.note = note;
            state.beeping = true;
        })
    }

    pub fn stop_beep(self: &Arc<Self>) -> CommandHandle {
        self.immediate(|state| state.beeping = false)
    }

    pub fn set_volume(self: &Arc<Self>, volume: u8) -> CommandHandle {
        self.immediate(move |state| state.volume = volume)
    }
}
