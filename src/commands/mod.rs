//! Cooperative command protocol
//!
//! Every API call becomes a [`Command`]: a poll-able state machine the caller
//! drives from its own thread while the scenario loop advances the world.
//!
//! ```text
//!   Idle ──first poll──► Running ──condition met──► Done
//!     │                                             ▲
//!     └──────── non-blocking commands ──────────────┘
//! ```
//!
//! `poll()` returns `true` while the command is still running. Non-blocking
//! commands (start, stop, settings) finish on their first poll. The waiting
//! side never holds an engine lock between polls.

pub mod request;

pub use request::{
    ColorSensorRequest, LightMatrixRequest, MotorRequest, PairRequest, Request, SpeakerRequest,
    StatusLightRequest,
};

use crate::clock::WorldClock;
use crate::core::Args;
use crate::error::Result;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

/// Lifecycle of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandState {
    /// Created and validated, nothing issued yet
    Idle,
    /// Issued, waiting for its completion condition
    Running,
    /// Finished; further polls return `false`
    Done,
}

/// A restartable unit of work behind one API call
pub trait Command: Send {
    /// Advance the command; `true` means still running
    fn poll(&mut self) -> Result<bool>;

    fn state(&self) -> CommandState;
}

impl std::fmt::Debug for dyn Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command").field("state", &self.state()).finish()
    }
}

/// Boxed command returned by the scenario
pub type CommandHandle = Box<dyn Command>;

/// Side effect run by a command step
pub type Action = Box<dyn FnOnce() -> Result<()> + Send>;

/// Runs one action on its first poll and completes
pub struct Immediate {
    action: Option<Action>,
    state: CommandState,
}

impl Immediate {
    pub fn new(action: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
            state: CommandState::Idle,
        }
    }
}

impl Command for Immediate {
    fn poll(&mut self) -> Result<bool> {
        if let Some(action) = self.action.take() {
            action()?;
        }
        self.state = CommandState::Done;
        Ok(false)
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

/// Runs one action per poll, in order
pub struct Sequence {
    steps: VecDeque<Action>,
    state: CommandState,
}

impl Sequence {
    pub fn new(steps: Vec<Action>) -> Self {
        Self {
            steps: steps.into(),
            state: CommandState::Idle,
        }
    }
}

impl Command for Sequence {
    fn poll(&mut self) -> Result<bool> {
        match self.steps.pop_front() {
            Some(step) => {
                step()?;
                self.state = CommandState::Running;
                Ok(true)
            }
            None => {
                self.state = CommandState::Done;
                Ok(false)
            }
        }
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

/// Starts, waits a span of world-clock time, then finishes
pub struct Timed {
    clock: Arc<WorldClock>,
    seconds: f64,
    start: Option<Action>,
    finish: Option<Action>,
    started_at: f64,
    state: CommandState,
}

impl Timed {
    pub fn new(
        clock: Arc<WorldClock>,
        seconds: f64,
        start: impl FnOnce() -> Result<()> + Send + 'static,
        finish: impl FnOnce() -> Result<()> + Send + 'static,
    ) -> Self {
        Self {
            clock,
            seconds,
            start: Some(Box::new(start)),
            finish: Some(Box::new(finish)),
            started_at: 0.0,
            state: CommandState::Idle,
        }
    }
}

impl Command for Timed {
    fn poll(&mut self) -> Result<bool> {
        if self.state == CommandState::Idle {
            if let Some(start) = self.start.take() {
                start()?;
            }
            self.started_at = self.clock.time()?;
            self.state = CommandState::Running;
        }
        if self.state == CommandState::Done {
            return Ok(false);
        }
        if self.clock.time()? - self.started_at < self.seconds - crate::dynamics::EPSILON {
            return Ok(true);
        }
        if let Some(finish) = self.finish.take() {
            finish()?;
        }
        self.state = CommandState::Done;
        Ok(false)
    }

    fn state(&self) -> CommandState {
        self.state
    }
}

/// One entry of the command log
#[derive(Debug, Clone, Serialize)]
pub struct LoggedCommand {
    /// Component the command was given to, e.g. `Motor(A)`
    pub target: String,
    pub name: String,
    pub args: Args,
    /// World-clock time the command was given at
    pub time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_immediate_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut command = Immediate::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(command.state(), CommandState::Idle);
        assert!(!command.poll().unwrap());
        assert!(!command.poll().unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(command.state(), CommandState::Done);
    }

    #[test]
    fn test_sequence_one_step_per_poll() {
        let count = Arc::new(AtomicUsize::new(0));
        let steps: Vec<Action> = (0..3)
            .map(|_| {
                let c = Arc::clone(&count);
                Box::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }) as Action
            })
            .collect();
        let mut command = Sequence::new(steps);
        assert!(command.poll().unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(command.poll().unwrap());
        assert!(command.poll().unwrap());
        assert!(!command.poll().unwrap());
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(command.state(), CommandState::Done);
    }

    #[test]
    fn test_timed_waits_on_world_clock() {
        let clock = Arc::new(WorldClock::new());
        clock.configure(ClockMode::Controlled, Some(0.1)).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&finished);
        let mut command = Timed::new(Arc::clone(&clock), 0.3, || Ok(()), move || {
            f.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(command.poll().unwrap());
        assert_eq!(command.state(), CommandState::Running);
        clock.step().unwrap();
        clock.step().unwrap();
        assert!(command.poll().unwrap());
        clock.step().unwrap();
        assert!(!command.poll().unwrap());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
