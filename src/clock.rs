//! World clock shared by the scenario loop and every polling caller.
//!
//! Two disciplines are supported:
//!
//! | Mode | `time()` | `sleep()` | `step()` |
//! |------|----------|-----------|----------|
//! | realtime | wall clock since reset | half a tick | no-op |
//! | controlled | steps × period | two ticks | +1 period |
//!
//! Controlled time is kept as an integer step count so every reading is an
//! exact multiple of the configured period.

use crate::error::{poisoned, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Nominal polling tick, matches the hub's sensor sampling rate
pub const TICK: Duration = Duration::from_millis(10);

/// Clock discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    #[default]
    Realtime,
    Controlled,
}

#[derive(Debug)]
struct ClockState {
    mode: ClockMode,
    period: f64,
    steps: u64,
    origin: Instant,
}

/// Time source for the whole simulation
#[derive(Debug)]
pub struct WorldClock {
    state: Mutex<ClockState>,
}

impl Default for WorldClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldClock {
    /// Realtime clock starting now
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                mode: ClockMode::Realtime,
                period: TICK.as_secs_f64(),
                steps: 0,
                origin: Instant::now(),
            }),
        }
    }

    /// Select the discipline; `period` is only used in controlled mode
    pub fn configure(&self, mode: ClockMode, period: Option<f64>) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned("clock"))?;
        if mode == ClockMode::Controlled {
            let period = period
                .ok_or_else(|| Error::Config("controlled clock requires a period".to_string()))?;
            if period.is_nan() || period <= 0.0 {
                return Err(Error::Config(format!(
                    "clock period must be positive, got {}",
                    period
                )));
            }
            state.period = period;
        }
        state.mode = mode;
        log::debug!("Clock configured: {:?}, period {} s", mode, state.period);
        Ok(())
    }

    /// Restart time from zero
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned("clock"))?;
        state.steps = 0;
        state.origin = Instant::now();
        Ok(())
    }

    /// Current simulated time in seconds
    pub fn time(&self) -> Result<f64> {
        let state = self.state.lock().map_err(poisoned("clock"))?;
        Ok(match state.mode {
            ClockMode::Realtime => state.origin.elapsed().as_secs_f64(),
            ClockMode::Controlled => state.steps as f64 * state.period,
        })
    }

    /// Advance one period. No-op in realtime mode.
    pub fn step(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned("clock"))?;
        if state.mode == ClockMode::Controlled {
            state.steps += 1;
        }
        Ok(())
    }

    /// Pause for the mode-dependent polling interval
    pub fn sleep(&self) -> Result<()> {
        let mode = self.mode()?;
        thread::sleep(sleep_interval(mode));
        Ok(())
    }

    /// Pause one nominal tick between command polls
    pub fn sleep_for_poll(&self) {
        thread::sleep(TICK);
    }

    /// Nominal tick length
    pub fn tick(&self) -> Duration {
        TICK
    }

    pub fn mode(&self) -> Result<ClockMode> {
        Ok(self.state.lock().map_err(poisoned("clock"))?.mode)
    }

    pub fn period(&self) -> Result<f64> {
        Ok(self.state.lock().map_err(poisoned("clock"))?.period)
    }

    /// Number of periods stepped since the last reset
    pub fn steps(&self) -> Result<u64> {
        Ok(self.state.lock().map_err(poisoned("clock"))?.steps)
    }
}

fn sleep_interval(mode: ClockMode) -> Duration {
    match mode {
        ClockMode::Realtime => TICK / 2,
        ClockMode::Controlled => TICK * 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_controlled_time_only_moves_on_step() {
        let clock = WorldClock::new();
        clock.configure(ClockMode::Controlled, Some(0.1)).unwrap();
        clock.reset().unwrap();

        assert_eq!(clock.time().unwrap(), 0.0);
        clock.sleep().unwrap();
        assert_eq!(clock.time().unwrap(), 0.0);

        for i in 1..=7 {
            clock.step().unwrap();
            assert_relative_eq!(clock.time().unwrap(), i as f64 * 0.1);
        }
        assert_eq!(clock.steps().unwrap(), 7);
    }

    #[test]
    fn test_reset_returns_to_zero() {
        let clock = WorldClock::new();
        clock.configure(ClockMode::Controlled, Some(0.25)).unwrap();
        clock.step().unwrap();
        clock.step().unwrap();
        assert_relative_eq!(clock.time().unwrap(), 0.5);
        clock.reset().unwrap();
        assert_eq!(clock.time().unwrap(), 0.0);
    }

    #[test]
    fn test_realtime_step_is_noop() {
        let clock = WorldClock::new();
        clock.reset().unwrap();
        clock.step().unwrap();
        assert_eq!(clock.steps().unwrap(), 0);
        let t0 = clock.time().unwrap();
        clock.sleep().unwrap();
        assert!(clock.time().unwrap() > t0);
    }

    #[test]
    fn test_controlled_requires_positive_period() {
        let clock = WorldClock::new();
        assert!(matches!(
            clock.configure(ClockMode::Controlled, None),
            Err(Error::Config(_))
        ));
        assert!(clock.configure(ClockMode::Controlled, Some(0.0)).is_err());
        assert!(clock.configure(ClockMode::Realtime, None).is_ok());
    }

    #[test]
    fn test_sleep_intervals() {
        assert_eq!(sleep_interval(ClockMode::Realtime), Duration::from_millis(5));
        assert_eq!(sleep_interval(ClockMode::Controlled), Duration::from_millis(20));
    }
}
