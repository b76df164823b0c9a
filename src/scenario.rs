//! Scenario orchestrator
//!
//! Owns the world clock, the kinematics engine, the hub state and the
//! component registry, and runs the background loop that ties them together:
//!
//! ```text
//!   ┌──────────────────────── scenario thread ────────────────────────┐
//!   │ time = clock.time()                                             │
//!   │ measurements (compute: dynamics status, read: recorded data)    │
//!   │ dynamics.extrapolate(time)                                      │
//!   │ applied = requested          (controlled step consumed)         │
//!   │ clock.sleep()                                                   │
//!   └──────────────────────── while running ──────────────────────────┘
//! ```
//!
//! Callers interact only through [`Scenario`]: register components, give
//! commands and poll them, step the clock in controlled mode, read status.
//! A fault inside the loop is logged and ends it; callers waiting on a
//! command are not told, but [`Scenario::step`] reports
//! [`Error::NotRunning`].

use crate::clock::{ClockMode, WorldClock};
use crate::commands::{
    ColorSensorRequest, CommandHandle, LightMatrixRequest, LoggedCommand, MotorRequest,
    PairRequest, Request, SpeakerRequest, StatusLightRequest,
};
use crate::config::{Coordinates, DataConfig, RobotConfig, ScenarioConfig};
use crate::core::{Args, Side};
use crate::data::RecordedData;
use crate::dynamics::{Dynamics, DynamicsStatus};
use crate::error::{poisoned, Error, Result};
use crate::ground::{Ground, ImageGround};
use crate::hub::{Hub, HubStatus};
use crate::model::{Part, RobotModel};
use crate::registry::{Binding, Component, ComponentRef, ComponentRegistry};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Where component measurements come from
pub enum DataSource {
    /// Derived from the kinematics engine
    Compute,
    /// Replayed from a recording
    Read(Arc<RecordedData>),
}

/// State shared with the scenario thread
struct Shared {
    clock: Arc<WorldClock>,
    dynamics: Arc<Dynamics>,
    hub: Arc<Hub>,
    registry: ComponentRegistry,
    source: DataSource,
    running: AtomicBool,
    started: AtomicBool,
    /// Controlled steps asked for by callers
    requested: AtomicU64,
    /// Controlled steps the loop has run a tick for
    applied: AtomicU64,
}

impl Shared {
    /// One loop iteration at `time`
    fn tick(&self, time: f64) -> Result<()> {
        let hub = self.hub.status()?;
        match &self.source {
            DataSource::Compute => {
                let status = self.dynamics.status()?;
                self.registry.measure_from_dynamics(&status, &hub)?;
            }
            DataSource::Read(data) => self.registry.measure_from_data(data, time, &hub)?,
        }
        self.dynamics.extrapolate(time)
    }

    fn run(&self) -> Result<()> {
        while self.running.load(Ordering::SeqCst) {
            // Read the request before the clock so a step is only marked
            // applied once its time has been seen
            let requested = self.requested.load(Ordering::SeqCst);
            let time = self.clock.time()?;
            self.tick(time)?;
            self.applied.store(requested, Ordering::SeqCst);
            self.started.store(true, Ordering::SeqCst);
            self.clock.sleep()?;
        }
        Ok(())
    }

    /// Clock and dynamics back to time zero
    fn reinitialize(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        self.requested.store(0, Ordering::SeqCst);
        self.applied.store(0, Ordering::SeqCst);
        self.clock.reset()?;
        self.dynamics.reset()
    }
}

/// Clears the running flag when the scenario thread ends, panics included
struct LoopGuard(Arc<Shared>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
        if thread::panicking() {
            log::error!("Scenario thread panicked");
        }
        log::info!("Scenario is over");
    }
}

/// Simulation context handed to control programs
pub struct Scenario {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    /// One outstanding controlled step at a time
    step_lock: Mutex<()>,
    log: Mutex<Vec<LoggedCommand>>,
}

impl Scenario {
    /// Load scenario and robot files
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(scenario: P, robot: Q) -> Result<Self> {
        let scenario = ScenarioConfig::load(scenario)?;
        let robot = RobotConfig::load(robot)?;
        let model = RobotModel::load(&robot)?;
        Self::new(&scenario, model)
    }

    /// Build a scenario around an already loaded robot model
    pub fn new(config: &ScenarioConfig, model: RobotModel) -> Result<Self> {
        let clock = Arc::new(WorldClock::new());
        clock.configure(config.time.mode, config.time.period)?;

        let ground = match &config.ground {
            Some(ground) => {
                let image = ImageGround::load(config.resolve(&ground.image), ground.scale)?;
                Some(Arc::new(image) as Arc<dyn Ground>)
            }
            None => None,
        };

        let dynamics = Arc::new(Dynamics::new(model, Arc::clone(&clock)));
        let source = match &config.data {
            DataConfig::Compute { coordinates } => {
                dynamics.configure(*coordinates, ground)?;
                DataSource::Compute
            }
            DataConfig::Read { filename } => {
                dynamics.configure(Coordinates::default(), ground)?;
                let data = RecordedData::load(config.resolve(filename))?;
                log::info!("Recorded data runs until {} s", data.end_time());
                DataSource::Read(Arc::new(data))
            }
        };

        log::info!(
            "Scenario configured: {:?} clock, {} data",
            config.time.mode,
            match &source {
                DataSource::Compute => "computed",
                DataSource::Read(_) => "recorded",
            }
        );

        Ok(Self {
            shared: Arc::new(Shared {
                clock,
                dynamics,
                hub: Arc::new(Hub::new()),
                registry: ComponentRegistry::new(),
                source,
                running: AtomicBool::new(false),
                started: AtomicBool::new(false),
                requested: AtomicU64::new(0),
                applied: AtomicU64::new(0),
            }),
            thread: Mutex::new(None),
            step_lock: Mutex::new(()),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn clock(&self) -> &Arc<WorldClock> {
        &self.shared.clock
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Spawn the scenario thread and wait for its first tick
    pub fn start(&self) -> Result<()> {
        let mut slot = self.thread.lock().map_err(poisoned("scenario thread"))?;
        if let Some(handle) = slot.take() {
            if self.is_running() {
                *slot = Some(handle);
                log::warn!("Scenario already started");
                return Ok(());
            }
            // Loop ended on its own after a fault
            if handle.join().is_err() {
                log::warn!("Previous scenario thread panicked");
            }
        }

        self.shared.reinitialize()?;
        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("scenario".to_string())
            .spawn(move || {
                let guard = LoopGuard(shared);
                if let Err(e) = guard.0.run() {
                    log::error!("Caught error in scenario thread: {}", e);
                }
            })
            .map_err(|e| Error::Other(format!("Failed to spawn scenario thread: {}", e)))?;
        *slot = Some(handle);
        drop(slot);

        while !self.shared.started.load(Ordering::SeqCst) {
            if !self.is_running() {
                return Err(Error::NotRunning);
            }
            thread::sleep(self.shared.clock.tick() / 2);
        }
        log::info!("Scenario started");
        Ok(())
    }

    /// Advance one period and wait until the loop has run for it
    ///
    /// Only meaningful in controlled mode; in realtime the clock ignores
    /// the step and this returns after the next tick.
    pub fn step(&self) -> Result<()> {
        let _guard = self.step_lock.lock().map_err(poisoned("scenario step"))?;
        if !self.is_running() {
            return Err(Error::NotRunning);
        }

        self.shared.clock.step()?;
        let target = self.shared.requested.fetch_add(1, Ordering::SeqCst) + 1;
        while self.shared.applied.load(Ordering::SeqCst) < target {
            if !self.is_running() {
                return Err(Error::NotRunning);
            }
            thread::sleep(self.shared.clock.tick() / 2);
        }
        Ok(())
    }

    /// End the loop, join the thread and rewind clock and dynamics
    pub fn stop(&self) -> Result<()> {
        self.shared.running.store(false, Ordering::SeqCst);
        let handle = self
            .thread
            .lock()
            .map_err(poisoned("scenario thread"))?
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!("Scenario thread panicked");
            }
        }
        self.shared.reinitialize()
    }

    /// Stop and start again, keeping registrations
    pub fn restart(&self) -> Result<()> {
        self.stop()?;
        self.start()
    }

    /// Stop and forget registrations, hub state and the command log
    pub fn reset(&self) -> Result<()> {
        self.stop()?;
        self.shared.registry.reset()?;
        self.shared.hub.reset()?;
        self.log.lock().map_err(poisoned("command log"))?.clear();
        log::info!("Scenario reset");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Components and commands
    // ------------------------------------------------------------------

    /// Register a live component on a port, a pair of ports or a button side
    pub fn register(
        &self,
        component: Arc<dyn Component>,
        port1: Option<&str>,
        port2: Option<&str>,
    ) -> Result<ComponentRef> {
        self.shared
            .registry
            .register(self.shared.dynamics.model(), component, port1, port2)
    }

    /// Every live registration
    pub fn registered(&self) -> Result<Vec<ComponentRef>> {
        self.shared.registry.registered()
    }

    /// Turn `(name, args)` into a command for `component`
    ///
    /// The command is logged first, then validated; nothing is issued until
    /// the returned command is polled.
    pub fn give(&self, component: &ComponentRef, name: &str, args: &Args) -> Result<CommandHandle> {
        let time = self.shared.clock.time()?;
        self.log
            .lock()
            .map_err(poisoned("command log"))?
            .push(LoggedCommand {
                target: component.to_string(),
                name: name.to_string(),
                args: args.clone(),
                time,
            });
        log::debug!("{} <- {} {:?}", component, name, args);

        if !self.shared.registry.contains(component)? {
            return Err(Error::Runtime(format!("{} is not registered", component)));
        }
        let request = Request::parse(component.kind, name, args)?;
        self.build(component, request)
    }

    /// Poll `command` until it completes, pausing a tick between polls
    ///
    /// In controlled mode another thread must step the clock for blocking
    /// commands to finish.
    pub fn execute(&self, mut command: CommandHandle) -> Result<()> {
        while command.poll()? {
            self.shared.clock.sleep_for_poll();
        }
        Ok(())
    }

    /// `give` then `execute`
    pub fn run(&self, component: &ComponentRef, name: &str, args: &Args) -> Result<()> {
        let command = self.give(component, name, args)?;
        self.execute(command)
    }

    fn build(&self, component: &ComponentRef, request: Request) -> Result<CommandHandle> {
        let dynamics = &self.shared.dynamics;
        let hub = &self.shared.hub;

        match (request, component.binding) {
            (Request::Motor(request), Binding::Port(port)) => match request {
                MotorRequest::RunToPosition {
                    speed,
                    degrees,
                    direction,
                } => dynamics.run_motor_to_position(port, speed, degrees, direction),
                MotorRequest::RunToDegreesCounted { speed, degrees } => {
                    dynamics.run_motor_to_degrees_counted(port, speed, degrees)
                }
                MotorRequest::RunForDegrees { speed, degrees } => {
                    dynamics.run_motor_for_degrees(port, speed, degrees)
                }
                MotorRequest::RunForRotations { speed, rotations } => {
                    dynamics.run_motor_for_rotations(port, speed, rotations)
                }
                MotorRequest::RunForSeconds { speed, seconds } => {
                    dynamics.run_motor_for_seconds(port, speed, seconds)
                }
                MotorRequest::Start { speed } => dynamics.start_motor(port, speed),
                MotorRequest::StartAtPower { power } => dynamics.start_motor_at_power(port, power),
                MotorRequest::Stop => dynamics.stop_motor(port),
                MotorRequest::SetDegreesCounted { degrees } => {
                    dynamics.set_degrees_counted(port, degrees)
                }
                MotorRequest::SetStallDetection { enabled } => {
                    dynamics.set_stall_detection(port, enabled)
                }
                MotorRequest::SetStopAction { action } => dynamics.set_stop_action(port, action),
            },
            (Request::Pair(request), Binding::Pair { left, right }) => match request {
                PairRequest::Start { steering, speed } => {
                    dynamics.start_pair(left, right, steering, speed)
                }
                PairRequest::Move {
                    amount,
                    steering,
                    speed,
                } => dynamics.run_pair_move(left, right, amount, steering, speed),
                PairRequest::Stop => dynamics.stop_pair(left, right),
                PairRequest::StartAtPower { steering, power } => {
                    dynamics.start_pair_at_power(left, right, steering, power)
                }
                PairRequest::StartTank {
                    left_speed,
                    right_speed,
                } => dynamics.start_pair_tank(left, right, left_speed, right_speed),
                PairRequest::MoveTank {
                    amount,
                    left_speed,
                    right_speed,
                } => dynamics.run_pair_move_tank(left, right, amount, left_speed, right_speed),
                PairRequest::StartTankAtPower {
                    left_power,
                    right_power,
                } => dynamics.start_pair_tank_at_power(left, right, left_power, right_power),
                PairRequest::SetStopAction { action } => {
                    dynamics.set_pair_stop_action(left, right, action)
                }
            },
            (Request::ColorSensor(ColorSensorRequest::LightUp { lights }), Binding::Port(port)) => {
                dynamics.light_up(port, lights)
            }
            (Request::LightMatrix(request), _) => Ok(match request {
                LightMatrixRequest::ShowImage { image, brightness } => {
                    hub.show_image(&image, brightness)
                }
                LightMatrixRequest::SetPixel { x, y, brightness } => hub.set_pixel(x, y, brightness),
                LightMatrixRequest::Write { text } => hub.write(&text),
                LightMatrixRequest::Off => hub.matrix_off(),
            }),
            (Request::Speaker(request), _) => Ok(match request {
                SpeakerRequest::Beep { note, seconds } => {
                    hub.beep(Arc::clone(&self.shared.clock), note, seconds)
                }
                SpeakerRequest::StartBeep { note } => hub.start_beep(note),
                SpeakerRequest::Stop => hub.stop_beep(),
                SpeakerRequest::SetVolume { volume } => hub.set_volume(volume),
            }),
            (Request::StatusLight(request), _) => Ok(match request {
                StatusLightRequest::On { color } => hub.status_light_on(&color),
                StatusLightRequest::Off => hub.status_light_off(),
            }),
            (request, binding) => Err(Error::Runtime(format!(
                "{:?} can not be given to a component bound to {:?}",
                request, binding
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Hub inputs and observation
    // ------------------------------------------------------------------

    pub fn push_button(&self, side: Side) -> Result<()> {
        self.shared.hub.push_button(side)
    }

    pub fn release_button(&self, side: Side) -> Result<()> {
        self.shared.hub.release_button(side)
    }

    /// Robot pose and per-part state
    pub fn status(&self) -> Result<DynamicsStatus> {
        self.shared.dynamics.status()
    }

    pub fn hub_status(&self) -> Result<HubStatus> {
        self.shared.hub.status()
    }

    /// Every command given since the last reset
    pub fn command_log(&self) -> Result<Vec<LoggedCommand>> {
        Ok(self.log.lock().map_err(poisoned("command log"))?.clone())
    }

    /// Static robot parts
    pub fn components(&self) -> &[Part] {
        self.shared.dynamics.model().parts()
    }

    pub fn clock_mode(&self) -> Result<ClockMode> {
        self.shared.clock.mode()
    }
}

impl Drop for Scenario {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.thread.lock() {
            if let Some(handle) = slot.take() {
                if handle.join().is_err() {
                    log::warn!("Scenario thread panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Port, Value};
    use crate::model::test_robot;
    use crate::registry::{ComponentKind, Measurement, SimComponent};
    use approx::assert_relative_eq;

    const CONTROLLED: &str = r#"{
        "time": { "mode": "controlled", "period": 0.1 },
        "data": { "mode": "compute", "coordinates": { "north": 0, "east": 0, "yaw": 0 } }
    }"#;

    fn scenario() -> Scenario {
        let config = ScenarioConfig::from_json(CONTROLLED, ".").unwrap();
        Scenario::new(&config, test_robot()).unwrap()
    }

    fn args(pairs: &[(&str, Value)]) -> Args {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Motor whose reading callback blows up
    struct Faulty {
        panics: bool,
    }

    impl Component for Faulty {
        fn kind(&self) -> ComponentKind {
            ComponentKind::Motor
        }

        fn read(&self, _measurement: &Measurement) -> Result<()> {
            if self.panics {
                panic!("component fault");
            }
            Err(Error::Runtime("component fault".to_string()))
        }
    }

    #[test]
    fn test_loop_panic_ends_the_scenario() {
        let scenario = scenario();
        scenario
            .register(Arc::new(Faulty { panics: true }), Some("A"), None)
            .unwrap();

        assert!(matches!(scenario.start(), Err(Error::NotRunning)));
        assert!(!scenario.is_running());
        assert!(matches!(scenario.step(), Err(Error::NotRunning)));

        // The dead thread is joined and the world rewound
        scenario.stop().unwrap();
        assert_relative_eq!(scenario.clock().time().unwrap(), 0.0);
    }

    #[test]
    fn test_loop_error_ends_the_scenario() {
        let scenario = scenario();
        scenario
            .register(Arc::new(Faulty { panics: false }), Some("A"), None)
            .unwrap();

        assert!(matches!(scenario.start(), Err(Error::NotRunning)));
        assert!(matches!(scenario.step(), Err(Error::NotRunning)));
    }

    #[test]
    fn test_step_requires_running_loop() {
        let scenario = scenario();
        assert!(matches!(scenario.step(), Err(Error::NotRunning)));
    }

    #[test]
    fn test_controlled_steps_move_the_clock() {
        let scenario = scenario();
        scenario.start().unwrap();
        for _ in 0..3 {
            scenario.step().unwrap();
        }
        assert_relative_eq!(scenario.clock().time().unwrap(), 0.3, epsilon = 1e-12);
        assert_relative_eq!(scenario.status().unwrap().time, 0.3, epsilon = 1e-12);
        scenario.stop().unwrap();
        assert!(!scenario.is_running());
        assert_relative_eq!(scenario.clock().time().unwrap(), 0.0);
    }

    #[test]
    fn test_give_validates_registration_and_logs() {
        let scenario = scenario();
        let motor = scenario
            .register(SimComponent::new(ComponentKind::Motor), Some("A"), None)
            .unwrap();
        scenario.reset().unwrap();

        let result = scenario.give(&motor, "start", &args(&[("speed", 50.into())]));
        assert!(matches!(result, Err(Error::Runtime(_))));
        let log = scenario.command_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].target, "Motor(A)");
        assert_eq!(log[0].name, "start");
    }

    #[test]
    fn test_pair_drive_and_measurements() {
        let scenario = scenario();
        let left = SimComponent::new(ComponentKind::Motor);
        scenario.register(left.clone(), Some("A"), None).unwrap();
        scenario
            .register(SimComponent::new(ComponentKind::Motor), Some("B"), None)
            .unwrap();
        let pair = scenario
            .register(SimComponent::new(ComponentKind::MotorPair), Some("A"), Some("B"))
            .unwrap();
        scenario.start().unwrap();

        let command = scenario
            .give(
                &pair,
                "start",
                &args(&[("steering", 0.into()), ("speed", 50.into())]),
            )
            .unwrap();
        scenario.execute(command).unwrap();
        for _ in 0..10 {
            scenario.step().unwrap();
        }

        let status = scenario.status().unwrap();
        assert_relative_eq!(status.north, 12.5, epsilon = 1e-9);
        assert_relative_eq!(status.yaw, 0.0, epsilon = 1e-9);
        // Left motor turns counterclockwise to roll forward
        match left.last().unwrap() {
            Some(Measurement::Motor {
                degrees: Some(degrees),
            }) => assert!(degrees < 0.0),
            other => panic!("unexpected measurement {:?}", other),
        }
        scenario.stop().unwrap();
    }

    #[test]
    fn test_hub_commands_and_buttons() {
        let scenario = scenario();
        let light = scenario
            .register(SimComponent::new(ComponentKind::StatusLight), None, None)
            .unwrap();
        scenario
            .run(&light, "on", &args(&[("color", "green".into())]))
            .unwrap();
        scenario.push_button(Side::Left).unwrap();

        let hub = scenario.hub_status().unwrap();
        assert!(hub.status_light.on);
        assert_eq!(hub.status_light.color, "green");
        assert!(hub.is_pressed(Side::Left));

        scenario.reset().unwrap();
        let hub = scenario.hub_status().unwrap();
        assert!(!hub.status_light.on);
        assert!(!hub.is_pressed(Side::Left));
        assert!(scenario.registered().unwrap().is_empty());
    }

    #[test]
    fn test_components_lists_model_parts() {
        let scenario = scenario();
        assert!(scenario
            .components()
            .iter()
            .any(|p| p.port == Some(Port::C)));
    }
}
