//! # Generic tasks
//!
//! Building blocks for controllers: DAQ input and output, robot start and
//! stop, per-joint PD control, clock monitoring and archiving. Resources are
//! shared between tasks through `Rc<RefCell<_>>` handles, which is safe
//! because a controller runs its tasks one at a time on a single thread.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info};
use std::cell::RefCell;
use std::rc::Rc;

// Internal
use super::Task;
use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::daq::Daq;
use crate::joint::PdController;
use crate::robot::HasRobot;
use util::archive::Archiver;

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// Shared handle to a DAQ.
pub type DaqRef = Rc<RefCell<dyn Daq>>;

/// A function of time.
pub type TimeFn = Box<dyn Fn(f64) -> f64>;

/// Produces one archive row at the given time.
pub type RowFn = Box<dyn FnMut(f64) -> Vec<f64>>;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Reads every DAQ input at each tick.
///
/// A failed read is logged and stops the controller.
pub struct DaqReader {
    daq: DaqRef,
    token: CancelToken,
}

/// Writes every DAQ output at each tick.
///
/// A failed write is logged and stops the controller.
pub struct DaqWriter {
    daq: DaqRef,
    token: CancelToken,
}

/// Enables a DAQ and then a robot when the controller starts.
pub struct StartRobot<R: HasRobot> {
    daq: DaqRef,
    robot: Rc<RefCell<R>>,
    token: CancelToken,
}

/// Disables a robot and then its DAQ when the controller stops.
pub struct StopRobot<R: HasRobot> {
    daq: DaqRef,
    robot: Rc<RefCell<R>>,
}

/// PD control of one robot joint against reference functions of time.
pub struct PdJointController<R: HasRobot> {
    name: String,
    robot: Rc<RefCell<R>>,
    joint: usize,
    pd: PdController,
    x_ref: TimeFn,
    xd_ref: TimeFn,
}

/// Monitors the controller's clock and logs its statistics on stop.
#[derive(Debug, Default)]
pub struct ClockTester {
    num_ticks: u64,
    max_exec_time_s: f64,
    total_exec_time_s: f64,
    max_jitter_s: f64,
    last_time_s: Option<f64>,
    last_actual_s: f64,
}

/// Writes one archive row per tick.
pub struct ArchiveTask {
    name: String,
    archiver: Archiver,
    row: RowFn,
    failed: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DaqReader {
    pub fn new(daq: DaqRef, token: CancelToken) -> Self {
        Self { daq, token }
    }
}

impl Task for DaqReader {
    fn name(&self) -> &str {
        "daq_reader"
    }

    fn step(&mut self, _clock: &Clock) {
        if let Err(e) = self.daq.borrow_mut().read_all() {
            error!("Could not read the DAQ: {}", e);
            self.token.request_stop();
        }
    }
}

impl DaqWriter {
    pub fn new(daq: DaqRef, token: CancelToken) -> Self {
        Self { daq, token }
    }
}

impl Task for DaqWriter {
    fn name(&self) -> &str {
        "daq_writer"
    }

    fn step(&mut self, _clock: &Clock) {
        if let Err(e) = self.daq.borrow_mut().write_all() {
            error!("Could not write the DAQ: {}", e);
            self.token.request_stop();
        }
    }
}

impl<R: HasRobot> StartRobot<R> {
    pub fn new(daq: DaqRef, robot: Rc<RefCell<R>>, token: CancelToken) -> Self {
        Self { daq, robot, token }
    }
}

impl<R: HasRobot> Task for StartRobot<R> {
    fn name(&self) -> &str {
        "start_robot"
    }

    fn start(&mut self, _clock: &Clock) {
        let mut daq = self.daq.borrow_mut();

        if !daq.is_enabled() {
            if let Err(e) = daq.enable() {
                error!("Could not enable DAQ {}: {}", daq.name(), e);
                self.token.request_stop();
                return
            }
        }

        // Joints must see a fresh image before they are enabled
        if let Err(e) = daq.read_all() {
            error!("Could not read DAQ {}: {}", daq.name(), e);
            self.token.request_stop();
            return
        }

        self.robot.borrow_mut().enable();
    }
}

impl<R: HasRobot> StopRobot<R> {
    pub fn new(daq: DaqRef, robot: Rc<RefCell<R>>) -> Self {
        Self { daq, robot }
    }
}

impl<R: HasRobot> Task for StopRobot<R> {
    fn name(&self) -> &str {
        "stop_robot"
    }

    fn stop(&mut self, _clock: &Clock) {
        self.robot.borrow_mut().disable();

        let mut daq = self.daq.borrow_mut();
        if daq.is_enabled() {
            // Commit the zeroed outputs before letting go of the hardware
            if let Err(e) = daq.write_all() {
                error!("Could not write DAQ {}: {}", daq.name(), e);
            }
            if let Err(e) = daq.disable() {
                error!("Could not disable DAQ {}: {}", daq.name(), e);
            }
        }
    }
}

impl<R: HasRobot> PdJointController<R> {
    pub fn new(
        robot: Rc<RefCell<R>>, 
        joint: usize, 
        pd: PdController, 
        x_ref: TimeFn, 
        xd_ref: TimeFn
    ) -> Self {
        Self {
            name: format!("pd_joint_{}", joint),
            robot,
            joint,
            pd,
            x_ref,
            xd_ref,
        }
    }

    pub fn pd(&self) -> &PdController {
        &self.pd
    }
}

impl<R: HasRobot> Task for PdJointController<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, clock: &Clock) {
        let t = clock.time();
        let mut robot = self.robot.borrow_mut();

        let joint = match robot.robot_mut().joint_mut(self.joint) {
            Some(j) => j,
            None => {
                error!("Robot has no joint {}", self.joint);
                return
            }
        };

        let torque = self.pd.calculate(
            (self.x_ref)(t), 
            joint.position(), 
            (self.xd_ref)(t), 
            joint.velocity()
        );
        joint.set_torque(torque);
    }

    fn stop(&mut self, _clock: &Clock) {
        if let Some(j) = self.robot.borrow_mut().robot_mut().joint_mut(self.joint) {
            j.set_torque(0.0);
        }
    }
}

impl ClockTester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_ticks(&self) -> u64 {
        self.num_ticks
    }

    /// Largest time spent working in one tick.
    ///
    /// Units: seconds
    pub fn max_exec_time_s(&self) -> f64 {
        self.max_exec_time_s
    }

    /// Largest deviation of the wall clock interval between two steps from
    /// the ideal interval.
    ///
    /// Units: seconds
    pub fn max_jitter_s(&self) -> f64 {
        self.max_jitter_s
    }
}

impl Task for ClockTester {
    fn name(&self) -> &str {
        "clock_tester"
    }

    fn start(&mut self, _clock: &Clock) {
        *self = Self::default();
    }

    fn step(&mut self, clock: &Clock) {
        let actual = clock.elapsed_actual();

        if let Some(last) = self.last_time_s {
            let ideal_dt = clock.time() - last;
            let actual_dt = actual - self.last_actual_s;
            self.max_jitter_s = self.max_jitter_s.max((actual_dt - ideal_dt).abs());

            // Timing of the previous tick is complete by now
            let exec = clock.timing().exec_time_s;
            self.max_exec_time_s = self.max_exec_time_s.max(exec);
            self.total_exec_time_s += exec;
        }

        self.last_time_s = Some(clock.time());
        self.last_actual_s = actual;
        self.num_ticks += 1;
    }

    fn stop(&mut self, clock: &Clock) {
        let mean_exec = if self.num_ticks > 1 {
            self.total_exec_time_s / (self.num_ticks - 1) as f64
        }
        else {
            0.0
        };

        info!(
            "Clock at {} Hz: {} ticks, exec time mean {:.1} us max {:.1} us, \
            max jitter {:.1} us, {} overruns",
            clock.frequency(),
            self.num_ticks,
            mean_exec * 1e6,
            self.max_exec_time_s * 1e6,
            self.max_jitter_s * 1e6,
            clock.timing().num_overruns
        );
    }
}

impl ArchiveTask {
    /// Archive the rows produced by `row` into `archiver`, which should have
    /// been created with a matching header.
    pub fn new(name: &str, archiver: Archiver, row: RowFn) -> Self {
        Self {
            name: name.to_string(),
            archiver,
            row,
            failed: false,
        }
    }
}

impl Task for ArchiveTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn step(&mut self, clock: &Clock) {
        if self.failed {
            return
        }

        let row = (self.row)(clock.time());
        if let Err(e) = self.archiver.write_row(&row) {
            error!("Archive {} failed, no further rows will be written: {}", self.name, e);
            self.failed = true;
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::WaitMode;
    use crate::controller::Controller;
    use crate::daq::{PlantParams, VirtualDaq, VirtualDaqParams};
    use crate::joint::{Encoder, Joint, JointLimits, Limiter, Motor};
    use crate::daq::{AnalogOutput, EncoderChannel};
    use crate::robot::Robot;

    const FREQ_HZ: f64 = 1000.0;

    fn sim() -> (Rc<RefCell<VirtualDaq>>, Rc<RefCell<Robot>>) {
        let daq = VirtualDaq::new(
            "task_daq",
            VirtualDaqParams {
                num_analog_inputs: 0,
                num_analog_outputs: 1,
                num_digital_outputs: 0,
                step_s: 1.0 / FREQ_HZ,
                plants: vec![PlantParams {
                    ao_channel: 0,
                    torque_per_volt: 0.1,
                    inertia: 1e-3,
                    damping: 1e-3,
                    counts_per_rad: 2048.0 / (2.0 * std::f64::consts::PI),
                }],
            },
        );

        let joint = Joint::new(
            "j0",
            Box::new(Encoder::rotary("enc", EncoderChannel::new(&daq, 0).unwrap(), 2048.0, true)),
            Box::new(Motor::new(
                "motor",
                0.1,
                1.0,
                Limiter::saturate(5.0),
                AnalogOutput::new(&daq, 0).unwrap(),
                1.0 / FREQ_HZ,
            )),
            1.0,
            JointLimits {
                position_min: -3.0,
                position_max: 3.0,
                velocity: 50.0,
                torque: 1.0,
            },
            true,
        );

        (
            Rc::new(RefCell::new(daq)), 
            Rc::new(RefCell::new(Robot::new("task_robot", vec![joint])))
        )
    }

    #[test]
    fn test_pd_joint_hold() {
        let (daq, robot) = sim();
        let token = CancelToken::new();
        let mut ctrl = Controller::new(Clock::new(FREQ_HZ, WaitMode::Busy), token.clone());

        let daq_ref: DaqRef = daq.clone();
        ctrl.queue_start_task(Rc::new(RefCell::new(
            StartRobot::new(daq_ref.clone(), robot.clone(), token.clone())
        )));
        ctrl.queue_stop_task(Rc::new(RefCell::new(
            StopRobot::new(daq_ref.clone(), robot.clone())
        )));
        ctrl.queue_step_task(Rc::new(RefCell::new(
            DaqReader::new(daq_ref.clone(), token.clone())
        )));
        let pd = ctrl.add(PdJointController::new(
            robot.clone(),
            0,
            PdController::new(2.0, 0.1),
            Box::new(|_| 0.5),
            Box::new(|_| 0.0),
        ));
        ctrl.queue_step_task(Rc::new(RefCell::new(
            DaqWriter::new(daq_ref.clone(), token.clone())
        )));
        let tester = ctrl.add(ClockTester::new());

        let report = ctrl.execute(1.0);

        assert!(!report.stop_requested);
        assert!(tester.borrow().num_ticks() >= 1000);
        assert!(pd.borrow().pd().e.abs() < 0.01, "error {}", pd.borrow().pd().e);

        // Everything is released on stop
        assert!(!robot.borrow().is_enabled());
        assert!(!daq.borrow().is_enabled());
        assert_eq!(daq.borrow().image().borrow().analog_outputs[0], 0.0);
    }

    #[test]
    fn test_daq_failure_stops_controller() {
        let (daq, _robot) = sim();
        let token = CancelToken::new();
        let mut ctrl = Controller::new(Clock::new(FREQ_HZ, WaitMode::Busy), token.clone());

        // Never enabled, so the first read fails
        ctrl.add(DaqReader::new(daq, token.clone()));
        let report = ctrl.execute(1.0);

        assert!(report.stop_requested);
        assert!(report.ticks <= 1);
    }

    #[test]
    fn test_archive_task() {
        let dir = std::env::temp_dir().join(format!("mel_tasks_test_{}", std::process::id()));
        let path = dir.join("arch.csv");
        let archiver = Archiver::create(&path, &["t", "twice_t"]).unwrap();

        let mut ctrl = Controller::new(Clock::new(FREQ_HZ, WaitMode::Busy), CancelToken::new());
        ctrl.add(ArchiveTask::new("test_arch", archiver, Box::new(|t| vec![t, 2.0 * t])));
        let report = ctrl.execute(0.01);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "t,twice_t");
        assert_eq!(lines.len() as u64, report.ticks + 1);
        assert_eq!(lines[1], "0,0");

        std::fs::remove_dir_all(&dir).ok();
    }
}
