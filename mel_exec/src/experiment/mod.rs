//! # Smooth position control experiment
//!
//! Moves the MAHI Exo-II through a list of anatomical waypoints:
//!
//! - `INIT` drives the RPS legs to their initialisation position
//! - `TRANSPARENT` backdrives every joint for a short dwell
//! - `WAYPOINT` tracks each waypoint in turn with smooth references
//! - `FINISH` disables the robot once every waypoint is reached
//! - `STOP` disables the robot after a limit violation, fault or timeout
//!
//! Every state runs one full control cycle per tick: read the DAQ, update the
//! kinematics, check the limits, command torques and write the DAQ.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info, warn};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

// Internal
pub use params::*;
use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::controller::tasks::DaqRef;
use crate::daq::Daq;
use crate::meii::{MahiExoII, RpsControlMode, TrajectoryPreset, N_AJ};
use crate::state_machine::{
    StateContext, 
    StateMachine, 
    StateMachineError, 
    StateMachineReport
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

pub const INIT: usize = 0;
pub const TRANSPARENT: usize = 1;
pub const WAYPOINT: usize = 2;
pub const FINISH: usize = 3;
pub const STOP: usize = 4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The smooth position control experiment.
pub struct SmoothPositionControl {
    machine: StateMachine<SpcContext, SpcPayload>,
    params: ExperimentParams,
}

/// Everything the experiment's states act on.
pub struct SpcContext {
    daq: DaqRef,
    meii: Rc<RefCell<MahiExoII>>,
    params: ExperimentParams,

    /// State whose entry actions have run.
    active_state: Option<usize>,

    /// Units: seconds
    state_entry_s: f64,

    /// Index of the waypoint being tracked.
    waypoint: usize,
    waypoints_reached: usize,

    outcome: Option<SpcOutcome>,
}

/// Summary of one run of the experiment.
#[derive(Debug, Clone, Serialize)]
pub struct SpcReport {
    pub machine: StateMachineReport,
    pub waypoints_reached: usize,

    /// How the experiment ended, `None` if it ran out of time or was
    /// interrupted.
    pub outcome: Option<SpcOutcome>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Data carried by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SpcPayload {
    /// Anatomical goal for the `WAYPOINT` state.
    Goal([f64; N_AJ]),
}

/// How the experiment ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SpcOutcome {
    /// Every waypoint was reached.
    Finished,

    /// The robot was stopped early.
    Stopped(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SmoothPositionControl {
    pub fn new(clock: Clock, token: CancelToken, params: ExperimentParams) -> Self {
        let mut machine = StateMachine::new("smooth_position_control", clock, token, INIT);

        machine.add_state("init", init);
        machine.add_state("transparent", transparent);
        machine.add_state("waypoint", waypoint);
        machine.add_state("finish", finish);
        machine.add_state("stop", stop);

        machine.set_interrupt_handler(|ctx: &mut SpcContext| {
            warn!("Experiment interrupted, disabling the robot");
            ctx.shutdown();
        });

        Self { machine, params }
    }

    /// Run the experiment until it finishes, stops, is interrupted, or the
    /// clock passes `stop_time_s`.
    pub fn run(
        &mut self, 
        daq: DaqRef, 
        meii: Rc<RefCell<MahiExoII>>, 
        stop_time_s: f64
    ) -> Result<SpcReport, StateMachineError> {
        let mut ctx = SpcContext {
            daq,
            meii,
            params: self.params.clone(),
            active_state: None,
            state_entry_s: 0.0,
            waypoint: 0,
            waypoints_reached: 0,
            outcome: None,
        };

        let result = self.machine.execute(&mut ctx, stop_time_s);

        // Never leave the robot powered, whichever way execution ended
        if ctx.outcome.is_none() {
            ctx.shutdown();
        }

        Ok(SpcReport {
            machine: result?,
            waypoints_reached: ctx.waypoints_reached,
            outcome: ctx.outcome,
        })
    }
}

impl SpcContext {
    /// Run the entry actions of the current state if they have not run yet.
    /// Returns true on entry.
    fn enter(&mut self, sc: &StateContext<'_, SpcPayload>) -> bool {
        if self.active_state == Some(sc.current_state()) {
            return false
        }

        self.active_state = Some(sc.current_state());
        self.state_entry_s = sc.time();
        true
    }

    /// Time spent in the current state.
    ///
    /// Units: seconds
    fn time_in_state(&self, sc: &StateContext<'_, SpcPayload>) -> f64 {
        sc.time() - self.state_entry_s
    }

    /// Read the inputs and refresh the robot's state, returning the reason to
    /// stop if anything is wrong.
    fn begin_cycle(&mut self) -> Result<(), String> {
        self.daq.borrow_mut()
            .read_all()
            .map_err(|e| format!("DAQ read failed: {}", e))?;

        let mut meii = self.meii.borrow_mut();
        meii.update_kinematics()
            .map_err(|e| format!("Kinematics update failed: {}", e))?;

        if meii.any_limit_exceeded() {
            return Err("Joint limit exceeded".to_string())
        }

        Ok(())
    }

    /// Commit the commanded outputs.
    fn end_cycle(&mut self) -> Result<(), String> {
        if let Some(fault) = self.meii.borrow().fault() {
            return Err(format!("Exoskeleton fault: {:?}", fault))
        }

        self.daq.borrow_mut()
            .write_all()
            .map_err(|e| format!("DAQ write failed: {}", e))
    }

    /// Divert to `STOP` with the given reason.
    fn abort(&mut self, sc: &mut StateContext<'_, SpcPayload>, reason: String) {
        error!("Stopping the experiment: {}", reason);
        self.outcome = Some(SpcOutcome::Stopped(reason));
        sc.goto(STOP);
    }

    /// Disable the robot and commit the zeroed outputs.
    fn shutdown(&mut self) {
        self.meii.borrow_mut().disable();

        let mut daq = self.daq.borrow_mut();
        if daq.is_enabled() {
            if let Err(e) = daq.write_all() {
                error!("Could not write the DAQ during shutdown: {}", e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn init(sc: &mut StateContext<'_, SpcPayload>, ctx: &mut SpcContext, _: Option<SpcPayload>) {
    if ctx.enter(sc) {
        if !ctx.daq.borrow().is_enabled() {
            let enabled = ctx.daq.borrow_mut().enable();
            if let Err(e) = enabled {
                return ctx.abort(sc, format!("Could not enable the DAQ: {}", e))
            }
        }
        if let Err(reason) = ctx.begin_cycle() {
            return ctx.abort(sc, reason)
        }

        let mut meii = ctx.meii.borrow_mut();
        meii.enable();
        meii.set_rps_control_mode(RpsControlMode::Parallel);
        meii.set_rps_backdrive(false);

        let start = meii.wrist_parallel_positions();
        meii.preset_mut(TrajectoryPreset::RpsInit).start(&start, sc.time());
        info!("Initialising the RPS from leg lengths {:?}", start);
    }
    else if let Err(reason) = ctx.begin_cycle() {
        return ctx.abort(sc, reason)
    }

    let done = {
        let mut meii = ctx.meii.borrow_mut();
        meii.set_rps_pos_ctrl_torques_preset(TrajectoryPreset::RpsInit, sc.time());
        meii.check_rps_init()
    };

    if let Err(reason) = ctx.end_cycle() {
        return ctx.abort(sc, reason)
    }

    if done {
        info!("RPS initialised");
        sc.goto(TRANSPARENT);
    }
    else if ctx.time_in_state(sc) > ctx.params.rps_init_timeout_s {
        ctx.abort(sc, "RPS initialisation timed out".to_string());
    }
    else {
        sc.stay();
    }
}

fn transparent(sc: &mut StateContext<'_, SpcPayload>, ctx: &mut SpcContext, _: Option<SpcPayload>) {
    if ctx.enter(sc) {
        let mut meii = ctx.meii.borrow_mut();
        meii.set_rps_control_mode(ctx.params.rps_control_mode);
        meii.set_elbow_backdrive(true);
        meii.set_forearm_backdrive(true);
        meii.set_rps_backdrive(true);
    }

    if let Err(reason) = ctx.begin_cycle() {
        return ctx.abort(sc, reason)
    }

    ctx.meii.borrow_mut()
        .set_anat_pos_ctrl_torques_preset(TrajectoryPreset::Anat, sc.time());

    if let Err(reason) = ctx.end_cycle() {
        return ctx.abort(sc, reason)
    }

    if ctx.time_in_state(sc) >= ctx.params.transparent_time_s {
        let mut meii = ctx.meii.borrow_mut();
        meii.set_elbow_backdrive(false);
        meii.set_forearm_backdrive(false);
        meii.set_rps_backdrive(false);

        match ctx.params.waypoints.first() {
            Some(goal) => sc.event(WAYPOINT, Some(SpcPayload::Goal(*goal))),
            None => sc.goto(FINISH),
        }
    }
    else {
        sc.stay();
    }
}

fn waypoint(
    sc: &mut StateContext<'_, SpcPayload>, 
    ctx: &mut SpcContext, 
    data: Option<SpcPayload>
) {
    if let Err(reason) = ctx.begin_cycle() {
        return ctx.abort(sc, reason)
    }

    if let Some(SpcPayload::Goal(goal)) = data {
        ctx.active_state = Some(WAYPOINT);
        ctx.state_entry_s = sc.time();

        let mut meii = ctx.meii.borrow_mut();
        let current = *meii.anatomical_joint_positions();
        meii.preset_mut(TrajectoryPreset::Anat).start_with_ref(&goal, &current, sc.time());
        info!("Moving to waypoint {}: {:?}", ctx.waypoint, goal);
    }

    let reached = {
        let mut meii = ctx.meii.borrow_mut();
        meii.set_anat_pos_ctrl_torques_preset(TrajectoryPreset::Anat, sc.time());

        match ctx.params.waypoints.get(ctx.waypoint) {
            Some(goal) => meii.check_goal_anat_pos(goal, &[true; N_AJ]),
            None => true,
        }
    };

    if let Err(reason) = ctx.end_cycle() {
        return ctx.abort(sc, reason)
    }

    if reached {
        info!("Reached waypoint {}", ctx.waypoint);
        ctx.waypoints_reached += 1;
        ctx.waypoint += 1;

        match ctx.params.waypoints.get(ctx.waypoint) {
            Some(goal) => sc.event(WAYPOINT, Some(SpcPayload::Goal(*goal))),
            None => sc.goto(FINISH),
        }
    }
    else if ctx.time_in_state(sc) > ctx.params.waypoint_timeout_s {
        let reason = format!("Waypoint {} timed out", ctx.waypoint);
        ctx.abort(sc, reason);
    }
    else {
        sc.stay();
    }
}

fn finish(sc: &mut StateContext<'_, SpcPayload>, ctx: &mut SpcContext, _: Option<SpcPayload>) {
    info!("Every waypoint reached, finishing");
    ctx.shutdown();
    ctx.outcome = Some(SpcOutcome::Finished);
    sc.request_stop();
}

fn stop(sc: &mut StateContext<'_, SpcPayload>, ctx: &mut SpcContext, _: Option<SpcPayload>) {
    warn!("Stopping the robot");
    ctx.shutdown();
    if ctx.outcome.is_none() {
        ctx.outcome = Some(SpcOutcome::Stopped("Stop requested".to_string()));
    }
    sc.request_stop();
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::WaitMode;
    use crate::daq::VirtualDaq;
    use crate::meii::{MeiiCapabilities, MeiiParams};

    const FREQ_HZ: f64 = 1000.0;

    fn setup(initial: [f64; N_AJ], mutate: impl FnOnce(&mut MeiiParams)) 
        -> (Rc<RefCell<VirtualDaq>>, Rc<RefCell<MahiExoII>>) 
    {
        let mut params: MeiiParams = 
            util::params::parse(include_str!("../../../params/meii.toml")).unwrap();
        mutate(&mut params);

        let mut daq = VirtualDaq::new("spc_daq", params.virtual_daq_params(1.0 / FREQ_HZ));
        for (i, q) in initial.iter().enumerate() {
            daq.set_plant_angle(i, params.motor_angle(i, *q)).unwrap();
        }
        let meii = MahiExoII::new(params, &daq, &MeiiCapabilities::default(), 1.0 / FREQ_HZ)
            .unwrap();

        (Rc::new(RefCell::new(daq)), Rc::new(RefCell::new(meii)))
    }

    fn experiment(waypoints: Vec<[f64; N_AJ]>) -> SmoothPositionControl {
        SmoothPositionControl::new(
            Clock::new(FREQ_HZ, WaitMode::Busy),
            CancelToken::new(),
            ExperimentParams {
                rps_control_mode: RpsControlMode::Serial,
                transparent_time_s: 0.1,
                rps_init_timeout_s: 3.0,
                waypoint_timeout_s: 3.0,
                waypoints,
            },
        )
    }

    #[test]
    fn test_full_run() {
        let elbow = -35.0_f64.to_radians();
        let (daq, meii) = setup([elbow, 0.0, 0.1, 0.1, 0.1], |_| ());
        let goal = [
            -40.0_f64.to_radians(), 
            5.0_f64.to_radians(), 
            5.0_f64.to_radians(), 
            -5.0_f64.to_radians(), 
            0.11
        ];

        let mut spc = experiment(vec![goal]);
        let report = spc.run(daq.clone(), meii.clone(), 10.0).unwrap();

        assert_eq!(report.outcome, Some(SpcOutcome::Finished));
        assert_eq!(report.waypoints_reached, 1);
        assert_eq!(
            report.machine.visited, 
            vec![INIT, TRANSPARENT, WAYPOINT, FINISH]
        );

        // Within tolerance of the goal, and left disabled
        let meii = meii.borrow();
        assert!(meii.check_goal_anat_pos(&goal, &[true; N_AJ]));
        assert!(!meii.is_enabled());
        assert!(!meii.preset(TrajectoryPreset::Anat).is_started());
        assert!(daq.borrow().image().borrow().analog_outputs.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_limit_violation_stops() {
        // Start the elbow beyond its upper limit
        let (daq, meii) = setup([0.2, 0.0, 0.12, 0.12, 0.12], |_| ());

        let mut spc = experiment(vec![[0.0; N_AJ]]);
        let report = spc.run(daq, meii.clone(), 5.0).unwrap();

        assert!(matches!(report.outcome, Some(SpcOutcome::Stopped(_))));
        assert_eq!(report.machine.visited, vec![INIT, STOP]);
        assert!(!meii.borrow().is_enabled());
    }

    #[test]
    fn test_init_timeout_stops() {
        // Too weak to move the legs in time
        let (daq, meii) = setup([-0.6, 0.0, 0.1, 0.1, 0.1], |p| {
            for g in p.robot_pd_gains.iter_mut() {
                g.kp = 0.0;
                g.kd = 0.0;
            }
        });

        let mut spc = SmoothPositionControl::new(
            Clock::new(FREQ_HZ, WaitMode::Busy),
            CancelToken::new(),
            ExperimentParams {
                rps_control_mode: RpsControlMode::Serial,
                transparent_time_s: 0.1,
                rps_init_timeout_s: 0.05,
                waypoint_timeout_s: 1.0,
                waypoints: vec![],
            },
        );
        let report = spc.run(daq, meii, 5.0).unwrap();

        assert_eq!(
            report.outcome, 
            Some(SpcOutcome::Stopped("RPS initialisation timed out".to_string()))
        );
        assert_eq!(report.machine.visited, vec![INIT, STOP]);
    }
}
