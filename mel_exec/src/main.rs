//! Main MEL executable entry point.
//!
//! # Architecture
//!
//! The executable runs the MAHI Exo-II against a simulated DAQ:
//!
//!     - Initialise the session, logging and parameters
//!     - Build the virtual DAQ and the exoskeleton on top of it
//!     - Run the smooth position control experiment
//!     - If the experiment finished, hold the final pose with a PD controller
//!       per joint, archiving the exoskeleton's state every tick
//!
//! An optional single argument names the exoskeleton's parameter file,
//! overriding the one given in `exec.toml`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::{WrapErr, eyre}};
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::env;
use std::rc::Rc;

// Internal
use mel_lib::{
    cancel::{install_ctrlc_handler, CancelToken},
    clock::Clock,
    controller::{
        Controller,
        Task,
        tasks::{
            ArchiveTask, ClockTester, DaqReader, DaqRef, DaqWriter,
            PdJointController, StartRobot, StopRobot
        }
    },
    daq::VirtualDaq,
    experiment::{SmoothPositionControl, SpcOutcome},
    joint::PdController,
    meii::{MahiExoII, MeiiParams, MeiiRecord, N_RJ},
    params::ExecParams,
    robot::HasRobot,
};
use util::{
    archive::Archiver,
    host,
    logger::{logger_init, parse_level},
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Keeps the exoskeleton's kinematics current during the position hold.
struct KinematicsUpdater {
    meii: Rc<RefCell<MahiExoII>>,
    token: CancelToken,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Task for KinematicsUpdater {
    fn name(&self) -> &str {
        "meii_kinematics"
    }

    fn step(&mut self, _clock: &Clock) {
        let mut meii = self.meii.borrow_mut();

        if let Err(e) = meii.update_kinematics() {
            error!("Kinematics update failed: {}", e);
            self.token.request_stop();
            return
        }

        if meii.any_limit_exceeded() {
            error!("Joint limit exceeded during the position hold");
            self.token.request_stop();
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "mel_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Parameters are needed before the logger so the level can be set
    let exec_params: ExecParams = util::params::load(
        "exec.toml"
    ).wrap_err("Could not load exec params")?;

    // Initialise logger
    let level = parse_level(&exec_params.log_level)
        .wrap_err("Invalid log level in exec params")?;
    logger_init(level, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("MEL Executable\n");
    info!("Running on: {}", host::get_hostname());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    let meii_params_file = match args.len() {
        1 => exec_params.meii_params_file.clone(),
        2 => args[1].clone(),
        n => return Err(eyre!(
            "Expected either zero or one argument, found {}", n - 1
        ))
    };

    let meii_params: MeiiParams = util::params::load(
        &meii_params_file
    ).wrap_err("Could not load MAHI Exo-II params")?;

    info!("Parameters loaded, exoskeleton from \"{}\"", meii_params_file);

    // ---- INITIALISE CANCELLATION ----

    let token = CancelToken::new();
    install_ctrlc_handler(&token)
        .wrap_err("Failed to install the Ctrl-C handler")?;

    // ---- INITIALISE HARDWARE ----

    let step_s = 1.0 / exec_params.clock.frequency_hz;

    let mut sim_daq = VirtualDaq::new(
        "sim_daq",
        meii_params.virtual_daq_params(step_s)
    );
    for (i, q) in meii_params.sim.initial_joint_positions.iter().enumerate() {
        sim_daq.set_plant_angle(i, meii_params.motor_angle(i, *q))
            .wrap_err("Failed to set the simulated joint position")?;
    }

    let meii = MahiExoII::new(
        meii_params.clone(),
        &sim_daq,
        &exec_params.capabilities,
        step_s
    ).wrap_err("Failed to initialise the MAHI Exo-II")?;

    let daq: DaqRef = Rc::new(RefCell::new(sim_daq));
    let meii = Rc::new(RefCell::new(meii));

    info!("Hardware initialised\n");

    // ---- EXPERIMENT ----

    let mut spc = SmoothPositionControl::new(
        Clock::from_params(&exec_params.clock),
        token.clone(),
        exec_params.experiment.clone()
    );

    let spc_report = spc.run(
        daq.clone(),
        meii.clone(),
        exec_params.experiment_stop_time_s
    ).wrap_err("Smooth position control failed")?;

    info!(
        "Experiment ended in state {} after {:.03} s, {} waypoints reached",
        spc_report.machine.final_state,
        spc_report.machine.ideal_time_s,
        spc_report.waypoints_reached
    );
    session.save("spc_report.json", spc_report.clone());

    // ---- POSITION HOLD ----

    if spc_report.machine.interrupted {
        warn!("Experiment interrupted, skipping the position hold");
    }
    else if spc_report.outcome != Some(SpcOutcome::Finished) {
        warn!("Experiment did not finish, skipping the position hold");
    }
    else {
        run_position_hold(
            &session,
            &exec_params,
            &meii_params,
            daq,
            meii,
            token
        )?;
    }

    info!("End of execution");

    session.exit();

    Ok(())
}

/// Hold every joint at the position it ended the experiment in.
fn run_position_hold(
    session: &Session,
    exec_params: &ExecParams,
    meii_params: &MeiiParams,
    daq: DaqRef,
    meii: Rc<RefCell<MahiExoII>>,
    token: CancelToken
) -> Result<(), Report> {
    info!("Holding position for {:.02} s", exec_params.hold_time_s);

    let hold_positions = meii.borrow().robot().joint_positions();

    let mut controller = Controller::new(
        Clock::from_params(&exec_params.clock),
        token.clone()
    );

    // Stop tasks run in reverse order, so the robot is disabled last
    controller.queue_stop_task(
        Rc::new(RefCell::new(StopRobot::new(daq.clone(), meii.clone())))
    );
    controller.queue_start_task(Rc::new(RefCell::new(
        StartRobot::new(daq.clone(), meii.clone(), token.clone())
    )));

    controller.add(DaqReader::new(daq.clone(), token.clone()));
    controller.add(KinematicsUpdater {
        meii: meii.clone(),
        token: token.clone()
    });

    for joint in 0..N_RJ {
        let x_ref = hold_positions[joint];
        let gains = meii_params.robot_pd_gains[joint];
        controller.add(PdJointController::new(
            meii.clone(),
            joint,
            PdController::from_gains(gains),
            Box::new(move |_| x_ref),
            Box::new(|_| 0.0)
        ));
    }

    controller.add(DaqWriter::new(daq.clone(), token.clone()));

    let archiver = Archiver::with_header(
        session,
        "meii_hold.csv",
        &MeiiRecord::header()
    ).wrap_err("Failed to create the hold archive")?;
    let archived = meii.clone();
    controller.add(ArchiveTask::new(
        "meii_archive",
        archiver,
        Box::new(move |t| archived.borrow().record(t).to_row())
    ));

    let clock_tester = controller.add(ClockTester::new());

    let report = controller.execute(exec_params.hold_time_s);

    {
        let ct = clock_tester.borrow();
        info!(
            "Position hold ended after {} ticks, max exec time {:.06} s, \
            max jitter {:.06} s",
            ct.num_ticks(),
            ct.max_exec_time_s(),
            ct.max_jitter_s()
        );
    }

    if report.stop_requested {
        warn!("Position hold was stopped early");
    }
    session.save("hold_report.json", report);

    Ok(())
}
