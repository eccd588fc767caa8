//! # MAHI Exo-II
//!
//! The MAHI Exo-II is a five degree of freedom upper limb rehabilitation
//! exoskeleton. The elbow and forearm joints are directly driven and sensed,
//! while the wrist is driven by the RPS parallel mechanism, whose three leg
//! lengths are mapped onto wrist flexion/extension, radial/ulnar deviation
//! and arm translation by the constraint solver in `crate::rps`.
//!
//! The aggregate owns its joints, the solver's warm start configuration, the
//! controllers and reference trajectories used for position control, and any
//! optional sensing capabilities chosen at construction.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod capability;
mod control;
mod kinematics;
mod params;
mod record;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
pub use capability::*;
pub use params::*;
pub use record::*;
use crate::daq::{AnalogOutput, Daq, DaqError, EncoderChannel};
use crate::joint::{Encoder, Joint, JointLimits, Limiter, Motor, PdController};
use crate::robot::{HasRobot, Robot};
use crate::rps::{Qp, Rho, RpsError, RpsSolver};
use crate::traj::SmoothReferenceTrajectory;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of robot joints.
pub const N_RJ: usize = 5;

/// Number of anatomical joints.
pub const N_AJ: usize = 5;

/// Number of RPS coordinates driven at once.
pub const N_QS: usize = 3;

/// Index of the first RPS joint in the robot and anatomical joint orders.
pub const RPS_OFFSET: usize = 2;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The MAHI Exo-II.
pub struct MahiExoII {
    name: String,
    robot: Robot,
    params: MeiiParams,
    solver: RpsSolver,
    emg: Option<EmgModule>,
    force_sensor: Option<ForceSensor>,

    // ---- KINEMATIC STATE ----

    /// Full RPS configuration, used as the warm start of every solve.
    qp: Qp,
    qp_dot: Qp,
    q_par: Vector3<f64>,
    q_par_dot: Vector3<f64>,
    q_ser: Vector3<f64>,
    q_ser_dot: Vector3<f64>,

    /// Jacobian of the serial coordinates with respect to the parallel ones.
    jac_fk: Matrix3<f64>,

    /// Sensitivity of the undriven coordinates to the parallel ones.
    rho_fk: Rho,

    anat_positions: [f64; N_AJ],
    anat_velocities: [f64; N_AJ],
    anat_torques: [f64; N_AJ],

    /// Parallel (leg) forces last commanded through the RPS.
    tau_par: Vector3<f64>,

    /// Reaction on the serial coordinates of the last RPS command.
    tau_ser: Vector3<f64>,

    /// Spectral norm of `jac_fk` at the previous torque command, zero before
    /// the first.
    spec_norm_prev: f64,

    fault: Option<MeiiFault>,

    // ---- CONTROL ----

    rps_control_mode: RpsControlMode,
    rps_backdrive: bool,
    elbow_backdrive: bool,
    forearm_backdrive: bool,

    robot_pd: Vec<PdController>,
    anat_pd: Vec<PdController>,

    rps_init_par_ref: SmoothReferenceTrajectory,
    rps_par_ref: SmoothReferenceTrajectory,
    rps_ser_ref: SmoothReferenceTrajectory,
    robot_ref: SmoothReferenceTrajectory,
    anat_ref: SmoothReferenceTrajectory,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while operating the exoskeleton.
#[derive(Debug, Error)]
pub enum MeiiError {
    #[error("DAQ error: {0}")]
    DaqError(#[from] DaqError),

    #[error("RPS kinematics error: {0}")]
    RpsError(#[from] RpsError),
}

/// Conditions under which the exoskeleton should be stopped, recorded rather
/// than raised so that the control loop can decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum MeiiFault {
    /// The wrist Jacobian's spectral norm exceeded its limit, indicating a
    /// configuration near a singularity.
    SpectralNormTooLarge { norm: f64 },

    /// The wrist Jacobian's spectral norm changed discontinuously between two
    /// torque commands, indicating the solver jumped between branches.
    SpectralNormJump { prev: f64, norm: f64 },
}

/// How the RPS mechanism is position controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RpsControlMode {
    /// PD control of each leg length.
    Parallel,

    /// PD control of the wrist angles, with the arm translation left
    /// backdrivable.
    SerialHeightBackdrive,

    /// PD control of every serial coordinate.
    Serial,
}

/// The reference trajectories held by the exoskeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryPreset {
    /// Leg lengths, preset to the RPS initialisation position.
    RpsInit,

    /// Leg lengths.
    RpsPar,

    /// Serial RPS coordinates.
    RpsSer,

    /// Robot joints.
    Robot,

    /// Anatomical joints.
    Anat,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MahiExoII {
    /// Build the exoskeleton on a DAQ, with joint `i` read from encoder
    /// channel `i` and driven through analog output `i`.
    pub fn new(
        params: MeiiParams, 
        daq: &dyn Daq, 
        capabilities: &MeiiCapabilities,
        step_s: f64,
    ) -> Result<Self, MeiiError> {
        let solver = RpsSolver::new(params.rps.clone())?;

        let mut joints = Vec::with_capacity(N_RJ);
        for i in 0..N_RJ {
            let encoder = Encoder::new(
                &format!("meii_encoder_{}", i),
                EncoderChannel::new(daq, i)?,
                params.units_per_count(i),
                true,
            );

            let motor = Motor::new(
                &format!("meii_motor_{}", i),
                params.kt[i],
                params.amp_gains[i],
                Limiter::accumulate(
                    params.motor_cont_limits[i],
                    params.motor_peak_limits[i],
                    params.motor_i2t_times[i],
                ),
                AnalogOutput::new(daq, i)?,
                step_s,
            );

            joints.push(Joint::new(
                &format!("meii_joint_{}", i),
                Box::new(encoder),
                Box::new(motor),
                params.eta[i],
                JointLimits {
                    position_min: params.pos_limits_min[i],
                    position_max: params.pos_limits_max[i],
                    velocity: params.vel_limits[i],
                    torque: params.joint_torque_limits[i],
                },
                params.saturate_joint_torques,
            ));
        }

        let emg = match &capabilities.emg_channels {
            Some(channels) => Some(EmgModule::new(daq, channels)?),
            None => None,
        };
        let force_sensor = match &capabilities.force_sensor {
            Some(fs) => Some(ForceSensor::new(daq, fs)?),
            None => None,
        };

        let robot_pd = params.robot_pd_gains
            .iter()
            .map(|g| PdController::from_gains(*g))
            .collect();
        let anat_pd = params.anat_pd_gains
            .iter()
            .map(|g| PdController::from_gains(*g))
            .collect();

        let qp = solver.qp0();

        Ok(Self {
            name: "mahi_exo_ii".to_string(),
            robot: Robot::new("mahi_exo_ii", joints),
            emg,
            force_sensor,
            q_par: solver.select_q_par().gather(&qp),
            q_ser: solver.select_q_ser().gather(&qp),
            qp,
            qp_dot: Qp::zeros(),
            q_par_dot: Vector3::zeros(),
            q_ser_dot: Vector3::zeros(),
            jac_fk: Matrix3::zeros(),
            rho_fk: Rho::zeros(),
            anat_positions: [0.0; N_AJ],
            anat_velocities: [0.0; N_AJ],
            anat_torques: [0.0; N_AJ],
            tau_par: Vector3::zeros(),
            tau_ser: Vector3::zeros(),
            spec_norm_prev: 0.0,
            fault: None,
            rps_control_mode: RpsControlMode::Parallel,
            rps_backdrive: false,
            elbow_backdrive: false,
            forearm_backdrive: false,
            robot_pd,
            anat_pd,
            rps_init_par_ref: SmoothReferenceTrajectory::with_ref(
                params.rps_par_joint_speed.to_vec(),
                params.rps_init_pos.to_vec(),
            ),
            rps_par_ref: SmoothReferenceTrajectory::new(params.rps_par_joint_speed.to_vec()),
            rps_ser_ref: SmoothReferenceTrajectory::new(params.rps_ser_joint_speed.to_vec()),
            robot_ref: SmoothReferenceTrajectory::new(params.robot_joint_speed.to_vec()),
            anat_ref: SmoothReferenceTrajectory::new(params.anat_joint_speed.to_vec()),
            solver,
            params,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &MeiiParams {
        &self.params
    }

    pub fn solver(&self) -> &RpsSolver {
        &self.solver
    }

    pub fn enable(&mut self) {
        info!("Enabling {}", self.name);
        self.fault = None;
        self.spec_norm_prev = 0.0;
        self.robot.enable();
    }

    /// Disable every joint and stop every reference trajectory.
    pub fn disable(&mut self) {
        info!("Disabling {}", self.name);

        self.rps_init_par_ref.stop();
        self.rps_par_ref.stop();
        self.rps_ser_ref.stop();
        self.robot_ref.stop();
        self.anat_ref.stop();

        self.robot.disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.robot.is_enabled()
    }

    /// Command robot joint torques directly.
    pub fn set_joint_torques(&mut self, torques: &[f64; N_RJ]) {
        self.robot.set_joint_torques(torques);
    }

    /// Check every joint limit, logging each violation.
    pub fn any_limit_exceeded(&self) -> bool {
        self.robot.any_limit_exceeded()
    }

    /// The last fault raised by a torque command, if any.
    pub fn fault(&self) -> Option<MeiiFault> {
        self.fault
    }

    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    pub fn preset(&self, preset: TrajectoryPreset) -> &SmoothReferenceTrajectory {
        match preset {
            TrajectoryPreset::RpsInit => &self.rps_init_par_ref,
            TrajectoryPreset::RpsPar => &self.rps_par_ref,
            TrajectoryPreset::RpsSer => &self.rps_ser_ref,
            TrajectoryPreset::Robot => &self.robot_ref,
            TrajectoryPreset::Anat => &self.anat_ref,
        }
    }

    pub fn preset_mut(&mut self, preset: TrajectoryPreset) -> &mut SmoothReferenceTrajectory {
        match preset {
            TrajectoryPreset::RpsInit => &mut self.rps_init_par_ref,
            TrajectoryPreset::RpsPar => &mut self.rps_par_ref,
            TrajectoryPreset::RpsSer => &mut self.rps_ser_ref,
            TrajectoryPreset::Robot => &mut self.robot_ref,
            TrajectoryPreset::Anat => &mut self.anat_ref,
        }
    }
}

impl HasRobot for MahiExoII {
    fn robot(&self) -> &Robot {
        &self.robot
    }

    fn robot_mut(&mut self) -> &mut Robot {
        &mut self.robot
    }

    fn enable(&mut self) {
        MahiExoII::enable(self);
    }

    fn disable(&mut self) {
        MahiExoII::disable(self);
    }
}

impl HasEmg for MahiExoII {
    fn emg(&self) -> Option<&EmgModule> {
        self.emg.as_ref()
    }

    fn emg_mut(&mut self) -> Option<&mut EmgModule> {
        self.emg.as_mut()
    }
}

impl HasForceSensor for MahiExoII {
    fn force_sensor(&self) -> Option<&ForceSensor> {
        self.force_sensor.as_ref()
    }

    fn force_sensor_mut(&mut self) -> Option<&mut ForceSensor> {
        self.force_sensor.as_mut()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::daq::VirtualDaq;

    pub(crate) const STEP_S: f64 = 0.001;

    pub(crate) fn params() -> MeiiParams {
        util::params::parse(include_str!("../../../params/meii.toml")).unwrap()
    }

    /// A simulated exoskeleton starting from the given joint positions, with
    /// the DAQ enabled and read once.
    pub(crate) fn sim_meii(
        initial: [f64; N_RJ], 
        caps: &MeiiCapabilities
    ) -> (VirtualDaq, MahiExoII) {
        sim_meii_caps(params(), initial, caps)
    }

    pub(crate) fn sim_meii_with(
        params: MeiiParams, 
        initial: [f64; N_RJ]
    ) -> (VirtualDaq, MahiExoII) {
        sim_meii_caps(params, initial, &MeiiCapabilities::default())
    }

    fn sim_meii_caps(
        params: MeiiParams, 
        initial: [f64; N_RJ], 
        caps: &MeiiCapabilities
    ) -> (VirtualDaq, MahiExoII) {
        let mut daq = VirtualDaq::new("sim_daq", params.virtual_daq_params(STEP_S));
        for (i, q) in initial.iter().enumerate() {
            daq.set_plant_angle(i, params.motor_angle(i, *q)).unwrap();
        }
        daq.enable().unwrap();
        daq.read_all().unwrap();

        let meii = MahiExoII::new(params, &daq, caps, STEP_S).unwrap();
        (daq, meii)
    }

    pub(crate) fn neutral() -> [f64; N_RJ] {
        [-0.6, 0.0, 0.12, 0.12, 0.12]
    }

    #[test]
    fn test_construction() {
        let (daq, mut meii) = sim_meii(neutral(), &MeiiCapabilities::default());
        assert_eq!(meii.robot().num_joints(), N_RJ);
        assert!(meii.emg().is_none());
        assert!(meii.force_sensor().is_none());
        assert!(!meii.is_enabled());

        // Before any update the configuration is the initial guess
        assert_eq!(meii.qp(), &meii.solver().qp0());

        // Joint positions come through the encoders and transmissions to
        // within a count
        let pos = meii.robot().joint_positions();
        for (i, q) in neutral().iter().enumerate() {
            let res = meii.params().units_per_count(i) * meii.params().eta[i];
            assert!((pos[i] - q).abs() <= res, "joint {}: {} vs {}", i, pos[i], q);
        }

        meii.enable();
        assert!(meii.is_enabled());
        meii.set_joint_torques(&[1.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(daq.image().borrow().analog_outputs[0] != 0.0);

        meii.disable();
        assert!(!meii.is_enabled());
        assert_eq!(daq.image().borrow().analog_outputs[0], 0.0);
    }

    #[test]
    fn test_disable_stops_presets() {
        let (_daq, mut meii) = sim_meii(neutral(), &MeiiCapabilities::default());
        meii.enable();

        meii.preset_mut(TrajectoryPreset::RpsInit).start(&[0.12; 3], 0.0);
        meii.preset_mut(TrajectoryPreset::Anat).start_with_ref(&[0.0; 5], &[0.0; 5], 0.0);
        assert!(meii.preset(TrajectoryPreset::RpsInit).is_started());

        meii.disable();
        for p in [
            TrajectoryPreset::RpsInit, 
            TrajectoryPreset::RpsPar, 
            TrajectoryPreset::RpsSer, 
            TrajectoryPreset::Robot, 
            TrajectoryPreset::Anat
        ].iter() {
            assert!(!meii.preset(*p).is_started());
        }
    }

    #[test]
    fn test_capabilities() {
        let caps = MeiiCapabilities {
            emg_channels: Some(vec![0, 1]),
            force_sensor: None,
        };
        let (_daq, meii) = sim_meii(neutral(), &caps);
        assert_eq!(meii.emg().map(EmgModule::num_channels), Some(2));

        // Channels beyond the DAQ are refused at construction
        let caps = MeiiCapabilities {
            emg_channels: Some(vec![99]),
            force_sensor: None,
        };
        let params = params();
        let daq = VirtualDaq::new("sim_daq", params.virtual_daq_params(STEP_S));
        assert!(matches!(
            MahiExoII::new(params, &daq, &caps, STEP_S),
            Err(MeiiError::DaqError(DaqError::NoSuchChannel { .. }))
        ));
    }
}
