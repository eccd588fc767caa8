//! Parameters structure for the MAHI Exo-II

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::f64::consts::PI;

use super::{N_AJ, N_QS, N_RJ};
use crate::daq::{PlantParams, VirtualDaqParams};
use crate::joint::PdGains;
use crate::rps::RpsParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the MAHI Exo-II.
///
/// Joint order is elbow flexion/extension, forearm pronation/supination, then
/// the three RPS prismatic legs. Anatomical order is elbow, forearm, wrist
/// flexion/extension, wrist radial/ulnar deviation, then arm translation.
#[derive(Debug, Clone, Deserialize)]
pub struct MeiiParams {

    // ---- ACTUATORS ----

    /// Motor torque constants.
    ///
    /// Units: Newton-meters/Ampere
    pub kt: [f64; N_RJ],

    /// Current amplifier gains.
    ///
    /// Units: Amperes/volt
    pub amp_gains: [f64; N_RJ],

    /// Continuous motor current limits.
    ///
    /// Units: Amperes
    pub motor_cont_limits: [f64; N_RJ],

    /// Peak motor current limits.
    ///
    /// Units: Amperes
    pub motor_peak_limits: [f64; N_RJ],

    /// Time the peak current may be sustained for.
    ///
    /// Units: seconds
    pub motor_i2t_times: [f64; N_RJ],

    // ---- TRANSMISSION AND SENSING ----

    /// Transmission ratios from motor to joint.
    ///
    /// Units: joint units/radian
    pub eta: [f64; N_RJ],

    /// Encoder resolutions.
    ///
    /// Units: counts/revolution
    pub encoder_res: [f64; N_RJ],

    // ---- SAFETY LIMITS ----

    /// Units: radians, radians, meters, meters, meters
    pub pos_limits_min: [f64; N_RJ],

    /// Units: radians, radians, meters, meters, meters
    pub pos_limits_max: [f64; N_RJ],

    /// Units: radians/second, radians/second, meters/second (x3)
    pub vel_limits: [f64; N_RJ],

    /// Units: Newton-meters (x2), Newtons (x3)
    pub joint_torque_limits: [f64; N_RJ],

    /// If true joint torque commands are saturated at their limits.
    pub saturate_joint_torques: bool,

    /// Spectral norm of the wrist Jacobian above which a fault is raised.
    pub spec_norm_max: f64,

    /// Change in the spectral norm between two torque commands above which a
    /// fault is raised.
    pub spec_norm_max_jump: f64,

    // ---- KINEMATICS ----

    pub rps: RpsParams,

    // ---- CONTROL ----

    /// PD gains in robot joint space.
    pub robot_pd_gains: [PdGains; N_RJ],

    /// PD gains in anatomical joint space.
    pub anat_pd_gains: [PdGains; N_AJ],

    /// Units: meters/second
    pub rps_par_joint_speed: [f64; N_QS],

    /// Units: radians/second (x2), meters/second
    pub rps_ser_joint_speed: [f64; N_QS],

    /// Units: radians/second (x2), meters/second (x3)
    pub robot_joint_speed: [f64; N_RJ],

    /// Units: radians/second (x4), meters/second
    pub anat_joint_speed: [f64; N_AJ],

    /// Leg lengths the RPS is initialised to.
    ///
    /// Units: meters
    pub rps_init_pos: [f64; N_QS],

    /// Units: meters
    pub rps_init_err_tol: f64,

    /// Units: meters
    pub rps_par_goal_err_tol: [f64; N_QS],

    /// Units: radians (x2), meters
    pub rps_ser_goal_err_tol: [f64; N_QS],

    /// Units: radians (x4), meters
    pub anat_goal_err_tol: [f64; N_AJ],

    /// Units: radians (x4), meters
    pub anat_neutral_err_tol: [f64; N_AJ],

    // ---- SIMULATION ----

    pub sim: SimParams,
}

/// Parameters of the simulated exoskeleton driven by a virtual DAQ.
#[derive(Debug, Clone, Deserialize)]
pub struct SimParams {
    /// Rotor inertias.
    ///
    /// Units: kilogram-meters^2
    pub inertia: [f64; N_RJ],

    /// Viscous damping at the rotors.
    ///
    /// Units: Newton-meter-seconds/radian
    pub damping: [f64; N_RJ],

    /// Joint positions the simulation starts from.
    ///
    /// Units: radians (x2), meters (x3)
    pub initial_joint_positions: [f64; N_RJ],

    /// Number of analog input channels on the simulated DAQ.
    pub num_analog_inputs: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MeiiParams {
    /// Encoder resolution of a joint in sensor units.
    ///
    /// Units: radians/count
    pub fn units_per_count(&self, joint: usize) -> f64 {
        2.0 * PI / self.encoder_res[joint]
    }

    /// Motor angle at which a joint reads the given position.
    ///
    /// Units: radians
    pub fn motor_angle(&self, joint: usize, position: f64) -> f64 {
        position / self.eta[joint]
    }

    /// Parameters of a virtual DAQ wired to this robot, with joint `i` on
    /// encoder channel `i` and analog output `i`.
    pub fn virtual_daq_params(&self, step_s: f64) -> VirtualDaqParams {
        let plants = (0..N_RJ)
            .map(|i| PlantParams {
                ao_channel: i,
                torque_per_volt: self.kt[i] * self.amp_gains[i],
                inertia: self.sim.inertia[i],
                damping: self.sim.damping[i],
                counts_per_rad: 1.0 / self.units_per_count(i),
            })
            .collect();

        VirtualDaqParams {
            num_analog_inputs: self.sim.num_analog_inputs,
            num_analog_outputs: N_RJ,
            num_digital_outputs: N_RJ,
            step_s,
            plants,
        }
    }
}
