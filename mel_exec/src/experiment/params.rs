//! Parameters structure for the smooth position control experiment

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::meii::{RpsControlMode, N_AJ};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the smooth position control experiment.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentParams {
    /// RPS control mode used while tracking waypoints. Must be one of the
    /// serial modes.
    #[serde(default = "default_rps_control_mode")]
    pub rps_control_mode: RpsControlMode,

    /// Time spent with every joint backdriven before tracking starts.
    ///
    /// Units: seconds
    pub transparent_time_s: f64,

    /// Time allowed for the RPS to reach its initialisation position.
    ///
    /// Units: seconds
    pub rps_init_timeout_s: f64,

    /// Time allowed to reach each waypoint.
    ///
    /// Units: seconds
    pub waypoint_timeout_s: f64,

    /// Anatomical goals visited in order.
    ///
    /// Units: radians (x4), meters
    pub waypoints: Vec<[f64; N_AJ]>,
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn default_rps_control_mode() -> RpsControlMode {
    RpsControlMode::Serial
}
