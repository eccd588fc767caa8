//! Parameters structure for the RPS solver

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use super::{NUM_DRIVEN, NUM_QP};
use util::maths::DEG2RAD;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the RPS mechanism and its solver.
#[derive(Debug, Clone, Deserialize)]
pub struct RpsParams {

    // ---- GEOMETRY ----

    /// Radius of the circle through the legs' base revolute joints.
    ///
    /// Units: meters
    pub base_radius_m: f64,

    /// Radius of the circle through the legs' platform spherical joints.
    ///
    /// Units: meters
    pub platform_radius_m: f64,

    /// Offset along the forearm between the base and platform joint planes.
    ///
    /// Units: meters
    pub platform_offset_m: f64,

    /// Angular position of the first leg's base joint.
    ///
    /// Units: radians
    pub base_angle_rad: f64,

    /// Angular position of the first leg's platform joint.
    ///
    /// Units: radians
    pub platform_angle_rad: f64,

    // ---- SOLVER ----

    /// Maximum number of Newton updates per solve.
    pub max_iterations: usize,

    /// Residual below which a solve has converged.
    pub tolerance: f64,

    /// Indices in `qp` of the actuated coordinates.
    pub select_q_par: [usize; NUM_DRIVEN],

    /// Indices in `qp` of the anatomical coordinates.
    pub select_q_ser: [usize; NUM_DRIVEN],

    /// Initial configuration, used before any solve has run.
    pub qp0: [f64; NUM_QP],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for RpsParams {
    /// Geometry of the MAHI Exo-II wrist.
    fn default() -> Self {
        let quarter = std::f64::consts::FRAC_PI_4;

        Self {
            base_radius_m: 0.1044956,
            platform_radius_m: 0.05288174521,
            platform_offset_m: 0.0268986 - 0.0272820,
            base_angle_rad: 0.094516665054824,
            platform_angle_rad: 5.0 * DEG2RAD,
            max_iterations: 10,
            tolerance: 1e-12,
            select_q_par: [3, 4, 5],
            select_q_ser: [6, 7, 9],
            qp0: [
                quarter, quarter, quarter,
                0.1305, 0.1305, 0.1305,
                0.0, 0.0, 0.0,
                0.0923, 0.0, 0.0,
            ],
        }
    }
}
