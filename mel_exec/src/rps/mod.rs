//! # RPS wrist kinematics
//!
//! The wrist of the exoskeleton is a 3-DOF revolute-prismatic-spherical
//! parallel mechanism. Its full configuration is described by 12 generalised
//! coordinates (`qp`):
//!
//! | Index  | Coordinate                                      |
//! |--------|-------------------------------------------------|
//! | 0..3   | Leg revolute angles (theta)                     |
//! | 3..6   | Leg prismatic lengths (L)                       |
//! | 6..9   | Platform orientation (alpha, beta, gamma)       |
//! | 9..12  | Platform translation (x, y, z)                  |
//!
//! which are bound by 9 geometric loop closure constraints. Fixing any 3
//! independent coordinates ("driving" them) determines the other 9, which
//! are found by Newton-Raphson iteration from the previous configuration.
//!
//! The actuated (parallel) coordinates are the three leg lengths, while the
//! anatomical (serial) coordinates are wrist flexion/extension, radial/ulnar
//! deviation, and the platform's translation along the forearm.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod constraints;
mod params;
mod solver;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use thiserror::Error;

// Internal
pub use params::*;
pub use solver::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of generalised coordinates.
pub const NUM_QP: usize = 12;

/// Number of geometric constraints between the coordinates.
pub const NUM_CONSTRAINTS: usize = 9;

/// Number of driven coordinates in any solve.
pub const NUM_DRIVEN: usize = 3;

/// Indices of the leg revolute angles in `qp`.
pub const IDX_THETA: [usize; 3] = [0, 1, 2];

/// Indices of the leg lengths in `qp`.
pub const IDX_LENGTH: [usize; 3] = [3, 4, 5];

pub const IDX_ALPHA: usize = 6;
pub const IDX_BETA: usize = 7;
pub const IDX_GAMMA: usize = 8;
pub const IDX_X: usize = 9;
pub const IDX_Y: usize = 10;
pub const IDX_Z: usize = 11;

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// Full configuration of the mechanism.
pub type Qp = SVector<f64, NUM_QP>;

/// Constraint residual vector.
pub type Phi = SVector<f64, NUM_CONSTRAINTS>;

/// Derivative of the constraints with respect to `qp`.
pub type PhiDQp = SMatrix<f64, NUM_CONSTRAINTS, NUM_QP>;

/// Stacked residual of the constraints and the driven coordinate equations.
pub type Psi = SVector<f64, NUM_QP>;

/// Derivative of `Psi` with respect to `qp`.
pub type PsiDQp = SMatrix<f64, NUM_QP, NUM_QP>;

/// Derivative of the 9 undriven coordinates with respect to the driven ones.
pub type Rho = SMatrix<f64, NUM_CONSTRAINTS, NUM_DRIVEN>;

/// Derivative of all 12 coordinates with respect to the driven ones.
pub type RhoS = SMatrix<f64, NUM_QP, NUM_DRIVEN>;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A choice of 3 coordinates of `qp` together with the 9 that remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    indices: [usize; NUM_DRIVEN],
    complement: [usize; NUM_CONSTRAINTS],
}

/// Result of a successful (or iteration capped) solve.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Sensitivity of the undriven coordinates to the driven ones, rows in
    /// the order of the selection's complement.
    pub rho: Rho,

    /// Sensitivity of every coordinate to the driven ones.
    pub rho_s: RhoS,

    /// Number of Newton updates applied.
    pub iterations: usize,

    /// Scaled norm of the residual at the returned configuration.
    pub residual: f64,
}

/// Position and velocity kinematics in one direction through the mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicsVelocity {
    /// The output coordinates (serial for forward, parallel for inverse).
    pub q_out: Vector3<f64>,

    /// Rates of the output coordinates.
    pub q_out_dot: Vector3<f64>,

    /// Rates of every coordinate.
    pub qp_dot: Qp,

    /// Jacobian from the input to the output coordinates.
    pub jac: Matrix3<f64>,

    pub solution: Solution,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while solving the mechanism.
#[derive(Debug, Error)]
pub enum RpsError {
    /// The iteration limit was reached before the residual dropped below the
    /// tolerance. The configuration holds the best estimate found, and the
    /// solution describes it.
    #[error("RPS solve did not converge after {iterations} iterations (residual {residual:e})")]
    NotConverged {
        iterations: usize,
        residual: f64,
        solution: Box<Solution>,
    },

    #[error("RPS constraint Jacobian is singular at iteration {iteration}")]
    Singular { iteration: usize },

    #[error("Invalid coordinate selection {0:?}, expected 3 distinct indices below 12")]
    InvalidSelection([usize; NUM_DRIVEN]),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Selection {
    /// Build a selection, checking that the indices are distinct and in range.
    pub fn new(indices: [usize; NUM_DRIVEN]) -> Result<Self, RpsError> {
        let distinct = indices[0] != indices[1]
            && indices[0] != indices[2]
            && indices[1] != indices[2];

        if !distinct || indices.iter().any(|&i| i >= NUM_QP) {
            return Err(RpsError::InvalidSelection(indices));
        }

        let mut complement = [0; NUM_CONSTRAINTS];
        let mut num = 0;
        for i in (0..NUM_QP).filter(|i| !indices.contains(i)) {
            complement[num] = i;
            num += 1;
        }

        Ok(Self { indices, complement })
    }

    /// The selected indices.
    pub fn indices(&self) -> &[usize; NUM_DRIVEN] {
        &self.indices
    }

    /// The unselected indices, in ascending order.
    pub fn complement(&self) -> &[usize; NUM_CONSTRAINTS] {
        &self.complement
    }

    /// Gather the selected coordinates of a configuration.
    pub fn gather(&self, qp: &Qp) -> Vector3<f64> {
        Vector3::new(qp[self.indices[0]], qp[self.indices[1]], qp[self.indices[2]])
    }

    /// Position of a coordinate within the complement, if it is unselected.
    pub fn complement_position(&self, index: usize) -> Option<usize> {
        self.complement.iter().position(|&i| i == index)
    }
}

impl Solution {
    /// Jacobian of the given coordinates with respect to the driven ones.
    pub fn jacobian(&self, rows: &Selection) -> Matrix3<f64> {
        let mut jac = Matrix3::zeros();
        for (r, &i) in rows.indices().iter().enumerate() {
            for c in 0..NUM_DRIVEN {
                jac[(r, c)] = self.rho_s[(i, c)];
            }
        }
        jac
    }
}
