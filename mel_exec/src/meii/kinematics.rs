//! Kinematics of the MAHI Exo-II
//!
//! The elbow and forearm map one to one onto anatomical joints. The wrist is
//! mapped through the RPS solver, warm started from the configuration found
//! on the previous update.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, warn};
use nalgebra::Vector3;

// Internal
use super::*;
use crate::rps::{KinematicsVelocity, Phi, Selection, NUM_DRIVEN};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Generalised forces which hold the RPS in static equilibrium.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticRpsTorques {
    /// Forces on the driven coordinates.
    pub tau_s: Vector3<f64>,

    /// Forces on every coordinate, the driven ones from `tau_s` and the
    /// undriven ones from the applied load.
    pub tau_p: Qp,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MahiExoII {
    /// Refresh the anatomical state from the joints.
    ///
    /// Must be called once per control cycle after the DAQ has been read. A
    /// solve which runs out of iterations is logged and its best estimate
    /// used. A singular solve leaves the previous wrist state in place and is
    /// returned as an error.
    pub fn update_kinematics(&mut self) -> Result<(), MeiiError> {
        let positions = self.robot.joint_positions();
        let velocities = self.robot.joint_velocities();

        let q_par = Vector3::new(
            positions[RPS_OFFSET], 
            positions[RPS_OFFSET + 1], 
            positions[RPS_OFFSET + 2]
        );
        let q_par_dot = Vector3::new(
            velocities[RPS_OFFSET], 
            velocities[RPS_OFFSET + 1], 
            velocities[RPS_OFFSET + 2]
        );

        let mut qp = self.qp;
        let kv = match self.solver.forward_kinematics_velocity(&q_par, &q_par_dot, &mut qp) {
            Ok(kv) => kv,
            Err(RpsError::NotConverged { iterations, residual, solution }) => {
                warn!(
                    "RPS forward kinematics did not converge after {} iterations \
                    (residual {:e}), using best estimate", 
                    iterations, residual
                );
                self.solver.velocity_from(
                    *solution, 
                    self.solver.select_q_ser(), 
                    &q_par_dot, 
                    &qp
                )
            },
            Err(e) => {
                error!("RPS forward kinematics failed at {:?}: {}", q_par.as_slice(), e);
                return Err(e.into())
            }
        };

        self.qp = qp;
        self.qp_dot = kv.qp_dot;
        self.q_par = q_par;
        self.q_par_dot = q_par_dot;
        self.q_ser = kv.q_out;
        self.q_ser_dot = kv.q_out_dot;
        self.jac_fk = kv.jac;
        self.rho_fk = kv.solution.rho;

        for i in 0..RPS_OFFSET {
            self.anat_positions[i] = positions[i];
            self.anat_velocities[i] = velocities[i];
        }
        for i in 0..N_QS {
            self.anat_positions[RPS_OFFSET + i] = self.q_ser[i];
            self.anat_velocities[RPS_OFFSET + i] = self.q_ser_dot[i];
        }

        Ok(())
    }

    /// Anatomical joint positions as of the last `update_kinematics`.
    ///
    /// Units: radians (x4), meters
    pub fn anatomical_joint_positions(&self) -> &[f64; N_AJ] {
        &self.anat_positions
    }

    /// Units: radians or meters
    pub fn anatomical_joint_position(&self, index: usize) -> Option<f64> {
        self.anat_positions.get(index).copied()
    }

    /// Anatomical joint velocities as of the last `update_kinematics`.
    ///
    /// Units: radians/second (x4), meters/second
    pub fn anatomical_joint_velocities(&self) -> &[f64; N_AJ] {
        &self.anat_velocities
    }

    pub fn anatomical_joint_velocity(&self, index: usize) -> Option<f64> {
        self.anat_velocities.get(index).copied()
    }

    /// Anatomical joint torques last commanded.
    ///
    /// Units: Newton-meters (x4), Newtons
    pub fn anatomical_joint_torques(&self) -> &[f64; N_AJ] {
        &self.anat_torques
    }

    pub fn anatomical_joint_torque(&self, index: usize) -> Option<f64> {
        self.anat_torques.get(index).copied()
    }

    /// RPS leg lengths.
    ///
    /// Units: meters
    pub fn wrist_parallel_positions(&self) -> [f64; N_QS] {
        [self.q_par[0], self.q_par[1], self.q_par[2]]
    }

    /// Units: meters/second
    pub fn wrist_parallel_velocities(&self) -> [f64; N_QS] {
        [self.q_par_dot[0], self.q_par_dot[1], self.q_par_dot[2]]
    }

    /// Wrist flexion/extension, radial/ulnar deviation and arm translation.
    ///
    /// Units: radians (x2), meters
    pub fn wrist_serial_positions(&self) -> [f64; N_QS] {
        [self.q_ser[0], self.q_ser[1], self.q_ser[2]]
    }

    pub fn wrist_serial_velocities(&self) -> [f64; N_QS] {
        [self.q_ser_dot[0], self.q_ser_dot[1], self.q_ser_dot[2]]
    }

    /// Full RPS configuration found by the last update.
    pub fn qp(&self) -> &Qp {
        &self.qp
    }

    pub fn qp_dot(&self) -> &Qp {
        &self.qp_dot
    }

    /// Jacobian of the serial coordinates with respect to the leg lengths.
    pub fn jac_fk(&self) -> &Matrix3<f64> {
        &self.jac_fk
    }

    /// Sensitivity of the undriven coordinates to the leg lengths.
    pub fn rho_fk(&self) -> &Rho {
        &self.rho_fk
    }

    /// Parallel forces last commanded through the RPS.
    ///
    /// Units: Newtons
    pub fn tau_par(&self) -> &Vector3<f64> {
        &self.tau_par
    }

    /// Serial reaction of the last RPS command.
    pub fn tau_ser(&self) -> &Vector3<f64> {
        &self.tau_ser
    }

    /// Serial coordinates at the given leg lengths.
    ///
    /// The solve starts from the current configuration, which is not
    /// modified.
    pub fn forward_rps_kinematics(&self, q_par: &Vector3<f64>) -> Result<Vector3<f64>, MeiiError> {
        let mut qp = self.qp;
        Ok(self.solver.forward_kinematics(q_par, &mut qp)?)
    }

    /// Leg lengths at the given serial coordinates.
    pub fn inverse_rps_kinematics(&self, q_ser: &Vector3<f64>) -> Result<Vector3<f64>, MeiiError> {
        let mut qp = self.qp;
        Ok(self.solver.inverse_kinematics(q_ser, &mut qp)?)
    }

    /// Serial coordinates and rates at the given leg lengths and rates.
    pub fn forward_rps_kinematics_velocity(
        &self, 
        q_par: &Vector3<f64>, 
        q_par_dot: &Vector3<f64>
    ) -> Result<KinematicsVelocity, MeiiError> {
        let mut qp = self.qp;
        Ok(self.solver.forward_kinematics_velocity(q_par, q_par_dot, &mut qp)?)
    }

    /// Leg lengths and rates at the given serial coordinates and rates.
    pub fn inverse_rps_kinematics_velocity(
        &self, 
        q_ser: &Vector3<f64>, 
        q_ser_dot: &Vector3<f64>
    ) -> Result<KinematicsVelocity, MeiiError> {
        let mut qp = self.qp;
        Ok(self.solver.inverse_kinematics_velocity(q_ser, q_ser_dot, &mut qp)?)
    }

    /// Forces on the `select`ed coordinates which balance the load `tau_b` on
    /// the others, at the current configuration.
    ///
    /// `tau_b` is ordered as the complement of `select`.
    pub fn solve_static_rps_torques(
        &self, 
        select: &Selection, 
        tau_b: &Phi
    ) -> Result<StaticRpsTorques, MeiiError> {
        let mut qp = self.qp;
        let solution = self.solver.solve(select, &select.gather(&self.qp), &mut qp)?;
        let tau_s = self.solver.solve_static_torques(&solution.rho, tau_b);

        let mut tau_p = Qp::zeros();
        for i in 0..NUM_DRIVEN {
            tau_p[select.indices()[i]] = tau_s[i];
        }
        for (r, &i) in select.complement().iter().enumerate() {
            tau_p[i] = tau_b[r];
        }

        Ok(StaticRpsTorques { tau_s, tau_p })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
