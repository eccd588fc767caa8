//! Newton-Raphson solver for the RPS mechanism

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;

// Internal
use super::*;
use super::constraints::LegGeometry;
use util::maths::scaled_norm;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Solver for the configuration of the RPS mechanism.
///
/// The solver holds only the mechanism's geometry. The configuration being
/// solved is owned by the caller and used as the starting point of every
/// solve, so that consecutive solves track the same branch of solutions as
/// the mechanism moves.
#[derive(Debug, Clone)]
pub struct RpsSolver {
    pub(super) params: RpsParams,
    pub(super) legs: [LegGeometry; 3],
    select_q_par: Selection,
    select_q_ser: Selection,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RpsSolver {
    pub fn new(params: RpsParams) -> Result<Self, RpsError> {
        Ok(Self {
            legs: LegGeometry::legs(&params),
            select_q_par: Selection::new(params.select_q_par)?,
            select_q_ser: Selection::new(params.select_q_ser)?,
            params,
        })
    }

    pub fn params(&self) -> &RpsParams {
        &self.params
    }

    /// The initial configuration.
    pub fn qp0(&self) -> Qp {
        Qp::from_column_slice(&self.params.qp0)
    }

    /// The actuated coordinates.
    pub fn select_q_par(&self) -> &Selection {
        &self.select_q_par
    }

    /// The anatomical coordinates.
    pub fn select_q_ser(&self) -> &Selection {
        &self.select_q_ser
    }

    /// Stacked residual: the constraints followed by the difference between
    /// the driven coordinates and their targets.
    pub fn psi(&self, select: &Selection, qs: &Vector3<f64>, qp: &Qp) -> Psi {
        let mut psi = Psi::zeros();
        psi.fixed_rows_mut::<NUM_CONSTRAINTS>(0).copy_from(&self.phi(qp));

        for (i, &idx) in select.indices().iter().enumerate() {
            psi[NUM_CONSTRAINTS + i] = qp[idx] - qs[i];
        }

        psi
    }

    /// Derivative of `psi` with respect to `qp`.
    pub fn psi_d_qp(&self, select: &Selection, qp: &Qp) -> PsiDQp {
        let mut d = PsiDQp::zeros();
        d.fixed_rows_mut::<NUM_CONSTRAINTS>(0).copy_from(&self.phi_d_qp(qp));

        for (i, &idx) in select.indices().iter().enumerate() {
            d[(NUM_CONSTRAINTS + i, idx)] = 1.0;
        }

        d
    }

    /// Solve for the configuration in which the selected coordinates take the
    /// target values `qs`, starting from and updating `qp`.
    ///
    /// On `NotConverged` `qp` holds the last iterate. On `Singular` it holds
    /// the iterate at which the singularity was found.
    pub fn solve(
        &self, 
        select: &Selection, 
        qs: &Vector3<f64>, 
        qp: &mut Qp
    ) -> Result<Solution, RpsError> {
        let max_iterations = self.params.max_iterations;
        let mut iterations = 0;

        let (residual, converged) = loop {
            let psi = self.psi(select, qs, qp);
            let residual = scaled_norm(psi.as_slice());

            if !residual.is_finite() {
                return Err(RpsError::Singular { iteration: iterations });
            }
            if residual <= self.params.tolerance {
                break (residual, true);
            }
            if iterations >= max_iterations {
                break (residual, false);
            }

            let delta = self.psi_d_qp(select, qp)
                .full_piv_lu()
                .solve(&psi)
                .ok_or(RpsError::Singular { iteration: iterations })?;

            *qp -= delta;
            iterations += 1;
        };

        trace!(
            "RPS solve of {:?}: {} iterations, residual {:e}", 
            select.indices(), iterations, residual
        );

        let solution = self.sensitivity(select, qp, iterations, residual)?;

        if converged {
            Ok(solution)
        }
        else {
            Err(RpsError::NotConverged {
                iterations,
                residual,
                solution: Box::new(solution),
            })
        }
    }

    /// Solve for the serial coordinates given the parallel ones.
    pub fn forward_kinematics(
        &self, 
        q_par: &Vector3<f64>, 
        qp: &mut Qp
    ) -> Result<Vector3<f64>, RpsError> {
        self.solve(&self.select_q_par, q_par, qp)?;
        Ok(self.select_q_ser.gather(qp))
    }

    /// Solve for the parallel coordinates given the serial ones.
    pub fn inverse_kinematics(
        &self, 
        q_ser: &Vector3<f64>, 
        qp: &mut Qp
    ) -> Result<Vector3<f64>, RpsError> {
        self.solve(&self.select_q_ser, q_ser, qp)?;
        Ok(self.select_q_par.gather(qp))
    }

    /// Solve for the serial coordinates and their rates given the parallel
    /// coordinates and their rates.
    pub fn forward_kinematics_velocity(
        &self,
        q_par: &Vector3<f64>,
        q_par_dot: &Vector3<f64>,
        qp: &mut Qp,
    ) -> Result<KinematicsVelocity, RpsError> {
        let solution = self.solve(&self.select_q_par, q_par, qp)?;
        Ok(self.velocity_from(solution, &self.select_q_ser, q_par_dot, qp))
    }

    /// Solve for the parallel coordinates and their rates given the serial
    /// coordinates and their rates.
    pub fn inverse_kinematics_velocity(
        &self,
        q_ser: &Vector3<f64>,
        q_ser_dot: &Vector3<f64>,
        qp: &mut Qp,
    ) -> Result<KinematicsVelocity, RpsError> {
        let solution = self.solve(&self.select_q_ser, q_ser, qp)?;
        Ok(self.velocity_from(solution, &self.select_q_par, q_ser_dot, qp))
    }

    /// Map rates of the driven coordinates of a solution onto the `output`
    /// coordinates.
    pub fn velocity_from(
        &self,
        solution: Solution,
        output: &Selection,
        q_in_dot: &Vector3<f64>,
        qp: &Qp,
    ) -> KinematicsVelocity {
        let jac = solution.jacobian(output);

        KinematicsVelocity {
            q_out: output.gather(qp),
            q_out_dot: jac * q_in_dot,
            qp_dot: solution.rho_s * q_in_dot,
            jac,
            solution,
        }
    }

    /// Generalised forces on the driven coordinates which balance the forces
    /// `tau_b` on the undriven coordinates.
    ///
    /// `tau_b` is ordered as the complement of the selection `rho` was solved
    /// with.
    pub fn solve_static_torques(&self, rho: &Rho, tau_b: &Phi) -> Vector3<f64> {
        -rho.transpose() * tau_b
    }

    /// Sensitivity of every coordinate to the driven ones at `qp`.
    fn sensitivity(
        &self,
        select: &Selection,
        qp: &Qp,
        iterations: usize,
        residual: f64,
    ) -> Result<Solution, RpsError> {
        let mut rhs = RhoS::zeros();
        for i in 0..NUM_DRIVEN {
            rhs[(NUM_CONSTRAINTS + i, i)] = 1.0;
        }

        let rho_s = self.psi_d_qp(select, qp)
            .full_piv_lu()
            .solve(&rhs)
            .ok_or(RpsError::Singular { iteration: iterations })?;

        let mut rho = Rho::zeros();
        for (r, &i) in select.complement().iter().enumerate() {
            for c in 0..NUM_DRIVEN {
                rho[(r, c)] = rho_s[(i, c)];
            }
        }

        Ok(Solution {
            rho,
            rho_s,
            iterations,
            residual,
        })
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::FRAC_PI_4;

    fn solver() -> RpsSolver {
        RpsSolver::new(RpsParams::default()).unwrap()
    }

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!((x - y).abs() < tol, "element {}: {} != {}", i, x, y);
        }
    }

    #[test]
    fn test_drive_angles_from_qp0() {
        let solver = solver();
        let select = Selection::new([0, 1, 2]).unwrap();
        let mut qp = solver.qp0();

        let sol = solver
            .solve(&select, &Vector3::new(FRAC_PI_4, FRAC_PI_4, FRAC_PI_4), &mut qp)
            .unwrap();

        assert!(sol.iterations <= 10);
        assert!(sol.residual < 1e-10);
        assert!(scaled_norm(solver.phi(&qp).as_slice()) < 1e-10);
        assert_close(
            qp.as_slice(),
            &[
                FRAC_PI_4, FRAC_PI_4, FRAC_PI_4,
                0.072995, 0.072995, 0.072995,
                0.0, 0.0, 0.0,
                0.051615, 0.0, 0.0,
            ],
            2e-6,
        );
    }

    #[test]
    fn test_forward_kinematics() {
        let solver = solver();
        let mut qp = solver.qp0();

        let q_ser = solver
            .forward_kinematics(&Vector3::new(0.11, 0.12, 0.13), &mut qp)
            .unwrap();

        assert_close(q_ser.as_slice(), &[0.091737, 0.231742, 0.10785], 2e-6);
        assert_close(
            qp.as_slice(),
            &[
                1.063758, 1.133556, 1.15034,
                0.11, 0.12, 0.13,
                0.091737, 0.231742, -0.010798,
                0.10785, -0.000429, -0.000693,
            ],
            2e-6,
        );

        // Equal leg lengths keep the platform level and centred
        let mut qp = solver.qp0();
        let q_ser = solver
            .forward_kinematics(&Vector3::new(0.12, 0.12, 0.12), &mut qp)
            .unwrap();
        assert_close(q_ser.as_slice(), &[0.0, 0.0, 0.108332], 2e-6);
        assert_close(&qp.as_slice()[0..3], &[1.126163; 3], 2e-6);
    }

    #[test]
    fn test_round_trip() {
        let solver = solver();

        for q_par in [
            Vector3::new(0.11, 0.12, 0.13),
            Vector3::new(0.10, 0.10, 0.11),
            Vector3::new(0.125, 0.115, 0.12),
        ].iter() {
            let mut qp_fwd = solver.qp0();
            let q_ser = solver.forward_kinematics(q_par, &mut qp_fwd).unwrap();

            // Inverse from a cold start recovers the same configuration
            let mut qp_inv = solver.qp0();
            let q_par_inv = solver.inverse_kinematics(&q_ser, &mut qp_inv).unwrap();

            assert_close(q_par_inv.as_slice(), q_par.as_slice(), 1e-9);
            assert_close(qp_inv.as_slice(), qp_fwd.as_slice(), 1e-9);
        }
    }

    #[test]
    fn test_round_trip_from_serial() {
        let solver = solver();

        for q_ser in [
            Vector3::new(0.1, -0.1, 0.105),
            Vector3::new(0.05, 0.05, 0.1),
            Vector3::new(-0.1, 0.08, 0.095),
        ].iter() {
            let mut qp_inv = solver.qp0();
            let q_par = solver.inverse_kinematics(q_ser, &mut qp_inv).unwrap();

            // Forward from a cold start recovers the same configuration
            let mut qp_fwd = solver.qp0();
            let q_ser_fwd = solver.forward_kinematics(&q_par, &mut qp_fwd).unwrap();

            assert_close(q_ser_fwd.as_slice(), q_ser.as_slice(), 1e-9);
            assert_close(qp_fwd.as_slice(), qp_inv.as_slice(), 1e-9);
        }
    }

    #[test]
    fn test_warm_start_needs_no_iterations() {
        let solver = solver();
        let mut qp = solver.qp0();
        let q_par = Vector3::new(0.11, 0.12, 0.13);
        solver.forward_kinematics(&q_par, &mut qp).unwrap();

        let sol = solver.solve(solver.select_q_par(), &q_par, &mut qp).unwrap();
        assert_eq!(sol.iterations, 0);
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let solver = solver();
        let q_par = Vector3::new(0.11, 0.12, 0.13);
        let mut qp = solver.qp0();

        let kin = solver
            .forward_kinematics_velocity(&q_par, &Vector3::zeros(), &mut qp)
            .unwrap();

        let h = 1e-6;
        for j in 0..3 {
            let mut qa = q_par;
            let mut qb = q_par;
            qa[j] += h;
            qb[j] -= h;

            let mut qp_a = qp;
            let mut qp_b = qp;
            let sa = solver.forward_kinematics(&qa, &mut qp_a).unwrap();
            let sb = solver.forward_kinematics(&qb, &mut qp_b).unwrap();
            let fd = (sa - sb) / (2.0 * h);

            for i in 0..3 {
                let an = kin.jac[(i, j)];
                assert!(
                    (fd[i] - an).abs() <= 1e-4 * an.abs().max(1.0),
                    "jac[{}][{}]: fd {} analytic {}", i, j, fd[i], an
                );
            }
        }
    }

    #[test]
    fn test_velocity_is_linear() {
        let solver = solver();
        let q_par = Vector3::new(0.11, 0.12, 0.13);
        let v1 = Vector3::new(0.01, -0.02, 0.005);
        let v2 = Vector3::new(-0.003, 0.004, 0.02);
        let (a, b) = (2.5, -0.7);

        let mut qp = solver.qp0();
        let k1 = solver.forward_kinematics_velocity(&q_par, &v1, &mut qp).unwrap();
        let k2 = solver.forward_kinematics_velocity(&q_par, &v2, &mut qp).unwrap();
        let k12 = solver
            .forward_kinematics_velocity(&q_par, &(v1 * a + v2 * b), &mut qp)
            .unwrap();

        let expected = k1.q_out_dot * a + k2.q_out_dot * b;
        assert_close(k12.q_out_dot.as_slice(), expected.as_slice(), 1e-12);

        // The driven coordinates move exactly as commanded
        assert_close(&k12.qp_dot.as_slice()[3..6], (v1 * a + v2 * b).as_slice(), 1e-12);
    }

    #[test]
    fn test_inverse_velocity_inverts_forward() {
        let solver = solver();
        let q_par = Vector3::new(0.11, 0.12, 0.13);
        let q_par_dot = Vector3::new(0.01, -0.02, 0.005);

        let mut qp = solver.qp0();
        let fwd = solver
            .forward_kinematics_velocity(&q_par, &q_par_dot, &mut qp)
            .unwrap();
        let inv = solver
            .inverse_kinematics_velocity(&fwd.q_out, &fwd.q_out_dot, &mut qp)
            .unwrap();

        assert_close(inv.q_out.as_slice(), q_par.as_slice(), 1e-9);
        assert_close(inv.q_out_dot.as_slice(), q_par_dot.as_slice(), 1e-9);
        assert_close(
            (fwd.jac * inv.jac).as_slice(), 
            nalgebra::Matrix3::<f64>::identity().as_slice(), 
            1e-9
        );
    }

    #[test]
    fn test_static_torques_are_dual_to_velocity() {
        let solver = solver();
        let mut qp = solver.qp0();
        let kin = solver
            .forward_kinematics_velocity(&Vector3::new(0.11, 0.12, 0.13), &Vector3::zeros(), &mut qp)
            .unwrap();

        // A load on the serial coordinates, expressed as the reaction on the
        // undriven coordinates
        let tau_ser = Vector3::new(0.5, -1.0, 20.0);
        let select = solver.select_q_par();
        let mut tau_b = Phi::zeros();
        for (i, &idx) in solver.select_q_ser().indices().iter().enumerate() {
            let pos = select.complement_position(idx).unwrap();
            tau_b[pos] = -tau_ser[i];
        }

        let tau_par = solver.solve_static_torques(&kin.solution.rho, &tau_b);
        let expected = kin.jac.transpose() * tau_ser;
        assert_close(tau_par.as_slice(), expected.as_slice(), 1e-9);
    }

    #[test]
    fn test_not_converged_keeps_best_estimate() {
        let mut params = RpsParams::default();
        params.max_iterations = 1;
        let solver = RpsSolver::new(params).unwrap();

        let mut qp = solver.qp0();
        let res = solver.forward_kinematics(&Vector3::new(0.11, 0.12, 0.13), &mut qp);

        match res {
            Err(RpsError::NotConverged { iterations, residual, solution }) => {
                assert_eq!(iterations, 1);
                assert!(residual > 1e-12);
                assert_eq!(solution.iterations, 1);
            }
            other => panic!("Expected NotConverged, got {:?}", other),
        }

        // The one update that was made is kept
        assert_close(&qp.as_slice()[3..6], &[0.11, 0.12, 0.13], 1e-12);
    }

    #[test]
    fn test_singular_configuration() {
        let solver = solver();

        // With every leg collapsed the leg angles have no effect on the
        // constraints, so the angles cannot be solved for
        let mut qp = Qp::zeros();
        let res = solver.solve(
            solver.select_q_par(), 
            &Vector3::new(0.12, 0.12, 0.12), 
            &mut qp
        );
        assert!(matches!(res, Err(RpsError::Singular { iteration: 0 })));
    }

    #[test]
    fn test_invalid_selection() {
        assert!(matches!(
            Selection::new([0, 0, 1]), 
            Err(RpsError::InvalidSelection(_))
        ));
        assert!(matches!(
            Selection::new([0, 1, 12]), 
            Err(RpsError::InvalidSelection(_))
        ));

        let mut params = RpsParams::default();
        params.select_q_ser = [6, 6, 9];
        assert!(RpsSolver::new(params).is_err());

        let sel = Selection::new([3, 4, 5]).unwrap();
        assert_eq!(sel.complement(), &[0, 1, 2, 6, 7, 8, 9, 10, 11]);
        assert_eq!(sel.complement_position(9), Some(6));
        assert_eq!(sel.complement_position(4), None);
    }
}
