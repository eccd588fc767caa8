//! Loop closure constraints of the RPS mechanism and their derivatives
//!
//! Each leg contributes three constraints, one per axis, stating that the end
//! of the leg and the matching platform joint coincide. Legs are identical up
//! to a rotation about the forearm axis by `LEG_OFFSETS_RAD`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Rotation of each leg relative to the first about the forearm axis.
const LEG_OFFSETS_RAD: [f64; 3] = [
    0.0,
    -2.0 * std::f64::consts::FRAC_PI_3,
    2.0 * std::f64::consts::FRAC_PI_3,
];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Precomputed trigonometry of one leg's joint positions.
#[derive(Debug, Clone, Copy)]
pub(super) struct LegGeometry {
    c_a13: f64,
    s_a13: f64,
    c_a5: f64,
    s_a5: f64,
}

/// Trigonometric terms of the platform orientation shared by every
/// constraint.
struct Orientation {
    s_alpha: f64,
    c_alpha: f64,
    s_beta: f64,
    c_beta: f64,
    s_gamma: f64,
    c_gamma: f64,

    u: f64,
    v: f64,
    w: f64,
    t: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LegGeometry {
    /// Geometry of all three legs.
    pub(super) fn legs(params: &RpsParams) -> [Self; 3] {
        let mut legs = [Self { c_a13: 0.0, s_a13: 0.0, c_a5: 0.0, s_a5: 0.0 }; 3];

        for (leg, offset) in legs.iter_mut().zip(LEG_OFFSETS_RAD.iter()) {
            let a13 = params.platform_angle_rad + offset;
            let a5 = params.base_angle_rad + offset;

            *leg = Self {
                c_a13: a13.cos(),
                s_a13: a13.sin(),
                c_a5: a5.cos(),
                s_a5: a5.sin(),
            };
        }

        legs
    }
}

impl Orientation {
    fn new(qp: &Qp) -> Self {
        let (s_alpha, c_alpha) = qp[IDX_ALPHA].sin_cos();
        let (s_beta, c_beta) = qp[IDX_BETA].sin_cos();
        let (s_gamma, c_gamma) = qp[IDX_GAMMA].sin_cos();

        Self {
            s_alpha,
            c_alpha,
            s_beta,
            c_beta,
            s_gamma,
            c_gamma,
            u: s_alpha * s_gamma - c_alpha * c_gamma * s_beta,
            v: c_gamma * s_alpha + c_alpha * s_beta * s_gamma,
            w: c_alpha * s_gamma + c_gamma * s_alpha * s_beta,
            t: c_alpha * c_gamma - s_alpha * s_beta * s_gamma,
        }
    }
}

impl RpsSolver {
    /// Evaluate the constraints at a configuration.
    ///
    /// A configuration is geometrically valid when every element is zero.
    pub fn phi(&self, qp: &Qp) -> Phi {
        let r = self.params.platform_radius_m;
        let big_r = self.params.base_radius_m;
        let a56 = self.params.platform_offset_m;
        let o = Orientation::new(qp);

        let mut phi = Phi::zeros();

        for (k, leg) in self.legs.iter().enumerate() {
            let (s_theta, c_theta) = qp[IDX_THETA[k]].sin_cos();
            let len = qp[IDX_LENGTH[k]];

            phi[3 * k] = len * s_theta 
                - qp[IDX_X] 
                - r * leg.c_a13 * o.u 
                - r * leg.s_a13 * o.v;

            phi[3 * k + 1] = big_r * leg.c_a5 
                - qp[IDX_Y] 
                - a56 * leg.s_a5 
                - len * leg.c_a5 * c_theta
                - r * leg.c_a13 * o.c_beta * o.c_gamma 
                + r * leg.s_a13 * o.c_beta * o.s_gamma;

            phi[3 * k + 2] = a56 * leg.c_a5 
                - qp[IDX_Z] 
                + big_r * leg.s_a5 
                - len * leg.s_a5 * c_theta
                - r * leg.c_a13 * o.w 
                - r * leg.s_a13 * o.t;
        }

        phi
    }

    /// Analytic derivative of the constraints with respect to `qp`.
    pub fn phi_d_qp(&self, qp: &Qp) -> PhiDQp {
        let r = self.params.platform_radius_m;
        let o = Orientation::new(qp);

        let mut d = PhiDQp::zeros();

        for (k, leg) in self.legs.iter().enumerate() {
            let (s_theta, c_theta) = qp[IDX_THETA[k]].sin_cos();
            let len = qp[IDX_LENGTH[k]];
            let (rx, ry, rz) = (3 * k, 3 * k + 1, 3 * k + 2);

            // x
            d[(rx, IDX_THETA[k])] = len * c_theta;
            d[(rx, IDX_LENGTH[k])] = s_theta;
            d[(rx, IDX_ALPHA)] = -r * leg.c_a13 * o.w - r * leg.s_a13 * o.t;
            d[(rx, IDX_BETA)] = r * o.c_alpha * o.c_beta 
                * (leg.c_a13 * o.c_gamma - leg.s_a13 * o.s_gamma);
            d[(rx, IDX_GAMMA)] = -r * leg.c_a13 * o.v + r * leg.s_a13 * o.u;
            d[(rx, IDX_X)] = -1.0;

            // y
            d[(ry, IDX_THETA[k])] = len * leg.c_a5 * s_theta;
            d[(ry, IDX_LENGTH[k])] = -leg.c_a5 * c_theta;
            d[(ry, IDX_BETA)] = r * o.s_beta 
                * (leg.c_a13 * o.c_gamma - leg.s_a13 * o.s_gamma);
            d[(ry, IDX_GAMMA)] = r * o.c_beta 
                * (leg.c_a13 * o.s_gamma + leg.s_a13 * o.c_gamma);
            d[(ry, IDX_Y)] = -1.0;

            // z
            d[(rz, IDX_THETA[k])] = len * leg.s_a5 * s_theta;
            d[(rz, IDX_LENGTH[k])] = -leg.s_a5 * c_theta;
            d[(rz, IDX_ALPHA)] = r * leg.c_a13 * o.u + r * leg.s_a13 * o.v;
            d[(rz, IDX_BETA)] = -r * o.s_alpha * o.c_beta 
                * (leg.c_a13 * o.c_gamma - leg.s_a13 * o.s_gamma);
            d[(rz, IDX_GAMMA)] = -r * leg.c_a13 * o.t + r * leg.s_a13 * o.w;
            d[(rz, IDX_Z)] = -1.0;
        }

        d
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_analytic_derivative_matches_finite_difference() {
        let solver = RpsSolver::new(RpsParams::default()).unwrap();
        let h = 1e-6;

        let qp = Qp::from_column_slice(&[
            0.9, 1.1, 1.2, 
            0.11, 0.12, 0.13, 
            0.2, -0.3, 0.1, 
            0.1, 0.01, -0.02,
        ]);
        let analytic = solver.phi_d_qp(&qp);

        for j in 0..NUM_QP {
            let mut qa = qp;
            let mut qb = qp;
            qa[j] += h;
            qb[j] -= h;
            let fd = (solver.phi(&qa) - solver.phi(&qb)) / (2.0 * h);

            for i in 0..NUM_CONSTRAINTS {
                assert!(
                    (fd[i] - analytic[(i, j)]).abs() < 1e-7,
                    "d phi[{}] / d qp[{}]: fd {} analytic {}", i, j, fd[i], analytic[(i, j)]
                );
            }
        }
    }

    #[test]
    fn test_legs_are_symmetric() {
        let solver = RpsSolver::new(RpsParams::default()).unwrap();

        // A centred, level platform with identical legs loads every leg the
        // same, so each leg's residual has the same norm
        let mut qp = Qp::from_column_slice(&solver.params().qp0);
        qp[IDX_Y] = 0.0;
        qp[IDX_Z] = 0.0;
        let phi = solver.phi(&qp);

        let norms: Vec<f64> = (0..3)
            .map(|k| (phi[3 * k + 1].powi(2) + phi[3 * k + 2].powi(2)).sqrt())
            .collect();
        assert!((norms[0] - norms[1]).abs() < 1e-12);
        assert!((norms[0] - norms[2]).abs() < 1e-12);
        assert!((phi[0] - phi[3]).abs() < 1e-12);
    }
}
