//! # Proportional-derivative controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// PD gains for a single axis.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct PdGains {
    /// Proportional gain.
    ///
    /// Units: effort/position
    pub kp: f64,

    /// Derivative gain.
    ///
    /// Units: effort/velocity
    pub kd: f64,
}

/// A PD controller for a single axis.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PdController {
    pub kp: f64,
    pub kd: f64,

    /// Last position error.
    pub e: f64,

    /// Last velocity error.
    pub ed: f64,

    /// Last computed effort.
    pub effort: f64,

    /// Moving reference used by `move_to_hold`.
    last_x: f64,
    holding: bool,
    move_started: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PdController {
    pub fn new(kp: f64, kd: f64) -> Self {
        Self {
            kp,
            kd,
            ..Default::default()
        }
    }

    pub fn from_gains(gains: PdGains) -> Self {
        Self::new(gains.kp, gains.kd)
    }

    /// Compute the effort `kp * (x_ref - x) + kd * (xd_ref - xd)`.
    pub fn calculate(&mut self, x_ref: f64, x: f64, xd_ref: f64, xd: f64) -> f64 {
        self.e = x_ref - x;
        self.ed = xd_ref - xd;
        self.effort = self.kp * self.e + self.kd * self.ed;
        self.effort
    }

    /// Move towards `x_ref` at speed `|xd_ref|`, then hold it.
    ///
    /// The controller switches to holding once within `hold_tol` of the
    /// target, and back to moving if pushed further than `break_tol` away.
    /// `break_tol` should be larger than `hold_tol`.
    #[allow(clippy::too_many_arguments)]
    pub fn move_to_hold(
        &mut self,
        x_ref: f64,
        x: f64,
        xd_ref: f64,
        xd: f64,
        dt_s: f64,
        hold_tol: f64,
        break_tol: f64,
    ) -> f64 {
        if !self.move_started {
            self.last_x = x;
            self.move_started = true;
            self.holding = false;
        }

        if self.holding && (x_ref - x).abs() > break_tol {
            self.holding = false;
            self.last_x = x;
        }

        if !self.holding && (x_ref - x).abs() < hold_tol {
            self.holding = true;
        }

        if self.holding {
            return self.calculate(x_ref, x, 0.0, xd);
        }

        // Advance the moving reference, never past the target
        let remaining = x_ref - self.last_x;
        let step = xd_ref.abs() * dt_s;
        let vel_ref = if remaining.abs() <= step {
            self.last_x = x_ref;
            0.0
        }
        else {
            self.last_x += step * remaining.signum();
            xd_ref.abs() * remaining.signum()
        };

        self.calculate(self.last_x, x, vel_ref, xd)
    }

    /// Forget any `move_to_hold` progress so the next call starts a fresh
    /// move from the current position.
    pub fn reset_move_to_hold(&mut self) {
        self.move_started = false;
        self.holding = false;
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_calculate() {
        let mut pd = PdController::new(10.0, 2.0);
        let u = pd.calculate(1.0, 0.5, 0.0, 0.25);
        assert!((u - 4.5).abs() < 1e-12);
        assert_eq!(pd.e, 0.5);
        assert_eq!(pd.ed, -0.25);
        assert_eq!(pd.effort, u);
    }

    #[test]
    fn test_move_to_hold_ramps_reference() {
        let mut pd = PdController::new(1.0, 0.0);

        // Starting at 0 with speed 1 and dt 0.1, the reference moves 0.1 per
        // call, so the effort is the gap between the ramp and the position
        let u = pd.move_to_hold(1.0, 0.0, 1.0, 0.0, 0.1, 0.01, 0.1);
        assert!((u - 0.1).abs() < 1e-12);
        let u = pd.move_to_hold(1.0, 0.0, 1.0, 0.0, 0.1, 0.01, 0.1);
        assert!((u - 0.2).abs() < 1e-12);
        assert!(!pd.is_holding());

        // Arriving at the target switches to holding
        let u = pd.move_to_hold(1.0, 0.995, 1.0, 0.0, 0.1, 0.01, 0.1);
        assert!(pd.is_holding());
        assert!((u - 0.005).abs() < 1e-12);
        let u = pd.move_to_hold(1.0, 0.995, 1.0, 0.0, 0.1, 0.01, 0.1);
        assert!((u - 0.005).abs() < 1e-12);

        // Pushed out of the break window it restarts the ramp from where it is
        let u = pd.move_to_hold(1.0, 0.5, 1.0, 0.0, 0.1, 0.01, 0.1);
        assert!(!pd.is_holding());
        assert!((u - 0.1).abs() < 1e-12);
    }
}
