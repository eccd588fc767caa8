//! # Smooth reference trajectory
//!
//! Generates a rate limited reference from wherever a mechanism currently is
//! towards a goal. Each degree of freedom ramps linearly at its own maximum
//! speed and holds once the goal is reached. The goal can be changed at any
//! time without a discontinuity: the currently interpolated value becomes
//! the base of the new ramp.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::error;
use serde::Serialize;

// Internal
use util::maths::clamp;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A constant velocity reference generator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SmoothReferenceTrajectory {
    /// Maximum rate of change of each degree of freedom.
    ///
    /// Units: per-DOF units/second
    speed: Vec<f64>,

    /// Goal of the current ramp.
    reference: Vec<f64>,

    /// Base of the current ramp.
    prev_reference: Vec<f64>,

    /// Time at which the current ramp started.
    ///
    /// Units: seconds
    start_time: f64,

    started: bool,
    reference_init: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SmoothReferenceTrajectory {
    /// Create a trajectory with the given per-DOF speeds and no preset goal.
    pub fn new(speed: Vec<f64>) -> Self {
        let n = speed.len();
        Self {
            speed,
            reference: vec![0.0; n],
            prev_reference: vec![0.0; n],
            start_time: 0.0,
            started: false,
            reference_init: false,
        }
    }

    /// Create a trajectory with a preset goal, which can then be started with
    /// `start`.
    pub fn with_ref(speed: Vec<f64>, reference: Vec<f64>) -> Self {
        let mut t = Self::new(speed);
        t.reference = reference;
        t.reference_init = true;
        t
    }

    /// Start ramping from `current_pos` towards the preset goal.
    ///
    /// If no goal was preset an error is logged and the trajectory stays
    /// stopped.
    pub fn start(&mut self, current_pos: &[f64], current_time: f64) {
        if !self.reference_init {
            error!("Reference position was not initialised, a goal must be given to start");
            return
        }

        self.started = true;
        self.prev_reference = current_pos.to_vec();
        self.start_time = current_time;
    }

    /// Start ramping from `current_pos` towards `reference`.
    pub fn start_with_ref(&mut self, reference: &[f64], current_pos: &[f64], current_time: f64) {
        self.started = true;
        self.reference_init = true;
        self.reference = reference.to_vec();
        self.prev_reference = current_pos.to_vec();
        self.start_time = current_time;
    }

    /// Change the goal while running, continuing from the current reference.
    pub fn set_ref(&mut self, reference: &[f64], current_time: f64) {
        if !self.started {
            error!("Cannot set the reference of a trajectory before it is started");
            return
        }
        if reference.len() != self.speed.len() {
            error!(
                "Reference has {} degrees of freedom, trajectory has {}",
                reference.len(), self.speed.len()
            );
            return
        }

        self.prev_reference = (0..reference.len())
            .map(|i| self.calculate_smooth_ref(i, current_time))
            .collect();
        self.reference = reference.to_vec();
        self.start_time = current_time;
    }

    /// Reference of one degree of freedom at the given time.
    ///
    /// Returns NaN, and logs an error, if the trajectory has not been started
    /// or `dof` is out of range.
    pub fn calculate_smooth_ref(&self, dof: usize, current_time: f64) -> f64 {
        if !self.started {
            error!("Must start the trajectory before calculating a reference");
            return std::f64::NAN
        }

        let (goal, base, speed) = match (
            self.reference.get(dof),
            self.prev_reference.get(dof),
            self.speed.get(dof),
        ) {
            (Some(g), Some(b), Some(s)) => (*g, *b, *s),
            _ => {
                error!("Trajectory has no degree of freedom {}", dof);
                return std::f64::NAN
            }
        };

        if goal == base {
            return goal
        }

        let progress = (current_time - self.start_time) * speed / (goal - base).abs();

        base + (goal - base) * clamp(&progress, &0.0, &1.0)
    }

    /// References of every degree of freedom at the given time.
    pub fn calculate_smooth_refs(&self, current_time: f64) -> Vec<f64> {
        (0..self.reference.len())
            .map(|i| self.calculate_smooth_ref(i, current_time))
            .collect()
    }

    pub fn stop(&mut self) {
        self.started = false;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Current goal.
    pub fn reference(&self) -> &[f64] {
        &self.reference
    }

    pub fn speed(&self) -> &[f64] {
        &self.speed
    }

    /// Number of degrees of freedom.
    pub fn num_dofs(&self) -> usize {
        self.speed.len()
    }
}
