//! # Actuators

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, trace};

// Internal
use super::Limiter;
use crate::daq::AnalogOutput;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Something which produces a torque (or force) on a single axis.
pub trait Actuator {
    fn name(&self) -> &str;

    /// Command a new torque.
    ///
    /// Units: actuator torque units (Newton-meters for motors)
    fn set_torque(&mut self, torque: f64);

    /// The last commanded torque.
    fn torque(&self) -> f64;

    fn enable(&mut self);

    fn disable(&mut self);

    fn is_enabled(&self) -> bool;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// DC motor driven by a current amplifier through an analog output.
///
/// A torque command is converted into a current through the torque constant,
/// limited, and then converted into an amplifier command voltage.
#[derive(Debug, Clone)]
pub struct Motor {
    name: String,

    /// Torque constant.
    ///
    /// Units: Newton-meters/Ampere
    kt: f64,

    /// Amplifier transconductance.
    ///
    /// Units: Amperes/volt
    amp_gain: f64,

    limiter: Limiter,
    output: AnalogOutput,

    /// Time between torque commands, used by the limiter.
    ///
    /// Units: seconds
    step_s: f64,

    enabled: bool,

    /// Units: Newton-meters
    torque: f64,

    /// Units: Amperes
    current: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Motor {
    pub fn new(
        name: &str,
        kt: f64,
        amp_gain: f64,
        limiter: Limiter,
        output: AnalogOutput,
        step_s: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            kt,
            amp_gain,
            limiter,
            output,
            step_s,
            enabled: false,
            torque: 0.0,
            current: 0.0,
        }
    }

    /// Command a current directly, bypassing the torque constant.
    ///
    /// Units: Amperes
    pub fn set_current(&mut self, current: f64) {
        self.current = self.limiter.limit(current, self.step_s);

        let voltage = match self.enabled {
            true => self.current / self.amp_gain,
            false => 0.0
        };
        self.output.set(voltage);

        trace!(
            "{}: {:.4} A requested, {:.4} A limited, {:.4} V", 
            self.name, current, self.current, voltage
        );
    }

    /// The limited current actually commanded.
    ///
    /// Units: Amperes
    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    pub fn kt(&self) -> f64 {
        self.kt
    }

    pub fn amp_gain(&self) -> f64 {
        self.amp_gain
    }
}

impl Actuator for Motor {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_torque(&mut self, torque: f64) {
        self.torque = torque;
        self.set_current(torque / self.kt);
    }

    fn torque(&self) -> f64 {
        self.torque
    }

    fn enable(&mut self) {
        if !self.enabled {
            info!("Enabling motor {}", self.name);
            self.limiter.reset();
            self.enabled = true;
        }
    }

    fn disable(&mut self) {
        if self.enabled {
            info!("Disabling motor {}", self.name);
            self.enabled = false;
            self.torque = 0.0;
            self.current = 0.0;
            self.output.set(0.0);
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
