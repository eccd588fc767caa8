//! # Joints
//!
//! A joint pairs a position sensor with an actuator through a transmission,
//! and guards the pair with position, velocity and torque limits. Limit
//! checks only report: they log a warning and return whether the limit was
//! exceeded, leaving the decision to stop to the caller.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod actuator;
mod limiter;
mod pd;
mod sensor;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::{Deserialize, Serialize};

// Internal
pub use actuator::*;
pub use limiter::*;
pub use pd::*;
pub use sensor::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Safety limits of a joint, in joint units.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct JointLimits {
    pub position_min: f64,
    pub position_max: f64,

    /// Absolute velocity limit.
    pub velocity: f64,

    /// Absolute torque limit.
    pub torque: f64,
}

/// A single robot joint.
pub struct Joint {
    name: String,
    sensor: Box<dyn PositionSensor>,
    actuator: Box<dyn Actuator>,

    /// Transmission ratio from the sensor and actuator side to the joint,
    /// so that `q_joint = eta * q_sensor` and `tau_actuator = eta * tau_joint`.
    eta: f64,

    limits: JointLimits,

    /// If true torque commands beyond the torque limit are saturated.
    saturate: bool,

    /// Last commanded joint torque, after saturation.
    torque: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Joint {
    pub fn new(
        name: &str,
        sensor: Box<dyn PositionSensor>,
        actuator: Box<dyn Actuator>,
        eta: f64,
        limits: JointLimits,
        saturate: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            sensor,
            actuator,
            eta,
            limits,
            saturate,
            torque: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    pub fn limits(&self) -> &JointLimits {
        &self.limits
    }

    pub fn enable(&mut self) {
        info!("Enabling joint {}", self.name);
        self.actuator.enable();
    }

    pub fn disable(&mut self) {
        info!("Disabling joint {}", self.name);
        self.torque = 0.0;
        self.actuator.disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.actuator.is_enabled()
    }

    pub fn position(&self) -> f64 {
        self.eta * self.sensor.position()
    }

    pub fn velocity(&self) -> f64 {
        self.eta * self.sensor.velocity()
    }

    /// Zero the joint's sensor at the current position.
    pub fn zero(&mut self) {
        self.sensor.zero();
    }

    /// Command a joint torque, saturating it if this joint saturates.
    pub fn set_torque(&mut self, torque: f64) {
        self.torque = torque;

        if self.saturate && self.torque_limit_exceeded() {
            self.torque = util::maths::saturate(self.torque, self.limits.torque);
            warn!(
                "Joint {} command torque saturated to {}", 
                self.name, self.torque
            );
        }

        self.actuator.set_torque(self.eta * self.torque);
    }

    /// Add to the last commanded torque.
    pub fn add_torque(&mut self, torque: f64) {
        self.set_torque(self.torque + torque);
    }

    /// The last commanded joint torque.
    pub fn torque(&self) -> f64 {
        self.torque
    }

    pub fn position_limit_exceeded(&self) -> bool {
        let position = self.position();

        if position < self.limits.position_min {
            warn!(
                "Joint {} position {:.4} exceeded the min position limit {:.4}",
                self.name, position, self.limits.position_min
            );
            true
        }
        else if position > self.limits.position_max {
            warn!(
                "Joint {} position {:.4} exceeded the max position limit {:.4}",
                self.name, position, self.limits.position_max
            );
            true
        }
        else {
            false
        }
    }

    pub fn velocity_limit_exceeded(&self) -> bool {
        let velocity = self.velocity();

        if velocity.abs() > self.limits.velocity {
            warn!(
                "Joint {} velocity {:.4} exceeded the velocity limit {:.4}",
                self.name, velocity, self.limits.velocity
            );
            true
        }
        else {
            false
        }
    }

    pub fn torque_limit_exceeded(&self) -> bool {
        if self.torque.abs() > self.limits.torque {
            warn!(
                "Joint {} command torque {:.4} exceeded the torque limit {:.4}",
                self.name, self.torque, self.limits.torque
            );
            true
        }
        else {
            false
        }
    }

    /// Check every limit, logging each violation.
    pub fn any_limit_exceeded(&self) -> bool {
        // Evaluate all three so every violation is logged
        let pos = self.position_limit_exceeded();
        let vel = self.velocity_limit_exceeded();
        let trq = self.torque_limit_exceeded();

        pos || vel || trq
    }
}

impl std::fmt::Debug for Joint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joint")
            .field("name", &self.name)
            .field("sensor", &self.sensor.name())
            .field("actuator", &self.actuator.name())
            .field("eta", &self.eta)
            .field("limits", &self.limits)
            .field("torque", &self.torque)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::daq::{AnalogOutput, Daq, EncoderChannel, PlantParams, VirtualDaq, VirtualDaqParams};

    fn joint(saturate: bool) -> (VirtualDaq, Joint) {
        let mut daq = VirtualDaq::new("joint_daq", VirtualDaqParams {
            num_analog_inputs: 0,
            num_analog_outputs: 1,
            num_digital_outputs: 0,
            step_s: 0.001,
            plants: vec![PlantParams {
                ao_channel: 0,
                torque_per_volt: 1.0,
                inertia: 1.0,
                damping: 0.0,
                counts_per_rad: 1000.0,
            }],
        });
        daq.enable().unwrap();

        let enc = Encoder::new("enc", EncoderChannel::new(&daq, 0).unwrap(), 0.001, true);
        let motor = Motor::new(
            "motor", 
            1.0, 
            1.0, 
            Limiter::none(), 
            AnalogOutput::new(&daq, 0).unwrap(), 
            0.001
        );

        let joint = Joint::new(
            "j",
            Box::new(enc),
            Box::new(motor),
            0.5,
            JointLimits {
                position_min: -1.0,
                position_max: 1.0,
                velocity: 2.0,
                torque: 4.0,
            },
            saturate,
        );

        (daq, joint)
    }

    #[test]
    fn test_transmission() {
        let (daq, mut joint) = joint(false);
        joint.enable();

        // 1000 counts = 1 rad on the sensor = 0.5 rad at the joint
        daq.image().borrow_mut().encoder_counts[0] = 1000;
        daq.image().borrow_mut().encoder_rates[0] = 2000.0;
        assert!((joint.position() - 0.5).abs() < 1e-12);
        assert!((joint.velocity() - 1.0).abs() < 1e-12);

        // 2 Nm at the joint is 1 Nm at the motor, 1 A, 1 V
        joint.set_torque(2.0);
        assert!((daq.image().borrow().analog_outputs[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_limits() {
        let (daq, mut joint) = joint(false);
        joint.enable();
        assert!(!joint.any_limit_exceeded());

        daq.image().borrow_mut().encoder_counts[0] = 3000;
        assert!(joint.position_limit_exceeded());
        daq.image().borrow_mut().encoder_counts[0] = -3000;
        assert!(joint.position_limit_exceeded());
        daq.image().borrow_mut().encoder_counts[0] = 0;

        daq.image().borrow_mut().encoder_rates[0] = -5000.0;
        assert!(joint.velocity_limit_exceeded());
        assert!(joint.any_limit_exceeded());
        daq.image().borrow_mut().encoder_rates[0] = 0.0;

        // Without saturation the command passes through but is reported
        joint.set_torque(5.0);
        assert_eq!(joint.torque(), 5.0);
        assert!(joint.torque_limit_exceeded());
    }

    #[test]
    fn test_saturation() {
        let (daq, mut joint) = joint(true);
        joint.enable();
        joint.set_torque(-10.0);
        assert_eq!(joint.torque(), -4.0);
        assert!(!joint.torque_limit_exceeded());
        assert!((daq.image().borrow().analog_outputs[0] + 2.0).abs() < 1e-12);

        joint.add_torque(1.0);
        assert_eq!(joint.torque(), -3.0);
    }
}
