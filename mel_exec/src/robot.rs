//! # Robot
//!
//! A robot is an ordered set of joints. The aggregate only forwards to its
//! joints, so that robot specific types (such as the MAHI Exo-II) can build
//! their own kinematics on top of a uniform joint layer.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;

// Internal
use crate::joint::Joint;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Robot {
    name: String,
    joints: Vec<Joint>,
    enabled: bool,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Anything built around a `Robot`, so generic tasks can drive its joints.
pub trait HasRobot {
    fn robot(&self) -> &Robot;
    fn robot_mut(&mut self) -> &mut Robot;

    fn enable(&mut self) {
        self.robot_mut().enable();
    }

    fn disable(&mut self) {
        self.robot_mut().disable();
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Robot {
    pub fn new(name: &str, joints: Vec<Joint>) -> Self {
        Self {
            name: name.to_string(),
            joints,
            enabled: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enable(&mut self) {
        info!("Enabling robot {}", self.name);
        self.joints.iter_mut().for_each(Joint::enable);
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        info!("Disabling robot {}", self.name);
        self.joints.iter_mut().for_each(Joint::disable);
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    pub fn joint_mut(&mut self, index: usize) -> Option<&mut Joint> {
        self.joints.get_mut(index)
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint_positions(&self) -> Vec<f64> {
        self.joints.iter().map(Joint::position).collect()
    }

    pub fn joint_velocities(&self) -> Vec<f64> {
        self.joints.iter().map(Joint::velocity).collect()
    }

    /// The last commanded joint torques.
    pub fn joint_torques(&self) -> Vec<f64> {
        self.joints.iter().map(Joint::torque).collect()
    }

    /// Command every joint. Extra torques are ignored and missing ones leave
    /// their joints unchanged.
    pub fn set_joint_torques(&mut self, torques: &[f64]) {
        for (joint, &torque) in self.joints.iter_mut().zip(torques.iter()) {
            joint.set_torque(torque);
        }
    }

    pub fn zero_joints(&mut self) {
        self.joints.iter_mut().for_each(Joint::zero);
    }

    // The aggregate checks visit every joint so that each violation is logged

    pub fn any_position_limit_exceeded(&self) -> bool {
        self.joints
            .iter()
            .fold(false, |acc, j| j.position_limit_exceeded() || acc)
    }

    pub fn any_velocity_limit_exceeded(&self) -> bool {
        self.joints
            .iter()
            .fold(false, |acc, j| j.velocity_limit_exceeded() || acc)
    }

    pub fn any_torque_limit_exceeded(&self) -> bool {
        self.joints
            .iter()
            .fold(false, |acc, j| j.torque_limit_exceeded() || acc)
    }

    pub fn any_limit_exceeded(&self) -> bool {
        self.joints
            .iter()
            .fold(false, |acc, j| j.any_limit_exceeded() || acc)
    }
}

impl HasRobot for Robot {
    fn robot(&self) -> &Robot {
        self
    }

    fn robot_mut(&mut self) -> &mut Robot {
        self
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::daq::*;
    use crate::joint::*;

    fn robot() -> (VirtualDaq, Robot) {
        let plant = PlantParams {
            ao_channel: 0,
            torque_per_volt: 1.0,
            inertia: 1.0,
            damping: 0.0,
            counts_per_rad: 1000.0,
        };
        let mut daq = VirtualDaq::new("robot_daq", VirtualDaqParams {
            num_analog_inputs: 0,
            num_analog_outputs: 2,
            num_digital_outputs: 0,
            step_s: 0.001,
            plants: vec![plant, PlantParams { ao_channel: 1, ..plant }],
        });
        daq.enable().unwrap();

        let joints = (0..2)
            .map(|i| {
                Joint::new(
                    &format!("j{}", i),
                    Box::new(Encoder::new(
                        &format!("enc{}", i), 
                        EncoderChannel::new(&daq, i).unwrap(), 
                        0.001, 
                        true
                    )),
                    Box::new(Motor::new(
                        &format!("m{}", i),
                        1.0,
                        1.0,
                        Limiter::none(),
                        AnalogOutput::new(&daq, i).unwrap(),
                        0.001,
                    )),
                    1.0,
                    JointLimits {
                        position_min: -1.0,
                        position_max: 1.0,
                        velocity: 1.0,
                        torque: 1.0,
                    },
                    false,
                )
            })
            .collect();

        (daq, Robot::new("test_robot", joints))
    }

    #[test]
    fn test_aggregates() {
        let (daq, mut robot) = robot();
        robot.enable();
        assert!(robot.is_enabled());
        assert_eq!(robot.num_joints(), 2);

        daq.image().borrow_mut().encoder_counts[1] = 500;
        assert_eq!(robot.joint_positions(), vec![0.0, 0.5]);
        assert!(!robot.any_limit_exceeded());

        robot.set_joint_torques(&[0.5, -2.0]);
        assert_eq!(robot.joint_torques(), vec![0.5, -2.0]);
        assert!(robot.any_torque_limit_exceeded());
        assert!(!robot.any_position_limit_exceeded());
        assert!(robot.any_limit_exceeded());

        daq.image().borrow_mut().encoder_rates[0] = -1500.0;
        assert!(robot.any_velocity_limit_exceeded());

        robot.disable();
        assert_eq!(robot.joint_torques(), vec![0.0, 0.0]);
        assert_eq!(daq.image().borrow().analog_outputs, vec![0.0, 0.0]);
    }

    #[test]
    fn test_closed_loop_on_virtual_plant() {
        let (mut daq, mut robot) = robot();
        robot.enable();
        let mut pd = PdController::new(25.0, 10.0);

        // Critically damped PD drives joint 0 to 0.2 rad within 2 seconds
        for _ in 0..2000 {
            daq.read_all().unwrap();
            let j = robot.joint(0).unwrap();
            let u = pd.calculate(0.2, j.position(), 0.0, j.velocity());
            robot.set_joint_torques(&[u, 0.0]);
            daq.write_all().unwrap();
        }
        daq.read_all().unwrap();

        assert!((robot.joint_positions()[0] - 0.2).abs() < 0.005);
    }
}
