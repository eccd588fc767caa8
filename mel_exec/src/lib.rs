//! # MEL control library
//!
//! Real time control of the MAHI Exo-II upper limb exoskeleton.
//!
//! # Architecture
//!
//! Control runs on a single thread, paced by a fixed rate `Clock`. Work is
//! either organised as a set of `Task`s run by a `Controller` each tick, or as
//! a `StateMachine` whose current state runs each tick. Both stop when their
//! `CancelToken` is set, which the operator's Ctrl-C does.
//!
//! Each control cycle:
//!
//! - reads every DAQ input into the DAQ's image
//! - updates the exoskeleton's kinematics, solving the RPS wrist
//! - checks the joint limits
//! - computes and commands joint torques
//! - writes every DAQ output from the image

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Cooperative cancellation of control loops
pub mod cancel;

/// Fixed rate tick source
pub mod clock;

/// Task controller and generic tasks
pub mod controller;

/// Data acquisition contract and the virtual DAQ
pub mod daq;

/// Smooth position control experiment
pub mod experiment;

/// Joints, sensors, actuators, limiters and PD control
pub mod joint;

/// The MAHI Exo-II
pub mod meii;

/// Executable parameters
pub mod params;

/// Ordered sets of joints
pub mod robot;

/// RPS wrist constraint kinematics
pub mod rps;

/// Clock driven finite state machine
pub mod state_machine;

/// Smooth reference trajectories
pub mod traj;
