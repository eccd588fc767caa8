//! Task interface

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::rc::Rc;

use crate::clock::Clock;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A unit of work executed by a `Controller`.
///
/// Every callback receives a read only view of the controller's clock. All
/// callbacks default to doing nothing, so a task only implements the phases
/// it takes part in.
pub trait Task {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called once before the controller's clock is started.
    fn start(&mut self, _clock: &Clock) {}

    /// Called once per tick.
    fn step(&mut self, _clock: &Clock) {}

    /// Called once after the loop exits.
    fn stop(&mut self, _clock: &Clock) {}
}

/// Shared handle to a task, so one task can sit in several task sets.
pub type TaskRef = Rc<RefCell<dyn Task>>;
