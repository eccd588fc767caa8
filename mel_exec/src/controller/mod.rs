//! # Task controller
//!
//! The controller runs a set of registered tasks once per clock tick until
//! either its stop time is reached or its cancel token is set. Tasks are
//! registered independently into three sets:
//!
//! - start tasks, run once before the clock is started
//! - step tasks, run in registration order every tick
//! - stop tasks, run once in reverse registration order after the loop exits
//!
//! Execution is single threaded and cooperative. A step must return before the
//! next step runs, and the cancel token is only checked at the top of each
//! iteration.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod task;
pub mod tasks;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

// Internal
pub use task::*;
use crate::cancel::CancelToken;
use crate::clock::Clock;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Runs tasks at the rate of its clock.
pub struct Controller {
    clock: Clock,
    token: CancelToken,

    start_tasks: Vec<TaskRef>,
    step_tasks: Vec<TaskRef>,
    stop_tasks: Vec<TaskRef>,
}

/// Summary of one call to `Controller::execute`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExecReport {
    /// Number of ticks executed.
    pub ticks: u64,

    /// Ideal time when the loop exited.
    ///
    /// Units: seconds
    pub ideal_time_s: f64,

    /// Wall clock time when the loop exited.
    ///
    /// Units: seconds
    pub actual_time_s: f64,

    /// Number of ticks which overran the clock period.
    pub num_overruns: u64,

    /// True if the loop was ended by the operator interrupt.
    pub interrupted: bool,

    /// True if the loop was ended by a stop request.
    pub stop_requested: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Controller {
    /// Create a new controller which owns the given clock and polls the given
    /// token.
    pub fn new(clock: Clock, token: CancelToken) -> Self {
        Self {
            clock,
            token,
            start_tasks: Vec::new(),
            step_tasks: Vec::new(),
            stop_tasks: Vec::new(),
        }
    }

    /// Queue a task into the start, step, and stop sets.
    pub fn queue_task(&mut self, task: TaskRef) {
        self.queue_start_task(task.clone());
        self.queue_step_task(task.clone());
        self.queue_stop_task(task);
    }

    /// Queue a task to run only once when execution starts.
    pub fn queue_start_task(&mut self, task: TaskRef) {
        self.start_tasks.push(task);
    }

    /// Queue a task to run every tick.
    pub fn queue_step_task(&mut self, task: TaskRef) {
        self.step_tasks.push(task);
    }

    /// Queue a task to run only once when execution stops.
    pub fn queue_stop_task(&mut self, task: TaskRef) {
        self.stop_tasks.push(task);
    }

    /// Convenience for wrapping a task and queuing it into all three sets.
    ///
    /// Returns the shared handle so the caller can inspect the task later.
    pub fn add<T: Task + 'static>(&mut self, task: T) -> Rc<RefCell<T>> {
        let t = Rc::new(RefCell::new(task));
        self.queue_task(t.clone());
        t
    }

    /// The controller's clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The controller's cancel token.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Run the tasks until ideal time exceeds `stop_time_s` or the cancel
    /// token is set.
    ///
    /// The token's flags are cleared before returning so the controller can
    /// be executed again.
    pub fn execute(&mut self, stop_time_s: f64) -> ExecReport {
        info!(
            "Executing controller at {} Hz with {} start, {} step, {} stop tasks",
            self.clock.frequency(),
            self.start_tasks.len(),
            self.step_tasks.len(),
            self.stop_tasks.len()
        );

        for task in self.start_tasks.iter() {
            let mut t = task.borrow_mut();
            debug!("Starting task {}", t.name());
            t.start(&self.clock);
        }

        self.clock.start();

        while !self.token.is_cancelled() && self.clock.time() <= stop_time_s {
            for task in self.step_tasks.iter() {
                task.borrow_mut().step(&self.clock);
            }
            self.clock.wait();
        }

        let report = ExecReport {
            ticks: self.clock.tick(),
            ideal_time_s: self.clock.time(),
            actual_time_s: self.clock.elapsed_actual(),
            num_overruns: self.clock.timing().num_overruns,
            interrupted: self.token.is_interrupted(),
            stop_requested: self.token.is_stop_requested(),
        };

        if report.interrupted {
            warn!("Controller interrupted at {:.03} s", report.ideal_time_s);
        }

        for task in self.stop_tasks.iter().rev() {
            let mut t = task.borrow_mut();
            debug!("Stopping task {}", t.name());
            t.stop(&self.clock);
        }

        self.token.reset();

        info!(
            "Controller finished after {} ticks ({:.03} s ideal, {:.03} s actual, {} overruns)",
            report.ticks,
            report.ideal_time_s,
            report.actual_time_s,
            report.num_overruns
        );

        report
    }
}
