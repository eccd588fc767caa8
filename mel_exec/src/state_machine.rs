//! # State machine executor
//!
//! A state machine is a fixed table of named states, each a handler closure.
//! The executor invokes the current state's handler once per clock tick.
//! Handlers request a transition by calling `StateContext::event`, optionally
//! attaching a payload. The transition takes effect on the next iteration,
//! after the requesting handler has returned, and the payload is handed to the
//! new state's handler exactly once.
//!
//! Handlers commonly run their own inner loop over several ticks (read, update
//! kinematics, control, write, check exit condition), waiting on the clock
//! through the context, and only request a transition once that phase is
//! complete. A handler which instead does one cycle of work per call asks to
//! be called again on the next tick with `StateContext::stay`.
//!
//! Execution ends when a handler returns without requesting a transition or
//! calling `stay`, when the ideal time passes the stop time, or when the
//! cancel token is set. If the operator interrupted execution the optional
//! interrupt handler is run before returning. A transition to a state index
//! which is not in the table is an error and ends execution before anything
//! is dispatched to it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{error, info, warn};
use serde::Serialize;
use thiserror::Error;

// Internal
use crate::cancel::CancelToken;
use crate::clock::Clock;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handler invoked for a state. Receives the transition context, the user
/// context, and the payload of the event which entered this state (only on
/// the first invocation after the transition).
pub type StateFn<C, P> = Box<dyn FnMut(&mut StateContext<'_, P>, &mut C, Option<P>)>;

/// Handler invoked when execution is ended by an operator interrupt.
pub type InterruptFn<C> = Box<dyn FnMut(&mut C)>;

/// A finite state machine driven by a clock.
///
/// `C` is the context shared by all states (e.g. the robot and the DAQ) and
/// `P` is the sum type of payloads which can accompany a transition.
pub struct StateMachine<C, P = ()> {
    name: String,
    states: Vec<State<C, P>>,
    initial_state: usize,
    clock: Clock,
    token: CancelToken,
    interrupt_handler: Option<InterruptFn<C>>,
}

struct State<C, P> {
    name: String,
    handler: StateFn<C, P>,
}

/// A requested transition.
#[derive(Debug)]
struct Transition<P> {
    state: usize,
    data: Option<P>,
}

/// View of the executor given to a state's handler.
pub struct StateContext<'a, P> {
    clock: &'a mut Clock,
    token: &'a CancelToken,
    current_state: usize,
    pending: &'a mut Option<Transition<P>>,
    stay: &'a mut bool,
}

/// Summary of one call to `StateMachine::execute`.
#[derive(Debug, Clone, Serialize)]
pub struct StateMachineReport {
    /// Every state entered, in order, starting with the initial state.
    pub visited: Vec<usize>,

    /// State which was current when execution ended.
    pub final_state: usize,

    /// Ideal time when execution ended.
    ///
    /// Units: seconds
    pub ideal_time_s: f64,

    /// True if execution was ended by the operator interrupt.
    pub interrupted: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can end state machine execution.
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("State machine {0} has no states")]
    NoStates(String),

    #[error(
        "Invalid state {requested} requested from state {from:?} \
        (machine has {num_states} states)"
    )]
    InvalidState {
        requested: usize,
        from: Option<usize>,
        num_states: usize,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<C, P> StateMachine<C, P> {
    /// Create a new state machine with no states.
    ///
    /// States are indexed in the order they are added, starting at zero.
    pub fn new(name: &str, clock: Clock, token: CancelToken, initial_state: usize) -> Self {
        Self {
            name: name.to_string(),
            states: Vec::new(),
            initial_state,
            clock,
            token,
            interrupt_handler: None,
        }
    }

    /// Add a state to the table, returning its index.
    pub fn add_state<F>(&mut self, name: &str, handler: F) -> usize
    where
        F: FnMut(&mut StateContext<'_, P>, &mut C, Option<P>) + 'static,
    {
        self.states.push(State {
            name: name.to_string(),
            handler: Box::new(handler),
        });
        self.states.len() - 1
    }

    /// Set the handler run when execution is interrupted by the operator.
    pub fn set_interrupt_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut C) + 'static,
    {
        self.interrupt_handler = Some(Box::new(handler));
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Name of the state at the given index, if it exists.
    pub fn state_name(&self, index: usize) -> Option<&str> {
        self.states.get(index).map(|s| s.name.as_str())
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Run the machine from its initial state until a handler returns with
    /// nothing left to do, the ideal time exceeds `stop_time_s`, or the cancel
    /// token is set.
    pub fn execute(
        &mut self, 
        ctx: &mut C, 
        stop_time_s: f64
    ) -> Result<StateMachineReport, StateMachineError> {
        if self.states.is_empty() {
            return Err(StateMachineError::NoStates(self.name.clone()))
        }

        info!("Executing state machine {}", self.name);

        let mut visited = Vec::new();
        let mut current_state = self.initial_state;
        let mut pending = Some(Transition {
            state: self.initial_state,
            data: None,
        });
        let mut from = None;
        let mut stay = false;
        let mut result = Ok(());

        self.clock.start();

        while !self.token.is_cancelled() && self.clock.time() <= stop_time_s {
            let mut data = None;

            if let Some(t) = pending.take() {
                if t.state >= self.states.len() {
                    error!("Invalid state {} requested in {}", t.state, self.name);
                    result = Err(StateMachineError::InvalidState {
                        requested: t.state,
                        from,
                        num_states: self.states.len(),
                    });
                    break
                }

                info!(
                    "{}: entering state {} ({})", 
                    self.name, 
                    t.state, 
                    self.states[t.state].name
                );

                current_state = t.state;
                from = Some(t.state);
                visited.push(t.state);
                data = t.data;
            }
            else if !stay {
                info!("{}: state {} requested no transition", self.name, current_state);
                break
            }

            stay = false;

            let mut sc = StateContext {
                clock: &mut self.clock,
                token: &self.token,
                current_state,
                pending: &mut pending,
                stay: &mut stay,
            };
            (self.states[current_state].handler)(&mut sc, ctx, data);

            self.clock.wait();
        }

        let report = StateMachineReport {
            visited,
            final_state: current_state,
            ideal_time_s: self.clock.time(),
            interrupted: self.token.is_interrupted(),
        };

        if report.interrupted {
            warn!("{} interrupted in state {}", self.name, current_state);
            if let Some(ref mut handler) = self.interrupt_handler {
                handler(ctx);
            }
        }

        self.token.reset();

        info!(
            "State machine {} finished in state {} at {:.03} s", 
            self.name, 
            report.final_state, 
            report.ideal_time_s
        );

        result.map(|_| report)
    }
}

impl<'a, P> StateContext<'a, P> {
    /// Request a transition to `state` once the current handler returns.
    ///
    /// Only the last request made during one invocation takes effect.
    pub fn event(&mut self, state: usize, data: Option<P>) {
        if self.pending.is_some() {
            warn!("Overwriting a pending event from state {}", self.current_state);
        }
        *self.pending = Some(Transition { state, data });
    }

    /// Ask to be called again on the next tick without a transition.
    ///
    /// A transition requested during the same invocation takes precedence.
    pub fn stay(&mut self) {
        *self.stay = true;
    }

    /// Request a transition without a payload.
    pub fn goto(&mut self, state: usize) {
        self.event(state, None);
    }

    /// Index of the state currently executing.
    pub fn current_state(&self) -> usize {
        self.current_state
    }

    /// True if a transition has been requested during this invocation.
    pub fn event_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn clock(&self) -> &Clock {
        self.clock
    }

    /// Mutable access to the clock, for phases which restart it.
    pub fn clock_mut(&mut self) -> &mut Clock {
        self.clock
    }

    /// Wait for the next clock tick, for handlers running an inner loop.
    pub fn wait(&mut self) {
        self.clock.wait();
    }

    /// Ideal time of the machine's clock.
    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn token(&self) -> &CancelToken {
        self.token
    }

    /// True if the machine should stop; inner loops must poll this.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Ask the machine to stop after the current handler returns.
    pub fn request_stop(&self) {
        self.token.request_stop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::WaitMode;

    #[derive(Debug, PartialEq)]
    enum Payload {
        Goal(f64),
    }

    fn clock() -> Clock {
        Clock::new(1000.0, WaitMode::Busy)
    }

    #[test]
    fn test_three_state_sequence() {
        let mut sm: StateMachine<Vec<usize>> = 
            StateMachine::new("seq", clock(), CancelToken::new(), 0);

        sm.add_state("zero", |sc, log: &mut Vec<usize>, _| {
            log.push(0);
            sc.goto(1);
        });
        sm.add_state("one", |sc, log: &mut Vec<usize>, _| {
            log.push(1);
            sc.goto(2);
        });
        sm.add_state("two", |sc, log: &mut Vec<usize>, _| {
            log.push(2);
            sc.request_stop();
        });

        let mut log = Vec::new();
        let report = sm.execute(&mut log, 10.0).unwrap();

        assert_eq!(log, vec![0, 1, 2]);
        assert_eq!(report.visited, vec![0, 1, 2]);
        assert_eq!(report.final_state, 2);
        assert!(!report.interrupted);
        assert!(!sm.token().is_cancelled());
    }

    #[test]
    fn test_payload_delivered_once() {
        let mut sm: StateMachine<Vec<Option<Payload>>, Payload> = 
            StateMachine::new("payload", clock(), CancelToken::new(), 0);

        sm.add_state("send", |sc, _log: &mut Vec<Option<Payload>>, _| {
            sc.event(1, Some(Payload::Goal(0.5)));
        });
        sm.add_state("recv", |sc, log: &mut Vec<Option<Payload>>, data| {
            log.push(data);
            if log.len() < 3 {
                sc.stay();
            }
        });

        let mut log = Vec::new();
        sm.execute(&mut log, 10.0).unwrap();

        assert_eq!(log, vec![Some(Payload::Goal(0.5)), None, None]);
    }

    #[test]
    fn test_no_transition_ends_execution() {
        let mut sm: StateMachine<u64> = 
            StateMachine::new("once", clock(), CancelToken::new(), 0);

        sm.add_state("count", |_, n: &mut u64, _| *n += 1);

        let mut n = 0;
        let report = sm.execute(&mut n, 0.05).unwrap();

        assert_eq!(n, 1);
        assert_eq!(report.visited, vec![0]);
        assert_eq!(report.final_state, 0);
        assert!(report.ideal_time_s < 0.01);
    }

    #[test]
    fn test_stay_repeats_each_tick_until_time_bound() {
        let mut sm: StateMachine<u64> = 
            StateMachine::new("repeat", clock(), CancelToken::new(), 0);

        sm.add_state("count", |sc, n: &mut u64, _| {
            *n += 1;
            sc.stay();
        });

        let mut n = 0;
        let report = sm.execute(&mut n, 0.01).unwrap();

        assert!(n >= 10 && n <= 11, "n = {}", n);
        assert_eq!(report.visited, vec![0]);
    }

    #[test]
    fn test_event_overrides_stay() {
        let mut sm: StateMachine<Vec<usize>> = 
            StateMachine::new("override", clock(), CancelToken::new(), 0);

        sm.add_state("zero", |sc, log: &mut Vec<usize>, _| {
            log.push(0);
            sc.stay();
            sc.goto(1);
        });
        sm.add_state("one", |_, log: &mut Vec<usize>, _| log.push(1));

        let mut log = Vec::new();
        let report = sm.execute(&mut log, 1.0).unwrap();

        assert_eq!(log, vec![0, 1]);
        assert_eq!(report.visited, vec![0, 1]);
    }

    #[test]
    fn test_invalid_state_fails_fast() {
        let mut sm: StateMachine<Vec<usize>> = 
            StateMachine::new("bad", clock(), CancelToken::new(), 0);

        sm.add_state("zero", |sc, log: &mut Vec<usize>, _| {
            log.push(0);
            sc.goto(7);
        });

        let mut log = Vec::new();
        let res = sm.execute(&mut log, 1.0);

        assert_eq!(log, vec![0]);
        assert!(matches!(
            res,
            Err(StateMachineError::InvalidState { requested: 7, from: Some(0), num_states: 1 })
        ));
    }

    #[test]
    fn test_invalid_initial_state_and_empty_machine() {
        let mut empty: StateMachine<()> = 
            StateMachine::new("empty", clock(), CancelToken::new(), 0);
        assert!(matches!(
            empty.execute(&mut (), 1.0), 
            Err(StateMachineError::NoStates(_))
        ));

        let mut sm: StateMachine<()> = 
            StateMachine::new("init", clock(), CancelToken::new(), 3);
        sm.add_state("only", |_, _, _| panic!("must not be dispatched"));
        assert!(matches!(
            sm.execute(&mut (), 1.0),
            Err(StateMachineError::InvalidState { requested: 3, from: None, .. })
        ));
    }

    #[test]
    fn test_interrupt_runs_handler_and_resets() {
        let token = CancelToken::new();
        let mut sm: StateMachine<(u32, bool)> = 
            StateMachine::new("intr", clock(), token.clone(), 0);

        sm.add_state("loop", |sc, ctx: &mut (u32, bool), _| {
            ctx.0 += 1;
            if ctx.0 == 5 {
                sc.token().interrupt();
            }
            sc.stay();
        });
        sm.set_interrupt_handler(|ctx: &mut (u32, bool)| ctx.1 = true);

        let mut ctx = (0, false);
        let report = sm.execute(&mut ctx, 10.0).unwrap();

        assert_eq!(ctx, (5, true));
        assert!(report.interrupted);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_inner_loop_waits_on_clock() {
        let mut sm: StateMachine<Vec<u64>> = 
            StateMachine::new("inner", clock(), CancelToken::new(), 0);

        sm.add_state("phase", |sc, ticks: &mut Vec<u64>, _| {
            while !sc.is_cancelled() && sc.time() < 0.004 {
                ticks.push(sc.clock().tick());
                sc.wait();
            }
            sc.request_stop();
        });

        let mut ticks = Vec::new();
        sm.execute(&mut ticks, 1.0).unwrap();

        assert_eq!(ticks, vec![0, 1, 2, 3]);
    }
}
