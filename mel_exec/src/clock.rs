//! # Fixed rate clock
//!
//! The clock provides the control loops with an "ideal" time which advances
//! by exactly one period per tick, independent of how long the work done in
//! each tick actually took. Wall clock time is only used to decide how long
//! `wait()` must block for.
//!
//! Each tick's deadline is measured from the end of the previous tick, so a
//! tick which overruns its period does not shorten the ticks which follow it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Fraction of the remaining tick time that `WaitMode::Hybrid` sleeps for
/// before spinning.
const HYBRID_SLEEP_FRACTION: f64 = 0.9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for constructing a clock.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ClockParams {
    /// Tick frequency.
    ///
    /// Units: Hz
    pub frequency_hz: f64,

    /// Policy used to block until the end of each tick.
    #[serde(default)]
    pub wait_mode: WaitMode,
}

/// A fixed rate tick source.
#[derive(Debug, Clone)]
pub struct Clock {
    frequency_hz: f64,
    period: Duration,
    wait_mode: WaitMode,

    /// Number of completed ticks since `start()`.
    ticks: u64,

    /// Wall clock instant of the last `start()`.
    start_instant: Instant,

    /// Wall clock instant at which the current tick began.
    tick_start: Instant,

    timing: TickTiming,
}

/// Timing breakdown of the last completed tick.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TickTiming {
    /// Time spent working in the tick before `wait()` was called.
    ///
    /// Units: seconds
    pub exec_time_s: f64,

    /// Time spent blocking inside `wait()`.
    ///
    /// Units: seconds
    pub wait_time_s: f64,

    /// Number of ticks whose work exceeded the clock period.
    pub num_overruns: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Policy used by the clock to wait for the end of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    /// Spin on the wall clock. Most accurate, uses a whole core.
    Busy,

    /// Sleep the thread for the remaining time.
    Sleep,

    /// Sleep for most of the remaining time then spin for the rest.
    Hybrid,
}

impl Default for WaitMode {
    fn default() -> Self {
        WaitMode::Busy
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Clock {
    /// Create a new clock ticking at the given frequency.
    ///
    /// A non-positive or non-finite frequency is treated as 1 Hz.
    pub fn new(frequency_hz: f64, wait_mode: WaitMode) -> Self {
        let frequency_hz = if frequency_hz.is_finite() && frequency_hz > 0.0 {
            frequency_hz
        }
        else {
            log::warn!(
                "Invalid clock frequency {} Hz, defaulting to 1 Hz", 
                frequency_hz
            );
            1.0
        };

        let now = Instant::now();

        Self {
            frequency_hz,
            period: Duration::from_secs_f64(1.0 / frequency_hz),
            wait_mode,
            ticks: 0,
            start_instant: now,
            tick_start: now,
            timing: TickTiming::default(),
        }
    }

    /// Create a new clock from parameters.
    pub fn from_params(params: &ClockParams) -> Self {
        Self::new(params.frequency_hz, params.wait_mode)
    }

    /// Reset the tick count and mark the current instant as the start of the
    /// first tick.
    pub fn start(&mut self) {
        let now = Instant::now();

        self.ticks = 0;
        self.start_instant = now;
        self.tick_start = now;
        self.timing = TickTiming::default();
    }

    /// Block until the end of the current tick, then begin the next one.
    ///
    /// If the work in this tick already exceeded the period this returns
    /// immediately and counts an overrun.
    pub fn wait(&mut self) {
        let entered = Instant::now();
        let exec_time = entered - self.tick_start;

        match self.period.checked_sub(exec_time) {
            Some(remaining) => match self.wait_mode {
                WaitMode::Busy => spin_until(self.tick_start + self.period),
                WaitMode::Sleep => thread::sleep(remaining),
                WaitMode::Hybrid => {
                    thread::sleep(remaining.mul_f64(HYBRID_SLEEP_FRACTION));
                    spin_until(self.tick_start + self.period);
                }
            },
            None => {
                self.timing.num_overruns += 1;
                trace!(
                    "Tick {} overran by {:.06} s",
                    self.ticks,
                    (exec_time - self.period).as_secs_f64()
                );
            }
        }

        let now = Instant::now();

        self.timing.exec_time_s = exec_time.as_secs_f64();
        self.timing.wait_time_s = (now - entered).as_secs_f64();
        self.ticks += 1;
        self.tick_start = now;
    }

    /// Ideal elapsed time, the number of ticks multiplied by the period.
    ///
    /// Units: seconds
    pub fn time(&self) -> f64 {
        self.ticks as f64 / self.frequency_hz
    }

    /// Number of ticks completed since `start()`.
    pub fn tick(&self) -> u64 {
        self.ticks
    }

    /// Wall clock time since `start()`.
    ///
    /// Units: seconds
    pub fn elapsed_actual(&self) -> f64 {
        self.start_instant.elapsed().as_secs_f64()
    }

    /// Tick frequency.
    ///
    /// Units: Hz
    pub fn frequency(&self) -> f64 {
        self.frequency_hz
    }

    /// Tick period.
    ///
    /// Units: seconds
    pub fn period(&self) -> f64 {
        1.0 / self.frequency_hz
    }

    pub fn wait_mode(&self) -> WaitMode {
        self.wait_mode
    }

    /// Timing breakdown of the last tick.
    pub fn timing(&self) -> TickTiming {
        self.timing
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn spin_until(deadline: Instant) {
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
