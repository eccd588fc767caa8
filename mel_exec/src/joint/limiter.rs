//! # Command limiter
//!
//! Limits an actuator command either by simple saturation or by an I²T
//! accumulator, which allows the peak limit for a bounded time before falling
//! back to the continuous limit.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
use util::maths::clamp;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Limits a stream of commands.
#[derive(Debug, Clone, Serialize)]
pub struct Limiter {
    mode: LimiterMode,

    /// Integral of the squared excess of the output over the continuous
    /// limit.
    accumulator: f64,

    /// The last limited output.
    limited_value: f64,

    /// True if the last output differed from its input.
    exceeded: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Limiting policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum LimiterMode {
    /// Pass every command through unchanged.
    None,

    /// Clamp every command into `[min, max]`.
    Saturate { min: f64, max: f64 },

    /// I²T limiting.
    ///
    /// Commands are clamped to `±peak` until the accumulator passes
    /// `setpoint`, then to `±continuous` until it drains again.
    Accumulate {
        continuous: f64,
        peak: f64,
        setpoint: f64,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Limiter {
    /// A limiter which never limits.
    pub fn none() -> Self {
        Self::with_mode(LimiterMode::None)
    }

    /// Symmetric saturation at `±abs_limit`.
    pub fn saturate(abs_limit: f64) -> Self {
        Self::saturate_range(-abs_limit.abs(), abs_limit.abs())
    }

    pub fn saturate_range(min: f64, max: f64) -> Self {
        Self::with_mode(LimiterMode::Saturate { min, max })
    }

    /// I²T limiter allowing `peak` for roughly `time_limit_s` seconds before
    /// falling back to `continuous`.
    pub fn accumulate(continuous: f64, peak: f64, time_limit_s: f64) -> Self {
        let continuous = continuous.abs();
        let peak = peak.abs();

        Self::with_mode(LimiterMode::Accumulate {
            continuous,
            peak,
            setpoint: (peak * peak - continuous * continuous) * time_limit_s,
        })
    }

    fn with_mode(mode: LimiterMode) -> Self {
        Self {
            mode,
            accumulator: 0.0,
            limited_value: 0.0,
            exceeded: false,
        }
    }

    /// Limit a new command.
    ///
    /// `dt_s` is the time since the previous command, which only the
    /// accumulating mode uses.
    pub fn limit(&mut self, unlimited: f64, dt_s: f64) -> f64 {
        self.limited_value = match self.mode {
            LimiterMode::None => unlimited,
            LimiterMode::Saturate { min, max } => clamp(&unlimited, &min, &max),
            LimiterMode::Accumulate {
                continuous,
                peak,
                setpoint,
            } => {
                // Integrate the previous output, which is what actually
                // flowed for the last dt
                self.accumulator += (self.limited_value.powi(2) - continuous.powi(2)) * dt_s;
                self.accumulator = self.accumulator.max(0.0);

                if self.accumulator > setpoint {
                    clamp(&unlimited, &-continuous, &continuous)
                }
                else {
                    clamp(&unlimited, &-peak, &peak)
                }
            }
        };

        self.exceeded = self.limited_value != unlimited;
        self.limited_value
    }

    /// Clear the accumulator.
    pub fn reset(&mut self) {
        self.accumulator = 0.0;
        self.limited_value = 0.0;
        self.exceeded = false;
    }

    pub fn mode(&self) -> LimiterMode {
        self.mode
    }

    pub fn exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn limited_value(&self) -> f64 {
        self.limited_value
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
