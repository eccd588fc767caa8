//! # Position sensors

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;

// Internal
use crate::daq::EncoderChannel;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A sensor which measures the position of a single axis.
pub trait PositionSensor {
    fn name(&self) -> &str;

    /// Units: sensor units (radians for rotary encoders)
    fn position(&self) -> f64;

    /// Units: sensor units per second
    fn velocity(&self) -> f64;

    /// Make the current position read as zero.
    fn zero(&mut self);
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Incremental encoder read through a DAQ encoder channel.
#[derive(Debug, Clone)]
pub struct Encoder {
    name: String,
    channel: EncoderChannel,

    /// Units: sensor units/count
    units_per_count: f64,

    /// Count subtracted from the raw count before conversion.
    zero_counts: i64,

    /// Whether the channel provides hardware velocity.
    velocity_enabled: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Encoder {
    pub fn new(
        name: &str, 
        channel: EncoderChannel, 
        units_per_count: f64, 
        velocity_enabled: bool
    ) -> Self {
        Self {
            name: name.to_string(),
            channel,
            units_per_count,
            zero_counts: 0,
            velocity_enabled,
        }
    }

    /// Encoder with one revolution per `counts_per_rev` counts, reading in
    /// radians.
    pub fn rotary(
        name: &str, 
        channel: EncoderChannel, 
        counts_per_rev: f64, 
        velocity_enabled: bool
    ) -> Self {
        Self::new(
            name, 
            channel, 
            2.0 * std::f64::consts::PI / counts_per_rev, 
            velocity_enabled
        )
    }

    pub fn counts(&self) -> i64 {
        self.channel.counts() - self.zero_counts
    }

    pub fn units_per_count(&self) -> f64 {
        self.units_per_count
    }

    pub fn velocity_enabled(&self) -> bool {
        self.velocity_enabled
    }
}

impl PositionSensor for Encoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> f64 {
        self.counts() as f64 * self.units_per_count
    }

    fn velocity(&self) -> f64 {
        if self.velocity_enabled {
            self.channel.rate() * self.units_per_count
        }
        else {
            warn!("Velocity is not enabled on encoder {}, returning 0", self.name);
            0.0
        }
    }

    fn zero(&mut self) {
        self.zero_counts = self.channel.counts();
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::daq::Daq;
    use crate::daq::{VirtualDaq, VirtualDaqParams, PlantParams};

    fn daq() -> VirtualDaq {
        let plant = PlantParams {
            ao_channel: 0,
            torque_per_volt: 1.0,
            inertia: 1.0,
            damping: 0.0,
            counts_per_rad: 1.0,
        };

        let mut daq = VirtualDaq::new("enc_daq", VirtualDaqParams {
            num_analog_inputs: 0,
            num_analog_outputs: 1,
            num_digital_outputs: 0,
            step_s: 0.001,
            plants: vec![plant],
        });
        daq.enable().unwrap();
        daq
    }

    #[test]
    fn test_position_and_zero() {
        let daq = daq();
        let image = daq.image();
        let mut enc = Encoder::rotary("enc", EncoderChannel::new(&daq, 0).unwrap(), 2048.0, true);

        image.borrow_mut().encoder_counts[0] = 512;
        image.borrow_mut().encoder_rates[0] = 1024.0;
        assert!((enc.position() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((enc.velocity() - std::f64::consts::PI).abs() < 1e-12);

        enc.zero();
        assert_eq!(enc.position(), 0.0);

        image.borrow_mut().encoder_counts[0] = 0;
        assert!((enc.position() + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_velocity_disabled_reads_zero() {
        let daq = daq();
        daq.image().borrow_mut().encoder_rates[0] = 100.0;
        let enc = Encoder::new("enc", EncoderChannel::new(&daq, 0).unwrap(), 0.5, false);
        assert_eq!(enc.velocity(), 0.0);
    }
}
