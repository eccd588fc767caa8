//! # Virtual DAQ
//!
//! A software DAQ which stands in for real hardware. Every encoder channel is
//! attached to a damped rigid body driven by one analog output, so that closed
//! loop controllers can be exercised without a robot. Analog inputs are
//! scripted by the caller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use serde::Deserialize;

// Internal
use super::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the simulated plant attached to one encoder channel.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PlantParams {
    /// Analog output channel which drives this plant.
    pub ao_channel: usize,

    /// Torque produced per volt of drive.
    ///
    /// Units: Newton-meters/volt
    pub torque_per_volt: f64,

    /// Units: kilogram-meters^2
    pub inertia: f64,

    /// Viscous damping.
    ///
    /// Units: Newton-meter-seconds/radian
    pub damping: f64,

    /// Units: counts/radian
    pub counts_per_rad: f64,
}

/// Parameters of a virtual DAQ.
#[derive(Debug, Clone, Deserialize)]
pub struct VirtualDaqParams {
    pub num_analog_inputs: usize,
    pub num_analog_outputs: usize,
    pub num_digital_outputs: usize,

    /// Integration step, normally the control clock period.
    ///
    /// Units: seconds
    pub step_s: f64,

    /// One plant per encoder channel.
    pub plants: Vec<PlantParams>,
}

/// A DAQ whose inputs are produced by a simulation.
pub struct VirtualDaq {
    name: String,
    params: VirtualDaqParams,
    image: SharedImage,
    enabled: bool,

    /// Plant angles.
    ///
    /// Units: radians
    angles: Vec<f64>,

    /// Units: radians/second
    rates: Vec<f64>,

    /// Count offsets applied by `zero_encoders`.
    offsets: Vec<i64>,

    /// Values the analog inputs will read on the next `read_all`.
    ///
    /// Units: volts
    scripted_inputs: Vec<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VirtualDaq {
    pub fn new(name: &str, params: VirtualDaqParams) -> Self {
        let num_enc = params.plants.len();
        let image = DaqImage::new(
            num_enc,
            params.num_analog_inputs,
            params.num_analog_outputs,
            params.num_digital_outputs,
        )
        .shared();

        Self {
            name: name.to_string(),
            image,
            enabled: false,
            angles: vec![0.0; num_enc],
            rates: vec![0.0; num_enc],
            offsets: vec![0; num_enc],
            scripted_inputs: vec![0.0; params.num_analog_inputs],
            params,
        }
    }

    /// Place the plant on an encoder channel at the given angle, at rest.
    pub fn set_plant_angle(&mut self, channel: usize, angle_rad: f64) -> Result<(), DaqError> {
        self.check(channel, "encoder", self.angles.len())?;
        self.angles[channel] = angle_rad;
        self.rates[channel] = 0.0;
        Ok(())
    }

    /// Units: radians
    pub fn plant_angle(&self, channel: usize) -> Option<f64> {
        self.angles.get(channel).copied()
    }

    /// Set the voltage an analog input will read from the next `read_all`.
    pub fn set_analog_input(&mut self, channel: usize, voltage: f64) -> Result<(), DaqError> {
        self.check(channel, "analog input", self.scripted_inputs.len())?;
        self.scripted_inputs[channel] = voltage;
        Ok(())
    }

    /// Advance every plant by one integration step using the current analog
    /// output voltages.
    fn step_plants(&mut self) {
        let dt = self.params.step_s;
        let image = self.image.borrow();

        for (i, plant) in self.params.plants.iter().enumerate() {
            let voltage = image
                .analog_outputs
                .get(plant.ao_channel)
                .copied()
                .unwrap_or(0.0);

            let torque = plant.torque_per_volt * voltage - plant.damping * self.rates[i];

            // Semi-implicit Euler, stable for the stiff PD loops used here
            self.rates[i] += dt * torque / plant.inertia;
            self.angles[i] += dt * self.rates[i];
        }
    }

    fn raw_counts(&self, channel: usize) -> i64 {
        (self.angles[channel] * self.params.plants[channel].counts_per_rad).round() as i64
    }

    fn check(&self, channel: usize, kind: &'static str, count: usize) -> Result<(), DaqError> {
        if channel < count {
            Ok(())
        }
        else {
            Err(DaqError::NoSuchChannel {
                daq: self.name.clone(),
                kind,
                channel,
            })
        }
    }

    fn check_enabled(&self) -> Result<(), DaqError> {
        if self.enabled {
            Ok(())
        }
        else {
            Err(DaqError::NotEnabled(self.name.clone()))
        }
    }
}

impl Daq for VirtualDaq {
    fn name(&self) -> &str {
        &self.name
    }

    fn image(&self) -> SharedImage {
        self.image.clone()
    }

    fn enable(&mut self) -> Result<(), DaqError> {
        if !self.enabled {
            info!("Enabling virtual DAQ {}", self.name);
            self.enabled = true;
        }
        Ok(())
    }

    fn disable(&mut self) -> Result<(), DaqError> {
        if self.enabled {
            info!("Disabling virtual DAQ {}", self.name);

            // Outputs return to a safe state on disable
            {
                let mut image = self.image.borrow_mut();
                image.analog_outputs.iter_mut().for_each(|v| *v = 0.0);
                image.digital_outputs.iter_mut().for_each(|d| *d = false);
            }

            self.enabled = false;
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn read_all(&mut self) -> Result<(), DaqError> {
        self.check_enabled()?;

        let counts: Vec<i64> = (0..self.angles.len())
            .map(|i| self.raw_counts(i) - self.offsets[i])
            .collect();

        let mut image = self.image.borrow_mut();
        for (i, c) in counts.into_iter().enumerate() {
            image.encoder_counts[i] = c;
            image.encoder_rates[i] = self.rates[i] * self.params.plants[i].counts_per_rad;
        }
        image.analog_inputs.copy_from_slice(&self.scripted_inputs);

        Ok(())
    }

    fn write_all(&mut self) -> Result<(), DaqError> {
        self.check_enabled()?;
        self.step_plants();
        Ok(())
    }

    fn zero_encoders(&mut self) -> Result<(), DaqError> {
        self.check_enabled()?;
        debug!("Zeroing encoders on {}", self.name);

        for i in 0..self.angles.len() {
            self.offsets[i] = self.raw_counts(i);
        }
        self.image.borrow_mut().encoder_counts.iter_mut().for_each(|c| *c = 0);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn single_plant() -> VirtualDaq {
        VirtualDaq::new(
            "test_daq",
            VirtualDaqParams {
                num_analog_inputs: 2,
                num_analog_outputs: 1,
                num_digital_outputs: 1,
                step_s: 0.001,
                plants: vec![PlantParams {
                    ao_channel: 0,
                    torque_per_volt: 1.0,
                    inertia: 1.0,
                    damping: 0.0,
                    counts_per_rad: 1000.0,
                }],
            },
        )
    }

    #[test]
    fn test_requires_enable() {
        let mut daq = single_plant();
        assert!(matches!(daq.read_all(), Err(DaqError::NotEnabled(_))));
        assert!(matches!(daq.write_all(), Err(DaqError::NotEnabled(_))));

        daq.enable().unwrap();
        assert!(daq.read_all().is_ok());
    }

    #[test]
    fn test_plant_responds_to_output() {
        let mut daq = single_plant();
        daq.enable().unwrap();

        let ao = AnalogOutput::new(&daq, 0).unwrap();
        let enc = EncoderChannel::new(&daq, 0).unwrap();

        // Constant unit torque on unit inertia for one second
        ao.set(1.0);
        for _ in 0..1000 {
            daq.write_all().unwrap();
        }
        daq.read_all().unwrap();

        // x = t^2 / 2 = 0.5 rad, v = 1 rad/s
        assert!((enc.counts() - 500).abs() <= 1);
        assert!((enc.rate() - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_encoders() {
        let mut daq = single_plant();
        daq.set_plant_angle(0, 0.25).unwrap();
        daq.enable().unwrap();
        daq.read_all().unwrap();

        let enc = EncoderChannel::new(&daq, 0).unwrap();
        assert_eq!(enc.counts(), 250);

        daq.zero_encoders().unwrap();
        daq.read_all().unwrap();
        assert_eq!(enc.counts(), 0);
    }

    #[test]
    fn test_scripted_inputs_and_channels() {
        let mut daq = single_plant();
        daq.enable().unwrap();
        daq.set_analog_input(1, 2.5).unwrap();
        assert!(daq.set_analog_input(2, 1.0).is_err());
        daq.read_all().unwrap();

        let ai = AnalogInput::new(&daq, 1).unwrap();
        assert_eq!(ai.get(), 2.5);

        assert!(AnalogOutput::new(&daq, 1).is_err());
        assert!(EncoderChannel::new(&daq, 3).is_err());
    }

    #[test]
    fn test_disable_zeroes_outputs() {
        let mut daq = single_plant();
        daq.enable().unwrap();
        let ao = AnalogOutput::new(&daq, 0).unwrap();
        let dout = DigitalOutput::new(&daq, 0).unwrap();
        ao.set(3.0);
        dout.set(true);

        daq.disable().unwrap();
        assert_eq!(ao.get(), 0.0);
        assert!(!dout.get());
    }
}
