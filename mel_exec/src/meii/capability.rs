//! Optional sensing capabilities of the MAHI Exo-II
//!
//! An exoskeleton may carry surface EMG electrodes, a six axis force/torque
//! sensor, both or neither. Which are present is fixed when the exoskeleton
//! is built, and each is reached through its own trait so that code needing
//! one capability need not know about the other.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use nalgebra::{Matrix6, Vector3, Vector6};
use serde::Deserialize;

// Internal
use crate::daq::{AnalogInput, Daq, DaqError};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of strain gauge channels on a force/torque sensor.
pub const NUM_FT_CHANNELS: usize = 6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Capabilities to build an exoskeleton with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeiiCapabilities {
    /// Analog input channels with EMG electrodes attached.
    #[serde(default)]
    pub emg_channels: Option<Vec<usize>>,

    #[serde(default)]
    pub force_sensor: Option<ForceSensorParams>,
}

/// Parameters of a six axis force/torque sensor.
#[derive(Debug, Clone, Deserialize)]
pub struct ForceSensorParams {
    /// Analog input channels of the six strain gauges, in calibration order.
    pub channels: [usize; NUM_FT_CHANNELS],

    /// Rows map gauge voltages onto Fx, Fy, Fz, Tx, Ty and Tz.
    ///
    /// Units: Newtons/volt (rows 0-2), Newton-meters/volt (rows 3-5)
    pub calibration: [[f64; NUM_FT_CHANNELS]; NUM_FT_CHANNELS],
}

/// A set of surface EMG electrodes.
#[derive(Debug, Clone)]
pub struct EmgModule {
    inputs: Vec<AnalogInput>,

    /// Voltages removed from the raw signals.
    ///
    /// Units: volts
    bias: Vec<f64>,

    /// Magnitude beyond which a raw voltage is reported as suspect.
    ///
    /// Units: volts
    voltage_max: f64,
}

/// A six axis force/torque sensor read through strain gauge voltages.
#[derive(Debug, Clone)]
pub struct ForceSensor {
    inputs: Vec<AnalogInput>,
    calibration: Matrix6<f64>,

    /// Units: volts
    bias: Vector6<f64>,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Access to a robot's EMG electrodes, if it has any.
pub trait HasEmg {
    fn emg(&self) -> Option<&EmgModule>;
    fn emg_mut(&mut self) -> Option<&mut EmgModule>;
}

/// Access to a robot's force/torque sensor, if it has one.
pub trait HasForceSensor {
    fn force_sensor(&self) -> Option<&ForceSensor>;
    fn force_sensor_mut(&mut self) -> Option<&mut ForceSensor>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl EmgModule {
    /// Default bound on a raw electrode voltage.
    ///
    /// Units: volts
    pub const DEFAULT_VOLTAGE_MAX: f64 = 10.0;

    pub fn new(daq: &dyn Daq, channels: &[usize]) -> Result<Self, DaqError> {
        let inputs = channels
            .iter()
            .map(|&c| AnalogInput::new(daq, c))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            bias: vec![0.0; inputs.len()],
            inputs,
            voltage_max: Self::DEFAULT_VOLTAGE_MAX,
        })
    }

    pub fn num_channels(&self) -> usize {
        self.inputs.len()
    }

    /// DAQ channel numbers of the electrodes.
    pub fn channel_numbers(&self) -> Vec<usize> {
        self.inputs.iter().map(|i| i.channel()).collect()
    }

    pub fn set_voltage_max(&mut self, voltage_max: f64) {
        self.voltage_max = voltage_max.abs();
    }

    /// Raw electrode voltages as of the last DAQ read.
    ///
    /// Units: volts
    pub fn raw_voltages(&self) -> Vec<f64> {
        self.inputs
            .iter()
            .map(|input| {
                let v = input.get();
                if v.abs() > self.voltage_max {
                    warn!(
                        "EMG voltage {:.3} on channel {} outside the expected range",
                        v, input.channel()
                    );
                }
                v
            })
            .collect()
    }

    /// Electrode voltages with the bias removed.
    ///
    /// Units: volts
    pub fn voltages(&self) -> Vec<f64> {
        self.raw_voltages()
            .into_iter()
            .zip(self.bias.iter())
            .map(|(v, b)| v - b)
            .collect()
    }

    /// Take the current raw voltages as the bias.
    pub fn zero(&mut self) {
        self.bias = self.inputs.iter().map(|i| i.get()).collect();
    }

    pub fn bias(&self) -> &[f64] {
        &self.bias
    }
}

impl ForceSensor {
    pub fn new(daq: &dyn Daq, params: &ForceSensorParams) -> Result<Self, DaqError> {
        let inputs = params.channels
            .iter()
            .map(|&c| AnalogInput::new(daq, c))
            .collect::<Result<Vec<_>, _>>()?;

        let calibration = Matrix6::from_fn(|r, c| params.calibration[r][c]);

        Ok(Self {
            inputs,
            calibration,
            bias: Vector6::zeros(),
        })
    }

    /// Take the current gauge voltages as the unloaded bias.
    pub fn zero(&mut self) {
        self.bias = self.gauge_voltages();
    }

    /// Forces and torques, `[Fx, Fy, Fz, Tx, Ty, Tz]`.
    pub fn wrench(&self) -> Vector6<f64> {
        self.calibration * (self.gauge_voltages() - self.bias)
    }

    /// Units: Newtons
    pub fn forces(&self) -> Vector3<f64> {
        self.wrench().fixed_rows::<3>(0).into_owned()
    }

    /// Units: Newton-meters
    pub fn torques(&self) -> Vector3<f64> {
        self.wrench().fixed_rows::<3>(3).into_owned()
    }

    fn gauge_voltages(&self) -> Vector6<f64> {
        Vector6::from_iterator(self.inputs.iter().map(|i| i.get()))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use super::super::test::{neutral, sim_meii};

    fn calibration() -> [[f64; NUM_FT_CHANNELS]; NUM_FT_CHANNELS] {
        let mut cal = [[0.0; NUM_FT_CHANNELS]; NUM_FT_CHANNELS];
        for (i, row) in cal.iter_mut().enumerate() {
            row[i] = 10.0 * (i + 1) as f64;
        }
        cal[0][1] = 1.0;
        cal
    }

    #[test]
    fn test_emg() {
        let caps = MeiiCapabilities {
            emg_channels: Some(vec![1, 3]),
            force_sensor: None,
        };
        let (mut daq, mut meii) = sim_meii(neutral(), &caps);

        daq.set_analog_input(1, 0.25).unwrap();
        daq.set_analog_input(3, -0.5).unwrap();
        daq.read_all().unwrap();

        let emg = meii.emg_mut().unwrap();
        assert_eq!(emg.channel_numbers(), vec![1, 3]);
        assert_eq!(emg.raw_voltages(), vec![0.25, -0.5]);
        assert_eq!(emg.voltages(), vec![0.25, -0.5]);

        emg.zero();
        daq.set_analog_input(1, 0.75).unwrap();
        daq.read_all().unwrap();

        let emg = meii.emg().unwrap();
        assert_eq!(emg.bias(), &[0.25, -0.5]);
        assert_eq!(emg.voltages(), vec![0.5, 0.0]);
    }

    #[test]
    fn test_force_sensor() {
        let caps = MeiiCapabilities {
            emg_channels: None,
            force_sensor: Some(ForceSensorParams {
                channels: [2, 3, 4, 5, 6, 7],
                calibration: calibration(),
            }),
        };
        let (mut daq, mut meii) = sim_meii(neutral(), &caps);

        // Unloaded offsets are removed by zeroing
        for c in 2..8 {
            daq.set_analog_input(c, 0.1).unwrap();
        }
        daq.read_all().unwrap();
        meii.force_sensor_mut().unwrap().zero();

        daq.set_analog_input(2, 0.2).unwrap();
        daq.set_analog_input(3, 0.3).unwrap();
        daq.set_analog_input(7, -0.1).unwrap();
        daq.read_all().unwrap();

        let fs = meii.force_sensor().unwrap();
        let forces = fs.forces();
        let torques = fs.torques();

        assert!((forces[0] - (10.0 * 0.1 + 1.0 * 0.2)).abs() < 1e-12);
        assert!((forces[1] - 20.0 * 0.2).abs() < 1e-12);
        assert!(forces[2].abs() < 1e-12);
        assert!(torques[0].abs() < 1e-12);
        assert!((torques[2] - 60.0 * -0.2).abs() < 1e-12);
    }
}
