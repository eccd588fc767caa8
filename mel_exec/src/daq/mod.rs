//! # Data acquisition interface
//!
//! The control core never talks to DAQ hardware per channel. Instead every
//! DAQ keeps a `DaqImage`, a snapshot of all of its channels. `read_all`
//! refreshes the input side of the image from the hardware, `write_all`
//! commits the output side, and sensors and actuators only ever touch the
//! image through channel handles.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod virtual_daq;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

// Internal
pub use virtual_daq::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Snapshot of every channel of a DAQ.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DaqImage {
    /// Encoder positions.
    ///
    /// Units: counts
    pub encoder_counts: Vec<i64>,

    /// Encoder velocities, if the hardware measures them.
    ///
    /// Units: counts/second
    pub encoder_rates: Vec<f64>,

    /// Units: volts
    pub analog_inputs: Vec<f64>,

    /// Units: volts
    pub analog_outputs: Vec<f64>,

    pub digital_outputs: Vec<bool>,
}

/// Shared handle to a DAQ's image.
pub type SharedImage = Rc<RefCell<DaqImage>>;

/// Handle to one encoder channel of a DAQ image.
#[derive(Debug, Clone)]
pub struct EncoderChannel {
    image: SharedImage,
    channel: usize,
}

/// Handle to one analog output channel of a DAQ image.
#[derive(Debug, Clone)]
pub struct AnalogOutput {
    image: SharedImage,
    channel: usize,
}

/// Handle to one analog input channel of a DAQ image.
#[derive(Debug, Clone)]
pub struct AnalogInput {
    image: SharedImage,
    channel: usize,
}

/// Handle to one digital output channel of a DAQ image.
#[derive(Debug, Clone)]
pub struct DigitalOutput {
    image: SharedImage,
    channel: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while using a DAQ.
#[derive(Debug, Error)]
pub enum DaqError {
    #[error("DAQ {0} is not enabled")]
    NotEnabled(String),

    #[error("DAQ {daq} has no {kind} channel {channel}")]
    NoSuchChannel {
        daq: String,
        kind: &'static str,
        channel: usize,
    },

    #[error("DAQ {daq} communication failed: {reason}")]
    CommsFailed {
        daq: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The narrow contract the control core requires of a DAQ.
pub trait Daq {
    fn name(&self) -> &str;

    /// Shared handle to this DAQ's channel image.
    fn image(&self) -> SharedImage;

    fn enable(&mut self) -> Result<(), DaqError>;

    fn disable(&mut self) -> Result<(), DaqError>;

    fn is_enabled(&self) -> bool;

    /// Snapshot all input channels into the image.
    fn read_all(&mut self) -> Result<(), DaqError>;

    /// Commit all output channels from the image.
    fn write_all(&mut self) -> Result<(), DaqError>;

    /// Make the current encoder positions read as zero.
    fn zero_encoders(&mut self) -> Result<(), DaqError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DaqImage {
    /// Create an image with the given number of channels of each kind, all
    /// zeroed.
    pub fn new(num_encoders: usize, num_ai: usize, num_ao: usize, num_do: usize) -> Self {
        Self {
            encoder_counts: vec![0; num_encoders],
            encoder_rates: vec![0.0; num_encoders],
            analog_inputs: vec![0.0; num_ai],
            analog_outputs: vec![0.0; num_ao],
            digital_outputs: vec![false; num_do],
        }
    }

    /// Wrap the image in a shared handle.
    pub fn shared(self) -> SharedImage {
        Rc::new(RefCell::new(self))
    }
}

impl EncoderChannel {
    /// Bind a handle to an encoder channel, checking that it exists.
    pub fn new(daq: &dyn Daq, channel: usize) -> Result<Self, DaqError> {
        let image = daq.image();
        check_channel(daq, "encoder", channel, image.borrow().encoder_counts.len())?;
        Ok(Self { image, channel })
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Units: counts
    pub fn counts(&self) -> i64 {
        self.image.borrow().encoder_counts[self.channel]
    }

    /// Units: counts/second
    pub fn rate(&self) -> f64 {
        self.image.borrow().encoder_rates[self.channel]
    }
}

impl AnalogOutput {
    /// Bind a handle to an analog output channel, checking that it exists.
    pub fn new(daq: &dyn Daq, channel: usize) -> Result<Self, DaqError> {
        let image = daq.image();
        check_channel(daq, "analog output", channel, image.borrow().analog_outputs.len())?;
        Ok(Self { image, channel })
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Units: volts
    pub fn set(&self, voltage: f64) {
        self.image.borrow_mut().analog_outputs[self.channel] = voltage;
    }

    /// Units: volts
    pub fn get(&self) -> f64 {
        self.image.borrow().analog_outputs[self.channel]
    }
}

impl AnalogInput {
    /// Bind a handle to an analog input channel, checking that it exists.
    pub fn new(daq: &dyn Daq, channel: usize) -> Result<Self, DaqError> {
        let image = daq.image();
        check_channel(daq, "analog input", channel, image.borrow().analog_inputs.len())?;
        Ok(Self { image, channel })
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Units: volts
    pub fn get(&self) -> f64 {
        self.image.borrow().analog_inputs[self.channel]
    }
}

impl DigitalOutput {
    /// Bind a handle to a digital output channel, checking that it exists.
    pub fn new(daq: &dyn Daq, channel: usize) -> Result<Self, DaqError> {
        let image = daq.image();
        check_channel(daq, "digital output", channel, image.borrow().digital_outputs.len())?;
        Ok(Self { image, channel })
    }

    pub fn set(&self, value: bool) {
        self.image.borrow_mut().digital_outputs[self.channel] = value;
    }

    pub fn get(&self) -> bool {
        self.image.borrow().digital_outputs[self.channel]
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn check_channel(
    daq: &dyn Daq, 
    kind: &'static str, 
    channel: usize, 
    count: usize
) -> Result<(), DaqError> {
    if channel < count {
        Ok(())
    }
    else {
        Err(DaqError::NoSuchChannel {
            daq: daq.name().to_string(),
            kind,
            channel,
        })
    }
}
