//! Parameters structure for the MEL executable

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use crate::clock::ClockParams;
use crate::experiment::ExperimentParams;
use crate::meii::MeiiCapabilities;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the executable.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecParams {
    /// Minimum level of log records, one of `trace`, `debug`, `info`, `warn`
    /// or `error`.
    pub log_level: String,

    /// Parameter file of the exoskeleton, relative to the params directory.
    pub meii_params_file: String,

    /// Ideal time after which the experiment is ended.
    ///
    /// Units: seconds
    pub experiment_stop_time_s: f64,

    /// Duration of the position hold run after a finished experiment.
    ///
    /// Units: seconds
    pub hold_time_s: f64,

    pub clock: ClockParams,

    #[serde(default)]
    pub capabilities: MeiiCapabilities,

    pub experiment: ExperimentParams,
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::meii::RpsControlMode;

    #[test]
    fn test_exec_params() {
        let params: ExecParams = util::params::parse(
            include_str!("../../params/exec.toml")
        ).unwrap();

        assert!(util::logger::parse_level(&params.log_level).is_ok());
        assert_eq!(params.clock.frequency_hz, 1000.0);
        assert_eq!(params.experiment.rps_control_mode, RpsControlMode::Serial);
        assert!(!params.experiment.waypoints.is_empty());
        assert!(params.capabilities.force_sensor.is_none());
    }
}
