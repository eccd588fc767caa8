//! Per-cycle records of the MAHI Exo-II state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;

// Internal
use super::*;
use crate::rps::NUM_QP;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const ANAT_NAMES: [&str; N_AJ] = ["efe", "fps", "rfe", "rru", "arm"];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of the exoskeleton at one control cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeiiRecord {
    pub time_s: f64,
    pub anat_positions: [f64; N_AJ],
    pub anat_velocities: [f64; N_AJ],
    pub anat_torques: [f64; N_AJ],
    pub joint_torques: [f64; N_RJ],
    pub qp: [f64; NUM_QP],
    pub tau_par: [f64; N_QS],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MeiiRecord {
    /// Column names matching `to_row`.
    pub fn header() -> Vec<String> {
        let mut header = vec!["time_s".to_string()];

        for prefix in ["pos", "vel", "trq"].iter() {
            header.extend(ANAT_NAMES.iter().map(|n| format!("{}_{}", prefix, n)));
        }
        header.extend((0..N_RJ).map(|i| format!("joint_trq_{}", i)));
        header.extend((0..NUM_QP).map(|i| format!("qp_{}", i)));
        header.extend((0..N_QS).map(|i| format!("tau_par_{}", i)));

        header
    }

    /// The record flattened into one CSV row.
    pub fn to_row(&self) -> Vec<f64> {
        let mut row = Vec::with_capacity(1 + 3 * N_AJ + N_RJ + NUM_QP + N_QS);

        row.push(self.time_s);
        row.extend_from_slice(&self.anat_positions);
        row.extend_from_slice(&self.anat_velocities);
        row.extend_from_slice(&self.anat_torques);
        row.extend_from_slice(&self.joint_torques);
        row.extend_from_slice(&self.qp);
        row.extend_from_slice(&self.tau_par);

        row
    }
}

impl MahiExoII {
    /// Snapshot of the current state, stamped with the given time.
    pub fn record(&self, time_s: f64) -> MeiiRecord {
        let mut joint_torques = [0.0; N_RJ];
        for (t, j) in joint_torques.iter_mut().zip(self.robot.joints()) {
            *t = j.torque();
        }

        let mut qp = [0.0; NUM_QP];
        qp.copy_from_slice(self.qp.as_slice());

        MeiiRecord {
            time_s,
            anat_positions: self.anat_positions,
            anat_velocities: self.anat_velocities,
            anat_torques: self.anat_torques,
            joint_torques,
            qp,
            tau_par: [self.tau_par[0], self.tau_par[1], self.tau_par[2]],
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
