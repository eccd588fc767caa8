//! Torque commands and position control of the MAHI Exo-II

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use nalgebra::Vector3;

// Internal
use super::*;
use util::maths::all_within_tol;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MahiExoII {
    /// Command torques on the anatomical joints.
    ///
    /// The elbow and forearm torques are applied directly. The wrist torques
    /// are mapped onto the legs through the transpose of the wrist Jacobian,
    /// unless its spectral norm is too large or has jumped since the last
    /// command, in which case the legs are commanded zero force and the fault
    /// is recorded.
    pub fn set_anatomical_joint_torques(&mut self, torques: &[f64; N_AJ]) {
        for i in 0..RPS_OFFSET {
            self.set_robot_joint_torque(i, torques[i]);
            self.anat_torques[i] = self.robot.joint(i).map_or(0.0, |j| j.torque());
        }

        let ser = Vector3::new(
            torques[RPS_OFFSET], 
            torques[RPS_OFFSET + 1], 
            torques[RPS_OFFSET + 2]
        );

        let spec_norm = (self.jac_fk.transpose() * self.jac_fk)
            .symmetric_eigenvalues()
            .amax()
            .sqrt();

        let fault = if !spec_norm.is_finite() || spec_norm > self.params.spec_norm_max {
            Some(MeiiFault::SpectralNormTooLarge { norm: spec_norm })
        }
        else if self.spec_norm_prev != 0.0 
            && (spec_norm - self.spec_norm_prev).abs() > self.params.spec_norm_max_jump 
        {
            Some(MeiiFault::SpectralNormJump { 
                prev: self.spec_norm_prev, 
                norm: spec_norm 
            })
        }
        else {
            None
        };

        self.spec_norm_prev = spec_norm;

        if let Some(f) = fault {
            warn!(
                "Wrist Jacobian fault {:?} at leg lengths {:?}, commanding zero leg forces", 
                f, self.q_par.as_slice()
            );
            self.fault = Some(f);

            for i in 0..N_QS {
                self.set_robot_joint_torque(RPS_OFFSET + i, 0.0);
                self.anat_torques[RPS_OFFSET + i] = 0.0;
            }
            self.tau_par = Vector3::zeros();
            self.tau_ser = Vector3::zeros();
            return
        }

        let par = self.jac_fk.transpose() * ser;
        for i in 0..N_QS {
            self.set_robot_joint_torque(RPS_OFFSET + i, par[i]);
            self.anat_torques[RPS_OFFSET + i] = ser[i];
        }

        self.tau_par = par;
        self.tau_ser = -ser;
    }

    /// Command forces directly on the RPS legs.
    ///
    /// The equivalent serial torques are recorded as the wrist's anatomical
    /// torques when the wrist Jacobian is invertible.
    pub fn set_rps_par_torques(&mut self, tau_par: &[f64; N_QS]) {
        for i in 0..N_QS {
            self.set_robot_joint_torque(RPS_OFFSET + i, tau_par[i]);
        }

        let par = Vector3::from_column_slice(tau_par);
        let ser = self.jac_fk.transpose()
            .lu()
            .solve(&par)
            .unwrap_or_else(Vector3::zeros);

        for i in 0..N_QS {
            self.anat_torques[RPS_OFFSET + i] = ser[i];
        }
        self.tau_par = par;
        self.tau_ser = -ser;
    }

    /// Command torques on the serial wrist coordinates, mapped onto the legs
    /// through the transpose of the wrist Jacobian.
    pub fn set_rps_ser_torques(&mut self, tau_ser: &[f64; N_QS]) {
        let ser = Vector3::from_column_slice(tau_ser);
        let par = self.jac_fk.transpose() * ser;

        for i in 0..N_QS {
            self.set_robot_joint_torque(RPS_OFFSET + i, par[i]);
            self.anat_torques[RPS_OFFSET + i] = ser[i];
        }
        self.tau_par = par;
        self.tau_ser = -ser;
    }

    pub fn set_rps_control_mode(&mut self, mode: RpsControlMode) {
        self.rps_control_mode = mode;
    }

    pub fn rps_control_mode(&self) -> RpsControlMode {
        self.rps_control_mode
    }

    /// If set the RPS is commanded zero force by the position controllers.
    pub fn set_rps_backdrive(&mut self, backdrive: bool) {
        self.rps_backdrive = backdrive;
    }

    pub fn set_elbow_backdrive(&mut self, backdrive: bool) {
        self.elbow_backdrive = backdrive;
    }

    pub fn set_forearm_backdrive(&mut self, backdrive: bool) {
        self.forearm_backdrive = backdrive;
    }

    pub fn rps_backdrive(&self) -> bool {
        self.rps_backdrive
    }

    pub fn elbow_backdrive(&self) -> bool {
        self.elbow_backdrive
    }

    pub fn forearm_backdrive(&self) -> bool {
        self.forearm_backdrive
    }

    /// Position control the RPS towards the trajectory's reference.
    ///
    /// In parallel mode `rps_ref` holds leg lengths, otherwise it holds the
    /// serial coordinates. Returns the commanded forces or torques.
    pub fn set_rps_pos_ctrl_torques(
        &mut self, 
        rps_ref: &SmoothReferenceTrajectory, 
        current_time: f64
    ) -> [f64; N_QS] {
        let mut command = [0.0; N_QS];

        match self.rps_control_mode {
            RpsControlMode::Parallel => {
                if !self.rps_backdrive {
                    for i in 0..N_QS {
                        let smooth_ref = rps_ref.calculate_smooth_ref(i, current_time);
                        command[i] = self.robot_pd_effort(RPS_OFFSET + i, smooth_ref);
                    }
                }
                self.set_rps_par_torques(&command);
            },
            RpsControlMode::SerialHeightBackdrive | RpsControlMode::Serial => {
                if !self.rps_backdrive {
                    for i in 0..N_QS {
                        let smooth_ref = rps_ref.calculate_smooth_ref(i, current_time);
                        command[i] = self.anat_pd_effort(RPS_OFFSET + i, smooth_ref);
                    }
                    if self.rps_control_mode == RpsControlMode::SerialHeightBackdrive {
                        command[N_QS - 1] = 0.0;
                    }
                }
                self.set_rps_ser_torques(&command);
            }
        }

        command
    }

    /// Position control every anatomical joint towards the trajectory's
    /// reference.
    ///
    /// The wrist is only controlled in the serial modes. In parallel mode a
    /// warning is logged and the wrist commanded zero torque. Returns the
    /// commanded anatomical torques.
    pub fn set_anat_pos_ctrl_torques(
        &mut self, 
        anat_ref: &SmoothReferenceTrajectory, 
        current_time: f64
    ) -> [f64; N_AJ] {
        let mut command = [0.0; N_AJ];

        let backdrive = [self.elbow_backdrive, self.forearm_backdrive];
        for i in 0..RPS_OFFSET {
            if !backdrive[i] {
                let smooth_ref = anat_ref.calculate_smooth_ref(i, current_time);
                command[i] = self.robot_pd_effort(i, smooth_ref);
            }
        }

        match self.rps_control_mode {
            RpsControlMode::SerialHeightBackdrive | RpsControlMode::Serial => {
                if !self.rps_backdrive {
                    for i in RPS_OFFSET..N_AJ {
                        let smooth_ref = anat_ref.calculate_smooth_ref(i, current_time);
                        command[i] = self.anat_pd_effort(i, smooth_ref);
                    }
                    if self.rps_control_mode == RpsControlMode::SerialHeightBackdrive {
                        command[N_AJ - 1] = 0.0;
                    }
                }
            },
            RpsControlMode::Parallel => warn!(
                "Anatomical position control requires a serial RPS control mode, \
                commanding zero wrist torques"
            )
        }

        self.set_anatomical_joint_torques(&command);

        command
    }

    /// Run `set_rps_pos_ctrl_torques` against one of the held trajectories.
    pub fn set_rps_pos_ctrl_torques_preset(
        &mut self, 
        preset: TrajectoryPreset, 
        current_time: f64
    ) -> [f64; N_QS] {
        let traj = std::mem::take(self.preset_mut(preset));
        let command = self.set_rps_pos_ctrl_torques(&traj, current_time);
        *self.preset_mut(preset) = traj;
        command
    }

    /// Run `set_anat_pos_ctrl_torques` against one of the held trajectories.
    pub fn set_anat_pos_ctrl_torques_preset(
        &mut self, 
        preset: TrajectoryPreset, 
        current_time: f64
    ) -> [f64; N_AJ] {
        let traj = std::mem::take(self.preset_mut(preset));
        let command = self.set_anat_pos_ctrl_torques(&traj, current_time);
        *self.preset_mut(preset) = traj;
        command
    }

    /// True once every leg is within tolerance of the RPS initialisation
    /// position.
    pub fn check_rps_init(&self) -> bool {
        all_within_tol(
            &self.params.rps_init_pos,
            &self.wrist_parallel_positions(),
            &[true; N_QS],
            &[self.params.rps_init_err_tol; N_QS],
        )
    }

    pub fn check_goal_rps_par_pos(&self, goal: &[f64; N_QS], check: &[bool; N_QS]) -> bool {
        all_within_tol(
            goal, 
            &self.wrist_parallel_positions(), 
            check, 
            &self.params.rps_par_goal_err_tol
        )
    }

    pub fn check_goal_rps_ser_pos(&self, goal: &[f64; N_QS], check: &[bool; N_QS]) -> bool {
        all_within_tol(
            goal, 
            &self.wrist_serial_positions(), 
            check, 
            &self.params.rps_ser_goal_err_tol
        )
    }

    pub fn check_goal_anat_pos(&self, goal: &[f64; N_AJ], check: &[bool; N_AJ]) -> bool {
        all_within_tol(
            goal, 
            &self.anat_positions, 
            check, 
            &self.params.anat_goal_err_tol
        )
    }

    /// As `check_goal_anat_pos` but against the tighter neutral tolerances.
    pub fn check_neutral_anat_pos(&self, goal: &[f64; N_AJ], check: &[bool; N_AJ]) -> bool {
        all_within_tol(
            goal, 
            &self.anat_positions, 
            check, 
            &self.params.anat_neutral_err_tol
        )
    }

    fn set_robot_joint_torque(&mut self, index: usize, torque: f64) {
        if let Some(j) = self.robot.joint_mut(index) {
            j.set_torque(torque);
        }
    }

    /// PD effort of a robot joint towards `smooth_ref`, zero if the reference
    /// is not a number.
    fn robot_pd_effort(&mut self, index: usize, smooth_ref: f64) -> f64 {
        if smooth_ref.is_nan() {
            return 0.0
        }

        let (x, xd) = match self.robot.joint(index) {
            Some(j) => (j.position(), j.velocity()),
            None => return 0.0
        };

        self.robot_pd[index].calculate(smooth_ref, x, 0.0, xd)
    }

    /// PD effort of an anatomical joint towards `smooth_ref`, zero if the
    /// reference is not a number.
    fn anat_pd_effort(&mut self, index: usize, smooth_ref: f64) -> f64 {
        if smooth_ref.is_nan() {
            return 0.0
        }

        self.anat_pd[index].calculate(
            smooth_ref, 
            self.anat_positions[index], 
            0.0, 
            self.anat_velocities[index]
        )
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
