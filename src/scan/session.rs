//! Scan session state and the recording policy.
//!
//! [`ScanSession`] is the only mutable state of a scan. It is owned by the
//! controller task and changed in two places: operator commands (`start`,
//! `stop`) and the per-iteration step (`plan_step` followed by `commit`).
//!
//! A step is planned first and committed only once the laser has accepted the
//! new piezo position, so a failed positioning command leaves the session as
//! it was and the same step is retried on the next iteration.

use super::trigger::is_near_multiple;
use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};

/// Whether the piezo is being advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// Instruments are polled and displayed but nothing moves.
    Idle,
    /// The piezo advances every iteration and checkpoints fire.
    Scanning,
}

/// Per-iteration advance and checkpoint interval, fixed for a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordingPolicy {
    step_record: f64,
    step_background: f64,
}

impl RecordingPolicy {
    /// Builds a policy, rejecting combinations the trigger cannot honour.
    ///
    /// # Errors
    ///
    /// - [`DaqError::ZeroRecordInterval`] when `step_record` is zero.
    /// - [`DaqError::Configuration`] when `step_background` is not a positive
    ///   finite number, or is larger than `|step_record|` (the tolerance would
    ///   then exceed half an interval and fire on every step or never).
    pub fn new(step_record: f64, step_background: f64) -> AppResult<Self> {
        if step_record == 0.0 {
            return Err(DaqError::ZeroRecordInterval);
        }
        if !step_record.is_finite() {
            return Err(DaqError::Configuration(format!(
                "step_record must be finite, got {step_record}"
            )));
        }
        if !step_background.is_finite() || step_background <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "step_background must be a positive number, got {step_background}"
            )));
        }
        if step_background > step_record.abs() {
            return Err(DaqError::Configuration(format!(
                "step_background ({step_background}) must not exceed step_record ({step_record})"
            )));
        }

        Ok(Self {
            step_record,
            step_background,
        })
    }

    /// Target displacement between checkpoints.
    pub fn step_record(&self) -> f64 {
        self.step_record
    }

    /// Piezo advance per loop iteration.
    pub fn step_background(&self) -> f64 {
        self.step_background
    }

    /// Trigger tolerance, half a background step.
    pub fn tolerance(&self) -> f64 {
        self.step_background / 2.0
    }
}

/// The next move of a scanning session, not yet applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedStep {
    /// Piezo position to command.
    pub position: f64,
    /// Accumulated displacement once the step is committed.
    pub accumulated_displacement: f64,
    /// Whether a checkpoint fires at this step.
    pub checkpoint: bool,
}

/// Mutable state of a piezo scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    state: ScanState,
    piezo_position: f64,
    file_id: u64,
    accumulated_displacement: f64,
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanSession {
    /// An idle session at position zero with file id zero.
    pub fn new() -> Self {
        Self {
            state: ScanState::Idle,
            piezo_position: 0.0,
            file_id: 0,
            accumulated_displacement: 0.0,
        }
    }

    /// `Idle -> Scanning` (or a restart while scanning).
    ///
    /// Resets the accumulated displacement and loads the starting position
    /// and file id.
    pub fn start(&mut self, file_id_start: u64, piezo_start: f64) {
        self.state = ScanState::Scanning;
        self.piezo_position = piezo_start;
        self.file_id = file_id_start;
        self.accumulated_displacement = 0.0;
    }

    /// `Scanning -> Idle`. Position and file id are kept for inspection.
    pub fn stop(&mut self) {
        self.state = ScanState::Idle;
    }

    /// Current state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Whether the session is advancing.
    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    /// Last committed piezo position.
    pub fn piezo_position(&self) -> f64 {
        self.piezo_position
    }

    /// File id the next checkpoint will use.
    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    /// Displacement accumulated since the last start.
    pub fn accumulated_displacement(&self) -> f64 {
        self.accumulated_displacement
    }

    /// Computes the next step, or `None` while idle.
    ///
    /// # Errors
    ///
    /// Propagates [`DaqError::ZeroRecordInterval`] from the trigger predicate.
    pub fn plan_step(&self, policy: &RecordingPolicy) -> AppResult<Option<PlannedStep>> {
        if !self.is_scanning() {
            return Ok(None);
        }

        let step = policy.step_background();
        let accumulated_displacement = self.accumulated_displacement + step;
        let checkpoint =
            is_near_multiple(accumulated_displacement, policy.step_record(), policy.tolerance())?;

        Ok(Some(PlannedStep {
            position: self.piezo_position + step,
            accumulated_displacement,
            checkpoint,
        }))
    }

    /// Applies a step produced by [`plan_step`](Self::plan_step).
    ///
    /// Ignored if the session was stopped in between.
    pub fn commit(&mut self, step: &PlannedStep) {
        if !self.is_scanning() {
            return;
        }
        self.piezo_position = step.position;
        self.accumulated_displacement = step.accumulated_displacement;
    }

    /// Consumes the current file id for a checkpoint and returns it.
    pub fn take_file_id(&mut self) -> u64 {
        let id = self.file_id;
        self.file_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(record: f64, background: f64) -> RecordingPolicy {
        RecordingPolicy::new(record, background).unwrap()
    }

    /// Runs `n` iterations and returns the iteration numbers (1-based) that fired.
    fn run(session: &mut ScanSession, policy: &RecordingPolicy, n: usize) -> Vec<usize> {
        let mut fired = Vec::new();
        for i in 1..=n {
            if let Some(step) = session.plan_step(policy).unwrap() {
                session.commit(&step);
                if step.checkpoint {
                    session.take_file_id();
                    fired.push(i);
                }
            }
        }
        fired
    }

    #[test]
    fn test_zero_record_step_rejected() {
        assert!(matches!(
            RecordingPolicy::new(0.0, 0.1),
            Err(DaqError::ZeroRecordInterval)
        ));
    }

    #[test]
    fn test_background_larger_than_record_rejected() {
        let err = RecordingPolicy::new(0.1, 0.5).unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }

    #[test]
    fn test_non_positive_background_rejected() {
        assert!(RecordingPolicy::new(0.5, 0.0).is_err());
        assert!(RecordingPolicy::new(0.5, -0.1).is_err());
        assert!(RecordingPolicy::new(0.5, f64::NAN).is_err());
    }

    #[test]
    fn test_tolerance_is_half_background() {
        assert_eq!(policy(0.5, 0.1).tolerance(), 0.05);
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = ScanSession::new();
        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(session.file_id(), 0);
        assert_eq!(session.piezo_position(), 0.0);
    }

    #[test]
    fn test_idle_session_plans_nothing() {
        let session = ScanSession::new();
        assert_eq!(session.plan_step(&policy(0.5, 0.1)).unwrap(), None);
    }

    #[test]
    fn test_start_loads_initial_values() {
        let mut session = ScanSession::new();
        session.start(7, 12.5);
        assert!(session.is_scanning());
        assert_eq!(session.file_id(), 7);
        assert_eq!(session.piezo_position(), 12.5);
        assert_eq!(session.accumulated_displacement(), 0.0);
    }

    #[test]
    fn test_fires_every_fifth_iteration() {
        let mut session = ScanSession::new();
        session.start(0, 0.0);
        let fired = run(&mut session, &policy(0.5, 0.1), 20);
        assert_eq!(fired, vec![5, 10, 15, 20]);
        assert_eq!(session.file_id(), 4);
    }

    #[test]
    fn test_equal_steps_fire_every_iteration() {
        let mut session = ScanSession::new();
        session.start(0, 0.0);
        let fired = run(&mut session, &policy(0.1, 0.1), 6);
        assert_eq!(fired, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_file_ids_start_at_configured_value() {
        let mut session = ScanSession::new();
        session.start(7, 0.0);
        assert_eq!(session.take_file_id(), 7);
        assert_eq!(session.take_file_id(), 8);
        assert_eq!(session.file_id(), 9);
    }

    #[test]
    fn test_position_advances_by_background_step() {
        let mut session = ScanSession::new();
        session.start(0, 1.0);
        run(&mut session, &policy(0.5, 0.25), 4);
        assert!((session.piezo_position() - 2.0).abs() < 1e-12);
        assert!((session.accumulated_displacement() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stop_preserves_position_and_file_id() {
        let mut session = ScanSession::new();
        session.start(3, 0.0);
        let p = policy(0.2, 0.1);
        run(&mut session, &p, 7);
        let position = session.piezo_position();
        let file_id = session.file_id();

        session.stop();
        assert_eq!(run(&mut session, &p, 10), Vec::<usize>::new());
        assert_eq!(session.piezo_position(), position);
        assert_eq!(session.file_id(), file_id);
    }

    #[test]
    fn test_restart_resets_accumulation() {
        let mut session = ScanSession::new();
        let p = policy(0.5, 0.1);
        session.start(0, 0.0);
        run(&mut session, &p, 3);
        session.start(10, 5.0);
        let fired = run(&mut session, &p, 5);
        assert_eq!(fired, vec![5]);
        assert_eq!(session.file_id(), 11);
    }

    #[test]
    fn test_uncommitted_step_is_replanned() {
        let mut session = ScanSession::new();
        session.start(0, 0.0);
        let p = policy(0.5, 0.1);
        let first = session.plan_step(&p).unwrap().unwrap();
        let again = session.plan_step(&p).unwrap().unwrap();
        assert_eq!(first, again);
        assert_eq!(session.piezo_position(), 0.0);
    }

    #[test]
    fn test_commit_after_stop_is_ignored() {
        let mut session = ScanSession::new();
        session.start(0, 0.0);
        let step = session.plan_step(&policy(0.5, 0.1)).unwrap().unwrap();
        session.stop();
        session.commit(&step);
        assert_eq!(session.piezo_position(), 0.0);
    }
}
