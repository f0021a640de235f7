//! Dispatch orchestration.
//!
//! The dispatcher is the caller the rest of the core is built for: it runs
//! validate, reserve and the `assigned` transition as one operation per job,
//! routes lifecycle events through the state machine, and re-evaluates SLA
//! status after every change. Locks are always taken job first, then
//! technician.

use chrono::NaiveDateTime;
use parking_lot::MutexGuard;
use thiserror::Error;

use crate::arena::Entry;
use crate::config::{DispatchConfig, STRATEGIES};
use crate::job_board::{JobBoard, JobBoardError};
use crate::models::{
    Alert, AlertId, Assignment, Interval, Job, JobEvent, JobId, JobStatus, StatusChange,
    Technician, TechnicianStatus,
};
use crate::monitoring::{AlertEngine, AlertError, SlaMonitor, SlaStatus};
use crate::roster::{Roster, RosterError};
use crate::sorting::SortingError;
use crate::{log_changes, log_checks, log_debug, log_rejection};

use super::allocator::{AllocationError, TimeSlotAllocator};
use super::lifecycle::{JobStateMachine, TransitionError};
use super::validator::{AssignmentValidator, Eligibility, RejectionReason};

/// Errors reported to dispatch callers. Every failure is scoped to the one
/// requested operation; none leaves partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Assignment rejected: {0}")]
    Rejected(#[from] RejectionReason),
    #[error("Slot conflict on technician {technician_id} for {interval}")]
    Conflict {
        technician_id: String,
        interval: Interval,
    },
    #[error("Job {0} is locked by another operation")]
    Busy(JobId),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("Job not found: {0}")]
    JobNotFound(String),
    #[error("Technician not found: {0}")]
    TechnicianNotFound(String),
    #[error("Job already exists: {0}")]
    DuplicateJob(String),
    #[error("Job board is full ({0} jobs)")]
    BoardFull(usize),
    #[error("Job {job_id} has an out-of-range duration of {minutes} minutes")]
    InvalidDuration { job_id: JobId, minutes: i64 },
    #[error("Technician {0} still holds active reservations")]
    ActiveReservations(String),
    #[error("Alert not found: {0}")]
    AlertNotFound(AlertId),
    #[error("Unknown dispatch strategy: {0}")]
    UnknownStrategy(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DispatchError {
    /// Stable machine-readable code for collaborators.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected(reason) => reason.code(),
            Self::Conflict { .. } | Self::Busy(_) => "conflict",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::JobNotFound(_) | Self::TechnicianNotFound(_) | Self::AlertNotFound(_) => {
                "not_found"
            }
            Self::DuplicateJob(_) | Self::BoardFull(_) | Self::InvalidDuration { .. } => {
                "intake_rejected"
            }
            Self::ActiveReservations(_) => "active_reservations",
            Self::UnknownStrategy(_) | Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

impl From<AllocationError> for DispatchError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::Conflict {
                technician_id,
                interval,
            } => DispatchError::Conflict {
                technician_id,
                interval,
            },
            AllocationError::TechnicianNotFound(id) => DispatchError::TechnicianNotFound(id),
        }
    }
}

impl From<JobBoardError> for DispatchError {
    fn from(err: JobBoardError) -> Self {
        match err {
            JobBoardError::DuplicateJob(id) => DispatchError::DuplicateJob(id),
            JobBoardError::Full(max) => DispatchError::BoardFull(max),
            JobBoardError::InvalidDuration(job_id, minutes) => {
                DispatchError::InvalidDuration { job_id, minutes }
            }
        }
    }
}

impl From<RosterError> for DispatchError {
    fn from(err: RosterError) -> Self {
        match err {
            RosterError::ActiveReservations(id) => DispatchError::ActiveReservations(id),
        }
    }
}

impl From<AlertError> for DispatchError {
    fn from(err: AlertError) -> Self {
        match err {
            AlertError::NotFound(id) => DispatchError::AlertNotFound(id),
        }
    }
}

impl From<SortingError> for DispatchError {
    fn from(err: SortingError) -> Self {
        match err {
            SortingError::UnknownStrategy(s) => DispatchError::UnknownStrategy(s),
            SortingError::JobNotFound(id) => DispatchError::JobNotFound(id),
        }
    }
}

/// A job together with its SLA status derived at read time.
#[derive(Clone, Debug)]
pub struct JobSnapshot {
    pub job: Job,
    pub sla_status: SlaStatus,
}

/// Outcome of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evaluated: usize,
    pub raised: Vec<AlertId>,
    pub auto_delayed: Vec<JobId>,
}

pub struct Dispatcher {
    config: DispatchConfig,
    roster: Roster,
    board: JobBoard,
    validator: AssignmentValidator,
    allocator: TimeSlotAllocator,
    monitor: SlaMonitor,
    alerts: AlertEngine,
}

impl Dispatcher {
    /// Create a dispatcher with an empty roster and job board.
    pub fn new(config: DispatchConfig) -> Result<Self, DispatchError> {
        // Validate strategy upfront
        if !STRATEGIES.contains(&config.strategy.as_str()) {
            return Err(DispatchError::UnknownStrategy(config.strategy.clone()));
        }
        config.validate().map_err(DispatchError::InvalidConfig)?;

        Ok(Self {
            roster: Roster::new(),
            board: JobBoard::new(),
            validator: AssignmentValidator::new(config.granularity()),
            allocator: TimeSlotAllocator::new(&config),
            monitor: SlaMonitor::new(config.approaching_window()),
            alerts: AlertEngine::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn board(&self) -> &JobBoard {
        &self.board
    }

    pub fn allocator(&self) -> &TimeSlotAllocator {
        &self.allocator
    }

    // ----- intake and roster -----

    /// Accept a new job from intake and take its first SLA reading.
    pub fn intake(&self, job: Job, now: NaiveDateTime) -> Result<(), DispatchError> {
        let observed = job.clone();
        self.board.intake(job)?;
        log_changes!(self.config.verbosity, "Intake: job {}", observed.id);
        self.observe(&observed, now);
        Ok(())
    }

    /// Register a technician or start their new shift.
    pub fn refresh_technician(&self, technician: Technician) -> Result<(), DispatchError> {
        let id = technician.id.clone();
        self.roster
            .refresh(technician, |reservation| self.allocator.is_live(reservation))?;
        log_changes!(self.config.verbosity, "Roster: refreshed {}", id);
        Ok(())
    }

    pub fn set_duty(&self, technician_id: &str, duty: TechnicianStatus) -> Result<(), DispatchError> {
        self.technician_entry(technician_id)?.lock().duty = duty;
        log_changes!(
            self.config.verbosity,
            "Roster: {} is {}",
            technician_id,
            duty.as_str()
        );
        Ok(())
    }

    pub fn add_break(&self, technician_id: &str, interval: Interval) -> Result<(), DispatchError> {
        Ok(self.allocator.block(&self.roster, technician_id, interval)?)
    }

    /// Record a clock-in; raises `late_clockin` past the grace period.
    pub fn clock_in(
        &self,
        technician_id: &str,
        at: NaiveDateTime,
    ) -> Result<Option<AlertId>, DispatchError> {
        let snapshot = {
            let entry = self.technician_entry(technician_id)?;
            let mut technician = entry.lock();
            technician.clocked_in_at = Some(at);
            technician.last_activity_at = Some(at);
            technician.duty = TechnicianStatus::OnDuty;
            technician.clone()
        };
        log_changes!(self.config.verbosity, "Clock-in: {} at {}", technician_id, at);
        Ok(self.alerts.observe_clock_in(&snapshot, at))
    }

    pub fn clock_out(&self, technician_id: &str, at: NaiveDateTime) -> Result<(), DispatchError> {
        self.technician_entry(technician_id)?.lock().duty = TechnicianStatus::OffDuty;
        log_changes!(self.config.verbosity, "Clock-out: {} at {}", technician_id, at);
        Ok(())
    }

    /// Record a technician's reported zone; raises `location_anomaly` if it
    /// does not match their in-progress job.
    pub fn report_location(
        &self,
        technician_id: &str,
        zone: &str,
        at: NaiveDateTime,
    ) -> Result<Option<AlertId>, DispatchError> {
        let snapshot = {
            let entry = self.technician_entry(technician_id)?;
            let mut technician = entry.lock();
            technician.current_zone = Some(zone.to_string());
            technician.clone()
        };
        let working = self.board.snapshots().into_iter().find(|job| {
            job.status == JobStatus::InProgress
                && job.assigned_technician_id() == Some(technician_id)
        });
        Ok(working.and_then(|job| self.alerts.observe_location(&snapshot, &job, zone, at)))
    }

    // ----- assignment -----

    /// Speculative eligibility check against current snapshots. No side effects.
    pub fn validate(
        &self,
        job_id: &str,
        technician_id: &str,
        start: NaiveDateTime,
    ) -> Result<Eligibility, DispatchError> {
        let job = self
            .board
            .snapshot(job_id)
            .ok_or_else(|| DispatchError::JobNotFound(job_id.to_string()))?;
        let technician = self
            .roster
            .snapshot(technician_id)
            .ok_or_else(|| DispatchError::TechnicianNotFound(technician_id.to_string()))?;
        Ok(self.validator.validate(&job, &technician, start))
    }

    /// Assign an unassigned job to a technician starting at `start`.
    pub fn assign(
        &self,
        job_id: &str,
        technician_id: &str,
        start: NaiveDateTime,
        assigned_by: &str,
        now: NaiveDateTime,
    ) -> Result<Assignment, DispatchError> {
        let entry = self.job_entry(job_id)?;
        let mut job = self.lock_job(job_id, &entry)?;
        self.assign_locked(&mut job, technician_id, start, assigned_by, now)
    }

    /// Like `assign`, but re-validates and retries once on a reservation conflict.
    pub fn assign_with_retry(
        &self,
        job_id: &str,
        technician_id: &str,
        start: NaiveDateTime,
        assigned_by: &str,
        now: NaiveDateTime,
    ) -> Result<Assignment, DispatchError> {
        match self.assign(job_id, technician_id, start, assigned_by, now) {
            Err(DispatchError::Conflict { .. }) | Err(DispatchError::Busy(_)) => {
                log_checks!(
                    self.config.verbosity,
                    "  Conflict assigning {} to {}, retrying once",
                    job_id,
                    technician_id
                );
                self.assign(job_id, technician_id, start, assigned_by, now)
            }
            other => other,
        }
    }

    fn assign_locked(
        &self,
        job: &mut Job,
        technician_id: &str,
        start: NaiveDateTime,
        assigned_by: &str,
        now: NaiveDateTime,
    ) -> Result<Assignment, DispatchError> {
        JobStateMachine::check(job, JobEvent::Assign)?;
        let technician = self
            .roster
            .snapshot(technician_id)
            .ok_or_else(|| DispatchError::TechnicianNotFound(technician_id.to_string()))?;

        let interval = match self.validator.validate(job, &technician, start) {
            Eligibility::Eligible { interval } => interval,
            Eligibility::Rejected(reason) => {
                log_rejection!(self.config.verbosity, job.id, technician_id, reason);
                if reason == RejectionReason::SkillMismatch {
                    self.alerts.skill_mismatch_attempt(job, &technician, now);
                }
                return Err(reason.into());
            }
        };

        let reservation = self
            .allocator
            .reserve(&self.roster, technician_id, &job.id, interval)?;
        let assignment = Assignment {
            job_id: job.id.clone(),
            technician_id: technician_id.to_string(),
            reservation_id: reservation.id,
            slot: reservation.interval,
            assigned_at: now,
            assigned_by: assigned_by.to_string(),
        };
        if let Err(err) = JobStateMachine::assign(job, assignment.clone(), now) {
            self.allocator.release(&self.roster, reservation.id);
            return Err(err.into());
        }

        log_changes!(
            self.config.verbosity,
            "Assigned {} to {} at {} by {}",
            job.id,
            technician_id,
            assignment.slot,
            assigned_by
        );
        self.observe(job, now);
        Ok(assignment)
    }

    /// Cancel an assignment: release the slot, then return the job to unassigned.
    ///
    /// Returns the assignment that was removed.
    pub fn cancel(
        &self,
        job_id: &str,
        now: NaiveDateTime,
    ) -> Result<Option<Assignment>, DispatchError> {
        let entry = self.job_entry(job_id)?;
        let mut job = self.lock_job(job_id, &entry)?;
        let (_, previous) = self.cancel_locked(&mut job, now)?;
        Ok(previous)
    }

    fn cancel_locked(
        &self,
        job: &mut Job,
        now: NaiveDateTime,
    ) -> Result<(StatusChange, Option<Assignment>), DispatchError> {
        let (change, previous) = JobStateMachine::unassign(job, now, |assignment| {
            self.allocator
                .release(&self.roster, assignment.reservation_id);
        })?;
        log_changes!(
            self.config.verbosity,
            "Cancelled assignment of {} ({} -> {})",
            job.id,
            change.from,
            change.to
        );
        self.observe(job, now);
        Ok((change, previous))
    }

    /// Move a job to another technician or time: cancel, then assign.
    ///
    /// Both steps run under the job's lock. If the new assignment is refused
    /// the job is left unassigned.
    pub fn reassign(
        &self,
        job_id: &str,
        technician_id: &str,
        start: NaiveDateTime,
        assigned_by: &str,
        now: NaiveDateTime,
    ) -> Result<Assignment, DispatchError> {
        let entry = self.job_entry(job_id)?;
        let mut job = self.lock_job(job_id, &entry)?;
        self.cancel_locked(&mut job, now)?;
        self.assign_locked(&mut job, technician_id, start, assigned_by, now)
    }

    /// Apply a lifecycle event (accept, start, complete, delay, ...).
    ///
    /// `Cancel` is routed through `cancel`; `Assign` needs a technician and is
    /// rejected here.
    pub fn apply_event(
        &self,
        job_id: &str,
        event: JobEvent,
        now: NaiveDateTime,
    ) -> Result<StatusChange, DispatchError> {
        let entry = self.job_entry(job_id)?;
        let mut job = self.lock_job(job_id, &entry)?;
        if event == JobEvent::Cancel {
            return self.cancel_locked(&mut job, now).map(|(change, _)| change);
        }

        let change = JobStateMachine::apply(&mut job, event, now)?;
        if matches!(
            event,
            JobEvent::Complete | JobEvent::FollowUp | JobEvent::Close
        ) {
            // The slot stays on the timeline as history
            if let Some(assignment) = job.assignment() {
                self.allocator.retire(assignment.reservation_id);
            }
        }
        if event.is_technician_action() {
            if let Some(technician_id) = job.assigned_technician_id() {
                self.touch_technician(technician_id, now);
            }
        }

        log_changes!(
            self.config.verbosity,
            "Job {}: {} -> {} ({})",
            job.id,
            change.from,
            change.to,
            event
        );
        self.observe(&job, now);
        Ok(change)
    }

    // ----- read side -----

    pub fn job(&self, job_id: &str, now: NaiveDateTime) -> Result<JobSnapshot, DispatchError> {
        let job = self
            .board
            .snapshot(job_id)
            .ok_or_else(|| DispatchError::JobNotFound(job_id.to_string()))?;
        Ok(self.with_sla(job, now))
    }

    /// All jobs with SLA status derived at `now`.
    pub fn jobs(&self, now: NaiveDateTime) -> Vec<JobSnapshot> {
        self.board
            .snapshots()
            .into_iter()
            .map(|job| self.with_sla(job, now))
            .collect()
    }

    pub fn technician(&self, technician_id: &str) -> Result<Technician, DispatchError> {
        self.roster
            .snapshot(technician_id)
            .ok_or_else(|| DispatchError::TechnicianNotFound(technician_id.to_string()))
    }

    pub fn technicians(&self) -> Vec<Technician> {
        self.roster.snapshots()
    }

    pub fn alerts_since(&self, cursor: AlertId) -> Vec<Alert> {
        self.alerts.alerts_since(cursor)
    }

    pub fn unresolved_alerts(&self) -> Vec<Alert> {
        self.alerts.unresolved()
    }

    pub fn resolve_alert(&self, id: AlertId, at: NaiveDateTime) -> Result<bool, DispatchError> {
        Ok(self.alerts.resolve(id, at)?)
    }

    // ----- periodic sweep -----

    /// Evaluate every job and technician against `now`, raising alerts.
    ///
    /// Works on snapshots and never holds more than one lock at a time. With
    /// `auto_delay_on_breach`, breached in-progress jobs are moved to delayed
    /// through the state machine.
    pub fn sweep(&self, now: NaiveDateTime) -> SweepReport {
        let verbosity = self.config.verbosity;
        // Snapshots may be stale by the time they are observed; the alert
        // engine drops observations older than the job's last recorded one.
        let jobs = self.board.snapshots();
        let mut report = SweepReport {
            evaluated: jobs.len(),
            ..SweepReport::default()
        };

        let mut breached_in_progress = Vec::new();
        for job in &jobs {
            let status = self.monitor.evaluate(job, now);
            log_debug!(
                verbosity,
                "  Sweep {}: {} ({})",
                job.id,
                status.as_str(),
                job.status
            );
            report.raised.extend(self.alerts.observe_sla(job, status, now));
            if status == SlaStatus::Breached && job.status == JobStatus::InProgress {
                breached_in_progress.push(job.id.clone());
            }
        }

        for technician in self.roster.snapshots() {
            let working = jobs.iter().filter(|job| {
                job.status == JobStatus::InProgress
                    && job.assigned_technician_id() == Some(technician.id.as_str())
            });
            for job in working {
                log_debug!(verbosity, "  Idle check {} on {}", technician.id, job.id);
                report
                    .raised
                    .extend(self.alerts.observe_idle(&technician, job, now));
            }
        }

        if self.config.auto_delay_on_breach {
            for job_id in breached_in_progress {
                match self.apply_event(&job_id, JobEvent::Delay, now) {
                    Ok(_) => report.auto_delayed.push(job_id),
                    // The job moved on since the snapshot was taken
                    Err(err) => {
                        log_checks!(verbosity, "  Auto-delay of {} skipped: {}", job_id, err);
                    }
                }
            }
        }

        report
    }

    // ----- helpers -----

    fn observe(&self, job: &Job, now: NaiveDateTime) -> Option<AlertId> {
        let status = self.monitor.evaluate(job, now);
        self.alerts.observe_sla(job, status, now)
    }

    fn with_sla(&self, job: Job, now: NaiveDateTime) -> JobSnapshot {
        let sla_status = self.monitor.evaluate(&job, now);
        JobSnapshot { job, sla_status }
    }

    fn touch_technician(&self, technician_id: &str, at: NaiveDateTime) {
        if let Some(entry) = self.roster.entry(technician_id) {
            entry.lock().last_activity_at = Some(at);
        }
    }

    fn job_entry(&self, job_id: &str) -> Result<Entry<Job>, DispatchError> {
        self.board
            .entry(job_id)
            .ok_or_else(|| DispatchError::JobNotFound(job_id.to_string()))
    }

    fn technician_entry(&self, technician_id: &str) -> Result<Entry<Technician>, DispatchError> {
        self.roster
            .entry(technician_id)
            .ok_or_else(|| DispatchError::TechnicianNotFound(technician_id.to_string()))
    }

    fn lock_job<'a>(
        &self,
        job_id: &str,
        entry: &'a Entry<Job>,
    ) -> Result<MutexGuard<'a, Job>, DispatchError> {
        entry
            .try_lock_for(self.config.lock_timeout())
            .ok_or_else(|| DispatchError::Busy(job_id.to_string()))
    }
}
