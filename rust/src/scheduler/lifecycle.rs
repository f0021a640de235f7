//! Job lifecycle state machine.
//!
//! ```text
//! unassigned -> assigned -> accepted -> in_progress -> completed -> roc_closed
//!                                            |   ^
//!                                            v   |
//!                                   delayed/escalated -> followup -> roc_closed
//! assigned | accepted | in_progress | delayed | escalated -- cancel --> unassigned
//! ```

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::models::{Assignment, Job, JobEvent, JobId, JobStatus, StatusChange};

/// An event that is not legal from the job's current status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid transition for job {job_id}: {event} is not allowed from {from}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: JobStatus,
    pub event: JobEvent,
}

/// Transition table. `None` means the event is illegal from `from`.
pub fn next_status(from: JobStatus, event: JobEvent) -> Option<JobStatus> {
    use JobEvent as E;
    use JobStatus as S;

    match (from, event) {
        (S::Unassigned, E::Assign) => Some(S::Assigned),
        (S::Assigned, E::Accept) => Some(S::Accepted),
        (S::Accepted, E::Start) => Some(S::InProgress),
        (S::InProgress, E::Complete) => Some(S::Completed),
        (S::InProgress, E::Delay) => Some(S::Delayed),
        (S::InProgress, E::Escalate) => Some(S::Escalated),
        (S::Delayed | S::Escalated, E::Resume) => Some(S::InProgress),
        (S::Delayed | S::Escalated, E::FollowUp) => Some(S::Followup),
        (S::Completed | S::Followup, E::Close) => Some(S::RocClosed),
        (
            S::Assigned | S::Accepted | S::InProgress | S::Delayed | S::Escalated,
            E::Cancel,
        ) => Some(S::Unassigned),
        _ => None,
    }
}

/// Applies transitions to a job, keeping the assignment fields consistent
/// with the status: a technician is recorded iff the job is not unassigned.
pub struct JobStateMachine;

impl JobStateMachine {
    /// Status the job would move to, without mutating it.
    pub fn check(job: &Job, event: JobEvent) -> Result<JobStatus, TransitionError> {
        next_status(job.status, event).ok_or_else(|| TransitionError {
            job_id: job.id.clone(),
            from: job.status,
            event,
        })
    }

    /// Apply an operator or technician event.
    ///
    /// `Assign` and `Cancel` change the reservation as well and are only
    /// reachable through `assign` and `unassign`.
    pub fn apply(
        job: &mut Job,
        event: JobEvent,
        at: NaiveDateTime,
    ) -> Result<StatusChange, TransitionError> {
        if matches!(event, JobEvent::Assign | JobEvent::Cancel) {
            return Err(TransitionError {
                job_id: job.id.clone(),
                from: job.status,
                event,
            });
        }
        Self::step(job, event, at)
    }

    /// Commit `unassigned -> assigned` for a granted reservation.
    pub(crate) fn assign(
        job: &mut Job,
        assignment: Assignment,
        at: NaiveDateTime,
    ) -> Result<StatusChange, TransitionError> {
        Self::check(job, JobEvent::Assign)?;
        job.assigned_technician_id = Some(assignment.technician_id.clone());
        job.assignment = Some(assignment);
        Self::step(job, JobEvent::Assign, at)
    }

    /// Return the job to `unassigned`.
    ///
    /// `release` is called with the current assignment before the technician
    /// is cleared, so the slot is freed while the job still references it.
    pub(crate) fn unassign(
        job: &mut Job,
        at: NaiveDateTime,
        release: impl FnOnce(&Assignment),
    ) -> Result<(StatusChange, Option<Assignment>), TransitionError> {
        Self::check(job, JobEvent::Cancel)?;
        if let Some(assignment) = job.assignment.as_ref() {
            release(assignment);
        }
        let previous = job.assignment.take();
        job.assigned_technician_id = None;
        let change = Self::step(job, JobEvent::Cancel, at)?;
        Ok((change, previous))
    }

    fn step(
        job: &mut Job,
        event: JobEvent,
        at: NaiveDateTime,
    ) -> Result<StatusChange, TransitionError> {
        let to = Self::check(job, event)?;
        let change = StatusChange {
            from: job.status,
            to,
            event,
            at,
        };
        job.status = to;
        job.history.push(change.clone());
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Interval, JobCategory, JobPriority};
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn job() -> Job {
        Job::new(
            "J1",
            JobCategory::Emergency,
            JobPriority::Critical,
            vec![],
            60,
            at(15),
            "south",
        )
    }

    fn assignment() -> Assignment {
        Assignment {
            job_id: "J1".to_string(),
            technician_id: "T1".to_string(),
            reservation_id: 1,
            slot: Interval::new(at(9), at(10)).unwrap(),
            assigned_at: at(8),
            assigned_by: "coordinator".to_string(),
        }
    }

    #[test]
    fn test_full_happy_path() {
        let mut job = job();
        JobStateMachine::assign(&mut job, assignment(), at(8)).unwrap();
        assert_eq!(job.assigned_technician_id(), Some("T1"));

        for event in [JobEvent::Accept, JobEvent::Start, JobEvent::Complete, JobEvent::Close] {
            JobStateMachine::apply(&mut job, event, at(9)).unwrap();
        }
        assert_eq!(job.status(), JobStatus::RocClosed);
        assert_eq!(job.history().len(), 5);
        assert_eq!(job.assigned_technician_id(), Some("T1"));
    }

    #[test]
    fn test_delay_resume_and_followup() {
        let mut job = job();
        JobStateMachine::assign(&mut job, assignment(), at(8)).unwrap();
        JobStateMachine::apply(&mut job, JobEvent::Accept, at(8)).unwrap();
        JobStateMachine::apply(&mut job, JobEvent::Start, at(9)).unwrap();
        JobStateMachine::apply(&mut job, JobEvent::Delay, at(10)).unwrap();
        JobStateMachine::apply(&mut job, JobEvent::Resume, at(11)).unwrap();
        JobStateMachine::apply(&mut job, JobEvent::Escalate, at(12)).unwrap();
        JobStateMachine::apply(&mut job, JobEvent::FollowUp, at(13)).unwrap();
        JobStateMachine::apply(&mut job, JobEvent::Close, at(14)).unwrap();
        assert_eq!(job.status(), JobStatus::RocClosed);
    }

    #[test]
    fn test_illegal_transition_leaves_job_unchanged() {
        let mut job = job();
        let err = JobStateMachine::apply(&mut job, JobEvent::Complete, at(9)).unwrap_err();
        assert_eq!(err.from, JobStatus::Unassigned);
        assert_eq!(err.event, JobEvent::Complete);
        assert_eq!(job.status(), JobStatus::Unassigned);
        assert!(job.history().is_empty());
    }

    #[test]
    fn test_assign_and_cancel_not_reachable_through_apply() {
        let mut job = job();
        assert!(JobStateMachine::apply(&mut job, JobEvent::Assign, at(9)).is_err());
        assert_eq!(job.status(), JobStatus::Unassigned);
    }

    #[test]
    fn test_double_assign_rejected() {
        let mut job = job();
        JobStateMachine::assign(&mut job, assignment(), at(8)).unwrap();
        let mut second = assignment();
        second.technician_id = "T2".to_string();
        assert!(JobStateMachine::assign(&mut job, second, at(8)).is_err());
        assert_eq!(job.assigned_technician_id(), Some("T1"));
    }

    #[test]
    fn test_unassign_releases_before_clearing() {
        let mut job = job();
        JobStateMachine::assign(&mut job, assignment(), at(8)).unwrap();

        let mut released = None;
        let (change, previous) = JobStateMachine::unassign(&mut job, at(9), |a| {
            released = Some(a.reservation_id);
        })
        .unwrap();

        assert_eq!(released, Some(1));
        assert_eq!(change.to, JobStatus::Unassigned);
        assert_eq!(previous.map(|a| a.technician_id), Some("T1".to_string()));
        assert!(job.assigned_technician_id().is_none());
        assert!(job.assignment().is_none());
    }

    #[test]
    fn test_unassign_from_delayed_and_escalated() {
        for held in [JobEvent::Delay, JobEvent::Escalate] {
            let mut job = job();
            JobStateMachine::assign(&mut job, assignment(), at(8)).unwrap();
            for event in [JobEvent::Accept, JobEvent::Start, held] {
                JobStateMachine::apply(&mut job, event, at(9)).unwrap();
            }

            let mut released = None;
            let (change, _) = JobStateMachine::unassign(&mut job, at(10), |a| {
                released = Some(a.reservation_id);
            })
            .unwrap();
            assert_eq!(released, Some(1));
            assert_eq!(change.to, JobStatus::Unassigned);
            assert!(job.assigned_technician_id().is_none());
        }
    }

    #[test]
    fn test_unassign_from_followup_rejected() {
        let mut job = job();
        JobStateMachine::assign(&mut job, assignment(), at(8)).unwrap();
        for event in [JobEvent::Accept, JobEvent::Start, JobEvent::Delay, JobEvent::FollowUp] {
            JobStateMachine::apply(&mut job, event, at(9)).unwrap();
        }
        assert!(JobStateMachine::unassign(&mut job, at(10), |_| {}).is_err());
        assert_eq!(job.status(), JobStatus::Followup);
    }

    #[test]
    fn test_unassign_from_completed_rejected() {
        let mut job = job();
        JobStateMachine::assign(&mut job, assignment(), at(8)).unwrap();
        for event in [JobEvent::Accept, JobEvent::Start, JobEvent::Complete] {
            JobStateMachine::apply(&mut job, event, at(9)).unwrap();
        }
        let mut called = false;
        assert!(JobStateMachine::unassign(&mut job, at(10), |_| called = true).is_err());
        assert!(!called);
        assert_eq!(job.assigned_technician_id(), Some("T1"));
    }
}
