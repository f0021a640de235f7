//! Eligibility checks for a (job, technician, start) triple.

use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

use crate::models::{Interval, Job, Technician, TechnicianStatus};

use super::timeline::round_up_duration;

/// Machine-readable reason an assignment was refused before reservation.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectionReason {
    #[error("technician lacks a required skill")]
    SkillMismatch,
    #[error("requested slot is not free within the shift")]
    SlotUnavailable,
    #[error("technician is off duty")]
    TechnicianOffDuty,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SkillMismatch => "skill_mismatch",
            Self::SlotUnavailable => "slot_unavailable",
            Self::TechnicianOffDuty => "technician_off_duty",
        }
    }
}

/// Outcome of validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Eligibility {
    /// The job fits; `interval` is the granularity-rounded slot to reserve.
    Eligible { interval: Interval },
    Rejected(RejectionReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible { .. })
    }
}

/// Pure eligibility decision; never mutates the job or the timeline.
#[derive(Clone, Debug)]
pub struct AssignmentValidator {
    granularity: Duration,
}

impl AssignmentValidator {
    pub fn new(granularity: Duration) -> Self {
        Self { granularity }
    }

    /// Slot a job would occupy if started at `start`.
    pub fn requested_interval(&self, job: &Job, start: NaiveDateTime) -> Option<Interval> {
        let length = round_up_duration(job.estimated_duration_minutes, self.granularity)?;
        Interval::with_duration(start, length)
    }

    /// Decide whether `technician` can take `job` starting at `requested_start`.
    ///
    /// Skill is checked first so a mismatch is always reported as such, then
    /// duty status, then time availability.
    pub fn validate(
        &self,
        job: &Job,
        technician: &Technician,
        requested_start: NaiveDateTime,
    ) -> Eligibility {
        if !technician.has_skills(&job.required_skills) {
            return Eligibility::Rejected(RejectionReason::SkillMismatch);
        }
        if technician.duty == TechnicianStatus::OffDuty {
            return Eligibility::Rejected(RejectionReason::TechnicianOffDuty);
        }
        match self.requested_interval(job, requested_start) {
            Some(interval) if technician.timeline.is_free(interval) => {
                Eligibility::Eligible { interval }
            }
            _ => Eligibility::Rejected(RejectionReason::SlotUnavailable),
        }
    }
}
