//! Candidate ranking and batch dispatch of the unassigned backlog.

use chrono::NaiveDateTime;
use rustc_hash::FxHashMap;

use crate::log_rejection;
use crate::models::{Assignment, Interval, Job, JobId, JobStatus, TechnicianId, TechnicianStatus};
use crate::sorting::{sort_jobs, JobSortInfo};

use super::dispatcher::{DispatchError, Dispatcher};
use super::validator::RejectionReason;

/// A technician able to take a job, with the earliest slot they can offer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub technician_id: TechnicianId,
    pub slot: Interval,
    /// Jobs currently active on the technician
    pub active_load: usize,
}

/// Outcome of one batch dispatch run.
#[derive(Clone, Debug, Default)]
pub struct DispatchReport {
    pub assigned: Vec<Assignment>,
    pub unplaced: Vec<(JobId, DispatchError)>,
}

impl Dispatcher {
    /// Technicians that could take `job_id` at or after `now`, best first.
    ///
    /// Ranked by earliest slot start, then fewest active jobs, then id. When
    /// nobody qualifies the error names the closest miss: skill mismatch if
    /// nobody has the skills, off duty if every skilled technician is off
    /// duty, otherwise slot unavailable.
    pub fn suggest_candidates(
        &self,
        job_id: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<Candidate>, DispatchError> {
        let job = self
            .board()
            .snapshot(job_id)
            .ok_or_else(|| DispatchError::JobNotFound(job_id.to_string()))?;
        Ok(self.candidates_for(&job, &self.board().snapshots(), now)?)
    }

    /// Order the unassigned backlog with the configured strategy and place
    /// each job on its best available candidate.
    ///
    /// Jobs that cannot be placed are reported, not retried.
    pub fn dispatch_pending(
        &self,
        assigned_by: &str,
        now: NaiveDateTime,
    ) -> Result<DispatchReport, DispatchError> {
        let verbosity = self.config().verbosity;
        let pending = self.board().with_status(JobStatus::Unassigned);
        let infos: FxHashMap<String, JobSortInfo> = pending
            .iter()
            .map(|job| (job.id.clone(), JobSortInfo::from(job)))
            .collect();
        let ids: Vec<String> = pending.iter().map(|job| job.id.clone()).collect();
        let order = sort_jobs(&ids, &infos, now, self.config())?;

        let mut report = DispatchReport::default();
        for job_id in order {
            match self.place(&job_id, assigned_by, now) {
                Ok(assignment) => report.assigned.push(assignment),
                Err(err) => {
                    log_rejection!(verbosity, job_id, "any technician", err);
                    report.unplaced.push((job_id, err));
                }
            }
        }
        Ok(report)
    }

    fn place(
        &self,
        job_id: &str,
        assigned_by: &str,
        now: NaiveDateTime,
    ) -> Result<Assignment, DispatchError> {
        let job = self
            .board()
            .snapshot(job_id)
            .ok_or_else(|| DispatchError::JobNotFound(job_id.to_string()))?;
        // Loads change as the batch proceeds, so rank against fresh snapshots
        let candidates = self.candidates_for(&job, &self.board().snapshots(), now)?;

        let mut last_error = None;
        for candidate in candidates {
            match self.assign(
                job_id,
                &candidate.technician_id,
                candidate.slot.start,
                assigned_by,
                now,
            ) {
                Ok(assignment) => return Ok(assignment),
                Err(
                    err @ (DispatchError::Conflict { .. }
                    | DispatchError::Busy(_)
                    | DispatchError::Rejected(_)),
                ) => last_error = Some(err),
                Err(err) => return Err(err),
            }
        }
        Err(last_error.unwrap_or(DispatchError::Rejected(RejectionReason::SlotUnavailable)))
    }

    fn candidates_for(
        &self,
        job: &Job,
        jobs: &[Job],
        now: NaiveDateTime,
    ) -> Result<Vec<Candidate>, RejectionReason> {
        let mut skilled = false;
        let mut on_duty = false;
        let mut candidates = Vec::new();

        for technician in self.technicians() {
            if !technician.has_skills(&job.required_skills) {
                continue;
            }
            skilled = true;
            if technician.duty == TechnicianStatus::OffDuty {
                continue;
            }
            on_duty = true;
            let Some(slot) =
                self.allocator()
                    .next_available(&technician, now, job.estimated_duration_minutes)
            else {
                continue;
            };
            let active_load = jobs
                .iter()
                .filter(|other| {
                    other.status().is_active()
                        && other.assigned_technician_id() == Some(technician.id.as_str())
                })
                .count();
            candidates.push(Candidate {
                technician_id: technician.id.clone(),
                slot,
                active_load,
            });
        }

        if candidates.is_empty() {
            return Err(if !skilled {
                RejectionReason::SkillMismatch
            } else if !on_duty {
                RejectionReason::TechnicianOffDuty
            } else {
                RejectionReason::SlotUnavailable
            });
        }

        candidates.sort_by(|a, b| {
            a.slot
                .start
                .cmp(&b.slot.start)
                .then(a.active_load.cmp(&b.active_load))
                .then_with(|| a.technician_id.cmp(&b.technician_id))
        });
        Ok(candidates)
    }
}
