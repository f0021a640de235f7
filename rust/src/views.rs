//! Read-only Python views of dispatch state.
//!
//! Each view is a detached copy: mutating it from Python does not touch the
//! dispatcher.

use chrono::NaiveDateTime;
use pyo3::prelude::*;

use crate::models::{Alert, Assignment, Technician};
use crate::scheduler::{
    Candidate, DispatchError, DispatchReport, JobSnapshot, Slot, SlotState, SweepReport,
};

/// A job with its derived SLA status.
#[pyclass]
#[derive(Clone, Debug)]
pub struct JobView {
    #[pyo3(get)]
    pub id: String,
    #[pyo3(get)]
    pub category: String,
    #[pyo3(get)]
    pub priority: String,
    #[pyo3(get)]
    pub required_skills: Vec<String>,
    #[pyo3(get)]
    pub estimated_duration_minutes: i64,
    #[pyo3(get)]
    pub due_at: NaiveDateTime,
    #[pyo3(get)]
    pub zone: String,
    #[pyo3(get)]
    pub status: String,
    #[pyo3(get)]
    pub sla_status: String,
    #[pyo3(get)]
    pub assigned_technician_id: Option<String>,
    #[pyo3(get)]
    pub assignment: Option<AssignmentView>,
    /// (from, to, event, at) for every status change, oldest first
    #[pyo3(get)]
    pub history: Vec<(String, String, String, NaiveDateTime)>,
}

#[pymethods]
impl JobView {
    fn __repr__(&self) -> String {
        format!(
            "JobView(id={:?}, status={}, sla={}, technician={:?})",
            self.id, self.status, self.sla_status, self.assigned_technician_id
        )
    }
}

impl From<&JobSnapshot> for JobView {
    fn from(snapshot: &JobSnapshot) -> Self {
        let job = &snapshot.job;
        Self {
            id: job.id.clone(),
            category: job.category.as_str().to_string(),
            priority: job.priority.as_str().to_string(),
            required_skills: job.required_skills.clone(),
            estimated_duration_minutes: job.estimated_duration_minutes,
            due_at: job.due_at,
            zone: job.zone.clone(),
            status: job.status().as_str().to_string(),
            sla_status: snapshot.sla_status.as_str().to_string(),
            assigned_technician_id: job.assigned_technician_id().map(str::to_string),
            assignment: job.assignment().map(AssignmentView::from),
            history: job
                .history()
                .iter()
                .map(|change| {
                    (
                        change.from.as_str().to_string(),
                        change.to.as_str().to_string(),
                        change.event.as_str().to_string(),
                        change.at,
                    )
                })
                .collect(),
        }
    }
}

/// One slot of a technician's timeline.
#[pyclass]
#[derive(Clone, Debug)]
pub struct SlotView {
    #[pyo3(get)]
    pub start: NaiveDateTime,
    #[pyo3(get)]
    pub end: NaiveDateTime,
    /// "free", "reserved" or "break"
    #[pyo3(get)]
    pub state: String,
    #[pyo3(get)]
    pub job_id: Option<String>,
}

#[pymethods]
impl SlotView {
    fn __repr__(&self) -> String {
        format!(
            "SlotView({} - {}, {}{})",
            self.start,
            self.end,
            self.state,
            self.job_id
                .as_deref()
                .map(|id| format!(" {}", id))
                .unwrap_or_default()
        )
    }
}

impl From<&Slot> for SlotView {
    fn from(slot: &Slot) -> Self {
        let job_id = match &slot.state {
            SlotState::Reserved { job_id, .. } => Some(job_id.clone()),
            SlotState::Free | SlotState::Break => None,
        };
        Self {
            start: slot.interval.start,
            end: slot.interval.end,
            state: slot.state.as_str().to_string(),
            job_id,
        }
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct TechnicianView {
    #[pyo3(get)]
    pub id: String,
    #[pyo3(get)]
    pub name: String,
    /// Sorted for stable output
    #[pyo3(get)]
    pub skills: Vec<String>,
    #[pyo3(get)]
    pub duty: String,
    #[pyo3(get)]
    pub shift_start: NaiveDateTime,
    #[pyo3(get)]
    pub shift_end: NaiveDateTime,
    #[pyo3(get)]
    pub scheduled_clock_in: NaiveDateTime,
    #[pyo3(get)]
    pub clocked_in_at: Option<NaiveDateTime>,
    #[pyo3(get)]
    pub last_activity_at: Option<NaiveDateTime>,
    #[pyo3(get)]
    pub current_zone: Option<String>,
    #[pyo3(get)]
    pub timeline: Vec<SlotView>,
}

#[pymethods]
impl TechnicianView {
    fn __repr__(&self) -> String {
        format!(
            "TechnicianView(id={:?}, duty={}, slots={})",
            self.id,
            self.duty,
            self.timeline.len()
        )
    }
}

impl From<&Technician> for TechnicianView {
    fn from(technician: &Technician) -> Self {
        let mut skills: Vec<String> = technician.skills.iter().cloned().collect();
        skills.sort();
        let shift = technician.shift();
        Self {
            id: technician.id.clone(),
            name: technician.name.clone(),
            skills,
            duty: technician.duty.as_str().to_string(),
            shift_start: shift.start,
            shift_end: shift.end,
            scheduled_clock_in: technician.scheduled_clock_in,
            clocked_in_at: technician.clocked_in_at,
            last_activity_at: technician.last_activity_at,
            current_zone: technician.current_zone.clone(),
            timeline: technician
                .timeline()
                .slots()
                .iter()
                .map(SlotView::from)
                .collect(),
        }
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct AlertView {
    #[pyo3(get)]
    pub id: u64,
    #[pyo3(get)]
    pub kind: String,
    #[pyo3(get)]
    pub severity: String,
    #[pyo3(get)]
    pub job_id: Option<String>,
    #[pyo3(get)]
    pub technician_id: Option<String>,
    #[pyo3(get)]
    pub message: String,
    #[pyo3(get)]
    pub raised_at: NaiveDateTime,
    #[pyo3(get)]
    pub resolved_at: Option<NaiveDateTime>,
}

#[pymethods]
impl AlertView {
    fn __repr__(&self) -> String {
        format!(
            "AlertView(id={}, kind={}, severity={}, resolved={})",
            self.id,
            self.kind,
            self.severity,
            self.resolved_at.is_some()
        )
    }
}

impl From<&Alert> for AlertView {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id,
            kind: alert.kind.as_str().to_string(),
            severity: alert.severity.as_str().to_string(),
            job_id: alert.job_id.clone(),
            technician_id: alert.technician_id.clone(),
            message: alert.message.clone(),
            raised_at: alert.raised_at,
            resolved_at: alert.resolved_at,
        }
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct AssignmentView {
    #[pyo3(get)]
    pub job_id: String,
    #[pyo3(get)]
    pub technician_id: String,
    #[pyo3(get)]
    pub reservation_id: u64,
    #[pyo3(get)]
    pub start: NaiveDateTime,
    #[pyo3(get)]
    pub end: NaiveDateTime,
    #[pyo3(get)]
    pub assigned_at: NaiveDateTime,
    #[pyo3(get)]
    pub assigned_by: String,
}

#[pymethods]
impl AssignmentView {
    fn __repr__(&self) -> String {
        format!(
            "AssignmentView(job={:?}, technician={:?}, {} - {})",
            self.job_id, self.technician_id, self.start, self.end
        )
    }
}

impl From<&Assignment> for AssignmentView {
    fn from(assignment: &Assignment) -> Self {
        Self {
            job_id: assignment.job_id.clone(),
            technician_id: assignment.technician_id.clone(),
            reservation_id: assignment.reservation_id,
            start: assignment.slot.start,
            end: assignment.slot.end,
            assigned_at: assignment.assigned_at,
            assigned_by: assignment.assigned_by.clone(),
        }
    }
}

/// Result of an assignment command.
///
/// On failure `reason` carries the machine-readable code (`skill_mismatch`,
/// `slot_unavailable`, `technician_off_duty`, `conflict`,
/// `invalid_transition`, `not_found`).
#[pyclass]
#[derive(Clone, Debug)]
pub struct AssignmentOutcome {
    #[pyo3(get)]
    pub success: bool,
    #[pyo3(get)]
    pub reason: Option<String>,
    #[pyo3(get)]
    pub message: Option<String>,
    #[pyo3(get)]
    pub assignment: Option<AssignmentView>,
}

#[pymethods]
impl AssignmentOutcome {
    fn __bool__(&self) -> bool {
        self.success
    }

    fn __repr__(&self) -> String {
        match &self.reason {
            None => format!("AssignmentOutcome(success={})", self.success),
            Some(reason) => format!("AssignmentOutcome(success=false, reason={})", reason),
        }
    }
}

impl AssignmentOutcome {
    pub fn eligible() -> Self {
        Self {
            success: true,
            reason: None,
            message: None,
            assignment: None,
        }
    }

    pub fn failed(err: &DispatchError) -> Self {
        Self {
            success: false,
            reason: Some(err.code().to_string()),
            message: Some(err.to_string()),
            assignment: None,
        }
    }
}

impl From<Result<Assignment, DispatchError>> for AssignmentOutcome {
    fn from(result: Result<Assignment, DispatchError>) -> Self {
        match result {
            Ok(assignment) => Self {
                assignment: Some(AssignmentView::from(&assignment)),
                ..Self::eligible()
            },
            Err(err) => Self::failed(&err),
        }
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct CandidateView {
    #[pyo3(get)]
    pub technician_id: String,
    #[pyo3(get)]
    pub start: NaiveDateTime,
    #[pyo3(get)]
    pub end: NaiveDateTime,
    #[pyo3(get)]
    pub active_load: usize,
}

#[pymethods]
impl CandidateView {
    fn __repr__(&self) -> String {
        format!(
            "CandidateView(technician={:?}, start={}, load={})",
            self.technician_id, self.start, self.active_load
        )
    }
}

impl From<&Candidate> for CandidateView {
    fn from(candidate: &Candidate) -> Self {
        Self {
            technician_id: candidate.technician_id.clone(),
            start: candidate.slot.start,
            end: candidate.slot.end,
            active_load: candidate.active_load,
        }
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct SweepReportView {
    #[pyo3(get)]
    pub evaluated: usize,
    #[pyo3(get)]
    pub raised: Vec<u64>,
    #[pyo3(get)]
    pub auto_delayed: Vec<String>,
}

#[pymethods]
impl SweepReportView {
    fn __repr__(&self) -> String {
        format!(
            "SweepReportView(evaluated={}, raised={}, auto_delayed={})",
            self.evaluated,
            self.raised.len(),
            self.auto_delayed.len()
        )
    }
}

impl From<SweepReport> for SweepReportView {
    fn from(report: SweepReport) -> Self {
        Self {
            evaluated: report.evaluated,
            raised: report.raised,
            auto_delayed: report.auto_delayed,
        }
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct DispatchReportView {
    #[pyo3(get)]
    pub assigned: Vec<AssignmentView>,
    /// (job id, reason code)
    #[pyo3(get)]
    pub unplaced: Vec<(String, String)>,
}

#[pymethods]
impl DispatchReportView {
    fn __repr__(&self) -> String {
        format!(
            "DispatchReportView(assigned={}, unplaced={})",
            self.assigned.len(),
            self.unplaced.len()
        )
    }
}

impl From<DispatchReport> for DispatchReportView {
    fn from(report: DispatchReport) -> Self {
        Self {
            assigned: report.assigned.iter().map(AssignmentView::from).collect(),
            unplaced: report
                .unplaced
                .into_iter()
                .map(|(job_id, err)| (job_id, err.code().to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Interval, Job, JobCategory, JobPriority};
    use crate::monitoring::SlaStatus;
    use crate::scheduler::RejectionReason;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_job_view_fields() {
        let job = Job::new(
            "J1",
            JobCategory::Maintenance,
            JobPriority::Critical,
            vec!["Splicing".to_string()],
            90,
            at(12),
            "east",
        );
        let view = JobView::from(&JobSnapshot {
            job,
            sla_status: SlaStatus::Approaching,
        });
        assert_eq!(view.status, "unassigned");
        assert_eq!(view.sla_status, "approaching");
        assert_eq!(view.priority, "critical");
        assert!(view.assignment.is_none());
        assert!(view.history.is_empty());
    }

    #[test]
    fn test_technician_view_timeline() {
        let technician = Technician::new(
            "T1",
            "Dana",
            vec!["b".to_string(), "a".to_string()],
            Interval::new(at(8), at(17)).unwrap(),
            &[Interval::new(at(12), at(13)).unwrap()],
        );
        let view = TechnicianView::from(&technician);
        assert_eq!(view.skills, vec!["a", "b"]);
        let states: Vec<&str> = view.timeline.iter().map(|s| s.state.as_str()).collect();
        assert_eq!(states, vec!["free", "break", "free"]);
    }

    #[test]
    fn test_outcome_from_error_carries_code() {
        let outcome = AssignmentOutcome::from(Err(DispatchError::Rejected(
            RejectionReason::TechnicianOffDuty,
        )));
        assert!(!outcome.success);
        assert_eq!(outcome.reason.as_deref(), Some("technician_off_duty"));
        assert!(outcome.assignment.is_none());
    }
}
