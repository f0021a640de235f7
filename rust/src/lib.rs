//! Rust implementation of the field-service dispatch core.
//!
//! This module provides the thread-safe dispatch engine (timelines, slot
//! allocation, job lifecycle, SLA monitoring and alerts) and its Python surface.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::{NaiveDateTime, Utc};
use parking_lot::Mutex;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::sync::Arc;

mod arena;
mod config;
pub mod display;
mod job_board;
pub mod logging;
mod models;
pub mod monitoring;
mod roster;
pub mod scheduler;
pub mod sorting;
mod views;

pub use arena::{ArenaIndex, Entry, IdArena};
pub use config::{DispatchConfig, STRATEGIES};
pub use display::{job_status_style, severity_style, sla_status_style, StatusStyle};
pub use job_board::{JobBoard, JobBoardError};
pub use models::{
    Alert, AlertId, AlertKind, Assignment, Interval, Job, JobCategory, JobEvent, JobId,
    JobPriority, JobStatus, ReservationId, Severity, StatusChange, Technician, TechnicianId,
    TechnicianStatus,
};
pub use monitoring::{AlertEngine, ApproachingWindow, SlaMonitor, SlaStatus, SweepHandle};
pub use roster::{Roster, RosterError};
pub use scheduler::{
    AssignmentValidator, Candidate, DispatchError, DispatchReport, Dispatcher, Eligibility,
    JobSnapshot, JobStateMachine, RejectionReason, SweepReport, TimeSlotAllocator, Timeline,
};
pub use sorting::{sort_jobs, JobSortInfo, SortKey, SortingError};
pub use views::{
    AlertView, AssignmentOutcome, AssignmentView, CandidateView, DispatchReportView, JobView,
    SlotView, SweepReportView, TechnicianView,
};

fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn value_error(err: DispatchError) -> PyErr {
    PyValueError::new_err(format!("{}: {}", err.code(), err))
}

fn interval(start: NaiveDateTime, end: NaiveDateTime) -> PyResult<Interval> {
    Interval::new(start, end)
        .ok_or_else(|| PyValueError::new_err(format!("empty interval: {} - {}", start, end)))
}

fn parse<T>(value: &str, what: &str, parser: fn(&str) -> Option<T>) -> PyResult<T> {
    parser(value).ok_or_else(|| PyValueError::new_err(format!("unknown {}: {:?}", what, value)))
}

/// Dispatch engine handle (PyO3 wrapper).
///
/// Every method that depends on the current time takes an optional `now`
/// (naive UTC); it defaults to the wall clock.
#[pyclass(name = "Dispatcher")]
pub struct PyDispatcher {
    inner: Arc<Dispatcher>,
    sweeper: Mutex<Option<SweepHandle>>,
}

#[pymethods]
impl PyDispatcher {
    #[new]
    #[pyo3(signature = (config=None))]
    fn new(config: Option<DispatchConfig>) -> PyResult<Self> {
        let dispatcher = Dispatcher::new(config.unwrap_or_default()).map_err(value_error)?;
        Ok(Self {
            inner: Arc::new(dispatcher),
            sweeper: Mutex::new(None),
        })
    }

    #[getter]
    fn config(&self) -> DispatchConfig {
        self.inner.config().clone()
    }

    /// Accept a job from intake. Raises ValueError for duplicates or bad enums.
    #[pyo3(signature = (
        id,
        category,
        priority,
        required_skills,
        estimated_duration_minutes,
        due_at,
        zone,
        now=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn intake(
        &self,
        id: String,
        category: &str,
        priority: &str,
        required_skills: Vec<String>,
        estimated_duration_minutes: i64,
        due_at: NaiveDateTime,
        zone: String,
        now: Option<NaiveDateTime>,
    ) -> PyResult<()> {
        let job = Job::new(
            id,
            parse(category, "job category", JobCategory::parse)?,
            parse(priority, "job priority", JobPriority::parse)?,
            required_skills,
            estimated_duration_minutes,
            due_at,
            zone,
        );
        self.inner
            .intake(job, now.unwrap_or_else(utc_now))
            .map_err(value_error)
    }

    /// Register a technician or start a new shift for them.
    #[pyo3(signature = (id, name, skills, shift_start, shift_end, breaks=vec![]))]
    fn refresh_technician(
        &self,
        id: String,
        name: String,
        skills: Vec<String>,
        shift_start: NaiveDateTime,
        shift_end: NaiveDateTime,
        breaks: Vec<(NaiveDateTime, NaiveDateTime)>,
    ) -> PyResult<()> {
        let shift = interval(shift_start, shift_end)?;
        let breaks = breaks
            .into_iter()
            .map(|(start, end)| interval(start, end))
            .collect::<PyResult<Vec<_>>>()?;
        self.inner
            .refresh_technician(Technician::new(id, name, skills, shift, &breaks))
            .map_err(value_error)
    }

    fn set_duty(&self, technician_id: &str, duty: &str) -> PyResult<()> {
        let duty = parse(duty, "duty status", TechnicianStatus::parse)?;
        self.inner
            .set_duty(technician_id, duty)
            .map_err(value_error)
    }

    fn add_break(&self, technician_id: &str, start: NaiveDateTime, end: NaiveDateTime) -> PyResult<()> {
        self.inner
            .add_break(technician_id, interval(start, end)?)
            .map_err(value_error)
    }

    /// Returns the id of a `late_clockin` alert if one was raised.
    #[pyo3(signature = (technician_id, at=None))]
    fn clock_in(&self, technician_id: &str, at: Option<NaiveDateTime>) -> PyResult<Option<u64>> {
        self.inner
            .clock_in(technician_id, at.unwrap_or_else(utc_now))
            .map_err(value_error)
    }

    #[pyo3(signature = (technician_id, at=None))]
    fn clock_out(&self, technician_id: &str, at: Option<NaiveDateTime>) -> PyResult<()> {
        self.inner
            .clock_out(technician_id, at.unwrap_or_else(utc_now))
            .map_err(value_error)
    }

    #[pyo3(signature = (technician_id, zone, at=None))]
    fn report_location(
        &self,
        technician_id: &str,
        zone: &str,
        at: Option<NaiveDateTime>,
    ) -> PyResult<Option<u64>> {
        self.inner
            .report_location(technician_id, zone, at.unwrap_or_else(utc_now))
            .map_err(value_error)
    }

    /// Check eligibility without side effects.
    fn validate(&self, job_id: &str, technician_id: &str, start: NaiveDateTime) -> AssignmentOutcome {
        match self.inner.validate(job_id, technician_id, start) {
            Ok(Eligibility::Eligible { .. }) => AssignmentOutcome::eligible(),
            Ok(Eligibility::Rejected(reason)) => {
                AssignmentOutcome::failed(&DispatchError::from(reason))
            }
            Err(err) => AssignmentOutcome::failed(&err),
        }
    }

    /// Assign a job. Failures are reported in the outcome, never raised.
    #[pyo3(signature = (job_id, technician_id, start, assigned_by="coordinator", retry=false, now=None))]
    #[allow(clippy::too_many_arguments)]
    fn assign(
        &self,
        py: Python<'_>,
        job_id: &str,
        technician_id: &str,
        start: NaiveDateTime,
        assigned_by: &str,
        retry: bool,
        now: Option<NaiveDateTime>,
    ) -> AssignmentOutcome {
        let now = now.unwrap_or_else(utc_now);
        // Lock waits must not hold the GIL
        py.allow_threads(|| {
            if retry {
                self.inner
                    .assign_with_retry(job_id, technician_id, start, assigned_by, now)
            } else {
                self.inner
                    .assign(job_id, technician_id, start, assigned_by, now)
            }
        })
        .into()
    }

    #[pyo3(signature = (job_id, technician_id, start, assigned_by="coordinator", now=None))]
    fn reassign(
        &self,
        py: Python<'_>,
        job_id: &str,
        technician_id: &str,
        start: NaiveDateTime,
        assigned_by: &str,
        now: Option<NaiveDateTime>,
    ) -> AssignmentOutcome {
        let now = now.unwrap_or_else(utc_now);
        py.allow_threads(|| {
            self.inner
                .reassign(job_id, technician_id, start, assigned_by, now)
        })
        .into()
    }

    /// Release a job's slot and return it to unassigned.
    #[pyo3(signature = (job_id, now=None))]
    fn cancel(&self, job_id: &str, now: Option<NaiveDateTime>) -> PyResult<Option<AssignmentView>> {
        let previous = self
            .inner
            .cancel(job_id, now.unwrap_or_else(utc_now))
            .map_err(value_error)?;
        Ok(previous.as_ref().map(AssignmentView::from))
    }

    /// Apply a lifecycle event by name; returns the new status.
    #[pyo3(signature = (job_id, event, now=None))]
    fn apply_event(&self, job_id: &str, event: &str, now: Option<NaiveDateTime>) -> PyResult<String> {
        let event = parse(event, "job event", JobEvent::parse)?;
        let change = self
            .inner
            .apply_event(job_id, event, now.unwrap_or_else(utc_now))
            .map_err(value_error)?;
        Ok(change.to.as_str().to_string())
    }

    /// Ranked technicians for a job; empty if nobody qualifies.
    #[pyo3(signature = (job_id, now=None))]
    fn suggest_candidates(
        &self,
        job_id: &str,
        now: Option<NaiveDateTime>,
    ) -> PyResult<Vec<CandidateView>> {
        match self
            .inner
            .suggest_candidates(job_id, now.unwrap_or_else(utc_now))
        {
            Ok(candidates) => Ok(candidates.iter().map(CandidateView::from).collect()),
            Err(DispatchError::Rejected(_)) => Ok(Vec::new()),
            Err(err) => Err(value_error(err)),
        }
    }

    #[pyo3(signature = (assigned_by="auto", now=None))]
    fn dispatch_pending(
        &self,
        py: Python<'_>,
        assigned_by: &str,
        now: Option<NaiveDateTime>,
    ) -> PyResult<DispatchReportView> {
        let now = now.unwrap_or_else(utc_now);
        let report = py
            .allow_threads(|| self.inner.dispatch_pending(assigned_by, now))
            .map_err(value_error)?;
        Ok(report.into())
    }

    #[pyo3(signature = (job_id, now=None))]
    fn job(&self, job_id: &str, now: Option<NaiveDateTime>) -> PyResult<JobView> {
        let snapshot = self
            .inner
            .job(job_id, now.unwrap_or_else(utc_now))
            .map_err(value_error)?;
        Ok(JobView::from(&snapshot))
    }

    /// All jobs with SLA status derived at `now`.
    #[pyo3(signature = (now=None))]
    fn jobs(&self, now: Option<NaiveDateTime>) -> Vec<JobView> {
        self.inner
            .jobs(now.unwrap_or_else(utc_now))
            .iter()
            .map(JobView::from)
            .collect()
    }

    fn technician(&self, technician_id: &str) -> PyResult<TechnicianView> {
        let technician = self.inner.technician(technician_id).map_err(value_error)?;
        Ok(TechnicianView::from(&technician))
    }

    fn technicians(&self) -> Vec<TechnicianView> {
        self.inner
            .technicians()
            .iter()
            .map(TechnicianView::from)
            .collect()
    }

    /// Alerts with id greater than `cursor`, oldest first.
    #[pyo3(signature = (cursor=0))]
    fn alerts_since(&self, cursor: u64) -> Vec<AlertView> {
        self.inner
            .alerts_since(cursor)
            .iter()
            .map(AlertView::from)
            .collect()
    }

    fn unresolved_alerts(&self) -> Vec<AlertView> {
        self.inner
            .unresolved_alerts()
            .iter()
            .map(AlertView::from)
            .collect()
    }

    #[pyo3(signature = (alert_id, at=None))]
    fn resolve_alert(&self, alert_id: u64, at: Option<NaiveDateTime>) -> PyResult<bool> {
        self.inner
            .resolve_alert(alert_id, at.unwrap_or_else(utc_now))
            .map_err(value_error)
    }

    /// Run one SLA/alert sweep immediately.
    #[pyo3(signature = (now=None))]
    fn sweep(&self, py: Python<'_>, now: Option<NaiveDateTime>) -> SweepReportView {
        let now = now.unwrap_or_else(utc_now);
        py.allow_threads(|| self.inner.sweep(now)).into()
    }

    /// Start the background sweeper. No-op if it is already running.
    fn start_sweeper(&self) -> PyResult<()> {
        let mut sweeper = self.sweeper.lock();
        if sweeper.as_ref().is_some_and(SweepHandle::is_running) {
            return Ok(());
        }
        let interval = self.inner.config().sweep_interval();
        let handle = SweepHandle::spawn(Arc::clone(&self.inner), interval, utc_now)
            .map_err(|e| PyRuntimeError::new_err(format!("failed to start sweeper: {}", e)))?;
        *sweeper = Some(handle);
        Ok(())
    }

    fn stop_sweeper(&self, py: Python<'_>) {
        let handle = self.sweeper.lock().take();
        if let Some(mut handle) = handle {
            py.allow_threads(|| handle.stop());
        }
    }

    #[getter]
    fn sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(SweepHandle::is_running)
    }

    fn __repr__(&self) -> String {
        format!(
            "Dispatcher(jobs={}, technicians={}, strategy={:?})",
            self.inner.board().len(),
            self.inner.roster().len(),
            self.inner.config().strategy
        )
    }
}

/// Look up (label, colour, icon) for a status.
///
/// `kind` is "job", "sla" or "severity"; `value` is the canonical status name.
#[pyfunction]
fn status_style(kind: &str, value: &str) -> PyResult<(String, String, String)> {
    let style = display::lookup(kind, value).ok_or_else(|| {
        PyValueError::new_err(format!("no style for {} status {:?}", kind, value))
    })?;
    Ok((
        style.label.to_string(),
        style.color.to_string(),
        style.icon.to_string(),
    ))
}

/// The fieldops.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Engine and config
    m.add_class::<PyDispatcher>()?;
    m.add_class::<DispatchConfig>()?;

    // Views
    m.add_class::<JobView>()?;
    m.add_class::<TechnicianView>()?;
    m.add_class::<SlotView>()?;
    m.add_class::<AlertView>()?;
    m.add_class::<AssignmentView>()?;
    m.add_class::<AssignmentOutcome>()?;
    m.add_class::<CandidateView>()?;
    m.add_class::<SweepReportView>()?;
    m.add_class::<DispatchReportView>()?;

    // Presentation
    m.add_function(wrap_pyfunction!(status_style, m)?)?;

    Ok(())
}
