//! Alert engine: turns SLA transitions and roster anomalies into alerts.
//!
//! Alerts are append-only. While an alert is unresolved, another alert of the
//! same kind for the same job and technician is suppressed.

use chrono::{Duration, NaiveDateTime};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::config::DispatchConfig;
use crate::log_alert;
use crate::models::{
    Alert, AlertId, AlertKind, Job, JobId, JobPriority, Severity, Technician, TechnicianId,
};

use super::sla::SlaStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    #[error("Alert not found: {0}")]
    NotFound(AlertId),
}

type OpenKey = (AlertKind, Option<JobId>, Option<TechnicianId>);

#[derive(Default)]
struct AlertLog {
    alerts: Vec<Alert>,
    /// Unresolved alert per kind, job and technician
    open: FxHashMap<OpenKey, AlertId>,
    /// Last SLA status seen per job, keyed by the job's history length
    last_sla: FxHashMap<JobId, (usize, SlaStatus)>,
}

impl AlertLog {
    fn raise(
        &mut self,
        kind: AlertKind,
        severity: Severity,
        job_id: Option<&str>,
        technician_id: Option<&str>,
        message: String,
        at: NaiveDateTime,
    ) -> Option<AlertId> {
        let key = (
            kind,
            job_id.map(str::to_string),
            technician_id.map(str::to_string),
        );
        if self.open.contains_key(&key) {
            return None;
        }

        let id = self.alerts.len() as AlertId + 1;
        self.open.insert(key, id);
        self.alerts.push(Alert {
            id,
            kind,
            severity,
            job_id: job_id.map(str::to_string),
            technician_id: technician_id.map(str::to_string),
            message,
            raised_at: at,
            resolved_at: None,
        });
        Some(id)
    }
}

pub struct AlertEngine {
    log: Mutex<AlertLog>,
    idle_threshold: Duration,
    clock_in_grace: Duration,
    verbosity: u8,
}

impl AlertEngine {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            log: Mutex::new(AlertLog::default()),
            idle_threshold: config.idle_threshold(),
            clock_in_grace: config.clock_in_grace(),
            verbosity: config.verbosity,
        }
    }

    fn raise(
        &self,
        kind: AlertKind,
        severity: Severity,
        job_id: Option<&str>,
        technician_id: Option<&str>,
        message: String,
        at: NaiveDateTime,
    ) -> Option<AlertId> {
        let id = self
            .log
            .lock()
            .raise(kind, severity, job_id, technician_id, message.clone(), at)?;
        log_alert!(self.verbosity, id, kind, severity, message);
        Some(id)
    }

    /// Record the latest SLA status for a job, raising on forward transitions.
    ///
    /// A job seen for the first time is treated as previously on track. An
    /// observation of an older version of the job than the last one recorded
    /// is dropped.
    pub fn observe_sla(&self, job: &Job, status: SlaStatus, at: NaiveDateTime) -> Option<AlertId> {
        let version = job.history().len();
        let previous = {
            let mut log = self.log.lock();
            if let Some(&(seen, _)) = log.last_sla.get(&job.id) {
                if seen > version {
                    return None;
                }
            }
            log.last_sla
                .insert(job.id.clone(), (version, status))
                .map_or(SlaStatus::OnTrack, |(_, previous)| previous)
        };

        let critical = job.priority == JobPriority::Critical;
        match (previous, status) {
            (SlaStatus::OnTrack, SlaStatus::Approaching) => self.raise(
                AlertKind::ApproachingBreach,
                if critical { Severity::High } else { Severity::Medium },
                Some(&job.id),
                job.assigned_technician_id(),
                format!("Job {} is due at {}", job.id, job.due_at),
                at,
            ),
            (prev, SlaStatus::Breached) if prev != SlaStatus::Breached => self.raise(
                AlertKind::SlaBreach,
                if critical { Severity::Critical } else { Severity::High },
                Some(&job.id),
                job.assigned_technician_id(),
                format!("Job {} missed its due time {}", job.id, job.due_at),
                at,
            ),
            _ => None,
        }
    }

    /// Raise `no_activity` if `technician` holds in-progress `job` and has been
    /// quiet longer than the idle threshold.
    pub fn observe_idle(
        &self,
        technician: &Technician,
        job: &Job,
        now: NaiveDateTime,
    ) -> Option<AlertId> {
        let last_seen = [
            technician.last_activity_at,
            technician.clocked_in_at,
            job.last_changed_at(),
        ]
        .into_iter()
        .flatten()
        .max()?;
        if now - last_seen <= self.idle_threshold {
            return None;
        }
        self.raise(
            AlertKind::NoActivity,
            Severity::Medium,
            Some(&job.id),
            Some(&technician.id),
            format!(
                "{} has shown no activity on {} since {}",
                technician.name, job.id, last_seen
            ),
            now,
        )
    }

    /// Raise `late_clockin` if the clock-in is past the grace period.
    pub fn observe_clock_in(&self, technician: &Technician, at: NaiveDateTime) -> Option<AlertId> {
        let late_by = at - technician.scheduled_clock_in;
        if late_by <= self.clock_in_grace {
            return None;
        }
        let severity = if late_by > self.clock_in_grace * 2 {
            Severity::Medium
        } else {
            Severity::Low
        };
        self.raise(
            AlertKind::LateClockin,
            severity,
            None,
            Some(&technician.id),
            format!(
                "{} clocked in {} minutes late",
                technician.name,
                late_by.num_minutes()
            ),
            at,
        )
    }

    /// Raise `location_anomaly` if the reported zone differs from the zone of
    /// the technician's in-progress job.
    pub fn observe_location(
        &self,
        technician: &Technician,
        job: &Job,
        zone: &str,
        at: NaiveDateTime,
    ) -> Option<AlertId> {
        if job.zone == zone {
            return None;
        }
        self.raise(
            AlertKind::LocationAnomaly,
            Severity::Medium,
            Some(&job.id),
            Some(&technician.id),
            format!(
                "{} reported zone {} while working {} in zone {}",
                technician.name, zone, job.id, job.zone
            ),
            at,
        )
    }

    pub fn skill_mismatch_attempt(
        &self,
        job: &Job,
        technician: &Technician,
        at: NaiveDateTime,
    ) -> Option<AlertId> {
        self.raise(
            AlertKind::SkillMismatchAttempt,
            Severity::Low,
            Some(&job.id),
            Some(&technician.id),
            format!(
                "{} lacks skills {:?} required by {}",
                technician.name, job.required_skills, job.id
            ),
            at,
        )
    }

    /// Mark an alert resolved. Returns false if it was already resolved.
    pub fn resolve(&self, id: AlertId, at: NaiveDateTime) -> Result<bool, AlertError> {
        let mut log = self.log.lock();
        let alert = id
            .checked_sub(1)
            .and_then(|idx| log.alerts.get_mut(idx as usize))
            .ok_or(AlertError::NotFound(id))?;
        if alert.is_resolved() {
            return Ok(false);
        }
        alert.resolved_at = Some(at);
        let key = (alert.kind, alert.job_id.clone(), alert.technician_id.clone());
        log.open.remove(&key);
        Ok(true)
    }

    /// Alerts with id greater than `cursor`, oldest first. Cursor 0 returns all.
    pub fn alerts_since(&self, cursor: AlertId) -> Vec<Alert> {
        let log = self.log.lock();
        let start = (cursor as usize).min(log.alerts.len());
        log.alerts[start..].to_vec()
    }

    pub fn unresolved(&self) -> Vec<Alert> {
        self.log
            .lock()
            .alerts
            .iter()
            .filter(|a| !a.is_resolved())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Interval, JobCategory, JobEvent, JobStatus, StatusChange};
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn job(priority: JobPriority) -> Job {
        Job::new(
            "J1",
            JobCategory::Installation,
            priority,
            vec!["Fiber Installation".to_string()],
            180,
            at(13, 0),
            "north",
        )
    }

    fn technician() -> Technician {
        Technician::new(
            "T1",
            "Dana",
            vec!["Splicing".to_string()],
            Interval::new(at(8, 0), at(17, 0)).unwrap(),
            &[],
        )
    }

    fn engine() -> AlertEngine {
        AlertEngine::new(&DispatchConfig::default())
    }

    #[test]
    fn test_sla_transitions_raise_once() {
        let engine = engine();
        let job = job(JobPriority::Medium);

        assert!(engine.observe_sla(&job, SlaStatus::OnTrack, at(9, 0)).is_none());
        let approaching = engine.observe_sla(&job, SlaStatus::Approaching, at(12, 0));
        assert!(approaching.is_some());
        assert!(engine.observe_sla(&job, SlaStatus::Approaching, at(12, 1)).is_none());
        let breach = engine.observe_sla(&job, SlaStatus::Breached, at(13, 0));
        assert!(breach.is_some());
        assert!(engine.observe_sla(&job, SlaStatus::Breached, at(13, 30)).is_none());

        let alerts = engine.alerts_since(0);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, AlertKind::ApproachingBreach);
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(alerts[1].kind, AlertKind::SlaBreach);
        assert_eq!(alerts[1].severity, Severity::High);
    }

    #[test]
    fn test_older_job_version_ignored() {
        let engine = engine();
        let mut job = job(JobPriority::Medium);
        job.status = JobStatus::InProgress;
        let stale = job.clone();

        job.status = JobStatus::Completed;
        job.history.push(StatusChange {
            from: JobStatus::InProgress,
            to: JobStatus::Completed,
            event: JobEvent::Complete,
            at: at(12, 50),
        });
        assert!(engine
            .observe_sla(&job, SlaStatus::NotApplicable, at(12, 50))
            .is_none());
        assert!(engine.observe_sla(&stale, SlaStatus::Breached, at(13, 0)).is_none());
        assert!(engine.alerts_since(0).is_empty());
    }

    #[test]
    fn test_reraise_after_resolve() {
        let engine = engine();
        let tech = technician();
        let job = job(JobPriority::Low);
        let first = engine.skill_mismatch_attempt(&job, &tech, at(9, 0)).unwrap();
        assert!(engine.skill_mismatch_attempt(&job, &tech, at(9, 1)).is_none());

        engine.resolve(first, at(9, 2)).unwrap();
        let second = engine.skill_mismatch_attempt(&job, &tech, at(9, 3)).unwrap();
        assert_ne!(first, second);
        assert!(engine.skill_mismatch_attempt(&job, &tech, at(9, 4)).is_none());

        // Other technicians and jobs are tracked separately
        let mut other = technician();
        other.id = "T2".to_string();
        assert!(engine.skill_mismatch_attempt(&job, &other, at(9, 5)).is_some());
        assert_eq!(engine.unresolved().len(), 2);
    }

    #[test]
    fn test_critical_breach_severity() {
        let engine = engine();
        let job = job(JobPriority::Critical);
        engine.observe_sla(&job, SlaStatus::Breached, at(13, 0));
        assert_eq!(engine.alerts_since(0)[0].severity, Severity::Critical);
    }

    #[test]
    fn test_idle_threshold() {
        let engine = engine();
        let mut tech = technician();
        tech.last_activity_at = Some(at(9, 0));
        let job = job(JobPriority::Medium);

        assert!(engine.observe_idle(&tech, &job, at(11, 0)).is_none());
        assert!(engine.observe_idle(&tech, &job, at(11, 1)).is_some());
        assert!(engine.observe_idle(&tech, &job, at(11, 30)).is_none());
    }

    #[test]
    fn test_idle_without_any_activity_record() {
        let engine = engine();
        assert!(engine
            .observe_idle(&technician(), &job(JobPriority::Low), at(16, 0))
            .is_none());
    }

    #[test]
    fn test_late_clock_in() {
        let engine = engine();
        let tech = technician();
        assert!(engine.observe_clock_in(&tech, at(8, 10)).is_none());
        let id = engine.observe_clock_in(&tech, at(8, 15)).unwrap();
        assert_eq!(engine.alerts_since(0)[0].severity, Severity::Low);

        engine.resolve(id, at(9, 0)).unwrap();
        engine.observe_clock_in(&tech, at(8, 45)).unwrap();
        assert_eq!(engine.alerts_since(id)[0].severity, Severity::Medium);
    }

    #[test]
    fn test_location_anomaly() {
        let engine = engine();
        let tech = technician();
        let job = job(JobPriority::Medium);
        assert!(engine.observe_location(&tech, &job, "north", at(10, 0)).is_none());
        assert!(engine.observe_location(&tech, &job, "south", at(10, 0)).is_some());
    }

    #[test]
    fn test_resolve_is_explicit_and_idempotent() {
        let engine = engine();
        let id = engine
            .skill_mismatch_attempt(&job(JobPriority::Low), &technician(), at(9, 0))
            .unwrap();
        assert_eq!(engine.unresolved().len(), 1);
        assert_eq!(engine.resolve(id, at(9, 5)), Ok(true));
        assert_eq!(engine.resolve(id, at(9, 6)), Ok(false));
        assert_eq!(engine.resolve(42, at(9, 6)), Err(AlertError::NotFound(42)));
        assert!(engine.unresolved().is_empty());
        assert_eq!(engine.alerts_since(0).len(), 1);
    }

    #[test]
    fn test_alerts_since_cursor() {
        let engine = engine();
        let tech = technician();
        let first = engine.observe_clock_in(&tech, at(9, 0)).unwrap();
        let job = job(JobPriority::Low);
        engine.skill_mismatch_attempt(&job, &tech, at(9, 1)).unwrap();

        let newer = engine.alerts_since(first);
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].kind, AlertKind::SkillMismatchAttempt);
        assert!(engine.alerts_since(99).is_empty());
    }
}
