//! Core data types for the dispatch system.

use chrono::{Duration, NaiveDateTime};
use rustc_hash::FxHashSet;
use std::fmt;

use crate::scheduler::Timeline;

pub type JobId = String;
pub type TechnicianId = String;
pub type ReservationId = u64;
pub type AlertId = u64;

/// Longest span in minutes accepted for job durations and configured windows
/// (one leap year).
pub const MAX_SPAN_MINUTES: i64 = 366 * 24 * 60;

/// Half-open time interval `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    /// Returns `None` for empty or inverted intervals.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn with_duration(start: NaiveDateTime, duration: Duration) -> Option<Self> {
        Self::new(start, start.checked_add_signed(duration)?)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection with another interval, if non-empty.
    pub fn clip(&self, other: &Interval) -> Option<Interval> {
        Self::new(self.start.max(other.start), self.end.min(other.end))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobCategory {
    Installation,
    Maintenance,
    Emergency,
    Audit,
}

impl JobCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installation => "installation",
            Self::Maintenance => "maintenance",
            Self::Emergency => "emergency",
            Self::Audit => "audit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "installation" => Some(Self::Installation),
            "maintenance" => Some(Self::Maintenance),
            "emergency" => Some(Self::Emergency),
            "audit" => Some(Self::Audit),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// "urgent" is accepted as an alias of critical.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "urgent" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Numeric priority on a 0-100 scale for ordering strategies.
    pub fn weight(&self) -> i32 {
        match self {
            Self::Low => 25,
            Self::Medium => 50,
            Self::High => 75,
            Self::Critical => 100,
        }
    }
}

/// Lifecycle states of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Unassigned,
    Assigned,
    Accepted,
    InProgress,
    Completed,
    Delayed,
    Escalated,
    Followup,
    RocClosed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Delayed => "delayed",
            Self::Escalated => "escalated",
            Self::Followup => "followup",
            Self::RocClosed => "roc_closed",
        }
    }

    /// "not_started" is accepted as an alias of accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unassigned" => Some(Self::Unassigned),
            "assigned" => Some(Self::Assigned),
            "accepted" | "not_started" => Some(Self::Accepted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "delayed" => Some(Self::Delayed),
            "escalated" => Some(Self::Escalated),
            "followup" => Some(Self::Followup),
            "roc_closed" => Some(Self::RocClosed),
            _ => None,
        }
    }

    /// SLA no longer applies once the work is done.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::RocClosed)
    }

    /// Counts against the assigned technician's load.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Assigned | Self::Accepted | Self::InProgress | Self::Delayed | Self::Escalated
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle events; `Assign` and `Cancel` are driven by the allocator path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobEvent {
    Assign,
    Accept,
    Start,
    Complete,
    Delay,
    Escalate,
    Resume,
    FollowUp,
    Close,
    Cancel,
}

impl JobEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Accept => "accept",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Delay => "delay",
            Self::Escalate => "escalate",
            Self::Resume => "resume",
            Self::FollowUp => "followup",
            Self::Close => "close",
            Self::Cancel => "cancel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assign" => Some(Self::Assign),
            "accept" => Some(Self::Accept),
            "start" => Some(Self::Start),
            "complete" => Some(Self::Complete),
            "delay" => Some(Self::Delay),
            "escalate" => Some(Self::Escalate),
            "resume" => Some(Self::Resume),
            "followup" | "follow_up" => Some(Self::FollowUp),
            "close" => Some(Self::Close),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }

    /// Events reported by the technician themselves; these count as activity.
    pub fn is_technician_action(&self) -> bool {
        matches!(self, Self::Accept | Self::Start | Self::Complete)
    }
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a job's status history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub from: JobStatus,
    pub to: JobStatus,
    pub event: JobEvent,
    pub at: NaiveDateTime,
}

/// Binding of a job to a technician and a reserved interval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub job_id: JobId,
    pub technician_id: TechnicianId,
    pub reservation_id: ReservationId,
    pub slot: Interval,
    pub assigned_at: NaiveDateTime,
    pub assigned_by: String,
}

/// A unit of field work.
///
/// Lifecycle fields are crate-private: only the state machine moves them.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: JobId,
    pub category: JobCategory,
    pub priority: JobPriority,
    pub required_skills: Vec<String>,
    pub estimated_duration_minutes: i64,
    pub due_at: NaiveDateTime,
    pub zone: String,
    pub(crate) status: JobStatus,
    pub(crate) assigned_technician_id: Option<TechnicianId>,
    pub(crate) assignment: Option<Assignment>,
    pub(crate) history: Vec<StatusChange>,
}

impl Job {
    /// Create a job as delivered by intake, in status `unassigned`.
    pub fn new(
        id: impl Into<JobId>,
        category: JobCategory,
        priority: JobPriority,
        required_skills: Vec<String>,
        estimated_duration_minutes: i64,
        due_at: NaiveDateTime,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            priority,
            required_skills,
            estimated_duration_minutes,
            due_at,
            zone: zone.into(),
            status: JobStatus::Unassigned,
            assigned_technician_id: None,
            assignment: None,
            history: Vec::new(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn assigned_technician_id(&self) -> Option<&str> {
        self.assigned_technician_id.as_deref()
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::minutes(self.estimated_duration_minutes.clamp(0, MAX_SPAN_MINUTES))
    }

    /// Time of the most recent status change.
    pub fn last_changed_at(&self) -> Option<NaiveDateTime> {
        self.history.last().map(|change| change.at)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TechnicianStatus {
    OnDuty,
    OffDuty,
}

impl TechnicianStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnDuty => "on_duty",
            Self::OffDuty => "off_duty",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_duty" => Some(Self::OnDuty),
            "off_duty" => Some(Self::OffDuty),
            _ => None,
        }
    }
}

/// A field technician and their timeline for the current shift.
#[derive(Clone, Debug)]
pub struct Technician {
    pub id: TechnicianId,
    pub name: String,
    pub skills: FxHashSet<String>,
    pub duty: TechnicianStatus,
    pub scheduled_clock_in: NaiveDateTime,
    pub clocked_in_at: Option<NaiveDateTime>,
    pub last_activity_at: Option<NaiveDateTime>,
    pub current_zone: Option<String>,
    pub(crate) timeline: Timeline,
}

impl Technician {
    /// Create an on-duty technician whose timeline covers `shift` minus `breaks`.
    pub fn new(
        id: impl Into<TechnicianId>,
        name: impl Into<String>,
        skills: impl IntoIterator<Item = String>,
        shift: Interval,
        breaks: &[Interval],
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            skills: skills.into_iter().collect(),
            duty: TechnicianStatus::OnDuty,
            scheduled_clock_in: shift.start,
            clocked_in_at: None,
            last_activity_at: None,
            current_zone: None,
            timeline: Timeline::new(shift, breaks),
        }
    }

    /// True if every required skill is held.
    pub fn has_skills(&self, required: &[String]) -> bool {
        required.iter().all(|skill| self.skills.contains(skill))
    }

    pub fn shift(&self) -> Interval {
        self.timeline.shift()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlertKind {
    SlaBreach,
    ApproachingBreach,
    NoActivity,
    LateClockin,
    LocationAnomaly,
    SkillMismatchAttempt,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlaBreach => "sla_breach",
            Self::ApproachingBreach => "approaching_breach",
            Self::NoActivity => "no_activity",
            Self::LateClockin => "late_clockin",
            Self::LocationAnomaly => "location_anomaly",
            Self::SkillMismatchAttempt => "skill_mismatch_attempt",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Advisory record raised by the alert engine. Only `resolved_at` ever changes.
#[derive(Clone, Debug, PartialEq)]
pub struct Alert {
    pub id: AlertId,
    pub kind: AlertKind,
    pub severity: Severity,
    pub job_id: Option<JobId>,
    pub technician_id: Option<TechnicianId>,
    pub message: String,
    pub raised_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

impl Alert {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}
