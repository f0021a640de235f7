//! SLA status derivation.

use chrono::{Duration, NaiveDateTime};

use crate::models::Job;

/// Derived risk of a job missing its due time. Never stored as ground truth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlaStatus {
    OnTrack,
    Approaching,
    Breached,
    /// Job is completed or closed.
    NotApplicable,
}

impl SlaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTrack => "on_track",
            Self::Approaching => "approaching",
            Self::Breached => "breached",
            Self::NotApplicable => "not_applicable",
        }
    }
}

/// Lead time before `due_at` at which a job counts as approaching breach.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ApproachingWindow {
    Fixed(Duration),
    FractionOfDuration(f64),
}

/// Pure, re-entrant SLA evaluator.
#[derive(Clone, Debug)]
pub struct SlaMonitor {
    window: ApproachingWindow,
}

impl SlaMonitor {
    pub fn new(window: ApproachingWindow) -> Self {
        Self { window }
    }

    pub fn window_for(&self, job: &Job) -> Duration {
        match self.window {
            ApproachingWindow::Fixed(lead) => lead,
            ApproachingWindow::FractionOfDuration(fraction) => {
                let seconds = job.estimated_duration().num_seconds() as f64 * fraction;
                Duration::try_seconds(seconds.round() as i64).unwrap_or(Duration::MAX)
            }
        }
    }

    /// Classify `job` at `now`. For a fixed `due_at` and a non-terminal status
    /// the result only moves forward in time: on_track, approaching, breached.
    pub fn evaluate(&self, job: &Job, now: NaiveDateTime) -> SlaStatus {
        if job.status().is_terminal() {
            return SlaStatus::NotApplicable;
        }
        if now >= job.due_at {
            return SlaStatus::Breached;
        }
        let approaching_from = job
            .due_at
            .checked_sub_signed(self.window_for(job))
            .unwrap_or(NaiveDateTime::MIN);
        if now >= approaching_from {
            SlaStatus::Approaching
        } else {
            SlaStatus::OnTrack
        }
    }
}
