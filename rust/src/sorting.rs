//! Job ordering strategies for batch dispatch.
//!
//! Implements three prioritization strategies:
//! - `priority_first`: Priority dominates, CR breaks ties
//! - `cr_first`: Critical Ratio dominates, priority breaks ties
//! - `weighted`: Blended score combining CR and priority

use chrono::NaiveDateTime;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;

use crate::config::DispatchConfig;
use crate::models::{Job, JobPriority};

/// Information needed to compute a job's sort key.
#[derive(Clone, Debug)]
pub struct JobSortInfo {
    pub duration_minutes: i64,
    pub due_at: NaiveDateTime,
    pub priority: JobPriority,
}

impl From<&Job> for JobSortInfo {
    fn from(job: &Job) -> Self {
        Self {
            duration_minutes: job.estimated_duration_minutes,
            due_at: job.due_at,
            priority: job.priority,
        }
    }
}

/// Errors that can occur during sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortingError {
    UnknownStrategy(String),
    JobNotFound(String),
}

impl std::fmt::Display for SortingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownStrategy(s) => write!(f, "Unknown dispatch strategy: {}", s),
            Self::JobNotFound(id) => write!(f, "Job not found: {}", id),
        }
    }
}

impl std::error::Error for SortingError {}

/// Sort key for job prioritization.
///
/// Implements `Ord` so jobs can be sorted (lower = more urgent).
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    /// Priority-first: (-priority, CR, job_id)
    PriorityFirst {
        neg_priority: f64,
        cr: f64,
        job_id: String,
    },
    /// CR-first: (CR, -priority, job_id)
    CRFirst {
        cr: f64,
        neg_priority: f64,
        job_id: String,
    },
    /// Weighted: (score, job_id)
    Weighted { score: f64, job_id: String },
}

impl SortKey {
    pub fn job_id(&self) -> &str {
        match self {
            Self::PriorityFirst { job_id, .. }
            | Self::CRFirst { job_id, .. }
            | Self::Weighted { job_id, .. } => job_id,
        }
    }
}

/// Compare f64 values for sorting, treating NaN as equal.
fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

impl Eq for SortKey {}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                Self::PriorityFirst {
                    neg_priority: p1,
                    cr: cr1,
                    job_id: id1,
                },
                Self::PriorityFirst {
                    neg_priority: p2,
                    cr: cr2,
                    job_id: id2,
                },
            ) => cmp_f64(*p1, *p2)
                .then(cmp_f64(*cr1, *cr2))
                .then(id1.cmp(id2)),

            (
                Self::CRFirst {
                    cr: cr1,
                    neg_priority: p1,
                    job_id: id1,
                },
                Self::CRFirst {
                    cr: cr2,
                    neg_priority: p2,
                    job_id: id2,
                },
            ) => cmp_f64(*cr1, *cr2)
                .then(cmp_f64(*p1, *p2))
                .then(id1.cmp(id2)),

            (
                Self::Weighted {
                    score: s1,
                    job_id: id1,
                },
                Self::Weighted {
                    score: s2,
                    job_id: id2,
                },
            ) => cmp_f64(*s1, *s2).then(id1.cmp(id2)),

            // Keys from different strategies are never mixed
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compute critical ratio for a job.
///
/// CR = slack / max(duration, 1)
/// where slack = minutes until due (negative once overdue)
///
/// Lower CR = more urgent.
pub fn compute_critical_ratio(
    due_at: NaiveDateTime,
    duration_minutes: i64,
    current_time: NaiveDateTime,
) -> f64 {
    let slack = (due_at - current_time).num_minutes() as f64;
    slack / (duration_minutes.max(1) as f64)
}

/// Compute sort key for a single job.
pub fn compute_sort_key(
    job_id: &str,
    info: &JobSortInfo,
    current_time: NaiveDateTime,
    config: &DispatchConfig,
) -> Result<SortKey, SortingError> {
    let cr = compute_critical_ratio(info.due_at, info.duration_minutes, current_time);
    let priority = info.priority.weight();

    match config.strategy.as_str() {
        "priority_first" => Ok(SortKey::PriorityFirst {
            neg_priority: -(priority as f64),
            cr,
            job_id: job_id.to_string(),
        }),
        "cr_first" => Ok(SortKey::CRFirst {
            cr,
            neg_priority: -(priority as f64),
            job_id: job_id.to_string(),
        }),
        "weighted" => {
            let score = config.cr_weight * cr + config.priority_weight * (100.0 - priority as f64);
            Ok(SortKey::Weighted {
                score,
                job_id: job_id.to_string(),
            })
        }
        _ => Err(SortingError::UnknownStrategy(config.strategy.clone())),
    }
}

/// Sort job IDs by their sort keys, most urgent first.
pub fn sort_jobs(
    job_ids: &[String],
    jobs: &FxHashMap<String, JobSortInfo>,
    current_time: NaiveDateTime,
    config: &DispatchConfig,
) -> Result<Vec<String>, SortingError> {
    let mut keys: Vec<SortKey> = Vec::with_capacity(job_ids.len());

    for job_id in job_ids {
        let info = jobs
            .get(job_id)
            .ok_or_else(|| SortingError::JobNotFound(job_id.clone()))?;
        keys.push(compute_sort_key(job_id, info, current_time, config)?);
    }

    keys.sort();

    Ok(keys.into_iter().map(|k| k.job_id().to_string()).collect())
}
