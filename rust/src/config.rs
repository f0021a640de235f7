//! Configuration types for the dispatch system.

use chrono::Duration;
use pyo3::prelude::*;

use crate::models::MAX_SPAN_MINUTES;
use crate::monitoring::ApproachingWindow;

/// Batch dispatch ordering strategies accepted by `DispatchConfig::strategy`.
/// Upper bound for `approaching_window_fraction`.
const MAX_WINDOW_FRACTION: f64 = 100.0;

pub const STRATEGIES: [&str; 3] = ["priority_first", "cr_first", "weighted"];

/// Tunables for allocation, SLA evaluation, alerting and batch dispatch.
#[pyclass]
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Smallest addressable scheduling unit; job durations round up to a multiple of it
    #[pyo3(get, set)]
    pub slot_granularity_minutes: i64,
    /// Fixed lead time before `due_at` at which a job counts as approaching breach
    #[pyo3(get, set)]
    pub approaching_window_minutes: i64,
    /// If set, the approaching window is this fraction of the job's estimated duration
    #[pyo3(get, set)]
    pub approaching_window_fraction: Option<f64>,
    /// A technician holding an in-progress job without activity this long raises no_activity
    #[pyo3(get, set)]
    pub idle_threshold_minutes: i64,
    /// Clock-ins later than scheduled by more than this raise late_clockin
    #[pyo3(get, set)]
    pub clock_in_grace_minutes: i64,
    /// Period of the background SLA/alert sweep
    #[pyo3(get, set)]
    pub sweep_interval_seconds: u64,
    /// Bounded wait for a technician or job lock before reporting a conflict
    #[pyo3(get, set)]
    pub lock_timeout_ms: u64,
    /// Move breached in-progress jobs to delayed during sweeps
    #[pyo3(get, set)]
    pub auto_delay_on_breach: bool,
    /// Batch ordering strategy: "priority_first", "cr_first" or "weighted"
    #[pyo3(get, set)]
    pub strategy: String,
    /// Weight for critical ratio in weighted strategy
    #[pyo3(get, set)]
    pub cr_weight: f64,
    /// Weight for priority in weighted strategy
    #[pyo3(get, set)]
    pub priority_weight: f64,
    /// Verbosity level: 0=silent, 1=changes, 2=checks, 3=debug.
    #[pyo3(get, set)]
    pub verbosity: u8,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            slot_granularity_minutes: 15,
            approaching_window_minutes: 60,
            approaching_window_fraction: None,
            idle_threshold_minutes: 120,
            clock_in_grace_minutes: 10,
            sweep_interval_seconds: 30,
            lock_timeout_ms: 250,
            auto_delay_on_breach: true,
            strategy: "priority_first".to_string(),
            cr_weight: 10.0,
            priority_weight: 1.0,
            verbosity: 0,
        }
    }
}

impl DispatchConfig {
    pub fn granularity(&self) -> Duration {
        bounded_minutes(self.slot_granularity_minutes)
    }

    pub fn approaching_window(&self) -> ApproachingWindow {
        match self.approaching_window_fraction {
            Some(fraction) => ApproachingWindow::FractionOfDuration(fraction),
            None => ApproachingWindow::Fixed(bounded_minutes(self.approaching_window_minutes)),
        }
    }

    pub fn idle_threshold(&self) -> Duration {
        bounded_minutes(self.idle_threshold_minutes)
    }

    pub fn clock_in_grace(&self) -> Duration {
        bounded_minutes(self.clock_in_grace_minutes)
    }

    pub fn lock_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Check values that would make the allocator or monitor misbehave.
    pub fn validate(&self) -> Result<(), String> {
        if self.slot_granularity_minutes <= 0 {
            return Err(format!(
                "slot_granularity_minutes must be positive, got {}",
                self.slot_granularity_minutes
            ));
        }
        if self.approaching_window_minutes < 0 {
            return Err("approaching_window_minutes must not be negative".to_string());
        }
        if let Some(fraction) = self.approaching_window_fraction {
            if !(fraction.is_finite() && (0.0..=MAX_WINDOW_FRACTION).contains(&fraction)) {
                return Err(format!("invalid approaching_window_fraction: {}", fraction));
            }
        }
        if self.idle_threshold_minutes <= 0 || self.clock_in_grace_minutes < 0 {
            return Err("alert thresholds must not be negative".to_string());
        }
        for (name, minutes) in [
            ("slot_granularity_minutes", self.slot_granularity_minutes),
            ("approaching_window_minutes", self.approaching_window_minutes),
            ("idle_threshold_minutes", self.idle_threshold_minutes),
            ("clock_in_grace_minutes", self.clock_in_grace_minutes),
        ] {
            if minutes > MAX_SPAN_MINUTES {
                return Err(format!(
                    "{} must be at most {}, got {}",
                    name, MAX_SPAN_MINUTES, minutes
                ));
            }
        }
        if self.sweep_interval_seconds == 0 {
            return Err("sweep_interval_seconds must be positive".to_string());
        }
        Ok(())
    }
}

#[pymethods]
impl DispatchConfig {
    #[new]
    #[pyo3(signature = (
        slot_granularity_minutes=None,
        approaching_window_minutes=None,
        approaching_window_fraction=None,
        idle_threshold_minutes=None,
        clock_in_grace_minutes=None,
        sweep_interval_seconds=None,
        lock_timeout_ms=None,
        auto_delay_on_breach=None,
        strategy=None,
        cr_weight=None,
        priority_weight=None,
        verbosity=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn py_new(
        slot_granularity_minutes: Option<i64>,
        approaching_window_minutes: Option<i64>,
        approaching_window_fraction: Option<f64>,
        idle_threshold_minutes: Option<i64>,
        clock_in_grace_minutes: Option<i64>,
        sweep_interval_seconds: Option<u64>,
        lock_timeout_ms: Option<u64>,
        auto_delay_on_breach: Option<bool>,
        strategy: Option<String>,
        cr_weight: Option<f64>,
        priority_weight: Option<f64>,
        verbosity: Option<u8>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            slot_granularity_minutes: slot_granularity_minutes
                .unwrap_or(defaults.slot_granularity_minutes),
            approaching_window_minutes: approaching_window_minutes
                .unwrap_or(defaults.approaching_window_minutes),
            approaching_window_fraction,
            idle_threshold_minutes: idle_threshold_minutes
                .unwrap_or(defaults.idle_threshold_minutes),
            clock_in_grace_minutes: clock_in_grace_minutes
                .unwrap_or(defaults.clock_in_grace_minutes),
            sweep_interval_seconds: sweep_interval_seconds
                .unwrap_or(defaults.sweep_interval_seconds),
            lock_timeout_ms: lock_timeout_ms.unwrap_or(defaults.lock_timeout_ms),
            auto_delay_on_breach: auto_delay_on_breach.unwrap_or(defaults.auto_delay_on_breach),
            strategy: strategy.unwrap_or(defaults.strategy),
            cr_weight: cr_weight.unwrap_or(defaults.cr_weight),
            priority_weight: priority_weight.unwrap_or(defaults.priority_weight),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "DispatchConfig(granularity={}m, approaching_window={}m, strategy={:?})",
            self.slot_granularity_minutes, self.approaching_window_minutes, self.strategy
        )
    }
}

// Out-of-range values are refused by `validate`; clamping keeps the getters total.
fn bounded_minutes(minutes: i64) -> Duration {
    Duration::minutes(minutes.clamp(0, MAX_SPAN_MINUTES))
}
