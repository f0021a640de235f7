//! Logging macros for the dispatch core with verbosity level control.
//!
//! Provides zero-cost logging when disabled (verbosity=0).
//! Verbosity levels match the host application's logger:
//! - 0: SILENT (only errors)
//! - 1: CHANGES (reservations, releases, job transitions)
//! - 2: CHECKS (eligibility rejections, conflicts, retries)
//! - 3: DEBUG (sweep internals)
//!
//! `log_rejection!` and `log_alert!` fix the line format for refusals and
//! raised alerts so operators can grep for them.

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: slot reservations and releases, job status transitions.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            eprintln!($($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: rejected assignments, reservation conflicts, retries.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            eprintln!($($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
///
/// Used for: per-job SLA evaluation and idle checks during sweeps.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!($($arg)*);
        }
    };
}

/// Log a refused assignment at CHECKS level.
///
/// The reason is anything with a `code()`, such as `RejectionReason` or
/// `DispatchError`.
#[macro_export]
macro_rules! log_rejection {
    ($verbosity:expr, $job_id:expr, $technician_id:expr, $reason:expr) => {
        $crate::log_checks!(
            $verbosity,
            "  Rejected {} for {}: {}",
            $job_id,
            $technician_id,
            $reason.code()
        )
    };
}

/// Log a raised alert at CHANGES level.
#[macro_export]
macro_rules! log_alert {
    ($verbosity:expr, $id:expr, $kind:expr, $severity:expr, $message:expr) => {
        $crate::log_changes!(
            $verbosity,
            "Alert {} [{}/{}]: {}",
            $id,
            $kind.as_str(),
            $severity.as_str(),
            $message
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels_are_ordered() {
        assert!(VERBOSITY_SILENT < VERBOSITY_CHANGES);
        assert!(VERBOSITY_CHANGES < VERBOSITY_CHECKS);
        assert!(VERBOSITY_CHECKS < VERBOSITY_DEBUG);
    }

    #[test]
    fn test_log_macros_compile() {
        let verbosity = VERBOSITY_SILENT;
        log_changes!(verbosity, "reserved {} for {}", "slot", "job");
        log_checks!(verbosity, "rejected {}", "job");
        log_debug!(verbosity, "sweep {}", 3);
    }

    #[test]
    fn test_domain_macros_accept_domain_types() {
        use crate::models::{AlertKind, Severity};
        use crate::scheduler::{DispatchError, RejectionReason};

        let verbosity = VERBOSITY_DEBUG;
        log_rejection!(verbosity, "J1", "T1", RejectionReason::SkillMismatch);
        log_rejection!(
            verbosity,
            "J1",
            "T1",
            DispatchError::Rejected(RejectionReason::SlotUnavailable)
        );
        log_alert!(verbosity, 1, AlertKind::SlaBreach, Severity::High, "J1 overdue");
    }
}
