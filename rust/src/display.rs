//! Presentation lookup for statuses, kept out of the dispatch core.

use crate::models::{JobStatus, Severity};
use crate::monitoring::SlaStatus;

/// Label, colour and icon used to render a status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusStyle {
    pub label: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
}

const fn style(label: &'static str, color: &'static str, icon: &'static str) -> StatusStyle {
    StatusStyle { label, color, icon }
}

pub fn job_status_style(status: JobStatus) -> StatusStyle {
    match status {
        JobStatus::Unassigned => style("Unassigned", "#9e9e9e", "circle"),
        JobStatus::Assigned => style("Assigned", "#42a5f5", "user-check"),
        JobStatus::Accepted => style("Not Started", "#26c6da", "thumbs-up"),
        JobStatus::InProgress => style("In Progress", "#ffa726", "play"),
        JobStatus::Completed => style("Completed", "#66bb6a", "check"),
        JobStatus::Delayed => style("Delayed", "#ef5350", "clock"),
        JobStatus::Escalated => style("Escalated", "#ab47bc", "arrow-up"),
        JobStatus::Followup => style("Follow-up", "#8d6e63", "repeat"),
        JobStatus::RocClosed => style("ROC Closed", "#455a64", "lock"),
    }
}

pub fn sla_status_style(status: SlaStatus) -> StatusStyle {
    match status {
        SlaStatus::OnTrack => style("On Track", "#66bb6a", "check-circle"),
        SlaStatus::Approaching => style("Approaching", "#ffca28", "alert-triangle"),
        SlaStatus::Breached => style("Breached", "#e53935", "x-octagon"),
        SlaStatus::NotApplicable => style("N/A", "#bdbdbd", "minus"),
    }
}

pub fn severity_style(severity: Severity) -> StatusStyle {
    match severity {
        Severity::Low => style("Low", "#90caf9", "info"),
        Severity::Medium => style("Medium", "#ffca28", "alert-circle"),
        Severity::High => style("High", "#fb8c00", "alert-triangle"),
        Severity::Critical => style("Critical", "#c62828", "alert-octagon"),
    }
}

/// Look up a style by kind ("job", "sla" or "severity") and canonical value.
pub fn lookup(kind: &str, value: &str) -> Option<StatusStyle> {
    match kind {
        "job" => JobStatus::parse(value).map(job_status_style),
        "sla" => sla_status(value).map(sla_status_style),
        "severity" => severity(value).map(severity_style),
        _ => None,
    }
}

fn sla_status(value: &str) -> Option<SlaStatus> {
    [
        SlaStatus::OnTrack,
        SlaStatus::Approaching,
        SlaStatus::Breached,
        SlaStatus::NotApplicable,
    ]
    .into_iter()
    .find(|status| status.as_str() == value)
}

fn severity(value: &str) -> Option<Severity> {
    [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ]
    .into_iter()
    .find(|severity| severity.as_str() == value)
}
