//! SLA evaluation, alerting and the periodic sweep.

mod alerts;
mod sla;
mod sweeper;

pub use alerts::{AlertEngine, AlertError};
pub use sla::{ApproachingWindow, SlaMonitor, SlaStatus};
pub use sweeper::SweepHandle;
