//! Background thread driving the periodic SLA/alert sweep.

use chrono::NaiveDateTime;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::scheduler::Dispatcher;

/// Handle to a running sweeper. Dropping it stops the thread.
pub struct SweepHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Run `dispatcher.sweep(clock())` every `interval` until stopped.
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        interval: Duration,
        clock: fn() -> NaiveDateTime,
    ) -> std::io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("fieldops-sweeper".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        dispatcher.sweep(clock());
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Stop the sweeper and wait for an in-flight sweep to finish.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::models::{Job, JobCategory, JobPriority};
    use chrono::NaiveDate;

    fn late() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_sweeper_raises_breach_and_stops() {
        let dispatcher = Arc::new(Dispatcher::new(DispatchConfig::default()).unwrap());
        let due = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        dispatcher
            .intake(
                Job::new(
                    "J1",
                    JobCategory::Audit,
                    JobPriority::Low,
                    vec![],
                    30,
                    due,
                    "north",
                ),
                due - chrono::Duration::hours(4),
            )
            .unwrap();

        let mut handle =
            SweepHandle::spawn(Arc::clone(&dispatcher), Duration::from_millis(10), late).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while dispatcher.alerts_since(0).is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.stop();

        assert!(!handle.is_running());
        let alerts = dispatcher.alerts_since(0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].job_id.as_deref(), Some("J1"));
    }
}
