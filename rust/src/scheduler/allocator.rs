//! Slot reservation and release: the only writer of technician timelines.

use chrono::{Duration, NaiveDateTime};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::config::DispatchConfig;
use crate::models::{Interval, JobId, ReservationId, Technician, TechnicianId};
use crate::roster::Roster;
use crate::{log_changes, log_checks};

use super::timeline::{round_up_duration, SlotState};

/// Errors that can occur while reserving time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Slot conflict on technician {technician_id} for {interval}")]
    Conflict {
        technician_id: TechnicianId,
        interval: Interval,
    },
    #[error("Technician not found: {0}")]
    TechnicianNotFound(String),
}

/// A granted reservation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub technician_id: TechnicianId,
    pub job_id: JobId,
    pub interval: Interval,
}

/// Owns every reserve/release/block on technician timelines.
///
/// Mutations of one timeline are serialized by that technician's lock.
/// Reservation waits at most `lock_timeout` for the lock and reports a
/// conflict rather than queueing behind a stuck writer.
pub struct TimeSlotAllocator {
    granularity: Duration,
    lock_timeout: std::time::Duration,
    next_id: AtomicU64,
    /// Live reservations: reservation id -> owning technician
    live: Mutex<FxHashMap<ReservationId, TechnicianId>>,
    verbosity: u8,
}

impl TimeSlotAllocator {
    pub fn new(config: &DispatchConfig) -> Self {
        Self {
            granularity: config.granularity(),
            lock_timeout: config.lock_timeout(),
            next_id: AtomicU64::new(1),
            live: Mutex::new(FxHashMap::default()),
            verbosity: config.verbosity,
        }
    }

    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    /// Granularity-rounded slot for a job of `minutes` starting at `start`.
    pub fn interval_for(&self, start: NaiveDateTime, minutes: i64) -> Option<Interval> {
        Interval::with_duration(start, round_up_duration(minutes, self.granularity)?)
    }

    /// Reserve `interval` on a technician's timeline for `job_id`.
    ///
    /// Availability is re-checked under the technician's lock; a slot taken
    /// since the caller validated yields `Conflict`.
    pub fn reserve(
        &self,
        roster: &Roster,
        technician_id: &str,
        job_id: &str,
        interval: Interval,
    ) -> Result<Reservation, AllocationError> {
        let conflict = || AllocationError::Conflict {
            technician_id: technician_id.to_string(),
            interval,
        };
        let entry = roster
            .entry(technician_id)
            .ok_or_else(|| AllocationError::TechnicianNotFound(technician_id.to_string()))?;
        let Some(mut technician) = entry.try_lock_for(self.lock_timeout) else {
            log_checks!(
                self.verbosity,
                "  Timeline of {} busy, reporting conflict for {}",
                technician_id,
                job_id
            );
            return Err(conflict());
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = SlotState::Reserved {
            job_id: job_id.to_string(),
            reservation_id: id,
        };
        if !technician.timeline.carve(interval, state) {
            log_checks!(
                self.verbosity,
                "  Conflict: {} on {} no longer free for {}",
                interval,
                technician_id,
                job_id
            );
            return Err(conflict());
        }
        self.live.lock().insert(id, technician_id.to_string());

        log_changes!(
            self.verbosity,
            "Reserved {} on {} for {} (reservation {})",
            interval,
            technician_id,
            job_id,
            id
        );
        Ok(Reservation {
            id,
            technician_id: technician_id.to_string(),
            job_id: job_id.to_string(),
            interval,
        })
    }

    /// Release a reservation and free its slot.
    ///
    /// Idempotent: unknown, retired or already-released ids are a no-op and
    /// return `None`.
    pub fn release(&self, roster: &Roster, reservation_id: ReservationId) -> Option<Interval> {
        let technician_id = self.live.lock().remove(&reservation_id)?;
        let entry = roster.entry(&technician_id)?;
        let released = entry.lock().timeline.release(reservation_id);

        if let Some(interval) = released {
            log_changes!(
                self.verbosity,
                "Released {} on {} (reservation {})",
                interval,
                technician_id,
                reservation_id
            );
        }
        released
    }

    /// Stop tracking a reservation as live while leaving its slot reserved.
    ///
    /// Used when a job completes: the slot stays on the timeline as history
    /// and later releases of the id are no-ops.
    pub fn retire(&self, reservation_id: ReservationId) -> bool {
        self.live.lock().remove(&reservation_id).is_some()
    }

    pub fn is_live(&self, reservation_id: ReservationId) -> bool {
        self.live.lock().contains_key(&reservation_id)
    }

    /// Insert a break slot. Same availability rule as `reserve`.
    pub fn block(
        &self,
        roster: &Roster,
        technician_id: &str,
        interval: Interval,
    ) -> Result<(), AllocationError> {
        let entry = roster
            .entry(technician_id)
            .ok_or_else(|| AllocationError::TechnicianNotFound(technician_id.to_string()))?;
        let conflict = AllocationError::Conflict {
            technician_id: technician_id.to_string(),
            interval,
        };
        let mut technician = entry.try_lock_for(self.lock_timeout).ok_or(conflict.clone())?;
        if !technician.timeline.carve(interval, SlotState::Break) {
            return Err(conflict);
        }
        log_changes!(self.verbosity, "Break {} on {}", interval, technician_id);
        Ok(())
    }

    /// Earliest free slot for a job of `minutes` at or after `from`.
    pub fn next_available(
        &self,
        technician: &Technician,
        from: NaiveDateTime,
        minutes: i64,
    ) -> Option<Interval> {
        let length = round_up_duration(minutes, self.granularity)?;
        technician
            .timeline
            .next_available(from, length, self.granularity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn iv(start: (u32, u32), end: (u32, u32)) -> Interval {
        Interval::new(at(start.0, start.1), at(end.0, end.1)).unwrap()
    }

    fn setup() -> (Roster, TimeSlotAllocator) {
        let roster = Roster::new();
        roster
            .refresh(
                Technician::new(
                    "T1",
                    "Dana",
                    vec!["Fiber Installation".to_string()],
                    iv((8, 0), (17, 0)),
                    &[],
                ),
                |_| false,
            )
            .unwrap();
        (roster, TimeSlotAllocator::new(&DispatchConfig::default()))
    }

    #[test]
    fn test_reserve_and_release() {
        let (roster, allocator) = setup();
        let reservation = allocator
            .reserve(&roster, "T1", "J1", iv((9, 0), (12, 0)))
            .unwrap();
        assert!(allocator.is_live(reservation.id));

        let technician = roster.snapshot("T1").unwrap();
        assert!(!technician.timeline().is_free(iv((9, 0), (12, 0))));
        assert!(technician.timeline().is_consistent());

        assert_eq!(
            allocator.release(&roster, reservation.id),
            Some(iv((9, 0), (12, 0)))
        );
        let technician = roster.snapshot("T1").unwrap();
        assert!(technician.timeline().is_free(iv((9, 0), (12, 0))));
        assert_eq!(technician.timeline().slots().len(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (roster, allocator) = setup();
        let reservation = allocator
            .reserve(&roster, "T1", "J1", iv((9, 0), (10, 0)))
            .unwrap();
        assert!(allocator.release(&roster, reservation.id).is_some());
        assert!(allocator.release(&roster, reservation.id).is_none());
        assert!(allocator.release(&roster, 999).is_none());
    }

    #[test]
    fn test_overlapping_reserve_conflicts() {
        let (roster, allocator) = setup();
        allocator
            .reserve(&roster, "T1", "J1", iv((9, 0), (12, 0)))
            .unwrap();
        let err = allocator
            .reserve(&roster, "T1", "J2", iv((11, 0), (13, 0)))
            .unwrap_err();
        assert!(matches!(err, AllocationError::Conflict { .. }));
    }

    #[test]
    fn test_unknown_technician() {
        let (roster, allocator) = setup();
        let err = allocator
            .reserve(&roster, "T9", "J1", iv((9, 0), (10, 0)))
            .unwrap_err();
        assert_eq!(err, AllocationError::TechnicianNotFound("T9".to_string()));
    }

    #[test]
    fn test_retired_slot_stays_reserved() {
        let (roster, allocator) = setup();
        let reservation = allocator
            .reserve(&roster, "T1", "J1", iv((9, 0), (10, 0)))
            .unwrap();
        assert!(allocator.retire(reservation.id));
        assert!(allocator.release(&roster, reservation.id).is_none());
        assert!(roster
            .snapshot("T1")
            .unwrap()
            .timeline()
            .reserved_for("J1")
            .is_some());
    }

    #[test]
    fn test_block_inserts_break() {
        let (roster, allocator) = setup();
        allocator.block(&roster, "T1", iv((12, 0), (13, 0))).unwrap();
        let err = allocator
            .reserve(&roster, "T1", "J1", iv((12, 30), (13, 30)))
            .unwrap_err();
        assert!(matches!(err, AllocationError::Conflict { .. }));
    }

    #[test]
    fn test_next_available_rounds_duration() {
        let (roster, allocator) = setup();
        allocator
            .reserve(&roster, "T1", "J1", iv((8, 0), (9, 0)))
            .unwrap();
        let technician = roster.snapshot("T1").unwrap();
        assert_eq!(
            allocator.next_available(&technician, at(8, 0), 50),
            Some(iv((9, 0), (10, 0)))
        );
    }

    #[test]
    fn test_concurrent_overlapping_reservations_exactly_one_wins() {
        for _ in 0..50 {
            let (roster, allocator) = setup();
            let shared = Arc::new((roster, allocator));
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = [("J1", iv((9, 0), (12, 0))), ("J2", iv((10, 0), (11, 0)))]
                .into_iter()
                .map(|(job, interval)| {
                    let shared = Arc::clone(&shared);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        let (roster, allocator) = &*shared;
                        allocator.reserve(roster, "T1", job, interval)
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let wins = results.iter().filter(|r| r.is_ok()).count();
            let conflicts = results
                .iter()
                .filter(|r| matches!(r, Err(AllocationError::Conflict { .. })))
                .count();
            assert_eq!((wins, conflicts), (1, 1));

            let (roster, _) = &*shared;
            assert!(roster.snapshot("T1").unwrap().timeline().is_consistent());
        }
    }
}
