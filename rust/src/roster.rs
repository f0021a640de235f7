//! Technician roster: the sole owner of technician records and their timelines.

use thiserror::Error;

use crate::arena::{Entry, IdArena};
use crate::models::{ReservationId, Technician};

/// Errors raised while refreshing the roster.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RosterError {
    #[error("Technician {0} still holds active reservations")]
    ActiveReservations(String),
}

/// Technicians indexed by id, each behind its own lock.
#[derive(Debug, Default)]
pub struct Roster {
    technicians: IdArena<Technician>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a technician or replace an existing record for a new shift.
    ///
    /// A record whose timeline still holds a reservation for which `is_live`
    /// returns true is not replaced; those jobs must be cancelled first.
    pub fn refresh(
        &self,
        technician: Technician,
        is_live: impl Fn(ReservationId) -> bool,
    ) -> Result<(), RosterError> {
        let id = technician.id.clone();
        self.technicians
            .upsert(&id, technician, |entry, replacement| {
                let mut current = entry.lock();
                if current.timeline.reservation_ids().any(&is_live) {
                    return Err(RosterError::ActiveReservations(current.id.clone()));
                }
                *current = replacement;
                Ok(())
            })
            .map(|_| ())
    }

    /// Lockable handle for one technician.
    pub fn entry(&self, id: &str) -> Option<Entry<Technician>> {
        self.technicians.get(id)
    }

    pub fn snapshot(&self, id: &str) -> Option<Technician> {
        self.technicians.snapshot(id)
    }

    pub fn snapshots(&self) -> Vec<Technician> {
        self.technicians.snapshots()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.technicians.index_of(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.technicians.len()
    }

    pub fn is_empty(&self) -> bool {
        self.technicians.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interval;
    use crate::scheduler::SlotState;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn tech(id: &str, start: u32, end: u32) -> Technician {
        Technician::new(
            id,
            "Sam",
            vec!["Splicing".to_string()],
            Interval::new(at(start), at(end)).unwrap(),
            &[],
        )
    }

    #[test]
    fn test_refresh_registers_and_replaces() {
        let roster = Roster::new();
        roster.refresh(tech("T1", 8, 17), |_| false).unwrap();
        roster.refresh(tech("T1", 9, 18), |_| false).unwrap();

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.snapshot("T1").unwrap().shift().start, at(9));
    }

    #[test]
    fn test_refresh_blocked_by_live_reservation() {
        let roster = Roster::new();
        roster.refresh(tech("T1", 8, 17), |_| false).unwrap();
        {
            let entry = roster.entry("T1").unwrap();
            let mut technician = entry.lock();
            let slot = Interval::new(at(9), at(10)).unwrap();
            assert!(technician.timeline.carve(
                slot,
                SlotState::Reserved {
                    job_id: "J1".to_string(),
                    reservation_id: 4,
                },
            ));
        }

        let err = roster.refresh(tech("T1", 9, 18), |id| id == 4).unwrap_err();
        assert_eq!(err, RosterError::ActiveReservations("T1".to_string()));
        assert_eq!(roster.snapshot("T1").unwrap().shift().start, at(8));

        // Historical (retired) reservations do not block a new shift.
        roster.refresh(tech("T1", 9, 18), |_| false).unwrap();
        assert!(roster.snapshot("T1").unwrap().timeline().reserved_for("J1").is_none());
    }
}
