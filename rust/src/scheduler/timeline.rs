//! Technician timeline tracking with sorted, non-overlapping slots.

use chrono::{Duration, NaiveDateTime, Timelike};
use std::ops::Range;

use crate::models::{Interval, JobId, ReservationId};

/// Occupancy of a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Reserved {
        job_id: JobId,
        reservation_id: ReservationId,
    },
    Break,
}

impl SlotState {
    pub fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Reserved { .. } => "reserved",
            Self::Break => "break",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub interval: Interval,
    pub state: SlotState,
}

impl Slot {
    fn free(interval: Interval) -> Self {
        Self {
            interval,
            state: SlotState::Free,
        }
    }
}

/// Ordered slot sequence covering one technician's shift.
///
/// Maintains the invariant that slots are sorted by start and never overlap,
/// so both starts and ends are monotonic and binary search applies to either.
/// Together the slots tile the shift exactly.
#[derive(Clone, Debug)]
pub struct Timeline {
    shift: Interval,
    slots: Vec<Slot>,
}

impl Timeline {
    /// Create a timeline with one free slot spanning the shift, minus breaks.
    pub fn new(shift: Interval, breaks: &[Interval]) -> Self {
        let mut timeline = Self {
            shift,
            slots: vec![Slot::free(shift)],
        };
        let clipped: Vec<Interval> = breaks.iter().filter_map(|b| b.clip(&shift)).collect();
        for period in merge_intervals(clipped) {
            timeline.carve(period, SlotState::Break);
        }
        timeline
    }

    pub fn shift(&self) -> Interval {
        self.shift
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Index range of slots overlapping `interval`.
    fn overlapping(&self, interval: Interval) -> Range<usize> {
        let first = self
            .slots
            .partition_point(|s| s.interval.end <= interval.start);
        let last = self
            .slots
            .partition_point(|s| s.interval.start < interval.end);
        first..last.max(first)
    }

    /// First reserved or break slot overlapping `interval`.
    fn first_blocker(&self, interval: Interval) -> Option<&Slot> {
        self.slots[self.overlapping(interval)]
            .iter()
            .find(|s| !s.state.is_free())
    }

    /// True if `interval` lies inside the shift and touches no reserved or break slot.
    pub fn is_free(&self, interval: Interval) -> bool {
        self.shift.contains(&interval) && self.first_blocker(interval).is_none()
    }

    /// Turn a free interval into a single slot with `state`.
    ///
    /// Free slots partially covered by the interval keep their remainders as
    /// free slots. Returns false, leaving the timeline untouched, if any part
    /// of the interval is not free.
    pub(crate) fn carve(&mut self, interval: Interval, state: SlotState) -> bool {
        if !self.is_free(interval) {
            return false;
        }

        let range = self.overlapping(interval);
        let mut replacement = Vec::with_capacity(3);
        if !range.is_empty() {
            let head = self.slots[range.start].interval;
            if let Some(left) = Interval::new(head.start, interval.start) {
                replacement.push(Slot::free(left));
            }
        }
        replacement.push(Slot { interval, state });
        if !range.is_empty() {
            let tail = self.slots[range.end - 1].interval;
            if let Some(right) = Interval::new(interval.end, tail.end) {
                replacement.push(Slot::free(right));
            }
        }
        self.slots.splice(range, replacement);

        debug_assert!(self.is_consistent());
        true
    }

    /// Free the slot held by `reservation_id`, coalescing adjacent free slots.
    ///
    /// Returns the released interval, or `None` if no such reservation is held.
    pub(crate) fn release(&mut self, reservation_id: ReservationId) -> Option<Interval> {
        let idx = self.slots.iter().position(|s| {
            matches!(&s.state, SlotState::Reserved { reservation_id: r, .. } if *r == reservation_id)
        })?;
        let released = self.slots[idx].interval;
        self.slots[idx].state = SlotState::Free;
        self.coalesce(idx);

        debug_assert!(self.is_consistent());
        Some(released)
    }

    /// Merge the free slot at `idx` with touching free neighbours.
    fn coalesce(&mut self, idx: usize) {
        let touches = |a: &Slot, b: &Slot| {
            a.state.is_free() && b.state.is_free() && a.interval.end == b.interval.start
        };

        if idx + 1 < self.slots.len() && touches(&self.slots[idx], &self.slots[idx + 1]) {
            let next = self.slots.remove(idx + 1);
            self.slots[idx].interval.end = next.interval.end;
        }
        if idx > 0 && touches(&self.slots[idx - 1], &self.slots[idx]) {
            let current = self.slots.remove(idx);
            self.slots[idx - 1].interval.end = current.interval.end;
        }
    }

    /// Earliest granularity-aligned start at or after `from` where `length` fits.
    ///
    /// Walks forward skipping over blocking slots, like a resource's next
    /// available time. Returns `None` if nothing fits before the shift ends.
    pub fn next_available(
        &self,
        from: NaiveDateTime,
        length: Duration,
        granularity: Duration,
    ) -> Option<Interval> {
        let mut candidate = align_up(from.max(self.shift.start), granularity);

        loop {
            let interval = Interval::with_duration(candidate, length)?;
            if interval.end > self.shift.end {
                return None;
            }
            match self.first_blocker(interval) {
                None => return Some(interval),
                Some(slot) => candidate = align_up(slot.interval.end, granularity),
            }
        }
    }

    /// Slot currently reserved for `job_id`, if any.
    pub fn reserved_for(&self, job_id: &str) -> Option<&Slot> {
        self.slots
            .iter()
            .find(|s| matches!(&s.state, SlotState::Reserved { job_id: j, .. } if j == job_id))
    }

    pub fn reservation_ids(&self) -> impl Iterator<Item = ReservationId> + '_ {
        self.slots.iter().filter_map(|s| match s.state {
            SlotState::Reserved { reservation_id, .. } => Some(reservation_id),
            _ => None,
        })
    }

    /// Check the ordering and non-overlap invariant.
    pub fn is_consistent(&self) -> bool {
        self.slots
            .iter()
            .all(|s| s.interval.start < s.interval.end && self.shift.contains(&s.interval))
            && self
                .slots
                .windows(2)
                .all(|pair| pair[0].interval.end <= pair[1].interval.start)
    }
}

/// Merge overlapping or touching intervals into a sorted, non-overlapping list.
fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_by_key(|i| i.start);
    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());

    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => last.end = last.end.max(interval.end),
            _ => merged.push(interval),
        }
    }

    merged
}

/// Round a job length up to a whole number of granules (at least one).
///
/// `None` when the rounded length does not fit in a `Duration`.
pub fn round_up_duration(minutes: i64, granularity: Duration) -> Option<Duration> {
    let step = granularity.num_minutes().max(1);
    let granules = (minutes.max(0).checked_add(step - 1)? / step).max(1);
    Duration::try_minutes(granules.checked_mul(step)?)
}

/// Round a timestamp up to the next multiple of `granularity` since the epoch.
pub fn align_up(at: NaiveDateTime, granularity: Duration) -> NaiveDateTime {
    let step = granularity.num_seconds();
    if step <= 0 {
        return at;
    }
    let rem = at.and_utc().timestamp().rem_euclid(step);
    let truncated = at - Duration::seconds(rem) - Duration::nanoseconds(at.nanosecond() as i64);
    if truncated == at {
        at
    } else {
        truncated + granularity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn iv(start: (u32, u32), end: (u32, u32)) -> Interval {
        Interval::new(at(start.0, start.1), at(end.0, end.1)).unwrap()
    }

    fn reserved(job: &str, id: ReservationId) -> SlotState {
        SlotState::Reserved {
            job_id: job.to_string(),
            reservation_id: id,
        }
    }

    fn shift() -> Interval {
        iv((8, 0), (17, 0))
    }

    #[test]
    fn test_new_timeline_is_one_free_slot() {
        let timeline = Timeline::new(shift(), &[]);
        assert_eq!(timeline.slots().len(), 1);
        assert!(timeline.is_free(iv((8, 0), (17, 0))));
        assert!(!timeline.is_free(iv((7, 0), (9, 0))));
    }

    #[test]
    fn test_breaks_are_merged_and_clipped() {
        let timeline = Timeline::new(
            shift(),
            &[iv((12, 0), (12, 30)), iv((12, 15), (13, 0)), iv((16, 30), (18, 0))],
        );
        let breaks: Vec<Interval> = timeline
            .slots()
            .iter()
            .filter(|s| s.state == SlotState::Break)
            .map(|s| s.interval)
            .collect();
        assert_eq!(breaks, vec![iv((12, 0), (13, 0)), iv((16, 30), (17, 0))]);
        assert!(timeline.is_consistent());
    }

    #[test]
    fn test_carve_splits_free_slot() {
        let mut timeline = Timeline::new(shift(), &[]);
        assert!(timeline.carve(iv((9, 0), (12, 0)), reserved("J1", 1)));

        let slots = timeline.slots();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0], Slot::free(iv((8, 0), (9, 0))));
        assert_eq!(slots[1].interval, iv((9, 0), (12, 0)));
        assert_eq!(slots[2], Slot::free(iv((12, 0), (17, 0))));
        assert!(timeline.is_consistent());
    }

    #[test]
    fn test_carve_at_shift_edge_leaves_no_empty_slot() {
        let mut timeline = Timeline::new(shift(), &[]);
        assert!(timeline.carve(iv((8, 0), (10, 0)), reserved("J1", 1)));
        assert_eq!(timeline.slots().len(), 2);
        assert!(timeline.is_consistent());
    }

    #[test]
    fn test_carve_rejects_overlap_without_mutation() {
        let mut timeline = Timeline::new(shift(), &[]);
        assert!(timeline.carve(iv((9, 0), (12, 0)), reserved("J1", 1)));
        let before = timeline.slots().to_vec();

        assert!(!timeline.carve(iv((11, 0), (13, 0)), reserved("J2", 2)));
        assert_eq!(timeline.slots(), before.as_slice());
    }

    #[test]
    fn test_adjacent_reservations_do_not_overlap() {
        let mut timeline = Timeline::new(shift(), &[]);
        assert!(timeline.carve(iv((9, 0), (12, 0)), reserved("J1", 1)));
        assert!(timeline.carve(iv((12, 0), (13, 0)), reserved("J2", 2)));
        assert!(timeline.carve(iv((8, 0), (9, 0)), reserved("J3", 3)));
        assert_eq!(timeline.slots().len(), 4);
        assert!(timeline.is_consistent());
    }

    #[test]
    fn test_release_coalesces_free_neighbours() {
        let mut timeline = Timeline::new(shift(), &[]);
        timeline.carve(iv((9, 0), (12, 0)), reserved("J1", 1));

        assert_eq!(timeline.release(1), Some(iv((9, 0), (12, 0))));
        assert_eq!(timeline.slots(), &[Slot::free(shift())]);
        assert!(timeline.is_free(iv((9, 0), (12, 0))));
    }

    #[test]
    fn test_release_keeps_other_reservations() {
        let mut timeline = Timeline::new(shift(), &[]);
        timeline.carve(iv((9, 0), (12, 0)), reserved("J1", 1));
        timeline.carve(iv((12, 0), (14, 0)), reserved("J2", 2));

        timeline.release(1);
        assert_eq!(timeline.slots().len(), 3);
        assert_eq!(timeline.slots()[0], Slot::free(iv((8, 0), (12, 0))));
        assert!(timeline.reserved_for("J2").is_some());
        assert!(timeline.is_consistent());
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let mut timeline = Timeline::new(shift(), &[]);
        timeline.carve(iv((9, 0), (12, 0)), reserved("J1", 1));
        assert_eq!(timeline.release(7), None);
        assert_eq!(timeline.release(1), Some(iv((9, 0), (12, 0))));
        assert_eq!(timeline.release(1), None);
    }

    #[test]
    fn test_next_available_skips_blockers() {
        let mut timeline = Timeline::new(shift(), &[iv((12, 0), (13, 0))]);
        timeline.carve(iv((8, 0), (10, 0)), reserved("J1", 1));
        let granularity = Duration::minutes(15);

        let found = timeline.next_available(at(8, 0), Duration::hours(2), granularity);
        assert_eq!(found, Some(iv((10, 0), (12, 0))));

        let found = timeline.next_available(at(10, 5), Duration::hours(2), granularity);
        assert_eq!(found, Some(iv((13, 0), (15, 0))));
    }

    #[test]
    fn test_next_available_none_past_shift_end() {
        let timeline = Timeline::new(shift(), &[]);
        let found = timeline.next_available(at(16, 0), Duration::hours(2), Duration::minutes(15));
        assert_eq!(found, None);
    }

    #[test]
    fn test_round_up_duration() {
        let granularity = Duration::minutes(15);
        assert_eq!(round_up_duration(180, granularity), Some(Duration::minutes(180)));
        assert_eq!(round_up_duration(181, granularity), Some(Duration::minutes(195)));
        assert_eq!(round_up_duration(0, granularity), Some(Duration::minutes(15)));
        assert_eq!(round_up_duration(50, Duration::hours(1)), Some(Duration::hours(1)));
    }

    #[test]
    fn test_round_up_duration_out_of_range() {
        let granularity = Duration::minutes(15);
        assert_eq!(round_up_duration(1_000_000_000_000_000, granularity), None);
        assert_eq!(round_up_duration(i64::MAX, granularity), None);
    }

    #[test]
    fn test_align_up() {
        let granularity = Duration::minutes(15);
        assert_eq!(align_up(at(9, 0), granularity), at(9, 0));
        assert_eq!(align_up(at(9, 1), granularity), at(9, 15));
        assert_eq!(align_up(at(9, 59), granularity), at(10, 0));
    }
}
