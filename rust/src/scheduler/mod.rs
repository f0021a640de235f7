//! Dispatch core: timelines, eligibility, slot allocation and job lifecycle.
//!
//! `Dispatcher` composes the pieces; the allocator is the only writer of
//! technician timelines and the state machine the only writer of job status.

mod allocator;
mod batch;
mod dispatcher;
mod lifecycle;
mod timeline;
mod validator;

pub use allocator::{AllocationError, Reservation, TimeSlotAllocator};
pub use batch::{Candidate, DispatchReport};
pub use dispatcher::{DispatchError, Dispatcher, JobSnapshot, SweepReport};
pub use lifecycle::{next_status, JobStateMachine, TransitionError};
pub use timeline::{align_up, round_up_duration, Slot, SlotState, Timeline};
pub use validator::{AssignmentValidator, Eligibility, RejectionReason};
