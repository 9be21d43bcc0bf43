//! Ring convergence bookkeeping.
//!
//! When a new ring tree replaces an old one, every participant walks through
//! a fixed sequence of [`RingState`]s for the new ring version. A coordinator
//! waits until all participants meet a required state before moving the
//! cluster on.
//!
//! - [`RingState`]: the phases and their transition rules
//! - [`RingIdAndVersionPair`]: which ring version a state belongs to
//! - [`RingStateTracker`]: serialized, persisted transitions per participant

mod ring_state;
mod ring_version;
mod tracker;

pub use ring_state::RingState;
pub use ring_version::{RingId, RingIdAndVersionPair};
pub use tracker::{InMemoryRingStateStore, RingStateRecord, RingStateStore, RingStateTracker};
