//! Progress reporting for the global search.
//!
//! Purely observational: sinks receive every strict improvement of the
//! global best, in the order the coordinator accepts them. Correctness of
//! the search never depends on a sink.

use crate::search::GlobalAllocation;

/// Receives "found a new best" events from the search coordinator.
///
/// Called from the coordinating thread only, so implementations need no
/// synchronization of their own.
pub trait ProgressSink {
    fn improved(&mut self, allocation: &GlobalAllocation);
}

/// Sink that ignores all events.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn improved(&mut self, _allocation: &GlobalAllocation) {}
}
