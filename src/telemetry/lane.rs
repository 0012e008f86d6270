//! Lane span helpers.
//!
//! Every lane carries one span; lane events are emitted as its children so
//! interleaved lanes stay distinguishable in the log.

use tracing::Span;

use crate::model::{LaneId, Location, Priority};

/// Create the span a lane logs under.
pub fn lane_span(lane_id: &LaneId, priority: Priority) -> Span {
    tracing::debug_span!(
        "lane",
        "lane.id" = %lane_id,
        "lane.priority" = %priority,
    )
}

/// Record a location transition as a `debug` event on the lane span.
pub fn record_location_transition(span: &Span, from: Location, to: Location) {
    tracing::debug!(parent: span, from = %from, to = %to, "location_transition");
}
