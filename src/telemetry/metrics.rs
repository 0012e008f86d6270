//! Metric instrument factories for worklane.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"worklane"` meter.

use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for worklane instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("worklane")
}

/// Counter: work items accepted by a lane.
/// Labels: `kind` ("immediate" | "deferred").
pub fn work_items_pushed() -> Counter<u64> {
    meter()
        .u64_counter("worklane.work_items.pushed")
        .with_description("Number of work items pushed into lanes")
        .build()
}

/// Counter: work items handed to workers by `take_task`.
/// Labels: `source` ("immediate" | "deferred").
pub fn work_items_taken() -> Counter<u64> {
    meter()
        .u64_counter("worklane.work_items.taken")
        .with_description("Number of work items taken by workers")
        .build()
}

/// Counter: lane location changes.
/// Labels: `from`, `to`.
pub fn location_transitions() -> Counter<u64> {
    meter()
        .u64_counter("worklane.lane.location_transitions")
        .with_description("Number of lane location transitions")
        .build()
}

/// Counter: calls refused because they broke the lane protocol.
/// Labels: `op`.
pub fn contract_violations() -> Counter<u64> {
    meter()
        .u64_counter("worklane.lane.contract_violations")
        .with_description("Number of lane protocol violations")
        .build()
}
