//! # worklane
//!
//! Per-lane work admission and checkout core for a multi-priority
//! cooperative scheduler.
//!
//! A [`Lane`] is one serial execution context. Producers push
//! [`WorkItem`]s through a [`LaneSession`] and learn whether the lane must be
//! admitted into the scheduler's ready queue or deferred-wait structure. The
//! single worker allowed to drain a lane does so through its [`LaneTicket`].
//! The cross-lane structures, worker threads and timers live outside this
//! crate.

pub mod config;
pub mod error;
pub mod lane;
pub mod model;
pub mod telemetry;

pub use config::{Config, LaneConfig};
pub use error::{Error, Result};
pub use lane::{Lane, LaneSession, LaneTicket};
pub use model::{
    CheckoutPhase, DelayPolicy, LaneId, Location, LocationChange, Priority, SortKey, Timestamp,
    WorkItem,
};
