//! Lanes: serial execution contexts inside a multi-priority scheduler.
//!
//! A [`Lane`] owns an immediate FIFO and a deferred min-heap of
//! [`WorkItem`]s plus a [`Location`] tag. Producers mutate it through a
//! [`LaneSession`]; the single worker currently allowed to drain it does so
//! through the lane's [`LaneTicket`].
//!
//! The external scheduler never owns a lane. It holds the ticket, which keeps
//! the lane alive through an `Arc`, and uses the location and sort keys the
//! lane reports to decide where the ticket goes next.

mod queue;
mod session;
mod ticket;

pub use session::LaneSession;
pub use ticket::LaneTicket;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tracing::{Span, debug, error};

use crate::config::LaneConfig;
use crate::error::Error;
use crate::model::{CheckoutPhase, LaneId, Location, Priority, WorkItem};
use crate::telemetry::{lane::lane_span, metrics};
use queue::DeferredQueue;

/// Sentinel stored in [`Lane::ticket`] when no ticket is live.
const NO_TICKET: u64 = 0;

/// One logical serial execution context.
pub struct Lane {
    id: LaneId,
    priority: Priority,
    config: LaneConfig,
    state: Mutex<LaneState>,
    /// Generation of the live ticket, or [`NO_TICKET`].
    ticket: AtomicU64,
    last_ticket: AtomicU64,
    this: Weak<Lane>,
    span: Span,
}

/// Everything guarded by the lane mutex.
pub(crate) struct LaneState {
    immediate: VecDeque<WorkItem>,
    deferred: DeferredQueue,
    location: Location,
    checkout: CheckoutPhase,
    next_seq: u64,
}

impl LaneState {
    fn new() -> Self {
        Self {
            immediate: VecDeque::new(),
            deferred: DeferredQueue::default(),
            location: Location::NotQueued,
            checkout: CheckoutPhase::Idle,
            next_seq: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.deferred.is_empty()
    }

    /// The item `take_task` would return next.
    fn front(&self) -> Option<&WorkItem> {
        self.immediate.front().or_else(|| self.deferred.peek())
    }
}

impl Lane {
    /// Create a lane with the default [`LaneConfig`].
    pub fn new(priority: Priority) -> Arc<Self> {
        Self::with_config(priority, LaneConfig::default())
    }

    pub fn with_config(priority: Priority, config: LaneConfig) -> Arc<Self> {
        let id = LaneId::new();
        Arc::new_cyclic(|this| Self {
            id,
            priority,
            config,
            state: Mutex::new(LaneState::new()),
            ticket: AtomicU64::new(NO_TICKET),
            last_ticket: AtomicU64::new(NO_TICKET),
            this: this.clone(),
            span: lane_span(&id, priority),
        })
    }

    /// Acquire exclusive access to the lane, blocking while another session
    /// is open.
    pub fn begin_session(&self) -> LaneSession<'_> {
        LaneSession::new(self, self.state.lock())
    }

    pub fn id(&self) -> LaneId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    /// Whether a ticket for this lane is currently live.
    pub fn has_live_ticket(&self) -> bool {
        self.ticket.load(Ordering::Acquire) != NO_TICKET
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Claim the ticket slot, returning the new generation.
    fn claim_ticket(&self) -> Option<u64> {
        let generation = self.last_ticket.fetch_add(1, Ordering::Relaxed) + 1;
        self.ticket
            .compare_exchange(NO_TICKET, generation, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| generation)
    }

    fn ticket_is_live(&self, generation: u64) -> bool {
        self.ticket.load(Ordering::Acquire) == generation
    }

    /// Retire whichever ticket is live. Called with the lane lock held.
    fn retire_ticket(&self) {
        self.ticket.store(NO_TICKET, Ordering::Release);
    }

    /// Release the slot if `generation` still owns it.
    fn release_ticket(&self, generation: u64) {
        let _ = self.ticket.compare_exchange(
            generation,
            NO_TICKET,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn arc(&self) -> Option<Arc<Lane>> {
        self.this.upgrade()
    }

    /// Log and count a contract violation, handing the error back. Stale
    /// tickets are only logged at debug.
    pub(crate) fn violation(&self, err: Error) -> Error {
        let op = err.op().unwrap_or("unknown");
        if !err.is_contract_violation() {
            debug!(parent: &self.span, op, error = %err, "lane call refused");
            return err;
        }
        error!(parent: &self.span, op, error = %err, "lane contract violation");
        metrics::contract_violations().add(1, &[KeyValue::new("op", op)]);
        err
    }
}

impl std::fmt::Debug for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
