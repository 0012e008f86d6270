//! Scoped exclusive access to a lane.

use std::fmt;

use chrono::TimeDelta;
use opentelemetry::KeyValue;
use parking_lot::MutexGuard;
use tracing::trace;

use super::{Lane, LaneState, LaneTicket};
use crate::error::{Error, Result};
use crate::model::{
    CheckoutPhase, LaneId, Location, LocationChange, Priority, SortKey, Timestamp, WorkItem,
};
use crate::telemetry::{lane::record_location_transition, metrics};

/// Handle for reading and mutating a lane while holding its lock.
///
/// Only one session per lane is open at a time. The lock is released when
/// the session is dropped. Opening and dropping a session without calling
/// any mutating method leaves the lane exactly as it was.
pub struct LaneSession<'a> {
    lane: &'a Lane,
    state: MutexGuard<'a, LaneState>,
}

impl<'a> LaneSession<'a> {
    pub(super) fn new(lane: &'a Lane, state: MutexGuard<'a, LaneState>) -> Self {
        Self { lane, state }
    }

    pub(super) fn lane(&self) -> &'a Lane {
        self.lane
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn lane_id(&self) -> LaneId {
        self.lane.id
    }

    pub fn priority(&self) -> Priority {
        self.lane.priority
    }

    pub fn location(&self) -> Location {
        self.state.location
    }

    pub fn checkout_phase(&self) -> CheckoutPhase {
        self.state.checkout
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn len(&self) -> usize {
        self.immediate_len() + self.deferred_len()
    }

    pub fn immediate_len(&self) -> usize {
        self.state.immediate.len()
    }

    pub fn deferred_len(&self) -> usize {
        self.state.deferred.len()
    }

    /// Ready time of the item that would be taken next, if any.
    pub fn next_ready_time(&self) -> Option<Timestamp> {
        self.state.front().map(WorkItem::ready_time)
    }

    /// Whether the item that would be taken next may run at `now`.
    pub fn has_ready_work_items(&self, now: Timestamp) -> bool {
        if !self.state.immediate.is_empty() {
            return true;
        }
        self.state
            .deferred
            .peek()
            .is_some_and(|head| head.earliest_ready_time() <= now)
    }

    // -----------------------------------------------------------------------
    // Producer side
    // -----------------------------------------------------------------------

    /// True iff the lane is referenced by no external structure.
    ///
    /// Query before pushing: a `true` answer means the caller must admit the
    /// lane into an external structure after the push.
    pub fn should_be_queued(&self) -> bool {
        self.state.location == Location::NotQueued
    }

    /// Whether pushing `candidate` would give the deferred queue a new head.
    ///
    /// Evaluate immediately before pushing `candidate`; a `true` answer means
    /// the external deferred-wait timer may need to fire earlier.
    pub fn will_deferred_work_item_become_new_head(&self, candidate: &WorkItem) -> bool {
        match self.state.deferred.peek() {
            None => true,
            Some(head) => candidate.ready_time() < head.ready_time(),
        }
    }

    /// Append a zero-delay item to the immediate queue.
    ///
    /// A lane waiting in the deferred structure moves to `ImmediateReady`;
    /// the returned change tells the caller to relocate it.
    pub fn push_immediate_work_item(&mut self, mut item: WorkItem) -> Result<LocationChange> {
        if !item.is_immediate() {
            return Err(self.lane.violation(Error::NotImmediate { delay: item.delay() }));
        }

        self.stamp(&mut item);
        trace!(parent: self.lane.span(), seq = item.seq, "immediate work item pushed");
        self.state.immediate.push_back(item);
        metrics::work_items_pushed().add(1, &[KeyValue::new("kind", "immediate")]);

        let from = self.state.location;
        if matches!(from, Location::NotQueued | Location::Deferred) {
            self.set_location(Location::ImmediateReady);
        }
        Ok(LocationChange {
            from,
            to: self.state.location,
        })
    }

    /// Insert a positive-delay item into the deferred queue.
    ///
    /// Only an idle, empty lane changes location (to `Deferred`); deferred
    /// work never preempts immediate work or a running checkout.
    pub fn push_delayed_work_item(&mut self, mut item: WorkItem) -> Result<LocationChange> {
        if item.delay() <= TimeDelta::zero() {
            return Err(self.lane.violation(Error::NotDelayed { delay: item.delay() }));
        }

        self.stamp(&mut item);
        trace!(
            parent: self.lane.span(),
            seq = item.seq,
            ready_time = %item.ready_time(),
            "delayed work item pushed"
        );
        self.state.deferred.push(item);
        metrics::work_items_pushed().add(1, &[KeyValue::new("kind", "deferred")]);

        let from = self.state.location;
        if from == Location::NotQueued {
            self.set_location(Location::Deferred);
        }
        Ok(LocationChange {
            from,
            to: self.state.location,
        })
    }

    /// Mint the lane's ticket. Fails while another ticket is live.
    pub fn register_ticket(&mut self) -> Result<LaneTicket> {
        let Some(generation) = self.lane.claim_ticket() else {
            return Err(self.lane.violation(Error::TicketOutstanding));
        };
        let Some(lane) = self.lane.arc() else {
            self.lane.release_ticket(generation);
            return Err(Error::Other("lane is being dropped".to_string()));
        };
        trace!(parent: self.lane.span(), generation, "ticket registered");
        Ok(LaneTicket::new(lane, generation))
    }

    /// Discard all pending work and retire the live ticket.
    ///
    /// Items are returned so they are dropped after the session closes. A
    /// worker that already took an item keeps its checkout and will see
    /// `did_process_task` report an empty lane; any other checkout is
    /// abandoned and its ticket reports `TicketRetired`.
    pub fn clear(&mut self) -> Vec<WorkItem> {
        let mut drained: Vec<WorkItem> = self.state.immediate.drain(..).collect();
        drained.extend(std::iter::from_fn(|| self.state.deferred.pop()));

        if self.state.checkout != CheckoutPhase::Running {
            self.lane.retire_ticket();
            self.state.checkout = CheckoutPhase::Idle;
            self.set_location(Location::NotQueued);
        }
        trace!(parent: self.lane.span(), count = drained.len(), "lane cleared");
        drained
    }

    // -----------------------------------------------------------------------
    // Worker side (driven through LaneTicket)
    // -----------------------------------------------------------------------

    pub(super) fn ensure_ticket(&self, generation: u64, op: &'static str) -> Result<()> {
        if self.lane.ticket_is_live(generation) {
            Ok(())
        } else {
            Err(self.lane.violation(Error::TicketRetired { op }))
        }
    }

    pub(super) fn will_run_task(&mut self) -> Result<()> {
        const OP: &str = "will_run_task";
        self.expect_phase(OP, CheckoutPhase::Idle)?;
        if self.state.is_empty() {
            return Err(self.lane.violation(Error::EmptyLane { op: OP }));
        }
        self.state.checkout = CheckoutPhase::Claimed;
        self.set_location(Location::CheckedOut);
        Ok(())
    }

    pub(super) fn take_task(&mut self) -> Result<WorkItem> {
        const OP: &str = "take_task";
        self.expect_phase(OP, CheckoutPhase::Claimed)?;

        let (item, source) = match self.state.immediate.pop_front() {
            Some(item) => (item, "immediate"),
            None => match self.state.deferred.pop() {
                Some(item) => (item, "deferred"),
                None => return Err(self.lane.violation(Error::EmptyLane { op: OP })),
            },
        };

        self.state.checkout = CheckoutPhase::Running;
        trace!(parent: self.lane.span(), seq = item.seq, source, "work item taken");
        metrics::work_items_taken().add(1, &[KeyValue::new("source", source)]);
        Ok(item)
    }

    pub(super) fn did_process_task(&mut self) -> Result<bool> {
        self.expect_phase("did_process_task", CheckoutPhase::Running)?;

        if self.state.is_empty() {
            self.state.checkout = CheckoutPhase::Idle;
            self.lane.retire_ticket();
            self.set_location(Location::NotQueued);
            return Ok(false);
        }
        self.state.checkout = CheckoutPhase::Processed;
        Ok(true)
    }

    pub(super) fn will_re_enqueue(&mut self, now: Timestamp) -> Result<bool> {
        const OP: &str = "will_re_enqueue";
        self.expect_phase(OP, CheckoutPhase::Processed)?;
        if self.state.is_empty() {
            return Err(self.lane.violation(Error::EmptyLane { op: OP }));
        }

        let ready = self.has_ready_work_items(now);
        self.state.checkout = CheckoutPhase::Idle;
        self.set_location(if ready {
            Location::ImmediateReady
        } else {
            Location::Deferred
        });
        Ok(ready)
    }

    pub(super) fn on_become_ready(&mut self) -> Result<()> {
        self.expect_location("on_become_ready", Location::Deferred)?;
        self.set_location(Location::ImmediateReady);
        Ok(())
    }

    /// Front item's ready time. A promoted deferred head reports its own
    /// scheduled ready time, not the moment it was promoted.
    pub(super) fn sort_key(&self) -> Result<SortKey> {
        const OP: &str = "sort_key";
        self.expect_location(OP, Location::ImmediateReady)?;
        match self.state.front() {
            Some(front) => Ok(SortKey::new(self.lane.priority, front.ready_time())),
            None => Err(self.lane.violation(Error::EmptyLane { op: OP })),
        }
    }

    pub(super) fn delayed_sort_key(&self) -> Result<Timestamp> {
        self.deferred_head("delayed_sort_key").map(WorkItem::ready_time)
    }

    pub(super) fn latest_delayed_ready_time(&self) -> Result<Timestamp> {
        self.deferred_head("latest_delayed_ready_time")
            .map(WorkItem::latest_ready_time)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn deferred_head(&self, op: &'static str) -> Result<&WorkItem> {
        self.expect_location(op, Location::Deferred)?;
        self.state
            .deferred
            .peek()
            .ok_or_else(|| self.lane.violation(Error::EmptyLane { op }))
    }

    fn stamp(&mut self, item: &mut WorkItem) {
        let config = &self.lane.config;
        item.resolve_defaults(config.delay_policy, config.leeway());
        item.seq = self.state.next_seq;
        self.state.next_seq += 1;
    }

    fn expect_phase(&self, op: &'static str, expected: CheckoutPhase) -> Result<()> {
        if self.state.checkout == expected {
            Ok(())
        } else {
            Err(self.lane.violation(Error::InvalidCheckout {
                op,
                phase: self.state.checkout,
            }))
        }
    }

    fn expect_location(&self, op: &'static str, expected: Location) -> Result<()> {
        if self.state.location == expected {
            Ok(())
        } else {
            Err(self.lane.violation(Error::InvalidLocation {
                op,
                expected,
                actual: self.state.location,
            }))
        }
    }

    fn set_location(&mut self, to: Location) {
        let from = self.state.location;
        if from == to {
            return;
        }
        self.state.location = to;
        record_location_transition(self.lane.span(), from, to);
        metrics::location_transitions().add(
            1,
            &[
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", to.to_string()),
            ],
        );
    }
}

impl fmt::Debug for LaneSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneSession")
            .field("lane", &self.lane.id)
            .field("location", &self.state.location)
            .field("checkout", &self.state.checkout)
            .field("immediate", &self.state.immediate.len())
            .field("deferred", &self.state.deferred.len())
            .finish()
    }
}
