//! Worker-side checkout capability.

use std::fmt;
use std::ptr;
use std::sync::Arc;

use super::{Lane, LaneSession};
use crate::error::{Error, Result};
use crate::model::{SortKey, Timestamp, WorkItem};

/// The right to check out and run a lane's next work item.
///
/// A ticket is minted by [`LaneSession::register_ticket`] and is the only
/// way to drive the checkout protocol. It is not `Clone`, and the lane
/// refuses to mint a second one while it is live, so at most one worker can
/// hold a lane at a time.
///
/// A worker drives one work item through:
///
/// 1. [`will_run_task`](Self::will_run_task)
/// 2. [`take_task`](Self::take_task), then run the item outside the session
/// 3. [`did_process_task`](Self::did_process_task)
/// 4. if that returned `true`, [`will_re_enqueue`](Self::will_re_enqueue)
///    and hand the ticket back to the ready queue (`true`) or the
///    deferred-wait structure (`false`)
///
/// The session-taking steps borrow the ticket shared so a session opened
/// through [`begin_session`](Self::begin_session) can be passed straight
/// back in; holding that session is what makes them exclusive.
///
/// When `did_process_task` returns `false` the ticket is retired and should
/// be dropped. Methods that do not take a session lock the lane themselves,
/// so they must not be called while this thread holds a session on it.
pub struct LaneTicket {
    lane: Arc<Lane>,
    generation: u64,
}

impl LaneTicket {
    pub(super) fn new(lane: Arc<Lane>, generation: u64) -> Self {
        Self { lane, generation }
    }

    pub fn lane(&self) -> &Arc<Lane> {
        &self.lane
    }

    /// False once the ticket was retired by `did_process_task` or a clear.
    pub fn is_valid(&self) -> bool {
        self.lane.ticket_is_live(self.generation)
    }

    pub fn begin_session(&self) -> LaneSession<'_> {
        self.lane.begin_session()
    }

    /// Open a checkout. The lane moves to `CheckedOut`.
    pub fn will_run_task(&mut self) -> Result<()> {
        let mut session = self.lane.begin_session();
        session.ensure_ticket(self.generation, "will_run_task")?;
        session.will_run_task()
    }

    /// Pop the next work item: the immediate head, else the deferred head.
    pub fn take_task(&self, session: &mut LaneSession<'_>) -> Result<WorkItem> {
        self.check_session(session, "take_task")?;
        session.take_task()
    }

    /// Close the slot opened by `take_task`.
    ///
    /// Returns `true` when work remains; the caller must follow up with
    /// [`will_re_enqueue`](Self::will_re_enqueue). Returns `false` when the
    /// lane is now empty: it is `NotQueued` and this ticket is retired.
    pub fn did_process_task(&self, session: &mut LaneSession<'_>) -> Result<bool> {
        self.check_session(session, "did_process_task")?;
        session.did_process_task()
    }

    /// Pick the structure the lane goes back to.
    ///
    /// `true`: the front item is runnable at `now`, the lane is
    /// `ImmediateReady` and [`sort_key`](Self::sort_key) is valid.
    /// `false`: the lane is `Deferred` and
    /// [`delayed_sort_key`](Self::delayed_sort_key) is valid.
    pub fn will_re_enqueue(&self, now: Timestamp, session: &mut LaneSession<'_>) -> Result<bool> {
        self.check_session(session, "will_re_enqueue")?;
        session.will_re_enqueue(now)
    }

    /// Called once the deferred head's wake time has elapsed.
    pub fn on_become_ready(&mut self) -> Result<()> {
        let mut session = self.lane.begin_session();
        session.ensure_ticket(self.generation, "on_become_ready")?;
        session.on_become_ready()
    }

    /// Ready-queue ordering key. Valid while `ImmediateReady`.
    pub fn sort_key(&self) -> Result<SortKey> {
        let session = self.lane.begin_session();
        session.ensure_ticket(self.generation, "sort_key")?;
        session.sort_key()
    }

    /// Deferred-wait ordering key: the head's ready time. Valid while
    /// `Deferred`.
    pub fn delayed_sort_key(&self) -> Result<Timestamp> {
        let session = self.lane.begin_session();
        session.ensure_ticket(self.generation, "delayed_sort_key")?;
        session.delayed_sort_key()
    }

    /// Latest acceptable wake time for the deferred head, leeway included.
    pub fn latest_delayed_ready_time(&self) -> Result<Timestamp> {
        let session = self.lane.begin_session();
        session.ensure_ticket(self.generation, "latest_delayed_ready_time")?;
        session.latest_delayed_ready_time()
    }

    fn check_session(&self, session: &LaneSession<'_>, op: &'static str) -> Result<()> {
        if !ptr::eq(session.lane(), Arc::as_ptr(&self.lane)) {
            return Err(self.lane.violation(Error::ForeignSession { op }));
        }
        session.ensure_ticket(self.generation, op)
    }
}

impl Drop for LaneTicket {
    fn drop(&mut self) {
        self.lane.release_ticket(self.generation);
    }
}

impl fmt::Debug for LaneTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneTicket")
            .field("lane", &self.lane.id)
            .field("generation", &self.generation)
            .finish()
    }
}
