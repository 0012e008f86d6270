//! Core data model.
//!
//! A work item is a callback plus the timing metadata the lane needs to order
//! it. A lane tags itself with a location recording which external scheduler
//! structure currently references it.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Point in time used for all ready-time arithmetic.
pub type Timestamp = DateTime<Utc>;

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Scheduling priority of a lane. Higher variants run first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Work the user will not notice if it is late.
    BestEffort,
    /// Work whose result the user can observe.
    #[default]
    UserVisible,
    /// Work the user is actively waiting on.
    UserBlocking,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::BestEffort => "best_effort",
            Priority::UserVisible => "user_visible",
            Priority::UserBlocking => "user_blocking",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Which external structure, if any, currently references a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// Empty and idle. Nothing outside the owner references the lane.
    NotQueued,
    /// Sitting in the external ready queue.
    ImmediateReady,
    /// Sitting in the external deferred-wait structure.
    Deferred,
    /// Held by a worker running the checkout protocol.
    CheckedOut,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Location::NotQueued => "not_queued",
            Location::ImmediateReady => "immediate_ready",
            Location::Deferred => "deferred",
            Location::CheckedOut => "checked_out",
        };
        write!(f, "{s}")
    }
}

/// Location before and after a push.
///
/// `from == Deferred && to == ImmediateReady` means the caller must move the
/// lane out of its deferred-wait structure into the ready queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationChange {
    pub from: Location,
    pub to: Location,
}

impl LocationChange {
    pub fn is_change(self) -> bool {
        self.from != self.to
    }

    /// The lane left the deferred structure for the ready queue.
    pub fn promoted_from_deferred(self) -> bool {
        self.from == Location::Deferred && self.to == Location::ImmediateReady
    }
}

// ---------------------------------------------------------------------------
// Checkout phase
// ---------------------------------------------------------------------------

/// Progress of the worker-side checkout protocol on a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    /// No checkout in progress.
    Idle,
    /// `will_run_task` called, nothing taken yet.
    Claimed,
    /// A work item was taken and is being run by the worker.
    Running,
    /// `did_process_task` reported remaining work; `will_re_enqueue` is next.
    Processed,
}

impl fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckoutPhase::Idle => "idle",
            CheckoutPhase::Claimed => "claimed",
            CheckoutPhase::Running => "running",
            CheckoutPhase::Processed => "processed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Delay policy
// ---------------------------------------------------------------------------

/// How much slack a delayed work item tolerates around its ready time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayPolicy {
    /// Never runs before `ready_time`; may run up to `leeway` after it.
    #[default]
    FlexibleNoSooner,
    /// May run up to `leeway` before `ready_time`; never after.
    FlexiblePreferEarly,
    /// Runs at `ready_time`. Leeway is ignored.
    Precise,
}

// ---------------------------------------------------------------------------
// Work item
// ---------------------------------------------------------------------------

pub(crate) type Callback = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work pushed into a lane.
pub struct WorkItem {
    callback: Callback,
    enqueue_time: Timestamp,
    delay: TimeDelta,
    delay_policy: Option<DelayPolicy>,
    leeway: Option<TimeDelta>,
    /// Push order within the owning lane. Stamped by the lane.
    pub(crate) seq: u64,
}

impl WorkItem {
    /// An immediate work item posted at `enqueue_time`.
    pub fn new(enqueue_time: Timestamp, callback: impl FnOnce() + Send + 'static) -> Self {
        Self::delayed(enqueue_time, TimeDelta::zero(), callback)
    }

    /// A work item that becomes ready `delay` after `enqueue_time`.
    pub fn delayed(
        enqueue_time: Timestamp,
        delay: TimeDelta,
        callback: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            callback: Box::new(callback),
            enqueue_time,
            delay,
            delay_policy: None,
            leeway: None,
            seq: 0,
        }
    }

    pub fn with_delay_policy(mut self, policy: DelayPolicy) -> Self {
        self.delay_policy = Some(policy);
        self
    }

    pub fn with_leeway(mut self, leeway: TimeDelta) -> Self {
        self.leeway = Some(leeway);
        self
    }

    pub fn enqueue_time(&self) -> Timestamp {
        self.enqueue_time
    }

    pub fn delay(&self) -> TimeDelta {
        self.delay
    }

    pub fn is_immediate(&self) -> bool {
        self.delay.is_zero()
    }

    /// `enqueue_time + delay`, saturating at the representable range.
    pub fn ready_time(&self) -> Timestamp {
        saturating_add(self.enqueue_time, self.delay)
    }

    pub fn delay_policy(&self) -> DelayPolicy {
        self.delay_policy.unwrap_or_default()
    }

    /// Effective leeway. Always zero under [`DelayPolicy::Precise`].
    pub fn leeway(&self) -> TimeDelta {
        match self.delay_policy() {
            DelayPolicy::Precise => TimeDelta::zero(),
            _ => self
                .leeway
                .unwrap_or_else(TimeDelta::zero)
                .max(TimeDelta::zero()),
        }
    }

    /// Earliest time at which the item may be considered ready.
    pub fn earliest_ready_time(&self) -> Timestamp {
        match self.delay_policy() {
            DelayPolicy::FlexiblePreferEarly => saturating_add(self.ready_time(), -self.leeway()),
            _ => self.ready_time(),
        }
    }

    /// Latest time by which the item should have been made ready.
    pub fn latest_ready_time(&self) -> Timestamp {
        match self.delay_policy() {
            DelayPolicy::FlexibleNoSooner => saturating_add(self.ready_time(), self.leeway()),
            _ => self.ready_time(),
        }
    }

    /// Insertion sequence number within the lane it was pushed to.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Fill in lane defaults for anything the producer left unset.
    pub(crate) fn resolve_defaults(&mut self, policy: DelayPolicy, leeway: TimeDelta) {
        self.delay_policy.get_or_insert(policy);
        self.leeway.get_or_insert(leeway);
    }

    /// Run the callback, consuming the item.
    pub fn run(self) {
        (self.callback)()
    }
}

/// `time + delta`, clamped to the earliest or latest representable instant.
fn saturating_add(time: Timestamp, delta: TimeDelta) -> Timestamp {
    time.checked_add_signed(delta).unwrap_or(if delta < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("seq", &self.seq)
            .field("enqueue_time", &self.enqueue_time)
            .field("delay", &self.delay)
            .field("delay_policy", &self.delay_policy)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Sort key
// ---------------------------------------------------------------------------

/// Cross-lane ordering key for lanes in the external ready queue.
///
/// `Ord` is arranged so that the *greater* key should run first: higher
/// priority wins, and within a priority the older `ready_time` wins. This
/// makes `BinaryHeap<SortKey>` pop the most urgent lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub priority: Priority,
    pub ready_time: Timestamp,
}

impl SortKey {
    pub fn new(priority: Priority, ready_time: Timestamp) -> Self {
        Self {
            priority,
            ready_time,
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.ready_time.cmp(&self.ready_time))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Lane id
// ---------------------------------------------------------------------------

/// Newtype for lane identifiers. Used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneId(pub Uuid);

impl LaneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for LaneId {
    fn default() -> Self {
        Self::new()
    }
}
