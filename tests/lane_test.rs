//! Integration tests for lane admission, ordering and the worked scenarios.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta};
use worklane::{Error, Lane, LaneTicket, Location, Priority, Timestamp, WorkItem};

fn at(ms: i64) -> Timestamp {
    DateTime::from_timestamp_millis(ms).expect("valid timestamp")
}

fn ms(n: i64) -> TimeDelta {
    TimeDelta::milliseconds(n)
}

/// Shared log the callbacks append their labels to.
#[derive(Clone, Default)]
struct RunLog(Arc<Mutex<Vec<&'static str>>>);

impl RunLog {
    fn item(&self, enqueue: Timestamp, label: &'static str) -> WorkItem {
        let log = self.clone();
        WorkItem::new(enqueue, move || log.0.lock().unwrap().push(label))
    }

    fn delayed(&self, enqueue: Timestamp, delay: TimeDelta, label: &'static str) -> WorkItem {
        let log = self.clone();
        WorkItem::delayed(enqueue, delay, move || log.0.lock().unwrap().push(label))
    }

    fn entries(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

/// One full checkout cycle. Returns what `did_process_task` reported.
fn run_one(ticket: &mut LaneTicket) -> bool {
    ticket.will_run_task().unwrap();
    let item = {
        let mut session = ticket.begin_session();
        ticket.take_task(&mut session).unwrap()
    };
    item.run();
    let mut session = ticket.begin_session();
    ticket.did_process_task(&mut session).unwrap()
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[test]
fn new_lane_is_empty_and_not_queued() {
    let lane = Lane::new(Priority::UserVisible);
    let session = lane.begin_session();
    assert_eq!(session.location(), Location::NotQueued);
    assert!(session.is_empty());
    assert!(session.should_be_queued());
    assert_eq!(session.priority(), Priority::UserVisible);
    assert_eq!(session.next_ready_time(), None);
}

#[test]
fn immediate_push_moves_not_queued_to_immediate_ready() {
    let lane = Lane::new(Priority::UserVisible);
    let mut session = lane.begin_session();

    let change = session
        .push_immediate_work_item(WorkItem::new(at(0), || {}))
        .unwrap();

    assert_eq!(change.from, Location::NotQueued);
    assert_eq!(change.to, Location::ImmediateReady);
    assert!(change.is_change());
    assert!(!session.should_be_queued());
    assert_eq!(session.immediate_len(), 1);
}

#[test]
fn delayed_push_moves_not_queued_to_deferred() {
    let lane = Lane::new(Priority::UserVisible);
    let mut session = lane.begin_session();

    let change = session
        .push_delayed_work_item(WorkItem::delayed(at(0), ms(5), || {}))
        .unwrap();

    assert_eq!(change.to, Location::Deferred);
    assert_eq!(session.deferred_len(), 1);
    assert_eq!(session.next_ready_time(), Some(at(5)));
}

#[test]
fn immediate_push_supersedes_deferred_wait() {
    let lane = Lane::new(Priority::UserVisible);
    let mut session = lane.begin_session();
    session
        .push_delayed_work_item(WorkItem::delayed(at(0), ms(50), || {}))
        .unwrap();

    let change = session
        .push_immediate_work_item(WorkItem::new(at(1), || {}))
        .unwrap();

    assert!(change.promoted_from_deferred());
    assert_eq!(session.location(), Location::ImmediateReady);
}

#[test]
fn delayed_push_never_preempts_immediate_ready() {
    let lane = Lane::new(Priority::UserVisible);
    let mut session = lane.begin_session();
    session
        .push_immediate_work_item(WorkItem::new(at(0), || {}))
        .unwrap();

    let change = session
        .push_delayed_work_item(WorkItem::delayed(at(0), ms(5), || {}))
        .unwrap();

    assert!(!change.is_change());
    assert_eq!(session.location(), Location::ImmediateReady);
}

#[test]
fn pushes_during_checkout_keep_location_checked_out() {
    let lane = Lane::new(Priority::UserVisible);
    let mut ticket = {
        let mut session = lane.begin_session();
        session
            .push_immediate_work_item(WorkItem::new(at(0), || {}))
            .unwrap();
        session.register_ticket().unwrap()
    };
    ticket.will_run_task().unwrap();

    let mut session = lane.begin_session();
    assert!(!session.should_be_queued());
    session
        .push_immediate_work_item(WorkItem::new(at(1), || {}))
        .unwrap();
    session
        .push_delayed_work_item(WorkItem::delayed(at(1), ms(3), || {}))
        .unwrap();
    assert_eq!(session.location(), Location::CheckedOut);
}

#[test]
fn should_be_queued_only_before_first_push() {
    let lane = Lane::new(Priority::BestEffort);
    let mut session = lane.begin_session();

    let mut answers = Vec::new();
    for t in 0..3 {
        answers.push(session.should_be_queued());
        session
            .push_immediate_work_item(WorkItem::new(at(t), || {}))
            .unwrap();
    }
    assert_eq!(answers, vec![true, false, false]);
}

#[test]
fn new_head_predicate_compares_ready_times() {
    let lane = Lane::new(Priority::UserVisible);
    let mut session = lane.begin_session();

    let first = WorkItem::delayed(at(0), ms(20), || {});
    assert!(session.will_deferred_work_item_become_new_head(&first));
    session.push_delayed_work_item(first).unwrap();

    let later = WorkItem::delayed(at(0), ms(30), || {});
    let same = WorkItem::delayed(at(10), ms(10), || {});
    let earlier = WorkItem::delayed(at(5), ms(10), || {});
    assert!(!session.will_deferred_work_item_become_new_head(&later));
    assert!(!session.will_deferred_work_item_become_new_head(&same));
    assert!(session.will_deferred_work_item_become_new_head(&earlier));
}

#[test]
fn new_head_predicate_ignores_immediate_items() {
    let lane = Lane::new(Priority::UserVisible);
    let mut session = lane.begin_session();
    session
        .push_immediate_work_item(WorkItem::new(at(0), || {}))
        .unwrap();

    let candidate = WorkItem::delayed(at(0), ms(100), || {});
    assert!(session.will_deferred_work_item_become_new_head(&candidate));
}

#[test]
fn session_without_mutation_changes_nothing() {
    let lane = Lane::new(Priority::UserVisible);
    {
        let mut session = lane.begin_session();
        session
            .push_immediate_work_item(WorkItem::new(at(0), || {}))
            .unwrap();
        session
            .push_delayed_work_item(WorkItem::delayed(at(0), ms(7), || {}))
            .unwrap();
    }

    for _ in 0..3 {
        let session = lane.begin_session();
        let _ = session.should_be_queued();
        let _ = session.has_ready_work_items(at(100));
        drop(session);
    }

    let session = lane.begin_session();
    assert_eq!(session.location(), Location::ImmediateReady);
    assert_eq!(session.immediate_len(), 1);
    assert_eq!(session.deferred_len(), 1);
}

// ---------------------------------------------------------------------------
// Dequeue precedence
// ---------------------------------------------------------------------------

#[test]
fn immediate_items_run_before_ripe_deferred_item() {
    let log = RunLog::default();
    let lane = Lane::new(Priority::UserVisible);
    let mut ticket = {
        let mut session = lane.begin_session();
        session
            .push_delayed_work_item(log.delayed(at(0), ms(1), "ripe"))
            .unwrap();
        session.push_immediate_work_item(log.item(at(50), "fresh")).unwrap();
        session.register_ticket().unwrap()
    };

    assert!(run_one(&mut ticket));
    {
        let mut session = ticket.begin_session();
        assert!(ticket.will_re_enqueue(at(50), &mut session).unwrap());
    }
    assert!(!run_one(&mut ticket));

    assert_eq!(log.entries(), vec!["fresh", "ripe"]);
}

#[test]
fn deferred_items_run_by_ready_time_then_push_order() {
    let log = RunLog::default();
    let lane = Lane::new(Priority::UserVisible);
    let mut ticket = {
        let mut session = lane.begin_session();
        session
            .push_delayed_work_item(log.delayed(at(0), ms(30), "c"))
            .unwrap();
        session
            .push_delayed_work_item(log.delayed(at(0), ms(10), "a"))
            .unwrap();
        session
            .push_delayed_work_item(log.delayed(at(5), ms(5), "b"))
            .unwrap();
        session.register_ticket().unwrap()
    };

    ticket.on_become_ready().unwrap();
    while run_one(&mut ticket) {
        let mut session = ticket.begin_session();
        assert!(ticket.will_re_enqueue(at(100), &mut session).unwrap());
    }

    assert_eq!(log.entries(), vec!["a", "b", "c"]);
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_deferred_items_reorder_and_reenqueue_deferred() {
    let log = RunLog::default();
    let lane = Lane::new(Priority::UserVisible);

    let mut ticket = {
        let mut session = lane.begin_session();
        assert!(session.should_be_queued());
        session
            .push_delayed_work_item(log.delayed(at(0), ms(20), "A"))
            .unwrap();
        session
            .push_delayed_work_item(log.delayed(at(0), ms(10), "B"))
            .unwrap();
        assert_eq!(session.location(), Location::Deferred);
        session.register_ticket().unwrap()
    };
    assert_eq!(ticket.delayed_sort_key().unwrap(), at(10));

    // t = 11ms
    ticket.on_become_ready().unwrap();
    ticket.will_run_task().unwrap();
    let mut session = ticket.begin_session();
    let item = ticket.take_task(&mut session).unwrap();
    item.run();
    assert_eq!(log.entries(), vec!["B"]);

    assert!(ticket.did_process_task(&mut session).unwrap());
    assert!(!ticket.will_re_enqueue(at(11), &mut session).unwrap());
    assert_eq!(session.location(), Location::Deferred);
    drop(session);

    assert_eq!(ticket.delayed_sort_key().unwrap(), at(20));
}

#[test]
fn scenario_immediate_items_drain_in_order() {
    let log = RunLog::default();
    let lane = Lane::new(Priority::UserBlocking);

    let mut ticket = {
        let mut session = lane.begin_session();
        let mut queued = Vec::new();
        for label in ["X", "Y", "Z"] {
            queued.push(session.should_be_queued());
            session.push_immediate_work_item(log.item(at(0), label)).unwrap();
        }
        assert_eq!(queued, vec![true, false, false]);
        session.register_ticket().unwrap()
    };

    for round in 0..3 {
        let more = run_one(&mut ticket);
        if round < 2 {
            assert!(more);
            let mut session = ticket.begin_session();
            assert!(ticket.will_re_enqueue(at(0), &mut session).unwrap());
        } else {
            assert!(!more);
        }
    }

    assert_eq!(log.entries(), vec!["X", "Y", "Z"]);
    let session = lane.begin_session();
    assert_eq!(session.location(), Location::NotQueued);
    assert!(session.is_empty());
}

// ---------------------------------------------------------------------------
// Clear
// ---------------------------------------------------------------------------

#[test]
fn clear_returns_pending_items_and_retires_ticket() {
    let lane = Lane::new(Priority::UserVisible);
    let ticket = {
        let mut session = lane.begin_session();
        session
            .push_immediate_work_item(WorkItem::new(at(0), || {}))
            .unwrap();
        session
            .push_delayed_work_item(WorkItem::delayed(at(0), ms(5), || {}))
            .unwrap();
        session.register_ticket().unwrap()
    };

    let drained = lane.begin_session().clear();
    assert_eq!(drained.len(), 2);
    assert!(drained[0].is_immediate());
    assert!(!ticket.is_valid());

    let mut session = lane.begin_session();
    assert_eq!(session.location(), Location::NotQueued);
    assert!(session.should_be_queued());
    // A fresh ticket can be minted once the old one is retired.
    assert!(session.register_ticket().is_ok());
}

#[test]
fn ticket_retired_by_clear_is_not_a_contract_violation() {
    let lane = Lane::new(Priority::UserVisible);
    let mut ticket = {
        let mut session = lane.begin_session();
        session
            .push_immediate_work_item(WorkItem::new(at(0), || {}))
            .unwrap();
        session.register_ticket().unwrap()
    };
    lane.begin_session().clear();

    let err = ticket.will_run_task().unwrap_err();
    assert!(matches!(err, Error::TicketRetired { op: "will_run_task" }));
    assert!(!err.is_contract_violation());
    assert_eq!(err.op(), Some("will_run_task"));

    let err = ticket.sort_key().unwrap_err();
    assert!(!err.is_contract_violation());
}

#[test]
fn clear_during_running_checkout_lets_worker_finish() {
    let lane = Lane::new(Priority::UserVisible);
    let mut ticket = {
        let mut session = lane.begin_session();
        session
            .push_immediate_work_item(WorkItem::new(at(0), || {}))
            .unwrap();
        session
            .push_immediate_work_item(WorkItem::new(at(1), || {}))
            .unwrap();
        session.register_ticket().unwrap()
    };
    ticket.will_run_task().unwrap();
    let item = {
        let mut session = ticket.begin_session();
        ticket.take_task(&mut session).unwrap()
    };

    let drained = lane.begin_session().clear();
    assert_eq!(drained.len(), 1);
    assert!(ticket.is_valid());

    item.run();
    let mut session = ticket.begin_session();
    assert!(!ticket.did_process_task(&mut session).unwrap());
    assert_eq!(session.location(), Location::NotQueued);
}
