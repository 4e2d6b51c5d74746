//! Integration tests for the queue store.

use std::time::Duration;

use assignq::error::Error;
use assignq::event::EventKind;
use assignq::model::*;
use assignq::store::{EnqueueResult, QueueStore};

fn test_store() -> QueueStore {
    QueueStore::in_memory().expect("failed to create in-memory store")
}

fn new_entry(id: &str, skills: &[&str]) -> NewQueueEntry {
    NewQueueEntry::new(id, "ticket").skills(skills.iter().copied().collect())
}

// ---------------------------------------------------------------------------
// Enqueue idempotence and validation
// ---------------------------------------------------------------------------

#[test]
fn enqueue_creates_pending_entry() {
    let mut store = test_store();

    let entry = match store
        .enqueue(&new_entry("T-1", &["skill-arabic"]).priority(Priority::High))
        .unwrap()
    {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };

    assert_eq!(entry.status, Status::Pending);
    assert_eq!(entry.priority, Priority::High);
    assert_eq!(entry.attempts, 0);
    assert!(entry.claimed_at.is_none());
}

#[test]
fn re_enqueue_returns_existing_entry_unchanged() {
    let mut store = test_store();

    let first = match store.enqueue(&new_entry("T-1", &["skill-arabic"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };

    // Same work item key, different skills and priority: dedup hit, the
    // existing entry wins untouched.
    let second = store
        .enqueue(&new_entry("T-1", &["skill-legal"]).priority(Priority::Urgent))
        .unwrap();

    match second {
        EnqueueResult::Existing(entry) => {
            assert_eq!(entry.id, first.id);
            assert_eq!(entry.priority, first.priority);
            assert_eq!(entry.required_skills, first.required_skills);
        }
        EnqueueResult::Created(_) => panic!("expected Existing, got Created"),
    }

    assert_eq!(store.candidates(None).unwrap().len(), 1);
}

#[test]
fn same_id_different_type_is_a_different_work_item() {
    let mut store = test_store();

    store.enqueue(&new_entry("W-1", &["s"])).unwrap();
    let second = store
        .enqueue(&NewQueueEntry::new("W-1", "dossier-item").skill("s"))
        .unwrap();

    assert!(matches!(second, EnqueueResult::Created(_)));
    assert_eq!(store.candidates(None).unwrap().len(), 2);
}

#[test]
fn terminal_entry_does_not_block_re_enqueue() {
    let mut store = test_store();

    let entry = match store.enqueue(&new_entry("T-1", &["s"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };
    store.cancel(&entry.key).unwrap();

    // The old entry is terminal; the work item may come back.
    let again = store.enqueue(&new_entry("T-1", &["s"])).unwrap();
    assert!(matches!(again, EnqueueResult::Created(_)));
}

#[test]
fn invalid_entries_are_rejected_synchronously() {
    let mut store = test_store();

    let no_skills = NewQueueEntry::new("T-1", "ticket");
    assert!(matches!(
        store.enqueue(&no_skills),
        Err(Error::InvalidEntry(_))
    ));

    let blank_id = NewQueueEntry::new("  ", "ticket").skill("s");
    assert!(matches!(
        store.enqueue(&blank_id),
        Err(Error::InvalidEntry(_))
    ));

    // Nothing entered the store.
    assert_eq!(store.candidates(None).unwrap().len(), 0);
}

// ---------------------------------------------------------------------------
// Transitions and attempts
// ---------------------------------------------------------------------------

#[test]
fn claim_sets_claimed_at_and_revert_clears_it() {
    let mut store = test_store();
    let entry = match store.enqueue(&new_entry("T-1", &["s"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };

    store
        .transition(entry.id, Status::Pending, Status::Claimed)
        .unwrap();
    assert!(store.get(entry.id).unwrap().claimed_at.is_some());

    let attempts = store.fail_attempt(entry.id).unwrap();
    assert_eq!(attempts, 1);

    let reverted = store.get(entry.id).unwrap();
    assert_eq!(reverted.status, Status::Pending);
    assert!(reverted.claimed_at.is_none());
}

#[test]
fn fail_attempt_on_non_claimed_entry_conflicts() {
    let mut store = test_store();
    let entry = match store.enqueue(&new_entry("T-1", &["s"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };

    assert!(matches!(
        store.fail_attempt(entry.id),
        Err(Error::Conflict { .. })
    ));
}

#[test]
fn escalated_entry_leaves_the_working_set() {
    let mut store = test_store();
    let entry = match store.enqueue(&new_entry("T-1", &["s"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };

    store.escalate(entry.id).unwrap();
    assert_eq!(store.get(entry.id).unwrap().status, Status::Escalated);
    assert!(store.candidates(None).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn cancel_marks_pending_entry_terminal() {
    let mut store = test_store();
    let entry = match store.enqueue(&new_entry("T-1", &["s"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };

    let cancelled = store.cancel(&entry.key).unwrap().expect("should cancel");
    assert_eq!(cancelled.id, entry.id);
    assert_eq!(cancelled.status, Status::Cancelled);
    assert!(store.cancel(&entry.key).unwrap().is_none());
}

#[test]
fn cancel_of_claimed_entry_defeats_in_flight_finalize() {
    let mut store = test_store();
    let entry = match store.enqueue(&new_entry("T-1", &["s"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };

    store
        .transition(entry.id, Status::Pending, Status::Claimed)
        .unwrap();
    store.cancel(&entry.key).unwrap().expect("should cancel");

    // The in-flight finalize and the abort revert both lose their
    // conditional updates.
    assert!(matches!(
        store.transition(entry.id, Status::Claimed, Status::Assigned),
        Err(Error::Conflict { .. })
    ));
    assert!(matches!(
        store.fail_attempt(entry.id),
        Err(Error::Conflict { .. })
    ));
    assert_eq!(store.get(entry.id).unwrap().status, Status::Cancelled);
}

// ---------------------------------------------------------------------------
// Stale claim recovery
// ---------------------------------------------------------------------------

#[test]
fn stale_claims_revert_to_pending_without_an_attempt() {
    let mut store = test_store();
    let entry = match store.enqueue(&new_entry("T-1", &["s"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };

    store
        .transition(entry.id, Status::Pending, Status::Claimed)
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let recovered = store
        .release_stale_claims(Duration::from_millis(1))
        .unwrap();
    assert_eq!(recovered, vec![entry.id]);

    let healed = store.get(entry.id).unwrap();
    assert_eq!(healed.status, Status::Pending);
    assert_eq!(healed.attempts, 0);

    let events = store.events_since(0).unwrap();
    assert!(
        events
            .iter()
            .any(|e| matches!(e.kind, EventKind::StaleClaimRecovered { id } if id == entry.id))
    );
}

#[test]
fn recovery_reports_exactly_the_reverted_entries() {
    let mut store = test_store();

    let stale = match store.enqueue(&new_entry("T-stale", &["s"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };
    store
        .transition(stale.id, Status::Pending, Status::Claimed)
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let fresh = match store.enqueue(&new_entry("T-fresh", &["s"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };
    store
        .transition(fresh.id, Status::Pending, Status::Claimed)
        .unwrap();

    let recovered = store
        .release_stale_claims(Duration::from_millis(10))
        .unwrap();

    // Every reported id was actually reverted, and nothing else was.
    assert_eq!(recovered, vec![stale.id]);
    for id in &recovered {
        assert_eq!(store.get(*id).unwrap().status, Status::Pending);
    }
    assert_eq!(store.get(fresh.id).unwrap().status, Status::Claimed);
}

#[test]
fn fresh_claims_are_left_alone() {
    let mut store = test_store();
    let entry = match store.enqueue(&new_entry("T-1", &["s"])).unwrap() {
        EnqueueResult::Created(entry) => entry,
        _ => panic!("expected Created"),
    };

    store
        .transition(entry.id, Status::Pending, Status::Claimed)
        .unwrap();

    let recovered = store.release_stale_claims(Duration::from_secs(300)).unwrap();
    assert!(recovered.is_empty());
    assert_eq!(store.get(entry.id).unwrap().status, Status::Claimed);
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn events_are_recorded_with_monotonic_seq() {
    let mut store = test_store();

    store.enqueue(&new_entry("T-1", &["s"])).unwrap();
    store.enqueue(&new_entry("T-2", &["s"])).unwrap();
    store
        .cancel(&WorkItemKey::new("T-1", "ticket"))
        .unwrap()
        .expect("should cancel");

    let events = store.events_since(0).unwrap();
    assert!(events.len() >= 3);
    for window in events.windows(2) {
        assert!(window[1].seq > window[0].seq);
    }
}
