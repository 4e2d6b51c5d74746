//! Debouncer tests. All timing runs on tokio's paused clock — no real
//! sleeps, fully deterministic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use assignq::config::EngineConfig;
use assignq::debounce::{Debouncer, PassTrigger};
use assignq::engine::{Engine, Notifier, WorkItemService};
use assignq::model::*;
use assignq::store::QueueStore;

#[derive(Default)]
struct RecordingTrigger {
    passes: Mutex<Vec<(Instant, SkillSet)>>,
}

impl RecordingTrigger {
    fn count(&self) -> usize {
        self.passes.lock().unwrap().len()
    }
}

impl PassTrigger for RecordingTrigger {
    fn run_pass(&self, freed: SkillSet) {
        self.passes.lock().unwrap().push((Instant::now(), freed));
    }
}

fn capacity(assignee: &str, skills: &[&str]) -> CapacityEvent {
    CapacityEvent {
        assignee_id: SlotId::new(assignee),
        freed_skills: skills.iter().copied().collect(),
        freed_at: Utc::now(),
    }
}

const WINDOW: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Coalescing contract
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn burst_settles_into_exactly_one_pass_with_skill_union() {
    let trigger = Arc::new(RecordingTrigger::default());
    let debouncer = Debouncer::spawn("test", WINDOW, trigger.clone());
    let start = Instant::now();

    // Three events within 200ms of each other.
    debouncer.send(capacity("amal", &["skill-arabic"])).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    debouncer.send(capacity("nadia", &["skill-legal"])).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    debouncer
        .send(capacity("omar", &["skill-legal", "skill-writing"]))
        .unwrap();

    // Settle.
    tokio::time::sleep(WINDOW + Duration::from_millis(50)).await;

    let passes = trigger.passes.lock().unwrap();
    assert_eq!(passes.len(), 1, "one downstream invocation per burst");

    let (fired_at, freed) = &passes[0];
    let expected: SkillSet = ["skill-arabic", "skill-legal", "skill-writing"]
        .into_iter()
        .collect();
    assert_eq!(*freed, expected);

    // Elapsed covers at least the window measured from the last event.
    assert!(*fired_at - start >= WINDOW + Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn window_resets_on_every_new_event() {
    let trigger = Arc::new(RecordingTrigger::default());
    let debouncer = Debouncer::spawn("test", WINDOW, trigger.clone());

    debouncer.send(capacity("amal", &["s"])).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(trigger.count(), 0);

    // New event 100ms before the window would have fired: it resets.
    debouncer.send(capacity("nadia", &["s"])).unwrap();
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(trigger.count(), 0, "window restarted by the second event");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(trigger.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn quiet_scope_fires_once_per_separate_burst() {
    let trigger = Arc::new(RecordingTrigger::default());
    let debouncer = Debouncer::spawn("test", WINDOW, trigger.clone());

    debouncer.send(capacity("amal", &["s"])).unwrap();
    tokio::time::sleep(WINDOW + Duration::from_millis(50)).await;
    assert_eq!(trigger.count(), 1);

    debouncer.send(capacity("amal", &["s"])).unwrap();
    tokio::time::sleep(WINDOW + Duration::from_millis(50)).await;
    assert_eq!(trigger.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_the_pending_burst() {
    let trigger = Arc::new(RecordingTrigger::default());
    let debouncer = Debouncer::spawn("test", WINDOW, trigger.clone());

    debouncer.send(capacity("amal", &["skill-arabic"])).unwrap();
    debouncer.send(capacity("nadia", &["skill-legal"])).unwrap();

    // No settle wait: closing the scope must not drop the events.
    debouncer.shutdown().await;

    let passes = trigger.passes.lock().unwrap();
    assert_eq!(passes.len(), 1);
    let expected: SkillSet = ["skill-arabic", "skill-legal"].into_iter().collect();
    assert_eq!(passes[0].1, expected);
}

// ---------------------------------------------------------------------------
// Scope independence through the engine
// ---------------------------------------------------------------------------

struct NoopCollaborator;

impl WorkItemService for NoopCollaborator {
    fn record_assignment(&self, _result: &AssignmentResult) -> anyhow::Result<()> {
        Ok(())
    }
}

impl Notifier for NoopCollaborator {
    fn assignment_made(&self, _result: &AssignmentResult) -> anyhow::Result<()> {
        Ok(())
    }

    fn entry_escalated(&self, _entry: &QueueEntry) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn scopes_debounce_independently_and_both_fire() {
    let collaborator = Arc::new(NoopCollaborator);
    let engine = Engine::with_scope_fn(
        QueueStore::in_memory().unwrap(),
        collaborator.clone(),
        collaborator,
        EngineConfig {
            debounce_window: WINDOW,
            ..EngineConfig::default()
        },
        // Scope by assignee: events for different staff coalesce apart.
        |event| event.assignee_id.to_string(),
    );

    let arabic = engine
        .enqueue(NewQueueEntry::new("T-1", "ticket").skill("skill-arabic"))
        .unwrap();
    let legal = engine
        .enqueue(NewQueueEntry::new("T-2", "ticket").skill("skill-legal"))
        .unwrap();

    engine
        .on_capacity_freed(capacity("amal", &["skill-arabic"]))
        .unwrap();
    engine
        .on_capacity_freed(capacity("nadia", &["skill-legal"]))
        .unwrap();

    tokio::time::sleep(WINDOW + Duration::from_millis(50)).await;

    assert_eq!(
        engine.get(arabic.entry().id).unwrap().status,
        Status::Assigned
    );
    assert_eq!(
        engine.get(legal.entry().id).unwrap().status,
        Status::Assigned
    );
    engine.shutdown().await;
}
