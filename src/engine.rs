//! Core engine. The public API for the assignment queue.
//!
//! The engine owns the store, the slot ledger, and the per-scope
//! debouncers. All state transitions go through here; external
//! collaborators plug in behind the `WorkItemService`, `Notifier`, and
//! (via the detector) `AssigneeDirectory` traits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::coordinator::{AttemptCoordinator, AttemptOutcome, SlotLedger};
use crate::debounce::{Debouncer, PassTrigger};
use crate::detector::CapacitySink;
use crate::error::Result;
use crate::event::Event;
use crate::matcher;
use crate::model::*;
use crate::store::{self, DepthBucket, EnqueueResult, QueueStore, SharedStore};

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// Downstream owner of work items. Creating the actual assignment record
/// lives there; its failures drive the retry/escalation path.
pub trait WorkItemService: Send + Sync {
    fn record_assignment(&self, result: &AssignmentResult) -> anyhow::Result<()>;
}

/// Recipient of assignment-made and escalation signals. Content and
/// formatting are its problem; failures here are logged, never fatal.
pub trait Notifier: Send + Sync {
    fn assignment_made(&self, result: &AssignmentResult) -> anyhow::Result<()>;
    fn entry_escalated(&self, entry: &QueueEntry) -> anyhow::Result<()>;
}

/// Maps a capacity event to its coalescing scope (e.g. a skill family).
/// Events in different scopes debounce and fire independently.
pub type ScopeFn = dyn Fn(&CapacityEvent) -> String + Send + Sync;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Counters for one matching pass, for logs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassOutcome {
    /// Eligible candidates considered.
    pub eligible: usize,
    /// Entries finalized to `assigned`.
    pub assigned: usize,
    /// Claim attempts lost to a concurrent pass.
    pub conflicts: usize,
    /// Claims rolled back (finalize failure or cancellation).
    pub aborted: usize,
}

/// The assignment queue engine. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    store: SharedStore,
    ledger: Arc<SlotLedger>,
    coordinator: AttemptCoordinator,
    config: EngineConfig,
    scope_of: Box<ScopeFn>,
    debouncers: Mutex<HashMap<String, Debouncer>>,
    shutdown: Notify,
}

impl Engine {
    /// Create an engine with a single global coalescing scope.
    pub fn new(
        store: QueueStore,
        work_items: Arc<dyn WorkItemService>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self::with_scope_fn(store, work_items, notifier, config, |_| "global".to_string())
    }

    /// Create an engine with an explicit scope mapping for capacity
    /// events, so unrelated skill families can debounce and run passes
    /// concurrently.
    ///
    /// Scopes should be few and long-lived (a skill family, a team):
    /// each distinct scope keeps one coalescing task alive until
    /// [`shutdown`](Self::shutdown). A high-cardinality mapping, one
    /// scope per assignee say, accumulates an idle task per scope for
    /// the life of the engine.
    pub fn with_scope_fn(
        store: QueueStore,
        work_items: Arc<dyn WorkItemService>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
        scope_of: impl Fn(&CapacityEvent) -> String + Send + Sync + 'static,
    ) -> Self {
        let store = store::shared(store);
        let ledger = Arc::new(SlotLedger::new());
        let coordinator = AttemptCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            work_items,
            notifier,
            config.max_attempts,
        );

        Self {
            inner: Arc::new(Inner {
                store,
                ledger,
                coordinator,
                config,
                scope_of: Box::new(scope_of),
                debouncers: Mutex::new(HashMap::new()),
                shutdown: Notify::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Exposed surface
    // -----------------------------------------------------------------------

    /// Enqueue a work item for assignment. Idempotent per work item key.
    pub fn enqueue(&self, new: NewQueueEntry) -> Result<EnqueueResult> {
        let result = store::lock(&self.inner.store)?.enqueue(&new)?;
        match &result {
            EnqueueResult::Created(entry) => {
                info!(id = %entry.id, key = %entry.key, priority = %entry.priority, "entry enqueued");
            }
            EnqueueResult::Existing(entry) => {
                info!(id = %entry.id, key = %entry.key, "enqueue deduplicated onto existing entry");
            }
        }
        Ok(result)
    }

    /// Cancel the active entry for a withdrawn work item, if any. An
    /// entry claimed by an in-flight attempt aborts that attempt.
    pub fn cancel(&self, key: &WorkItemKey) -> Result<Option<QueueEntry>> {
        let cancelled = store::lock(&self.inner.store)?.cancel(key)?;
        if let Some(entry) = &cancelled {
            info!(id = %entry.id, key = %entry.key, "entry cancelled");
        }
        Ok(cancelled)
    }

    /// Ingestion hook for normalized capacity events. Releases the slot
    /// into the ledger immediately, then routes the event to its scope's
    /// debouncer. Must run inside a tokio runtime.
    pub fn on_capacity_freed(&self, event: CapacityEvent) -> Result<()> {
        self.inner.ledger.release(Slot {
            id: event.assignee_id.clone(),
            skills: event.freed_skills.clone(),
        });

        let scope = (self.inner.scope_of)(&event);
        let mut debouncers = self
            .inner
            .debouncers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let debouncer = debouncers.entry(scope.clone()).or_insert_with(|| {
            Debouncer::spawn(
                scope,
                self.inner.config.debounce_window,
                Arc::new(self.clone()),
            )
        });
        debouncer.send(event)
    }

    /// Get a queue entry by ID.
    pub fn get(&self, id: EntryId) -> Result<QueueEntry> {
        store::lock(&self.inner.store)?.get(id)
    }

    /// Pending entries in matching order (priority, then FIFO).
    pub fn pending(&self) -> Result<Vec<QueueEntry>> {
        let working = store::lock(&self.inner.store)?.candidates(None)?;
        Ok(matcher::sort_queue_entries(&working))
    }

    /// Pending depth per `(priority, skill)` bucket, for dashboards.
    pub fn queue_depths(&self) -> Result<Vec<DepthBucket>> {
        store::lock(&self.inner.store)?.depth_by_bucket()
    }

    /// The assignment result for an entry, once finalized.
    pub fn assignment(&self, id: EntryId) -> Result<Option<AssignmentResult>> {
        store::lock(&self.inner.store)?.get_assignment(id)
    }

    /// Audit stream read: events after a sequence number.
    pub fn events_since(&self, seq: u64) -> Result<Vec<Event>> {
        store::lock(&self.inner.store)?.events_since(seq)
    }

    /// Free slots currently known to the ledger.
    pub fn free_slot_count(&self) -> usize {
        self.inner.ledger.free_count()
    }

    // -----------------------------------------------------------------------
    // Matching pass
    // -----------------------------------------------------------------------

    /// One matching pass over freed capacity: fetch the pending working
    /// set, filter by the freed skills (empty set = generic rescan), sort
    /// priority-then-FIFO, then walk once, claiming one candidate per
    /// compatible free slot. Claim losers are skipped, aborted claims
    /// free their slot for the next candidate.
    pub fn process_pass(&self, freed: &SkillSet) -> Result<PassOutcome> {
        let working = store::lock(&self.inner.store)?.candidates(Some(freed))?;
        let eligible = matcher::filter_by_skills(working, freed);
        let sorted = matcher::sort_queue_entries(&eligible);

        let mut free = self.inner.ledger.free_slots(freed);
        let mut outcome = PassOutcome {
            eligible: sorted.len(),
            ..PassOutcome::default()
        };

        for entry in &sorted {
            if free.is_empty() {
                break;
            }
            let Some(pos) = free
                .iter()
                .position(|slot| slot.skills.intersects(&entry.required_skills))
            else {
                continue;
            };
            let slot = free[pos].clone();

            match self.inner.coordinator.attempt(entry, &slot)? {
                AttemptOutcome::Assigned(_) => {
                    free.remove(pos);
                    outcome.assigned += 1;
                }
                AttemptOutcome::Conflict => {
                    outcome.conflicts += 1;
                }
                AttemptOutcome::Aborted { .. } => {
                    outcome.aborted += 1;
                }
            }
        }

        info!(
            eligible = outcome.eligible,
            assigned = outcome.assigned,
            conflicts = outcome.conflicts,
            aborted = outcome.aborted,
            skills = %freed,
            "matching pass finished"
        );
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Stale claim recovery
    // -----------------------------------------------------------------------

    /// Revert claims older than the configured timeout to pending.
    /// Internal self-healing; logged, never surfaced as an error.
    pub fn recover_stale_claims(&self) -> Result<Vec<EntryId>> {
        let recovered = store::lock(&self.inner.store)?
            .release_stale_claims(self.inner.config.stale_claim_timeout)?;
        if !recovered.is_empty() {
            warn!(count = recovered.len(), "recovered stale claims");
        }
        Ok(recovered)
    }

    /// Background sweeper for stale claims. Runs until `shutdown`.
    pub fn spawn_stale_sweeper(&self) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = engine.inner.shutdown.notified() => {
                        info!("stale claim sweeper shutting down");
                        return;
                    }
                    _ = tokio::time::sleep(engine.inner.config.sweep_interval) => {
                        if let Err(e) = engine.recover_stale_claims() {
                            error!("stale claim sweep failed: {e}");
                        }
                    }
                }
            }
        })
    }

    /// Stop background tasks and flush pending debounce bursts.
    pub async fn shutdown(&self) {
        self.inner.shutdown.notify_waiters();
        let debouncers: Vec<Debouncer> = {
            let mut map = self
                .inner
                .debouncers
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            map.drain().map(|(_, d)| d).collect()
        };
        for debouncer in debouncers {
            debouncer.shutdown().await;
        }
    }
}

impl CapacitySink for Engine {
    fn capacity_freed(&self, event: CapacityEvent) -> Result<()> {
        self.on_capacity_freed(event)
    }
}

impl PassTrigger for Engine {
    fn run_pass(&self, freed: SkillSet) {
        if let Err(e) = self.process_pass(&freed) {
            error!(skills = %freed, "matching pass failed: {e}");
        }
    }
}
