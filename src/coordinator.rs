//! Assignment attempt coordination: the claim / finalize / abort protocol
//! and the in-process slot ledger it arbitrates against.
//!
//! A claim reserves a queue entry for a capacity slot conditioned on both
//! being free. Two passes contending for the same slot or entry have
//! exactly one winner; the loser gets `Conflict` and moves on without
//! blocking. Across any set of passes, each entry is assigned to at most
//! one slot and each slot is granted to at most one entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, warn};

use crate::engine::{Notifier, WorkItemService};
use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::model::*;
use crate::store::{self, SharedStore};

// ---------------------------------------------------------------------------
// Slot Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    /// Reserved by an in-flight claim; either finalized (removed from the
    /// ledger) or released back to Free.
    Provisional,
}

#[derive(Debug)]
struct LedgerSlot {
    skills: SkillSet,
    state: SlotState,
}

/// Availability table for capacity slots, fed by capacity events and
/// drained by finalized assignments. The lock is held per operation only.
#[derive(Default)]
pub struct SlotLedger {
    inner: Mutex<HashMap<SlotId, LedgerSlot>>,
}

impl SlotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a slot available with the given skills. Called on capacity
    /// events; a repeat event for a known slot folds in its skills and
    /// leaves any in-flight claim untouched.
    pub fn release(&self, slot: Slot) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.get_mut(&slot.id) {
            Some(existing) => existing.skills.extend(&slot.skills),
            None => {
                inner.insert(
                    slot.id,
                    LedgerSlot {
                        skills: slot.skills,
                        state: SlotState::Free,
                    },
                );
            }
        }
    }

    /// Snapshot of free slots whose skills intersect the filter
    /// (all free slots when the filter is empty).
    pub fn free_slots(&self, filter: &SkillSet) -> Vec<Slot> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .iter()
            .filter(|(_, s)| s.state == SlotState::Free)
            .filter(|(_, s)| filter.is_empty() || s.skills.intersects(filter))
            .map(|(id, s)| Slot {
                id: id.clone(),
                skills: s.skills.clone(),
            })
            .collect()
    }

    /// Reserve a free slot. False when the slot is unknown, already
    /// reserved, or already handed out — the caller advances.
    pub fn try_claim(&self, id: &SlotId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.get_mut(id) {
            Some(slot) if slot.state == SlotState::Free => {
                slot.state = SlotState::Provisional;
                true
            }
            _ => false,
        }
    }

    /// Permanently occupy a provisionally held slot (leaves the ledger).
    pub fn occupy(&self, id: &SlotId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.remove(id);
    }

    /// Return a provisionally held slot to availability.
    pub fn release_claim(&self, id: &SlotId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = inner.get_mut(id) {
            slot.state = SlotState::Free;
        }
    }

    pub fn free_count(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .values()
            .filter(|s| s.state == SlotState::Free)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Attempt Coordinator
// ---------------------------------------------------------------------------

/// Outcome of one claim attempt on one (entry, slot) pair.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// Finalized; the result is persisted and the slot is occupied.
    Assigned(AssignmentResult),
    /// Lost an optimistic race (entry or slot taken). Not an error; the
    /// pass continues with its next candidate.
    Conflict,
    /// Claimed but finalize failed; the entry went back to pending with
    /// `attempts + 1` (or escalated at the ceiling) and the slot is free
    /// again.
    Aborted { escalated: bool },
}

pub struct AttemptCoordinator {
    store: SharedStore,
    ledger: Arc<SlotLedger>,
    work_items: Arc<dyn WorkItemService>,
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
}

impl AttemptCoordinator {
    pub fn new(
        store: SharedStore,
        ledger: Arc<SlotLedger>,
        work_items: Arc<dyn WorkItemService>,
        notifier: Arc<dyn Notifier>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            ledger,
            work_items,
            notifier,
            max_attempts,
        }
    }

    /// Run the full claim → finalize (→ abort) protocol for one pair.
    pub fn attempt(&self, entry: &QueueEntry, slot: &Slot) -> Result<AttemptOutcome> {
        if !self.claim(entry, slot)? {
            return Ok(AttemptOutcome::Conflict);
        }

        match self.finalize(entry, slot) {
            Ok(result) => Ok(AttemptOutcome::Assigned(result)),
            Err(reason) => self.abort(entry, slot, &reason.to_string()),
        }
    }

    /// Atomically reserve the entry and the slot, conditioned on both
    /// being free. False on either precondition failing; nothing is left
    /// half-reserved.
    fn claim(&self, entry: &QueueEntry, slot: &Slot) -> Result<bool> {
        if !self.ledger.try_claim(&slot.id) {
            debug!(slot = %slot.id, "slot already taken, skipping");
            return Ok(false);
        }

        let claimed = store::lock(&self.store)?.transition(
            entry.id,
            Status::Pending,
            Status::Claimed,
        );
        match claimed {
            Ok(()) => {
                store::lock(&self.store)?.record_event(EventKind::EntryClaimed {
                    id: entry.id,
                    slot: slot.id.clone(),
                })?;
                Ok(true)
            }
            Err(Error::Conflict { actual, .. }) => {
                debug!(id = %entry.id, %actual, "entry claim lost the race");
                self.ledger.release_claim(&slot.id);
                Ok(false)
            }
            Err(e) => {
                self.ledger.release_claim(&slot.id);
                Err(e)
            }
        }
    }

    /// Create the assignment record downstream, then commit the entry to
    /// `assigned` and occupy the slot. Any failure (downstream error, or
    /// the entry cancelled mid-flight) propagates so the caller aborts.
    fn finalize(&self, entry: &QueueEntry, slot: &Slot) -> Result<AssignmentResult> {
        let result = AssignmentResult {
            queue_entry_id: entry.id,
            assignee_id: slot.id.clone(),
            assigned_at: Utc::now(),
        };

        // Downstream record creation comes first: its failure must leave
        // the entry revertable (still claimed, not yet assigned).
        self.work_items.record_assignment(&result)?;

        // Commit point. A cancel that landed while we were claimed makes
        // this conditional update fail.
        store::lock(&self.store)?.transition(entry.id, Status::Claimed, Status::Assigned)?;

        {
            let mut store = store::lock(&self.store)?;
            store.record_assignment(&result)?;
            store.record_event(EventKind::EntryAssigned {
                id: entry.id,
                slot: slot.id.clone(),
            })?;
        }
        self.ledger.occupy(&slot.id);

        if let Err(e) = self.notifier.assignment_made(&result) {
            warn!(id = %entry.id, "assignment notification failed: {e}");
        }

        Ok(result)
    }

    /// Roll back a claim: release the slot, revert the entry to pending
    /// with `attempts + 1`, and escalate once attempts are exhausted. An
    /// entry that reached `cancelled` mid-flight stays cancelled.
    fn abort(&self, entry: &QueueEntry, slot: &Slot, reason: &str) -> Result<AttemptOutcome> {
        self.ledger.release_claim(&slot.id);

        let attempts = match store::lock(&self.store)?.fail_attempt(entry.id) {
            Ok(attempts) => attempts,
            Err(Error::Conflict { actual, .. }) => {
                // Withdrawn mid-flight, or the stale-claim sweeper got
                // here first. Either way the entry is no longer ours.
                debug!(id = %entry.id, %actual, "claim already released elsewhere");
                return Ok(AttemptOutcome::Aborted { escalated: false });
            }
            Err(e) => return Err(e),
        };

        warn!(id = %entry.id, slot = %slot.id, attempts, "assignment attempt aborted: {reason}");
        store::lock(&self.store)?.record_event(EventKind::ClaimReleased {
            id: entry.id,
            slot: slot.id.clone(),
            reason: reason.to_string(),
            attempts,
        })?;

        if attempts >= self.max_attempts {
            let escalated = self.try_escalate(entry.id, attempts)?;
            return Ok(AttemptOutcome::Aborted { escalated });
        }

        Ok(AttemptOutcome::Aborted { escalated: false })
    }

    /// Escalate an exhausted entry. The entry is back in `pending` at
    /// this point, so a concurrent pass may claim it (or a cancel may
    /// land) before our conditional update runs; losing that race
    /// returns false and the next failed attempt re-tries escalation.
    fn try_escalate(&self, id: EntryId, attempts: u32) -> Result<bool> {
        {
            let mut store = store::lock(&self.store)?;
            match store.escalate(id) {
                Ok(()) => {}
                Err(Error::Conflict { actual, .. }) => {
                    debug!(%id, %actual, "escalation lost the race, deferring");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
            store.record_event(EventKind::EntryEscalated { id, attempts })?;
        }

        let entry = store::lock(&self.store)?.get(id)?;
        warn!(id = %entry.id, key = %entry.key, attempts, "entry escalated to manual handling");
        if let Err(e) = self.notifier.entry_escalated(&entry) {
            warn!(id = %entry.id, "escalation notification failed: {e}");
        }
        Ok(true)
    }
}
