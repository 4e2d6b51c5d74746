//! Structured events recorded by the engine on every state transition.
//!
//! The event stream is the audit feed behind operational dashboards and
//! the notification surface. Events are append-only with a monotonic
//! sequence number so consumers can detect gaps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EntryId, Priority, SlotId, WorkItemKey};

/// A structured event recorded by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence number.
    pub seq: u64,
    /// When this event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    EntryEnqueued {
        id: EntryId,
        key: WorkItemKey,
        priority: Priority,
    },
    EntryClaimed {
        id: EntryId,
        slot: SlotId,
    },
    EntryAssigned {
        id: EntryId,
        slot: SlotId,
    },
    /// A claim was rolled back: the entry returned to pending with an
    /// incremented attempt count, the slot returned to availability.
    ClaimReleased {
        id: EntryId,
        slot: SlotId,
        reason: String,
        attempts: u32,
    },
    EntryEscalated {
        id: EntryId,
        attempts: u32,
    },
    EntryCancelled {
        id: EntryId,
        key: WorkItemKey,
    },
    /// A claim left behind by a crashed pass was reverted to pending.
    StaleClaimRecovered {
        id: EntryId,
    },
    /// Decode fallback for event kinds this build doesn't know.
    Unknown {
        raw: String,
    },
}
