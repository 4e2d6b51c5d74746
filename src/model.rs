//! Core data model.
//!
//! A queue entry is a work item waiting for assignment. It has identity
//! (work item key), required skills, priority, an enqueue timestamp, and
//! lifecycle status. Capacity events describe skills newly usable on a
//! staff slot.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Assignment priority. The level set is closed: four levels, totally
/// ordered `urgent > high > normal > low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Numeric rank used for ordered storage scans: urgent(4) .. low(1).
    pub fn rank(self) -> i32 {
        match self {
            Priority::Urgent => 4,
            Priority::High => 3,
            Priority::Normal => 2,
            Priority::Low => 1,
        }
    }

    pub fn from_rank(rank: i32) -> Result<Self> {
        match rank {
            4 => Ok(Priority::Urgent),
            3 => Ok(Priority::High),
            2 => Ok(Priority::Normal),
            1 => Ok(Priority::Low),
            other => Err(Error::Other(format!("unknown priority rank: {other}"))),
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(Error::InvalidEntry(format!("unknown priority: {other}"))),
        }
    }

    pub const ALL: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Skill Set
// ---------------------------------------------------------------------------

/// A set of skill identifiers with defined equality, intersection, and
/// union. Matching is "any-of": an entry is eligible for freed capacity
/// if it requires at least one of the freed skills.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillSet(BTreeSet<String>);

impl SkillSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, skill: impl Into<String>) {
        self.0.insert(skill.into());
    }

    pub fn contains(&self, skill: &str) -> bool {
        self.0.contains(skill)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the two sets share at least one skill.
    pub fn intersects(&self, other: &SkillSet) -> bool {
        // Iterate the smaller set.
        let (small, large) = if self.0.len() <= other.0.len() {
            (&self.0, &other.0)
        } else {
            (&other.0, &self.0)
        };
        small.iter().any(|s| large.contains(s))
    }

    /// Fold `other` into this set.
    pub fn extend(&mut self, other: &SkillSet) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for SkillSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for SkillSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(","))
    }
}

// ---------------------------------------------------------------------------
// Queue Entry
// ---------------------------------------------------------------------------

/// Newtype for queue entry IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Composite natural key for a work item. At most one non-terminal entry
/// exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItemKey {
    /// Identifier of the work item in the owning system.
    pub work_item_id: String,
    /// Kind of work item (e.g., "ticket", "task", "dossier-item").
    pub work_item_type: String,
}

impl WorkItemKey {
    pub fn new(work_item_id: impl Into<String>, work_item_type: impl Into<String>) -> Self {
        Self {
            work_item_id: work_item_id.into(),
            work_item_type: work_item_type.into(),
        }
    }
}

impl std::fmt::Display for WorkItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.work_item_type, self.work_item_id)
    }
}

/// A work item waiting for assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique identifier.
    pub id: EntryId,

    /// Natural key of the originating work item.
    pub key: WorkItemKey,

    /// Skills an assignee must offer (at least one) to take this entry.
    /// Never empty; validated at enqueue.
    pub required_skills: SkillSet,

    pub priority: Priority,

    /// Current lifecycle status.
    pub status: Status,

    /// Number of failed assignment attempts so far.
    pub attempts: u32,

    /// Enqueue timestamp. Immutable; drives FIFO order within a priority.
    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Set while the entry is claimed by an in-flight matching attempt.
    /// Claims older than the stale bound are reverted to pending.
    pub claimed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Waiting for capacity.
    Pending,
    /// Reserved by an in-flight matching attempt.
    Claimed,
    /// Assignment finalized. Terminal.
    Assigned,
    /// Retries exhausted, handed to manual handling. Terminal.
    Escalated,
    /// Originating work item withdrawn. Terminal.
    Cancelled,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, Claimed)
                | (Claimed, Assigned)
                | (Claimed, Pending)    // claim/finalize failure, attempts++
                | (Pending, Escalated)  // attempts exhausted
                | (Pending, Cancelled)
                | (Claimed, Cancelled) // withdrawn mid-flight
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Assigned | Status::Escalated | Status::Cancelled)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Claimed => "claimed",
            Status::Assigned => "assigned",
            Status::Escalated => "escalated",
            Status::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

/// Newtype for capacity slot identifiers (one slot per assignee).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub String);

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A normalized signal that a slot now has additional usable skills.
///
/// `freed_skills` is always the complete set of skills newly usable on the
/// slot; downstream components never re-derive it from raw change records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityEvent {
    pub assignee_id: SlotId,
    pub freed_skills: SkillSet,
    pub freed_at: DateTime<Utc>,
}

/// A capacity slot as tracked by the in-process ledger.
#[derive(Debug, Clone)]
pub struct Slot {
    pub id: SlotId,
    pub skills: SkillSet,
}

// ---------------------------------------------------------------------------
// Assignment Result
// ---------------------------------------------------------------------------

/// Produced exactly once per successful claim; immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub queue_entry_id: EntryId,
    pub assignee_id: SlotId,
    pub assigned_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for enqueue requests. Validated before anything touches the store.
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub(crate) key: WorkItemKey,
    pub(crate) required_skills: SkillSet,
    pub(crate) priority: Priority,
}

impl NewQueueEntry {
    pub fn new(work_item_id: impl Into<String>, work_item_type: impl Into<String>) -> Self {
        Self {
            key: WorkItemKey::new(work_item_id, work_item_type),
            required_skills: SkillSet::new(),
            priority: Priority::Normal,
        }
    }

    pub fn skill(mut self, skill: impl Into<String>) -> Self {
        self.required_skills.insert(skill);
        self
    }

    pub fn skills(mut self, skills: SkillSet) -> Self {
        self.required_skills = skills;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Reject malformed requests before they enter the store.
    pub fn validate(&self) -> Result<()> {
        if self.key.work_item_id.trim().is_empty() {
            return Err(Error::InvalidEntry("work_item_id is empty".into()));
        }
        if self.key.work_item_type.trim().is_empty() {
            return Err(Error::InvalidEntry("work_item_type is empty".into()));
        }
        if self.required_skills.is_empty() {
            return Err(Error::InvalidEntry(format!(
                "entry {} has an empty required skill set",
                self.key
            )));
        }
        Ok(())
    }
}
