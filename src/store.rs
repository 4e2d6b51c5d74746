//! SQLite queue store.
//!
//! Single source of truth for queue entries, assignment results, and the
//! event stream. WAL mode for concurrent read access. Status changes use
//! conditional updates (optimistic concurrency): a write that finds the
//! row in an unexpected status changes nothing and reports `Conflict`.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::event::{Event, EventKind};
use crate::model::*;

/// Store backend. Owns the SQLite connection.
pub struct QueueStore {
    conn: Connection,
}

/// What happened when an entry was enqueued.
#[derive(Debug)]
pub enum EnqueueResult {
    /// New entry created in `pending`.
    Created(QueueEntry),
    /// A non-terminal entry already exists for the work item key;
    /// returned unchanged (idempotent enqueue).
    Existing(QueueEntry),
}

impl EnqueueResult {
    pub fn entry(&self) -> &QueueEntry {
        match self {
            EnqueueResult::Created(e) | EnqueueResult::Existing(e) => e,
        }
    }
}

/// Pending depth for one `(priority, skill)` bucket. Read-only surface
/// consumed by operational dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct DepthBucket {
    pub priority: Priority,
    pub skill: String,
    pub depth: u64,
}

/// Handle for performing store operations within a transaction.
///
/// Methods delegate to the same SQL logic as `QueueStore`, but execute
/// against the transaction's connection, so either all operations commit
/// together or none do.
pub(crate) struct TxContext<'a> {
    tx: &'a Connection,
}

impl TxContext<'_> {
    pub fn insert_entry(&self, entry: &QueueEntry) -> Result<()> {
        insert_entry_on(self.tx, entry)
    }

    pub fn find_active(&self, key: &WorkItemKey) -> Result<Option<QueueEntry>> {
        find_active_on(self.tx, key)
    }

    pub fn record_event(&mut self, kind: EventKind) -> Result<Event> {
        record_event_on(self.tx, kind)
    }
}

impl QueueStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&mut self) -> Result<()> {
        // WAL mode for concurrent readers
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS queue_entries (
                id              TEXT PRIMARY KEY,
                work_item_id    TEXT NOT NULL,
                work_item_type  TEXT NOT NULL,
                required_skills TEXT NOT NULL,
                priority        INTEGER NOT NULL,
                status          TEXT NOT NULL DEFAULT 'pending',
                attempts        INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                claimed_at      TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_active_key
                ON queue_entries(work_item_id, work_item_type)
                WHERE status IN ('pending', 'claimed');
            CREATE INDEX IF NOT EXISTS idx_scan
                ON queue_entries(status, priority DESC, created_at ASC);

            CREATE TABLE IF NOT EXISTS assignments (
                queue_entry_id  TEXT PRIMARY KEY REFERENCES queue_entries(id),
                assignee_id     TEXT NOT NULL,
                assigned_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT NOT NULL,
                kind        TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Execute a closure within a SQLite transaction.
    ///
    /// The transaction commits if the closure returns Ok, rolls back on Err.
    pub(crate) fn with_transaction<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TxContext) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let mut ctx = TxContext { tx: &tx };
        let result = f(&mut ctx)?;
        tx.commit()?;
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Enqueue / lookup
    // -----------------------------------------------------------------------

    /// Enqueue a work item for assignment. Idempotent: if a non-terminal
    /// entry already exists for the same work item key, it is returned
    /// unchanged and nothing is written.
    ///
    /// The lookup-or-insert runs within a single transaction, and the
    /// partial unique index on the active key backs it up under
    /// concurrent enqueues of the same work item.
    pub fn enqueue(&mut self, new: &NewQueueEntry) -> Result<EnqueueResult> {
        new.validate()?;

        let now = Utc::now();
        let entry = QueueEntry {
            id: EntryId::new(),
            key: new.key.clone(),
            required_skills: new.required_skills.clone(),
            priority: new.priority,
            status: Status::Pending,
            attempts: 0,
            created_at: now,
            updated_at: now,
            claimed_at: None,
        };

        self.with_transaction(|ctx| {
            if let Some(existing) = ctx.find_active(&entry.key)? {
                return Ok(EnqueueResult::Existing(existing));
            }

            ctx.insert_entry(&entry)?;
            ctx.record_event(EventKind::EntryEnqueued {
                id: entry.id,
                key: entry.key.clone(),
                priority: entry.priority,
            })?;

            Ok(EnqueueResult::Created(entry))
        })
    }

    /// Get a queue entry by ID.
    pub fn get(&self, id: EntryId) -> Result<QueueEntry> {
        get_entry_on(&self.conn, id)
    }

    /// Find the non-terminal entry for a work item key, if any.
    pub fn find_active(&self, key: &WorkItemKey) -> Result<Option<QueueEntry>> {
        find_active_on(&self.conn, key)
    }

    /// All `pending` entries, optionally restricted to those whose
    /// required skills intersect the filter set. Unordered working set;
    /// ordering belongs to the matcher.
    pub fn candidates(&self, filter: Option<&SkillSet>) -> Result<Vec<QueueEntry>> {
        match filter {
            Some(skills) if !skills.is_empty() => {
                let placeholders = vec!["?"; skills.len()].join(", ");
                let sql = format!(
                    "SELECT * FROM queue_entries
                     WHERE status = 'pending'
                     AND EXISTS (
                         SELECT 1 FROM json_each(required_skills)
                         WHERE json_each.value IN ({placeholders})
                     )"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(skills.iter()), |row| {
                        Ok(row_to_entry(row))
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                collect_entries(rows)
            }
            _ => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT * FROM queue_entries WHERE status = 'pending'")?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_entry(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                collect_entries(rows)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------------

    /// Conditional status update: succeeds only if the entry is currently
    /// in `from`. A lost race yields `Conflict` with the actual status.
    pub fn transition(&mut self, id: EntryId, from: Status, to: Status) -> Result<()> {
        transition_on(&self.conn, id, from, to)
    }

    /// Revert a failed claim: claimed -> pending with `attempts += 1`.
    /// Returns the new attempt count.
    pub fn fail_attempt(&mut self, id: EntryId) -> Result<u32> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE queue_entries
             SET status = 'pending', attempts = attempts + 1,
                 claimed_at = NULL, updated_at = ?1
             WHERE id = ?2 AND status = 'claimed'",
            params![now, id.0.to_string()],
        )?;

        if changed == 0 {
            let actual = get_status_on(&self.conn, id)?;
            return Err(Error::Conflict {
                id: id.to_string(),
                expected: Status::Claimed,
                actual,
            });
        }

        let attempts: u32 = self.conn.query_row(
            "SELECT attempts FROM queue_entries WHERE id = ?1",
            params![id.0.to_string()],
            |row| row.get(0),
        )?;

        Ok(attempts)
    }

    /// Route an exhausted entry out of automatic matching.
    pub fn escalate(&mut self, id: EntryId) -> Result<()> {
        transition_on(&self.conn, id, Status::Pending, Status::Escalated)
    }

    /// Cancel any non-terminal entry for the work item key. Returns the
    /// cancelled entry, or None if no active entry exists.
    ///
    /// A `claimed` entry cancelled here makes the in-flight finalize's
    /// conditional update fail, which forces that attempt to abort and
    /// release its slot.
    pub fn cancel(&mut self, key: &WorkItemKey) -> Result<Option<QueueEntry>> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE queue_entries
             SET status = 'cancelled', claimed_at = NULL, updated_at = ?1
             WHERE work_item_id = ?2 AND work_item_type = ?3
             AND status IN ('pending', 'claimed')",
            params![now, key.work_item_id, key.work_item_type],
        )?;

        if changed == 0 {
            return Ok(None);
        }

        let entry = self
            .conn
            .query_row(
                "SELECT * FROM queue_entries
                 WHERE work_item_id = ?1 AND work_item_type = ?2
                 AND status = 'cancelled'
                 ORDER BY updated_at DESC LIMIT 1",
                params![key.work_item_id, key.work_item_type],
                |row| Ok(row_to_entry(row)),
            )?
            .map_err(|e| Error::Other(format!("failed to parse queue entry: {e}")))?;

        record_event_on(
            &self.conn,
            EventKind::EntryCancelled {
                id: entry.id,
                key: entry.key.clone(),
            },
        )?;

        Ok(Some(entry))
    }

    /// Self-healing for claims left behind by a crashed pass: any entry
    /// claimed longer ago than `older_than` reverts to pending. The
    /// attempt count is untouched (the pass never ran to a failure).
    /// Returns exactly the ids reverted; an entry that a concurrent
    /// finalize or cancel beat us to is not reported.
    pub fn release_stale_claims(&mut self, older_than: std::time::Duration) -> Result<Vec<EntryId>> {
        let bound = chrono::Duration::from_std(older_than)
            .map_err(|e| Error::Other(format!("stale claim bound out of range: {e}")))?;
        let cutoff = (Utc::now() - bound).to_rfc3339();

        let ids: Vec<EntryId> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM queue_entries
                 WHERE status = 'claimed' AND claimed_at < ?1",
            )?;
            let rows = stmt
                .query_map(params![cutoff], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|s| s.parse().map(EntryId))
                .collect::<std::result::Result<Vec<_>, uuid::Error>>()
                .map_err(|e| Error::Other(format!("bad entry id in store: {e}")))?
        };

        let mut recovered = Vec::new();
        for id in ids {
            // Conditional: a concurrent finalize or cancel wins over us.
            match transition_on(&self.conn, id, Status::Claimed, Status::Pending) {
                Ok(()) => {
                    record_event_on(&self.conn, EventKind::StaleClaimRecovered { id })?;
                    recovered.push(id);
                }
                Err(Error::Conflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(recovered)
    }

    // -----------------------------------------------------------------------
    // Assignments
    // -----------------------------------------------------------------------

    /// Persist an assignment result. Written exactly once per successful
    /// claim; the primary key on `queue_entry_id` enforces that.
    pub fn record_assignment(&mut self, result: &AssignmentResult) -> Result<()> {
        self.conn.execute(
            "INSERT INTO assignments (queue_entry_id, assignee_id, assigned_at)
             VALUES (?1, ?2, ?3)",
            params![
                result.queue_entry_id.0.to_string(),
                result.assignee_id.0,
                result.assigned_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up the assignment result for an entry, if finalized.
    pub fn get_assignment(&self, id: EntryId) -> Result<Option<AssignmentResult>> {
        self.conn
            .query_row(
                "SELECT queue_entry_id, assignee_id, assigned_at
                 FROM assignments WHERE queue_entry_id = ?1",
                params![id.0.to_string()],
                |row| {
                    let entry_str: String = row.get(0)?;
                    let assigned_str: String = row.get(2)?;
                    Ok((entry_str, row.get::<_, String>(1)?, assigned_str))
                },
            )
            .optional()?
            .map(|(entry_str, assignee, assigned_str)| {
                Ok(AssignmentResult {
                    queue_entry_id: EntryId(
                        entry_str
                            .parse()
                            .map_err(|e: uuid::Error| Error::Other(e.to_string()))?,
                    ),
                    assignee_id: SlotId(assignee),
                    assigned_at: parse_timestamp(&assigned_str)?,
                })
            })
            .transpose()
    }

    // -----------------------------------------------------------------------
    // Dashboard surface
    // -----------------------------------------------------------------------

    /// Pending queue depth per `(priority, skill)` bucket.
    pub fn depth_by_bucket(&self) -> Result<Vec<DepthBucket>> {
        let mut stmt = self.conn.prepare(
            "SELECT priority, json_each.value, COUNT(*)
             FROM queue_entries, json_each(required_skills)
             WHERE status = 'pending'
             GROUP BY priority, json_each.value
             ORDER BY priority DESC, json_each.value ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(rank, skill, depth)| {
                Ok(DepthBucket {
                    priority: Priority::from_rank(rank)?,
                    skill,
                    depth: depth as u64,
                })
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Record an event and return it with its sequence number.
    pub fn record_event(&mut self, kind: EventKind) -> Result<Event> {
        record_event_on(&self.conn, kind)
    }

    /// Get events since a sequence number.
    pub fn events_since(&self, since_seq: u64) -> Result<Vec<Event>> {
        let mut stmt = self
            .conn
            .prepare("SELECT seq, timestamp, kind FROM events WHERE seq > ?1 ORDER BY seq ASC")?;

        let events = stmt
            .query_map(params![since_seq as i64], |row| {
                let kind_str: String = row.get(2)?;
                Ok(Event {
                    seq: row.get::<_, i64>(0)? as u64,
                    timestamp: row
                        .get::<_, String>(1)?
                        .parse()
                        .unwrap_or_else(|_| Utc::now()),
                    kind: serde_json::from_str(&kind_str)
                        .unwrap_or(EventKind::Unknown { raw: kind_str }),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// The store as shared by concurrent processing passes. The mutex is held
/// per statement, never across a claim/finalize pair; per-entry conditional
/// updates carry the actual concurrency control.
pub type SharedStore = Arc<Mutex<QueueStore>>;

pub fn shared(store: QueueStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

pub(crate) fn lock(store: &SharedStore) -> Result<MutexGuard<'_, QueueStore>> {
    store
        .lock()
        .map_err(|_| Error::Other("queue store mutex poisoned".into()))
}

// ---------------------------------------------------------------------------
// Inner functions — accept &Connection so they work with both
// Connection (auto-commit) and Transaction (deref to Connection).
// ---------------------------------------------------------------------------

fn insert_entry_on(conn: &Connection, entry: &QueueEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO queue_entries (
            id, work_item_id, work_item_type, required_skills, priority,
            status, attempts, created_at, updated_at, claimed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.id.0.to_string(),
            entry.key.work_item_id,
            entry.key.work_item_type,
            serde_json::to_string(&entry.required_skills).unwrap_or_default(),
            entry.priority.rank(),
            entry.status.to_string(),
            entry.attempts,
            entry.created_at.to_rfc3339(),
            entry.updated_at.to_rfc3339(),
            entry.claimed_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn get_status_on(conn: &Connection, id: EntryId) -> Result<Status> {
    let status_str: String = conn
        .query_row(
            "SELECT status FROM queue_entries WHERE id = ?1",
            params![id.0.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(id.to_string()))?;

    parse_status(&status_str)
}

fn get_entry_on(conn: &Connection, id: EntryId) -> Result<QueueEntry> {
    conn.query_row(
        "SELECT * FROM queue_entries WHERE id = ?1",
        params![id.0.to_string()],
        |row| Ok(row_to_entry(row)),
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(id.to_string()))?
    .map_err(|e| Error::Other(format!("failed to parse queue entry: {e}")))
}

fn find_active_on(conn: &Connection, key: &WorkItemKey) -> Result<Option<QueueEntry>> {
    conn.query_row(
        "SELECT * FROM queue_entries
         WHERE work_item_id = ?1 AND work_item_type = ?2
         AND status IN ('pending', 'claimed')",
        params![key.work_item_id, key.work_item_type],
        |row| Ok(row_to_entry(row)),
    )
    .optional()?
    .map(|r| r.map_err(|e| Error::Other(format!("failed to parse queue entry: {e}"))))
    .transpose()
}

fn transition_on(conn: &Connection, id: EntryId, from: Status, to: Status) -> Result<()> {
    if !from.can_transition_to(to) {
        return Err(Error::InvalidTransition { from, to });
    }

    let now = Utc::now().to_rfc3339();
    // claimed_at is set while and only while the entry is claimed.
    let claimed_at = if to == Status::Claimed {
        Some(now.clone())
    } else {
        None
    };

    let changed = conn.execute(
        "UPDATE queue_entries SET status = ?1, updated_at = ?2, claimed_at = ?3
         WHERE id = ?4 AND status = ?5",
        params![
            to.to_string(),
            now,
            claimed_at,
            id.0.to_string(),
            from.to_string()
        ],
    )?;

    if changed == 0 {
        let actual = get_status_on(conn, id)?;
        return Err(Error::Conflict {
            id: id.to_string(),
            expected: from,
            actual,
        });
    }

    Ok(())
}

fn record_event_on(conn: &Connection, kind: EventKind) -> Result<Event> {
    let now = Utc::now();

    conn.execute(
        "INSERT INTO events (timestamp, kind) VALUES (?1, ?2)",
        params![
            now.to_rfc3339(),
            serde_json::to_string(&kind).unwrap_or_default(),
        ],
    )?;

    let seq = conn.last_insert_rowid();

    Ok(Event {
        seq: seq as u64,
        timestamp: now,
        kind,
    })
}

// ---------------------------------------------------------------------------
// Row parsing helpers
// ---------------------------------------------------------------------------

fn row_to_entry(row: &rusqlite::Row) -> std::result::Result<QueueEntry, String> {
    let id_str: String = row.get(0).map_err(|e| e.to_string())?;
    let skills_str: String = row.get(3).map_err(|e| e.to_string())?;
    let rank: i32 = row.get(4).map_err(|e| e.to_string())?;
    let status_str: String = row.get(5).map_err(|e| e.to_string())?;
    let created_str: String = row.get(7).map_err(|e| e.to_string())?;
    let updated_str: String = row.get(8).map_err(|e| e.to_string())?;
    let claimed_str: Option<String> = row.get(9).map_err(|e| e.to_string())?;

    Ok(QueueEntry {
        id: EntryId(id_str.parse().map_err(|e: uuid::Error| e.to_string())?),
        key: WorkItemKey {
            work_item_id: row.get(1).map_err(|e| e.to_string())?,
            work_item_type: row.get(2).map_err(|e| e.to_string())?,
        },
        required_skills: serde_json::from_str(&skills_str).map_err(|e| e.to_string())?,
        priority: Priority::from_rank(rank).map_err(|e| e.to_string())?,
        status: parse_status(&status_str).map_err(|e| e.to_string())?,
        attempts: row.get(6).map_err(|e| e.to_string())?,
        created_at: created_str
            .parse()
            .map_err(|_| "invalid created_at".to_string())?,
        updated_at: updated_str
            .parse()
            .map_err(|_| "invalid updated_at".to_string())?,
        claimed_at: claimed_str.and_then(|s| s.parse().ok()),
    })
}

fn collect_entries(
    rows: Vec<std::result::Result<QueueEntry, String>>,
) -> Result<Vec<QueueEntry>> {
    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(|e| Error::Other(format!("parse error: {e}")))?);
    }
    Ok(result)
}

fn parse_status(s: &str) -> Result<Status> {
    match s {
        "pending" => Ok(Status::Pending),
        "claimed" => Ok(Status::Claimed),
        "assigned" => Ok(Status::Assigned),
        "escalated" => Ok(Status::Escalated),
        "cancelled" => Ok(Status::Cancelled),
        _ => Err(Error::Other(format!("unknown status: {s}"))),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    s.parse()
        .map_err(|_| Error::Other(format!("invalid timestamp: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry(id: &str, skills: &[&str]) -> NewQueueEntry {
        NewQueueEntry::new(id, "ticket").skills(skills.iter().copied().collect())
    }

    #[test]
    fn malformed_event_json_returns_unknown_variant() {
        let store = QueueStore::in_memory().unwrap();

        store
            .conn
            .execute(
                "INSERT INTO events (timestamp, kind) VALUES (?1, ?2)",
                params![Utc::now().to_rfc3339(), "this is not valid json {{{"],
            )
            .unwrap();

        let events = store.events_since(0).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::Unknown { raw } => {
                assert_eq!(raw, "this is not valid json {{{");
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn conditional_transition_reports_actual_status() {
        let mut store = QueueStore::in_memory().unwrap();
        let entry = match store.enqueue(&new_entry("T-1", &["skill-legal"])).unwrap() {
            EnqueueResult::Created(e) => e,
            _ => panic!("expected Created"),
        };

        store
            .transition(entry.id, Status::Pending, Status::Claimed)
            .unwrap();

        // Second claim of the same entry loses the race.
        let err = store
            .transition(entry.id, Status::Pending, Status::Claimed)
            .unwrap_err();
        match err {
            Error::Conflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, Status::Pending);
                assert_eq!(actual, Status::Claimed);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn disallowed_transition_is_rejected_before_touching_the_row() {
        let mut store = QueueStore::in_memory().unwrap();
        let entry = match store.enqueue(&new_entry("T-2", &["skill-legal"])).unwrap() {
            EnqueueResult::Created(e) => e,
            _ => panic!("expected Created"),
        };

        let err = store
            .transition(entry.id, Status::Pending, Status::Assigned)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(store.get(entry.id).unwrap().status, Status::Pending);
    }

    #[test]
    fn candidates_skill_filter_uses_any_of_containment() {
        let mut store = QueueStore::in_memory().unwrap();
        store
            .enqueue(&new_entry("T-1", &["skill-arabic", "skill-legal"]))
            .unwrap();
        store.enqueue(&new_entry("T-2", &["skill-writing"])).unwrap();

        let filter: SkillSet = ["skill-arabic"].into_iter().collect();
        let hits = store.candidates(Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key.work_item_id, "T-1");

        // No filter: full pending working set.
        assert_eq!(store.candidates(None).unwrap().len(), 2);
    }

    #[test]
    fn depth_buckets_group_by_priority_and_skill() {
        let mut store = QueueStore::in_memory().unwrap();
        store
            .enqueue(&new_entry("T-1", &["skill-arabic"]).priority(Priority::Urgent))
            .unwrap();
        store
            .enqueue(&new_entry("T-2", &["skill-arabic"]).priority(Priority::Urgent))
            .unwrap();
        store
            .enqueue(&new_entry("T-3", &["skill-legal"]).priority(Priority::Low))
            .unwrap();

        let buckets = store.depth_by_bucket().unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].priority, Priority::Urgent);
        assert_eq!(buckets[0].skill, "skill-arabic");
        assert_eq!(buckets[0].depth, 2);
        assert_eq!(buckets[1].priority, Priority::Low);
        assert_eq!(buckets[1].depth, 1);
    }
}
