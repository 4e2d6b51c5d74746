//! Filtering and ordering of queue entries against freed capacity.
//!
//! Pure functions over working sets fetched from the store. The matching
//! rule is "any-of": an entry is eligible if it requires at least one of
//! the freed skills. Ordering is priority descending, then enqueue time
//! ascending (strict FIFO within a priority), and the sort is stable so
//! repeated passes over the same input produce the same sequence.

use crate::model::{QueueEntry, SkillSet};

/// Restrict `entries` to those eligible for the freed skills.
///
/// An empty `freed` set means a generic rescan not tied to a specific
/// skill change: the input is returned unchanged.
pub fn filter_by_skills(entries: Vec<QueueEntry>, freed: &SkillSet) -> Vec<QueueEntry> {
    if freed.is_empty() {
        return entries;
    }
    entries
        .into_iter()
        .filter(|e| e.required_skills.intersects(freed))
        .collect()
}

/// Return a new ordered sequence: priority descending
/// (urgent > high > normal > low), then `created_at` ascending. Entries
/// with identical priority and timestamp retain their input order.
pub fn sort_queue_entries(entries: &[QueueEntry]) -> Vec<QueueEntry> {
    let mut sorted = entries.to_vec();
    // sort_by is stable; the comparator deliberately keys on nothing else.
    sorted.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
    });
    sorted
}
