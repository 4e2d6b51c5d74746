//! Capacity change detection.
//!
//! Heterogeneous signals from the staffing side (an assignment completed,
//! a leave ended, a skill got certified) are normalized into a single
//! `CapacityEvent` shape before anything downstream sees them. The event
//! always carries the complete set of skills now usable on the slot,
//! resolved through the assignee directory — consumers never re-derive
//! freed skills from raw change records.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::error::Result;
use crate::model::{CapacityEvent, SkillSet, SlotId};

/// A raw change signal as emitted by the underlying staffing sources.
#[derive(Debug, Clone)]
pub enum CapacitySignal {
    /// An assignee finished their current assignment.
    AssignmentCompleted { assignee_id: SlotId },
    /// An assignee returned from leave.
    LeaveEnded { assignee_id: SlotId },
    /// An assignee was certified for an additional skill.
    SkillCertified { assignee_id: SlotId, skill: String },
}

impl CapacitySignal {
    pub fn assignee_id(&self) -> &SlotId {
        match self {
            CapacitySignal::AssignmentCompleted { assignee_id }
            | CapacitySignal::LeaveEnded { assignee_id }
            | CapacitySignal::SkillCertified { assignee_id, .. } => assignee_id,
        }
    }
}

/// Source of truth for capacity slots and their skill sets.
pub trait AssigneeDirectory: Send + Sync {
    /// The complete set of skills currently usable on the slot.
    fn available_skills(&self, assignee_id: &SlotId) -> anyhow::Result<SkillSet>;
}

/// Recipient of normalized capacity events (implemented by the engine).
pub trait CapacitySink: Send + Sync {
    fn capacity_freed(&self, event: CapacityEvent) -> Result<()>;
}

/// Normalizes raw capacity signals into `CapacityEvent`s and publishes
/// them into a sink. Several smaller signals for the same slot each
/// produce an event with the full current skill set; the debouncer
/// downstream coalesces them.
pub struct CapacityChangeDetector {
    directory: Arc<dyn AssigneeDirectory>,
    sink: Arc<dyn CapacitySink>,
}

impl CapacityChangeDetector {
    pub fn new(directory: Arc<dyn AssigneeDirectory>, sink: Arc<dyn CapacitySink>) -> Self {
        Self { directory, sink }
    }

    /// Ingest one raw signal.
    pub fn observe(&self, signal: CapacitySignal) -> Result<()> {
        let assignee_id = signal.assignee_id().clone();
        let freed_skills = self.directory.available_skills(&assignee_id)?;

        debug!(assignee = %assignee_id, skills = %freed_skills, ?signal, "capacity freed");

        self.sink.capacity_freed(CapacityEvent {
            assignee_id,
            freed_skills,
            freed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedDirectory(SkillSet);

    impl AssigneeDirectory for FixedDirectory {
        fn available_skills(&self, _assignee_id: &SlotId) -> anyhow::Result<SkillSet> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<CapacityEvent>>);

    impl CapacitySink for CollectingSink {
        fn capacity_freed(&self, event: CapacityEvent) -> Result<()> {
            self.0.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[test]
    fn every_signal_shape_yields_the_complete_skill_set() {
        let skills: SkillSet = ["skill-arabic", "skill-legal"].into_iter().collect();
        let sink = Arc::new(CollectingSink::default());
        let detector = CapacityChangeDetector::new(
            Arc::new(FixedDirectory(skills.clone())),
            sink.clone(),
        );

        let amal = SlotId::new("amal");
        detector
            .observe(CapacitySignal::AssignmentCompleted {
                assignee_id: amal.clone(),
            })
            .unwrap();
        detector
            .observe(CapacitySignal::LeaveEnded {
                assignee_id: amal.clone(),
            })
            .unwrap();
        detector
            .observe(CapacitySignal::SkillCertified {
                assignee_id: amal.clone(),
                skill: "skill-legal".into(),
            })
            .unwrap();

        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 3);
        for event in events.iter() {
            assert_eq!(event.assignee_id, amal);
            // Complete set, even for the single-skill certification signal.
            assert_eq!(event.freed_skills, skills);
        }
    }
}
