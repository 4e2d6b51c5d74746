//! Burst coalescing for capacity events.
//!
//! A matching pass is not free (full scan plus claiming), and capacity
//! events arrive in bursts — a bulk completion can free a dozen slots
//! within milliseconds. Each coalescing scope owns one cooperative task
//! with one timer; events for the same scope are strictly serialized
//! through it, while different scopes debounce and fire independently.
//!
//! The window is trailing (sliding): it resets on every new event, so a
//! burst settles into exactly one downstream pass carrying the union of
//! all freed skills seen. The tradeoff is worst-case latency under a
//! sustained event stream; see DESIGN.md. No event is dropped — a burst
//! still pending when the channel closes is flushed on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{CapacityEvent, SkillSet};

/// Downstream of a settled burst: one matching pass over the union of
/// freed skills. Implemented by the engine.
pub trait PassTrigger: Send + Sync + 'static {
    fn run_pass(&self, freed: SkillSet);
}

/// One coalescing scope: a channel into a timer task.
pub struct Debouncer {
    tx: mpsc::UnboundedSender<CapacityEvent>,
    handle: JoinHandle<()>,
}

impl Debouncer {
    /// Spawn the coalescing task for one scope.
    pub fn spawn(scope: impl Into<String>, window: Duration, trigger: Arc<dyn PassTrigger>) -> Self {
        let scope = scope.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(debounce_loop(scope, window, rx, trigger));
        Self { tx, handle }
    }

    /// Feed one event into the scope's window.
    pub fn send(&self, event: CapacityEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| Error::Other("debouncer task is gone".into()))
    }

    /// Close the scope, flushing any pending burst.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.handle.await;
    }
}

async fn debounce_loop(
    scope: String,
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<CapacityEvent>,
    trigger: Arc<dyn PassTrigger>,
) {
    let mut burst: Vec<CapacityEvent> = Vec::new();

    loop {
        if burst.is_empty() {
            // Quiet: wait for the first event of the next burst.
            match rx.recv().await {
                Some(event) => burst.push(event),
                None => return,
            }
        } else {
            // Collecting: each new event restarts the window.
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => burst.push(event),
                        None => {
                            flush(&scope, &mut burst, &trigger);
                            return;
                        }
                    }
                }
                _ = tokio::time::sleep(window) => {
                    flush(&scope, &mut burst, &trigger);
                }
            }
        }
    }
}

fn flush(scope: &str, burst: &mut Vec<CapacityEvent>, trigger: &Arc<dyn PassTrigger>) {
    let events = std::mem::take(burst);
    if events.is_empty() {
        return;
    }

    let mut freed = SkillSet::new();
    for event in &events {
        freed.extend(&event.freed_skills);
    }

    debug!(scope, events = events.len(), skills = %freed, "burst settled, running pass");
    trigger.run_pass(freed);
}
