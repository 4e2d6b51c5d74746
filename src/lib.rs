//! # assignq
//!
//! Assignment queue processing engine. Waiting work items (tickets, tasks,
//! dossier items) are matched against staff capacity as it becomes free,
//! honoring priority order, FIFO fairness within a priority, and skill
//! eligibility, with at-most-one-assignment guarantees under concurrent
//! capacity changes.
//!
//! Capacity signals flow: detector → debouncer → matching pass → claim /
//! finalize (or abort → retry → escalation). The queue itself is SQLite
//! backed; see [`engine::Engine`] for the public surface.

pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod detector;
pub mod engine;
pub mod error;
pub mod event;
pub mod matcher;
pub mod model;
pub mod store;
pub mod telemetry;
