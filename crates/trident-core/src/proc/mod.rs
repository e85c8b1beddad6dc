//! Process grouping engine.
//!
//! ```text
//! ProcSource ──samples──▶ Tracker ──updates──▶ Grouper ──▶ GroupByName
//!                            │
//!                         MatchNamer
//! ```
//!
//! The [`Tracker`] turns snapshots into per-process deltas; the [`Grouper`]
//! folds them into groups whose counters never go backwards.

pub mod grouper;
pub mod namer;
pub mod tracker;
pub mod types;

pub use grouper::Grouper;
pub use namer::{MatchNamer, ProcnameNamer, RuleNamer};
pub use tracker::Tracker;
pub use types::{CollectErrors, Counts, Group, GroupByName, ProcId, ProcSample, Update};
