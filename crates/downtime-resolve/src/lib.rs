//! Downtime Resolve -- validation, commit orchestration and pack tracking.
//!
//! A character's downtime submission is an ordered batch of declared
//! actions. This crate turns it into durable state changes:
//!
//! 1. **Validate** -- every action is checked in declaration order against a
//!    working copy of the character's state, so earlier actions are visible
//!    to later ones. All errors are collected; nothing is written.
//! 2. **Commit** -- the resulting [`validation::ResolutionPlan`] is written
//!    under per-household and per-research locks after re-checking the
//!    versions it was built from, with a single ledger debit.
//! 3. **Record** -- one [`record::ResolutionRecord`] is appended per commit;
//!    corrections are compensating records, never edits.
//! 4. **Fulfil** -- [`pack::PackTracker`] derives a checklist of what staff
//!    hand out at the next event.
//!
//! # Key Types
//!
//! - [`orchestrator::Orchestrator`] -- Entry point: submit, query, compensate
//!   and generate packs.
//! - [`world::World`] -- Characters, groups, items, samples, research and
//!   the ledger, with per-key versions.
//! - [`action::DowntimeAction`] -- Tagged action payloads.
//! - [`lock::LockTable`] -- Ordered per-resource commit locks.

pub mod action;
pub mod lock;
pub mod orchestrator;
pub mod pack;
pub mod record;
pub mod validation;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use action::{DowntimeAction, Submission};
pub use orchestrator::{Orchestrator, SubmissionState, SubmitOutcome};
pub use record::{RecordStore, ResolutionRecord};
pub use world::World;
