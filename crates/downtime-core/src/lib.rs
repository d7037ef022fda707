//! Downtime Core -- the shared foundation of the downtime resolution engine.
//!
//! A campaign's between-events ("downtime") declarations are resolved against
//! three kinds of state, all of which live in this crate:
//!
//! - the immutable [`catalog::Catalog`] of blueprints, modifications, exotic
//!   substances, factions and research projects (frozen at startup),
//! - the [`ledger::Ledger`] of character and group energy-chit balances,
//! - the per-character and per-group holdings in [`inventory`] and
//!   [`character`].
//!
//! Validation, commit orchestration and pack tracking are built on top of
//! these types in `downtime-resolve`; research progress and the requirement
//! evaluator live in `downtime-research`.
//!
//! # Key Types
//!
//! - [`catalog::Catalog`] -- Immutable catalog built with
//!   [`catalog::CatalogBuilder`]; answers lookups and engineering costs.
//! - [`cost::CostCurve`] -- Stacking surcharge curve for maintain/modify.
//! - [`ledger::Ledger`] -- Balances with a fixed [`ledger::DrawOrder`] and an
//!   append-only journal.
//! - [`inventory::ItemInstance`] -- A uniquely coded item with attached
//!   modifications and an expiry event.
//! - [`error::ActionError`] -- Machine-readable [`error::ErrorKind`] plus a
//!   human-readable message; the only error shape that crosses the boundary.
//! - [`config::EngineConfig`] -- Tunables loaded from the campaign data.

pub mod catalog;
pub mod character;
pub mod config;
pub mod cost;
pub mod error;
pub mod id;
pub mod inventory;
pub mod ledger;
pub mod rng;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
