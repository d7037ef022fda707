//! Per-resource commit locks.
//!
//! Two resources can be written by different characters at once: a
//! household (a group's bank and shared holdings, or a lone character's own
//! state) and one assignee's progress on a research project. Each gets its
//! own mutex, created on first use. A commit takes every lock it needs in
//! sorted key order, so two commits never wait on each other in a cycle and
//! commits on disjoint keys never block.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use downtime_core::id::{CharacterId, GroupId, ProjectId};
use serde::{Deserialize, Serialize};

/// The unit whose state one submission reads and writes as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HouseholdId {
    Group(GroupId),
    Solo(CharacterId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LockKey {
    Household(HouseholdId),
    /// `(project, assignee)`
    Research(ProjectId, CharacterId),
}

#[derive(Debug, Default)]
pub struct LockTable {
    cells: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, key: LockKey) -> Arc<Mutex<()>> {
        Arc::clone(self.cells.entry(key).or_default().value())
    }

    /// Run `f` while holding every lock in `keys`.
    ///
    /// The map shard guard is released before any mutex is taken; only the
    /// cloned `Arc`s are held while waiting.
    pub fn with_locks<R>(&self, keys: &BTreeSet<LockKey>, f: impl FnOnce() -> R) -> R {
        let cells: Vec<Arc<Mutex<()>>> = keys.iter().map(|k| self.cell(*k)).collect();
        let guards: Vec<MutexGuard<'_, ()>> = cells
            .iter()
            .map(|c| c.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .collect();
        let out = f();
        drop(guards);
        out
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
