//! Pack/fulfilment checklists.
//!
//! A pack is what staff hand a character or group at the next event. Its
//! contents are derived once from the resolution records and then frozen;
//! after that only the completion flags change.

use std::collections::BTreeMap;

use dashmap::DashMap;
use downtime_core::error::ErrorKind;
use downtime_core::id::PeriodId;
use downtime_core::inventory::Owner;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::record::Entitlements;

pub const ENERGY_CHITS_KEY: &str = "energy_chits";
pub const CHARACTER_SHEET_KEY: &str = "character_sheet";
pub const ID_BADGE_KEY: &str = "character_id_badge";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackError {
    #[error("no resolved downtime for {owner:?} in period {}", .period.0)]
    NotResolved { owner: Owner, period: PeriodId },
    #[error("no pack generated for {owner:?} in period {}", .period.0)]
    NotGenerated { owner: Owner, period: PeriodId },
    #[error("pack has no checklist entry `{0}`")]
    UnknownKey(String),
}

impl PackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackError::NotResolved { .. } | PackError::NotGenerated { .. } => ErrorKind::NotFound,
            PackError::UnknownKey(_) => ErrorKind::InvalidPayload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackFulfilment {
    pub owner: Owner,
    pub period: PeriodId,
    pub contents: Entitlements,
    /// Checklist key -> handed out.
    pub completion: BTreeMap<String, bool>,
    pub is_generated: bool,
}

impl PackFulfilment {
    fn new(owner: Owner, period: PeriodId, contents: Entitlements) -> Self {
        let completion = checklist_keys(owner, &contents)
            .into_iter()
            .map(|k| (k, false))
            .collect();
        Self {
            owner,
            period,
            contents,
            completion,
            is_generated: true,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completion.values().all(|done| *done)
    }

    /// Keys not yet handed out, in key order.
    pub fn outstanding(&self) -> Vec<&str> {
        self.completion
            .iter()
            .filter(|(_, done)| !**done)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// The entitlement list the pack was generated from.
    pub fn flatten(&self) -> Entitlements {
        self.contents.clone()
    }
}

/// Checklist keys for a pack's contents.
pub fn checklist_keys(owner: Owner, contents: &Entitlements) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    keys.extend(contents.items.iter().map(|c| format!("item_{}", c.item.0)));
    keys.extend(
        contents
            .exotics
            .iter()
            .map(|s| format!("exotic_{}", s.exotic.0)),
    );
    keys.extend(
        contents
            .samples
            .iter()
            .map(|s| format!("sample_{}", s.sample.0)),
    );
    keys.extend(
        contents
            .medicaments
            .iter()
            .map(|m| format!("medicament_{}", m.medicament.0)),
    );
    keys.push(ENERGY_CHITS_KEY.to_string());
    if let Owner::Character(_) = owner {
        keys.push(CHARACTER_SHEET_KEY.to_string());
        keys.push(ID_BADGE_KEY.to_string());
    }
    keys
}

#[derive(Debug, Default)]
pub struct PackTracker {
    packs: DashMap<(Owner, PeriodId), PackFulfilment>,
}

impl PackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a tracker from previously saved packs.
    pub fn restore(packs: Vec<PackFulfilment>) -> Self {
        let tracker = Self::new();
        for pack in packs {
            tracker.packs.insert((pack.owner, pack.period), pack);
        }
        tracker
    }

    /// Every pack, ordered by period then owner.
    pub fn all(&self) -> Vec<PackFulfilment> {
        let mut packs: Vec<PackFulfilment> = self.packs.iter().map(|e| e.value().clone()).collect();
        packs.sort_by_key(|p| (p.period, p.owner));
        packs
    }

    /// Create the pack from `contents`. A pack that already exists is
    /// returned untouched, completion flags included.
    pub fn generate(&self, owner: Owner, period: PeriodId, contents: Entitlements) -> PackFulfilment {
        let entry = self.packs.entry((owner, period)).or_insert_with(|| {
            info!(owner = ?owner, period = period.0, "pack generated");
            PackFulfilment::new(owner, period, contents)
        });
        entry.value().clone()
    }

    pub fn is_generated(&self, owner: Owner, period: PeriodId) -> bool {
        self.packs
            .get(&(owner, period))
            .is_some_and(|p| p.is_generated)
    }

    pub fn view(&self, owner: Owner, period: PeriodId) -> Result<PackFulfilment, PackError> {
        self.packs
            .get(&(owner, period))
            .map(|p| p.clone())
            .ok_or(PackError::NotGenerated { owner, period })
    }

    /// Set completion flags. Every key must already be on the checklist;
    /// otherwise nothing changes.
    pub fn update(
        &self,
        owner: Owner,
        period: PeriodId,
        flags: &BTreeMap<String, bool>,
    ) -> Result<PackFulfilment, PackError> {
        let mut pack = self
            .packs
            .get_mut(&(owner, period))
            .ok_or(PackError::NotGenerated { owner, period })?;
        if let Some(unknown) = flags.keys().find(|k| !pack.completion.contains_key(*k)) {
            return Err(PackError::UnknownKey(unknown.clone()));
        }
        for (key, done) in flags {
            pack.completion.insert(key.clone(), *done);
        }
        debug!(owner = ?owner, period = period.0, flags = flags.len(), "pack updated");
        Ok(pack.clone())
    }

    pub fn for_period(&self, period: PeriodId) -> Vec<PackFulfilment> {
        let mut packs: Vec<PackFulfilment> = self
            .packs
            .iter()
            .filter(|e| e.key().1 == period)
            .map(|e| e.value().clone())
            .collect();
        packs.sort_by_key(|p| p.owner);
        packs
    }
}
