//! Requirement Evaluator.
//!
//! Given the slots of a project's current stage and a contributor's offer,
//! works out which offered resource fills which slot. The evaluator never
//! mutates anything: it reports per-slot verdicts, the resources that would
//! be consumed, and the offered resources that matched nothing.
//!
//! # Matching rules
//!
//! - **Exotic**: by exotic id; quantity is capped at the slot's remaining
//!   need and the excess is simply not consumed.
//! - **Item**: by item type; one item fills one unit of one slot.
//! - **Sample**: by tag (case-insensitive) and, when the slot requires it,
//!   the researched flag; one sample fills one unit of one slot.
//! - **Science**: a credit fills a slot of exactly its own type. A generic
//!   credit may fill a specific slot only when it names that type as its
//!   target; a specific credit never fills a generic slot.
//!
//! Offers are processed in declaration order and each fills the first open
//! slot that accepts it.

use std::collections::HashSet;

use downtime_core::catalog::{RequirementKind, ScienceType};
use downtime_core::id::*;
use downtime_core::inventory::ExoticStack;
use serde::{Deserialize, Serialize};

use crate::{ContributionSource, SlotProgress};

// ---------------------------------------------------------------------------
// Offer
// ---------------------------------------------------------------------------

/// An item offered for a slot, with the item type its blueprint produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferedItem {
    pub id: ItemId,
    pub item_type: ItemTypeId,
}

/// A sample offered for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferedSample {
    pub id: SampleId,
    pub tags: Vec<String>,
    pub is_researched: bool,
}

/// One science action's worth of credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScienceCredit {
    pub science_type: ScienceType,
    /// For generic credits: the specific slot type the contributor picked.
    pub target: Option<ScienceType>,
}

/// Everything a contributor puts toward one project stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionOffer {
    pub exotics: Vec<ExoticStack>,
    pub items: Vec<OfferedItem>,
    pub samples: Vec<OfferedSample>,
    pub science: Vec<ScienceCredit>,
}

impl ContributionOffer {
    pub fn is_empty(&self) -> bool {
        self.exotics.is_empty()
            && self.items.is_empty()
            && self.samples.is_empty()
            && self.science.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Units of one offered resource placed into one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub slot: usize,
    pub amount: u32,
    pub source: ContributionSource,
}

/// Why an offered resource was not placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    /// No open slot of this stage accepts it.
    NoOpenSlot,
    /// A slot wants this tag but only from a researched sample.
    NotResearched,
    /// A generic credit must name which specific slot type it fills.
    TargetRequired,
    /// The same item or sample was offered twice.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unmatched {
    pub source: ContributionSource,
    pub reason: MismatchReason,
}

/// Per-slot outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotVerdict {
    pub slot: usize,
    pub requirement: RequirementKind,
    pub needed: u32,
    /// Progress before this offer.
    pub before: u32,
    /// Units this offer adds.
    pub added: u32,
}

impl SlotVerdict {
    pub fn after(&self) -> u32 {
        self.before + self.added
    }

    pub fn remaining(&self) -> u32 {
        self.needed.saturating_sub(self.after())
    }

    pub fn is_satisfied(&self) -> bool {
        self.after() >= self.needed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Stage the slots belong to.
    pub stage: usize,
    pub slots: Vec<SlotVerdict>,
    pub fills: Vec<Fill>,
    pub unmatched: Vec<Unmatched>,
    pub access_granted: bool,
    /// Every slot satisfied and the access rule passed.
    pub eligible: bool,
}

impl Evaluation {
    pub fn all_satisfied(&self) -> bool {
        self.slots.iter().all(SlotVerdict::is_satisfied)
    }

    /// Exotic units that would be consumed, merged per substance.
    pub fn consumed_exotics(&self) -> Vec<ExoticStack> {
        let mut out: Vec<ExoticStack> = Vec::new();
        for fill in &self.fills {
            if let ContributionSource::Exotic(exotic) = fill.source {
                match out.iter_mut().find(|s| s.exotic == exotic) {
                    Some(stack) => stack.quantity += fill.amount,
                    None => out.push(ExoticStack {
                        exotic,
                        quantity: fill.amount,
                    }),
                }
            }
        }
        out
    }

    pub fn consumed_items(&self) -> Vec<ItemId> {
        self.fills
            .iter()
            .filter_map(|f| match f.source {
                ContributionSource::Item(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn consumed_samples(&self) -> Vec<SampleId> {
        self.fills
            .iter()
            .filter_map(|f| match f.source {
                ContributionSource::Sample(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// evaluate
// ---------------------------------------------------------------------------

struct Working<'a> {
    slots: &'a [SlotProgress],
    filled: Vec<u32>,
    fills: Vec<Fill>,
}

impl Working<'_> {
    fn open_slot(&self, accepts: impl Fn(&RequirementKind) -> bool) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .position(|(i, s)| accepts(&s.requirement) && self.filled[i] < s.needed)
    }

    fn room(&self, slot: usize) -> u32 {
        self.slots[slot].needed.saturating_sub(self.filled[slot])
    }

    fn place(&mut self, slot: usize, amount: u32, source: ContributionSource) {
        self.filled[slot] += amount;
        self.fills.push(Fill {
            slot,
            amount,
            source,
        });
    }
}

/// Evaluate `offer` against the open slots of `stage`.
pub fn evaluate(
    stage: usize,
    slots: &[SlotProgress],
    offer: &ContributionOffer,
    access_granted: bool,
) -> Evaluation {
    let mut work = Working {
        slots,
        filled: slots.iter().map(|s| s.satisfied).collect(),
        fills: Vec::new(),
    };
    let mut unmatched = Vec::new();

    for stack in &offer.exotics {
        let mut left = stack.quantity;
        let mut placed = 0;
        while left > 0 {
            let Some(slot) = work.open_slot(|k| *k == RequirementKind::Exotic(stack.exotic)) else {
                break;
            };
            let take = left.min(work.room(slot));
            work.place(slot, take, ContributionSource::Exotic(stack.exotic));
            left -= take;
            placed += take;
        }
        if placed == 0 && stack.quantity > 0 {
            unmatched.push(Unmatched {
                source: ContributionSource::Exotic(stack.exotic),
                reason: MismatchReason::NoOpenSlot,
            });
        }
    }

    let mut seen_items = HashSet::new();
    for item in &offer.items {
        let source = ContributionSource::Item(item.id);
        if !seen_items.insert(item.id) {
            unmatched.push(Unmatched {
                source,
                reason: MismatchReason::Duplicate,
            });
            continue;
        }
        match work.open_slot(|k| *k == RequirementKind::Item(item.item_type)) {
            Some(slot) => work.place(slot, 1, source),
            None => unmatched.push(Unmatched {
                source,
                reason: MismatchReason::NoOpenSlot,
            }),
        }
    }

    let mut seen_samples = HashSet::new();
    for sample in &offer.samples {
        let source = ContributionSource::Sample(sample.id);
        if !seen_samples.insert(sample.id) {
            unmatched.push(Unmatched {
                source,
                reason: MismatchReason::Duplicate,
            });
            continue;
        }
        let carries = |tag: &str| sample.tags.iter().any(|t| t.eq_ignore_ascii_case(tag));
        let accepted = work.open_slot(|k| match k {
            RequirementKind::Sample {
                tag,
                requires_researched,
            } => carries(tag) && (!requires_researched || sample.is_researched),
            _ => false,
        });
        match accepted {
            Some(slot) => work.place(slot, 1, source),
            None => {
                let wants_researched = work
                    .open_slot(|k| matches!(k, RequirementKind::Sample { tag, .. } if carries(tag)))
                    .is_some();
                unmatched.push(Unmatched {
                    source,
                    reason: if wants_researched {
                        MismatchReason::NotResearched
                    } else {
                        MismatchReason::NoOpenSlot
                    },
                });
            }
        }
    }

    for credit in &offer.science {
        let source = ContributionSource::Science(credit.science_type);
        let wanted = match (credit.science_type, credit.target) {
            (ScienceType::Generic, Some(target)) => target,
            (own, _) => own,
        };
        match work.open_slot(|k| *k == RequirementKind::Science(wanted)) {
            Some(slot) => work.place(slot, 1, source),
            None => {
                let needs_target = credit.science_type == ScienceType::Generic
                    && credit.target.is_none()
                    && work
                        .open_slot(|k| matches!(k, RequirementKind::Science(t) if *t != ScienceType::Generic))
                        .is_some();
                unmatched.push(Unmatched {
                    source,
                    reason: if needs_target {
                        MismatchReason::TargetRequired
                    } else {
                        MismatchReason::NoOpenSlot
                    },
                });
            }
        }
    }

    let verdicts: Vec<SlotVerdict> = slots
        .iter()
        .enumerate()
        .map(|(i, s)| SlotVerdict {
            slot: i,
            requirement: s.requirement.clone(),
            needed: s.needed,
            before: s.satisfied,
            added: work.filled[i] - s.satisfied,
        })
        .collect();
    let all_satisfied = verdicts.iter().all(SlotVerdict::is_satisfied);

    Evaluation {
        stage,
        slots: verdicts,
        fills: work.fills,
        unmatched,
        access_granted,
        eligible: access_granted && all_satisfied,
    }
}
