use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::ScienceType;
use crate::id::*;

/// Who holds an item, sample or pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    Character(CharacterId),
    Group(GroupId),
}

/// Whether an item is still serviceable at a given event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Maintained,
    Damaged,
}

/// A concrete, uniquely coded item.
///
/// The `(blueprint, sequence)` pair is unique; it renders as the item's full
/// code (`WP0012-003`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInstance {
    pub id: ItemId,
    pub blueprint: BlueprintId,
    pub sequence: u32,
    pub owner: Owner,
    /// Attached modifications, in the order they were applied.
    pub mods: Vec<ModId>,
    /// Last event number at which the item is still maintained.
    pub expiry: u32,
}

impl ItemInstance {
    pub fn mod_count(&self) -> u32 {
        self.mods.len() as u32
    }

    pub fn condition(&self, event_number: u32) -> Condition {
        if self.expiry < event_number {
            Condition::Damaged
        } else {
            Condition::Maintained
        }
    }
}

/// A quantity of one exotic substance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExoticStack {
    pub exotic: ExoticId,
    pub quantity: u32,
}

/// A research sample. Unlike items, samples are mutable: research marks them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    pub name: String,
    pub science_type: ScienceType,
    pub tags: Vec<String>,
    pub is_researched: bool,
    pub description: String,
    pub owner: Owner,
}

impl Sample {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Everything a character or group holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holdings {
    pub items: Vec<ItemId>,
    pub exotics: Vec<ExoticStack>,
    pub samples: Vec<SampleId>,
    #[serde(default)]
    pub medicaments: BTreeMap<MedicamentId, u32>,
}

impl Holdings {
    pub fn has_item(&self, item: ItemId) -> bool {
        self.items.contains(&item)
    }

    pub fn add_item(&mut self, item: ItemId) {
        if !self.has_item(item) {
            self.items.push(item);
        }
    }

    /// Returns whether the item was held.
    pub fn remove_item(&mut self, item: ItemId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| *i != item);
        self.items.len() != before
    }

    pub fn exotic_quantity(&self, exotic: ExoticId) -> u32 {
        self.exotics
            .iter()
            .find(|s| s.exotic == exotic)
            .map(|s| s.quantity)
            .unwrap_or(0)
    }

    pub fn add_exotic(&mut self, exotic: ExoticId, quantity: u32) {
        if quantity == 0 {
            return;
        }
        if let Some(stack) = self.exotics.iter_mut().find(|s| s.exotic == exotic) {
            stack.quantity += quantity;
        } else {
            self.exotics.push(ExoticStack { exotic, quantity });
        }
    }

    /// Remove up to `quantity`. Returns the amount actually removed.
    #[must_use = "returns the quantity actually removed, which may be less than requested"]
    pub fn remove_exotic(&mut self, exotic: ExoticId, quantity: u32) -> u32 {
        if let Some(stack) = self.exotics.iter_mut().find(|s| s.exotic == exotic) {
            let to_remove = quantity.min(stack.quantity);
            stack.quantity -= to_remove;
            if stack.quantity == 0 {
                self.exotics.retain(|s| s.quantity > 0);
            }
            to_remove
        } else {
            0
        }
    }

    pub fn has_sample(&self, sample: SampleId) -> bool {
        self.samples.contains(&sample)
    }

    pub fn add_sample(&mut self, sample: SampleId) {
        if !self.has_sample(sample) {
            self.samples.push(sample);
        }
    }

    pub fn remove_sample(&mut self, sample: SampleId) -> bool {
        let before = self.samples.len();
        self.samples.retain(|s| *s != sample);
        self.samples.len() != before
    }

    pub fn add_medicament(&mut self, medicament: MedicamentId, quantity: u32) {
        if quantity > 0 {
            *self.medicaments.entry(medicament).or_insert(0) += quantity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rifle(expiry: u32) -> ItemInstance {
        ItemInstance {
            id: ItemId(0),
            blueprint: BlueprintId(0),
            sequence: 1,
            owner: Owner::Character(CharacterId(1)),
            mods: vec![ModId(0)],
            expiry,
        }
    }

    #[test]
    fn condition_by_expiry() {
        let item = rifle(5);
        assert_eq!(item.condition(4), Condition::Maintained);
        assert_eq!(item.condition(5), Condition::Maintained);
        assert_eq!(item.condition(6), Condition::Damaged);
        assert_eq!(item.mod_count(), 1);
    }

    #[test]
    fn exotic_stacks_merge_and_drain() {
        let mut h = Holdings::default();
        h.add_exotic(ExoticId(3), 2);
        h.add_exotic(ExoticId(3), 3);
        assert_eq!(h.exotic_quantity(ExoticId(3)), 5);
        assert_eq!(h.exotics.len(), 1);

        assert_eq!(h.remove_exotic(ExoticId(3), 4), 4);
        assert_eq!(h.exotic_quantity(ExoticId(3)), 1);
        assert_eq!(h.remove_exotic(ExoticId(3), 4), 1);
        assert!(h.exotics.is_empty());
    }

    #[test]
    fn remove_missing_exotic_returns_zero() {
        let mut h = Holdings::default();
        assert_eq!(h.remove_exotic(ExoticId(1), 2), 0);
    }

    #[test]
    fn items_are_a_set() {
        let mut h = Holdings::default();
        h.add_item(ItemId(4));
        h.add_item(ItemId(4));
        assert_eq!(h.items.len(), 1);
        assert!(h.remove_item(ItemId(4)));
        assert!(!h.remove_item(ItemId(4)));
    }

    #[test]
    fn samples_and_medicaments() {
        let mut h = Holdings::default();
        h.add_sample(SampleId(2));
        assert!(h.has_sample(SampleId(2)));
        assert!(h.remove_sample(SampleId(2)));
        assert!(!h.has_sample(SampleId(2)));

        h.add_medicament(MedicamentId(0), 2);
        h.add_medicament(MedicamentId(0), 1);
        h.add_medicament(MedicamentId(1), 0);
        assert_eq!(h.medicaments.get(&MedicamentId(0)), Some(&3));
        assert!(!h.medicaments.contains_key(&MedicamentId(1)));
    }

    #[test]
    fn sample_tags_case_insensitive() {
        let sample = Sample {
            id: SampleId(0),
            name: "Nightshade extract".to_string(),
            science_type: ScienceType::Life,
            tags: vec!["Toxin".to_string()],
            is_researched: false,
            description: String::new(),
            owner: Owner::Group(GroupId(1)),
        };
        assert!(sample.has_tag("toxin"));
        assert!(!sample.has_tag("metal"));
    }
}
