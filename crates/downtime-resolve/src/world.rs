//! Mutable campaign state: characters, groups, item instances, samples,
//! research progress and the ledger.
//!
//! Every store is a `DashMap`, so reads never block on unrelated writers.
//! Writers go through [`World::apply`] while holding the commit locks of
//! every key the plan touches; each such key carries a version number that
//! is bumped on commit so a plan built against older state can be detected.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use downtime_core::catalog::{Catalog, CatalogError, ScienceType, full_code};
use downtime_core::character::{Character, Group};
use downtime_core::id::*;
use downtime_core::inventory::{ItemInstance, Owner, Sample};
use downtime_core::ledger::Ledger;
use downtime_research::ProjectProgress;
use tracing::debug;

use crate::lock::{HouseholdId, LockKey};
use crate::validation::ResolutionPlan;

/// An item bought in a submission and not yet given an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMint {
    pub slot: usize,
    pub blueprint: BlueprintId,
    pub name: String,
    pub prefix: String,
    pub number: u32,
    pub mods: Vec<ModId>,
    pub expiry: u32,
}

/// Request to register a new research sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSample {
    pub name: String,
    pub science_type: ScienceType,
    pub description: String,
    pub tags: Vec<String>,
    pub owner: Owner,
}

#[derive(Debug, Default)]
pub struct World {
    characters: DashMap<CharacterId, Character>,
    groups: DashMap<GroupId, Group>,
    items: DashMap<ItemId, ItemInstance>,
    item_codes: DashMap<(BlueprintId, u32), ItemId>,
    sequences: DashMap<BlueprintId, u32>,
    samples: DashMap<SampleId, Sample>,
    research: DashMap<(ProjectId, CharacterId), ProjectProgress>,
    periods: DashMap<PeriodId, u32>,
    versions: DashMap<LockKey, u64>,
    next_item: AtomicU32,
    next_sample: AtomicU32,
    ledger: Ledger,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    /// Register a group and open its bank.
    pub fn add_group(&self, group: Group, bank: i64) {
        self.ledger.open_group(group.id, bank);
        self.groups.insert(group.id, group);
    }

    /// Register a character and open its personal account. A grouped
    /// character is added to its group's member list.
    pub fn add_character(&self, character: Character, balance: i64) {
        self.ledger
            .open_character(character.id, character.group, balance);
        if let Some(g) = character.group
            && let Some(mut group) = self.groups.get_mut(&g)
            && !group.is_member(character.id)
        {
            group.members.push(character.id);
        }
        self.characters.insert(character.id, character);
    }

    /// Open a downtime period resolved before event `event_number`.
    pub fn open_period(&self, period: PeriodId, event_number: u32) {
        self.periods.insert(period, event_number);
    }

    /// Create an item instance with the next sequence number of its
    /// blueprint and put it in its owner's holdings.
    pub fn add_item(
        &self,
        blueprint: BlueprintId,
        owner: Owner,
        mods: Vec<ModId>,
        expiry: u32,
    ) -> ItemInstance {
        let item = self.mint(blueprint, owner, mods, expiry);
        self.hold_item(owner, item.id);
        item
    }

    /// Register a research sample with its owner.
    pub fn create_sample(&self, request: NewSample) -> Sample {
        let id = SampleId(self.next_sample.fetch_add(1, Ordering::Relaxed));
        let sample = Sample {
            id,
            name: request.name,
            science_type: request.science_type,
            tags: request.tags,
            is_researched: false,
            description: request.description,
            owner: request.owner,
        };
        match request.owner {
            Owner::Character(c) => {
                if let Some(mut ch) = self.characters.get_mut(&c) {
                    ch.holdings.add_sample(id);
                }
            }
            Owner::Group(g) => {
                if let Some(mut gr) = self.groups.get_mut(&g) {
                    gr.holdings.add_sample(id);
                }
            }
        }
        self.samples.insert(id, sample.clone());
        if let Some(household) = self.household_of_owner(request.owner) {
            self.bump(&BTreeSet::from([LockKey::Household(household)]));
        }
        debug!(sample = id.0, "sample created");
        sample
    }

    /// Give a character exotic substances. Returns false for an unknown
    /// character.
    pub fn grant_exotic(&self, character: CharacterId, exotic: ExoticId, quantity: u32) -> bool {
        self.update_holdings(character, |ch| ch.holdings.add_exotic(exotic, quantity))
    }

    pub fn grant_medicament(
        &self,
        character: CharacterId,
        medicament: MedicamentId,
        quantity: u32,
    ) -> bool {
        self.update_holdings(character, |ch| ch.holdings.add_medicament(medicament, quantity))
    }

    fn update_holdings(&self, character: CharacterId, f: impl FnOnce(&mut Character)) -> bool {
        let household = {
            let Some(mut ch) = self.characters.get_mut(&character) else {
                return false;
            };
            f(&mut ch);
            self.household_of(&ch)
        };
        self.bump(&BTreeSet::from([LockKey::Household(household)]));
        true
    }

    /// Insert or replace a project's progress (seeding and restores).
    pub fn put_progress(&self, progress: ProjectProgress) {
        self.research
            .insert((progress.project, progress.assignee), progress);
    }

    fn mint(
        &self,
        blueprint: BlueprintId,
        owner: Owner,
        mods: Vec<ModId>,
        expiry: u32,
    ) -> ItemInstance {
        let id = ItemId(self.next_item.fetch_add(1, Ordering::Relaxed));
        let sequence = {
            let mut next = self.sequences.entry(blueprint).or_insert(0);
            *next += 1;
            *next
        };
        let item = ItemInstance {
            id,
            blueprint,
            sequence,
            owner,
            mods,
            expiry,
        };
        self.item_codes.insert((blueprint, sequence), id);
        self.items.insert(id, item.clone());
        item
    }

    fn hold_item(&self, owner: Owner, item: ItemId) {
        match owner {
            Owner::Character(c) => {
                if let Some(mut ch) = self.characters.get_mut(&c) {
                    ch.holdings.add_item(item);
                }
            }
            Owner::Group(g) => {
                if let Some(mut gr) = self.groups.get_mut(&g) {
                    gr.holdings.add_item(item);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn character(&self, id: CharacterId) -> Option<Character> {
        self.characters.get(&id).map(|c| c.clone())
    }

    pub fn group(&self, id: GroupId) -> Option<Group> {
        self.groups.get(&id).map(|g| g.clone())
    }

    pub fn item(&self, id: ItemId) -> Option<ItemInstance> {
        self.items.get(&id).map(|i| i.clone())
    }

    pub fn sample(&self, id: SampleId) -> Option<Sample> {
        self.samples.get(&id).map(|s| s.clone())
    }

    pub fn progress(&self, project: ProjectId, assignee: CharacterId) -> Option<ProjectProgress> {
        self.research.get(&(project, assignee)).map(|p| p.clone())
    }

    pub fn event_number(&self, period: PeriodId) -> Option<u32> {
        self.periods.get(&period).map(|e| *e)
    }

    pub fn character_ids(&self) -> Vec<CharacterId> {
        let mut ids: Vec<_> = self.characters.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// The household a character's submissions lock.
    pub fn household_of(&self, character: &Character) -> HouseholdId {
        match character.group {
            Some(g) => HouseholdId::Group(g),
            None => HouseholdId::Solo(character.id),
        }
    }

    /// The household whose lock guards `owner`'s holdings.
    pub fn household_of_owner(&self, owner: Owner) -> Option<HouseholdId> {
        match owner {
            Owner::Character(c) => self.characters.get(&c).map(|ch| self.household_of(&ch)),
            Owner::Group(g) => Some(HouseholdId::Group(g)),
        }
    }

    /// Look an item up by its full code.
    pub fn find_by_code(&self, catalog: &Catalog, code: &str) -> Result<ItemInstance, CatalogError> {
        let (blueprint, sequence) = catalog.resolve_full_code(code)?;
        self.item_codes
            .get(&(blueprint, sequence))
            .and_then(|id| self.item(*id))
            .ok_or_else(|| CatalogError::NotFound(format!("item {}", code.trim())))
    }

    pub fn version(&self, key: LockKey) -> u64 {
        self.versions.get(&key).map(|v| *v).unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Write a validated plan. The caller holds the locks of `plan.locks`
    /// and has already checked their versions and debited the ledger.
    ///
    /// Returns the minted items in purchase order.
    pub(crate) fn apply(&self, plan: &ResolutionPlan) -> Vec<(PendingMint, ItemInstance, String)> {
        let mut character = plan.character.clone();
        let owner = Owner::Character(character.id);

        let mut minted = Vec::with_capacity(plan.mints.len());
        for pending in &plan.mints {
            let item = self.mint(
                pending.blueprint,
                owner,
                pending.mods.clone(),
                pending.expiry,
            );
            character.holdings.add_item(item.id);
            let code = full_code(&pending.prefix, pending.number, item.sequence);
            minted.push((pending.clone(), item, code));
        }

        for item in &plan.items {
            self.items.insert(item.id, item.clone());
        }
        for id in &plan.consumed_items {
            if let Some((_, item)) = self.items.remove(id) {
                self.item_codes.remove(&(item.blueprint, item.sequence));
            }
        }

        for sample in &plan.samples {
            self.samples.insert(sample.id, sample.clone());
        }
        for id in &plan.consumed_samples {
            self.samples.remove(id);
        }

        for progress in &plan.research {
            self.put_progress(progress.clone());
        }

        if let Some(group) = &plan.group {
            self.groups.insert(group.id, group.clone());
        }
        self.characters.insert(character.id, character);

        self.bump(&plan.locks);
        minted
    }

    pub(crate) fn bump(&self, keys: &BTreeSet<LockKey>) {
        for key in keys {
            *self.versions.entry(*key).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use downtime_core::test_utils::*;

    #[test]
    fn add_character_joins_group() {
        let world = World::new();
        world.add_group(group(10, &[]), 100);
        world.add_character(character(1, Some(GroupId(10))), 5);
        assert!(world.group(GroupId(10)).unwrap().is_member(CharacterId(1)));
        assert_eq!(world.ledger().available_funds(CharacterId(1)).unwrap(), 105);
    }

    #[test]
    fn items_get_sequential_codes() {
        let cat = fixture_catalog();
        let world = World::new();
        world.add_character(character(1, None), 0);
        let owner = Owner::Character(CharacterId(1));
        let a = world.add_item(rifle(), owner, vec![], 4);
        let b = world.add_item(rifle(), owner, vec![], 4);
        let c = world.add_item(vest(), owner, vec![], 4);
        assert_eq!((a.sequence, b.sequence, c.sequence), (1, 2, 1));
        assert_ne!(a.id, b.id);

        let found = world.find_by_code(&cat, "WP0012-002").unwrap();
        assert_eq!(found.id, b.id);
        assert!(world.character(CharacterId(1)).unwrap().holdings.has_item(c.id));
    }

    #[test]
    fn find_by_code_errors() {
        let cat = fixture_catalog();
        let world = World::new();
        assert!(matches!(
            world.find_by_code(&cat, "WP0012-009"),
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            world.find_by_code(&cat, "WP12-9"),
            Err(CatalogError::AmbiguousCode(_))
        ));
    }

    #[test]
    fn create_sample_goes_to_owner() {
        let world = World::new();
        world.add_group(group(10, &[]), 0);
        let sample = world.create_sample(NewSample {
            name: "nightshade".to_string(),
            science_type: ScienceType::Life,
            description: String::new(),
            tags: vec!["toxin".to_string()],
            owner: Owner::Group(GroupId(10)),
        });
        assert!(!sample.is_researched);
        assert!(world.group(GroupId(10)).unwrap().holdings.has_sample(sample.id));
        assert_eq!(world.sample(sample.id).unwrap().name, "nightshade");
    }

    #[test]
    fn versions_start_at_zero() {
        let world = World::new();
        let key = LockKey::Household(HouseholdId::Solo(CharacterId(1)));
        assert_eq!(world.version(key), 0);
        world.bump(&[key].into_iter().collect());
        assert_eq!(world.version(key), 1);
    }

    #[test]
    fn grants_bump_household() {
        let world = World::new();
        world.add_character(character(1, None), 0);
        assert!(world.grant_exotic(CharacterId(1), ether(), 2));
        assert!(world.grant_medicament(CharacterId(1), stimpak(), 1));
        assert!(!world.grant_exotic(CharacterId(9), ether(), 2));
        let ch = world.character(CharacterId(1)).unwrap();
        assert_eq!(ch.holdings.exotic_quantity(ether()), 2);
        assert_eq!(ch.holdings.medicaments.get(&stimpak()), Some(&1));
        let key = LockKey::Household(HouseholdId::Solo(CharacterId(1)));
        assert_eq!(world.version(key), 2);
    }
}
