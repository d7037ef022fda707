//! Serde data file structs for campaign content.
//!
//! These structs define the on-disk format for the catalog (item types,
//! blueprints, modifications, exotic substances, factions, medicaments and
//! research projects) and the world seed. They are deserialized from RON,
//! JSON, or TOML files and then resolved into engine types by the loader.
//! Cross references are by name.

use downtime_core::catalog::ScienceType;
use downtime_core::character::ActionGrants;
use serde::Deserialize;

// ===========================================================================
// Catalog: item types, blueprints, modifications
// ===========================================================================

/// An item type definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemTypeData {
    pub name: String,
    /// Two letters, e.g. `WP`.
    pub prefix: String,
}

/// A blueprint definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct BlueprintData {
    pub name: String,
    pub item_type: String,
    pub number: u32,
    pub base_cost: u64,
    #[serde(default = "default_true")]
    pub purchaseable: bool,
    #[serde(default)]
    pub built_in_mods: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// A modification definition. An empty `item_types` list means the
/// modification fits every item type.
#[derive(Debug, Clone, Deserialize)]
pub struct ModificationData {
    pub name: String,
    #[serde(default)]
    pub item_types: Vec<String>,
}

// ===========================================================================
// Catalog: substances and factions
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ExoticData {
    pub name: String,
    pub science_type: ScienceType,
}

/// Factions and medicaments only carry a name.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedData {
    pub name: String,
}

// ===========================================================================
// Catalog: research projects
// ===========================================================================

/// What a requirement slot accepts, by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKindData {
    Science(ScienceType),
    Item(String),
    Exotic(String),
    Sample {
        tag: String,
        #[serde(default)]
        requires_researched: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequirementData {
    pub kind: RequirementKindData,
    pub amount: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageData {
    pub name: String,
    pub requirements: Vec<RequirementData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectData {
    pub name: String,
    pub stages: Vec<StageData>,
}

// ===========================================================================
// World seed
// ===========================================================================

/// The campaign's mutable state at startup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorldData {
    pub groups: Vec<GroupData>,
    pub characters: Vec<CharacterData>,
    pub periods: Vec<PeriodData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupData {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub bank: i64,
    #[serde(default)]
    pub items: Vec<ItemData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CharacterData {
    pub id: u32,
    #[serde(default)]
    pub player: u32,
    pub name: String,
    /// Group id, if any.
    #[serde(default)]
    pub group: Option<u32>,
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub known_mods: Vec<String>,
    #[serde(default)]
    pub grants: ActionGrants,
    #[serde(default)]
    pub items: Vec<ItemData>,
    /// `(exotic name, quantity)`
    #[serde(default)]
    pub exotics: Vec<(String, u32)>,
    /// `(medicament name, quantity)`
    #[serde(default)]
    pub medicaments: Vec<(String, u32)>,
    #[serde(default)]
    pub samples: Vec<SampleData>,
}

/// An item instance already held at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemData {
    pub blueprint: String,
    #[serde(default)]
    pub mods: Vec<String>,
    #[serde(default)]
    pub expiry: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleData {
    pub name: String,
    pub science_type: ScienceType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeriodData {
    pub id: u32,
    pub event_number: u32,
}
