//! Shared test helpers for unit and integration tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so downstream
//! crates can enable them through the `test-utils` feature.

use std::collections::BTreeMap;

use crate::catalog::*;
use crate::character::{ActionGrants, Character, Group};
use crate::id::*;
use crate::inventory::Holdings;

// ===========================================================================
// Fixture ids (registration order in `fixture_catalog`)
// ===========================================================================

pub fn weapon() -> ItemTypeId {
    ItemTypeId(0)
}
pub fn armour() -> ItemTypeId {
    ItemTypeId(1)
}

pub fn scope() -> ModId {
    ModId(0)
}
pub fn plating() -> ModId {
    ModId(1)
}
pub fn rune() -> ModId {
    ModId(2)
}

/// WP0012, base cost 30.
pub fn rifle() -> BlueprintId {
    BlueprintId(0)
}
/// WP0003, base cost 20, ships with a rune.
pub fn sword() -> BlueprintId {
    BlueprintId(1)
}
/// AR0007, base cost 120: modify 60, maintain 12.
pub fn vest() -> BlueprintId {
    BlueprintId(2)
}
/// WP0040, base cost 250: maintain 25.
pub fn cannon() -> BlueprintId {
    BlueprintId(3)
}
/// WP0099, not purchaseable.
pub fn relic() -> BlueprintId {
    BlueprintId(4)
}

pub fn ether() -> ExoticId {
    ExoticId(0)
}
pub fn bloodmoss() -> ExoticId {
    ExoticId(1)
}
pub fn ironsand() -> ExoticId {
    ExoticId(2)
}

pub fn guild() -> FactionId {
    FactionId(0)
}
pub fn stimpak() -> MedicamentId {
    MedicamentId(0)
}

/// Two stages: exotics + weapon + etheric science, then a researched toxin
/// sample + life science.
pub fn lens() -> ProjectId {
    ProjectId(0)
}
/// One stage of two generic science credits.
pub fn serum() -> ProjectId {
    ProjectId(1)
}

// ===========================================================================
// Catalog
// ===========================================================================

fn blueprint(name: &str, item_type: ItemTypeId, number: u32, base_cost: u64) -> BlueprintDef {
    BlueprintDef {
        name: name.to_string(),
        item_type,
        number,
        base_cost,
        purchaseable: true,
        built_in_mods: Vec::new(),
    }
}

fn req(kind: RequirementKind, amount: u32) -> RequirementDef {
    RequirementDef { kind, amount }
}

pub fn fixture_builder() -> CatalogBuilder {
    let mut b = CatalogBuilder::new();
    let weapon = b.register_item_type("weapon", "WP");
    let armour = b.register_item_type("armour", "AR");

    b.register_mod("scope", vec![weapon]);
    b.register_mod("plating", vec![armour]);
    let rune = b.register_mod("rune", vec![]);

    b.register_blueprint(blueprint("rifle", weapon, 12, 30));
    b.register_blueprint(BlueprintDef {
        built_in_mods: vec![rune],
        ..blueprint("sword", weapon, 3, 20)
    });
    b.register_blueprint(blueprint("vest", armour, 7, 120));
    b.register_blueprint(blueprint("cannon", weapon, 40, 250));
    b.register_blueprint(BlueprintDef {
        purchaseable: false,
        ..blueprint("relic", weapon, 99, 500)
    });

    let ether = b.register_exotic("ether", ScienceType::Etheric);
    b.register_exotic("bloodmoss", ScienceType::Life);
    b.register_exotic("ironsand", ScienceType::Corporeal);

    b.register_faction("guild");
    b.register_medicament("stimpak");

    b.register_project(
        "lens",
        vec![
            StageDef {
                name: "grind".to_string(),
                requirements: vec![
                    req(RequirementKind::Exotic(ether), 2),
                    req(RequirementKind::Item(weapon), 1),
                    req(RequirementKind::Science(ScienceType::Etheric), 1),
                ],
            },
            StageDef {
                name: "focus".to_string(),
                requirements: vec![
                    req(
                        RequirementKind::Sample {
                            tag: "toxin".to_string(),
                            requires_researched: true,
                        },
                        1,
                    ),
                    req(RequirementKind::Science(ScienceType::Life), 1),
                ],
            },
        ],
    );
    b.register_project(
        "serum",
        vec![StageDef {
            name: "brew".to_string(),
            requirements: vec![req(RequirementKind::Science(ScienceType::Generic), 2)],
        }],
    );
    b
}

pub fn fixture_catalog() -> Catalog {
    fixture_builder()
        .build()
        .expect("fixture catalog must be valid")
}

// ===========================================================================
// Characters
// ===========================================================================

/// Generous grants: enough slots that tests only hit limits on purpose.
pub fn full_grants() -> ActionGrants {
    ActionGrants {
        engineering: 4,
        engineering_mods: 4,
        science: ScienceType::ALL.iter().map(|t| (*t, 2)).collect::<BTreeMap<_, _>>(),
    }
}

pub fn character(id: u32, group: Option<GroupId>) -> Character {
    Character {
        id: CharacterId(id),
        player: PlayerId(id),
        name: format!("character-{id}"),
        group,
        holdings: Holdings::default(),
        known_mods: vec![scope(), plating(), rune()],
        grants: full_grants(),
    }
}

pub fn group(id: u32, members: &[u32]) -> Group {
    Group {
        id: GroupId(id),
        name: format!("group-{id}"),
        members: members.iter().map(|m| CharacterId(*m)).collect(),
        holdings: Holdings::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_ids_match_registration() {
        let cat = fixture_catalog();
        assert_eq!(cat.blueprint_id("rifle"), Some(rifle()));
        assert_eq!(cat.blueprint_id("relic"), Some(relic()));
        assert_eq!(cat.mod_id("rune"), Some(rune()));
        assert_eq!(cat.exotic_id("ironsand"), Some(ironsand()));
        assert_eq!(cat.project_id("serum"), Some(serum()));
        assert_eq!(cat.faction_id("guild"), Some(guild()));
        assert_eq!(cat.medicament_id("stimpak"), Some(stimpak()));
        assert_eq!(cat.item_type_id("armour"), Some(armour()));
    }

    #[test]
    fn fixture_costs() {
        use crate::cost::EngineeringKind::*;
        let cat = fixture_catalog();
        assert_eq!(cat.engineering_cost(Modify, vest(), 0).unwrap(), 60);
        assert_eq!(cat.engineering_cost(Maintain, cannon(), 0).unwrap(), 25);
    }
}
