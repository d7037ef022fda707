//! Shared test helpers: seeded worlds and action builders.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so the
//! integration test crate can use them too.

use downtime_core::catalog::ScienceType;
use downtime_core::config::EngineConfig;
use downtime_core::id::*;
use downtime_core::inventory::Owner;
use downtime_core::test_utils::{character, fixture_catalog, group};

use crate::action::*;
use crate::orchestrator::Orchestrator;
use crate::world::{NewSample, World};

pub const PERIOD: PeriodId = PeriodId(1);
pub const EVENT: u32 = 5;

// ===========================================================================
// Worlds
// ===========================================================================

/// One ungrouped character with `balance` chits and [`PERIOD`] open.
pub fn solo_world(id: u32, balance: i64) -> World {
    let world = World::new();
    world.add_character(character(id, None), balance);
    world.open_period(PERIOD, EVENT);
    world
}

/// A group with a `bank` and the given `(character, balance)` members.
pub fn group_world(group_id: u32, bank: i64, members: &[(u32, i64)]) -> World {
    let world = World::new();
    world.add_group(group(group_id, &[]), bank);
    for (id, balance) in members {
        world.add_character(character(*id, Some(GroupId(group_id))), *balance);
    }
    world.open_period(PERIOD, EVENT);
    world
}

pub fn orchestrator(world: World) -> Orchestrator {
    Orchestrator::new(fixture_catalog(), EngineConfig::default(), world)
        .expect("default config must be valid")
}

pub fn submission(key: &str, character: u32, actions: Vec<DowntimeAction>) -> Submission {
    Submission {
        key: key.to_string(),
        character: CharacterId(character),
        period: PERIOD,
        actions,
    }
}

// ===========================================================================
// Holdings
// ===========================================================================

pub fn give_item(world: &World, character: u32, blueprint: BlueprintId) -> ItemId {
    give_item_with(world, character, blueprint, Vec::new())
}

pub fn give_item_with(
    world: &World,
    character: u32,
    blueprint: BlueprintId,
    mods: Vec<ModId>,
) -> ItemId {
    world
        .add_item(blueprint, Owner::Character(CharacterId(character)), mods, EVENT)
        .id
}

pub fn give_group_item(world: &World, group: u32, blueprint: BlueprintId) -> ItemId {
    world
        .add_item(blueprint, Owner::Group(GroupId(group)), Vec::new(), EVENT)
        .id
}

pub fn give_exotic(world: &World, character: u32, exotic: ExoticId, quantity: u32) {
    assert!(world.grant_exotic(CharacterId(character), exotic, quantity));
}

pub fn give_sample(
    world: &World,
    character: u32,
    name: &str,
    science_type: ScienceType,
    tags: &[&str],
) -> SampleId {
    world
        .create_sample(NewSample {
            name: name.to_string(),
            science_type,
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            owner: Owner::Character(CharacterId(character)),
        })
        .id
}

// ===========================================================================
// Action builders
// ===========================================================================

pub fn purchase(blueprint: BlueprintId) -> DowntimeAction {
    DowntimeAction::Purchase(PurchasePayload {
        blueprint_id: Some(blueprint),
        ..Default::default()
    })
}

fn own_item(item: ItemId) -> EngineeringPayload {
    EngineeringPayload {
        source: Some(EngineeringSource::Own),
        item_id: Some(item),
        ..Default::default()
    }
}

pub fn maintain_own(item: ItemId) -> DowntimeAction {
    DowntimeAction::EngineeringMaintain(own_item(item))
}

pub fn modify_own(item: ItemId, m: ModId) -> DowntimeAction {
    DowntimeAction::EngineeringModify(EngineeringPayload {
        mod_id: Some(m),
        ..own_item(item)
    })
}

/// Modify the item an earlier purchase slot of `blueprint` buys.
pub fn modify_new(blueprint: BlueprintId, m: ModId) -> DowntimeAction {
    DowntimeAction::EngineeringModify(EngineeringPayload {
        source: Some(EngineeringSource::Own),
        blueprint_id: Some(blueprint),
        mod_id: Some(m),
        ..Default::default()
    })
}

pub fn modify_group(item: ItemId, m: ModId) -> DowntimeAction {
    DowntimeAction::EngineeringModify(EngineeringPayload {
        source: Some(EngineeringSource::Group),
        item_id: Some(item),
        mod_id: Some(m),
        ..Default::default()
    })
}

pub fn maintain_group(item: ItemId) -> DowntimeAction {
    DowntimeAction::EngineeringMaintain(EngineeringPayload {
        source: Some(EngineeringSource::Group),
        item_id: Some(item),
        ..Default::default()
    })
}

pub fn maintain_manual(code: &str) -> DowntimeAction {
    DowntimeAction::EngineeringMaintain(EngineeringPayload {
        source: Some(EngineeringSource::Manual),
        full_code: Some(code.to_string()),
        ..Default::default()
    })
}

pub fn learn(m: ModId) -> DowntimeAction {
    DowntimeAction::LearnModification(ModificationPayload {
        mod_id: Some(m),
        direction: Some(ModificationDirection::Learning),
    })
}

pub fn forget(m: ModId) -> DowntimeAction {
    DowntimeAction::ForgetModification(ModificationPayload {
        mod_id: Some(m),
        direction: Some(ModificationDirection::Forgetting),
    })
}

pub fn synthesize(science_type: ScienceType) -> DowntimeAction {
    DowntimeAction::ScienceSynthesize(SynthesizePayload {
        science_type: Some(science_type),
    })
}

pub fn theorise(name: &str, description: &str) -> DowntimeAction {
    DowntimeAction::ScienceTheorise(TheorisePayload {
        science_type: Some(ScienceType::Generic),
        name: Some(name.to_string()),
        description: Some(description.to_string()),
    })
}

pub fn research_sample(science_type: ScienceType, sample: SampleId) -> DowntimeAction {
    DowntimeAction::ScienceResearchSample(ResearchSamplePayload {
        science_type: Some(science_type),
        sample_id: Some(sample),
    })
}

pub fn research_project(
    science_type: ScienceType,
    project: ProjectId,
    target: Option<ScienceType>,
) -> DowntimeAction {
    DowntimeAction::ScienceResearchProject(ResearchProjectPayload {
        science_type: Some(science_type),
        project_id: Some(project),
        target_science_type: target,
        ..Default::default()
    })
}

pub fn teach(project: ProjectId, target: u32) -> DowntimeAction {
    DowntimeAction::ScienceTeachInvention(TeachPayload {
        science_type: Some(ScienceType::Generic),
        project_id: Some(project),
        target_character_id: Some(CharacterId(target)),
    })
}

fn exotics(list: &[(ExoticId, u32)]) -> Vec<ContributedExotic> {
    list.iter()
        .map(|(id, quantity)| ContributedExotic {
            id: *id,
            quantity: *quantity,
        })
        .collect()
}

pub fn contribute_self(
    project: ProjectId,
    given: &[(ExoticId, u32)],
    items: &[ItemId],
    samples: &[SampleId],
) -> DowntimeAction {
    DowntimeAction::ResearchContribute(ContributePayload {
        project_id: Some(project),
        support_target: Some(SupportTarget::Own),
        support_target_id: None,
        contributed_exotics: exotics(given),
        contributed_items: items.to_vec(),
        contributed_samples: samples.to_vec(),
    })
}

pub fn contribute_for(
    target: SupportTarget,
    character: u32,
    project: ProjectId,
    given: &[(ExoticId, u32)],
) -> DowntimeAction {
    DowntimeAction::ResearchContribute(ContributePayload {
        project_id: Some(project),
        support_target: Some(target),
        support_target_id: Some(CharacterId(character)),
        contributed_exotics: exotics(given),
        ..Default::default()
    })
}

pub fn reputation(faction: FactionId, question: &str) -> DowntimeAction {
    DowntimeAction::ReputationQuery(ReputationPayload {
        faction_id: Some(faction),
        question: Some(question.to_string()),
    })
}
