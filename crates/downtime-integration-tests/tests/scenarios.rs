//! End-to-end downtime scenarios across periods.
//!
//! Each test drives the orchestrator the way a period's resolution run
//! would: seed a world, submit declarations, then read back records,
//! balances, research progress and packs.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use downtime_core::catalog::ScienceType;
use downtime_core::error::ErrorKind;
use downtime_core::id::*;
use downtime_core::inventory::Owner;
use downtime_core::ledger::AccountId;
use downtime_core::test_utils::*;
use downtime_resolve::SubmitOutcome;
use downtime_resolve::orchestrator::Orchestrator;
use downtime_resolve::test_utils::*;

fn balance(orch: &Orchestrator, id: u32) -> i64 {
    orch.world()
        .ledger()
        .balance(AccountId::Character(CharacterId(id)))
        .unwrap()
}

fn error_kinds(outcome: &SubmitOutcome) -> Vec<ErrorKind> {
    outcome.errors().iter().map(|e| e.kind).collect()
}

#[test]
fn overspend_rejects_the_whole_batch() {
    let world = solo_world(1, 50);
    let cannon_id = give_item(&world, 1, cannon());
    let orch = orchestrator(world);

    let outcome = orch.submit(&submission(
        "overspend",
        1,
        vec![purchase(rifle()), maintain_own(cannon_id)],
    ));

    assert!(!outcome.is_committed());
    assert!(error_kinds(&outcome).contains(&ErrorKind::InsufficientFunds));
    assert_eq!(balance(&orch, 1), 50);
    assert!(orch.records().is_empty());
    assert!(orch.find_by_code("WP0012-001", None).is_err());

    // Dropping the maintenance brings the batch under budget.
    let retry = orch.submit(&submission("overspend-2", 1, vec![purchase(rifle())]));
    assert!(retry.is_committed(), "{:?}", retry.errors());
    assert_eq!(balance(&orch, 1), 20);
}

#[test]
fn research_spans_periods() {
    let world = solo_world(1, 0);
    let rifle_id = give_item(&world, 1, rifle());
    give_exotic(&world, 1, ether(), 2);
    let sample = give_sample(&world, 1, "nightshade", ScienceType::Life, &["toxin"]);
    let orch = orchestrator(world);

    // Period 1 completes the first stage of the lens.
    let first = orch.submit(&submission(
        "p1",
        1,
        vec![
            contribute_self(lens(), &[(ether(), 2)], &[rifle_id], &[]),
            research_project(ScienceType::Etheric, lens(), None),
        ],
    ));
    assert!(first.is_committed(), "{:?}", first.errors());

    // Period 2: the toxin sample has not been researched yet.
    orch.world().open_period(PeriodId(2), EVENT + 1);
    let mut early = submission("p2", 1, vec![contribute_self(lens(), &[], &[], &[sample])]);
    early.period = PeriodId(2);
    let outcome = orch.submit(&early);
    assert_eq!(error_kinds(&outcome), vec![ErrorKind::UnmetRequirement]);
    assert!(orch.world().sample(sample).is_some());

    // Researching it first in the same batch satisfies the slot.
    let mut fixed = submission(
        "p2-fixed",
        1,
        vec![
            research_sample(ScienceType::Life, sample),
            contribute_self(lens(), &[], &[], &[sample]),
            research_project(ScienceType::Life, lens(), None),
        ],
    );
    fixed.period = PeriodId(2);
    let outcome = orch.submit(&fixed);
    assert!(outcome.is_committed(), "{:?}", outcome.errors());
    let progress = orch.world().progress(lens(), CharacterId(1)).unwrap();
    assert!(progress.is_completed());
    assert!(orch.world().sample(sample).is_none());
    assert_eq!(orch.records().for_character(CharacterId(1)).len(), 2);
}

#[test]
fn resubmitting_the_same_key_is_idempotent() {
    let orch = orchestrator(solo_world(1, 100));
    let sub = submission("once", 1, vec![purchase(rifle()), purchase(sword())]);

    let first = orch.submit(&sub);
    let second = orch.submit(&sub);

    match (&first, &second) {
        (
            SubmitOutcome::Committed { record: a, replayed: false },
            SubmitOutcome::Committed { record: b, replayed: true },
        ) => assert_eq!(a, b),
        other => panic!("unexpected outcomes: {other:?}"),
    }
    assert_eq!(balance(&orch, 1), 50);
    assert_eq!(orch.records().len(), 1);

    // Same key, different payload.
    let changed = submission("once", 1, vec![purchase(rifle())]);
    assert_eq!(error_kinds(&orch.submit(&changed)), vec![ErrorKind::DuplicateSubmission]);
    assert_eq!(balance(&orch, 1), 50);
}

#[test]
fn group_pack_round_trip() {
    let world = group_world(10, 200, &[(1, 0), (2, 20)]);
    let vest_id = give_group_item(&world, 10, vest());
    let orch = orchestrator(world);

    let outcome = orch.submit(&submission("g1", 1, vec![maintain_group(vest_id)]));
    assert!(outcome.is_committed(), "{:?}", outcome.errors());

    let owner = Owner::Group(GroupId(10));
    let pack = orch.generate_pack(owner, PERIOD).unwrap();
    assert!(!pack.is_complete());
    assert_eq!(pack.contents.energy_chits, 188);

    let flags: BTreeMap<String, bool> = pack
        .outstanding()
        .into_iter()
        .map(|k| (k.to_string(), true))
        .collect();
    let done = orch.update_pack(owner, PERIOD, &flags).unwrap();
    assert!(done.is_complete());
    assert_eq!(orch.view_pack(owner, PERIOD).unwrap(), done);
}

#[test]
fn records_survive_a_snapshot() {
    let orch = orchestrator(solo_world(1, 100));
    let sub = submission("snap", 1, vec![purchase(rifle())]);
    assert!(orch.submit(&sub).is_committed());

    let bytes = orch.records().export().unwrap();
    let restored = orchestrator(solo_world(1, 100))
        .with_records(downtime_resolve::RecordStore::import(&bytes).unwrap());

    let replay = restored.submit(&sub);
    assert!(matches!(replay, SubmitOutcome::Committed { replayed: true, .. }));
    assert_eq!(balance(&restored, 1), 100);
}

// ---------------------------------------------------------------------------
// Campaign loaded from data files
// ---------------------------------------------------------------------------

fn campaign_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("downtime_scenario_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("item_types.ron"),
        r#"[(name: "weapon", prefix: "WP"), (name: "armour", prefix: "AR")]"#,
    )
    .unwrap();
    fs::write(
        dir.join("blueprints.ron"),
        r#"[
            (name: "rifle", item_type: "weapon", number: 12, base_cost: 30),
            (name: "vest", item_type: "armour", number: 7, base_cost: 120),
        ]"#,
    )
    .unwrap();
    fs::write(
        dir.join("modifications.ron"),
        r#"[(name: "plating", item_types: ["armour"])]"#,
    )
    .unwrap();
    fs::write(
        dir.join("world.toml"),
        r#"
[[characters]]
id = 1
name = "Ada"
balance = 200
known_mods = ["plating"]

[characters.grants]
engineering = 2
engineering_mods = 1

[[characters.items]]
blueprint = "vest"
expiry = 5

[[periods]]
id = 1
event_number = 5
"#,
    )
    .unwrap();
    dir
}

#[test]
fn loaded_campaign_resolves_a_submission() {
    let dir = campaign_dir();
    let orch = downtime_data::load_campaign(&dir)
        .unwrap()
        .into_orchestrator()
        .unwrap();

    let vest_id = orch.find_by_code("AR0007-001", Some(CharacterId(1))).unwrap().id;
    let outcome = orch.submit(&submission(
        "file",
        1,
        vec![purchase(BlueprintId(0)), modify_own(vest_id, ModId(0))],
    ));
    assert!(outcome.is_committed(), "{:?}", outcome.errors());
    assert_eq!(balance(&orch, 1), 200 - 30 - 60);
    let record = outcome.record().unwrap();
    assert_eq!(record.results[0], "Purchased: rifle (WP0012-001)");
    let _ = fs::remove_dir_all(&dir);
}
