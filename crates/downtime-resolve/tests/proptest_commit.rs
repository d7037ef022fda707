//! Property-based tests for submission commits.
//!
//! Random batches of purchases and maintenance against random balances:
//! a batch either commits in full for exactly its validated cost or leaves
//! every balance and inventory untouched.

use downtime_core::id::*;
use downtime_core::ledger::AccountId;
use downtime_core::test_utils::*;
use downtime_resolve::DowntimeAction;
use downtime_resolve::orchestrator::SubmitOutcome;
use downtime_resolve::test_utils::*;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
enum Step {
    Buy(u32),
    MaintainOwned(usize),
    BuyUnknown,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => (0..4u32).prop_map(Step::Buy),
        3 => (0..3usize).prop_map(Step::MaintainOwned),
        1 => Just(Step::BuyUnknown),
    ]
}

fn to_action(step: &Step, owned: &[ItemId]) -> DowntimeAction {
    match step {
        Step::Buy(b) => purchase(BlueprintId(*b)),
        Step::MaintainOwned(i) => maintain_own(owned[*i % owned.len()]),
        Step::BuyUnknown => purchase(BlueprintId(77)),
    }
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #[test]
    fn commit_is_all_or_nothing(
        balance in 0..600i64,
        steps in proptest::collection::vec(arb_step(), 0..4),
    ) {
        let world = solo_world(1, balance);
        let owned = vec![
            give_item(&world, 1, rifle()),
            give_item(&world, 1, vest()),
            give_item(&world, 1, cannon()),
        ];
        let orch = orchestrator(world);
        let actions: Vec<_> = steps.iter().map(|s| to_action(s, &owned)).collect();
        let before = orch.world().character(CharacterId(1)).unwrap();

        let validated = orch.validate(&submission("p", 1, actions.clone()));
        let outcome = orch.submit(&submission("p", 1, actions));
        let after = orch
            .world()
            .ledger()
            .balance(AccountId::Character(CharacterId(1)))
            .unwrap();

        match outcome {
            SubmitOutcome::Committed { record, replayed } => {
                prop_assert!(!replayed);
                prop_assert!(validated.is_ok());
                prop_assert_eq!(record.total_cost, validated.total_cost);
                prop_assert_eq!(after, balance - record.total_cost as i64);
                prop_assert!(after >= 0);
                prop_assert_eq!(orch.records().len(), 1);
            }
            SubmitOutcome::Rejected { errors, .. } => {
                prop_assert!(!errors.is_empty());
                prop_assert_eq!(after, balance);
                prop_assert!(orch.records().is_empty());
                let now = orch.world().character(CharacterId(1)).unwrap();
                prop_assert_eq!(now, before);
            }
        }
    }

    #[test]
    fn validation_is_repeatable(
        balance in 0..300i64,
        steps in proptest::collection::vec(arb_step(), 0..4),
    ) {
        let world = solo_world(1, balance);
        let owned = vec![give_item(&world, 1, rifle())];
        let orch = orchestrator(world);
        let actions: Vec<_> = steps.iter().map(|s| to_action(s, &owned)).collect();
        let sub = submission("p", 1, actions);
        let first = orch.validate(&sub);
        let second = orch.validate(&sub);
        prop_assert_eq!(first.total_cost, second.total_cost);
        prop_assert_eq!(first.errors, second.errors);
        prop_assert_eq!(first.results, second.results);
    }
}
