//! Downtime Resolution Orchestrator.
//!
//! [`Orchestrator::submit`] runs one submission through
//! `Draft -> Validating -> Committed | Rejected`:
//!
//! 1. A key seen before is answered from the record it produced (same
//!    payload) or refused as a duplicate (different payload).
//! 2. The batch is validated against a snapshot of the world; any error
//!    rejects it with every error found.
//! 3. The plan is committed under the locks of every key it read. Each
//!    key's version must still match what validation saw; the ledger is
//!    debited once for the aggregate cost; then inventories and research
//!    are written and one record is appended.
//!
//! A commit that finds a changed version is abandoned before anything is
//! written and the submission is validated again from fresh state, up to
//! `max_commit_attempts` times.

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use downtime_core::catalog::Catalog;
use downtime_core::config::{ConfigError, EngineConfig};
use downtime_core::cost::EngineeringKind;
use downtime_core::error::{ActionError, ErrorKind};
use downtime_core::id::*;
use downtime_core::inventory::{ItemInstance, Owner};
use downtime_core::ledger::{AccountId, Debit, LedgerError};
use downtime_research::{ResearchError, SlotProgress, check_teaching};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::action::{ActionCategory, Submission};
use crate::lock::{HouseholdId, LockKey, LockTable};
use crate::pack::{PackError, PackFulfilment, PackTracker};
use crate::record::*;
use crate::validation::{ResolutionPlan, ValidationOutcome, ValidationResult, validate_submission};
use crate::world::{NewSample, PendingMint, World};

// ---------------------------------------------------------------------------
// Outcomes and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    #[default]
    Draft,
    Validating,
    Committed,
    Rejected,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Committed {
        record: ResolutionRecord,
        /// True when the key had already been committed and nothing new was
        /// written.
        replayed: bool,
    },
    Rejected {
        errors: Vec<ActionError>,
        results: Vec<ValidationResult>,
        /// True when validation passed but the commit itself failed.
        at_commit: bool,
    },
}

impl SubmitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, SubmitOutcome::Committed { .. })
    }

    pub fn record(&self) -> Option<&ResolutionRecord> {
        match self {
            SubmitOutcome::Committed { record, .. } => Some(record),
            SubmitOutcome::Rejected { .. } => None,
        }
    }

    pub fn errors(&self) -> &[ActionError] {
        match self {
            SubmitOutcome::Committed { .. } => &[],
            SubmitOutcome::Rejected { errors, .. } => errors,
        }
    }

    fn rejected(error: ActionError, at_commit: bool) -> Self {
        SubmitOutcome::Rejected {
            errors: vec![error],
            results: Vec::new(),
            at_commit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("idempotency key `{0}` was already used for a different submission")]
    Duplicate(String),
    #[error(
        "downtime for character {} in period {} is already committed as record {}",
        .character.0, .period.0, .record.0
    )]
    AlreadyCommitted {
        character: CharacterId,
        period: PeriodId,
        record: RecordId,
    },
    #[error("{0:?} changed after validation")]
    Concurrent(LockKey),
    #[error("debit refused at commit: {0}")]
    Funds(LedgerError),
    #[error("ledger refused credit: {0}")]
    Credit(LedgerError),
    #[error("record {} does not exist", .0.0)]
    UnknownRecord(RecordId),
    #[error("total cost {0} cannot be debited")]
    CostOutOfRange(u64),
}

impl CommitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommitError::Duplicate(_) | CommitError::AlreadyCommitted { .. } => {
                ErrorKind::DuplicateSubmission
            }
            CommitError::Concurrent(_) => ErrorKind::ConcurrentModification,
            CommitError::Funds(e) | CommitError::Credit(e) => e.kind(),
            CommitError::UnknownRecord(_) => ErrorKind::NotFound,
            CommitError::CostOutOfRange(_) => ErrorKind::InvalidPayload,
        }
    }

    pub fn to_action_error(&self) -> ActionError {
        ActionError::new(self.kind(), self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Query shapes
// ---------------------------------------------------------------------------

/// Answer to "what does this character still need for this project?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub found: bool,
    pub valid: bool,
    pub error: Option<String>,
    pub project_name: Option<String>,
    pub character_name: Option<String>,
    /// Active stage, or `None` when not started or complete.
    pub stage: Option<usize>,
    pub stage_requirements: Vec<SlotProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeachCheck {
    pub valid: bool,
    pub character_name: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineeringTarget {
    Item(ItemId),
    Blueprint(BlueprintId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub name: String,
    pub full_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSummary {
    pub id: SampleId,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    catalog: Catalog,
    config: EngineConfig,
    world: World,
    locks: LockTable,
    records: RecordStore,
    packs: PackTracker,
    /// Idempotency key -> (payload fingerprint, record).
    keys: DashMap<String, (String, RecordId)>,
    committed: DashMap<(CharacterId, PeriodId), RecordId>,
    states: DashMap<(CharacterId, PeriodId), SubmissionState>,
}

impl Orchestrator {
    pub fn new(catalog: Catalog, config: EngineConfig, world: World) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            catalog,
            config,
            world,
            locks: LockTable::new(),
            records: RecordStore::new(),
            packs: PackTracker::new(),
            keys: DashMap::new(),
            committed: DashMap::new(),
            states: DashMap::new(),
        })
    }

    /// Replace the record store (e.g. from a snapshot) and rebuild the
    /// idempotency and per-period indices from it.
    pub fn with_records(mut self, records: RecordStore) -> Self {
        self.keys.clear();
        self.committed.clear();
        self.states.clear();
        for record in records.all() {
            if record.is_compensation() {
                continue;
            }
            self.keys
                .insert(record.key.clone(), (record.fingerprint.clone(), record.id));
            self.committed
                .insert((record.character, record.period), record.id);
            self.states
                .insert((record.character, record.period), SubmissionState::Committed);
        }
        self.records = records;
        self
    }

    /// Replace the pack tracker (e.g. with packs saved earlier).
    pub fn with_packs(mut self, packs: PackTracker) -> Self {
        self.packs = packs;
        self
    }

    pub fn packs(&self) -> &PackTracker {
        &self.packs
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn record(&self, id: RecordId) -> Option<ResolutionRecord> {
        self.records.get(id)
    }

    pub fn state(&self, character: CharacterId, period: PeriodId) -> SubmissionState {
        self.states
            .get(&(character, period))
            .map(|s| *s)
            .unwrap_or_default()
    }

    fn set_state(&self, character: CharacterId, period: PeriodId, state: SubmissionState) {
        self.states
            .entry((character, period))
            .and_modify(|s| {
                if *s != SubmissionState::Committed {
                    *s = state;
                }
            })
            .or_insert(state);
    }

    // -----------------------------------------------------------------------
    // Validation and submission
    // -----------------------------------------------------------------------

    /// Validate without committing. Never writes anything.
    pub fn validate(&self, submission: &Submission) -> ValidationOutcome {
        validate_submission(&self.catalog, &self.config, &self.world, submission)
    }

    /// Validate a batch of independent submissions.
    pub fn validate_all(&self, submissions: &[Submission]) -> Vec<ValidationOutcome> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            submissions.par_iter().map(|s| self.validate(s)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            submissions.iter().map(|s| self.validate(s)).collect()
        }
    }

    fn replay(&self, key: &str, fingerprint: &str) -> Option<SubmitOutcome> {
        let (stored, id) = self.keys.get(key).map(|e| e.value().clone())?;
        if stored != fingerprint {
            let err = CommitError::Duplicate(key.to_string());
            return Some(SubmitOutcome::rejected(err.to_action_error(), false));
        }
        let record = self.records.get(id)?;
        debug!(key, record = id.0, "submission replayed");
        Some(SubmitOutcome::Committed {
            record,
            replayed: true,
        })
    }

    pub fn submit(&self, submission: &Submission) -> SubmitOutcome {
        let fingerprint = match submission.fingerprint() {
            Ok(f) => f,
            Err(e) => {
                let err = ActionError::new(
                    ErrorKind::InvalidPayload,
                    format!("submission cannot be encoded: {e}"),
                );
                return SubmitOutcome::rejected(err, false);
            }
        };
        if let Some(outcome) = self.replay(&submission.key, &fingerprint) {
            return outcome;
        }
        let (character, period) = (submission.character, submission.period);
        if let Some(record) = self.committed.get(&(character, period)).map(|r| *r) {
            let err = CommitError::AlreadyCommitted {
                character,
                period,
                record,
            };
            return SubmitOutcome::rejected(err.to_action_error(), false);
        }

        self.set_state(character, period, SubmissionState::Validating);
        let attempts = self.config.max_commit_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.validate(submission);
            let Some(plan) = outcome.plan else {
                warn!(
                    character = character.0,
                    period = period.0,
                    key = %submission.key,
                    errors = outcome.errors.len(),
                    "submission rejected"
                );
                self.set_state(character, period, SubmissionState::Rejected);
                return SubmitOutcome::Rejected {
                    errors: outcome.errors,
                    results: outcome.results,
                    at_commit: false,
                };
            };

            match self.commit(&plan) {
                Ok((record, replayed)) => {
                    self.set_state(character, period, SubmissionState::Committed);
                    return SubmitOutcome::Committed { record, replayed };
                }
                Err(CommitError::Concurrent(key)) if attempt < attempts => {
                    debug!(
                        character = character.0,
                        attempt,
                        key = ?key,
                        "state changed during commit, revalidating"
                    );
                }
                Err(err) => {
                    warn!(
                        character = character.0,
                        period = period.0,
                        key = %submission.key,
                        error = %err,
                        "commit failed"
                    );
                    self.set_state(character, period, SubmissionState::Rejected);
                    return SubmitOutcome::Rejected {
                        errors: vec![err.to_action_error()],
                        results: outcome.results,
                        at_commit: true,
                    };
                }
            }
        }
    }

    /// Write a plan. Returns the record and whether it already existed.
    fn commit(&self, plan: &ResolutionPlan) -> Result<(ResolutionRecord, bool), CommitError> {
        self.locks.with_locks(&plan.locks, || {
            let slot = match self.keys.entry(plan.key.clone()) {
                Entry::Occupied(e) => {
                    let (fingerprint, id) = e.get().clone();
                    if fingerprint != plan.fingerprint {
                        return Err(CommitError::Duplicate(plan.key.clone()));
                    }
                    let record = self.records.get(id).ok_or(CommitError::UnknownRecord(id))?;
                    return Ok((record, true));
                }
                Entry::Vacant(v) => v,
            };

            let character = plan.character.id;
            if let Some(record) = self.committed.get(&(character, plan.period)).map(|r| *r) {
                return Err(CommitError::AlreadyCommitted {
                    character,
                    period: plan.period,
                    record,
                });
            }
            for (key, seen) in &plan.versions {
                if self.world.version(*key) != *seen {
                    return Err(CommitError::Concurrent(*key));
                }
            }

            let amount = i64::try_from(plan.total_cost)
                .map_err(|_| CommitError::CostOutOfRange(plan.total_cost))?;
            let memo = format!("downtime {} (period {})", plan.key, plan.period.0);
            let debit = self
                .world
                .ledger()
                .commit(character, amount, self.config.draw_order, &memo)
                .map_err(CommitError::Funds)?;

            let minted = self.world.apply(plan);
            let record = self
                .records
                .append(|id| self.build_record(id, plan, debit, &minted));
            slot.insert((plan.fingerprint.clone(), record.id));
            self.committed.insert((character, plan.period), record.id);

            info!(
                character = character.0,
                period = plan.period.0,
                key = %plan.key,
                cost = plan.total_cost,
                record = record.id.0,
                "downtime committed"
            );
            Ok((record, false))
        })
    }

    fn balances(&self, character: CharacterId, group: Option<GroupId>) -> Balances {
        let ledger = self.world.ledger();
        Balances {
            personal: ledger.balance(AccountId::Character(character)).unwrap_or(0),
            group: group.map(|g| ledger.balance(AccountId::Group(g)).unwrap_or(0)),
        }
    }

    fn item_card(&self, item: &ItemInstance, minted: bool) -> ItemCard {
        ItemCard {
            item: item.id,
            blueprint: item.blueprint,
            full_code: self
                .catalog
                .full_code(item.blueprint, item.sequence)
                .unwrap_or_default(),
            name: self
                .catalog
                .get_blueprint(item.blueprint)
                .map(|b| b.name.clone())
                .unwrap_or_default(),
            owner: item.owner,
            mods: item.mods.clone(),
            expiry: item.expiry,
            minted,
        }
    }

    fn build_record(
        &self,
        id: RecordId,
        plan: &ResolutionPlan,
        debit: Debit,
        minted: &[(PendingMint, ItemInstance, String)],
    ) -> ResolutionRecord {
        let character = &plan.character;

        let mut items: Vec<ItemCard> = minted
            .iter()
            .map(|(_, item, _)| self.item_card(item, true))
            .collect();
        items.extend(
            plan.items
                .iter()
                .filter(|item| !plan.consumed_items.contains(&item.id))
                .map(|item| self.item_card(item, false)),
        );

        let samples = plan
            .researched_samples
            .iter()
            .filter_map(|sid| plan.samples.iter().find(|s| s.id == *sid))
            .map(|s| SampleCard {
                sample: s.id,
                name: s.name.clone(),
                owner: s.owner,
            })
            .collect();

        let medicaments = character
            .holdings
            .medicaments
            .iter()
            .map(|(m, q)| MedicamentStack {
                medicament: *m,
                quantity: *q,
            })
            .collect();

        let results = plan
            .actions
            .iter()
            .map(|a| {
                let code = (a.category == ActionCategory::Purchase)
                    .then(|| minted.iter().find(|(p, _, _)| p.slot == a.slot))
                    .flatten()
                    .map(|(_, _, code)| code);
                match code {
                    Some(code) => format!("{} ({code})", a.description),
                    None => a.description.clone(),
                }
            })
            .collect();

        ResolutionRecord {
            id,
            key: plan.key.clone(),
            fingerprint: plan.fingerprint.clone(),
            character: character.id,
            group: character.group,
            period: plan.period,
            event_number: plan.event_number,
            kind: RecordKind::Resolution,
            actions: plan.actions.clone(),
            total_cost: plan.total_cost,
            debit,
            balances_after: self.balances(character.id, character.group),
            stage_deltas: plan.stage_deltas.clone(),
            items,
            produced_exotics: plan.produced_exotics.clone(),
            samples,
            medicaments,
            reviews: plan.reviews.clone(),
            results,
        }
    }

    // -----------------------------------------------------------------------
    // Corrections
    // -----------------------------------------------------------------------

    /// Refund part of a record's cost by appending a compensating record.
    pub fn compensate(
        &self,
        record: RecordId,
        refund: i64,
        note: &str,
    ) -> Result<ResolutionRecord, CommitError> {
        let original = self
            .records
            .get(record)
            .ok_or(CommitError::UnknownRecord(record))?;
        let household = match original.group {
            Some(g) => HouseholdId::Group(g),
            None => HouseholdId::Solo(original.character),
        };
        let keys = BTreeSet::from([LockKey::Household(household)]);

        self.locks.with_locks(&keys, || {
            self.world
                .ledger()
                .credit(
                    AccountId::Character(original.character),
                    refund,
                    &format!("compensation for record {}: {note}", record.0),
                )
                .map_err(CommitError::Credit)?;
            self.world.bump(&keys);

            let compensation = self.records.append(|id| ResolutionRecord {
                id,
                key: format!("compensation-{}-{}", record.0, id.0),
                fingerprint: String::new(),
                character: original.character,
                group: original.group,
                period: original.period,
                event_number: original.event_number,
                kind: RecordKind::Compensation {
                    corrects: record,
                    refund,
                    note: note.to_string(),
                },
                actions: Vec::new(),
                total_cost: 0,
                debit: Debit::default(),
                balances_after: self.balances(original.character, original.group),
                stage_deltas: Vec::new(),
                items: Vec::new(),
                produced_exotics: Vec::new(),
                samples: Vec::new(),
                medicaments: Vec::new(),
                reviews: Vec::new(),
                results: vec![format!("Refunded {refund} ec: {note}")],
            });
            info!(
                character = original.character.0,
                corrects = record.0,
                refund,
                record = compensation.id.0,
                "compensation recorded"
            );
            Ok(compensation)
        })
    }

    // -----------------------------------------------------------------------
    // Read-only queries
    // -----------------------------------------------------------------------

    pub fn project_info(&self, project: ProjectId, character: CharacterId) -> ProjectInfo {
        let mut info = ProjectInfo {
            found: false,
            valid: false,
            error: None,
            project_name: None,
            character_name: None,
            stage: None,
            stage_requirements: Vec::new(),
        };
        let def = match self.catalog.get_research_project(project) {
            Ok(def) => def,
            Err(e) => {
                info.error = Some(e.to_string());
                return info;
            }
        };
        info.found = true;
        info.project_name = Some(def.name.clone());

        let Some(ch) = self.world.character(character) else {
            info.error = Some(format!("character {} not found", character.0));
            return info;
        };
        info.character_name = Some(ch.name.clone());

        match self.world.progress(project, character) {
            Some(progress) if progress.is_completed() => {
                info.error = Some(format!("{} has already completed {}", ch.name, def.name));
            }
            Some(progress) => {
                info.valid = true;
                info.stage = progress.current_stage();
                info.stage_requirements = progress.slots().to_vec();
            }
            None => {
                info.error = Some(format!("{} is not working on {}", ch.name, def.name));
                info.stage_requirements = self
                    .catalog
                    .get_stage_requirements(project, 0)
                    .map(|reqs| reqs.iter().map(SlotProgress::from_def).collect())
                    .unwrap_or_default();
            }
        }
        info
    }

    pub fn can_teach(
        &self,
        project: ProjectId,
        character: CharacterId,
        teacher: CharacterId,
    ) -> TeachCheck {
        let mut check = TeachCheck {
            valid: false,
            character_name: None,
            message: None,
            error: None,
        };
        let Some(target) = self.world.character(character) else {
            check.error = Some(format!("character {} not found", character.0));
            return check;
        };
        check.character_name = Some(target.name.clone());
        let project_name = match self.catalog.get_research_project(project) {
            Ok(def) => def.name.clone(),
            Err(e) => {
                check.error = Some(e.to_string());
                return check;
            }
        };
        let teacher_name = self
            .world
            .character(teacher)
            .map(|c| c.name)
            .unwrap_or_else(|| format!("character {}", teacher.0));

        let result = check_teaching(
            project,
            teacher,
            self.world.progress(project, teacher).as_ref(),
            character,
            self.world.progress(project, character).as_ref(),
        );
        match result {
            Ok(stage) => {
                check.valid = true;
                check.message = Some(format!(
                    "{teacher_name} can teach stage {} of {project_name} to {}",
                    stage + 1,
                    target.name
                ));
            }
            Err(ResearchError::SelfTeaching) => {
                check.error = Some("a character cannot teach themselves".to_string());
            }
            Err(ResearchError::AlreadyCompleted { .. }) => {
                check.error = Some(format!("{} already knows {project_name}", target.name));
            }
            Err(ResearchError::TeacherNotQualified { stage, .. }) => {
                check.error = Some(format!(
                    "{teacher_name} has not completed stage {} of {project_name}",
                    stage + 1
                ));
            }
            Err(e) => check.error = Some(e.to_string()),
        }
        check
    }

    /// Price one engineering action. `extra_mods` counts modifications to
    /// the same instance declared earlier in a batch.
    pub fn engineering_cost(
        &self,
        kind: EngineeringKind,
        target: EngineeringTarget,
        extra_mods: u32,
    ) -> Result<u64, ActionError> {
        let catalog_err = |e: downtime_core::catalog::CatalogError| ActionError::new(e.kind(), e.to_string());
        let (blueprint, attached) = match target {
            EngineeringTarget::Item(id) => {
                let item = self
                    .world
                    .item(id)
                    .ok_or_else(|| ActionError::new(ErrorKind::NotFound, format!("item {}", id.0)))?;
                (item.blueprint, item.mod_count())
            }
            EngineeringTarget::Blueprint(id) => {
                let bp = self.catalog.get_blueprint(id).map_err(catalog_err)?;
                (id, bp.built_in_mods.len() as u32)
            }
        };
        self.catalog
            .engineering_cost(kind, blueprint, attached + extra_mods)
            .map_err(catalog_err)
    }

    /// Look up an item by full code. With `requires_pack`, the item must be
    /// held by that character or their group.
    pub fn find_by_code(
        &self,
        code: &str,
        requires_pack: Option<CharacterId>,
    ) -> Result<ItemSummary, ActionError> {
        let item = self
            .world
            .find_by_code(&self.catalog, code)
            .map_err(|e| ActionError::new(e.kind(), e.to_string()))?;
        if let Some(holder) = requires_pack {
            let ch = self.world.character(holder).ok_or_else(|| {
                ActionError::new(ErrorKind::NotFound, format!("character {}", holder.0))
            })?;
            let held = match item.owner {
                Owner::Character(c) => c == ch.id,
                Owner::Group(g) => ch.group == Some(g),
            };
            if !held {
                return Err(ActionError::new(
                    ErrorKind::IneligibleTarget,
                    format!("item {} is not in a pack {} holds", code.trim(), ch.name),
                ));
            }
        }
        let card = self.item_card(&item, false);
        Ok(ItemSummary {
            id: item.id,
            name: card.name,
            full_code: card.full_code,
        })
    }

    /// Register a new sample under the owner's household lock.
    pub fn create_sample(&self, request: NewSample) -> Result<SampleSummary, ActionError> {
        if request.name.trim().is_empty() {
            return Err(ActionError::new(
                ErrorKind::InvalidPayload,
                "sample name must not be empty",
            ));
        }
        let household = match request.owner {
            Owner::Group(g) if self.world.group(g).is_none() => None,
            owner => self.world.household_of_owner(owner),
        };
        let Some(household) = household else {
            return Err(ActionError::new(
                ErrorKind::NotFound,
                format!("owner {:?}", request.owner),
            ));
        };
        let keys = BTreeSet::from([LockKey::Household(household)]);
        let sample = self
            .locks
            .with_locks(&keys, || self.world.create_sample(request));
        Ok(SampleSummary {
            id: sample.id,
            name: sample.name,
        })
    }

    // -----------------------------------------------------------------------
    // Packs
    // -----------------------------------------------------------------------

    /// Derive the pack for `owner` from the period's records. Once a pack
    /// exists it is returned as is.
    pub fn generate_pack(&self, owner: Owner, period: PeriodId) -> Result<PackFulfilment, PackError> {
        if self.packs.is_generated(owner, period) {
            return self.packs.view(owner, period);
        }
        let records: Vec<ResolutionRecord> = self
            .records
            .for_period(period)
            .into_iter()
            .filter(|r| match owner {
                Owner::Character(c) => r.character == c,
                Owner::Group(g) => r.group == Some(g),
            })
            .collect();
        if records.is_empty() {
            return Err(PackError::NotResolved { owner, period });
        }
        let mut contents = Entitlements::default();
        for record in &records {
            contents.merge(record.entitlements_for(owner));
        }
        Ok(self.packs.generate(owner, period, contents))
    }

    pub fn view_pack(&self, owner: Owner, period: PeriodId) -> Result<PackFulfilment, PackError> {
        self.packs.view(owner, period)
    }

    pub fn update_pack(
        &self,
        owner: Owner,
        period: PeriodId,
        flags: &BTreeMap<String, bool>,
    ) -> Result<PackFulfilment, PackError> {
        self.packs.update(owner, period, flags)
    }
}
