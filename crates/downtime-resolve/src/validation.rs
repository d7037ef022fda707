//! Action Validators.
//!
//! [`validate_submission`] walks a submission's actions in slot order
//! against a private working copy of the submitter's state. Each slot is
//! checked in full before any of its effects are applied to the working
//! copy, so a later slot sees exactly the effects of the earlier slots that
//! passed: an item bought in slot 0 can be modified in slot 1, a
//! modification learned in slot 2 can be used in slot 3, and the stacking
//! surcharge counts every earlier modification of the same instance.
//!
//! Nothing here writes to the [`World`]. A fully valid submission yields a
//! [`ResolutionPlan`] holding the after-state and the version of every
//! shared key it read; the orchestrator commits that plan.
//!
//! Errors are collected for every slot; one bad slot does not hide the
//! others. The aggregate funds check runs only once every slot passes.

use std::collections::{BTreeMap, BTreeSet};

use downtime_core::catalog::{Catalog, CatalogError, ScienceType};
use downtime_core::character::{Character, Group};
use downtime_core::config::EngineConfig;
use downtime_core::cost::EngineeringKind;
use downtime_core::error::{ActionError, ErrorKind};
use downtime_core::id::*;
use downtime_core::inventory::{ExoticStack, ItemInstance, Owner, Sample};
use downtime_core::rng::ResolveRng;
use downtime_research::evaluator::{
    ContributionOffer, Evaluation, MismatchReason, OfferedItem, OfferedSample, ScienceCredit, Unmatched,
};
use downtime_research::{
    ContributionSource, ProjectProgress, ResearchError, StageDelta, check_teaching,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::action::*;
use crate::lock::LockKey;
use crate::record::{CommittedAction, ReviewEntry, ReviewKind};
use crate::world::{PendingMint, World};

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Verdict for one declared action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub slot: usize,
    pub category: ActionCategory,
    pub ok: bool,
    pub cost: u64,
    pub errors: Vec<ActionError>,
}

/// The after-state of a fully valid submission, ready to commit.
#[derive(Debug, Clone)]
pub struct ResolutionPlan {
    pub key: String,
    pub fingerprint: String,
    pub period: PeriodId,
    pub event_number: u32,
    pub character: Character,
    pub group: Option<Group>,
    /// Existing items whose mods or expiry changed.
    pub items: Vec<ItemInstance>,
    pub consumed_items: Vec<ItemId>,
    pub mints: Vec<PendingMint>,
    /// Samples whose researched flag changed.
    pub samples: Vec<Sample>,
    pub consumed_samples: Vec<SampleId>,
    pub research: Vec<ProjectProgress>,
    pub stage_deltas: Vec<StageDelta>,
    pub actions: Vec<CommittedAction>,
    pub reviews: Vec<ReviewEntry>,
    pub produced_exotics: Vec<ExoticStack>,
    pub researched_samples: Vec<SampleId>,
    pub total_cost: u64,
    /// Every shared key read, with the version seen before reading it.
    pub versions: BTreeMap<LockKey, u64>,
    pub locks: BTreeSet<LockKey>,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub results: Vec<ValidationResult>,
    /// Per-slot errors in slot order, then batch-level errors.
    pub errors: Vec<ActionError>,
    pub total_cost: u64,
    /// Present exactly when `errors` is empty.
    pub plan: Option<ResolutionPlan>,
}

impl ValidationOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn batch_failure(error: ActionError) -> Self {
        Self {
            results: Vec::new(),
            errors: vec![error],
            total_cost: 0,
            plan: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct SlotErrors(Vec<ActionError>);

impl From<ActionError> for SlotErrors {
    fn from(error: ActionError) -> Self {
        SlotErrors(vec![error])
    }
}

struct Resolved {
    cost: u64,
    line: String,
}

type SlotResult = Result<Resolved, SlotErrors>;

/// Whose progress a research action writes, and whether the submitter may
/// write it.
struct ResearchTarget {
    assignee: CharacterId,
    /// Unassigned projects are started for the submitter's own research only.
    may_assign: bool,
    denied: Option<ActionError>,
}

fn resolved(cost: u64, line: String) -> SlotResult {
    Ok(Resolved { cost, line })
}

fn require<T>(slot: usize, value: Option<T>, field: &str) -> Result<T, ActionError> {
    value.ok_or_else(|| ActionError::invalid_payload(slot, format!("missing field `{field}`")))
}

/// A free-text field that must be present and non-blank.
fn text(slot: usize, value: &Option<String>, field: &str) -> Result<String, ActionError> {
    match value.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(ActionError::invalid_payload(
            slot,
            format!("field `{field}` must not be empty"),
        )),
    }
}

fn catalog_error(slot: usize) -> impl Fn(CatalogError) -> ActionError {
    move |e| ActionError::at(slot, e.kind(), e.to_string())
}

fn research_error(slot: usize) -> impl Fn(ResearchError) -> ActionError {
    move |e| ActionError::at(slot, e.kind(), e.to_string())
}

fn ineligible(slot: usize, message: impl Into<String>) -> ActionError {
    ActionError::at(slot, ErrorKind::IneligibleTarget, message)
}

enum Target {
    Existing(ItemInstance),
    /// Index into the batch's pending mints.
    Pending(usize),
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

struct Batch<'a> {
    catalog: &'a Catalog,
    config: &'a EngineConfig,
    world: &'a World,
    event_number: u32,
    character: Character,
    group: Option<Group>,
    items: BTreeMap<ItemId, ItemInstance>,
    consumed_items: BTreeSet<ItemId>,
    mints: Vec<PendingMint>,
    samples: BTreeMap<SampleId, Sample>,
    consumed_samples: BTreeSet<SampleId>,
    research: BTreeMap<(ProjectId, CharacterId), ProjectProgress>,
    versions: BTreeMap<LockKey, u64>,
    engineering_used: u32,
    mods_used: u32,
    science_used: BTreeMap<ScienceType, u32>,
    reputation_used: u32,
    rng: ResolveRng,
    stage_deltas: Vec<StageDelta>,
    reviews: Vec<ReviewEntry>,
    produced_exotics: Vec<ExoticStack>,
    researched_samples: Vec<SampleId>,
}

impl<'a> Batch<'a> {
    fn expiry(&self) -> u32 {
        self.event_number + self.config.item_lifetime_events
    }

    /// Record the version of `key` the first time it is read. Call before
    /// reading the state it guards.
    fn observe(&mut self, key: LockKey) {
        let world = self.world;
        self.versions
            .entry(key)
            .or_insert_with(|| world.version(key));
    }

    fn owns(&self, owner: Owner) -> bool {
        match owner {
            Owner::Character(c) => c == self.character.id,
            Owner::Group(g) => self.character.group == Some(g),
        }
    }

    fn character_name(&self, id: CharacterId) -> String {
        if id == self.character.id {
            return self.character.name.clone();
        }
        self.world
            .character(id)
            .map(|c| c.name)
            .unwrap_or_else(|| format!("character {}", id.0))
    }

    fn item(&self, slot: usize, id: ItemId) -> Result<ItemInstance, ActionError> {
        if self.consumed_items.contains(&id) {
            return Err(ActionError::invalid_payload(
                slot,
                format!("item {} was consumed by an earlier action", id.0),
            ));
        }
        self.items
            .get(&id)
            .cloned()
            .or_else(|| self.world.item(id))
            .ok_or_else(|| ActionError::not_found(slot, format!("item {}", id.0)))
    }

    fn sample(&self, slot: usize, id: SampleId) -> Result<Sample, ActionError> {
        if self.consumed_samples.contains(&id) {
            return Err(ActionError::invalid_payload(
                slot,
                format!("sample {} was consumed by an earlier action", id.0),
            ));
        }
        self.samples
            .get(&id)
            .cloned()
            .or_else(|| self.world.sample(id))
            .ok_or_else(|| ActionError::not_found(slot, format!("sample {}", id.0)))
    }

    fn item_label(&self, slot: usize, item: &ItemInstance) -> Result<String, ActionError> {
        self.catalog
            .full_code(item.blueprint, item.sequence)
            .map_err(catalog_error(slot))
    }

    fn source_label(&self, source: ContributionSource) -> String {
        match source {
            ContributionSource::Exotic(e) => self
                .catalog
                .get_exotic(e)
                .map(|d| d.name.clone())
                .unwrap_or_else(|_| format!("exotic {}", e.0)),
            ContributionSource::Item(i) => format!("item {}", i.0),
            ContributionSource::Sample(s) => format!("sample {}", s.0),
            ContributionSource::Science(t) => format!("{t} science credit"),
            ContributionSource::Teaching => "teaching".to_string(),
        }
    }

    fn unmatched_error(&self, slot: usize, unmatched: &Unmatched) -> ActionError {
        let what = self.source_label(unmatched.source);
        match unmatched.reason {
            MismatchReason::NotResearched => ActionError::at(
                slot,
                ErrorKind::UnmetRequirement,
                format!("{what} must be researched before it can fill this requirement"),
            ),
            MismatchReason::NoOpenSlot => ActionError::invalid_payload(
                slot,
                format!("{what} matches no open requirement of the current stage"),
            ),
            MismatchReason::TargetRequired => ActionError::invalid_payload(
                slot,
                format!("{what} must name a `target_science_type`"),
            ),
            MismatchReason::Duplicate => {
                ActionError::invalid_payload(slot, format!("{what} was offered twice"))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Purchase
    // -----------------------------------------------------------------------

    fn purchase(&mut self, slot: usize, p: &PurchasePayload) -> SlotResult {
        let catalog = self.catalog;
        let id = require(slot, p.blueprint_id, "blueprint_id")?;
        let def = catalog.get_blueprint(id).map_err(catalog_error(slot))?;
        if !def.purchaseable {
            return Err(ineligible(slot, format!("{} cannot be purchased", def.name)).into());
        }
        let cost = def.base_cost;
        if let Some(declared) = p.cost
            && declared != cost
        {
            return Err(ActionError::invalid_payload(
                slot,
                format!("declared cost {declared} does not match {cost} for {}", def.name),
            )
            .into());
        }
        let item_type = catalog
            .get_item_type(def.item_type)
            .map_err(catalog_error(slot))?;

        self.mints.push(PendingMint {
            slot,
            blueprint: id,
            name: def.name.clone(),
            prefix: item_type.prefix.clone(),
            number: def.number,
            mods: def.built_in_mods.clone(),
            expiry: self.expiry(),
        });
        resolved(cost, format!("Purchased: {}", def.name))
    }

    // -----------------------------------------------------------------------
    // Engineering
    // -----------------------------------------------------------------------

    fn engineering_target(&self, slot: usize, p: &EngineeringPayload) -> Result<Target, ActionError> {
        match require(slot, p.source, "source")? {
            EngineeringSource::Own => match p.item_id {
                Some(id) => {
                    let item = self.item(slot, id)?;
                    if !self.character.holdings.has_item(id) {
                        return Err(ineligible(
                            slot,
                            format!("item {} is not in your inventory", id.0),
                        ));
                    }
                    Ok(Target::Existing(item))
                }
                None => {
                    let blueprint = require(slot, p.blueprint_id, "item_id` or `blueprint_id")?;
                    self.mints
                        .iter()
                        .rposition(|m| m.blueprint == blueprint)
                        .map(Target::Pending)
                        .ok_or_else(|| {
                            ActionError::not_found(
                                slot,
                                format!(
                                    "no blueprint {} purchased earlier in this submission",
                                    blueprint.0
                                ),
                            )
                        })
                }
            },
            EngineeringSource::Group => {
                let Some(group) = &self.group else {
                    return Err(ineligible(slot, "you are not in a group"));
                };
                let id = require(slot, p.item_id, "item_id")?;
                let item = self.item(slot, id)?;
                if !group.holdings.has_item(id) {
                    return Err(ineligible(
                        slot,
                        format!("item {} is not in {}'s inventory", id.0, group.name),
                    ));
                }
                Ok(Target::Existing(item))
            }
            EngineeringSource::Manual => {
                let code = require(slot, p.full_code.as_deref(), "full_code")?;
                let found = self
                    .world
                    .find_by_code(self.catalog, code)
                    .map_err(catalog_error(slot))?;
                if !self.owns(found.owner) {
                    return Err(ineligible(
                        slot,
                        format!("item {} is not in a pack you hold", code.trim()),
                    ));
                }
                Ok(Target::Existing(self.item(slot, found.id)?))
            }
        }
    }

    fn engineering(&mut self, slot: usize, kind: EngineeringKind, p: &EngineeringPayload) -> SlotResult {
        let catalog = self.catalog;
        if self.config.enforce_action_slots {
            let grants = &self.character.grants;
            if self.engineering_used >= grants.engineering {
                return Err(ActionError::invalid_payload(
                    slot,
                    format!("no engineering actions left ({} granted)", grants.engineering),
                )
                .into());
            }
            if kind == EngineeringKind::Modify && self.mods_used >= grants.engineering_mods {
                return Err(ActionError::invalid_payload(
                    slot,
                    format!(
                        "no modification actions left ({} granted)",
                        grants.engineering_mods
                    ),
                )
                .into());
            }
        }

        let target = self.engineering_target(slot, p)?;
        let (blueprint, mods, label) = match &target {
            Target::Existing(item) => (item.blueprint, item.mods.clone(), self.item_label(slot, item)?),
            Target::Pending(i) => {
                let m = &self.mints[*i];
                (m.blueprint, m.mods.clone(), format!("new {}", m.name))
            }
        };

        let modification = match kind {
            EngineeringKind::Maintain => None,
            EngineeringKind::Modify => {
                let m = require(slot, p.mod_id, "mod_id")?;
                let def = catalog.get_modification(m).map_err(catalog_error(slot))?;
                let item_type = catalog
                    .get_blueprint(blueprint)
                    .map_err(catalog_error(slot))?
                    .item_type;
                if !def.applies_to(item_type) {
                    return Err(ineligible(
                        slot,
                        format!("{} cannot be applied to {label}", def.name),
                    )
                    .into());
                }
                if !self.character.knows_mod(m) {
                    return Err(ActionError::at(
                        slot,
                        ErrorKind::UnmetRequirement,
                        format!("you do not know the {} modification", def.name),
                    )
                    .into());
                }
                Some((m, def.name.clone()))
            }
        };

        let cost = catalog
            .engineering_cost(kind, blueprint, mods.len() as u32)
            .map_err(catalog_error(slot))?;

        let expiry = self.expiry();
        match target {
            Target::Existing(mut item) => {
                match &modification {
                    Some((m, _)) => item.mods.push(*m),
                    None => item.expiry = expiry,
                }
                self.items.insert(item.id, item);
            }
            Target::Pending(i) => match &modification {
                Some((m, _)) => self.mints[i].mods.push(*m),
                None => self.mints[i].expiry = expiry,
            },
        }
        self.engineering_used += 1;
        let line = match modification {
            Some((_, name)) => {
                self.mods_used += 1;
                format!("Applied {name} to {label}")
            }
            None => format!("Maintained {label} until event {expiry}"),
        };
        resolved(cost, line)
    }

    // -----------------------------------------------------------------------
    // Modification knowledge
    // -----------------------------------------------------------------------

    fn modification(
        &mut self,
        slot: usize,
        p: &ModificationPayload,
        expected: ModificationDirection,
    ) -> SlotResult {
        let catalog = self.catalog;
        let m = require(slot, p.mod_id, "mod_id")?;
        let direction = require(slot, p.direction, "type")?;
        if direction != expected {
            return Err(ActionError::invalid_payload(
                slot,
                "`type` does not match the action category",
            )
            .into());
        }
        let name = catalog
            .get_modification(m)
            .map_err(catalog_error(slot))?
            .name
            .clone();
        match expected {
            ModificationDirection::Learning => {
                if !self.character.learn_mod(m) {
                    return Err(ActionError::invalid_payload(
                        slot,
                        format!("you already know {name}"),
                    )
                    .into());
                }
                resolved(0, format!("Learned {name}"))
            }
            ModificationDirection::Forgetting => {
                if !self.character.forget_mod(m) {
                    return Err(ActionError::invalid_payload(
                        slot,
                        format!("you do not know {name}"),
                    )
                    .into());
                }
                resolved(0, format!("Forgot {name}"))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Science
    // -----------------------------------------------------------------------

    fn check_science_slot(&self, slot: usize, science_type: ScienceType) -> Result<(), ActionError> {
        if !self.config.enforce_action_slots {
            return Ok(());
        }
        let used = self.science_used.get(&science_type).copied().unwrap_or(0);
        let granted = self.character.grants.science_slots(science_type);
        if used >= granted {
            return Err(ActionError::invalid_payload(
                slot,
                format!("no {science_type} science actions left ({granted} granted)"),
            ));
        }
        Ok(())
    }

    fn use_science_slot(&mut self, science_type: ScienceType) {
        *self.science_used.entry(science_type).or_insert(0) += 1;
    }

    fn theorise(&mut self, slot: usize, p: &TheorisePayload) -> SlotResult {
        let science_type = require(slot, p.science_type, "science_type")?;
        self.check_science_slot(slot, science_type)?;
        let name = text(slot, &p.name, "name")?;
        let description = text(slot, &p.description, "description")?;

        self.use_science_slot(science_type);
        self.reviews.push(ReviewEntry {
            slot,
            kind: ReviewKind::InventionTheory,
            subject: name.clone(),
            body: description,
        });
        resolved(0, format!("Submitted theory '{name}' for review"))
    }

    fn synthesize(&mut self, slot: usize, p: &SynthesizePayload) -> SlotResult {
        let catalog = self.catalog;
        let science_type = require(slot, p.science_type, "science_type")?;
        self.check_science_slot(slot, science_type)?;
        let options = catalog.exotics_of(science_type);
        let Some(&exotic) = self.rng.pick(&options) else {
            return Err(ActionError::not_found(
                slot,
                format!("no {science_type} exotic substances exist"),
            )
            .into());
        };
        let name = catalog
            .get_exotic(exotic)
            .map_err(catalog_error(slot))?
            .name
            .clone();

        self.use_science_slot(science_type);
        self.character.holdings.add_exotic(exotic, 1);
        match self.produced_exotics.iter_mut().find(|s| s.exotic == exotic) {
            Some(stack) => stack.quantity += 1,
            None => self.produced_exotics.push(ExoticStack {
                exotic,
                quantity: 1,
            }),
        }
        resolved(0, format!("Synthesized 1 {name}"))
    }

    fn research_sample(&mut self, slot: usize, p: &ResearchSamplePayload) -> SlotResult {
        let science_type = require(slot, p.science_type, "science_type")?;
        self.check_science_slot(slot, science_type)?;
        let id = require(slot, p.sample_id, "sample_id")?;
        let mut sample = self.sample(slot, id)?;
        if !self.owns(sample.owner) {
            return Err(ineligible(slot, format!("sample {} is not yours", sample.name)).into());
        }
        if sample.is_researched {
            return Err(ActionError::invalid_payload(
                slot,
                format!("sample {} has already been researched", sample.name),
            )
            .into());
        }
        if science_type != ScienceType::Generic && sample.science_type != science_type {
            return Err(ActionError::invalid_payload(
                slot,
                format!(
                    "sample {} needs {} science, not {science_type}",
                    sample.name, sample.science_type
                ),
            )
            .into());
        }

        self.use_science_slot(science_type);
        sample.is_researched = true;
        let line = format!("Researched sample {}", sample.name);
        self.researched_samples.push(id);
        self.samples.insert(id, sample);
        resolved(0, line)
    }

    // -----------------------------------------------------------------------
    // Research projects
    // -----------------------------------------------------------------------

    /// Whose progress a research action lands on, and whether it may start
    /// the project for them.
    fn research_target(
        &self,
        slot: usize,
        project: ProjectId,
        target: Option<SupportTarget>,
        target_id: Option<CharacterId>,
    ) -> Result<ResearchTarget, ActionError> {
        self.catalog
            .get_research_project(project)
            .map_err(catalog_error(slot))?;
        let me = self.character.id;
        let granted = |assignee: CharacterId| ResearchTarget {
            assignee,
            may_assign: assignee == me,
            denied: None,
        };
        match target.unwrap_or(SupportTarget::Own) {
            SupportTarget::Own => Ok(granted(me)),
            SupportTarget::Group => {
                let id = require(slot, target_id, "support_target_id")?;
                let member = self.group.as_ref().is_some_and(|g| g.is_member(id));
                if member {
                    return Ok(granted(id));
                }
                Ok(ResearchTarget {
                    denied: Some(ineligible(
                        slot,
                        format!("{} is not in your group", self.character_name(id)),
                    )),
                    ..granted(id)
                })
            }
            SupportTarget::Other => {
                let id = require(slot, target_id, "support_target_id")?;
                if id != me && self.world.character(id).is_none() {
                    return Err(ActionError::not_found(slot, format!("character {}", id.0)));
                }
                Ok(granted(id))
            }
        }
    }

    /// Load the target's progress; a denied target reports the access
    /// failure rather than a missing assignment.
    fn target_progress(
        &mut self,
        slot: usize,
        project: ProjectId,
        target: &ResearchTarget,
    ) -> Result<ProjectProgress, ActionError> {
        self.load_progress(slot, project, target.assignee, target.may_assign)
            .map_err(|e| target.denied.clone().unwrap_or(e))
    }

    fn evaluate_offer(
        &self,
        slot: usize,
        progress: &ProjectProgress,
        offer: &ContributionOffer,
        target: &ResearchTarget,
    ) -> Result<Evaluation, SlotErrors> {
        let eval = progress
            .evaluate(offer, target.denied.is_none())
            .map_err(research_error(slot))?;
        if let (false, Some(denied)) = (eval.access_granted, &target.denied) {
            return Err(denied.clone().into());
        }
        if !eval.unmatched.is_empty() {
            return Err(SlotErrors(
                eval.unmatched
                    .iter()
                    .map(|u| self.unmatched_error(slot, u))
                    .collect(),
            ));
        }
        Ok(eval)
    }

    fn current_progress(&mut self, project: ProjectId, assignee: CharacterId) -> Option<ProjectProgress> {
        self.observe(LockKey::Research(project, assignee));
        self.research
            .get(&(project, assignee))
            .cloned()
            .or_else(|| self.world.progress(project, assignee))
    }

    /// A working copy of the assignee's progress; only stored back when the
    /// slot succeeds.
    fn load_progress(
        &mut self,
        slot: usize,
        project: ProjectId,
        assignee: CharacterId,
        may_assign: bool,
    ) -> Result<ProjectProgress, ActionError> {
        let project_name = self
            .catalog
            .get_research_project(project)
            .map_err(catalog_error(slot))?
            .name
            .clone();
        let progress = match self.current_progress(project, assignee) {
            Some(p) => p,
            None if may_assign => ProjectProgress::assign(self.catalog, project, assignee)
                .map_err(research_error(slot))?,
            None => {
                return Err(ineligible(
                    slot,
                    format!(
                        "{} is not working on {project_name}",
                        self.character_name(assignee)
                    ),
                ));
            }
        };
        if progress.is_completed() {
            return Err(ineligible(
                slot,
                format!(
                    "{project_name} is already complete for {}",
                    self.character_name(assignee)
                ),
            ));
        }
        Ok(progress)
    }

    fn store_progress(&mut self, progress: ProjectProgress, delta: StageDelta) {
        if !delta.slots.is_empty() || delta.advanced() {
            self.stage_deltas.push(delta);
        }
        self.research
            .insert((progress.project, progress.assignee), progress);
    }

    fn research_project(&mut self, slot: usize, p: &ResearchProjectPayload) -> SlotResult {
        let catalog = self.catalog;
        let science_type = require(slot, p.science_type, "science_type")?;
        self.check_science_slot(slot, science_type)?;
        let project = require(slot, p.project_id, "project_id")?;
        let target = self.research_target(slot, project, p.support_target, p.support_target_id)?;
        let assignee = target.assignee;
        let mut progress = self.target_progress(slot, project, &target)?;

        let offer = ContributionOffer {
            science: vec![ScienceCredit {
                science_type,
                target: p.target_science_type,
            }],
            ..Default::default()
        };
        let eval = self.evaluate_offer(slot, &progress, &offer, &target)?;
        let delta = progress
            .apply(catalog, &eval, self.character.id)
            .map_err(research_error(slot))?;

        let line = format!(
            "Contributed {science_type} science to {} for {}",
            catalog
                .get_research_project(project)
                .map_err(catalog_error(slot))?
                .name,
            self.character_name(assignee)
        );
        self.use_science_slot(science_type);
        self.store_progress(progress, delta);
        resolved(0, line)
    }

    fn teach(&mut self, slot: usize, p: &TeachPayload) -> SlotResult {
        let catalog = self.catalog;
        let science_type = require(slot, p.science_type, "science_type")?;
        self.check_science_slot(slot, science_type)?;
        let project = require(slot, p.project_id, "project_id")?;
        let project_name = catalog
            .get_research_project(project)
            .map_err(catalog_error(slot))?
            .name
            .clone();
        let target = require(slot, p.target_character_id, "target_character_id")?;
        let me = self.character.id;
        if target != me && self.world.character(target).is_none() {
            return Err(ActionError::not_found(slot, format!("character {}", target.0)).into());
        }

        let teacher_progress = self.current_progress(project, me);
        let target_progress = self.current_progress(project, target);
        let stage = check_teaching(
            project,
            me,
            teacher_progress.as_ref(),
            target,
            target_progress.as_ref(),
        )
        .map_err(research_error(slot))?;

        let mut progress = match target_progress {
            Some(p) => p,
            None => ProjectProgress::assign(catalog, project, target).map_err(research_error(slot))?,
        };
        let delta = progress
            .complete_current_stage(catalog, me)
            .map_err(research_error(slot))?;

        let line = format!(
            "Taught stage {} of {project_name} to {}",
            stage + 1,
            self.character_name(target)
        );
        self.use_science_slot(science_type);
        self.store_progress(progress, delta);
        resolved(0, line)
    }

    fn contribute(&mut self, slot: usize, p: &ContributePayload) -> SlotResult {
        let catalog = self.catalog;
        let project = require(slot, p.project_id, "project_id")?;
        let target = self.research_target(slot, project, p.support_target, p.support_target_id)?;
        let assignee = target.assignee;

        if p.contributed_exotics.is_empty()
            && p.contributed_items.is_empty()
            && p.contributed_samples.is_empty()
        {
            return Err(ActionError::invalid_payload(slot, "nothing contributed").into());
        }

        let mut errors = Vec::new();
        let mut offer = ContributionOffer::default();

        let mut wanted: BTreeMap<ExoticId, u32> = BTreeMap::new();
        for e in &p.contributed_exotics {
            if let Err(err) = catalog.get_exotic(e.id) {
                errors.push(catalog_error(slot)(err));
                continue;
            }
            if e.quantity == 0 {
                errors.push(ActionError::invalid_payload(
                    slot,
                    format!("{} quantity must be positive", self.source_label(ContributionSource::Exotic(e.id))),
                ));
                continue;
            }
            *wanted.entry(e.id).or_insert(0) += e.quantity;
            offer.exotics.push(ExoticStack {
                exotic: e.id,
                quantity: e.quantity,
            });
        }
        for (&exotic, &quantity) in &wanted {
            let held = self.character.holdings.exotic_quantity(exotic);
            if held < quantity {
                errors.push(ActionError::invalid_payload(
                    slot,
                    format!(
                        "you hold {held} {}, not {quantity}",
                        self.source_label(ContributionSource::Exotic(exotic))
                    ),
                ));
            }
        }

        for &id in &p.contributed_items {
            let item = match self.item(slot, id) {
                Ok(item) => item,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };
            if !self.character.holdings.has_item(id) {
                errors.push(ineligible(
                    slot,
                    format!("item {} is not in your inventory", id.0),
                ));
                continue;
            }
            match catalog.get_blueprint(item.blueprint) {
                Ok(bp) => offer.items.push(OfferedItem {
                    id,
                    item_type: bp.item_type,
                }),
                Err(err) => errors.push(catalog_error(slot)(err)),
            }
        }

        for &id in &p.contributed_samples {
            match self.sample(slot, id) {
                Ok(sample) if self.owns(sample.owner) => offer.samples.push(OfferedSample {
                    id,
                    tags: sample.tags,
                    is_researched: sample.is_researched,
                }),
                Ok(sample) => errors.push(ineligible(
                    slot,
                    format!("sample {} is not yours", sample.name),
                )),
                Err(err) => errors.push(err),
            }
        }

        if !errors.is_empty() {
            return Err(SlotErrors(errors));
        }

        let mut progress = self.target_progress(slot, project, &target)?;
        let eval = self.evaluate_offer(slot, &progress, &offer, &target)?;
        let delta = progress
            .apply(catalog, &eval, self.character.id)
            .map_err(research_error(slot))?;

        let mut given = Vec::new();
        for stack in eval.consumed_exotics() {
            let removed = self
                .character
                .holdings
                .remove_exotic(stack.exotic, stack.quantity);
            if removed < stack.quantity {
                return Err(ActionError::invalid_payload(
                    slot,
                    format!(
                        "you hold {removed} {}, not {}",
                        self.source_label(ContributionSource::Exotic(stack.exotic)),
                        stack.quantity
                    ),
                )
                .into());
            }
            given.push(format!(
                "{} {}",
                stack.quantity,
                self.source_label(ContributionSource::Exotic(stack.exotic))
            ));
        }
        for id in eval.consumed_items() {
            self.character.holdings.remove_item(id);
            self.items.remove(&id);
            self.consumed_items.insert(id);
            given.push(format!("item {}", id.0));
        }
        for id in eval.consumed_samples() {
            if !self.character.holdings.remove_sample(id)
                && let Some(group) = self.group.as_mut()
            {
                group.holdings.remove_sample(id);
            }
            self.samples.remove(&id);
            self.consumed_samples.insert(id);
            given.push(format!("sample {}", id.0));
        }

        let line = format!(
            "Contributed {} to {} for {}",
            given.join(", "),
            catalog
                .get_research_project(project)
                .map_err(catalog_error(slot))?
                .name,
            self.character_name(assignee)
        );
        self.store_progress(progress, delta);
        resolved(0, line)
    }

    // -----------------------------------------------------------------------
    // Reputation
    // -----------------------------------------------------------------------

    fn reputation(&mut self, slot: usize, p: &ReputationPayload) -> SlotResult {
        let catalog = self.catalog;
        let faction = require(slot, p.faction_id, "faction_id")?;
        let name = catalog
            .get_faction(faction)
            .map_err(catalog_error(slot))?
            .name
            .clone();
        let question = text(slot, &p.question, "question")?;
        let allowed = self.config.reputation_queries_per_period;
        if self.reputation_used >= allowed {
            return Err(ActionError::invalid_payload(
                slot,
                format!("at most {allowed} reputation queries per period"),
            )
            .into());
        }

        self.reputation_used += 1;
        self.reviews.push(ReviewEntry {
            slot,
            kind: ReviewKind::ReputationQuestion,
            subject: name.clone(),
            body: question,
        });
        resolved(0, format!("Reputation query to {name} queued for review"))
    }

    fn resolve_slot(&mut self, slot: usize, action: &DowntimeAction) -> SlotResult {
        match action {
            DowntimeAction::Purchase(p) => self.purchase(slot, p),
            DowntimeAction::EngineeringMaintain(p) => {
                self.engineering(slot, EngineeringKind::Maintain, p)
            }
            DowntimeAction::EngineeringModify(p) => {
                self.engineering(slot, EngineeringKind::Modify, p)
            }
            DowntimeAction::LearnModification(p) => {
                self.modification(slot, p, ModificationDirection::Learning)
            }
            DowntimeAction::ForgetModification(p) => {
                self.modification(slot, p, ModificationDirection::Forgetting)
            }
            DowntimeAction::ScienceTheorise(p) => self.theorise(slot, p),
            DowntimeAction::ScienceSynthesize(p) => self.synthesize(slot, p),
            DowntimeAction::ScienceResearchSample(p) => self.research_sample(slot, p),
            DowntimeAction::ScienceResearchProject(p) => self.research_project(slot, p),
            DowntimeAction::ScienceTeachInvention(p) => self.teach(slot, p),
            DowntimeAction::ResearchContribute(p) => self.contribute(slot, p),
            DowntimeAction::ReputationQuery(p) => self.reputation(slot, p),
        }
    }

    fn into_plan(
        self,
        submission: &Submission,
        fingerprint: String,
        actions: Vec<CommittedAction>,
        total_cost: u64,
    ) -> ResolutionPlan {
        let locks = self.versions.keys().copied().collect();
        ResolutionPlan {
            key: submission.key.clone(),
            fingerprint,
            period: submission.period,
            event_number: self.event_number,
            character: self.character,
            group: self.group,
            items: self.items.into_values().collect(),
            consumed_items: self.consumed_items.into_iter().collect(),
            mints: self.mints,
            samples: self.samples.into_values().collect(),
            consumed_samples: self.consumed_samples.into_iter().collect(),
            research: self.research.into_values().collect(),
            stage_deltas: self.stage_deltas,
            actions,
            reviews: self.reviews,
            produced_exotics: self.produced_exotics,
            researched_samples: self.researched_samples,
            total_cost,
            versions: self.versions,
            locks,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Validate every action of `submission` against the current world.
pub fn validate_submission(
    catalog: &Catalog,
    config: &EngineConfig,
    world: &World,
    submission: &Submission,
) -> ValidationOutcome {
    let fingerprint = match submission.fingerprint() {
        Ok(f) => f,
        Err(e) => {
            return ValidationOutcome::batch_failure(ActionError::new(
                ErrorKind::InvalidPayload,
                format!("submission cannot be encoded: {e}"),
            ));
        }
    };
    let Some(found) = world.character(submission.character) else {
        return ValidationOutcome::batch_failure(ActionError::new(
            ErrorKind::NotFound,
            format!("character {}", submission.character.0),
        ));
    };
    let Some(event_number) = world.event_number(submission.period) else {
        return ValidationOutcome::batch_failure(ActionError::new(
            ErrorKind::NotFound,
            format!("downtime period {} is not open", submission.period.0),
        ));
    };

    let household = LockKey::Household(world.household_of(&found));
    let household_version = world.version(household);
    let character = world.character(submission.character).unwrap_or(found);
    let group = character.group.and_then(|g| world.group(g));

    let mut batch = Batch {
        catalog,
        config,
        world,
        event_number,
        character,
        group,
        items: BTreeMap::new(),
        consumed_items: BTreeSet::new(),
        mints: Vec::new(),
        samples: BTreeMap::new(),
        consumed_samples: BTreeSet::new(),
        research: BTreeMap::new(),
        versions: BTreeMap::from([(household, household_version)]),
        engineering_used: 0,
        mods_used: 0,
        science_used: BTreeMap::new(),
        reputation_used: 0,
        rng: ResolveRng::from_key(&submission.key),
        stage_deltas: Vec::new(),
        reviews: Vec::new(),
        produced_exotics: Vec::new(),
        researched_samples: Vec::new(),
    };

    let mut results = Vec::with_capacity(submission.actions.len());
    let mut actions = Vec::with_capacity(submission.actions.len());
    let mut errors = Vec::new();
    let mut total_cost: u64 = 0;

    for (slot, action) in submission.actions.iter().enumerate() {
        let category = action.category();
        let resolved = batch.resolve_slot(slot, action).and_then(|r| {
            let payload = serde_json::to_string(action).map_err(|e| {
                ActionError::invalid_payload(slot, format!("action cannot be encoded: {e}"))
            })?;
            Ok((r, payload))
        });
        match resolved {
            Ok((Resolved { cost, line }, payload)) => {
                total_cost = total_cost.saturating_add(cost);
                actions.push(CommittedAction {
                    slot,
                    category,
                    cost,
                    description: line,
                    payload,
                });
                results.push(ValidationResult {
                    slot,
                    category,
                    ok: true,
                    cost,
                    errors: Vec::new(),
                });
            }
            Err(SlotErrors(slot_errors)) => {
                debug!(slot, category = ?category, errors = slot_errors.len(), "action rejected");
                errors.extend(slot_errors.iter().cloned());
                results.push(ValidationResult {
                    slot,
                    category,
                    ok: false,
                    cost: 0,
                    errors: slot_errors,
                });
            }
        }
    }

    if errors.is_empty() {
        let check = i64::try_from(total_cost)
            .map_err(|_| {
                ActionError::new(
                    ErrorKind::InvalidPayload,
                    format!("total cost {total_cost} is out of range"),
                )
            })
            .and_then(|amount| {
                world
                    .ledger()
                    .reserve(submission.character, amount)
                    .map_err(|e| ActionError::new(e.kind(), e.to_string()))
            });
        if let Err(e) = check {
            errors.push(e);
        }
    }

    info!(
        character = submission.character.0,
        period = submission.period.0,
        key = %submission.key,
        cost = total_cost,
        errors = errors.len(),
        "submission validated"
    );

    let plan = errors
        .is_empty()
        .then(|| batch.into_plan(submission, fingerprint, actions, total_cost));
    ValidationOutcome {
        results,
        errors,
        total_cost,
        plan,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use downtime_core::test_utils::*;

    fn run(world: &World, actions: Vec<DowntimeAction>) -> ValidationOutcome {
        let catalog = fixture_catalog();
        let config = EngineConfig::default();
        validate_submission(&catalog, &config, world, &submission("k", 1, actions))
    }

    fn kinds(outcome: &ValidationOutcome) -> Vec<(Option<usize>, ErrorKind)> {
        outcome.errors.iter().map(|e| (e.slot, e.kind)).collect()
    }

    // -----------------------------------------------------------------------
    // Test 1: Purchases
    // -----------------------------------------------------------------------
    #[test]
    fn purchase_costs_base_cost() {
        let world = solo_world(1, 100);
        let outcome = run(&world, vec![purchase(rifle()), purchase(sword())]);
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        assert_eq!(outcome.total_cost, 50);
        let plan = outcome.plan.unwrap();
        assert_eq!(plan.mints.len(), 2);
        assert_eq!(plan.mints[1].mods, vec![rune()]);
        assert_eq!(plan.mints[0].expiry, EVENT + 4);
    }

    #[test]
    fn purchase_rejections() {
        let world = solo_world(1, 1000);
        let wrong_cost = DowntimeAction::Purchase(PurchasePayload {
            blueprint_id: Some(rifle()),
            name: None,
            cost: Some(29),
        });
        let outcome = run(
            &world,
            vec![
                purchase(BlueprintId(99)),
                purchase(relic()),
                wrong_cost,
                DowntimeAction::Purchase(PurchasePayload::default()),
            ],
        );
        assert_eq!(
            kinds(&outcome),
            vec![
                (Some(0), ErrorKind::NotFound),
                (Some(1), ErrorKind::IneligibleTarget),
                (Some(2), ErrorKind::InvalidPayload),
                (Some(3), ErrorKind::InvalidPayload),
            ]
        );
        assert!(outcome.plan.is_none());
    }

    // -----------------------------------------------------------------------
    // Test 2: Aggregate funds check runs after per-action checks
    // -----------------------------------------------------------------------
    #[test]
    fn aggregate_cost_exceeds_funds() {
        let world = solo_world(1, 50);
        let cannon_id = give_item(&world, 1, cannon());
        let outcome = run(&world, vec![purchase(rifle()), maintain_own(cannon_id)]);
        assert!(outcome.results.iter().all(|r| r.ok));
        assert_eq!(outcome.total_cost, 55);
        assert_eq!(kinds(&outcome), vec![(None, ErrorKind::InsufficientFunds)]);
    }

    #[test]
    fn funds_not_checked_when_an_action_fails() {
        let world = solo_world(1, 0);
        let outcome = run(&world, vec![purchase(rifle()), purchase(BlueprintId(99))]);
        assert_eq!(kinds(&outcome), vec![(Some(1), ErrorKind::NotFound)]);
    }

    // -----------------------------------------------------------------------
    // Test 3: Engineering stacking within a batch
    // -----------------------------------------------------------------------
    #[test]
    fn modify_cost_stacks_per_instance() {
        let world = solo_world(1, 10_000);
        let item = give_item(&world, 1, rifle());
        let other = give_item(&world, 1, rifle());
        let outcome = run(
            &world,
            vec![
                modify_own(item, scope()),
                modify_own(item, rune()),
                modify_own(other, rune()),
            ],
        );
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        let costs: Vec<u64> = outcome.results.iter().map(|r| r.cost).collect();
        // 30 * exp(0) * 0.5 = 15; 30 * exp(1/2.5) * 0.5 = 22.4 -> 23
        assert_eq!(costs, vec![15, 23, 15]);
    }

    #[test]
    fn modify_bought_item_in_same_batch() {
        let world = solo_world(1, 1000);
        let outcome = run(
            &world,
            vec![purchase(sword()), modify_new(sword(), scope())],
        );
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        // The sword ships with a rune, so the first modification already stacks.
        assert_eq!(outcome.results[1].cost, 15);
        let plan = outcome.plan.unwrap();
        assert_eq!(plan.mints[0].mods, vec![rune(), scope()]);
    }

    #[test]
    fn modify_rules() {
        let world = solo_world(1, 1000);
        let vest_id = give_item(&world, 1, vest());
        let sword_id = give_item_with(&world, 1, sword(), vec![rune()]);
        let outcome = run(
            &world,
            vec![
                modify_own(vest_id, scope()),
                modify_own(sword_id, rune()),
                modify_own(ItemId(999), rune()),
            ],
        );
        assert_eq!(
            kinds(&outcome),
            vec![
                (Some(0), ErrorKind::IneligibleTarget),
                (Some(2), ErrorKind::NotFound),
            ]
        );
        // A second rune on a sword that already carries one is allowed.
        assert!(outcome.results[1].ok);
        assert_eq!(outcome.results[1].cost, 15);
    }

    #[test]
    fn same_mod_stacks_on_one_item() {
        let world = solo_world(1, 1000);
        let item = give_item(&world, 1, rifle());
        let outcome = run(
            &world,
            vec![modify_own(item, scope()), modify_own(item, scope())],
        );
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        let costs: Vec<u64> = outcome.results.iter().map(|r| r.cost).collect();
        assert_eq!(costs, vec![15, 23]);
        let plan = outcome.plan.unwrap();
        assert_eq!(plan.items[0].mods, vec![scope(), scope()]);
        assert_eq!(plan.items[0].mod_count(), 2);
    }

    #[test]
    fn learned_mod_usable_in_later_slot() {
        let world = World::new();
        let mut ch = character(1, None);
        ch.known_mods.clear();
        world.add_character(ch, 1000);
        world.open_period(PERIOD, EVENT);
        let item = give_item(&world, 1, rifle());

        let early = run(&world, vec![modify_own(item, scope()), learn(scope())]);
        assert_eq!(kinds(&early), vec![(Some(0), ErrorKind::UnmetRequirement)]);

        let late = run(&world, vec![learn(scope()), modify_own(item, scope())]);
        assert!(late.is_ok(), "{:?}", late.errors);
    }

    #[test]
    fn engineering_slot_limit() {
        let world = World::new();
        let mut ch = character(1, None);
        ch.grants.engineering = 1;
        world.add_character(ch, 1000);
        world.open_period(PERIOD, EVENT);
        let a = give_item(&world, 1, rifle());
        let b = give_item(&world, 1, rifle());
        let outcome = run(&world, vec![maintain_own(a), maintain_own(b)]);
        assert_eq!(kinds(&outcome), vec![(Some(1), ErrorKind::InvalidPayload)]);
    }

    #[test]
    fn group_and_manual_sources() {
        let world = group_world(10, 500, &[(1, 0), (2, 0)]);
        let shared = give_group_item(&world, 10, vest());
        let theirs = give_item(&world, 2, rifle());
        let code = fixture_catalog()
            .full_code(rifle(), world.item(theirs).unwrap().sequence)
            .unwrap();

        let outcome = run(
            &world,
            vec![
                modify_group(shared, plating()),
                maintain_manual(&code),
                maintain_manual("nonsense"),
            ],
        );
        assert_eq!(
            kinds(&outcome),
            vec![
                (Some(1), ErrorKind::IneligibleTarget),
                (Some(2), ErrorKind::InvalidPayload),
            ]
        );
        assert!(outcome.results[0].ok);
        assert_eq!(outcome.results[0].cost, 60);
    }

    #[test]
    fn group_source_without_group() {
        let world = solo_world(1, 100);
        let outcome = run(&world, vec![modify_group(ItemId(0), scope())]);
        assert_eq!(kinds(&outcome), vec![(Some(0), ErrorKind::IneligibleTarget)]);
    }

    // -----------------------------------------------------------------------
    // Test 4: Modification knowledge
    // -----------------------------------------------------------------------
    #[test]
    fn learn_and_forget() {
        let world = solo_world(1, 0);
        let outcome = run(
            &world,
            vec![
                learn(scope()),
                forget(scope()),
                forget(scope()),
                DowntimeAction::LearnModification(ModificationPayload {
                    mod_id: Some(scope()),
                    direction: Some(ModificationDirection::Forgetting),
                }),
            ],
        );
        assert_eq!(
            kinds(&outcome),
            vec![
                (Some(0), ErrorKind::InvalidPayload),
                (Some(2), ErrorKind::InvalidPayload),
                (Some(3), ErrorKind::InvalidPayload),
            ]
        );
    }

    // -----------------------------------------------------------------------
    // Test 5: Science
    // -----------------------------------------------------------------------
    #[test]
    fn synthesize_is_deterministic_per_key() {
        let world = solo_world(1, 0);
        let a = run(&world, vec![synthesize(ScienceType::Generic)]);
        let b = run(&world, vec![synthesize(ScienceType::Generic)]);
        let pa = a.plan.unwrap().produced_exotics;
        assert_eq!(pa, b.plan.unwrap().produced_exotics);
        assert_eq!(pa[0].quantity, 1);
    }

    #[test]
    fn synthesize_matches_science_type() {
        let world = solo_world(1, 0);
        let outcome = run(&world, vec![synthesize(ScienceType::Life)]);
        let plan = outcome.plan.unwrap();
        assert_eq!(plan.produced_exotics[0].exotic, bloodmoss());
        assert_eq!(plan.character.holdings.exotic_quantity(bloodmoss()), 1);
    }

    #[test]
    fn science_slots_are_per_type() {
        let world = solo_world(1, 0);
        let outcome = run(
            &world,
            vec![
                synthesize(ScienceType::Life),
                synthesize(ScienceType::Life),
                synthesize(ScienceType::Life),
                synthesize(ScienceType::Etheric),
            ],
        );
        assert_eq!(kinds(&outcome), vec![(Some(2), ErrorKind::InvalidPayload)]);
    }

    #[test]
    fn theorise_needs_text() {
        let world = solo_world(1, 0);
        let outcome = run(
            &world,
            vec![
                theorise("Aether lens", "Focus light through ether"),
                theorise("  ", "x"),
            ],
        );
        assert_eq!(kinds(&outcome), vec![(Some(1), ErrorKind::InvalidPayload)]);
    }

    #[test]
    fn research_sample_marks_researched() {
        let world = solo_world(1, 0);
        let sample = give_sample(&world, 1, "nightshade", ScienceType::Life, &["toxin"]);
        let outcome = run(
            &world,
            vec![research_sample(ScienceType::Life, sample)],
        );
        let plan = outcome.plan.unwrap();
        assert!(plan.samples[0].is_researched);
        assert_eq!(plan.researched_samples, vec![sample]);

        let twice = run(
            &world,
            vec![
                research_sample(ScienceType::Life, sample),
                research_sample(ScienceType::Generic, sample),
            ],
        );
        assert_eq!(kinds(&twice), vec![(Some(1), ErrorKind::InvalidPayload)]);

        let wrong_type = run(&world, vec![research_sample(ScienceType::Etheric, sample)]);
        assert_eq!(kinds(&wrong_type), vec![(Some(0), ErrorKind::InvalidPayload)]);
    }

    // -----------------------------------------------------------------------
    // Test 6: Research contributions
    // -----------------------------------------------------------------------
    #[test]
    fn contribution_assigns_and_advances() {
        let world = solo_world(1, 0);
        let rifle_id = give_item(&world, 1, rifle());
        give_exotic(&world, 1, ether(), 3);

        let outcome = run(
            &world,
            vec![
                contribute_self(lens(), &[(ether(), 2)], &[rifle_id], &[]),
                research_project(ScienceType::Etheric, lens(), None),
            ],
        );
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        let plan = outcome.plan.unwrap();
        assert_eq!(plan.research.len(), 1);
        assert_eq!(plan.research[0].current_stage(), Some(1));
        assert_eq!(plan.consumed_items, vec![rifle_id]);
        assert!(!plan.character.holdings.has_item(rifle_id));
        assert_eq!(plan.character.holdings.exotic_quantity(ether()), 1);
        assert!(plan.stage_deltas.last().unwrap().advanced());
    }

    #[test]
    fn unresearched_sample_is_unmet_requirement() {
        let world = solo_world(1, 0);
        let sample = give_sample(&world, 1, "nightshade", ScienceType::Life, &["toxin"]);
        let mut progress = ProjectProgress::assign(&fixture_catalog(), lens(), CharacterId(1)).unwrap();
        progress.complete_current_stage(&fixture_catalog(), CharacterId(9)).unwrap();
        world.put_progress(progress);

        let outcome = run(&world, vec![contribute_self(lens(), &[], &[], &[sample])]);
        assert_eq!(kinds(&outcome), vec![(Some(0), ErrorKind::UnmetRequirement)]);

        let researched_first = run(
            &world,
            vec![
                research_sample(ScienceType::Life, sample),
                contribute_self(lens(), &[], &[], &[sample]),
            ],
        );
        assert!(researched_first.is_ok(), "{:?}", researched_first.errors);
        assert_eq!(researched_first.plan.unwrap().consumed_samples, vec![sample]);
    }

    #[test]
    fn contribution_checks_holdings() {
        let world = solo_world(1, 0);
        give_exotic(&world, 1, ether(), 1);
        let outcome = run(
            &world,
            vec![
                contribute_self(lens(), &[(ether(), 2)], &[], &[]),
                contribute_self(lens(), &[], &[], &[]),
                contribute_self(lens(), &[(bloodmoss(), 0)], &[], &[]),
            ],
        );
        assert_eq!(
            kinds(&outcome),
            vec![
                (Some(0), ErrorKind::InvalidPayload),
                (Some(1), ErrorKind::InvalidPayload),
                (Some(2), ErrorKind::InvalidPayload),
            ]
        );
    }

    #[test]
    fn excess_exotics_stay_in_holdings() {
        let world = solo_world(1, 0);
        give_exotic(&world, 1, ether(), 5);
        let outcome = run(
            &world,
            vec![
                contribute_self(lens(), &[(ether(), 3)], &[], &[]),
                contribute_self(lens(), &[(ether(), 1)], &[], &[]),
            ],
        );
        // The first slot fills the ether requirement; nothing is left for the second.
        assert_eq!(kinds(&outcome), vec![(Some(1), ErrorKind::InvalidPayload)]);

        let outcome = run(&world, vec![contribute_self(lens(), &[(ether(), 3)], &[], &[])]);
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        let plan = outcome.plan.unwrap();
        assert_eq!(plan.character.holdings.exotic_quantity(ether()), 3);
        assert_eq!(plan.actions[0].description, "Contributed 2 ether to lens for character-1");
    }

    #[test]
    fn group_support_needs_membership_even_when_assigned() {
        let world = group_world(10, 0, &[(1, 0), (2, 0)]);
        world.add_character(character(3, None), 0);
        world.put_progress(ProjectProgress::assign(&fixture_catalog(), lens(), CharacterId(3)).unwrap());
        give_exotic(&world, 1, ether(), 2);

        let outcome = run(
            &world,
            vec![
                contribute_for(SupportTarget::Group, 3, lens(), &[(ether(), 1)]),
                DowntimeAction::ScienceResearchProject(ResearchProjectPayload {
                    science_type: Some(ScienceType::Etheric),
                    project_id: Some(lens()),
                    support_target: Some(SupportTarget::Group),
                    support_target_id: Some(CharacterId(3)),
                    ..Default::default()
                }),
            ],
        );
        assert_eq!(
            kinds(&outcome),
            vec![
                (Some(0), ErrorKind::IneligibleTarget),
                (Some(1), ErrorKind::IneligibleTarget),
            ]
        );
        assert!(outcome.errors[0].message.contains("not in your group"));

        // The same target is reachable as an explicit other character.
        let outcome = run(
            &world,
            vec![contribute_for(SupportTarget::Other, 3, lens(), &[(ether(), 1)])],
        );
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
    }

    #[test]
    fn plan_carries_the_submission_fingerprint() {
        let world = solo_world(1, 100);
        let sub = submission("k", 1, vec![purchase(rifle())]);
        let outcome = validate_submission(&fixture_catalog(), &EngineConfig::default(), &world, &sub);
        let plan = outcome.plan.unwrap();
        assert_eq!(plan.fingerprint, sub.fingerprint().unwrap());
        assert_eq!(
            plan.actions[0].payload,
            serde_json::to_string(&sub.actions[0]).unwrap()
        );
    }

    #[test]
    fn contribution_access_rules() {
        let world = group_world(10, 0, &[(1, 0), (2, 0)]);
        world.add_character(character(3, None), 0);
        give_exotic(&world, 1, ether(), 4);

        // Group member without the project assigned.
        let outcome = run(
            &world,
            vec![contribute_for(SupportTarget::Group, 2, serum(), &[(ether(), 1)])],
        );
        assert_eq!(kinds(&outcome), vec![(Some(0), ErrorKind::IneligibleTarget)]);

        // Not a group member.
        let outcome = run(
            &world,
            vec![contribute_for(SupportTarget::Group, 3, lens(), &[(ether(), 1)])],
        );
        assert_eq!(kinds(&outcome), vec![(Some(0), ErrorKind::IneligibleTarget)]);

        // Other target that exists and is working on it.
        world.put_progress(ProjectProgress::assign(&fixture_catalog(), lens(), CharacterId(3)).unwrap());
        let outcome = run(
            &world,
            vec![contribute_for(SupportTarget::Other, 3, lens(), &[(ether(), 1)])],
        );
        assert!(outcome.is_ok(), "{:?}", outcome.errors);

        // Unknown character.
        let outcome = run(
            &world,
            vec![contribute_for(SupportTarget::Other, 77, lens(), &[(ether(), 1)])],
        );
        assert_eq!(kinds(&outcome), vec![(Some(0), ErrorKind::NotFound)]);
    }

    #[test]
    fn completed_project_is_ineligible() {
        let world = solo_world(1, 0);
        let cat = fixture_catalog();
        let mut progress = ProjectProgress::assign(&cat, serum(), CharacterId(1)).unwrap();
        progress.complete_current_stage(&cat, CharacterId(2)).unwrap();
        world.put_progress(progress);
        let outcome = run(
            &world,
            vec![research_project(ScienceType::Generic, serum(), None)],
        );
        assert_eq!(kinds(&outcome), vec![(Some(0), ErrorKind::IneligibleTarget)]);
    }

    #[test]
    fn generic_credit_needs_target() {
        let world = solo_world(1, 0);
        let outcome = run(
            &world,
            vec![
                research_project(ScienceType::Generic, lens(), None),
                research_project(ScienceType::Generic, lens(), Some(ScienceType::Etheric)),
            ],
        );
        assert_eq!(kinds(&outcome), vec![(Some(0), ErrorKind::InvalidPayload)]);
    }

    // -----------------------------------------------------------------------
    // Test 7: Teaching
    // -----------------------------------------------------------------------
    #[test]
    fn teaching() {
        let world = solo_world(1, 0);
        world.add_character(character(2, None), 0);
        let cat = fixture_catalog();

        let outcome = run(&world, vec![teach(lens(), 2), teach(lens(), 1)]);
        assert_eq!(
            kinds(&outcome),
            vec![
                (Some(0), ErrorKind::IneligibleTarget),
                (Some(1), ErrorKind::IneligibleTarget),
            ]
        );

        let mut mine = ProjectProgress::assign(&cat, lens(), CharacterId(1)).unwrap();
        mine.complete_current_stage(&cat, CharacterId(5)).unwrap();
        world.put_progress(mine);
        let outcome = run(&world, vec![teach(lens(), 2)]);
        assert!(outcome.is_ok(), "{:?}", outcome.errors);
        let plan = outcome.plan.unwrap();
        let taught = plan
            .research
            .iter()
            .find(|p| p.assignee == CharacterId(2))
            .unwrap();
        assert_eq!(taught.current_stage(), Some(1));

        let outcome = run(&world, vec![teach(lens(), 42)]);
        assert_eq!(kinds(&outcome), vec![(Some(0), ErrorKind::NotFound)]);
    }

    // -----------------------------------------------------------------------
    // Test 8: Reputation
    // -----------------------------------------------------------------------
    #[test]
    fn one_reputation_query_per_period() {
        let world = solo_world(1, 0);
        let outcome = run(
            &world,
            vec![
                reputation(guild(), "Who runs the docks?"),
                reputation(guild(), "And the warehouses?"),
                reputation(FactionId(9), "?"),
                reputation(guild(), ""),
            ],
        );
        assert_eq!(
            kinds(&outcome),
            vec![
                (Some(1), ErrorKind::InvalidPayload),
                (Some(2), ErrorKind::NotFound),
                (Some(3), ErrorKind::InvalidPayload),
            ]
        );
    }

    // -----------------------------------------------------------------------
    // Test 9: Batch-level failures and plan contents
    // -----------------------------------------------------------------------
    #[test]
    fn unknown_character_or_period() {
        let world = solo_world(1, 0);
        let cat = fixture_catalog();
        let config = EngineConfig::default();
        let outcome = validate_submission(&cat, &config, &world, &submission("k", 9, vec![]));
        assert_eq!(kinds(&outcome), vec![(None, ErrorKind::NotFound)]);

        let mut sub = submission("k", 1, vec![]);
        sub.period = PeriodId(77);
        let outcome = validate_submission(&cat, &config, &world, &sub);
        assert_eq!(kinds(&outcome), vec![(None, ErrorKind::NotFound)]);
    }

    #[test]
    fn validation_does_not_mutate_world() {
        let world = solo_world(1, 100);
        let item = give_item(&world, 1, rifle());
        let before = world.character(CharacterId(1)).unwrap();
        let outcome = run(&world, vec![purchase(rifle()), modify_own(item, scope())]);
        assert!(outcome.is_ok());
        assert_eq!(world.character(CharacterId(1)).unwrap(), before);
        assert!(world.item(item).unwrap().mods.is_empty());
        assert_eq!(world.ledger().available_funds(CharacterId(1)).unwrap(), 100);
    }

    #[test]
    fn plan_records_household_version() {
        let world = solo_world(1, 100);
        let outcome = run(&world, vec![purchase(rifle())]);
        let plan = outcome.plan.unwrap();
        assert_eq!(plan.locks.len(), 1);
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].description, "Purchased: rifle");
    }
}
