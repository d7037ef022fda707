//! Research progress for the downtime resolution engine.
//!
//! A research project is a catalog entry with ordered stages; each stage is a
//! list of typed requirement slots. A character working on a project (the
//! *assignee*) has one [`ProjectProgress`] for it, shared with everyone who
//! supports them: contributions from other characters land in the same
//! slots and the same contribution ledger.
//!
//! # Lifecycle
//!
//! 1. [`ProjectProgress::assign`] starts the assignee at stage 0.
//! 2. [`evaluator::evaluate`] (or [`ProjectProgress::evaluate`]) decides what
//!    an offer would fill, without mutating anything.
//! 3. [`ProjectProgress::apply`] books an evaluation into the slots and
//!    advances the stage once every slot is satisfied.
//! 4. Teaching ([`ProjectProgress::complete_current_stage`]) fills the whole
//!    current stage at once, if the teacher already completed it.

pub mod evaluator;

use downtime_core::catalog::{Catalog, CatalogError, RequirementDef, RequirementKind, ScienceType};
use downtime_core::error::ErrorKind;
use downtime_core::id::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use evaluator::{ContributionOffer, Evaluation};

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// Progress on one requirement of the active stage.
///
/// Invariant: `satisfied <= needed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotProgress {
    pub requirement: RequirementKind,
    pub needed: u32,
    pub satisfied: u32,
}

impl SlotProgress {
    pub fn from_def(def: &RequirementDef) -> Self {
        Self {
            requirement: def.kind.clone(),
            needed: def.amount,
            satisfied: 0,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.needed.saturating_sub(self.satisfied)
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied >= self.needed
    }
}

/// True when every slot has `satisfied >= needed`.
pub fn meets_requirements(slots: &[SlotProgress]) -> bool {
    slots.iter().all(SlotProgress::is_satisfied)
}

// ---------------------------------------------------------------------------
// Contribution ledger
// ---------------------------------------------------------------------------

/// What a contribution was made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionSource {
    Exotic(ExoticId),
    Item(ItemId),
    Sample(SampleId),
    Science(ScienceType),
    /// A whole stage taught by a character who had completed it.
    Teaching,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub contributor: CharacterId,
    pub stage: usize,
    pub slot: usize,
    pub amount: u32,
    pub source: ContributionSource,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where an assignee stands on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMark {
    Stage(usize),
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResearchState {
    InProgress {
        stage: usize,
        slots: Vec<SlotProgress>,
    },
    Completed,
}

/// Units added to one slot by one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDelta {
    pub slot: usize,
    pub added: u32,
}

/// The stage-progress change produced by one contribution or teaching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDelta {
    pub project: ProjectId,
    pub assignee: CharacterId,
    pub stage: usize,
    pub slots: Vec<SlotDelta>,
    pub after: ProgressMark,
}

impl StageDelta {
    pub fn advanced(&self) -> bool {
        self.after != ProgressMark::Stage(self.stage)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResearchError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("research project {project:?} has no stages")]
    NoStages { project: ProjectId },

    #[error("research project {project:?} is already complete for {assignee:?}")]
    AlreadyCompleted {
        project: ProjectId,
        assignee: CharacterId,
    },

    #[error("evaluation was made for stage {evaluated} but the project is at {current:?}")]
    StageMismatch {
        evaluated: usize,
        current: ProgressMark,
    },

    #[error("a character cannot teach an invention to themselves")]
    SelfTeaching,

    #[error("teacher has not completed stage {stage} of research project {project:?}")]
    TeacherNotQualified { project: ProjectId, stage: usize },
}

impl ResearchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResearchError::Catalog(e) => e.kind(),
            ResearchError::NoStages { .. } => ErrorKind::InvalidPayload,
            ResearchError::AlreadyCompleted { .. }
            | ResearchError::SelfTeaching
            | ResearchError::TeacherNotQualified { .. } => ErrorKind::IneligibleTarget,
            ResearchError::StageMismatch { .. } => ErrorKind::ConcurrentModification,
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectProgress
// ---------------------------------------------------------------------------

/// One assignee's progress on one research project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProgress {
    pub project: ProjectId,
    pub assignee: CharacterId,
    state: ResearchState,
    contributions: Vec<Contribution>,
}

impl ProjectProgress {
    /// Start `assignee` on `project` at stage 0.
    pub fn assign(
        catalog: &Catalog,
        project: ProjectId,
        assignee: CharacterId,
    ) -> Result<Self, ResearchError> {
        let slots = stage_slots(catalog, project, 0)?;
        Ok(Self {
            project,
            assignee,
            state: ResearchState::InProgress { stage: 0, slots },
            contributions: Vec::new(),
        })
    }

    pub fn state(&self) -> &ResearchState {
        &self.state
    }

    pub fn mark(&self) -> ProgressMark {
        match &self.state {
            ResearchState::InProgress { stage, .. } => ProgressMark::Stage(*stage),
            ResearchState::Completed => ProgressMark::Completed,
        }
    }

    pub fn current_stage(&self) -> Option<usize> {
        match &self.state {
            ResearchState::InProgress { stage, .. } => Some(*stage),
            ResearchState::Completed => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, ResearchState::Completed)
    }

    /// Slots of the active stage; empty once the project is complete.
    pub fn slots(&self) -> &[SlotProgress] {
        match &self.state {
            ResearchState::InProgress { slots, .. } => slots,
            ResearchState::Completed => &[],
        }
    }

    /// True when the assignee is past `stage`.
    pub fn has_completed_stage(&self, stage: usize) -> bool {
        match &self.state {
            ResearchState::InProgress { stage: current, .. } => stage < *current,
            ResearchState::Completed => true,
        }
    }

    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    /// Whether the active stage has every slot satisfied.
    pub fn meets_requirements(&self) -> bool {
        match &self.state {
            ResearchState::InProgress { slots, .. } => meets_requirements(slots),
            ResearchState::Completed => false,
        }
    }

    /// Evaluate an offer against the active stage.
    pub fn evaluate(
        &self,
        offer: &ContributionOffer,
        access_granted: bool,
    ) -> Result<Evaluation, ResearchError> {
        match &self.state {
            ResearchState::InProgress { stage, slots } => {
                Ok(evaluator::evaluate(*stage, slots, offer, access_granted))
            }
            ResearchState::Completed => Err(ResearchError::AlreadyCompleted {
                project: self.project,
                assignee: self.assignee,
            }),
        }
    }

    /// Book an evaluation made against this progress, then advance if the
    /// stage is complete.
    pub fn apply(
        &mut self,
        catalog: &Catalog,
        evaluation: &Evaluation,
        contributor: CharacterId,
    ) -> Result<StageDelta, ResearchError> {
        let current = self.mark();
        let ResearchState::InProgress { stage, slots } = &mut self.state else {
            return Err(ResearchError::AlreadyCompleted {
                project: self.project,
                assignee: self.assignee,
            });
        };
        if *stage != evaluation.stage || slots.len() != evaluation.slots.len() {
            return Err(ResearchError::StageMismatch {
                evaluated: evaluation.stage,
                current,
            });
        }
        let stage = *stage;

        let mut deltas: Vec<SlotDelta> = Vec::new();
        for fill in &evaluation.fills {
            let Some(slot) = slots.get_mut(fill.slot) else {
                continue;
            };
            let added = fill.amount.min(slot.remaining());
            if added == 0 {
                continue;
            }
            slot.satisfied += added;
            match deltas.iter_mut().find(|d| d.slot == fill.slot) {
                Some(d) => d.added += added,
                None => deltas.push(SlotDelta {
                    slot: fill.slot,
                    added,
                }),
            }
            self.contributions.push(Contribution {
                contributor,
                stage,
                slot: fill.slot,
                amount: added,
                source: fill.source,
            });
        }

        let after = self.advance(catalog)?;
        Ok(StageDelta {
            project: self.project,
            assignee: self.assignee,
            stage,
            slots: deltas,
            after,
        })
    }

    /// Move to the next stage (or completion) if the active stage is
    /// satisfied. Returns where the assignee stands afterwards.
    pub fn advance(&mut self, catalog: &Catalog) -> Result<ProgressMark, ResearchError> {
        let ResearchState::InProgress { stage, slots } = &self.state else {
            return Ok(ProgressMark::Completed);
        };
        if !meets_requirements(slots) {
            return Ok(ProgressMark::Stage(*stage));
        }

        let next = *stage + 1;
        let def = catalog.get_research_project(self.project)?;
        if next >= def.stages.len() {
            self.state = ResearchState::Completed;
            info!(
                project = self.project.0,
                assignee = self.assignee.0,
                "research project completed"
            );
        } else {
            let slots = stage_slots(catalog, self.project, next)?;
            self.state = ResearchState::InProgress { stage: next, slots };
            info!(
                project = self.project.0,
                assignee = self.assignee.0,
                stage = next,
                "research stage advanced"
            );
        }
        Ok(self.mark())
    }

    /// Teaching: fill every slot of the active stage and advance.
    pub fn complete_current_stage(
        &mut self,
        catalog: &Catalog,
        teacher: CharacterId,
    ) -> Result<StageDelta, ResearchError> {
        let ResearchState::InProgress { stage, slots } = &mut self.state else {
            return Err(ResearchError::AlreadyCompleted {
                project: self.project,
                assignee: self.assignee,
            });
        };
        let stage = *stage;
        let mut deltas = Vec::new();
        for (i, slot) in slots.iter_mut().enumerate() {
            let added = slot.remaining();
            slot.satisfied = slot.needed;
            if added > 0 {
                deltas.push(SlotDelta { slot: i, added });
                self.contributions.push(Contribution {
                    contributor: teacher,
                    stage,
                    slot: i,
                    amount: added,
                    source: ContributionSource::Teaching,
                });
            }
        }
        let after = self.advance(catalog)?;
        Ok(StageDelta {
            project: self.project,
            assignee: self.assignee,
            stage,
            slots: deltas,
            after,
        })
    }
}

fn stage_slots(
    catalog: &Catalog,
    project: ProjectId,
    stage: usize,
) -> Result<Vec<SlotProgress>, ResearchError> {
    let def = catalog.get_research_project(project)?;
    if def.stages.is_empty() {
        return Err(ResearchError::NoStages { project });
    }
    let reqs = catalog.get_stage_requirements(project, stage)?;
    Ok(reqs.iter().map(SlotProgress::from_def).collect())
}

/// Check whether `teacher` may teach `project` to `target`.
///
/// The target may not be the teacher and may not have completed the
/// project; the teacher must have completed the stage the target is on
/// (stage 0 when the target has not started). Returns that stage.
pub fn check_teaching(
    project: ProjectId,
    teacher: CharacterId,
    teacher_progress: Option<&ProjectProgress>,
    target: CharacterId,
    target_progress: Option<&ProjectProgress>,
) -> Result<usize, ResearchError> {
    if teacher == target {
        return Err(ResearchError::SelfTeaching);
    }
    let stage = match target_progress {
        Some(p) => p.current_stage().ok_or(ResearchError::AlreadyCompleted {
            project,
            assignee: target,
        })?,
        None => 0,
    };
    let qualified = teacher_progress.is_some_and(|p| p.has_completed_stage(stage));
    if !qualified {
        return Err(ResearchError::TeacherNotQualified { project, stage });
    }
    Ok(stage)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use downtime_core::inventory::ExoticStack;
    use downtime_core::test_utils::*;
    use evaluator::{OfferedItem, ScienceCredit};

    const ADA: CharacterId = CharacterId(1);
    const BEN: CharacterId = CharacterId(2);

    fn grind_offer() -> ContributionOffer {
        ContributionOffer {
            exotics: vec![ExoticStack {
                exotic: ether(),
                quantity: 2,
            }],
            items: vec![OfferedItem {
                id: ItemId(7),
                item_type: weapon(),
            }],
            science: vec![ScienceCredit {
                science_type: ScienceType::Etheric,
                target: None,
            }],
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Test 1: Assignment starts at stage 0 with fresh slots
    // -----------------------------------------------------------------------
    #[test]
    fn assign_starts_stage_zero() {
        let cat = fixture_catalog();
        let p = ProjectProgress::assign(&cat, lens(), ADA).unwrap();
        assert_eq!(p.current_stage(), Some(0));
        assert_eq!(p.slots().len(), 3);
        assert!(p.slots().iter().all(|s| s.satisfied == 0));
        assert!(!p.meets_requirements());
    }

    #[test]
    fn assign_unknown_project_fails() {
        let cat = fixture_catalog();
        let err = ProjectProgress::assign(&cat, ProjectId(42), ADA).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // -----------------------------------------------------------------------
    // Test 2: Full contribution advances the stage
    // -----------------------------------------------------------------------
    #[test]
    fn full_contribution_advances() {
        let cat = fixture_catalog();
        let mut p = ProjectProgress::assign(&cat, lens(), ADA).unwrap();
        let eval = p.evaluate(&grind_offer(), true).unwrap();
        assert!(eval.eligible);

        let delta = p.apply(&cat, &eval, ADA).unwrap();
        assert!(delta.advanced());
        assert_eq!(delta.after, ProgressMark::Stage(1));
        assert_eq!(delta.slots.len(), 3);
        assert_eq!(p.current_stage(), Some(1));
        assert_eq!(p.slots().len(), 2);
        assert!(p.has_completed_stage(0));
        assert!(!p.has_completed_stage(1));
        assert_eq!(p.contributions().len(), 3);
    }

    // -----------------------------------------------------------------------
    // Test 3: Partial contributions accumulate across contributors
    // -----------------------------------------------------------------------
    #[test]
    fn partial_contributions_accumulate() {
        let cat = fixture_catalog();
        let mut p = ProjectProgress::assign(&cat, lens(), ADA).unwrap();

        let first = ContributionOffer {
            exotics: vec![ExoticStack {
                exotic: ether(),
                quantity: 1,
            }],
            ..Default::default()
        };
        let eval = p.evaluate(&first, true).unwrap();
        let delta = p.apply(&cat, &eval, BEN).unwrap();
        assert!(!delta.advanced());
        assert_eq!(p.slots()[0].satisfied, 1);

        let eval = p.evaluate(&grind_offer(), true).unwrap();
        // Only one more ether is needed.
        assert_eq!(eval.slots[0].added, 1);
        let delta = p.apply(&cat, &eval, ADA).unwrap();
        assert!(delta.advanced());

        let by_ben: u32 = p
            .contributions()
            .iter()
            .filter(|c| c.contributor == BEN)
            .map(|c| c.amount)
            .sum();
        assert_eq!(by_ben, 1);
    }

    // -----------------------------------------------------------------------
    // Test 4: Stale evaluation rejected
    // -----------------------------------------------------------------------
    #[test]
    fn stale_evaluation_rejected() {
        let cat = fixture_catalog();
        let mut p = ProjectProgress::assign(&cat, lens(), ADA).unwrap();
        let eval = p.evaluate(&grind_offer(), true).unwrap();
        p.apply(&cat, &eval, ADA).unwrap();

        let err = p.apply(&cat, &eval, ADA).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
    }

    // -----------------------------------------------------------------------
    // Test 5: Completing the last stage completes the project
    // -----------------------------------------------------------------------
    #[test]
    fn last_stage_completes() {
        let cat = fixture_catalog();
        let mut p = ProjectProgress::assign(&cat, serum(), ADA).unwrap();
        let offer = ContributionOffer {
            science: vec![
                ScienceCredit {
                    science_type: ScienceType::Generic,
                    target: None,
                },
                ScienceCredit {
                    science_type: ScienceType::Generic,
                    target: None,
                },
            ],
            ..Default::default()
        };
        let eval = p.evaluate(&offer, true).unwrap();
        let delta = p.apply(&cat, &eval, ADA).unwrap();
        assert_eq!(delta.after, ProgressMark::Completed);
        assert!(p.is_completed());
        assert!(p.slots().is_empty());
        assert!(p.has_completed_stage(0));

        assert!(matches!(
            p.evaluate(&offer, true),
            Err(ResearchError::AlreadyCompleted { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Test 6: Teaching
    // -----------------------------------------------------------------------
    #[test]
    fn teaching_fills_stage() {
        let cat = fixture_catalog();
        let mut p = ProjectProgress::assign(&cat, lens(), BEN).unwrap();
        let delta = p.complete_current_stage(&cat, ADA).unwrap();
        assert_eq!(delta.after, ProgressMark::Stage(1));
        assert!(p
            .contributions()
            .iter()
            .all(|c| c.source == ContributionSource::Teaching && c.contributor == ADA));
    }

    #[test]
    fn teaching_rules() {
        let cat = fixture_catalog();
        let mut teacher = ProjectProgress::assign(&cat, lens(), ADA).unwrap();
        let student = ProjectProgress::assign(&cat, lens(), BEN).unwrap();

        assert_eq!(
            check_teaching(lens(), ADA, Some(&teacher), ADA, Some(&teacher)),
            Err(ResearchError::SelfTeaching)
        );
        assert_eq!(
            check_teaching(lens(), ADA, Some(&teacher), BEN, Some(&student)),
            Err(ResearchError::TeacherNotQualified {
                project: lens(),
                stage: 0
            })
        );
        assert!(check_teaching(lens(), ADA, None, BEN, None).is_err());

        teacher.complete_current_stage(&cat, BEN).unwrap();
        assert_eq!(
            check_teaching(lens(), ADA, Some(&teacher), BEN, Some(&student)),
            Ok(0)
        );
        assert_eq!(check_teaching(lens(), ADA, Some(&teacher), BEN, None), Ok(0));
    }

    #[test]
    fn cannot_teach_completed_target() {
        let cat = fixture_catalog();
        let mut teacher = ProjectProgress::assign(&cat, serum(), ADA).unwrap();
        teacher.complete_current_stage(&cat, BEN).unwrap();
        let mut student = ProjectProgress::assign(&cat, serum(), BEN).unwrap();
        student.complete_current_stage(&cat, ADA).unwrap();

        let err = check_teaching(serum(), ADA, Some(&teacher), BEN, Some(&student)).unwrap_err();
        assert!(matches!(err, ResearchError::AlreadyCompleted { .. }));
        assert_eq!(err.kind(), ErrorKind::IneligibleTarget);
    }

    // -----------------------------------------------------------------------
    // Test 7: Serialization round trip
    // -----------------------------------------------------------------------
    #[test]
    fn serialization_round_trip() {
        let cat = fixture_catalog();
        let mut p = ProjectProgress::assign(&cat, lens(), ADA).unwrap();
        let eval = p.evaluate(&grind_offer(), true).unwrap();
        p.apply(&cat, &eval, ADA).unwrap();

        let json = serde_json::to_string(&p).unwrap();
        let back: ProjectProgress = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
