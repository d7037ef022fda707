//! Catalog Index: blueprints, modifications, exotic substances, factions,
//! medicaments and research projects.
//!
//! Built once through [`CatalogBuilder`] and frozen by [`CatalogBuilder::build`];
//! the resulting [`Catalog`] has no `&mut self` methods and is shared freely
//! across request handlers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cost::{CostCurve, EngineeringKind};
use crate::error::ErrorKind;
use crate::id::*;

// ---------------------------------------------------------------------------
// Science and requirement types
// ---------------------------------------------------------------------------

/// Discipline of a science credit, exotic substance or requirement slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScienceType {
    Generic,
    Life,
    Corporeal,
    Etheric,
}

impl ScienceType {
    pub const ALL: [ScienceType; 4] = [
        ScienceType::Generic,
        ScienceType::Life,
        ScienceType::Corporeal,
        ScienceType::Etheric,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScienceType::Generic => "generic",
            ScienceType::Life => "life",
            ScienceType::Corporeal => "corporeal",
            ScienceType::Etheric => "etheric",
        }
    }
}

impl std::fmt::Display for ScienceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a requirement slot accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    /// One credit per declared science action of this type.
    Science(ScienceType),
    /// Any item instance whose blueprint produces this item type.
    Item(ItemTypeId),
    /// Units of one exotic substance.
    Exotic(ExoticId),
    /// A sample carrying `tag`, optionally already researched.
    Sample { tag: String, requires_researched: bool },
}

impl RequirementKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RequirementKind::Science(_) => "science",
            RequirementKind::Item(_) => "item",
            RequirementKind::Exotic(_) => "exotic",
            RequirementKind::Sample { .. } => "sample",
        }
    }
}

/// One requirement of a project stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementDef {
    pub kind: RequirementKind,
    pub amount: u32,
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// An item type. Its two-letter prefix starts every item code of that type.
#[derive(Debug, Clone)]
pub struct ItemTypeDef {
    pub name: String,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct BlueprintDef {
    pub name: String,
    pub item_type: ItemTypeId,
    /// Four-digit blueprint number within the item type.
    pub number: u32,
    pub base_cost: u64,
    /// Whether the blueprint can be bought during downtime.
    pub purchaseable: bool,
    /// Modifications every minted instance starts with.
    pub built_in_mods: Vec<ModId>,
}

#[derive(Debug, Clone)]
pub struct ModDef {
    pub name: String,
    /// Item types the modification may attach to. Empty means any.
    pub item_types: Vec<ItemTypeId>,
}

impl ModDef {
    pub fn applies_to(&self, item_type: ItemTypeId) -> bool {
        self.item_types.is_empty() || self.item_types.contains(&item_type)
    }
}

#[derive(Debug, Clone)]
pub struct ExoticDef {
    pub name: String,
    pub science_type: ScienceType,
}

#[derive(Debug, Clone)]
pub struct FactionDef {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MedicamentDef {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct StageDef {
    pub name: String,
    pub requirements: Vec<RequirementDef>,
}

#[derive(Debug, Clone)]
pub struct ProjectDef {
    pub name: String,
    pub stages: Vec<StageDef>,
}

/// A parsed `<prefix><number>-<sequence>` item code, e.g. `WP0012-003`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullCode {
    pub prefix: String,
    pub number: u32,
    pub sequence: u32,
}

impl FullCode {
    /// Parse a human-entered code. Prefix letters are case-insensitive.
    pub fn parse(code: &str) -> Result<Self, CatalogError> {
        let code = code.trim();
        let bytes = code.as_bytes();
        let well_formed = bytes.len() == 10
            && bytes[..2].iter().all(u8::is_ascii_alphabetic)
            && bytes[2..6].iter().all(u8::is_ascii_digit)
            && bytes[6] == b'-'
            && bytes[7..].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(CatalogError::AmbiguousCode(code.to_string()));
        }
        let number = code[2..6]
            .parse()
            .map_err(|_| CatalogError::AmbiguousCode(code.to_string()))?;
        let sequence = code[7..]
            .parse()
            .map_err(|_| CatalogError::AmbiguousCode(code.to_string()))?;
        Ok(Self {
            prefix: code[..2].to_ascii_uppercase(),
            number,
            sequence,
        })
    }
}

/// `WP0012`
pub fn blueprint_code(prefix: &str, number: u32) -> String {
    format!("{prefix}{number:04}")
}

/// `WP0012-003`
pub fn full_code(prefix: &str, number: u32, sequence: u32) -> String {
    format!("{prefix}{number:04}-{sequence:03}")
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for the immutable [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    item_types: Vec<ItemTypeDef>,
    blueprints: Vec<BlueprintDef>,
    mods: Vec<ModDef>,
    exotics: Vec<ExoticDef>,
    factions: Vec<FactionDef>,
    medicaments: Vec<MedicamentDef>,
    projects: Vec<ProjectDef>,
    cost_curve: CostCurve,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default engineering cost curve.
    pub fn with_cost_curve(mut self, curve: CostCurve) -> Self {
        self.cost_curve = curve;
        self
    }

    pub fn set_cost_curve(&mut self, curve: CostCurve) {
        self.cost_curve = curve;
    }

    pub fn register_item_type(&mut self, name: &str, prefix: &str) -> ItemTypeId {
        let id = ItemTypeId(self.item_types.len() as u32);
        self.item_types.push(ItemTypeDef {
            name: name.to_string(),
            prefix: prefix.to_ascii_uppercase(),
        });
        id
    }

    pub fn register_blueprint(&mut self, def: BlueprintDef) -> BlueprintId {
        let id = BlueprintId(self.blueprints.len() as u32);
        self.blueprints.push(def);
        id
    }

    pub fn register_mod(&mut self, name: &str, item_types: Vec<ItemTypeId>) -> ModId {
        let id = ModId(self.mods.len() as u32);
        self.mods.push(ModDef {
            name: name.to_string(),
            item_types,
        });
        id
    }

    pub fn register_exotic(&mut self, name: &str, science_type: ScienceType) -> ExoticId {
        let id = ExoticId(self.exotics.len() as u32);
        self.exotics.push(ExoticDef {
            name: name.to_string(),
            science_type,
        });
        id
    }

    pub fn register_faction(&mut self, name: &str) -> FactionId {
        let id = FactionId(self.factions.len() as u32);
        self.factions.push(FactionDef {
            name: name.to_string(),
        });
        id
    }

    pub fn register_medicament(&mut self, name: &str) -> MedicamentId {
        let id = MedicamentId(self.medicaments.len() as u32);
        self.medicaments.push(MedicamentDef {
            name: name.to_string(),
        });
        id
    }

    pub fn register_project(&mut self, name: &str, stages: Vec<StageDef>) -> ProjectId {
        let id = ProjectId(self.projects.len() as u32);
        self.projects.push(ProjectDef {
            name: name.to_string(),
            stages,
        });
        id
    }

    /// Lookup item type ID by name.
    pub fn item_type_id(&self, name: &str) -> Option<ItemTypeId> {
        position(&self.item_types, |d| d.name == name).map(ItemTypeId)
    }

    pub fn mod_id(&self, name: &str) -> Option<ModId> {
        position(&self.mods, |d| d.name == name).map(ModId)
    }

    pub fn exotic_id(&self, name: &str) -> Option<ExoticId> {
        position(&self.exotics, |d| d.name == name).map(ExoticId)
    }

    /// Validate every cross reference and freeze.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        if !self.cost_curve.is_valid() {
            return Err(CatalogError::InvalidCostCurve);
        }

        check_unique_names("item type", self.item_types.iter().map(|d| d.name.as_str()))?;
        check_unique_names("blueprint", self.blueprints.iter().map(|d| d.name.as_str()))?;
        check_unique_names("modification", self.mods.iter().map(|d| d.name.as_str()))?;
        check_unique_names("exotic", self.exotics.iter().map(|d| d.name.as_str()))?;
        check_unique_names("faction", self.factions.iter().map(|d| d.name.as_str()))?;
        check_unique_names("medicament", self.medicaments.iter().map(|d| d.name.as_str()))?;
        check_unique_names("project", self.projects.iter().map(|d| d.name.as_str()))?;

        for def in &self.item_types {
            if def.prefix.len() != 2 || !def.prefix.bytes().all(|b| b.is_ascii_alphabetic()) {
                return Err(CatalogError::InvalidPrefix(def.prefix.clone()));
            }
        }

        let mut codes = HashMap::new();
        for (i, bp) in self.blueprints.iter().enumerate() {
            let item_type = self.item_types.get(bp.item_type.0 as usize).ok_or_else(|| {
                CatalogError::InvalidReference(format!(
                    "blueprint '{}' uses unknown item type {:?}",
                    bp.name, bp.item_type
                ))
            })?;
            if bp.number > 9999 {
                return Err(CatalogError::InvalidReference(format!(
                    "blueprint '{}' number {} does not fit four digits",
                    bp.name, bp.number
                )));
            }
            for m in &bp.built_in_mods {
                if m.0 as usize >= self.mods.len() {
                    return Err(CatalogError::InvalidReference(format!(
                        "blueprint '{}' has unknown built-in modification {m:?}",
                        bp.name
                    )));
                }
            }
            let key = (item_type.prefix.clone(), bp.number);
            if codes.insert(key, BlueprintId(i as u32)).is_some() {
                return Err(CatalogError::DuplicateCode(blueprint_code(
                    &item_type.prefix,
                    bp.number,
                )));
            }
        }

        for m in &self.mods {
            if let Some(bad) = m.item_types.iter().find(|t| t.0 as usize >= self.item_types.len()) {
                return Err(CatalogError::InvalidReference(format!(
                    "modification '{}' restricted to unknown item type {bad:?}",
                    m.name
                )));
            }
        }

        for (p, project) in self.projects.iter().enumerate() {
            for (s, stage) in project.stages.iter().enumerate() {
                for req in &stage.requirements {
                    if req.amount == 0 {
                        return Err(CatalogError::EmptyRequirement {
                            project: ProjectId(p as u32),
                            stage: s,
                        });
                    }
                    let valid = match &req.kind {
                        RequirementKind::Item(t) => (t.0 as usize) < self.item_types.len(),
                        RequirementKind::Exotic(e) => (e.0 as usize) < self.exotics.len(),
                        RequirementKind::Science(_) | RequirementKind::Sample { .. } => true,
                    };
                    if !valid {
                        return Err(CatalogError::InvalidReference(format!(
                            "project '{}' stage '{}' requires unknown {} {:?}",
                            project.name,
                            stage.name,
                            req.kind.type_name(),
                            req.kind
                        )));
                    }
                }
            }
        }

        Ok(Catalog {
            item_types: self.item_types,
            blueprints: self.blueprints,
            blueprint_codes: codes,
            mods: self.mods,
            exotics: self.exotics,
            factions: self.factions,
            medicaments: self.medicaments,
            projects: self.projects,
            cost_curve: self.cost_curve,
        })
    }
}

fn position<T>(defs: &[T], pred: impl Fn(&T) -> bool) -> Option<u32> {
    defs.iter().position(pred).map(|i| i as u32)
}

fn check_unique_names<'a>(
    kind: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), CatalogError> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(CatalogError::DuplicateName(format!("{kind} '{name}'")));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable catalog. Frozen after build(). Thread-safe to share.
#[derive(Debug)]
pub struct Catalog {
    item_types: Vec<ItemTypeDef>,
    blueprints: Vec<BlueprintDef>,
    blueprint_codes: HashMap<(String, u32), BlueprintId>,
    mods: Vec<ModDef>,
    exotics: Vec<ExoticDef>,
    factions: Vec<FactionDef>,
    medicaments: Vec<MedicamentDef>,
    projects: Vec<ProjectDef>,
    cost_curve: CostCurve,
}

impl Catalog {
    pub fn get_item_type(&self, id: ItemTypeId) -> Result<&ItemTypeDef, CatalogError> {
        self.item_types
            .get(id.0 as usize)
            .ok_or_else(|| CatalogError::NotFound(format!("item type {}", id.0)))
    }

    pub fn get_blueprint(&self, id: BlueprintId) -> Result<&BlueprintDef, CatalogError> {
        self.blueprints
            .get(id.0 as usize)
            .ok_or_else(|| CatalogError::NotFound(format!("blueprint {}", id.0)))
    }

    pub fn get_modification(&self, id: ModId) -> Result<&ModDef, CatalogError> {
        self.mods
            .get(id.0 as usize)
            .ok_or_else(|| CatalogError::NotFound(format!("modification {}", id.0)))
    }

    pub fn get_exotic(&self, id: ExoticId) -> Result<&ExoticDef, CatalogError> {
        self.exotics
            .get(id.0 as usize)
            .ok_or_else(|| CatalogError::NotFound(format!("exotic substance {}", id.0)))
    }

    pub fn get_faction(&self, id: FactionId) -> Result<&FactionDef, CatalogError> {
        self.factions
            .get(id.0 as usize)
            .ok_or_else(|| CatalogError::NotFound(format!("faction {}", id.0)))
    }

    pub fn get_medicament(&self, id: MedicamentId) -> Result<&MedicamentDef, CatalogError> {
        self.medicaments
            .get(id.0 as usize)
            .ok_or_else(|| CatalogError::NotFound(format!("medicament {}", id.0)))
    }

    pub fn get_research_project(&self, id: ProjectId) -> Result<&ProjectDef, CatalogError> {
        self.projects
            .get(id.0 as usize)
            .ok_or_else(|| CatalogError::NotFound(format!("research project {}", id.0)))
    }

    pub fn get_stage_requirements(
        &self,
        project: ProjectId,
        stage: usize,
    ) -> Result<&[RequirementDef], CatalogError> {
        let def = self.get_research_project(project)?;
        def.stages
            .get(stage)
            .map(|s| s.requirements.as_slice())
            .ok_or_else(|| {
                CatalogError::NotFound(format!("stage {stage} of research project {}", project.0))
            })
    }

    /// The item type a blueprint produces.
    pub fn blueprint_item_type(&self, id: BlueprintId) -> Result<&ItemTypeDef, CatalogError> {
        let bp = self.get_blueprint(id)?;
        self.get_item_type(bp.item_type)
    }

    /// `WP0012` for a blueprint.
    pub fn blueprint_code(&self, id: BlueprintId) -> Result<String, CatalogError> {
        let bp = self.get_blueprint(id)?;
        let item_type = self.get_item_type(bp.item_type)?;
        Ok(blueprint_code(&item_type.prefix, bp.number))
    }

    /// `WP0012-003` for a blueprint and instance sequence.
    pub fn full_code(&self, id: BlueprintId, sequence: u32) -> Result<String, CatalogError> {
        let bp = self.get_blueprint(id)?;
        let item_type = self.get_item_type(bp.item_type)?;
        Ok(full_code(&item_type.prefix, bp.number, sequence))
    }

    /// Resolve an item code to its blueprint and instance sequence.
    ///
    /// Malformed codes are `AmbiguousCode`; well-formed codes naming no
    /// blueprint are `NotFound`. Whether the instance exists is a question
    /// for the item store.
    pub fn resolve_full_code(&self, code: &str) -> Result<(BlueprintId, u32), CatalogError> {
        let parsed = FullCode::parse(code)?;
        let id = self
            .blueprint_codes
            .get(&(parsed.prefix.clone(), parsed.number))
            .copied()
            .ok_or_else(|| CatalogError::NotFound(format!("item code {}", code.trim())))?;
        Ok((id, parsed.sequence))
    }

    pub fn cost_curve(&self) -> &CostCurve {
        &self.cost_curve
    }

    /// Engineering cost for a blueprint's instance carrying `mod_count`
    /// modifications (attached plus earlier same-batch ones).
    pub fn engineering_cost(
        &self,
        kind: EngineeringKind,
        blueprint: BlueprintId,
        mod_count: u32,
    ) -> Result<u64, CatalogError> {
        let bp = self.get_blueprint(blueprint)?;
        Ok(self.cost_curve.cost(kind, bp.base_cost, mod_count))
    }

    /// Exotic substances of a science type; `Generic` means every substance.
    pub fn exotics_of(&self, science_type: ScienceType) -> Vec<ExoticId> {
        self.exotics
            .iter()
            .enumerate()
            .filter(|(_, d)| science_type == ScienceType::Generic || d.science_type == science_type)
            .map(|(i, _)| ExoticId(i as u32))
            .collect()
    }

    pub fn blueprint_id(&self, name: &str) -> Option<BlueprintId> {
        position(&self.blueprints, |d| d.name == name).map(BlueprintId)
    }

    pub fn item_type_id(&self, name: &str) -> Option<ItemTypeId> {
        position(&self.item_types, |d| d.name == name).map(ItemTypeId)
    }

    pub fn mod_id(&self, name: &str) -> Option<ModId> {
        position(&self.mods, |d| d.name == name).map(ModId)
    }

    pub fn exotic_id(&self, name: &str) -> Option<ExoticId> {
        position(&self.exotics, |d| d.name == name).map(ExoticId)
    }

    pub fn faction_id(&self, name: &str) -> Option<FactionId> {
        position(&self.factions, |d| d.name == name).map(FactionId)
    }

    pub fn medicament_id(&self, name: &str) -> Option<MedicamentId> {
        position(&self.medicaments, |d| d.name == name).map(MedicamentId)
    }

    pub fn project_id(&self, name: &str) -> Option<ProjectId> {
        position(&self.projects, |d| d.name == name).map(ProjectId)
    }

    pub fn blueprint_count(&self) -> usize {
        self.blueprints.len()
    }

    pub fn mod_count(&self) -> usize {
        self.mods.len()
    }

    pub fn exotic_count(&self) -> usize {
        self.exotics.len()
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed item code '{0}', expected e.g. WP0012-003")]
    AmbiguousCode(String),
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("duplicate blueprint code {0}")]
    DuplicateCode(String),
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    #[error("item type prefix '{0}' must be two letters")]
    InvalidPrefix(String),
    #[error("research project {project:?} stage {stage} has a zero-amount requirement")]
    EmptyRequirement { project: ProjectId, stage: usize },
    #[error("cost curve parameters must be finite and non-negative")]
    InvalidCostCurve,
}

impl CatalogError {
    /// Boundary category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::InvalidPayload,
        }
    }
}
