//! Resolution pipeline: reads campaign data files, resolves name references,
//! builds the catalog and seeds the world.
//!
//! A data directory holds one file per base name in any of RON, JSON or
//! TOML. `item_types` and `blueprints` are required; everything else is
//! optional. List files in TOML wrap their array in a table under the base
//! name (`[[blueprints]]`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use downtime_core::catalog::{
    BlueprintDef, Catalog, CatalogBuilder, CatalogError, RequirementDef, RequirementKind, StageDef,
};
use downtime_core::character::{Character, Group};
use downtime_core::config::{ConfigError, EngineConfig};
use downtime_core::cost::CostCurve;
use downtime_core::id::*;
use downtime_core::inventory::{Holdings, Owner};
use downtime_resolve::orchestrator::Orchestrator;
use downtime_resolve::world::{NewSample, World};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::schema::*;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// The resolved catalog failed its own checks.
    #[error("invalid catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("invalid engine configuration: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for `{base_name}.ron`, `.toml` or `.json`.
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// more than one format exists for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let extensions = ["ron", "toml", "json"];
    let mut found: Option<PathBuf> = None;

    for ext in &extensions {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(ref existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing.clone(),
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, e: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Read a file and deserialize it according to its format.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list. For TOML, extracts the array at `toml_key` from the
/// top-level table; RON and JSON files are the array itself.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let table: toml::Value = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let array = table
                .get(toml_key)
                .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?
                .clone();
            array
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

/// Load an optional list file; absent means empty.
fn optional_list<T: DeserializeOwned>(dir: &Path, base_name: &str) -> Result<(Vec<T>, PathBuf), DataLoadError> {
    match find_data_file(dir, base_name)? {
        Some(path) => Ok((deserialize_list(&path, base_name)?, path)),
        None => Ok((Vec::new(), dir.join(base_name))),
    }
}

/// Load an optional single-value file; absent means `T::default()`.
fn optional_value<T: DeserializeOwned + Default>(dir: &Path, base_name: &str) -> Result<T, DataLoadError> {
    match find_data_file(dir, base_name)? {
        Some(path) => deserialize_file(&path),
        None => Ok(T::default()),
    }
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, DataLoadError> {
    map.get(name).ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Return a `DuplicateName` error if `name` is already in the map.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

fn resolve_all<V: Copy>(
    map: &HashMap<String, V>,
    names: &[String],
    file: &Path,
    expected_kind: &'static str,
) -> Result<Vec<V>, DataLoadError> {
    names
        .iter()
        .map(|n| resolve_name(map, n, file, expected_kind).copied())
        .collect()
}

// ===========================================================================
// Catalog
// ===========================================================================

/// Name tables built while loading, used again to seed the world.
#[derive(Debug, Default)]
struct Names {
    item_types: HashMap<String, ItemTypeId>,
    blueprints: HashMap<String, BlueprintId>,
    mods: HashMap<String, ModId>,
    exotics: HashMap<String, ExoticId>,
    medicaments: HashMap<String, MedicamentId>,
}

fn load_catalog(dir: &Path) -> Result<(Catalog, Names), DataLoadError> {
    let mut b = CatalogBuilder::new();
    let mut names = Names::default();

    let path = require_data_file(dir, "item_types")?;
    for def in deserialize_list::<ItemTypeData>(&path, "item_types")? {
        check_duplicate(&names.item_types, &def.name, &path)?;
        let id = b.register_item_type(&def.name, &def.prefix);
        names.item_types.insert(def.name, id);
    }

    let (mods, path) = optional_list::<ModificationData>(dir, "modifications")?;
    for def in mods {
        check_duplicate(&names.mods, &def.name, &path)?;
        let types = resolve_all(&names.item_types, &def.item_types, &path, "item type")?;
        let id = b.register_mod(&def.name, types);
        names.mods.insert(def.name, id);
    }

    let path = require_data_file(dir, "blueprints")?;
    for def in deserialize_list::<BlueprintData>(&path, "blueprints")? {
        check_duplicate(&names.blueprints, &def.name, &path)?;
        let item_type = *resolve_name(&names.item_types, &def.item_type, &path, "item type")?;
        let built_in_mods = resolve_all(&names.mods, &def.built_in_mods, &path, "modification")?;
        let id = b.register_blueprint(BlueprintDef {
            name: def.name.clone(),
            item_type,
            number: def.number,
            base_cost: def.base_cost,
            purchaseable: def.purchaseable,
            built_in_mods,
        });
        names.blueprints.insert(def.name, id);
    }

    let (exotics, path) = optional_list::<ExoticData>(dir, "exotics")?;
    for def in exotics {
        check_duplicate(&names.exotics, &def.name, &path)?;
        let id = b.register_exotic(&def.name, def.science_type);
        names.exotics.insert(def.name, id);
    }

    let (factions, _) = optional_list::<NamedData>(dir, "factions")?;
    for def in factions {
        b.register_faction(&def.name);
    }

    let (medicaments, path) = optional_list::<NamedData>(dir, "medicaments")?;
    for def in medicaments {
        check_duplicate(&names.medicaments, &def.name, &path)?;
        let id = b.register_medicament(&def.name);
        names.medicaments.insert(def.name, id);
    }

    let (projects, path) = optional_list::<ProjectData>(dir, "projects")?;
    for def in projects {
        let stages = def
            .stages
            .into_iter()
            .map(|stage| {
                let requirements = stage
                    .requirements
                    .into_iter()
                    .map(|req| {
                        let kind = match req.kind {
                            RequirementKindData::Science(t) => RequirementKind::Science(t),
                            RequirementKindData::Item(name) => RequirementKind::Item(
                                *resolve_name(&names.item_types, &name, &path, "item type")?,
                            ),
                            RequirementKindData::Exotic(name) => RequirementKind::Exotic(
                                *resolve_name(&names.exotics, &name, &path, "exotic")?,
                            ),
                            RequirementKindData::Sample {
                                tag,
                                requires_researched,
                            } => RequirementKind::Sample {
                                tag,
                                requires_researched,
                            },
                        };
                        Ok(RequirementDef {
                            kind,
                            amount: req.amount,
                        })
                    })
                    .collect::<Result<Vec<_>, DataLoadError>>()?;
                Ok(StageDef {
                    name: stage.name,
                    requirements,
                })
            })
            .collect::<Result<Vec<_>, DataLoadError>>()?;
        b.register_project(&def.name, stages);
    }

    if let Some(path) = find_data_file(dir, "cost_curve")? {
        let curve: CostCurve = deserialize_file(&path)?;
        b.set_cost_curve(curve);
    }

    let catalog = b.build()?;
    debug!(
        blueprints = catalog.blueprint_count(),
        mods = catalog.mod_count(),
        projects = catalog.project_count(),
        "catalog built"
    );
    Ok((catalog, names))
}

// ===========================================================================
// World
// ===========================================================================

fn seed_world(world: &World, seed: WorldData, names: &Names, file: &Path) -> Result<(), DataLoadError> {
    for g in &seed.groups {
        world.add_group(
            Group {
                id: GroupId(g.id),
                name: g.name.clone(),
                members: Vec::new(),
                holdings: Holdings::default(),
            },
            g.bank,
        );
    }
    for g in &seed.groups {
        for item in &g.items {
            add_seed_item(world, item, Owner::Group(GroupId(g.id)), names, file)?;
        }
    }

    for c in seed.characters {
        let id = CharacterId(c.id);
        if let Some(g) = c.group
            && world.group(GroupId(g)).is_none()
        {
            return Err(DataLoadError::UnresolvedRef {
                file: file.to_path_buf(),
                name: g.to_string(),
                expected_kind: "group",
            });
        }
        let known_mods = resolve_all(&names.mods, &c.known_mods, file, "modification")?;
        world.add_character(
            Character {
                id,
                player: PlayerId(c.player),
                name: c.name,
                group: c.group.map(GroupId),
                holdings: Holdings::default(),
                known_mods,
                grants: c.grants,
            },
            c.balance,
        );
        for item in &c.items {
            add_seed_item(world, item, Owner::Character(id), names, file)?;
        }
        for (name, quantity) in &c.exotics {
            let exotic = *resolve_name(&names.exotics, name, file, "exotic")?;
            world.grant_exotic(id, exotic, *quantity);
        }
        for (name, quantity) in &c.medicaments {
            let medicament = *resolve_name(&names.medicaments, name, file, "medicament")?;
            world.grant_medicament(id, medicament, *quantity);
        }
        for s in c.samples {
            world.create_sample(NewSample {
                name: s.name,
                science_type: s.science_type,
                description: s.description,
                tags: s.tags,
                owner: Owner::Character(id),
            });
        }
    }

    for p in &seed.periods {
        world.open_period(PeriodId(p.id), p.event_number);
    }
    Ok(())
}

fn add_seed_item(
    world: &World,
    item: &ItemData,
    owner: Owner,
    names: &Names,
    file: &Path,
) -> Result<(), DataLoadError> {
    let blueprint = *resolve_name(&names.blueprints, &item.blueprint, file, "blueprint")?;
    let mods = resolve_all(&names.mods, &item.mods, file, "modification")?;
    world.add_item(blueprint, owner, mods, item.expiry);
    Ok(())
}

// ===========================================================================
// Entry point
// ===========================================================================

/// Everything needed to run the engine for one campaign.
#[derive(Debug)]
pub struct CampaignData {
    pub catalog: Catalog,
    pub config: EngineConfig,
    pub world: World,
}

impl CampaignData {
    pub fn into_orchestrator(self) -> Result<Orchestrator, DataLoadError> {
        Ok(Orchestrator::new(self.catalog, self.config, self.world)?)
    }
}

/// Load the catalog, engine configuration and world seed from `dir`.
pub fn load_campaign(dir: &Path) -> Result<CampaignData, DataLoadError> {
    let (catalog, names) = load_catalog(dir)?;

    let config: EngineConfig = optional_value(dir, "engine")?;
    config.validate()?;

    let world = World::new();
    let world_file = find_data_file(dir, "world")?;
    if let Some(path) = &world_file {
        let seed: WorldData = deserialize_file(path)?;
        seed_world(&world, seed, &names, path)?;
    }

    info!(
        dir = %dir.display(),
        characters = world.character_ids().len(),
        seeded = world_file.is_some(),
        "campaign data loaded"
    );
    Ok(CampaignData {
        catalog,
        config,
        world,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
