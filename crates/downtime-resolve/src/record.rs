//! Resolution records and the append-only record store.
//!
//! One [`ResolutionRecord`] is written per committed submission. Records are
//! never edited: a correction is a new record of kind
//! [`RecordKind::Compensation`] that names the record it corrects.
//!
//! The store can be exported as a `bitcode` snapshot with a versioned header
//! and imported again on restart.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use downtime_core::id::*;
use downtime_core::inventory::{ExoticStack, Owner};
use downtime_core::ledger::Debit;
use downtime_research::StageDelta;
use serde::{Deserialize, Serialize};

use crate::action::ActionCategory;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a record store snapshot.
pub const RECORD_SNAPSHOT_MAGIC: u32 = 0xD077_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Record contents
// ---------------------------------------------------------------------------

/// One action as it was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedAction {
    pub slot: usize,
    pub category: ActionCategory,
    pub cost: u64,
    /// Outcome line, e.g. `Applied scope to WP0012-001`.
    pub description: String,
    /// The declared action as JSON.
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    InventionTheory,
    ReputationQuestion,
}

/// Free text a referee answers by hand after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub slot: usize,
    pub kind: ReviewKind,
    /// Theory name or faction name.
    pub subject: String,
    pub body: String,
}

/// An item whose physical card must be (re)issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCard {
    pub item: ItemId,
    pub blueprint: BlueprintId,
    pub full_code: String,
    pub name: String,
    pub owner: Owner,
    pub mods: Vec<ModId>,
    pub expiry: u32,
    /// True for items bought by this submission.
    pub minted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCard {
    pub sample: SampleId,
    pub name: String,
    pub owner: Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicamentStack {
    pub medicament: MedicamentId,
    pub quantity: u32,
}

/// Balances right after the record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balances {
    pub personal: i64,
    pub group: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Resolution,
    Compensation {
        corrects: RecordId,
        refund: i64,
        note: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub id: RecordId,
    pub key: String,
    pub fingerprint: String,
    pub character: CharacterId,
    pub group: Option<GroupId>,
    pub period: PeriodId,
    pub event_number: u32,
    pub kind: RecordKind,
    pub actions: Vec<CommittedAction>,
    pub total_cost: u64,
    pub debit: Debit,
    pub balances_after: Balances,
    pub stage_deltas: Vec<StageDelta>,
    pub items: Vec<ItemCard>,
    pub produced_exotics: Vec<ExoticStack>,
    pub samples: Vec<SampleCard>,
    pub medicaments: Vec<MedicamentStack>,
    pub reviews: Vec<ReviewEntry>,
    pub results: Vec<String>,
}

impl ResolutionRecord {
    pub fn is_compensation(&self) -> bool {
        matches!(self.kind, RecordKind::Compensation { .. })
    }

    /// What this record owes `owner` at the next event.
    pub fn entitlements_for(&self, owner: Owner) -> Entitlements {
        let own_character = owner == Owner::Character(self.character);
        let energy_chits = match owner {
            Owner::Character(_) if own_character => self.balances_after.personal,
            Owner::Group(g) if self.group == Some(g) => self.balances_after.group.unwrap_or(0),
            _ => 0,
        };
        Entitlements {
            items: self
                .items
                .iter()
                .filter(|c| c.owner == owner)
                .cloned()
                .collect(),
            exotics: if own_character {
                self.produced_exotics.clone()
            } else {
                Vec::new()
            },
            samples: self
                .samples
                .iter()
                .filter(|s| s.owner == owner)
                .cloned()
                .collect(),
            medicaments: if own_character {
                self.medicaments.clone()
            } else {
                Vec::new()
            },
            energy_chits,
        }
    }
}

// ---------------------------------------------------------------------------
// Entitlements
// ---------------------------------------------------------------------------

/// The flattened list of things a pack must contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlements {
    pub items: Vec<ItemCard>,
    pub exotics: Vec<ExoticStack>,
    pub samples: Vec<SampleCard>,
    pub medicaments: Vec<MedicamentStack>,
    pub energy_chits: i64,
}

impl Entitlements {
    /// Fold a later record's entitlements into this one. A later card for
    /// the same item or sample replaces the earlier one; quantities add up;
    /// the energy chit figure is the later balance.
    pub fn merge(&mut self, later: Entitlements) {
        for card in later.items {
            match self.items.iter_mut().find(|c| c.item == card.item) {
                Some(existing) => *existing = card,
                None => self.items.push(card),
            }
        }
        for card in later.samples {
            match self.samples.iter_mut().find(|s| s.sample == card.sample) {
                Some(existing) => *existing = card,
                None => self.samples.push(card),
            }
        }
        for stack in later.exotics {
            match self.exotics.iter_mut().find(|s| s.exotic == stack.exotic) {
                Some(existing) => existing.quantity += stack.quantity,
                None => self.exotics.push(stack),
            }
        }
        for stack in later.medicaments {
            match self
                .medicaments
                .iter_mut()
                .find(|m| m.medicament == stack.medicament)
            {
                Some(existing) => existing.quantity = stack.quantity,
                None => self.medicaments.push(stack),
            }
        }
        self.energy_chits = later.energy_chits;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
            && self.exotics.is_empty()
            && self.samples.is_empty()
            && self.medicaments.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", RECORD_SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("record {found} stored at position {position}")]
    OutOfOrder { position: u64, found: u64 },
}

/// Header prepended to every record snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Number of records in the snapshot.
    pub records: u64,
}

impl SnapshotHeader {
    pub fn new(records: u64) -> Self {
        Self {
            magic: RECORD_SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            records,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != RECORD_SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordSnapshot {
    header: SnapshotHeader,
    records: Vec<ResolutionRecord>,
}

/// Decode just the header of a snapshot.
///
/// bitcode has no partial decoding, so this decodes the whole snapshot.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, SnapshotError> {
    let snapshot: RecordSnapshot =
        bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Append-only list of records. A record's id is its position.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: RwLock<Vec<ResolutionRecord>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ResolutionRecord>> {
        self.records.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ResolutionRecord>> {
        self.records.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Append the record `build` makes for the next id and return a copy.
    pub fn append(&self, build: impl FnOnce(RecordId) -> ResolutionRecord) -> ResolutionRecord {
        let mut records = self.write();
        let id = RecordId(records.len() as u64);
        let record = build(id);
        debug_assert_eq!(record.id, id);
        records.push(record.clone());
        record
    }

    pub fn get(&self, id: RecordId) -> Option<ResolutionRecord> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.read().get(i).cloned())
    }

    pub fn for_character(&self, character: CharacterId) -> Vec<ResolutionRecord> {
        self.read()
            .iter()
            .filter(|r| r.character == character)
            .cloned()
            .collect()
    }

    pub fn for_period(&self, period: PeriodId) -> Vec<ResolutionRecord> {
        self.read()
            .iter()
            .filter(|r| r.period == period)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<ResolutionRecord> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Serialize every record with a versioned header.
    pub fn export(&self) -> Result<Vec<u8>, SnapshotError> {
        let records = self.all();
        let snapshot = RecordSnapshot {
            header: SnapshotHeader::new(records.len() as u64),
            records,
        };
        bitcode::serialize(&snapshot).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Rebuild a store from [`RecordStore::export`] output.
    pub fn import(data: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: RecordSnapshot =
            bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        for (position, record) in snapshot.records.iter().enumerate() {
            if record.id.0 != position as u64 {
                return Err(SnapshotError::OutOfOrder {
                    position: position as u64,
                    found: record.id.0,
                });
            }
        }
        Ok(Self {
            records: RwLock::new(snapshot.records),
        })
    }
}
