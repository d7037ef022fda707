//! Downtime submission payloads.
//!
//! A [`Submission`] is an ordered batch of [`DowntimeAction`] values, one per
//! declaration slot. Each action is tagged by its `category` field; payload
//! fields a client may forget are `Option`s so a missing field becomes an
//! `invalid_payload` error instead of a parse failure.

use downtime_core::catalog::ScienceType;
use downtime_core::id::*;
use serde::{Deserialize, Serialize};

/// Category discriminant, stored in resolution records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Purchase,
    EngineeringMaintain,
    EngineeringModify,
    LearnModification,
    ForgetModification,
    ScienceTheorise,
    ScienceSynthesize,
    ScienceResearchSample,
    ScienceResearchProject,
    ScienceTeachInvention,
    ResearchContribute,
    ReputationQuery,
}

impl ActionCategory {
    pub fn is_engineering(self) -> bool {
        matches!(
            self,
            ActionCategory::EngineeringMaintain | ActionCategory::EngineeringModify
        )
    }

    pub fn is_science(self) -> bool {
        matches!(
            self,
            ActionCategory::ScienceTheorise
                | ActionCategory::ScienceSynthesize
                | ActionCategory::ScienceResearchSample
                | ActionCategory::ScienceResearchProject
                | ActionCategory::ScienceTeachInvention
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum DowntimeAction {
    Purchase(PurchasePayload),
    EngineeringMaintain(EngineeringPayload),
    EngineeringModify(EngineeringPayload),
    LearnModification(ModificationPayload),
    ForgetModification(ModificationPayload),
    ScienceTheorise(TheorisePayload),
    ScienceSynthesize(SynthesizePayload),
    ScienceResearchSample(ResearchSamplePayload),
    ScienceResearchProject(ResearchProjectPayload),
    ScienceTeachInvention(TeachPayload),
    ResearchContribute(ContributePayload),
    ReputationQuery(ReputationPayload),
}

impl DowntimeAction {
    pub fn category(&self) -> ActionCategory {
        match self {
            DowntimeAction::Purchase(_) => ActionCategory::Purchase,
            DowntimeAction::EngineeringMaintain(_) => ActionCategory::EngineeringMaintain,
            DowntimeAction::EngineeringModify(_) => ActionCategory::EngineeringModify,
            DowntimeAction::LearnModification(_) => ActionCategory::LearnModification,
            DowntimeAction::ForgetModification(_) => ActionCategory::ForgetModification,
            DowntimeAction::ScienceTheorise(_) => ActionCategory::ScienceTheorise,
            DowntimeAction::ScienceSynthesize(_) => ActionCategory::ScienceSynthesize,
            DowntimeAction::ScienceResearchSample(_) => ActionCategory::ScienceResearchSample,
            DowntimeAction::ScienceResearchProject(_) => ActionCategory::ScienceResearchProject,
            DowntimeAction::ScienceTeachInvention(_) => ActionCategory::ScienceTeachInvention,
            DowntimeAction::ResearchContribute(_) => ActionCategory::ResearchContribute,
            DowntimeAction::ReputationQuery(_) => ActionCategory::ReputationQuery,
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasePayload {
    pub blueprint_id: Option<BlueprintId>,
    /// Display name the client showed; informational.
    #[serde(default)]
    pub name: Option<String>,
    /// Cost the client showed. When present it must match the real cost.
    #[serde(default)]
    pub cost: Option<u64>,
}

/// Where the target of an engineering action comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineeringSource {
    /// The character's own inventory (or an item bought earlier in the batch).
    Own,
    /// The group's shared inventory.
    Group,
    /// An item entered by its full code.
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineeringPayload {
    pub source: Option<EngineeringSource>,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    /// With `source: own` and no `item_id`: the item bought by an earlier
    /// purchase slot of this blueprint.
    #[serde(default)]
    pub blueprint_id: Option<BlueprintId>,
    #[serde(default)]
    pub mod_id: Option<ModId>,
    #[serde(default)]
    pub full_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationDirection {
    Learning,
    Forgetting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationPayload {
    pub mod_id: Option<ModId>,
    #[serde(rename = "type", default)]
    pub direction: Option<ModificationDirection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheorisePayload {
    pub science_type: Option<ScienceType>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizePayload {
    pub science_type: Option<ScienceType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchSamplePayload {
    pub science_type: Option<ScienceType>,
    #[serde(default)]
    pub sample_id: Option<SampleId>,
}

/// Whose research a contribution goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportTarget {
    #[serde(rename = "self")]
    Own,
    /// A member of the contributor's group.
    Group,
    /// Any character, named by id.
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchProjectPayload {
    pub science_type: Option<ScienceType>,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub support_target: Option<SupportTarget>,
    #[serde(default)]
    pub support_target_id: Option<CharacterId>,
    /// For generic credits: which specific science slot to fill.
    #[serde(default)]
    pub target_science_type: Option<ScienceType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeachPayload {
    pub science_type: Option<ScienceType>,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub target_character_id: Option<CharacterId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributedExotic {
    pub id: ExoticId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributePayload {
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub support_target: Option<SupportTarget>,
    #[serde(default)]
    pub support_target_id: Option<CharacterId>,
    #[serde(default)]
    pub contributed_exotics: Vec<ContributedExotic>,
    #[serde(default)]
    pub contributed_items: Vec<ItemId>,
    #[serde(default)]
    pub contributed_samples: Vec<SampleId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationPayload {
    pub faction_id: Option<FactionId>,
    #[serde(default)]
    pub question: Option<String>,
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// One character's downtime declarations for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Client-chosen idempotency key, unique per submission.
    pub key: String,
    pub character: CharacterId,
    pub period: PeriodId,
    pub actions: Vec<DowntimeAction>,
}

impl Submission {
    /// Canonical serialized form, used to detect a key reused with a
    /// different payload.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_parses_from_tagged_json() {
        let json = r#"{"category":"purchase","blueprint_id":3,"name":"rifle","cost":30}"#;
        let action: DowntimeAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.category(), ActionCategory::Purchase);
        match action {
            DowntimeAction::Purchase(p) => {
                assert_eq!(p.blueprint_id, Some(BlueprintId(3)));
                assert_eq!(p.cost, Some(30));
            }
            other => panic!("expected purchase, got {other:?}"),
        }
    }

    #[test]
    fn missing_fields_parse_as_none() {
        let json = r#"{"category":"engineering_modify"}"#;
        let action: DowntimeAction = serde_json::from_str(json).unwrap();
        assert_eq!(
            action,
            DowntimeAction::EngineeringModify(EngineeringPayload::default())
        );
    }

    #[test]
    fn modification_type_field() {
        let json = r#"{"category":"learn_modification","mod_id":2,"type":"learning"}"#;
        let action: DowntimeAction = serde_json::from_str(json).unwrap();
        assert_eq!(
            action,
            DowntimeAction::LearnModification(ModificationPayload {
                mod_id: Some(ModId(2)),
                direction: Some(ModificationDirection::Learning),
            })
        );
    }

    #[test]
    fn support_target_self_keyword() {
        let json = r#"{"category":"research_contribute","project_id":0,"support_target":"self",
            "contributed_exotics":[{"id":1,"quantity":2}]}"#;
        let action: DowntimeAction = serde_json::from_str(json).unwrap();
        let DowntimeAction::ResearchContribute(p) = action else {
            panic!("expected research contribution");
        };
        assert_eq!(p.support_target, Some(SupportTarget::Own));
        assert_eq!(p.contributed_exotics[0].quantity, 2);
        assert!(p.contributed_items.is_empty());
    }

    #[test]
    fn unknown_category_is_a_parse_error() {
        let json = r#"{"category":"time_travel"}"#;
        assert!(serde_json::from_str::<DowntimeAction>(json).is_err());
    }

    #[test]
    fn category_groups() {
        assert!(ActionCategory::EngineeringModify.is_engineering());
        assert!(!ActionCategory::Purchase.is_engineering());
        assert!(ActionCategory::ScienceTeachInvention.is_science());
        assert!(!ActionCategory::ResearchContribute.is_science());
    }

    #[test]
    fn fingerprint_is_stable() {
        let sub = Submission {
            key: "k1".to_string(),
            character: CharacterId(1),
            period: PeriodId(1),
            actions: vec![DowntimeAction::Purchase(PurchasePayload {
                blueprint_id: Some(BlueprintId(0)),
                ..Default::default()
            })],
        };
        let fingerprint = sub.fingerprint().unwrap();
        assert_eq!(fingerprint, sub.clone().fingerprint().unwrap());
        let mut other = sub.clone();
        other.actions.clear();
        assert_ne!(fingerprint, other.fingerprint().unwrap());
    }
}
