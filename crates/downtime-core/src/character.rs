use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::ScienceType;
use crate::id::*;
use crate::inventory::Holdings;

/// Per-period action allowances granted by skills, cybernetics and
/// research teams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionGrants {
    /// Maintain and modify actions combined.
    pub engineering: u32,
    /// Modify actions (also counted against `engineering`).
    pub engineering_mods: u32,
    /// Science actions per science type.
    pub science: BTreeMap<ScienceType, u32>,
}

impl ActionGrants {
    pub fn science_slots(&self, science_type: ScienceType) -> u32 {
        self.science.get(&science_type).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub player: PlayerId,
    pub name: String,
    pub group: Option<GroupId>,
    #[serde(default)]
    pub holdings: Holdings,
    /// Modifications this character can apply.
    #[serde(default)]
    pub known_mods: Vec<ModId>,
    #[serde(default)]
    pub grants: ActionGrants,
}

impl Character {
    pub fn knows_mod(&self, m: ModId) -> bool {
        self.known_mods.contains(&m)
    }

    /// Returns false when the modification was already known.
    pub fn learn_mod(&mut self, m: ModId) -> bool {
        if self.knows_mod(m) {
            return false;
        }
        self.known_mods.push(m);
        true
    }

    /// Returns false when the modification was not known.
    pub fn forget_mod(&mut self, m: ModId) -> bool {
        let before = self.known_mods.len();
        self.known_mods.retain(|k| *k != m);
        self.known_mods.len() != before
    }
}

/// A group: shared bank (held by the ledger) and shared holdings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: Vec<CharacterId>,
    #[serde(default)]
    pub holdings: Holdings,
}

impl Group {
    pub fn is_member(&self, character: CharacterId) -> bool {
        self.members.contains(&character)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engineer() -> Character {
        Character {
            id: CharacterId(1),
            player: PlayerId(1),
            name: "Ada".to_string(),
            group: None,
            holdings: Holdings::default(),
            known_mods: vec![ModId(0)],
            grants: ActionGrants {
                engineering: 2,
                engineering_mods: 1,
                science: BTreeMap::from([(ScienceType::Life, 1)]),
            },
        }
    }

    #[test]
    fn learn_and_forget() {
        let mut c = engineer();
        assert!(!c.learn_mod(ModId(0)));
        assert!(c.learn_mod(ModId(1)));
        assert!(c.knows_mod(ModId(1)));
        assert!(c.forget_mod(ModId(0)));
        assert!(!c.forget_mod(ModId(0)));
        assert_eq!(c.known_mods, vec![ModId(1)]);
    }

    #[test]
    fn science_slots_default_to_zero() {
        let c = engineer();
        assert_eq!(c.grants.science_slots(ScienceType::Life), 1);
        assert_eq!(c.grants.science_slots(ScienceType::Etheric), 0);
    }

    #[test]
    fn character_deserializes_without_optional_fields() {
        let json = r#"{"id":3,"player":1,"name":"Tam","group":7}"#;
        let c: Character = serde_json::from_str(json).unwrap();
        assert_eq!(c.group, Some(GroupId(7)));
        assert!(c.known_mods.is_empty());
        assert_eq!(c.grants.engineering, 0);
    }

    #[test]
    fn group_membership() {
        let g = Group {
            id: GroupId(7),
            name: "Crew".to_string(),
            members: vec![CharacterId(1), CharacterId(2)],
            holdings: Holdings::default(),
        };
        assert!(g.is_member(CharacterId(2)));
        assert!(!g.is_member(CharacterId(3)));
    }
}
