//! Merge eligibility for two snapshots of the same character.
//!
//! Policies may only become stricter within a version. Loosening a rule
//! requires a new `MERGE_POLICY_VERSION`.

use crate::errors::AppError;
use crate::models::snapshot::{CharacterSnapshot, SLOT_ENERGY, SLOT_KINETIC};

pub const MERGE_POLICY_VERSION: u32 = 1;

/// Slots whose weapon instance ids must match for a merge.
const REQUIRED_MATCHING_SLOTS: &[&str] = &[SLOT_KINETIC, SLOT_ENERGY];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    pub version: u32,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            version: MERGE_POLICY_VERSION,
        }
    }
}

impl MergePolicy {
    pub fn check(
        &self,
        target: &CharacterSnapshot,
        source: &CharacterSnapshot,
    ) -> Result<(), AppError> {
        for slot in REQUIRED_MATCHING_SLOTS {
            let target_id = target.loadout.instance_id(slot);
            let source_id = source.loadout.instance_id(slot);
            match (target_id, source_id) {
                (Some(t), Some(s)) if t == s => {}
                _ => {
                    return Err(AppError::Validation(format!(
                        "Snapshots {} and {} differ in the {slot} slot (merge policy v{})",
                        target.id, source.id, self.version
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::{Loadout, LoadoutItem, SLOT_POWER};
    use chrono::Utc;

    fn snapshot(id: &str, slots: &[(&str, &str)]) -> CharacterSnapshot {
        let loadout: Loadout = slots
            .iter()
            .map(|(slot, instance)| {
                (
                    slot.to_string(),
                    LoadoutItem {
                        item_hash: 1,
                        item_instance_id: Some(instance.to_string()),
                        bucket_hash: 0,
                        plug_hashes: vec![],
                        display: None,
                    },
                )
            })
            .collect();
        CharacterSnapshot {
            id: id.to_string(),
            user_id: "u1".into(),
            character_id: "c1".into(),
            hash: String::new(),
            loadout,
            stats: Default::default(),
            name: "test".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            superseded_by: None,
        }
    }

    #[test]
    fn test_matching_weapons_are_eligible_even_if_power_differs() {
        let a = snapshot("s1", &[(SLOT_KINETIC, "k"), (SLOT_ENERGY, "e"), (SLOT_POWER, "p1")]);
        let b = snapshot("s2", &[(SLOT_KINETIC, "k"), (SLOT_ENERGY, "e"), (SLOT_POWER, "p2")]);
        assert!(MergePolicy::default().check(&a, &b).is_ok());
    }

    #[test]
    fn test_different_energy_weapon_is_ineligible() {
        let a = snapshot("s1", &[(SLOT_KINETIC, "k"), (SLOT_ENERGY, "e1")]);
        let b = snapshot("s2", &[(SLOT_KINETIC, "k"), (SLOT_ENERGY, "e2")]);
        assert!(matches!(
            MergePolicy::default().check(&a, &b),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_weapon_slot_is_ineligible() {
        let a = snapshot("s1", &[(SLOT_KINETIC, "k")]);
        let b = snapshot("s2", &[(SLOT_KINETIC, "k")]);
        assert!(MergePolicy::default().check(&a, &b).is_err());
    }
}
