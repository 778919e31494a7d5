//! Loadouts: building them from raw equipment, hashing them and storing them
//! as deduplicated snapshots.

pub mod buckets;
pub mod hasher;
pub mod merge_policy;
pub mod names;
pub mod snapshots;

pub use snapshots::{SaveSnapshot, SnapshotStore};

use tracing::debug;

use crate::manifest::ManifestResolver;
use crate::models::payload::RawLoadout;
use crate::models::snapshot::{Loadout, LoadoutItem};

/// Converts raw equipment into a loadout keyed by slot.
///
/// Entries missing an item or bucket hash are skipped, as are items in buckets
/// the tracker does not follow. Display metadata is resolved from the manifest
/// when available.
pub fn build_loadout(raw: &RawLoadout, manifest: &dyn ManifestResolver) -> Loadout {
    let mut loadout = Loadout::new();
    for item in raw.equipment.as_deref().unwrap_or_default() {
        let (Some(item_hash), Some(bucket_hash)) = (item.item_hash, item.bucket_hash) else {
            debug!("Skipping equipment entry without item or bucket hash");
            continue;
        };
        let Some(slot) = buckets::slot_for_bucket(bucket_hash) else {
            continue;
        };
        loadout.insert(
            slot,
            LoadoutItem {
                item_hash,
                item_instance_id: item.item_instance_id.clone(),
                bucket_hash,
                plug_hashes: item.plug_hashes(),
                display: manifest.resolve(item_hash),
            },
        );
    }
    loadout
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::manifest::{DisplayMetadata, StaticManifest};
    use crate::models::snapshot::{SLOT_ENERGY, SLOT_KINETIC};

    fn raw() -> RawLoadout {
        serde_json::from_value(json!({
            "characterId": "c1",
            "equipment": [
                { "itemHash": 100, "itemInstanceId": "i-100", "bucketHash": buckets::BUCKET_KINETIC,
                  "sockets": [{ "plugHash": 7, "isEnabled": true }] },
                {
                    "itemHash": 200,
                    "itemInstanceId": "i-200",
                    "bucketHash": buckets::BUCKET_ENERGY
                },
                { "itemHash": 300, "bucketHash": 4023194814u32 },
                { "bucketHash": buckets::BUCKET_POWER },
                { "itemHash": 400 }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_build_loadout_skips_incomplete_and_untracked_items() {
        let loadout = build_loadout(&raw(), &StaticManifest::new());
        assert_eq!(loadout.len(), 2);
        assert_eq!(loadout.instance_id(SLOT_KINETIC), Some("i-100"));
        assert_eq!(loadout.get(SLOT_KINETIC).unwrap().plug_hashes, vec![7]);
        assert_eq!(loadout.instance_id(SLOT_ENERGY), Some("i-200"));
    }

    #[test]
    fn test_build_loadout_resolves_display_without_changing_hash() {
        let manifest =
            StaticManifest::from_entries([(100, DisplayMetadata::named("Ace of Spades"))]);
        let resolved = build_loadout(&raw(), &manifest);
        let bare = build_loadout(&raw(), &StaticManifest::new());

        assert_eq!(
            resolved.get(SLOT_KINETIC).unwrap().display.as_ref().unwrap().name,
            "Ace of Spades"
        );
        assert!(resolved.get(SLOT_ENERGY).unwrap().display.is_none());
        assert_eq!(hasher::hash(&resolved), hasher::hash(&bare));
    }

    #[test]
    fn test_missing_equipment_builds_empty_loadout() {
        let loadout = build_loadout(&RawLoadout::default(), &StaticManifest::new());
        assert!(loadout.is_empty());
    }
}
