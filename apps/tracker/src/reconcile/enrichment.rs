//! Presentation view of an aggregate: each character's weapon stats decorated
//! with item display data. Pure; never writes.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::manifest::{DisplayMetadata, ManifestResolver};
use crate::models::aggregate::{ActivityDetails, Aggregate, ConfidenceSource, WeaponPerformance};
use crate::models::snapshot::CharacterSnapshot;
use crate::models::InstancePerformance;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedWeapon {
    pub reference_id: u32,
    pub kills: f64,
    /// Loadout slot the weapon was equipped in, when the linked snapshot has it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayMetadata>,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedCharacter {
    pub character_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_source: Option<ConfidenceSource>,
    pub values: BTreeMap<String, f64>,
    pub weapons: Vec<EnrichedWeapon>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedAggregate {
    pub aggregate_id: String,
    pub activity_id: String,
    pub activity_details: ActivityDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_display: Option<DisplayMetadata>,
    /// Sorted by character id.
    pub characters: Vec<EnrichedCharacter>,
}

/// Builds the view from an aggregate and the snapshots its links reference.
/// Snapshots missing from `snapshots` fall back to manifest lookups.
pub fn enrich_aggregate(
    aggregate: &Aggregate,
    snapshots: &HashMap<String, CharacterSnapshot>,
    manifest: &dyn ManifestResolver,
) -> EnrichedAggregate {
    let character_ids: BTreeSet<&String> = aggregate
        .performance
        .keys()
        .chain(aggregate.snapshot_links.keys())
        .collect();

    let empty = InstancePerformance::default();
    let characters = character_ids
        .into_iter()
        .map(|character_id| {
            let link = aggregate.snapshot_links.get(character_id);
            let snapshot = link.and_then(|l| snapshots.get(&l.snapshot_id));
            let performance = aggregate.performance.get(character_id).unwrap_or(&empty);

            EnrichedCharacter {
                character_id: character_id.clone(),
                snapshot_id: link.map(|l| l.snapshot_id.clone()),
                snapshot_name: snapshot.map(|s| s.name.clone()),
                confidence_source: link.map(|l| l.confidence_source),
                values: performance.values.clone(),
                weapons: performance
                    .weapons
                    .iter()
                    .map(|w| enrich_weapon(w, snapshot, manifest))
                    .collect(),
            }
        })
        .collect();

    EnrichedAggregate {
        aggregate_id: aggregate.id.clone(),
        activity_id: aggregate.activity_id.clone(),
        activity_details: aggregate.activity_details.clone(),
        activity_display: aggregate
            .activity_details
            .reference_hash
            .and_then(|hash| manifest.resolve(hash)),
        characters,
    }
}

fn enrich_weapon(
    weapon: &WeaponPerformance,
    snapshot: Option<&CharacterSnapshot>,
    manifest: &dyn ManifestResolver,
) -> EnrichedWeapon {
    let equipped = snapshot.and_then(|s| s.loadout.find_by_item_hash(weapon.reference_id));
    let display = equipped
        .and_then(|(_, item)| item.display.clone())
        .or_else(|| manifest.resolve(weapon.reference_id));

    EnrichedWeapon {
        reference_id: weapon.reference_id,
        kills: weapon.kills(),
        slot: equipped.map(|(slot, _)| slot.to_string()),
        display,
        values: weapon.values.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::manifest::StaticManifest;
    use crate::models::aggregate::SnapshotLink;
    use crate::models::snapshot::{Loadout, LoadoutItem, SLOT_KINETIC};

    fn aggregate() -> Aggregate {
        let details = ActivityDetails {
            activity_id: "act-1".into(),
            reference_hash: Some(9000),
            director_activity_hash: None,
            mode: Some(5),
            modes: vec![5],
            period: Utc::now(),
        };
        let performance = InstancePerformance {
            values: BTreeMap::from([("kills".to_string(), 10.0)]),
            weapons: vec![
                WeaponPerformance {
                    reference_id: 100,
                    values: BTreeMap::from([("uniqueWeaponKills".to_string(), 6.0)]),
                },
                WeaponPerformance {
                    reference_id: 555,
                    values: BTreeMap::from([("uniqueWeaponKills".to_string(), 4.0)]),
                },
            ],
        };
        let mut aggregate = Aggregate::seeded(
            "a1".into(),
            details,
            "c1",
            SnapshotLink::inferred("s1", "c1"),
            performance,
        );
        aggregate
            .snapshot_links
            .insert("c2".into(), SnapshotLink::inferred("s-missing", "c2"));
        aggregate
    }

    fn snapshot() -> CharacterSnapshot {
        let mut loadout = Loadout::new();
        loadout.insert(
            SLOT_KINETIC,
            LoadoutItem {
                item_hash: 100,
                item_instance_id: Some("i-100".into()),
                bucket_hash: 1498876634,
                plug_hashes: vec![],
                display: Some(DisplayMetadata::named("From Snapshot")),
            },
        );
        CharacterSnapshot {
            id: "s1".into(),
            user_id: "u1".into(),
            character_id: "c1".into(),
            hash: "h".into(),
            loadout,
            stats: BTreeMap::new(),
            name: "Quiet Harbor".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            superseded_by: None,
        }
    }

    #[test]
    fn test_snapshot_display_wins_and_manifest_fills_gaps() {
        let manifest = StaticManifest::from_entries([
            (100, DisplayMetadata::named("From Manifest")),
            (555, DisplayMetadata::named("Picked Up")),
            (9000, DisplayMetadata::named("Crucible")),
        ]);
        let snapshots = HashMap::from([("s1".to_string(), snapshot())]);

        let enriched = enrich_aggregate(&aggregate(), &snapshots, &manifest);
        assert_eq!(enriched.activity_display.unwrap().name, "Crucible");

        let c1 = &enriched.characters[0];
        assert_eq!(c1.snapshot_name.as_deref(), Some("Quiet Harbor"));
        assert_eq!(c1.weapons[0].display.as_ref().unwrap().name, "From Snapshot");
        assert_eq!(c1.weapons[0].slot.as_deref(), Some(SLOT_KINETIC));
        assert_eq!(c1.weapons[0].kills, 6.0);
        assert_eq!(c1.weapons[1].display.as_ref().unwrap().name, "Picked Up");
        assert!(c1.weapons[1].slot.is_none());
    }

    #[test]
    fn test_linked_character_without_performance_is_listed() {
        let enriched = enrich_aggregate(&aggregate(), &HashMap::new(), &StaticManifest::new());
        assert_eq!(enriched.characters.len(), 2);

        let c2 = &enriched.characters[1];
        assert_eq!(c2.character_id, "c2");
        assert_eq!(c2.snapshot_id.as_deref(), Some("s-missing"));
        assert!(c2.snapshot_name.is_none());
        assert!(c2.weapons.is_empty());
    }
}
