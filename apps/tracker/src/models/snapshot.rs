use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manifest::DisplayMetadata;

/// Slot keys for the three weapon buckets.
pub const SLOT_KINETIC: &str = "kinetic";
pub const SLOT_ENERGY: &str = "energy";
pub const SLOT_POWER: &str = "power";

/// One equipped item. `display` is resolved from the manifest at observation
/// time and is not part of the loadout's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadoutItem {
    pub item_hash: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_instance_id: Option<String>,
    pub bucket_hash: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plug_hashes: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayMetadata>,
}

/// Bucket-slot key → equipped item. Keys are kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Loadout(pub BTreeMap<String, LoadoutItem>);

impl Loadout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: impl Into<String>, item: LoadoutItem) {
        self.0.insert(slot.into(), item);
    }

    pub fn get(&self, slot: &str) -> Option<&LoadoutItem> {
        self.0.get(slot)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LoadoutItem)> {
        self.0.iter()
    }

    pub fn instance_id(&self, slot: &str) -> Option<&str> {
        self.get(slot).and_then(|item| item.item_instance_id.as_deref())
    }

    /// Finds the slot holding an item with this manifest hash.
    pub fn find_by_item_hash(&self, item_hash: u32) -> Option<(&str, &LoadoutItem)> {
        self.0
            .iter()
            .find(|(_, item)| item.item_hash == item_hash)
            .map(|(slot, item)| (slot.as_str(), item))
    }
}

impl FromIterator<(String, LoadoutItem)> for Loadout {
    fn from_iter<I: IntoIterator<Item = (String, LoadoutItem)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSnapshot {
    pub id: String,
    pub user_id: String,
    pub character_id: String,
    pub hash: String,
    pub loadout: Loadout,
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    /// Set when this snapshot was merged into another; the row stays for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
}

/// Weapon instance ids at observation time, for diffing without the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinetic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,
}

impl HistoryMeta {
    pub fn from_loadout(loadout: &Loadout) -> Self {
        Self {
            kinetic: loadout.instance_id(SLOT_KINETIC).map(String::from),
            energy: loadout.instance_id(SLOT_ENERGY).map(String::from),
            power: loadout.instance_id(SLOT_POWER).map(String::from),
        }
    }

    /// Slots whose weapon instance differs between two observations.
    pub fn weapons_changed(&self, other: &HistoryMeta) -> Vec<&'static str> {
        [
            (SLOT_KINETIC, &self.kinetic, &other.kinetic),
            (SLOT_ENERGY, &self.energy, &other.energy),
            (SLOT_POWER, &self.power, &other.power),
        ]
        .into_iter()
        .filter(|(_, a, b)| a != b)
        .map(|(slot, _, _)| slot)
        .collect()
    }
}

/// Append-only observation of a snapshot. Never updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub id: String,
    pub parent_id: String,
    pub user_id: String,
    pub character_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub meta: HistoryMeta,
}
