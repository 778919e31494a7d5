//! Inventory bucket hashes for equipped slots and their stable slot keys.

use crate::models::snapshot::{SLOT_ENERGY, SLOT_KINETIC, SLOT_POWER};

pub const BUCKET_KINETIC: u32 = 1498876634;
pub const BUCKET_ENERGY: u32 = 2465295065;
pub const BUCKET_POWER: u32 = 953998645;
pub const BUCKET_HELMET: u32 = 3448274439;
pub const BUCKET_GAUNTLETS: u32 = 3551918588;
pub const BUCKET_CHEST: u32 = 14239492;
pub const BUCKET_LEGS: u32 = 20886954;
pub const BUCKET_CLASS_ITEM: u32 = 1585787867;
pub const BUCKET_SUBCLASS: u32 = 3284755031;

const SLOTS: &[(u32, &str)] = &[
    (BUCKET_KINETIC, SLOT_KINETIC),
    (BUCKET_ENERGY, SLOT_ENERGY),
    (BUCKET_POWER, SLOT_POWER),
    (BUCKET_HELMET, "helmet"),
    (BUCKET_GAUNTLETS, "gauntlets"),
    (BUCKET_CHEST, "chest"),
    (BUCKET_LEGS, "legs"),
    (BUCKET_CLASS_ITEM, "class_item"),
    (BUCKET_SUBCLASS, "subclass"),
];

/// Slot key for a tracked bucket; `None` for buckets outside the loadout
/// (ghost, emblem, ships, ...).
pub fn slot_for_bucket(bucket_hash: u32) -> Option<&'static str> {
    SLOTS
        .iter()
        .find(|(hash, _)| *hash == bucket_hash)
        .map(|(_, slot)| *slot)
}
