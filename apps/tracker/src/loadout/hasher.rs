//! Identity hashing for loadouts.
//!
//! The hash covers composition only: slot key, item hash, instance id and plug
//! hashes, visited in sorted slot order. Manifest display data is excluded so
//! a manifest update never splits one loadout into two snapshots.

use sha2::{Digest, Sha256};

use crate::models::snapshot::Loadout;

pub fn hash(loadout: &Loadout) -> String {
    let mut entries: Vec<_> = loadout.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));

    let mut hasher = Sha256::new();
    for (slot, item) in entries {
        hasher.update(slot.as_bytes());
        hasher.update([0u8]);
        hasher.update(item.item_hash.to_be_bytes());
        hasher.update(item.item_instance_id.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        for plug in &item.plug_hashes {
            hasher.update(plug.to_be_bytes());
        }
        hasher.update([0xffu8]);
    }
    hex::encode(hasher.finalize())
}
