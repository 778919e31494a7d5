//! Content-addressed loadout snapshots and their observation history.
//!
//! Flow for `save`: hash → lookup by hash → (hit) follow merges, bump
//! `updatedAt`, append history | (miss) create under a derived id + first
//! history row. History is always the last write, so a retried save never
//! leaves an extra row behind.
//!
//! Dedup is global: one snapshot per hash, owned by the character that first
//! wore it. History rows record which character made each observation.
//!
//! Append-only: snapshots are never deleted and history rows are never updated.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregates::AggregateStore;
use crate::errors::AppError;
use crate::loadout::hasher;
use crate::loadout::merge_policy::MergePolicy;
use crate::loadout::names::generate_name;
use crate::models::snapshot::{CharacterSnapshot, History, HistoryMeta, Loadout};
use crate::store::{self, Direction, DocumentStore, FieldUpdate, Query, StoreError};

pub const SNAPSHOTS: &str = "snapshots";
pub const HISTORY: &str = "history";

/// Input for `SnapshotStore::save`.
#[derive(Debug, Clone)]
pub struct SaveSnapshot {
    pub user_id: String,
    pub character_id: String,
    pub loadout: Loadout,
    pub stats: BTreeMap<String, i64>,
    pub name: Option<String>,
}

/// Upper bound on `supersededBy` hops followed by a dedup hit.
const MAX_MERGE_HOPS: usize = 8;

/// Snapshot ids are derived from the loadout hash, which turns two concurrent
/// first observations into one create and one dedup hit.
fn snapshot_id_for(hash: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("snapshot:{hash}").as_bytes()).to_string()
}

#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn DocumentStore>,
    aggregates: AggregateStore,
    policy: MergePolicy,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn DocumentStore>, aggregates: AggregateStore) -> Self {
        Self {
            store,
            aggregates,
            policy: MergePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    // ────────────────────────────────────────────────────────────────────────
    // Save with dedup
    // ────────────────────────────────────────────────────────────────────────

    /// Stores a loadout observation. Returns the existing snapshot when an
    /// identical loadout was already seen, or the snapshot it was merged into.
    /// Exactly one history row is written per successful call.
    pub async fn save(&self, input: SaveSnapshot) -> Result<CharacterSnapshot, AppError> {
        if input.user_id.trim().is_empty() || input.character_id.trim().is_empty() {
            return Err(AppError::Validation(
                "Snapshot requires a user id and a character id".into(),
            ));
        }
        if input.loadout.is_empty() {
            return Err(AppError::Validation("Loadout has no equipped items".into()));
        }

        let hash = hasher::hash(&input.loadout);
        if let Some(existing) = self.find_by_hash(&hash).await? {
            debug!("Loadout {hash} already stored as snapshot {}", existing.id);
            return self.observe(existing, &input).await;
        }

        let now = Utc::now();
        let snapshot = CharacterSnapshot {
            id: snapshot_id_for(&hash),
            user_id: input.user_id.clone(),
            character_id: input.character_id.clone(),
            hash,
            loadout: input.loadout.clone(),
            stats: input.stats.clone(),
            name: input
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(generate_name),
            created_at: now,
            updated_at: now,
            superseded_by: None,
        };

        match self
            .store
            .create(SNAPSHOTS, &snapshot.id, serde_json::to_value(&snapshot)?)
            .await
        {
            Ok(_) => {
                self.append_history(&snapshot.id, &input).await?;
                info!(
                    "Created snapshot {} ({}) for character {}",
                    snapshot.id, snapshot.name, snapshot.character_id
                );
                Ok(snapshot)
            }
            Err(StoreError::AlreadyExists { .. }) => {
                debug!(
                    "Snapshot {} was created concurrently, recording as observation",
                    snapshot.id
                );
                let existing = self.get(&snapshot.id).await?;
                self.observe(existing, &input).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<CharacterSnapshot>, AppError> {
        let docs = self
            .store
            .query(SNAPSHOTS, &Query::new().eq("hash", hash).limit(1))
            .await?;
        match docs.first() {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Dedup hit: resolve merges, bump `updatedAt`, then one history row.
    async fn observe(
        &self,
        existing: CharacterSnapshot,
        input: &SaveSnapshot,
    ) -> Result<CharacterSnapshot, AppError> {
        let current = self.follow_merges(existing).await?;
        let updated_at = Utc::now().timestamp_millis();
        let doc = self
            .store
            .update(
                SNAPSHOTS,
                &current.id,
                &[FieldUpdate::set("updatedAt", updated_at)],
                None,
            )
            .await?;
        let snapshot: CharacterSnapshot = doc.decode()?;
        self.append_history(&snapshot.id, input).await?;
        Ok(snapshot)
    }

    /// Walks `supersededBy` to the snapshot a merge folded this one into.
    async fn follow_merges(
        &self,
        mut snapshot: CharacterSnapshot,
    ) -> Result<CharacterSnapshot, AppError> {
        let mut hops = 0;
        while let Some(target_id) = snapshot.superseded_by.clone() {
            if hops == MAX_MERGE_HOPS {
                return Err(AppError::Validation(format!(
                    "Snapshot {} is more than {MAX_MERGE_HOPS} merges deep",
                    snapshot.id
                )));
            }
            debug!("Snapshot {} was merged into {target_id}", snapshot.id);
            snapshot = self.get(&target_id).await?;
            hops += 1;
        }
        Ok(snapshot)
    }

    async fn append_history(
        &self,
        parent_id: &str,
        observed: &SaveSnapshot,
    ) -> Result<History, AppError> {
        let history = History {
            id: Uuid::new_v4().to_string(),
            parent_id: parent_id.to_string(),
            user_id: observed.user_id.clone(),
            character_id: observed.character_id.clone(),
            timestamp: Utc::now(),
            meta: HistoryMeta::from_loadout(&observed.loadout),
        };
        self.store
            .create(HISTORY, &history.id, serde_json::to_value(&history)?)
            .await?;
        debug!("Appended history {} to snapshot {parent_id}", history.id);
        Ok(history)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Lookups
    // ────────────────────────────────────────────────────────────────────────

    pub async fn get(&self, id: &str) -> Result<CharacterSnapshot, AppError> {
        let doc = self
            .store
            .get(SNAPSHOTS, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Snapshot {id} not found")))?;
        Ok(doc.decode()?)
    }

    /// Batched lookup of any size; missing ids are omitted and order is unspecified.
    pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<CharacterSnapshot>, AppError> {
        let unique: Vec<String> = ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let docs = store::get_many_chunked(self.store.as_ref(), SNAPSHOTS, &unique).await?;
        docs.iter()
            .map(|doc| doc.decode().map_err(AppError::from))
            .collect()
    }

    /// All snapshots of a character, most recent first.
    pub async fn get_all_by_character(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> Result<Vec<CharacterSnapshot>, AppError> {
        let query = Query::new()
            .eq("userId", user_id)
            .eq("characterId", character_id)
            .order_by("createdAt", Direction::Desc);
        let docs = self.store.query(SNAPSHOTS, &query).await?;
        docs.iter()
            .map(|doc| doc.decode().map_err(AppError::from))
            .collect()
    }

    /// Observations of one snapshot, oldest first.
    pub async fn get_history(&self, snapshot_id: &str) -> Result<Vec<History>, AppError> {
        let query = Query::new()
            .eq("parentId", snapshot_id)
            .order_by("timestamp", Direction::Asc);
        let docs = self.store.query(HISTORY, &query).await?;
        docs.iter()
            .map(|doc| doc.decode().map_err(AppError::from))
            .collect()
    }

    /// Most recent observation for a character across all of its snapshots.
    pub async fn latest_history(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> Result<Option<History>, AppError> {
        let query = Query::new()
            .eq("userId", user_id)
            .eq("characterId", character_id)
            .order_by("timestamp", Direction::Desc)
            .limit(1);
        let docs = self.store.query(HISTORY, &query).await?;
        match docs.first() {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Merge
    // ────────────────────────────────────────────────────────────────────────

    /// Folds `source_id` into `target_id`: every aggregate link of that
    /// character pointing at the source is redirected to the target.
    ///
    /// All checks run before the first write, so `NotFound` and `Validation`
    /// failures leave every document unchanged. Each aggregate is rewritten in
    /// its own transaction; re-running a merge skips already-migrated links.
    pub async fn merge(
        &self,
        target_id: &str,
        source_id: &str,
    ) -> Result<CharacterSnapshot, AppError> {
        if target_id == source_id {
            return Err(AppError::Validation(format!(
                "Cannot merge snapshot {target_id} into itself"
            )));
        }
        let target = self.get(target_id).await?;
        let source = self.get(source_id).await?;

        if target.user_id != source.user_id || target.character_id != source.character_id {
            return Err(AppError::Validation(format!(
                "Snapshots {target_id} and {source_id} belong to different characters"
            )));
        }
        if let Some(other) = source.superseded_by.as_deref().filter(|t| *t != target_id) {
            return Err(AppError::Validation(format!(
                "Snapshot {source_id} was already merged into {other}"
            )));
        }
        if target.superseded_by.is_some() {
            return Err(AppError::Validation(format!(
                "Snapshot {target_id} has itself been merged and cannot be a merge target"
            )));
        }
        self.policy.check(&target, &source)?;

        let character_id = source.character_id.clone();
        let linked = self
            .aggregates
            .find_by_snapshot_link(&character_id, source_id)
            .await?;

        let mut rewritten = 0usize;
        for aggregate in &linked {
            let written = self
                .aggregates
                .update(
                    &aggregate.id,
                    |a| {
                        if let Some(link) = a.snapshot_links.get_mut(&character_id) {
                            link.redirect(source_id, target_id);
                        }
                        Ok(())
                    },
                    true,
                )
                .await?;
            if written {
                rewritten += 1;
            }
        }

        if source.superseded_by.is_none() {
            if let Err(e) = self
                .store
                .update(
                    SNAPSHOTS,
                    source_id,
                    &[FieldUpdate::set("supersededBy", target_id)],
                    None,
                )
                .await
            {
                warn!("Merged {source_id} into {target_id} but failed to mark it superseded: {e}");
                return Err(e.into());
            }
        }

        info!(
            "Merged snapshot {source_id} into {target_id}: {rewritten} of {} aggregates rewritten",
            linked.len()
        );
        self.get(target_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::aggregate::{
        ActivityDetails, ConfidenceSource, InstancePerformance, SnapshotLink,
    };
    use crate::models::snapshot::{LoadoutItem, SLOT_ENERGY, SLOT_KINETIC, SLOT_POWER};
    use crate::store::MemoryStore;

    fn setup() -> (MemoryStore, SnapshotStore, AggregateStore) {
        let memory = MemoryStore::new();
        let store: Arc<dyn DocumentStore> = Arc::new(memory.clone());
        let aggregates = AggregateStore::new(store.clone());
        let snapshots = SnapshotStore::new(store, aggregates.clone());
        (memory, snapshots, aggregates)
    }

    fn item(item_hash: u32, instance: &str) -> LoadoutItem {
        LoadoutItem {
            item_hash,
            item_instance_id: Some(instance.to_string()),
            bucket_hash: 0,
            plug_hashes: vec![],
            display: None,
        }
    }

    fn loadout(kinetic: &str, energy: &str, power: &str) -> Loadout {
        let mut loadout = Loadout::new();
        loadout.insert(SLOT_KINETIC, item(100, kinetic));
        loadout.insert(SLOT_ENERGY, item(200, energy));
        loadout.insert(SLOT_POWER, item(300, power));
        loadout
    }

    fn save_input(user: &str, character: &str, loadout: Loadout) -> SaveSnapshot {
        SaveSnapshot {
            user_id: user.to_string(),
            character_id: character.to_string(),
            loadout,
            stats: BTreeMap::new(),
            name: None,
        }
    }

    fn details(activity_id: &str) -> ActivityDetails {
        ActivityDetails {
            activity_id: activity_id.to_string(),
            reference_hash: None,
            director_activity_hash: None,
            mode: None,
            modes: vec![],
            period: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_identical_saves_dedup_and_record_history() {
        let (_, snapshots, _) = setup();
        let first = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p")))
            .await
            .unwrap();
        let second = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p")))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(snapshots.get_history(&first.id).await.unwrap().len(), 2);
        assert_eq!(snapshots.get_all_by_character("u1", "c1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_identical_saves_create_one_snapshot() {
        let (memory, snapshots, _) = setup();
        let (a, b) = tokio::join!(
            snapshots.save(save_input("u1", "c1", loadout("k", "e", "p"))),
            snapshots.save(save_input("u1", "c1", loadout("k", "e", "p"))),
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(memory.count(SNAPSHOTS).await, 1);
        assert_eq!(memory.count(HISTORY).await, 2);
    }

    #[tokio::test]
    async fn test_identical_loadout_on_another_character_reuses_snapshot() {
        let (memory, snapshots, _) = setup();
        let first = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p")))
            .await
            .unwrap();
        let second = snapshots
            .save(save_input("u1", "c2", loadout("k", "e", "p")))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.character_id, "c1");
        assert_eq!(memory.count(SNAPSHOTS).await, 1);

        let history = snapshots.get_history(&first.id).await.unwrap();
        let observers: Vec<&str> = history.iter().map(|h| h.character_id.as_str()).collect();
        assert_eq!(observers, vec!["c1", "c2"]);
        assert!(snapshots.latest_history("u1", "c2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_save_after_merge_resolves_to_merge_target() {
        let (memory, snapshots, _) = setup();
        let s1 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p1")))
            .await
            .unwrap();
        let s2 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p2")))
            .await
            .unwrap();
        snapshots.merge(&s1.id, &s2.id).await.unwrap();

        let again = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p2")))
            .await
            .unwrap();
        assert_eq!(again.id, s1.id);
        assert_eq!(memory.count(SNAPSHOTS).await, 2);
        assert_eq!(snapshots.get_history(&s1.id).await.unwrap().len(), 2);
        assert_eq!(snapshots.get_history(&s2.id).await.unwrap().len(), 1);

        let latest = snapshots.latest_history("u1", "c1").await.unwrap().unwrap();
        assert_eq!(latest.parent_id, s1.id);
        assert_eq!(latest.meta.power.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_save_follows_chained_merges() {
        let (_, snapshots, _) = setup();
        let s0 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p0")))
            .await
            .unwrap();
        let s1 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p1")))
            .await
            .unwrap();
        let s2 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p2")))
            .await
            .unwrap();
        snapshots.merge(&s1.id, &s2.id).await.unwrap();
        snapshots.merge(&s0.id, &s1.id).await.unwrap();

        let again = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p2")))
            .await
            .unwrap();
        assert_eq!(again.id, s0.id);
    }

    #[tokio::test]
    async fn test_empty_loadout_is_rejected() {
        let (memory, snapshots, _) = setup();
        let result = snapshots.save(save_input("u1", "c1", Loadout::new())).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(memory.count(HISTORY).await, 0);
    }

    #[tokio::test]
    async fn test_missing_character_id_is_rejected() {
        let (_, snapshots, _) = setup();
        let result = snapshots.save(save_input("u1", " ", loadout("k", "e", "p"))).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_provided_name_is_kept_and_blank_name_is_generated() {
        let (_, snapshots, _) = setup();
        let named = snapshots
            .save(SaveSnapshot {
                name: Some("Raid Setup".into()),
                ..save_input("u1", "c1", loadout("k", "e", "p"))
            })
            .await
            .unwrap();
        assert_eq!(named.name, "Raid Setup");

        let generated = snapshots
            .save(SaveSnapshot {
                name: Some("   ".into()),
                ..save_input("u1", "c1", loadout("k2", "e", "p"))
            })
            .await
            .unwrap();
        assert!(!generated.name.trim().is_empty());
    }

    #[tokio::test]
    async fn test_get_all_by_character_is_most_recent_first() {
        let (_, snapshots, _) = setup();
        let older = snapshots
            .save(save_input("u1", "c1", loadout("k1", "e", "p")))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = snapshots
            .save(save_input("u1", "c1", loadout("k2", "e", "p")))
            .await
            .unwrap();
        snapshots
            .save(save_input("u1", "c2", loadout("k3", "e", "p")))
            .await
            .unwrap();

        let all = snapshots.get_all_by_character("u1", "c1").await.unwrap();
        let ids: Vec<&str> = all.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
    }

    #[tokio::test]
    async fn test_get_by_ids_chunks_large_batches() {
        let (_, snapshots, _) = setup();
        let mut ids = Vec::new();
        for i in 0..35 {
            let snapshot = snapshots
                .save(save_input("u1", "c1", loadout(&format!("k{i}"), "e", "p")))
                .await
                .unwrap();
            ids.push(snapshot.id);
        }
        ids.push("missing".to_string());

        let found = snapshots.get_by_ids(&ids).await.unwrap();
        assert_eq!(found.len(), 35);
    }

    #[tokio::test]
    async fn test_latest_history_tracks_weapon_changes() {
        let (_, snapshots, _) = setup();
        snapshots
            .save(save_input("u1", "c1", loadout("k1", "e1", "p1")))
            .await
            .unwrap();
        let first = snapshots.latest_history("u1", "c1").await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        snapshots
            .save(save_input("u1", "c1", loadout("k1", "e2", "p1")))
            .await
            .unwrap();
        let second = snapshots.latest_history("u1", "c1").await.unwrap().unwrap();

        assert_eq!(first.meta.weapons_changed(&second.meta), vec![SLOT_ENERGY]);
        assert!(snapshots.latest_history("u1", "c9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_redirects_links_and_preserves_provenance() {
        let (_, snapshots, aggregates) = setup();
        let s1 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p1")))
            .await
            .unwrap();
        let s2 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p2")))
            .await
            .unwrap();

        aggregates
            .add_aggregate(
                "c1",
                details("act-1"),
                SnapshotLink::inferred(&s2.id, "c1"),
                InstancePerformance::default(),
            )
            .await
            .unwrap();
        aggregates
            .add_aggregate(
                "c2",
                details("act-1"),
                SnapshotLink::inferred("other", "c2"),
                InstancePerformance::default(),
            )
            .await
            .unwrap();
        aggregates
            .add_aggregate(
                "c1",
                details("act-2"),
                SnapshotLink::inferred(&s1.id, "c1"),
                InstancePerformance::default(),
            )
            .await
            .unwrap();

        let merged = snapshots.merge(&s1.id, &s2.id).await.unwrap();
        assert_eq!(merged.id, s1.id);

        let a1 = aggregates.get_aggregate("act-1").await.unwrap();
        let link = &a1.snapshot_links["c1"];
        assert_eq!(link.snapshot_id, s1.id);
        assert_eq!(link.original_snapshot_id.as_deref(), Some(s2.id.as_str()));
        assert_eq!(link.confidence_source, ConfidenceSource::User);
        assert_eq!(a1.snapshot_links["c2"].snapshot_id, "other");

        let a2 = aggregates.get_aggregate("act-2").await.unwrap();
        assert_eq!(a2.snapshot_links["c1"].original_snapshot_id, None);

        let source = snapshots.get(&s2.id).await.unwrap();
        assert_eq!(source.superseded_by.as_deref(), Some(s1.id.as_str()));
    }

    #[tokio::test]
    async fn test_merge_replay_is_a_noop() {
        let (memory, snapshots, aggregates) = setup();
        let s1 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p1")))
            .await
            .unwrap();
        let s2 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p2")))
            .await
            .unwrap();
        aggregates
            .add_aggregate(
                "c1",
                details("act-1"),
                SnapshotLink::inferred(&s2.id, "c1"),
                InstancePerformance::default(),
            )
            .await
            .unwrap();

        snapshots.merge(&s1.id, &s2.id).await.unwrap();
        let aggregate_id = aggregates.get_aggregate("act-1").await.unwrap().id;
        let after_first = memory.get("aggregates", &aggregate_id).await.unwrap().unwrap();

        snapshots.merge(&s1.id, &s2.id).await.unwrap();
        let after_replay = memory.get("aggregates", &aggregate_id).await.unwrap().unwrap();

        assert_eq!(after_first.version, after_replay.version);
        assert_eq!(after_first.data, after_replay.data);
    }

    #[tokio::test]
    async fn test_merge_across_users_is_rejected_without_writes() {
        let (memory, snapshots, aggregates) = setup();
        let s1 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p")))
            .await
            .unwrap();
        let s9 = snapshots
            .save(save_input("u2", "c2", loadout("k", "e", "p9")))
            .await
            .unwrap();
        aggregates
            .add_aggregate(
                "c2",
                details("act-1"),
                SnapshotLink::inferred(&s9.id, "c2"),
                InstancePerformance::default(),
            )
            .await
            .unwrap();
        let before = memory.get(SNAPSHOTS, &s9.id).await.unwrap().unwrap();

        let result = snapshots.merge(&s1.id, &s9.id).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let after = memory.get(SNAPSHOTS, &s9.id).await.unwrap().unwrap();
        assert_eq!(before, after);
        let a1 = aggregates.get_aggregate("act-1").await.unwrap();
        assert_eq!(a1.snapshot_links["c2"].snapshot_id, s9.id);
    }

    #[tokio::test]
    async fn test_merge_of_ineligible_loadouts_is_rejected() {
        let (_, snapshots, _) = setup();
        let s1 = snapshots
            .save(save_input("u1", "c1", loadout("k1", "e", "p")))
            .await
            .unwrap();
        let s2 = snapshots
            .save(save_input("u1", "c1", loadout("k2", "e", "p")))
            .await
            .unwrap();
        assert!(matches!(
            snapshots.merge(&s1.id, &s2.id).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_with_missing_snapshot_is_not_found() {
        let (_, snapshots, _) = setup();
        let s1 = snapshots
            .save(save_input("u1", "c1", loadout("k", "e", "p")))
            .await
            .unwrap();
        assert!(matches!(
            snapshots.merge(&s1.id, "missing").await,
            Err(AppError::NotFound(_))
        ));
    }
}
