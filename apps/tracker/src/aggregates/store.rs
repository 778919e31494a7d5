//! One aggregate document per activity instance, shared by every
//! tracked character who played it.
//!
//! Writes for one character only ever touch `snapshotLinks.<character>` and
//! `performance.<character>`, so writers for different characters on the same
//! activity never overwrite each other.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::aggregate::{ActivityDetails, Aggregate, InstancePerformance, SnapshotLink};
use crate::store::{self, fieldpath, Document, DocumentStore, FieldUpdate, Query, StoreError};

pub const AGGREGATES: &str = "aggregates";

/// Optimistic read-modify-write attempts before giving up with `Transient`.
const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// Nesting depth at which `update` diffs documents: `snapshotLinks.<character>`.
const DIFF_DEPTH: usize = 2;

const DEFAULT_PAGE_SIZE: usize = 200;

fn aggregate_id_for(activity_id: &str) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("aggregate:{activity_id}").as_bytes(),
    )
    .to_string()
}

fn character_updates(
    character_id: &str,
    link: &SnapshotLink,
    performance: &InstancePerformance,
) -> Result<Vec<FieldUpdate>, AppError> {
    Ok(vec![
        FieldUpdate::set(
            format!("snapshotLinks.{character_id}"),
            serde_json::to_value(link)?,
        ),
        FieldUpdate::set(
            format!("performance.{character_id}"),
            serde_json::to_value(performance)?,
        ),
    ])
}

#[derive(Clone)]
pub struct AggregateStore {
    store: Arc<dyn DocumentStore>,
    page_size: usize,
}

impl AggregateStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Page size for the backfill scan.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    // ────────────────────────────────────────────────────────────────────────
    // Upsert
    // ────────────────────────────────────────────────────────────────────────

    /// Attaches one character's link and performance to the activity's
    /// aggregate, creating the aggregate on first sight.
    pub async fn add_aggregate(
        &self,
        character_id: &str,
        activity_details: ActivityDetails,
        snapshot_link: SnapshotLink,
        performance: InstancePerformance,
    ) -> Result<Aggregate, AppError> {
        if !fieldpath::is_valid_segment(character_id) {
            return Err(AppError::Validation(format!(
                "Invalid character id '{character_id}'"
            )));
        }
        if activity_details.activity_id.trim().is_empty() {
            return Err(AppError::Validation("Activity id is required".into()));
        }
        if snapshot_link.snapshot_id.trim().is_empty() {
            return Err(AppError::Validation("Snapshot link has no snapshot id".into()));
        }

        if let Some(existing) = self.find_by_activity(&activity_details.activity_id).await? {
            return self
                .merge_character(&existing.id, character_id, &snapshot_link, &performance)
                .await;
        }

        let id = aggregate_id_for(&activity_details.activity_id);
        let aggregate = Aggregate::seeded(
            id.clone(),
            activity_details,
            character_id,
            snapshot_link.clone(),
            performance.clone(),
        );
        match self
            .store
            .create(AGGREGATES, &id, serde_json::to_value(&aggregate)?)
            .await
        {
            Ok(_) => {
                info!(
                    "Created aggregate {id} for activity {} (character {character_id})",
                    aggregate.activity_id
                );
                Ok(aggregate)
            }
            Err(StoreError::AlreadyExists { .. }) => {
                debug!("Aggregate {id} was created concurrently, merging character {character_id}");
                self.merge_character(&id, character_id, &snapshot_link, &performance)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn merge_character(
        &self,
        id: &str,
        character_id: &str,
        link: &SnapshotLink,
        performance: &InstancePerformance,
    ) -> Result<Aggregate, AppError> {
        let updates = character_updates(character_id, link, performance)?;
        let doc = self.store.update(AGGREGATES, id, &updates, None).await?;
        debug!("Merged character {character_id} into aggregate {id}");
        Ok(doc.decode()?)
    }

    async fn find_by_activity(&self, activity_id: &str) -> Result<Option<Aggregate>, AppError> {
        let query = Query::new().eq("activityId", activity_id).limit(1);
        let docs = self.store.query(AGGREGATES, &query).await?;
        match docs.first() {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Lookups
    // ────────────────────────────────────────────────────────────────────────

    pub async fn get_aggregate(&self, activity_id: &str) -> Result<Aggregate, AppError> {
        self.find_by_activity(activity_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Aggregate for activity {activity_id} not found"))
            })
    }

    /// Batched lookup by document id. Order is unspecified.
    pub async fn get_aggregates(&self, ids: &[String]) -> Result<Vec<Aggregate>, AppError> {
        let docs = store::get_many_chunked(self.store.as_ref(), AGGREGATES, ids).await?;
        decode_all(&docs)
    }

    /// Batched lookup by activity id. Order is unspecified.
    pub async fn get_aggregates_by_activity(
        &self,
        activity_ids: &[String],
    ) -> Result<Vec<Aggregate>, AppError> {
        let docs =
            store::query_in_chunked(self.store.as_ref(), AGGREGATES, "activityId", activity_ids)
                .await?;
        decode_all(&docs)
    }

    /// Aggregates whose link for `character_id` points at `snapshot_id`.
    pub async fn find_by_snapshot_link(
        &self,
        character_id: &str,
        snapshot_id: &str,
    ) -> Result<Vec<Aggregate>, AppError> {
        if !fieldpath::is_valid_segment(character_id) {
            return Err(AppError::Validation(format!(
                "Invalid character id '{character_id}'"
            )));
        }
        let field = format!("snapshotLinks.{character_id}.snapshotId");
        let query = Query::new().eq(field, snapshot_id);
        let docs = self.store.query(AGGREGATES, &query).await?;
        decode_all(&docs)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Read-modify-write
    // ────────────────────────────────────────────────────────────────────────

    /// Applies `mutate` to the aggregate and writes back only the fields it
    /// changed. Returns `false` without writing when nothing changed.
    ///
    /// With `transactional`, the write carries the version that was read; a
    /// concurrent writer forces a fresh read and another attempt.
    pub async fn update<F>(
        &self,
        id: &str,
        mut mutate: F,
        transactional: bool,
    ) -> Result<bool, AppError>
    where
        F: FnMut(&mut Aggregate) -> Result<(), AppError> + Send,
    {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let doc = self
                .store
                .get(AGGREGATES, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Aggregate {id} not found")))?;
            let mut aggregate: Aggregate = doc.decode()?;
            mutate(&mut aggregate)?;

            let after = serde_json::to_value(&aggregate)?;
            let updates = fieldpath::diff(&doc.data, &after, DIFF_DEPTH);
            if updates.is_empty() {
                debug!("Aggregate {id} unchanged, skipping write");
                return Ok(false);
            }

            let expected = transactional.then_some(doc.version);
            match self.store.update(AGGREGATES, id, &updates, expected).await {
                Ok(_) => {
                    debug!("Updated {} field(s) on aggregate {id}", updates.len());
                    return Ok(true);
                }
                Err(StoreError::VersionMismatch { .. }) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                    warn!("Aggregate {id} changed during update (attempt {attempt}), retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AppError::Transient(format!(
            "Aggregate {id} kept changing after {MAX_TRANSACTION_ATTEMPTS} attempts"
        )))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Backfill
    // ────────────────────────────────────────────────────────────────────────

    /// Recomputes the flat `sessionIds` / `snapshotIds` / `characterIds`
    /// arrays from each aggregate's links and union-merges them in.
    /// A failing document is logged and skipped. Returns the number of
    /// documents updated.
    pub async fn update_all_aggregates(&self) -> Result<usize, AppError> {
        let mut cursor: Option<String> = None;
        let mut scanned = 0usize;
        let mut updated = 0usize;
        let mut failed = 0usize;

        loop {
            let page = self
                .store
                .scan(AGGREGATES, cursor.as_deref(), self.page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.id.clone());

            for doc in &page {
                scanned += 1;
                match self.backfill_document(doc).await {
                    Ok(true) => updated += 1,
                    Ok(false) => {}
                    Err(e) => {
                        failed += 1;
                        warn!("Backfill skipped aggregate {} [{}]: {e}", doc.id, e.code());
                    }
                }
            }
            if page.len() < self.page_size {
                break;
            }
        }

        info!("Backfill complete: {updated} updated, {failed} failed, {scanned} scanned");
        Ok(updated)
    }

    async fn backfill_document(&self, doc: &Document) -> Result<bool, AppError> {
        let aggregate: Aggregate = doc.decode()?;
        if aggregate.snapshot_links.is_empty() {
            return Ok(false);
        }
        let linkage = aggregate.linkage();
        let updates = [
            FieldUpdate::array_union("sessionIds", linkage.session_ids),
            FieldUpdate::array_union("snapshotIds", linkage.snapshot_ids),
            FieldUpdate::array_union("characterIds", linkage.character_ids),
        ];
        self.store.update(AGGREGATES, &doc.id, &updates, None).await?;
        Ok(true)
    }
}

fn decode_all(docs: &[Document]) -> Result<Vec<Aggregate>, AppError> {
    docs.iter()
        .map(|doc| doc.decode().map_err(AppError::from))
        .collect()
}
