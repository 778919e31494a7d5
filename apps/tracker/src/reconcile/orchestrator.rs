//! Records observed matches and builds read-only views over them.
//!
//! Flow: active session? → build loadout → save snapshot (dedup) →
//! upsert aggregate with a system-inferred link → session bookkeeping.
//! Each store step is retried on transient failures.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregates::AggregateStore;
use crate::errors::AppError;
use crate::loadout::{build_loadout, SaveSnapshot, SnapshotStore};
use crate::manifest::ManifestResolver;
use crate::models::aggregate::{Aggregate, InstancePerformance, SnapshotLink};
use crate::models::payload::{RawActivity, RawLoadout, RawPerformance};
use crate::models::session::Session;
use crate::models::snapshot::CharacterSnapshot;
use crate::reconcile::enrichment::{enrich_aggregate, EnrichedAggregate};
use crate::reconcile::retry::{with_retry, RetryPolicy};
use crate::sessions::SessionStore;

/// One character's view of a finished match, as fetched from the game API.
#[derive(Debug, Clone)]
pub struct ObservedMatch {
    pub user_id: String,
    pub character_id: String,
    pub loadout: RawLoadout,
    pub activity: RawActivity,
    pub performance: RawPerformance,
}

#[derive(Debug, Clone)]
pub struct RecordedMatch {
    pub snapshot: CharacterSnapshot,
    pub aggregate: Aggregate,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session: Session,
    /// Oldest activity first.
    pub aggregates: Vec<EnrichedAggregate>,
}

#[derive(Clone)]
pub struct Reconciler {
    snapshots: SnapshotStore,
    aggregates: AggregateStore,
    sessions: SessionStore,
    manifest: Arc<dyn ManifestResolver>,
    retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(
        snapshots: SnapshotStore,
        aggregates: AggregateStore,
        sessions: SessionStore,
        manifest: Arc<dyn ManifestResolver>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            snapshots,
            aggregates,
            sessions,
            manifest,
            retry,
        }
    }

    pub async fn record_match(&self, observed: ObservedMatch) -> Result<RecordedMatch, AppError> {
        let ObservedMatch {
            user_id,
            character_id,
            loadout: raw_loadout,
            activity,
            performance,
        } = observed;

        if character_id.trim().is_empty() {
            return Err(AppError::Validation("Observed match has no character id".into()));
        }
        for reported in [&raw_loadout.character_id, &performance.character_id]
            .into_iter()
            .flatten()
        {
            if *reported != character_id {
                return Err(AppError::Validation(format!(
                    "Payload for character {reported} does not belong to {character_id}"
                )));
            }
        }
        let details = activity.into_details(Utc::now())?;

        // Step 1: active session, if any
        let session = match with_retry("resolve session", &self.retry, || {
            self.sessions.get_active(&user_id, &character_id)
        })
        .await
        {
            Ok(session) => Some(session),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let session_id = session.map(|s| s.id);

        // Step 2: snapshot
        let input = SaveSnapshot {
            user_id: user_id.clone(),
            character_id: character_id.clone(),
            loadout: build_loadout(&raw_loadout, self.manifest.as_ref()),
            stats: raw_loadout.stats.clone().unwrap_or_default(),
            name: None,
        };
        let snapshot = with_retry("save snapshot", &self.retry, || {
            self.snapshots.save(input.clone())
        })
        .await?;

        // Step 3: aggregate
        let link = SnapshotLink::inferred(snapshot.id.clone(), character_id.clone())
            .with_session(session_id.clone());
        let performance = InstancePerformance::from(performance);
        let aggregate = with_retry("add aggregate", &self.retry, || {
            self.aggregates.add_aggregate(
                &character_id,
                details.clone(),
                link.clone(),
                performance.clone(),
            )
        })
        .await?;

        // Step 4: session bookkeeping
        if let Some(session_id) = &session_id {
            let aggregate_ids = [aggregate.id.clone()];
            with_retry("link session", &self.retry, || {
                self.sessions.add_aggregate_ids(session_id, &aggregate_ids)
            })
            .await?;
            with_retry("record last activity", &self.retry, || {
                self.sessions
                    .set_last_activity(session_id, &details.activity_id, details.period)
            })
            .await?;
            debug!("Session {session_id} now includes aggregate {}", aggregate.id);
        }

        info!(
            "Recorded activity {} for {user_id}/{character_id}: snapshot {}, aggregate {}",
            details.activity_id, snapshot.id, aggregate.id
        );
        Ok(RecordedMatch {
            snapshot,
            aggregate,
            session_id,
        })
    }

    /// Read-only presentation view of one activity.
    pub async fn enrich(&self, activity_id: &str) -> Result<EnrichedAggregate, AppError> {
        let aggregate = with_retry("load aggregate", &self.retry, || {
            self.aggregates.get_aggregate(activity_id)
        })
        .await?;
        let snapshots = self.linked_snapshots(std::slice::from_ref(&aggregate)).await?;
        Ok(enrich_aggregate(&aggregate, &snapshots, self.manifest.as_ref()))
    }

    /// A session with every aggregate it collected, enriched.
    pub async fn session_report(&self, session_id: &str) -> Result<SessionReport, AppError> {
        let session =
            with_retry("load session", &self.retry, || self.sessions.get(session_id)).await?;
        let mut aggregates = with_retry("load aggregates", &self.retry, || {
            self.aggregates.get_aggregates(&session.aggregate_ids)
        })
        .await?;
        aggregates.sort_by(|a, b| {
            a.activity_details
                .period
                .cmp(&b.activity_details.period)
                .then_with(|| a.activity_id.cmp(&b.activity_id))
        });

        let snapshots = self.linked_snapshots(&aggregates).await?;
        let manifest = self.manifest.as_ref();
        let aggregates = aggregates
            .iter()
            .map(|aggregate| enrich_aggregate(aggregate, &snapshots, manifest))
            .collect();

        Ok(SessionReport { session, aggregates })
    }

    async fn linked_snapshots(
        &self,
        aggregates: &[Aggregate],
    ) -> Result<HashMap<String, CharacterSnapshot>, AppError> {
        let ids: Vec<String> = aggregates
            .iter()
            .flat_map(|a| a.snapshot_links.values().map(|l| l.snapshot_id.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let snapshots = with_retry("load snapshots", &self.retry, || {
            self.snapshots.get_by_ids(&ids)
        })
        .await?;
        Ok(snapshots.into_iter().map(|s| (s.id.clone(), s)).collect())
    }
}
