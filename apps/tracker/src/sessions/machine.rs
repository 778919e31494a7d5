//! Session lifecycle: `pending` → `complete`, nothing else.
//!
//! At most one pending session exists per (user, character). Each pending
//! session owns a guard document `session_guards/<user>:<character>` created
//! with create-if-absent semantics; `complete` releases it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::loadout::names::generate_name;
use crate::models::session::{Session, SessionFilter, SessionStatus};
use crate::store::{Direction, DocumentStore, FieldUpdate, FilterOp, Query, StoreError};

pub const SESSIONS: &str = "sessions";
pub const SESSION_GUARDS: &str = "session_guards";

const MAX_ATTEMPTS: u32 = 3;

/// A guard whose session document has not appeared yet is only treated as
/// abandoned once it is older than this.
const GUARD_GRACE_SECS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionGuard {
    session_id: String,
    user_id: String,
    character_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
}

/// Separator inside guard keys; `start` rejects ids containing it so that two
/// different (user, character) pairs never share a key.
const GUARD_SEPARATOR: char = ':';

fn guard_id(user_id: &str, character_id: &str) -> String {
    format!("{user_id}{GUARD_SEPARATOR}{character_id}")
}

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn DocumentStore>,
    lookback: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn DocumentStore>, lookback: Duration) -> Self {
        Self { store, lookback }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Transitions
    // ────────────────────────────────────────────────────────────────────────

    /// Opens a pending session. Fails with `Conflict` while another session
    /// for the same character is pending.
    pub async fn start(
        &self,
        user_id: &str,
        character_id: &str,
        started_by: &str,
    ) -> Result<Session, AppError> {
        if user_id.trim().is_empty() || character_id.trim().is_empty() {
            return Err(AppError::Validation(
                "Session requires a user id and a character id".into(),
            ));
        }
        if user_id.contains(GUARD_SEPARATOR) || character_id.contains(GUARD_SEPARATOR) {
            return Err(AppError::Validation(format!(
                "Session ids may not contain '{GUARD_SEPARATOR}'"
            )));
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            character_id: character_id.to_string(),
            name: generate_name(),
            status: SessionStatus::Pending,
            started_at: now,
            completed_at: None,
            started_by: started_by.to_string(),
            aggregate_ids: Vec::new(),
            last_seen_activity_id: None,
            last_seen_timestamp: None,
        };
        let guard = SessionGuard {
            session_id: session.id.clone(),
            user_id: user_id.to_string(),
            character_id: character_id.to_string(),
            created_at: now,
        };

        self.acquire_guard(&guard).await?;

        let guard_key = guard_id(user_id, character_id);
        if let Err(e) = self
            .store
            .create(SESSIONS, &session.id, serde_json::to_value(&session)?)
            .await
        {
            warn!("Failed to create session {}, releasing guard {guard_key}: {e}", session.id);
            if let Err(release) = self.store.delete(SESSION_GUARDS, &guard_key).await {
                warn!("Failed to release guard {guard_key}: {release}");
            }
            return Err(e.into());
        }

        info!(
            "Started session {} ({}) for {user_id}/{character_id}",
            session.id, session.name
        );
        Ok(session)
    }

    async fn acquire_guard(&self, guard: &SessionGuard) -> Result<(), AppError> {
        let key = guard_id(&guard.user_id, &guard.character_id);
        let data = serde_json::to_value(guard)?;

        for _ in 0..MAX_ATTEMPTS {
            match self.store.create(SESSION_GUARDS, &key, data.clone()).await {
                Ok(_) => return Ok(()),
                Err(StoreError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }

            // Released between our create and this read: try again.
            let Some(existing) = self.store.get(SESSION_GUARDS, &key).await? else {
                continue;
            };
            let held: SessionGuard = existing.decode()?;
            let owner = self.store.get(SESSIONS, &held.session_id).await?;
            let stale = match &owner {
                Some(doc) => !doc.decode::<Session>()?.is_pending(),
                None => Utc::now() - held.created_at > Duration::seconds(GUARD_GRACE_SECS),
            };
            if !stale {
                return Err(AppError::Conflict(format!(
                    "Session {} is already pending for {}/{}",
                    held.session_id, guard.user_id, guard.character_id
                )));
            }

            warn!("Reclaiming stale session guard {key} held by {}", held.session_id);
            let reclaim = [
                FieldUpdate::set("sessionId", guard.session_id.clone()),
                FieldUpdate::set("createdAt", guard.created_at.timestamp_millis()),
            ];
            return match self
                .store
                .update(SESSION_GUARDS, &key, &reclaim, Some(existing.version))
                .await
            {
                Ok(_) => Ok(()),
                Err(StoreError::VersionMismatch { .. } | StoreError::NotFound { .. }) => {
                    Err(AppError::Conflict(format!(
                        "Session guard {key} was claimed concurrently"
                    )))
                }
                Err(e) => Err(e.into()),
            };
        }
        Err(AppError::Transient(format!(
            "Session guard {key} kept changing after {MAX_ATTEMPTS} attempts"
        )))
    }

    /// Moves a pending session to `complete`. Completing an already-complete
    /// session returns it unchanged.
    pub async fn complete(&self, id: &str) -> Result<Session, AppError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let doc = self
                .store
                .get(SESSIONS, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;
            let session: Session = doc.decode()?;
            if !session.is_pending() {
                info!("Session {id} is already complete");
                return Ok(session);
            }

            let updates = [
                FieldUpdate::set("status", SessionStatus::Complete.as_str()),
                FieldUpdate::set("completedAt", Utc::now().timestamp_millis()),
            ];
            match self.store.update(SESSIONS, id, &updates, Some(doc.version)).await {
                Ok(updated) => {
                    let completed: Session = updated.decode()?;
                    self.release_guard(&completed).await;
                    info!("Completed session {id}");
                    return Ok(completed);
                }
                Err(StoreError::VersionMismatch { .. }) => {
                    debug!("Session {id} changed during completion (attempt {attempt}), retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AppError::Transient(format!(
            "Session {id} kept changing after {MAX_ATTEMPTS} attempts"
        )))
    }

    /// Deletes the guard only while it still belongs to `session`. A leftover
    /// guard is reclaimed by the next `start`.
    async fn release_guard(&self, session: &Session) {
        let key = guard_id(&session.user_id, &session.character_id);
        let held = match self.store.get(SESSION_GUARDS, &key).await {
            Ok(Some(doc)) => doc.decode::<SessionGuard>().ok(),
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to read session guard {key}: {e}");
                return;
            }
        };
        if held.is_some_and(|g| g.session_id != session.id) {
            return;
        }
        if let Err(e) = self.store.delete(SESSION_GUARDS, &key).await {
            warn!("Failed to release session guard {key}: {e}");
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Lookups
    // ────────────────────────────────────────────────────────────────────────

    pub async fn get(&self, id: &str) -> Result<Session, AppError> {
        let doc = self
            .store
            .get(SESSIONS, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;
        Ok(doc.decode()?)
    }

    /// The pending session of a character; `NotFound` when none is open.
    pub async fn get_active(&self, user_id: &str, character_id: &str) -> Result<Session, AppError> {
        let query = Query::new()
            .eq("userId", user_id)
            .eq("characterId", character_id)
            .eq("status", SessionStatus::Pending.as_str())
            .order_by("startedAt", Direction::Desc)
            .limit(1);
        let docs = self.store.query(SESSIONS, &query).await?;
        match docs.first() {
            Some(doc) => Ok(doc.decode()?),
            None => Err(AppError::NotFound(format!(
                "No pending session for {user_id}/{character_id}"
            ))),
        }
    }

    /// Newest first. Without a status filter only sessions started within the
    /// lookback window are returned.
    pub async fn get_all(&self, filter: &SessionFilter) -> Result<Vec<Session>, AppError> {
        let mut query = Query::new();
        if let Some(user_id) = &filter.user_id {
            query = query.eq("userId", user_id.as_str());
        }
        if let Some(character_id) = &filter.character_id {
            query = query.eq("characterId", character_id.as_str());
        }
        match filter.status {
            Some(status) => query = query.eq("status", status.as_str()),
            None => {
                let since = Utc::now() - self.lookback;
                query = query.filter("startedAt", FilterOp::Gte, since.timestamp_millis());
            }
        }
        let docs = self
            .store
            .query(SESSIONS, &query.order_by("startedAt", Direction::Desc))
            .await?;
        docs.iter()
            .map(|doc| doc.decode().map_err(AppError::from))
            .collect()
    }

    // ────────────────────────────────────────────────────────────────────────
    // Bookkeeping
    // ────────────────────────────────────────────────────────────────────────

    /// Set-union of aggregate ids; status is untouched.
    pub async fn add_aggregate_ids(
        &self,
        id: &str,
        aggregate_ids: &[String],
    ) -> Result<Session, AppError> {
        if aggregate_ids.is_empty() {
            return self.get(id).await;
        }
        let updates = [FieldUpdate::array_union("aggregateIds", aggregate_ids.iter().cloned())];
        let doc = self.store.update(SESSIONS, id, &updates, None).await?;
        debug!("Added {} aggregate id(s) to session {id}", aggregate_ids.len());
        Ok(doc.decode()?)
    }

    pub async fn set_last_activity(
        &self,
        id: &str,
        activity_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let updates = [
            FieldUpdate::set("lastSeenActivityId", activity_id),
            FieldUpdate::set("lastSeenTimestamp", timestamp.timestamp_millis()),
        ];
        let doc = self.store.update(SESSIONS, id, &updates, None).await?;
        Ok(doc.decode()?)
    }
}
