use std::sync::Arc;

use crate::aggregates::AggregateStore;
use crate::config::Config;
use crate::loadout::SnapshotStore;
use crate::manifest::ManifestResolver;
use crate::reconcile::{Reconciler, RetryPolicy};
use crate::sessions::SessionStore;
use crate::store::DocumentStore;

/// Shared services, built once by the entry point over a single store client.
#[derive(Clone)]
pub struct AppState {
    pub snapshots: SnapshotStore,
    pub aggregates: AggregateStore,
    pub sessions: SessionStore,
    pub reconciler: Reconciler,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        manifest: Arc<dyn ManifestResolver>,
        config: &Config,
    ) -> Self {
        let aggregates =
            AggregateStore::new(store.clone()).with_page_size(config.backfill_page_size);
        let snapshots = SnapshotStore::new(store.clone(), aggregates.clone());
        let sessions = SessionStore::new(store, config.session_lookback());
        let reconciler = Reconciler::new(
            snapshots.clone(),
            aggregates.clone(),
            sessions.clone(),
            manifest,
            RetryPolicy::from_config(config),
        );
        Self {
            snapshots,
            aggregates,
            sessions,
            reconciler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::StaticManifest;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_services_share_one_store() {
        let memory = MemoryStore::new();
        let state = AppState::new(
            Arc::new(memory.clone()),
            Arc::new(StaticManifest::new()),
            &Config::default(),
        );

        let session = state.sessions.start("u1", "c1", "u1").await.unwrap();
        assert_eq!(memory.count(crate::sessions::SESSIONS).await, 1);
        assert_eq!(state.sessions.get(&session.id).await.unwrap().id, session.id);
        assert_eq!(state.aggregates.update_all_aggregates().await.unwrap(), 0);
    }
}
