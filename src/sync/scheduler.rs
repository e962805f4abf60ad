use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::manager::SyncManager;

impl SyncManager {
    /// Starts running a full sync every `period`, the first one immediately.
    /// If a periodic job is already pending it is kept and `false` is
    /// returned.
    pub fn schedule_periodic_sync(self: &Arc<Self>, period: Duration) -> bool {
        let mut slot = self.periodic.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("Periodic sync already scheduled, keeping it");
            return false;
        }

        let manager = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let status = manager.perform_full_sync().await;
                tracing::info!("Periodic sync finished: {}", status);
            }
        }));
        tracing::info!("Scheduled periodic sync every {:?}", period);
        true
    }

    /// Stops the periodic job. A run in progress is aborted at its next
    /// await point; nothing is resumed from it.
    pub fn cancel_periodic_sync(&self) -> bool {
        let handle = self
            .periodic
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match handle {
            Some(handle) => {
                handle.abort();
                tracing::info!("Cancelled periodic sync");
                true
            }
            None => false,
        }
    }

    pub fn is_periodic_sync_scheduled(&self) -> bool {
        self.periodic
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_temp_repository;
    use crate::models::SyncStatus;
    use crate::remote::memory::MemoryDocumentStore;
    use crate::error::Result;
    use crate::remote::{Document, DocumentPage, DocumentStore, RemoteBackup, Write};
    use async_trait::async_trait;

    /// Store whose point reads never return in time.
    struct StalledStore;

    #[async_trait]
    impl DocumentStore for StalledStore {
        async fn commit(&self, _writes: Vec<Write>) -> Result<()> {
            Ok(())
        }

        async fn list(&self, _collection: &str, _page_size: usize, _page_token: Option<String>) -> Result<DocumentPage> {
            Ok(DocumentPage::default())
        }

        async fn get(&self, _path: &str) -> Result<Option<Document>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn count(&self, _collection: &str) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn schedule_keeps_existing_job_and_cancel_stops_it() {
        let (_dir, repository) = open_temp_repository().await;
        let store = Arc::new(MemoryDocumentStore::new());
        let remote = Arc::new(RemoteBackup::new(store, Some("u1".into())));
        let manager = Arc::new(SyncManager::new(Arc::new(repository), remote.clone()));
        let mut observer = manager.observer();

        assert!(manager.schedule_periodic_sync(Duration::from_secs(3600)));
        assert!(!manager.schedule_periodic_sync(Duration::from_secs(60)));
        assert!(manager.is_periodic_sync_scheduled());

        // The first tick fires immediately.
        let finished = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match observer.changed().await {
                    Some(SyncStatus::Success(message)) => break message,
                    Some(_) => continue,
                    None => panic!("manager dropped"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(finished, "Up to date");
        assert!(!remote.is_first_sync().await.unwrap());

        assert!(manager.cancel_periodic_sync());
        assert!(!manager.is_periodic_sync_scheduled());
        assert!(!manager.cancel_periodic_sync());
        assert!(manager.schedule_periodic_sync(Duration::from_secs(3600)));
        manager.cancel_periodic_sync();
    }

    #[tokio::test]
    async fn cancelling_mid_run_resets_syncing_state() {
        let (_dir, repository) = open_temp_repository().await;
        let remote = Arc::new(RemoteBackup::new(Arc::new(StalledStore), Some("u1".into())));
        let manager = Arc::new(SyncManager::new(Arc::new(repository), remote));
        let observer = manager.observer();

        manager.schedule_periodic_sync(Duration::from_secs(3600));
        tokio::time::timeout(Duration::from_secs(5), async {
            while !observer.is_syncing() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(manager.cancel_periodic_sync());
        tokio::time::timeout(Duration::from_secs(2), async {
            while observer.is_syncing() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(observer.sync_status(), SyncStatus::Error("Sync cancelled".into()));
        assert_eq!(observer.last_error().as_deref(), Some("Sync cancelled"));
        assert!(observer.progress().is_none());

        assert!(!manager.is_periodic_sync_scheduled());
    }
}
