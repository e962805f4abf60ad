use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::db::Repository;
use crate::error::Result;
use crate::models::{now_ms, Article, SyncStatus};
use crate::remote::RemoteBackup;

use super::conflict::should_accept_remote_change;
use super::state::{SyncObserver, SyncState};

/// Chunk size for steady-state pushes.
pub const STEADY_CHUNK_SIZE: usize = 50;
/// Chunk size for large initial backups.
pub const BULK_CHUNK_SIZE: usize = 200;
const BULK_THRESHOLD: u64 = 1000;
/// Pulled articles are applied this many at a time.
pub const APPLY_CHUNK_SIZE: usize = 50;

const UP_TO_DATE: &str = "Up to date";

pub fn chunk_size_for(is_first_sync: bool, total: u64) -> usize {
    if is_first_sync && total > BULK_THRESHOLD {
        BULK_CHUNK_SIZE
    } else {
        STEADY_CHUNK_SIZE
    }
}

/// Result of pushing local changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    pub total: u64,
    pub chunks: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl PushOutcome {
    fn message(&self) -> String {
        if self.total == 0 {
            UP_TO_DATE.to_string()
        } else if self.failed == 0 {
            format!("Synced {} articles", self.succeeded)
        } else {
            format!("{} synced, {} failed", self.succeeded, self.failed)
        }
    }

    fn status(&self) -> SyncStatus {
        if self.failed > 0 && self.succeeded == 0 {
            SyncStatus::Error(self.message())
        } else {
            SyncStatus::Success(self.message())
        }
    }
}

/// What happened to one pulled remote article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteChange {
    Inserted,
    Accepted,
    KeptLocal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ApplySummary {
    inserted: usize,
    accepted: usize,
    kept_local: usize,
    failed: usize,
}

impl ApplySummary {
    fn applied(&self) -> usize {
        self.inserted + self.accepted
    }

    fn message(&self) -> String {
        format!(
            "pulled {} new, {} updated, {} kept local",
            self.inserted, self.accepted, self.kept_local
        )
    }
}

/// Reconciles the local library with the remote backup for the signed-in user.
///
/// Entry points never return errors: failures end up in the observable
/// [`SyncStatus`]. Runs are serialized through a single job slot.
pub struct SyncManager {
    repository: Arc<Repository>,
    remote: Arc<RemoteBackup>,
    state: SyncState,
    job_slot: tokio::sync::Mutex<()>,
    pub(super) periodic: Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    pub fn new(repository: Arc<Repository>, remote: Arc<RemoteBackup>) -> Self {
        Self {
            repository,
            remote,
            state: SyncState::new(),
            job_slot: tokio::sync::Mutex::new(()),
            periodic: Mutex::new(None),
        }
    }

    pub fn observer(&self) -> SyncObserver {
        self.state.observer()
    }

    /// Pushes local articles changed since the last sync (or all of them on
    /// the first sync).
    pub async fn sync_local_changes(&self) -> SyncStatus {
        let _slot = self.job_slot.lock().await;
        let run = self.state.begin();
        let status = match self.push_local_changes().await {
            Ok(outcome) => outcome.status(),
            Err(e) => {
                tracing::error!("Local sync failed: {}", e);
                SyncStatus::Error(e.to_string())
            }
        };
        run.finish(status.clone());
        status
    }

    /// Backup, restore or bidirectional merge depending on what each side
    /// already holds.
    pub async fn perform_full_sync(&self) -> SyncStatus {
        let _slot = self.job_slot.lock().await;
        let run = self.state.begin();
        let status = match self.full_sync().await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("Full sync failed: {}", e);
                SyncStatus::Error(e.to_string())
            }
        };
        run.finish(status.clone());
        status
    }

    async fn full_sync(&self) -> Result<SyncStatus> {
        if !self.remote.is_first_sync().await? {
            return self.perform_bidirectional_sync().await;
        }

        let local_count = self.repository.count_all_articles().await?;
        let remote_count = self.remote.get_remote_article_count().await?;
        tracing::info!(
            "First sync: {} local articles, {} remote articles",
            local_count,
            remote_count
        );

        match (local_count > 0, remote_count > 0) {
            (true, false) => Ok(self.push_local_changes().await?.status()),
            (false, true) => self.restore_only().await,
            (true, true) => self.perform_bidirectional_sync().await,
            (false, false) => {
                self.mark_synced(now_ms()).await?;
                Ok(SyncStatus::Success(UP_TO_DATE.to_string()))
            }
        }
    }

    async fn restore_only(&self) -> Result<SyncStatus> {
        let started_at = now_ms();
        let articles = self.pull_remote_articles().await?;
        let summary = self.apply_remote_articles(articles).await;
        self.mark_synced(started_at).await?;
        Ok(SyncStatus::Success(format!("Restored {} articles", summary.applied())))
    }

    /// Pull then push. A stale remote copy is corrected locally during the
    /// pull and re-sent during the push of the same run.
    pub async fn perform_bidirectional_sync(&self) -> Result<SyncStatus> {
        let articles = self.pull_remote_articles().await?;
        let summary = self.apply_remote_articles(articles).await;
        let pushed = self.push_local_changes().await?;

        let message = format!("{}; {}", summary.message(), pushed.message());
        Ok(match pushed.status() {
            SyncStatus::Error(_) => SyncStatus::Error(message),
            _ => SyncStatus::Success(message),
        })
    }

    async fn pull_remote_articles(&self) -> Result<Vec<Article>> {
        let state = &self.state;
        let articles = self
            .remote
            .restore_all_articles_paginated(&|current, total| {
                tracing::debug!("Pulled {}/{} remote articles", current, total);
                state.report_progress(current, total);
            })
            .await?;
        Ok(articles)
    }

    async fn apply_remote_articles(&self, articles: Vec<Article>) -> ApplySummary {
        let total = articles.len();
        let mut summary = ApplySummary::default();
        let mut processed = 0;
        let mut remaining = articles.into_iter();

        loop {
            let chunk: Vec<Article> = remaining.by_ref().take(APPLY_CHUNK_SIZE).collect();
            if chunk.is_empty() {
                break;
            }
            processed += chunk.len();

            for article in chunk {
                let item_id = article.item_id.clone();
                match self.handle_remote_article_change(article).await {
                    Ok(RemoteChange::Inserted) => summary.inserted += 1,
                    Ok(RemoteChange::Accepted) => summary.accepted += 1,
                    Ok(RemoteChange::KeptLocal) => summary.kept_local += 1,
                    Err(e) => {
                        tracing::warn!("Failed to apply remote article {}: {}", item_id, e);
                        summary.failed += 1;
                    }
                }
            }

            tracing::debug!("Applied {}/{} remote articles", processed, total);
            self.state.report_progress(processed, total);
        }

        tracing::info!(
            "Applied remote articles: {} inserted, {} accepted, {} kept local, {} failed",
            summary.inserted,
            summary.accepted,
            summary.kept_local,
            summary.failed
        );
        summary
    }

    /// Merges one pulled article into the local store.
    pub async fn handle_remote_article_change(&self, remote: Article) -> Result<RemoteChange> {
        let item_id = remote.item_id.clone();

        let Some(local) = self.repository.get_article(&item_id).await? else {
            self.repository.upsert_article(remote).await?;
            self.restore_local_tags(&item_id).await?;
            return Ok(RemoteChange::Inserted);
        };

        if should_accept_remote_change(&local, &remote) {
            self.repository.upsert_article(remote).await?;
            self.restore_local_tags(&item_id).await?;
            return Ok(RemoteChange::Accepted);
        }

        tracing::debug!("Keeping local copy of {}, pushing it back", item_id);
        self.remote
            .backup_articles_paginated(std::slice::from_ref(&local), &|_, _| {})
            .await?;
        if let Err(e) = self.push_article_extras(&local).await {
            tracing::warn!("Failed to push tags back for {}: {}", item_id, e);
        }
        Ok(RemoteChange::KeptLocal)
    }

    /// Replaces local tags with the remote tag set. A failed remote read
    /// leaves local tags untouched.
    async fn restore_local_tags(&self, item_id: &str) -> Result<()> {
        let remote_tags = match self.remote.restore_article_tags(item_id).await {
            Ok(tags) => tags,
            Err(e) => {
                tracing::warn!("Failed to restore tags for {}: {}", item_id, e);
                return Ok(());
            }
        };

        for tag in self.repository.get_article_tags(item_id).await? {
            self.repository.delete_article_tag(item_id, &tag.tag).await?;
        }
        self.repository.insert_article_tags(remote_tags).await?;
        Ok(())
    }

    async fn push_local_changes(&self) -> Result<PushOutcome> {
        let started_at = now_ms();
        let is_first_sync = self.remote.is_first_sync().await?;
        let last_sync = if is_first_sync {
            0
        } else {
            self.remote.get_last_sync_timestamp().await?
        };

        let total = if is_first_sync {
            self.repository.count_all_articles().await?
        } else {
            self.repository.count_articles_modified_since(last_sync).await?
        };

        let mut outcome = PushOutcome {
            total,
            ..PushOutcome::default()
        };

        if total == 0 {
            tracing::info!("No local changes to push");
            if is_first_sync {
                self.mark_synced(started_at).await?;
            }
            return Ok(outcome);
        }

        let chunk_size = chunk_size_for(is_first_sync, total);
        tracing::info!(
            "Pushing {} articles in chunks of {} (first sync: {})",
            total,
            chunk_size,
            is_first_sync
        );

        let mut offset = 0usize;
        while (offset as u64) < total {
            let page = if is_first_sync {
                self.repository
                    .get_all_articles_paginated(chunk_size, offset)
                    .await?
            } else {
                self.repository
                    .get_articles_modified_since_paginated(last_sync, chunk_size, offset)
                    .await?
            };
            if page.is_empty() {
                break;
            }
            outcome.chunks += 1;

            match self.push_chunk(&page).await {
                Ok(written) => outcome.succeeded += written,
                Err(e) => {
                    tracing::warn!("Chunk at offset {} ({} articles) failed: {}", offset, page.len(), e);
                    outcome.failed += page.len();
                }
            }

            offset += chunk_size;
            self.state
                .report_progress(offset.min(total as usize), total as usize);
        }

        if outcome.failed == 0 {
            self.mark_synced(started_at).await?;
        } else {
            tracing::warn!(
                "{} articles failed to push; sync marker left at {} so they are retried",
                outcome.failed,
                last_sync
            );
        }

        tracing::info!("Push finished: {}", outcome.message());
        Ok(outcome)
    }

    async fn push_chunk(&self, page: &[Article]) -> Result<usize> {
        let written = self
            .remote
            .backup_articles_paginated(page, &|_, _| {})
            .await?;

        for article in page {
            if let Err(e) = self.push_article_extras(article).await {
                tracing::warn!("Tag backup failed for {}: {}", article.item_id, e);
            }
        }
        Ok(written)
    }

    async fn push_article_extras(&self, article: &Article) -> Result<()> {
        let tags = self.repository.get_article_tags(&article.item_id).await?;
        self.remote.backup_article_tags(&article.item_id, &tags).await?;

        let attachments = self.repository.get_attachments(&article.item_id).await?;
        self.remote
            .backup_article_attachments(&article.item_id, &attachments)
            .await?;
        Ok(())
    }

    async fn mark_synced(&self, timestamp: i64) -> Result<()> {
        self.remote.update_last_sync_timestamp(timestamp).await?;
        self.state.set_last_sync_time(timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_temp_repository;
    use crate::models::{ArticleFilter, Tag};
    use crate::remote::memory::MemoryDocumentStore;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        repository: Arc<Repository>,
        store: Arc<MemoryDocumentStore>,
        remote: Arc<RemoteBackup>,
        manager: SyncManager,
    }

    async fn harness() -> Harness {
        let (dir, repository) = open_temp_repository().await;
        let repository = Arc::new(repository);
        let store = Arc::new(MemoryDocumentStore::new());
        let remote = Arc::new(RemoteBackup::new(store.clone(), Some("u1".to_string())));
        let manager = SyncManager::new(repository.clone(), remote.clone());
        Harness {
            _dir: dir,
            repository,
            store,
            remote,
            manager,
        }
    }

    fn article(id: &str, updated: i64) -> Article {
        Article::new_unresolved(
            id.to_string(),
            &format!("https://example.com/{}", id),
            Some(&format!("Article {}", id)),
            updated,
        )
    }

    async fn seed_local(h: &Harness, count: usize, updated: i64) {
        for i in 0..count {
            h.repository
                .upsert_article(article(&format!("a{:05}", i), updated))
                .await
                .unwrap();
        }
    }

    fn remote_article(h: &Harness, id: &str) -> Option<Article> {
        h.store
            .fields(&format!("users/u1/articles/{}", id))
            .map(|fields| serde_json::from_value(fields).unwrap())
    }

    #[test]
    fn chunk_size_grows_only_for_large_first_syncs() {
        assert_eq!(chunk_size_for(true, 1001), 200);
        assert_eq!(chunk_size_for(true, 1000), 50);
        assert_eq!(chunk_size_for(false, 5000), 50);
    }

    #[tokio::test]
    async fn unauthenticated_sync_reports_error_without_writes() {
        let h = harness().await;
        seed_local(&h, 2, 10).await;
        h.remote.sign_out();

        let status = h.manager.sync_local_changes().await;
        assert!(status.is_error());
        let observer = h.manager.observer();
        assert_eq!(observer.sync_status(), status);
        assert!(observer.last_error().unwrap().contains("Not authenticated"));
        assert!(!observer.is_syncing());
        assert_eq!(h.store.commit_count(), 0);

        assert!(h.manager.perform_full_sync().await.is_error());
    }

    #[tokio::test]
    async fn first_sync_with_local_only_backs_everything_up() {
        let h = harness().await;
        seed_local(&h, 3, 10).await;
        h.repository.add_tag("a00000", "rust").await.unwrap();

        let status = h.manager.perform_full_sync().await;
        assert_eq!(status, SyncStatus::Success("Synced 3 articles".into()));
        assert_eq!(h.remote.get_remote_article_count().await.unwrap(), 3);
        assert!(!h.remote.is_first_sync().await.unwrap());
        assert_eq!(
            h.remote.restore_article_tags("a00000").await.unwrap(),
            vec![Tag::new("a00000", "rust")]
        );
        assert!(h.manager.observer().last_sync_time().is_some());
    }

    #[tokio::test]
    async fn second_push_without_changes_is_up_to_date() {
        let h = harness().await;
        seed_local(&h, 3, 10).await;

        h.manager.sync_local_changes().await;
        let written = h.store.written_documents();

        let status = h.manager.sync_local_changes().await;
        assert_eq!(status, SyncStatus::Success("Up to date".into()));
        // Only the marker may be rewritten; no article documents.
        assert_eq!(h.store.written_documents(), written);
    }

    #[tokio::test]
    async fn empty_first_sync_still_records_marker() {
        let h = harness().await;
        let status = h.manager.sync_local_changes().await;
        assert_eq!(status, SyncStatus::Success("Up to date".into()));
        assert!(!h.remote.is_first_sync().await.unwrap());

        let h = harness().await;
        let status = h.manager.perform_full_sync().await;
        assert_eq!(status, SyncStatus::Success("Up to date".into()));
        assert!(!h.remote.is_first_sync().await.unwrap());
    }

    #[tokio::test]
    async fn push_processes_ceil_n_over_c_chunks() {
        let h = harness().await;
        seed_local(&h, 120, 10).await;

        let status = h.manager.sync_local_changes().await;
        assert_eq!(status, SyncStatus::Success("Synced 120 articles".into()));
        // Three article chunks, then the marker.
        assert_eq!(h.store.commit_sizes(), vec![50, 50, 20, 1]);
        assert_eq!(h.remote.get_remote_article_count().await.unwrap(), 120);
    }

    #[tokio::test]
    async fn large_first_sync_uses_bulk_chunks() {
        let h = harness().await;
        seed_local(&h, 1001, 10).await;

        h.manager.sync_local_changes().await;
        let sizes = h.store.commit_sizes();
        assert_eq!(&sizes[..6], &[200, 200, 200, 200, 200, 1]);
        assert_eq!(h.remote.get_remote_article_count().await.unwrap(), 1001);
    }

    #[tokio::test]
    async fn failed_chunk_does_not_stop_later_chunks() {
        let h = harness().await;
        seed_local(&h, 120, 10).await;
        // Attempts: 0 = first chunk, 1 = second chunk, 2 = third chunk.
        h.store.fail_commit(1);

        let status = h.manager.sync_local_changes().await;
        assert_eq!(status, SyncStatus::Success("70 synced, 50 failed".into()));
        assert_eq!(h.remote.get_remote_article_count().await.unwrap(), 70);
        // Marker is not advanced so the failed chunk is retried.
        assert!(h.remote.is_first_sync().await.unwrap());

        let status = h.manager.sync_local_changes().await;
        assert_eq!(status, SyncStatus::Success("Synced 120 articles".into()));
        assert_eq!(h.remote.get_remote_article_count().await.unwrap(), 120);
    }

    #[tokio::test]
    async fn all_chunks_failing_is_an_error() {
        let h = harness().await;
        seed_local(&h, 2, 10).await;
        h.store.fail_commit(0);

        let status = h.manager.sync_local_changes().await;
        assert_eq!(status, SyncStatus::Error("0 synced, 2 failed".into()));
        assert_eq!(h.manager.observer().last_error().as_deref(), Some("0 synced, 2 failed"));
    }

    #[tokio::test]
    async fn first_sync_with_remote_only_restores_articles_and_tags() {
        let h = harness().await;
        let remote_articles: Vec<_> = (0..5).map(|i| article(&format!("r{}", i), 100 + i)).collect();
        h.remote
            .backup_articles_paginated(&remote_articles, &|_, _| {})
            .await
            .unwrap();
        for a in &remote_articles {
            h.remote
                .backup_article_tags(&a.item_id, &[Tag::new(a.item_id.clone(), "imported")])
                .await
                .unwrap();
        }

        let status = h.manager.perform_full_sync().await;
        assert_eq!(status, SyncStatus::Success("Restored 5 articles".into()));

        let local = h.repository.get_articles(ArticleFilter::Active).await.unwrap();
        assert_eq!(local.len(), 5);
        for a in &remote_articles {
            assert_eq!(h.repository.get_article(&a.item_id).await.unwrap().as_ref(), Some(a));
            assert_eq!(
                h.repository.get_article_tags(&a.item_id).await.unwrap(),
                vec![Tag::new(a.item_id.clone(), "imported")]
            );
        }
        assert!(h.manager.observer().last_sync_time().is_some());
        assert!(!h.remote.is_first_sync().await.unwrap());
    }

    #[tokio::test]
    async fn restore_applies_pulled_articles_in_chunks_of_fifty() {
        let h = harness().await;
        let remote_articles: Vec<_> = (0..120).map(|i| article(&format!("r{:03}", i), 100 + i)).collect();
        h.remote
            .backup_articles_paginated(&remote_articles, &|_, _| {})
            .await
            .unwrap();

        let status = h.manager.perform_full_sync().await;
        assert_eq!(status, SyncStatus::Success("Restored 120 articles".into()));
        assert_eq!(h.repository.count_all_articles().await.unwrap(), 120);

        // One pull report for the single restore page, then one per applied chunk.
        assert_eq!(
            h.manager.state.progress_history(),
            vec![(120, 120), (50, 120), (100, 120), (120, 120)]
        );
        assert!(h.manager.observer().progress().is_none());
    }

    #[tokio::test]
    async fn steady_state_pushes_only_modified_article() {
        let h = harness().await;
        seed_local(&h, 3, 10).await;
        h.manager.perform_full_sync().await;
        // Make sure the edit lands strictly after the recorded sync time.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        h.repository.set_favorite("a00001", true).await.unwrap();
        let last_sync = h.remote.get_last_sync_timestamp().await.unwrap();
        assert_eq!(h.repository.count_articles_modified_since(last_sync).await.unwrap(), 1);

        let before = h.store.commit_sizes().len();
        let status = h.manager.sync_local_changes().await;
        assert_eq!(status, SyncStatus::Success("Synced 1 articles".into()));
        assert_eq!(h.store.commit_sizes()[before], 1);

        let local = h.repository.get_article("a00001").await.unwrap().unwrap();
        assert_eq!(remote_article(&h, "a00001"), Some(local));
    }

    #[tokio::test]
    async fn newer_remote_overwrites_local_and_replaces_tags() {
        let h = harness().await;
        h.repository.upsert_article(article("a1", 100)).await.unwrap();
        h.repository
            .insert_article_tags(vec![Tag::new("a1", "local-only")])
            .await
            .unwrap();

        let mut newer = article("a1", 200);
        newer.title = "Remote title".into();
        h.remote.backup_articles_paginated(&[newer.clone()], &|_, _| {}).await.unwrap();
        h.remote.backup_article_tags("a1", &[Tag::new("a1", "remote")]).await.unwrap();

        let change = h.manager.handle_remote_article_change(newer.clone()).await.unwrap();
        assert_eq!(change, RemoteChange::Accepted);
        assert_eq!(h.repository.get_article("a1").await.unwrap(), Some(newer));
        assert_eq!(h.repository.get_article_tags("a1").await.unwrap(), vec![Tag::new("a1", "remote")]);
    }

    #[tokio::test]
    async fn more_complete_local_wins_tie_and_is_pushed_back() {
        let h = harness().await;
        h.remote.update_last_sync_timestamp(50).await.unwrap();

        let mut local = article("a1", 100);
        local.text = Some("full body".into());
        local.favorite = true;
        h.repository.upsert_article(local.clone()).await.unwrap();

        let mut remote = article("a1", 100);
        remote.word_count = 2;
        h.remote.backup_articles_paginated(&[remote], &|_, _| {}).await.unwrap();

        let status = h.manager.perform_full_sync().await;
        assert!(matches!(status, SyncStatus::Success(ref m) if m.contains("1 kept local")), "{:?}", status);
        assert_eq!(h.repository.get_article("a1").await.unwrap(), Some(local.clone()));
        assert_eq!(remote_article(&h, "a1"), Some(local));
    }

    #[tokio::test]
    async fn bidirectional_sync_merges_both_sides() {
        let h = harness().await;
        seed_local(&h, 2, 10).await;
        h.remote
            .backup_articles_paginated(&[article("remote-only", 20)], &|_, _| {})
            .await
            .unwrap();

        let status = h.manager.perform_full_sync().await;
        assert!(matches!(status, SyncStatus::Success(_)), "{:?}", status);

        assert!(h.repository.get_article("remote-only").await.unwrap().is_some());
        assert_eq!(h.remote.get_remote_article_count().await.unwrap(), 3);
        assert_eq!(h.repository.count_all_articles().await.unwrap(), 3);
    }
}
