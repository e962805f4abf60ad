use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Article, Attachments, Tag};

use super::{DocumentStore, Write};

/// Hard ceiling on writes in one atomic commit.
pub const MAX_BATCH_WRITES: usize = 500;

const RESTORE_PAGE_SIZE: usize = 200;
const TAG_PAGE_SIZE: usize = 500;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncMarker {
    #[serde(default)]
    has_synced: bool,
    #[serde(default)]
    last_sync_timestamp: i64,
}

/// Article backup/restore protocol over a [`DocumentStore`].
///
/// Layout under `users/{uid}`: `articles/{itemId}` with `tags`, `images`,
/// `videos`, `authors` subcollections and a `domain/metadata` document, plus
/// the sync marker at `meta/sync`.
pub struct RemoteBackup {
    store: Arc<dyn DocumentStore>,
    user: RwLock<Option<String>>,
}

impl RemoteBackup {
    pub fn new(store: Arc<dyn DocumentStore>, user: Option<String>) -> Self {
        Self {
            store,
            user: RwLock::new(user),
        }
    }

    pub fn sign_in(&self, user: String) {
        if let Ok(mut current) = self.user.write() {
            *current = Some(user);
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut current) = self.user.write() {
            *current = None;
        }
    }

    pub fn current_user(&self) -> Option<String> {
        self.user.read().ok().and_then(|user| user.clone())
    }

    fn user_root(&self) -> Result<String> {
        self.current_user()
            .filter(|user| !user.is_empty())
            .map(|user| format!("users/{}", segment(&user)))
            .ok_or(AppError::NotAuthenticated)
    }

    fn articles_collection(&self) -> Result<String> {
        Ok(format!("{}/articles", self.user_root()?))
    }

    fn article_path(&self, item_id: &str) -> Result<String> {
        Ok(format!("{}/{}", self.articles_collection()?, segment(item_id)))
    }

    fn marker_path(&self) -> Result<String> {
        Ok(format!("{}/meta/sync", self.user_root()?))
    }

    /// Writes `articles` in atomic batches of at most [`MAX_BATCH_WRITES`],
    /// reporting `(written, total)` after each batch. Stops at the first
    /// failed batch; batches before it stay committed.
    pub async fn backup_articles_paginated(
        &self,
        articles: &[Article],
        on_progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<usize> {
        let collection = self.articles_collection()?;
        let total = articles.len();
        let mut written = 0;

        for batch in articles.chunks(MAX_BATCH_WRITES) {
            let writes = batch
                .iter()
                .map(|article| {
                    Ok(Write::Set {
                        path: format!("{}/{}", collection, segment(&article.item_id)),
                        fields: serde_json::to_value(article)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            self.store
                .commit(writes)
                .await
                .map_err(|e| match e {
                    AppError::NotAuthenticated => AppError::NotAuthenticated,
                    other => AppError::RemoteBatch {
                        size: batch.len(),
                        reason: other.to_string(),
                    },
                })?;

            written += batch.len();
            on_progress(written, total);
        }

        Ok(written)
    }

    /// Pulls every remote article page by page. Documents that fail to
    /// decode are skipped.
    pub async fn restore_all_articles_paginated(
        &self,
        on_progress: &(dyn Fn(usize, usize) + Send + Sync),
    ) -> Result<Vec<Article>> {
        let collection = self.articles_collection()?;
        let total = self.store.count(&collection).await? as usize;
        let mut articles = Vec::with_capacity(total);
        let mut page_token = None;

        loop {
            let page = self
                .store
                .list(&collection, RESTORE_PAGE_SIZE, page_token.take())
                .await?;
            let fetched = page.documents.len();

            for document in page.documents {
                match serde_json::from_value::<Article>(document.fields) {
                    Ok(article) => articles.push(article),
                    Err(e) => tracing::warn!("Skipping undecodable remote article {}: {}", document.id, e),
                }
            }
            on_progress(articles.len(), total.max(articles.len()));

            match page.next_page_token {
                Some(token) if fetched > 0 => page_token = Some(token),
                _ => break,
            }
        }

        Ok(articles)
    }

    /// Makes the remote tag subcollection equal to `tags` in one commit.
    pub async fn backup_article_tags(&self, item_id: &str, tags: &[Tag]) -> Result<()> {
        let tags_collection = format!("{}/tags", self.article_path(item_id)?);
        let wanted: BTreeSet<String> = tags.iter().map(|t| segment(&t.tag)).collect();

        let mut writes = Vec::new();
        for existing in self.list_all(&tags_collection, TAG_PAGE_SIZE).await? {
            if !wanted.contains(&existing.0) {
                writes.push(Write::Delete {
                    path: format!("{}/{}", tags_collection, existing.0),
                });
            }
        }
        for tag in tags {
            writes.push(Write::Set {
                path: format!("{}/{}", tags_collection, segment(&tag.tag)),
                fields: serde_json::to_value(tag)?,
            });
        }

        for batch in writes.chunks(MAX_BATCH_WRITES) {
            self.store.commit(batch.to_vec()).await?;
        }
        Ok(())
    }

    pub async fn restore_article_tags(&self, item_id: &str) -> Result<Vec<Tag>> {
        let tags_collection = format!("{}/tags", self.article_path(item_id)?);
        let mut tags = Vec::new();
        for (id, fields) in self.list_all(&tags_collection, TAG_PAGE_SIZE).await? {
            match serde_json::from_value::<Tag>(fields) {
                Ok(tag) if tag.item_id == item_id => tags.push(tag),
                Ok(tag) => tracing::warn!("Tag {} filed under {} belongs to {}", id, item_id, tag.item_id),
                Err(e) => tracing::warn!("Skipping undecodable tag {} of {}: {}", id, item_id, e),
            }
        }
        Ok(tags)
    }

    /// Backup-only: attachments are never read back during sync.
    pub async fn backup_article_attachments(&self, item_id: &str, attachments: &Attachments) -> Result<()> {
        if attachments.is_empty() {
            return Ok(());
        }
        let article_path = self.article_path(item_id)?;
        let mut writes = Vec::new();
        for image in &attachments.images {
            writes.push(Write::Set {
                path: format!("{}/images/{}", article_path, image.image_id),
                fields: serde_json::to_value(image)?,
            });
        }
        for video in &attachments.videos {
            writes.push(Write::Set {
                path: format!("{}/videos/{}", article_path, video.video_id),
                fields: serde_json::to_value(video)?,
            });
        }
        for author in &attachments.authors {
            writes.push(Write::Set {
                path: format!("{}/authors/{}", article_path, author.author_id),
                fields: serde_json::to_value(author)?,
            });
        }
        if let Some(domain) = &attachments.domain {
            writes.push(Write::Set {
                path: format!("{}/domain/metadata", article_path),
                fields: serde_json::to_value(domain)?,
            });
        }
        for batch in writes.chunks(MAX_BATCH_WRITES) {
            self.store.commit(batch.to_vec()).await?;
        }
        Ok(())
    }

    pub async fn get_remote_article_count(&self) -> Result<u64> {
        let collection = self.articles_collection()?;
        self.store.count(&collection).await
    }

    pub async fn is_first_sync(&self) -> Result<bool> {
        Ok(!self.read_marker().await?.has_synced)
    }

    /// Epoch millis of the last completed sync, 0 if never synced.
    pub async fn get_last_sync_timestamp(&self) -> Result<i64> {
        Ok(self.read_marker().await?.last_sync_timestamp)
    }

    pub async fn update_last_sync_timestamp(&self, timestamp: i64) -> Result<()> {
        let marker = SyncMarker {
            has_synced: true,
            last_sync_timestamp: timestamp,
        };
        self.store
            .commit(vec![Write::Set {
                path: self.marker_path()?,
                fields: serde_json::to_value(&marker)?,
            }])
            .await
    }

    async fn read_marker(&self) -> Result<SyncMarker> {
        let path = self.marker_path()?;
        match self.store.get(&path).await? {
            Some(document) => Ok(serde_json::from_value(document.fields)?),
            None => Ok(SyncMarker::default()),
        }
    }

    async fn list_all(&self, collection: &str, page_size: usize) -> Result<Vec<(String, Value)>> {
        let mut documents = Vec::new();
        let mut page_token = None;
        loop {
            let page = self.store.list(collection, page_size, page_token.take()).await?;
            let fetched = page.documents.len();
            documents.extend(page.documents.into_iter().map(|d| (d.id, d.fields)));
            match page.next_page_token {
                Some(token) if fetched > 0 => page_token = Some(token),
                _ => break,
            }
        }
        Ok(documents)
    }
}

/// Escapes a document id so it occupies exactly one path segment.
fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}
