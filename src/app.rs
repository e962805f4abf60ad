use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::extract::{ExtractionPipeline, ExtractionReport, HtmlFetcher};
use crate::import::{import_pocket_export, import_shared_url, ImportReport};
use crate::models::{Article, ArticleFilter, Attachments, SyncStatus, Tag};
use crate::remote::{HttpDocumentStore, RemoteBackup};
use crate::sync::SyncManager;

/// Wires the library, remote backup and extraction together for one process.
pub struct App {
    config: Config,
    pub repository: Arc<Repository>,
    sync: Option<Arc<SyncManager>>,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);

        let sync = match &config.remote_url {
            Some(remote_url) => {
                let store = HttpDocumentStore::new(remote_url, config.remote_token.clone(), config.request_timeout())?;
                let remote = Arc::new(RemoteBackup::new(Arc::new(store), config.remote_user.clone()));
                Some(Arc::new(SyncManager::new(Arc::clone(&repository), remote)))
            }
            None => {
                tracing::debug!("No remote_url configured; sync disabled");
                None
            }
        };

        Ok(Self { config, repository, sync })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sync_manager(&self) -> Result<&Arc<SyncManager>> {
        self.sync
            .as_ref()
            .ok_or_else(|| AppError::Config("remote_url is not set; add it to the config file".to_string()))
    }

    pub async fn add_url(&self, url: &str, title: Option<&str>) -> Result<(String, bool)> {
        import_shared_url(&self.repository, url, title).await
    }

    pub async fn import_export(&self, path: &Path) -> Result<ImportReport> {
        let html = tokio::fs::read_to_string(path).await?;
        import_pocket_export(&self.repository, &html).await
    }

    pub async fn articles(&self, filter: ArticleFilter) -> Result<Vec<Article>> {
        self.repository.get_articles(filter).await
    }

    /// Article with its tags and attachments, or `NotFound`.
    pub async fn article_details(&self, item_id: &str) -> Result<(Article, Vec<Tag>, Attachments)> {
        let article = self
            .repository
            .get_article(item_id)
            .await?
            .filter(|a| a.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("article {}", item_id)))?;
        let tags = self.repository.get_article_tags(item_id).await?;
        let attachments = self.repository.get_attachments(item_id).await?;
        Ok((article, tags, attachments))
    }

    pub async fn extract(&self) -> Result<ExtractionReport> {
        let fetcher = HtmlFetcher::new(self.config.request_timeout())?;
        let pipeline = ExtractionPipeline::new(
            Arc::clone(&self.repository),
            fetcher,
            self.config.extraction_workers,
            self.config.extraction_page_size,
        );
        pipeline.run().await
    }

    pub async fn sync_local_changes(&self) -> Result<SyncStatus> {
        Ok(self.sync_manager()?.sync_local_changes().await)
    }

    pub async fn full_sync(&self) -> Result<SyncStatus> {
        Ok(self.sync_manager()?.perform_full_sync().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        Config {
            db_path: dir.path().join("library.db").to_string_lossy().to_string(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn sync_requires_a_remote() {
        let dir = TempDir::new().unwrap();
        let app = App::new(config_in(&dir)).await.unwrap();
        assert!(matches!(app.sync_local_changes().await, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn unauthenticated_remote_reports_an_error_status() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            remote_url: Some("http://127.0.0.1:1/v1".to_string()),
            ..config_in(&dir)
        };
        let app = App::new(config).await.unwrap();
        assert!(app.full_sync().await.unwrap().is_error());
    }

    #[tokio::test]
    async fn saved_urls_can_be_shown_until_deleted() {
        let dir = TempDir::new().unwrap();
        let app = App::new(config_in(&dir)).await.unwrap();

        let (id, _) = app.add_url("https://example.com/post", Some("Post")).await.unwrap();
        app.repository.add_tag(&id, "later").await.unwrap();
        let (article, tags, attachments) = app.article_details(&id).await.unwrap();
        assert_eq!(article.title, "Post");
        assert_eq!(tags, vec![Tag::new(id.clone(), "later")]);
        assert!(attachments.is_empty());

        app.repository.soft_delete(&id).await.unwrap();
        assert!(matches!(app.article_details(&id).await, Err(AppError::NotFound(_))));
    }
}
