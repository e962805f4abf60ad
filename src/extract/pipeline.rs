use std::ops::AddAssign;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use url::Url;

use super::fetcher::is_pdf_url;
use super::{default_extractors, extract_attachments, extract_text, Extractor, HtmlFetcher};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::Article;

/// Totals for one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub processed: usize,
    pub extracted: usize,
    /// Articles stored with empty text (no usable content, PDF, error status).
    pub empty: usize,
    /// Left untouched so the next run retries them.
    pub failed: usize,
}

impl AddAssign for ExtractionReport {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.extracted += other.extracted;
        self.empty += other.empty;
        self.failed += other.failed;
    }
}

enum Outcome {
    Extracted,
    Empty,
    Failed,
}

impl ExtractionReport {
    fn record(&mut self, outcome: Outcome) {
        self.processed += 1;
        match outcome {
            Outcome::Extracted => self.extracted += 1,
            Outcome::Empty => self.empty += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

struct Worker {
    repository: Arc<Repository>,
    fetcher: HtmlFetcher,
    extractors: Vec<Box<dyn Extractor>>,
}

pub struct ExtractionPipeline {
    worker: Arc<Worker>,
    workers: usize,
    page_size: usize,
}

impl ExtractionPipeline {
    pub fn new(repository: Arc<Repository>, fetcher: HtmlFetcher, workers: usize, page_size: usize) -> Self {
        Self::with_extractors(repository, fetcher, default_extractors(), workers, page_size)
    }

    pub fn with_extractors(
        repository: Arc<Repository>,
        fetcher: HtmlFetcher,
        extractors: Vec<Box<dyn Extractor>>,
        workers: usize,
        page_size: usize,
    ) -> Self {
        Self {
            worker: Arc::new(Worker {
                repository,
                fetcher,
                extractors,
            }),
            workers: workers.max(1),
            page_size: page_size.max(1),
        }
    }

    /// Extracts text for every article that has none yet.
    pub async fn run(&self) -> Result<ExtractionReport> {
        let (tx, rx) = mpsc::channel::<Vec<Article>>(self.workers);
        let rx = Arc::new(Mutex::new(rx));

        let repository = Arc::clone(&self.worker.repository);
        let page_size = self.page_size;
        let producer = tokio::spawn(async move {
            let mut after: Option<String> = None;
            loop {
                let page = repository.get_articles_without_text(page_size, after.clone()).await?;
                let Some(last) = page.last() else {
                    break;
                };
                after = Some(last.item_id.clone());
                let is_last_page = page.len() < page_size;
                if tx.send(page).await.is_err() {
                    break;
                }
                if is_last_page {
                    break;
                }
            }
            Ok::<(), AppError>(())
        });

        let consumers: Vec<_> = (0..self.workers)
            .map(|id| {
                let rx = Arc::clone(&rx);
                let worker = Arc::clone(&self.worker);
                tokio::spawn(async move {
                    let mut report = ExtractionReport::default();
                    loop {
                        let batch = rx.lock().await.recv().await;
                        let Some(batch) = batch else {
                            break;
                        };
                        tracing::debug!("Worker {} took {} articles", id, batch.len());
                        for outcome in join_all(batch.iter().map(|a| worker.process(a))).await {
                            report.record(outcome);
                        }
                    }
                    report
                })
            })
            .collect();

        let mut report = ExtractionReport::default();
        for consumer in join_all(consumers).await {
            report += consumer.map_err(|e| anyhow::anyhow!("Extraction worker panicked: {}", e))?;
        }
        producer
            .await
            .map_err(|e| anyhow::anyhow!("Extraction producer panicked: {}", e))??;

        tracing::info!(
            "Extraction finished: {} processed, {} extracted, {} empty, {} failed",
            report.processed,
            report.extracted,
            report.empty,
            report.failed
        );
        Ok(report)
    }
}

impl Worker {
    async fn process(self: &Arc<Self>, article: &Article) -> Outcome {
        match self.extract(article).await {
            Ok(true) => Outcome::Extracted,
            Ok(false) => Outcome::Empty,
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", article.url(), e);
                Outcome::Failed
            }
        }
    }

    /// Returns whether non-empty text was stored.
    async fn extract(self: &Arc<Self>, article: &Article) -> Result<bool> {
        let item_id = article.item_id.clone();
        let raw_url = article.url();

        let page_url = match Url::parse(raw_url) {
            Ok(url) if !is_pdf_url(raw_url) => url,
            _ => {
                self.repository.save_extracted_text(&item_id, String::new()).await?;
                return Ok(false);
            }
        };

        let Some(html) = self.fetcher.fetch_html(raw_url).await? else {
            self.repository.save_extracted_text(&item_id, String::new()).await?;
            return Ok(false);
        };

        let worker = Arc::clone(self);
        let id = item_id.clone();
        let (text, attachments) = tokio::task::spawn_blocking(move || {
            let text = extract_text(&worker.extractors, &html, &page_url);
            let attachments = extract_attachments(&id, &html, &page_url);
            (text, attachments)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Parsing task failed: {}", e))?;

        if !attachments.is_empty() {
            self.repository.insert_attachments(&item_id, attachments).await?;
        }

        let text = text.unwrap_or_default();
        let extracted = !text.is_empty();
        self.repository.save_extracted_text(&item_id, text).await?;
        Ok(extracted)
    }
}
