//! In-process [`DocumentStore`] for tests, with commit failure injection.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AppError, Result};

use super::{Document, DocumentPage, DocumentStore, Write};

#[derive(Default)]
struct Inner {
    documents: BTreeMap<String, Value>,
    commit_attempts: usize,
    failing_commits: HashSet<usize>,
    commit_sizes: Vec<usize>,
    list_calls: usize,
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `attempt`-th commit (0-based, counting every call) fail.
    pub fn fail_commit(&self, attempt: usize) {
        self.inner.lock().unwrap().failing_commits.insert(attempt);
    }

    pub fn insert_raw(&self, path: &str, fields: Value) {
        self.inner.lock().unwrap().documents.insert(path.to_string(), fields);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.inner.lock().unwrap().documents.contains_key(path)
    }

    pub fn fields(&self, path: &str) -> Option<Value> {
        self.inner.lock().unwrap().documents.get(path).cloned()
    }

    /// Sizes of the commits that succeeded, in order.
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.inner.lock().unwrap().commit_sizes.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.inner.lock().unwrap().commit_sizes.len()
    }

    pub fn written_documents(&self) -> usize {
        self.inner.lock().unwrap().commit_sizes.iter().sum()
    }

    pub fn list_calls(&self) -> usize {
        self.inner.lock().unwrap().list_calls
    }

    fn children<'a>(documents: &'a BTreeMap<String, Value>, collection: &'a str) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        let prefix = format!("{}/", collection);
        documents.iter().filter_map(move |(path, fields)| {
            let id = path.strip_prefix(prefix.as_str())?;
            if id.contains('/') {
                None
            } else {
                Some((id, fields))
            }
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn commit(&self, writes: Vec<Write>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let attempt = inner.commit_attempts;
        inner.commit_attempts += 1;
        if inner.failing_commits.contains(&attempt) {
            return Err(AppError::RemoteStore(format!("injected failure on commit {}", attempt)));
        }
        inner.commit_sizes.push(writes.len());
        for write in writes {
            match write {
                Write::Set { path, fields } => {
                    inner.documents.insert(path, fields);
                }
                Write::Delete { path } => {
                    inner.documents.remove(&path);
                }
            }
        }
        Ok(())
    }

    async fn list(&self, collection: &str, page_size: usize, page_token: Option<String>) -> Result<DocumentPage> {
        let mut inner = self.inner.lock().unwrap();
        inner.list_calls += 1;
        let after = page_token.unwrap_or_default();
        let mut remaining = Self::children(&inner.documents, collection)
            .filter(|(id, _)| after.is_empty() || *id > after.as_str());

        let documents: Vec<Document> = remaining
            .by_ref()
            .take(page_size)
            .map(|(id, fields)| Document {
                id: id.to_string(),
                fields: fields.clone(),
            })
            .collect();
        let has_more = remaining.next().is_some();
        let next_page_token = if has_more {
            documents.last().map(|d| d.id.clone())
        } else {
            None
        };
        Ok(DocumentPage {
            documents,
            next_page_token,
        })
    }

    async fn get(&self, path: &str) -> Result<Option<Document>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.documents.get(path).map(|fields| Document {
            id: path.rsplit('/').next().unwrap_or(path).to_string(),
            fields: fields.clone(),
        }))
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::children(&inner.documents, collection).count() as u64)
    }
}
