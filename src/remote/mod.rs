//! Access to the per-user cloud document store.
//!
//! [`DocumentStore`] is the raw transport (atomic batch commits, paged
//! listing, point reads). [`RemoteBackup`] layers the article backup and
//! restore protocol on top of it and is the only remote dependency of the
//! sync manager.

mod backup;
mod http;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use backup::{RemoteBackup, MAX_BATCH_WRITES};
pub use http::HttpDocumentStore;

/// A stored document: its id (last path segment) and JSON fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Write {
    Set { path: String, fields: Value },
    Delete { path: String },
}

impl Write {
    pub fn path(&self) -> &str {
        match self {
            Write::Set { path, .. } | Write::Delete { path } => path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Applies every write or none of them.
    async fn commit(&self, writes: Vec<Write>) -> Result<()>;

    /// Lists the direct children of `collection` in id order.
    async fn list(&self, collection: &str, page_size: usize, page_token: Option<String>) -> Result<DocumentPage>;

    async fn get(&self, path: &str) -> Result<Option<Document>>;

    async fn count(&self, collection: &str) -> Result<u64>;
}
