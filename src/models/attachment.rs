use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleImage {
    pub item_id: String,
    pub image_id: i64,
    pub src: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleVideo {
    pub item_id: String,
    pub video_id: i64,
    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleAuthor {
    pub item_id: String,
    pub author_id: i64,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainMetadata {
    pub item_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

/// Records hanging off a single article. Backed up with the article but
/// never merged back from the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attachments {
    pub images: Vec<ArticleImage>,
    pub videos: Vec<ArticleVideo>,
    pub authors: Vec<ArticleAuthor>,
    pub domain: Option<DomainMetadata>,
}

impl Attachments {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
            && self.videos.is_empty()
            && self.authors.is_empty()
            && self.domain.is_none()
    }
}
