use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current time as Unix epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// How far an article has progressed through import and extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ResolvedStage {
    #[default]
    Unresolved,
    SyncedNoText,
    TextAdded,
    MetricsComputed,
    Resolved,
}

impl ResolvedStage {
    pub fn as_u8(self) -> u8 {
        match self {
            ResolvedStage::Unresolved => 0,
            ResolvedStage::SyncedNoText => 1,
            ResolvedStage::TextAdded => 2,
            ResolvedStage::MetricsComputed => 3,
            ResolvedStage::Resolved => 10,
        }
    }
}

impl From<ResolvedStage> for u8 {
    fn from(stage: ResolvedStage) -> Self {
        stage.as_u8()
    }
}

impl TryFrom<u8> for ResolvedStage {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(ResolvedStage::Unresolved),
            1 => Ok(ResolvedStage::SyncedNoText),
            2 => Ok(ResolvedStage::TextAdded),
            3 => Ok(ResolvedStage::MetricsComputed),
            10 => Ok(ResolvedStage::Resolved),
            other => Err(format!("unknown resolved stage {}", other)),
        }
    }
}

/// A saved article. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub item_id: String,
    pub title: String,
    #[serde(default)]
    pub given_title: String,
    #[serde(default)]
    pub resolved_url: String,
    pub given_url: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    /// Readable body text. `None` until extraction has been attempted;
    /// an empty string means extraction ran and found nothing.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub word_count: i64,
    /// Estimated reading time in minutes.
    #[serde(default)]
    pub time_to_read: i64,
    /// Estimated listening time in seconds.
    #[serde(default)]
    pub listen_duration: i64,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub time_favorited: Option<i64>,
    #[serde(default)]
    pub time_read: Option<i64>,
    #[serde(default)]
    pub archived_at: Option<i64>,
    #[serde(default)]
    pub deleted_at: Option<i64>,
    pub time_added: i64,
    pub time_updated: i64,
    #[serde(default)]
    pub resolved: ResolvedStage,
}

impl Article {
    /// A freshly imported article with no extracted content yet.
    pub fn new_unresolved(item_id: String, url: &str, title: Option<&str>, now: i64) -> Self {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| url.to_string());
        Self {
            item_id,
            title: title.clone(),
            given_title: title,
            resolved_url: url.to_string(),
            given_url: url.to_string(),
            excerpt: None,
            text: None,
            word_count: 0,
            time_to_read: 0,
            listen_duration: 0,
            favorite: false,
            time_favorited: None,
            time_read: None,
            archived_at: None,
            deleted_at: None,
            time_added: now,
            time_updated: now,
            resolved: ResolvedStage::Unresolved,
        }
    }

    /// Resolved URL if known, otherwise the URL the article was saved with.
    pub fn url(&self) -> &str {
        if self.resolved_url.is_empty() {
            &self.given_url
        } else {
            &self.resolved_url
        }
    }

    pub fn is_read(&self) -> bool {
        self.time_read.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none() && self.archived_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub item_id: String,
    pub tag: String,
}

impl Tag {
    pub fn new(item_id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            tag: tag.into(),
        }
    }
}

const READING_WORDS_PER_MINUTE: i64 = 220;
const LISTENING_WORDS_PER_MINUTE: i64 = 155;

/// Word count and duration estimates derived from body text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadingMetrics {
    pub word_count: i64,
    pub time_to_read: i64,
    pub listen_duration: i64,
}

impl ReadingMetrics {
    pub fn from_text(text: &str) -> Self {
        let word_count = text.split_whitespace().count() as i64;
        Self {
            word_count,
            time_to_read: (word_count + READING_WORDS_PER_MINUTE - 1) / READING_WORDS_PER_MINUTE,
            listen_duration: word_count * 60 / LISTENING_WORDS_PER_MINUTE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArticleFilter {
    #[default]
    Active,
    Archived,
    Favorites,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_stage_serializes_as_number() {
        let json = serde_json::to_string(&ResolvedStage::Resolved).unwrap();
        assert_eq!(json, "10");
        let stage: ResolvedStage = serde_json::from_str("2").unwrap();
        assert_eq!(stage, ResolvedStage::TextAdded);
        assert!(serde_json::from_str::<ResolvedStage>("7").is_err());
    }

    #[test]
    fn article_uses_camel_case_fields_and_defaults() {
        let json = r#"{
            "itemId": "a1",
            "title": "Hello",
            "givenUrl": "https://example.com/a",
            "timeAdded": 5,
            "timeUpdated": 9
        }"#;
        let article: Article = serde_json::from_str(json).unwrap();
        assert_eq!(article.item_id, "a1");
        assert_eq!(article.text, None);
        assert_eq!(article.resolved, ResolvedStage::Unresolved);
        assert_eq!(article.url(), "https://example.com/a");

        let value = serde_json::to_value(&article).unwrap();
        assert_eq!(value["timeUpdated"], 9);
        assert_eq!(value["resolved"], 0);
    }

    #[test]
    fn reading_metrics_round_minutes_up() {
        let text = vec!["word"; 221].join(" ");
        let metrics = ReadingMetrics::from_text(&text);
        assert_eq!(metrics.word_count, 221);
        assert_eq!(metrics.time_to_read, 2);
        assert_eq!(metrics.listen_duration, 221 * 60 / 155);
        assert_eq!(ReadingMetrics::from_text("   "), ReadingMetrics::default());
    }

    #[test]
    fn new_unresolved_falls_back_to_url_for_title() {
        let article = Article::new_unresolved("id".into(), "https://x.dev/p", Some("  "), 1);
        assert_eq!(article.title, "https://x.dev/p");
        assert!(article.is_active());
        assert!(!article.is_read());
    }
}
