mod article;
mod attachment;
mod sync_status;

pub use article::{now_ms, Article, ArticleFilter, ReadingMetrics, ResolvedStage, Tag};
pub use attachment::{ArticleAuthor, ArticleImage, ArticleVideo, Attachments, DomainMetadata};
pub use sync_status::SyncStatus;
