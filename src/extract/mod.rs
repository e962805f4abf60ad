//! Turning saved URLs into readable text.

mod fetcher;
mod metadata;
mod pipeline;
mod strategies;

use url::Url;

pub use fetcher::HtmlFetcher;
pub use metadata::extract_attachments;
pub(crate) use metadata::{decode_entities, parse_attributes};
pub use pipeline::{ExtractionPipeline, ExtractionReport};
pub use strategies::{ArticleBodyExtractor, PlainTextExtractor, ReadabilityExtractor};

/// One way of pulling readable text out of an HTML page.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` when this strategy cannot produce usable text.
    fn try_extract(&self, html: &str, url: &Url) -> Option<String>;
}

/// Strategies in the order they are tried.
pub fn default_extractors() -> Vec<Box<dyn Extractor>> {
    vec![
        Box::new(ReadabilityExtractor),
        Box::new(ArticleBodyExtractor),
        Box::new(PlainTextExtractor),
    ]
}

/// Runs the chain and returns the first non-empty result.
pub fn extract_text(extractors: &[Box<dyn Extractor>], html: &str, url: &Url) -> Option<String> {
    extractors.iter().find_map(|extractor| {
        let text = extractor
            .try_extract(html, url)
            .filter(|text| !text.trim().is_empty())?;
        tracing::debug!("{} extracted {} chars from {}", extractor.name(), text.len(), url);
        Some(text)
    })
}
