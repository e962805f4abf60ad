use std::io::Cursor;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use super::Extractor;

/// Anything shorter is treated as navigation chrome rather than an article.
const MIN_TEXT_CHARS: usize = 200;
/// Wide enough that html2text never hard-wraps a paragraph.
const WRAP_WIDTH: usize = 4096;

/// Mozilla Readability port: scores DOM nodes and keeps the main content.
pub struct ReadabilityExtractor;

impl Extractor for ReadabilityExtractor {
    fn name(&self) -> &'static str {
        "readability"
    }

    fn try_extract(&self, html: &str, url: &Url) -> Option<String> {
        let mut cursor = Cursor::new(html.as_bytes());
        match readability::extractor::extract(&mut cursor, url) {
            Ok(product) => accept(clean_text(&product.text)),
            Err(e) => {
                tracing::debug!("Readability failed for {}: {}", url, e);
                None
            }
        }
    }
}

/// Takes the largest `<article>` element, or failing that every `<p>`.
pub struct ArticleBodyExtractor;

impl Extractor for ArticleBodyExtractor {
    fn name(&self) -> &'static str {
        "article-body"
    }

    fn try_extract(&self, html: &str, _url: &Url) -> Option<String> {
        let fragment = article_re()
            .captures_iter(html)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str())
            .max_by_key(|body| body.len())
            .map(str::to_string)
            .or_else(|| {
                let paragraphs: Vec<&str> = paragraph_re()
                    .find_iter(html)
                    .map(|m| m.as_str())
                    .collect();
                (!paragraphs.is_empty()).then(|| paragraphs.join("\n"))
            })?;

        let text = html_to_text(&fragment)?;
        accept(clean_text(&text))
    }
}

/// Whole page through html2text.
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn try_extract(&self, html: &str, _url: &Url) -> Option<String> {
        let text = html_to_text(html)?;
        accept(clean_text(&text))
    }
}

fn article_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<article[^>]*>(.*?)</article>").expect("article pattern is valid"))
}

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<p[\s>].*?</p>").expect("paragraph pattern is valid"))
}

fn html_to_text(html: &str) -> Option<String> {
    match html2text::from_read(html.as_bytes(), WRAP_WIDTH) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            None
        }
    }
}

/// Trims every line and drops blank ones.
fn clean_text(text: &str) -> String {
    text.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn accept(text: String) -> Option<String> {
    if text.chars().count() >= MIN_TEXT_CHARS {
        Some(text)
    } else {
        tracing::debug!("Extracted content too short ({} chars)", text.len());
        None
    }
}
