//! Getting URLs into the library: single shared links and Pocket exports.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;
use uuid::Uuid;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::extract::{decode_entities, parse_attributes};
use crate::models::{now_ms, Article, Tag};

/// Stable item id for a URL, so the same link saved on two devices merges.
pub fn item_id_for_url(url: &Url) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_str().as_bytes()).to_string()
}

/// Accepts either a bare URL or shared text containing one.
pub fn parse_shared_url(shared: &str) -> Result<Url> {
    let trimmed = shared.trim();
    let candidate = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => {
            let found = url_in_text_re()
                .find(trimmed)
                .ok_or_else(|| AppError::Import(format!("No URL found in \"{}\"", trimmed)))?;
            Url::parse(found.as_str().trim_end_matches(['.', ',', ')', ']']))?
        }
    };
    match candidate.scheme() {
        "http" | "https" => Ok(candidate),
        other => Err(AppError::Import(format!("Unsupported URL scheme: {}", other))),
    }
}

/// Saves a shared link as an unresolved article. Returns the item id and
/// whether it was new.
pub async fn import_shared_url(repository: &Repository, shared: &str, title: Option<&str>) -> Result<(String, bool)> {
    let url = parse_shared_url(shared)?;
    let item_id = item_id_for_url(&url);
    let article = Article::new_unresolved(item_id.clone(), url.as_str(), title, now_ms());
    let inserted = repository.insert_new_article(article).await?;
    if inserted {
        tracing::info!("Saved {}", url);
    } else {
        tracing::debug!("{} is already in the library", url);
    }
    Ok((item_id, inserted))
}

/// One entry of a Pocket export.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedArticle {
    pub article: Article,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    pub skipped: usize,
}

/// Parses a Pocket HTML export. Entries under the "Read Archive" heading come
/// back archived.
pub fn parse_pocket_export(html: &str) -> Result<Vec<ImportedArticle>> {
    let now = now_ms();
    let mut archived = false;
    let mut seen_heading = false;
    let mut entries = Vec::new();

    for cap in export_re().captures_iter(html) {
        if let Some(heading) = cap.name("heading") {
            seen_heading = true;
            archived = heading.as_str().to_ascii_lowercase().contains("archive");
            continue;
        }

        let attrs = parse_attributes(cap.name("attrs").map_or("", |m| m.as_str()));
        let Some(href) = attrs.get("href") else {
            continue;
        };
        let url = match parse_shared_url(href) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping export entry {}: {}", href, e);
                continue;
            }
        };

        let item_id = item_id_for_url(&url);
        let title = cap
            .name("title")
            .map(|m| decode_entities(strip_tags(m.as_str()).trim()));
        let added = attrs
            .get("time_added")
            .and_then(|t| t.trim().parse::<i64>().ok())
            .map(|secs| secs * 1000)
            .unwrap_or(now);

        let mut article = Article::new_unresolved(item_id.clone(), url.as_str(), title.as_deref(), added);
        article.time_updated = now.max(added);
        if archived {
            article.archived_at = Some(now);
        }

        let tags = attrs
            .get("tags")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(|t| Tag::new(item_id.clone(), t))
                    .collect()
            })
            .unwrap_or_default();

        entries.push(ImportedArticle { article, tags });
    }

    if entries.is_empty() && !seen_heading {
        return Err(AppError::Import("Not a Pocket export: no entries found".to_string()));
    }
    Ok(entries)
}

/// Inserts every export entry not already in the library.
pub async fn import_pocket_export(repository: &Repository, html: &str) -> Result<ImportReport> {
    let entries = parse_pocket_export(html)?;
    let mut report = ImportReport::default();

    for entry in entries {
        if repository.insert_new_article(entry.article).await? {
            if !entry.tags.is_empty() {
                repository.insert_article_tags(entry.tags).await?;
            }
            report.added += 1;
        } else {
            report.skipped += 1;
        }
    }

    tracing::info!("Imported {} articles ({} already present)", report.added, report.skipped);
    Ok(report)
}

fn strip_tags(fragment: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"))
        .replace_all(fragment, "")
        .into_owned()
}

fn export_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<h1[^>]*>(?P<heading>.*?)</h1>|<a\s(?P<attrs>[^>]*)>(?P<title>.*?)</a>")
            .expect("export pattern is valid")
    })
}

fn url_in_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("url pattern is valid"))
}
