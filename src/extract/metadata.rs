use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::models::{ArticleAuthor, ArticleImage, ArticleVideo, Attachments, DomainMetadata};

const MAX_IMAGES: usize = 10;

/// Pulls authors, images, videos and site metadata out of a page.
pub fn extract_attachments(item_id: &str, html: &str, page_url: &Url) -> Attachments {
    let tags = TagIndex::new(html);

    Attachments {
        images: find_images(item_id, &tags, page_url),
        videos: find_videos(item_id, &tags, page_url),
        authors: find_authors(item_id, &tags),
        domain: find_domain(item_id, &tags, page_url),
    }
}

/// Opening tags of interest, keyed by lowercase tag name.
struct TagIndex {
    tags: Vec<(String, HashMap<String, String>)>,
}

impl TagIndex {
    fn new(html: &str) -> Self {
        let tags = tag_re()
            .captures_iter(html)
            .filter_map(|cap| {
                let name = cap.get(1)?.as_str().to_ascii_lowercase();
                let attrs = cap.get(2).map(|m| parse_attributes(m.as_str())).unwrap_or_default();
                Some((name, attrs))
            })
            .collect();
        Self { tags }
    }

    fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HashMap<String, String>> + 'a {
        self.tags
            .iter()
            .filter(move |(tag, _)| tag == name)
            .map(|(_, attrs)| attrs)
    }

    /// Content of the first `<meta>` whose `property` or `name` matches.
    fn meta(&self, key: &str) -> Option<&str> {
        self.named("meta")
            .find(|attrs| {
                attrs.get("property").or_else(|| attrs.get("name"))
                    .is_some_and(|k| k.eq_ignore_ascii_case(key))
            })
            .and_then(|attrs| attrs.get("content"))
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }
}

fn find_authors(item_id: &str, tags: &TagIndex) -> Vec<ArticleAuthor> {
    let Some(raw) = tags.meta("author").or_else(|| tags.meta("article:author")) else {
        return Vec::new();
    };

    // article:author is frequently a profile URL rather than a name
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return vec![ArticleAuthor {
            item_id: item_id.to_string(),
            author_id: 1,
            name: raw.to_string(),
            url: Some(raw.to_string()),
        }];
    }

    raw.split([',', '&'])
        .flat_map(|part| part.split(" and "))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .enumerate()
        .map(|(i, name)| ArticleAuthor {
            item_id: item_id.to_string(),
            author_id: i as i64 + 1,
            name: name.to_string(),
            url: None,
        })
        .collect()
}

fn find_images(item_id: &str, tags: &TagIndex, page_url: &Url) -> Vec<ArticleImage> {
    let mut seen: Vec<String> = Vec::new();
    let mut images = Vec::new();

    let lead = tags.meta("og:image").map(|src| (src.to_string(), None));
    let inline = tags.named("img").filter_map(|attrs| {
        let src = attrs.get("src").or_else(|| attrs.get("data-src"))?;
        let caption = attrs.get("alt").map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
        Some((src.clone(), caption))
    });

    for (src, caption) in lead.into_iter().chain(inline) {
        if src.starts_with("data:") {
            continue;
        }
        let Some(resolved) = resolve(page_url, &src) else {
            continue;
        };
        if seen.contains(&resolved) {
            continue;
        }
        seen.push(resolved.clone());
        images.push(ArticleImage {
            item_id: item_id.to_string(),
            image_id: images.len() as i64 + 1,
            src: resolved,
            caption,
        });
        if images.len() == MAX_IMAGES {
            break;
        }
    }
    images
}

fn find_videos(item_id: &str, tags: &TagIndex, page_url: &Url) -> Vec<ArticleVideo> {
    let embeds = tags
        .named("iframe")
        .filter_map(|attrs| attrs.get("src"))
        .filter(|src| is_video_host(src));
    let native = tags
        .named("video")
        .chain(tags.named("source"))
        .filter_map(|attrs| attrs.get("src"));

    let mut videos: Vec<ArticleVideo> = Vec::new();
    for src in embeds.chain(native) {
        let Some(resolved) = resolve(page_url, src) else {
            continue;
        };
        if videos.iter().any(|v| v.src == resolved) {
            continue;
        }
        videos.push(ArticleVideo {
            item_id: item_id.to_string(),
            video_id: videos.len() as i64 + 1,
            src: resolved,
        });
    }
    videos
}

fn find_domain(item_id: &str, tags: &TagIndex, page_url: &Url) -> Option<DomainMetadata> {
    let name = tags
        .meta("og:site_name")
        .map(str::to_string)
        .or_else(|| page_url.host_str().map(|h| h.trim_start_matches("www.").to_string()));

    let icon = tags
        .named("link")
        .find(|attrs| {
            attrs.get("rel").is_some_and(|rel| {
                rel.split_whitespace()
                    .any(|r| r.eq_ignore_ascii_case("icon") || r.eq_ignore_ascii_case("apple-touch-icon"))
            })
        })
        .and_then(|attrs| attrs.get("href"))
        .and_then(|href| resolve(page_url, href));
    let logo = icon.or_else(|| resolve(page_url, "/favicon.ico"));

    if name.is_none() && logo.is_none() {
        return None;
    }
    Some(DomainMetadata {
        item_id: item_id.to_string(),
        name,
        logo,
    })
}

fn is_video_host(src: &str) -> bool {
    ["youtube.com/", "youtube-nocookie.com/", "youtu.be/", "player.vimeo.com/"]
        .iter()
        .any(|host| src.contains(host))
}

/// Resolves a potentially relative URL against the page URL.
fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| u.to_string())
}

pub(crate) fn parse_attributes(raw: &str) -> HashMap<String, String> {
    attr_re()
        .captures_iter(raw)
        .filter_map(|cap| {
            let key = cap.get(1)?.as_str().to_ascii_lowercase();
            let value = cap.get(2).or_else(|| cap.get(3)).or_else(|| cap.get(4))?.as_str();
            Some((key, decode_entities(value)))
        })
        .collect()
}

pub(crate) fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(meta|img|iframe|video|source|link)\b([^>]*)>").expect("tag pattern is valid")
    })
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("attribute pattern is valid")
    })
}
