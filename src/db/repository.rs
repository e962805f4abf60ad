use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    now_ms, Article, ArticleAuthor, ArticleFilter, ArticleImage, ArticleVideo, Attachments,
    DomainMetadata, ReadingMetrics, ResolvedStage, Tag,
};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "a.item_id, a.title, a.given_title, a.resolved_url, a.given_url, \
     a.excerpt, a.text, a.word_count, a.time_to_read, a.listen_duration, a.favorite, \
     a.time_favorited, a.time_read, a.archived_at, a.deleted_at, a.time_added, \
     a.time_updated, a.resolved";

const EXCERPT_CHARS: usize = 200;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Counts and pages used by sync

    pub async fn count_all_articles(&self) -> Result<u64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM articles WHERE deleted_at IS NULL",
                    [],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count as u64)
    }

    /// Counts tombstoned rows too, so deletions propagate.
    pub async fn count_articles_modified_since(&self, since: i64) -> Result<u64> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM articles WHERE time_updated > ?1",
                    params![since],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count as u64)
    }

    pub async fn get_all_articles_paginated(&self, limit: usize, offset: usize) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {} FROM articles a WHERE a.deleted_at IS NULL ORDER BY a.item_id LIMIT ?1 OFFSET ?2",
            ARTICLE_COLUMNS
        );
        self.query_articles(sql, vec![limit as i64, offset as i64]).await
    }

    pub async fn get_articles_modified_since_paginated(
        &self,
        since: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {} FROM articles a WHERE a.time_updated > ?1 ORDER BY a.item_id LIMIT ?2 OFFSET ?3",
            ARTICLE_COLUMNS
        );
        self.query_articles(sql, vec![since, limit as i64, offset as i64])
            .await
    }

    // Article operations

    pub async fn get_article(&self, item_id: &str) -> Result<Option<Article>> {
        let item_id = item_id.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {} FROM articles a WHERE a.item_id = ?1", ARTICLE_COLUMNS);
                let article = conn
                    .query_row(&sql, params![item_id], article_from_row)
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Writes the article exactly as given, including its `time_updated`.
    pub async fn upsert_article(&self, article: Article) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                write_article(&tx, &article)?;
                refresh_search_index(&tx, &article.item_id)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Inserts a newly imported article. Returns false if the id already exists.
    pub async fn insert_new_article(&self, article: Article) -> Result<bool> {
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let exists: bool = tx
                    .query_row(
                        "SELECT 1 FROM articles WHERE item_id = ?1",
                        params![article.item_id],
                        |_| Ok(true),
                    )
                    .optional()?
                    .unwrap_or(false);
                if exists {
                    return Ok(false);
                }
                write_article(&tx, &article)?;
                refresh_search_index(&tx, &article.item_id)?;
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(inserted)
    }

    pub async fn get_articles(&self, filter: ArticleFilter) -> Result<Vec<Article>> {
        let condition = match filter {
            ArticleFilter::Active => "a.deleted_at IS NULL AND a.archived_at IS NULL",
            ArticleFilter::Archived => "a.deleted_at IS NULL AND a.archived_at IS NOT NULL",
            ArticleFilter::Favorites => "a.deleted_at IS NULL AND a.favorite = 1",
        };
        let sql = format!(
            "SELECT {} FROM articles a WHERE {} ORDER BY a.time_added DESC, a.item_id",
            ARTICLE_COLUMNS, condition
        );
        self.query_articles(sql, Vec::new()).await
    }

    pub async fn search_articles(&self, query: &str, limit: usize) -> Result<Vec<Article>> {
        let fts_query = fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }
        let articles = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"SELECT {} FROM articles_fts
                       JOIN articles a ON a.item_id = articles_fts.item_id
                       WHERE articles_fts MATCH ?1 AND a.deleted_at IS NULL
                       ORDER BY articles_fts.rank
                       LIMIT ?2"#,
                    ARTICLE_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(params![fts_query, limit as i64], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    // User actions. Each bumps time_updated so the change is picked up by sync.

    pub async fn set_favorite(&self, item_id: &str, favorite: bool) -> Result<()> {
        let now = now_ms();
        self.update_article(
            item_id,
            "favorite = ?2, time_favorited = CASE WHEN ?2 THEN ?3 ELSE NULL END",
            (favorite, now),
        )
        .await
    }

    pub async fn mark_read(&self, item_id: &str, read: bool) -> Result<()> {
        let now = now_ms();
        self.update_article(
            item_id,
            "time_read = CASE WHEN ?2 THEN ?3 ELSE NULL END",
            (read, now),
        )
        .await
    }

    pub async fn archive(&self, item_id: &str, archived: bool) -> Result<()> {
        let now = now_ms();
        self.update_article(
            item_id,
            "archived_at = CASE WHEN ?2 THEN ?3 ELSE NULL END",
            (archived, now),
        )
        .await
    }

    pub async fn soft_delete(&self, item_id: &str) -> Result<()> {
        let now = now_ms();
        self.update_article(item_id, "deleted_at = ?3", (true, now)).await
    }

    async fn update_article(
        &self,
        item_id: &str,
        assignments: &'static str,
        (flag, now): (bool, i64),
    ) -> Result<()> {
        let id = item_id.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "UPDATE articles SET {}, time_updated = MAX(?3, time_updated + 1) WHERE item_id = ?1",
                    assignments
                );
                Ok(conn.execute(&sql, params![id, flag, now])?)
            })
            .await?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("article {}", item_id)));
        }
        Ok(())
    }

    // Tags

    pub async fn get_article_tags(&self, item_id: &str) -> Result<Vec<Tag>> {
        let item_id = item_id.to_string();
        let tags = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT item_id, tag FROM article_tags WHERE item_id = ?1 ORDER BY tag")?;
                let tags = stmt
                    .query_map(params![item_id], |row| {
                        Ok(Tag {
                            item_id: row.get(0)?,
                            tag: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    /// Sync-side tag insert; leaves the parent article untouched.
    pub async fn insert_article_tags(&self, tags: Vec<Tag>) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt =
                        tx.prepare("INSERT OR IGNORE INTO article_tags (item_id, tag) VALUES (?1, ?2)")?;
                    for tag in &tags {
                        stmt.execute(params![tag.item_id, tag.tag])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Sync-side tag delete; leaves the parent article untouched.
    pub async fn delete_article_tag(&self, item_id: &str, tag: &str) -> Result<()> {
        let item_id = item_id.to_string();
        let tag = tag.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM article_tags WHERE item_id = ?1 AND tag = ?2",
                    params![item_id, tag],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn add_tag(&self, item_id: &str, tag: &str) -> Result<()> {
        self.change_tag(item_id, tag, "INSERT OR IGNORE INTO article_tags (item_id, tag) VALUES (?1, ?2)")
            .await
    }

    pub async fn remove_tag(&self, item_id: &str, tag: &str) -> Result<()> {
        self.change_tag(item_id, tag, "DELETE FROM article_tags WHERE item_id = ?1 AND tag = ?2")
            .await
    }

    async fn change_tag(&self, item_id: &str, tag: &str, sql: &'static str) -> Result<()> {
        let id = item_id.to_string();
        let tag = tag.trim().to_string();
        let now = now_ms();
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let bumped = tx.execute(
                    "UPDATE articles SET time_updated = MAX(?2, time_updated + 1) WHERE item_id = ?1",
                    params![id, now],
                )?;
                if bumped > 0 {
                    tx.execute(sql, params![id, tag])?;
                }
                tx.commit()?;
                Ok(bumped)
            })
            .await?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("article {}", item_id)));
        }
        Ok(())
    }

    // Extraction

    /// Articles never run through extraction, keyed after `after_id`.
    pub async fn get_articles_without_text(&self, limit: usize, after_id: Option<String>) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {} FROM articles a WHERE a.text IS NULL AND a.deleted_at IS NULL \
             AND a.item_id > ?1 ORDER BY a.item_id LIMIT ?2",
            ARTICLE_COLUMNS
        );
        let after = after_id.unwrap_or_default();
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(params![after, limit as i64], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    /// Stores extraction output. An empty string records a failed attempt.
    pub async fn save_extracted_text(&self, item_id: &str, text: String) -> Result<()> {
        let id = item_id.to_string();
        let now = now_ms();
        let metrics = ReadingMetrics::from_text(&text);
        let stage = if text.trim().is_empty() {
            ResolvedStage::Unresolved
        } else {
            ResolvedStage::MetricsComputed
        };
        let excerpt = make_excerpt(&text);
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    r#"UPDATE articles SET
                           text = ?2,
                           word_count = ?3,
                           time_to_read = ?4,
                           listen_duration = ?5,
                           excerpt = COALESCE(excerpt, ?6),
                           resolved = MAX(resolved, ?7),
                           time_updated = MAX(?8, time_updated + 1)
                       WHERE item_id = ?1"#,
                    params![
                        id,
                        text,
                        metrics.word_count,
                        metrics.time_to_read,
                        metrics.listen_duration,
                        excerpt,
                        stage.as_u8(),
                        now,
                    ],
                )?;
                refresh_search_index(&tx, &id)?;
                tx.commit()?;
                Ok(changed)
            })
            .await?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("article {}", item_id)));
        }
        Ok(())
    }

    // Attachments

    /// Replaces every attachment record for the article.
    pub async fn insert_attachments(&self, item_id: &str, attachments: Attachments) -> Result<()> {
        let id = item_id.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for table in ["article_images", "article_videos", "article_authors", "domain_metadata"] {
                    tx.execute(&format!("DELETE FROM {} WHERE item_id = ?1", table), params![id])?;
                }
                for image in &attachments.images {
                    tx.execute(
                        "INSERT INTO article_images (item_id, image_id, src, caption) VALUES (?1, ?2, ?3, ?4)",
                        params![id, image.image_id, image.src, image.caption],
                    )?;
                }
                for video in &attachments.videos {
                    tx.execute(
                        "INSERT INTO article_videos (item_id, video_id, src) VALUES (?1, ?2, ?3)",
                        params![id, video.video_id, video.src],
                    )?;
                }
                for author in &attachments.authors {
                    tx.execute(
                        "INSERT INTO article_authors (item_id, author_id, name, url) VALUES (?1, ?2, ?3, ?4)",
                        params![id, author.author_id, author.name, author.url],
                    )?;
                }
                if let Some(domain) = &attachments.domain {
                    tx.execute(
                        "INSERT INTO domain_metadata (item_id, name, logo) VALUES (?1, ?2, ?3)",
                        params![id, domain.name, domain.logo],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_attachments(&self, item_id: &str) -> Result<Attachments> {
        let id = item_id.to_string();
        let attachments = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT item_id, image_id, src, caption FROM article_images WHERE item_id = ?1 ORDER BY image_id",
                )?;
                let images = stmt
                    .query_map(params![id], |row| {
                        Ok(ArticleImage {
                            item_id: row.get(0)?,
                            image_id: row.get(1)?,
                            src: row.get(2)?,
                            caption: row.get(3)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let mut stmt = conn.prepare(
                    "SELECT item_id, video_id, src FROM article_videos WHERE item_id = ?1 ORDER BY video_id",
                )?;
                let videos = stmt
                    .query_map(params![id], |row| {
                        Ok(ArticleVideo {
                            item_id: row.get(0)?,
                            video_id: row.get(1)?,
                            src: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let mut stmt = conn.prepare(
                    "SELECT item_id, author_id, name, url FROM article_authors WHERE item_id = ?1 ORDER BY author_id",
                )?;
                let authors = stmt
                    .query_map(params![id], |row| {
                        Ok(ArticleAuthor {
                            item_id: row.get(0)?,
                            author_id: row.get(1)?,
                            name: row.get(2)?,
                            url: row.get(3)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let domain = conn
                    .query_row(
                        "SELECT item_id, name, logo FROM domain_metadata WHERE item_id = ?1",
                        params![id],
                        |row| {
                            Ok(DomainMetadata {
                                item_id: row.get(0)?,
                                name: row.get(1)?,
                                logo: row.get(2)?,
                            })
                        },
                    )
                    .optional()?;

                Ok(Attachments {
                    images,
                    videos,
                    authors,
                    domain,
                })
            })
            .await?;
        Ok(attachments)
    }

    async fn query_articles(&self, sql: String, args: Vec<i64>) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let articles = stmt
                    .query_map(rusqlite::params_from_iter(args), article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }
}

fn write_article(conn: &SqliteConnection, article: &Article) -> rusqlite::Result<()> {
    conn.execute(
        r#"INSERT INTO articles (item_id, title, given_title, resolved_url, given_url, excerpt, text,
                                 word_count, time_to_read, listen_duration, favorite, time_favorited,
                                 time_read, archived_at, deleted_at, time_added, time_updated, resolved)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
           ON CONFLICT(item_id) DO UPDATE SET
               title = excluded.title,
               given_title = excluded.given_title,
               resolved_url = excluded.resolved_url,
               given_url = excluded.given_url,
               excerpt = excluded.excerpt,
               text = excluded.text,
               word_count = excluded.word_count,
               time_to_read = excluded.time_to_read,
               listen_duration = excluded.listen_duration,
               favorite = excluded.favorite,
               time_favorited = excluded.time_favorited,
               time_read = excluded.time_read,
               archived_at = excluded.archived_at,
               deleted_at = excluded.deleted_at,
               time_added = excluded.time_added,
               time_updated = excluded.time_updated,
               resolved = excluded.resolved"#,
        params![
            article.item_id,
            article.title,
            article.given_title,
            article.resolved_url,
            article.given_url,
            article.excerpt,
            article.text,
            article.word_count,
            article.time_to_read,
            article.listen_duration,
            article.favorite,
            article.time_favorited,
            article.time_read,
            article.archived_at,
            article.deleted_at,
            article.time_added,
            article.time_updated,
            article.resolved.as_u8(),
        ],
    )?;
    Ok(())
}

fn refresh_search_index(conn: &SqliteConnection, item_id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM articles_fts WHERE item_id = ?1", params![item_id])?;
    conn.execute(
        r#"INSERT INTO articles_fts (item_id, title, excerpt, text)
           SELECT item_id, title, COALESCE(excerpt, ''), COALESCE(text, '')
           FROM articles WHERE item_id = ?1"#,
        params![item_id],
    )?;
    Ok(())
}

/// Quotes each term so user input is never parsed as FTS5 syntax.
fn fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn make_excerpt(text: &str) -> Option<String> {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.is_empty() {
        return None;
    }
    let mut excerpt: String = flattened.chars().take(EXCERPT_CHARS).collect();
    if flattened.chars().count() > EXCERPT_CHARS {
        excerpt.push('…');
    }
    Some(excerpt)
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        item_id: row.get(0)?,
        title: row.get(1)?,
        given_title: row.get(2)?,
        resolved_url: row.get(3)?,
        given_url: row.get(4)?,
        excerpt: row.get(5)?,
        text: row.get(6)?,
        word_count: row.get(7)?,
        time_to_read: row.get(8)?,
        listen_duration: row.get(9)?,
        favorite: row.get::<_, i64>(10)? != 0,
        time_favorited: row.get(11)?,
        time_read: row.get(12)?,
        archived_at: row.get(13)?,
        deleted_at: row.get(14)?,
        time_added: row.get(15)?,
        time_updated: row.get(16)?,
        resolved: ResolvedStage::try_from(row.get::<_, u8>(17)?).unwrap_or_default(),
    })
}
