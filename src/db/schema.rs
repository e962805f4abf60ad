pub const SCHEMA: &str = r#"
-- articles table (archived_at / deleted_at are tombstones, rows are never removed)
CREATE TABLE IF NOT EXISTS articles (
    item_id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    given_title TEXT NOT NULL DEFAULT '',
    resolved_url TEXT NOT NULL DEFAULT '',
    given_url TEXT NOT NULL,
    excerpt TEXT,
    text TEXT,
    word_count INTEGER NOT NULL DEFAULT 0,
    time_to_read INTEGER NOT NULL DEFAULT 0,
    listen_duration INTEGER NOT NULL DEFAULT 0,
    favorite INTEGER NOT NULL DEFAULT 0,
    time_favorited INTEGER,
    time_read INTEGER,
    archived_at INTEGER,
    deleted_at INTEGER,
    time_added INTEGER NOT NULL,
    time_updated INTEGER NOT NULL,
    resolved INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_articles_time_updated ON articles(time_updated);
CREATE INDEX IF NOT EXISTS idx_articles_time_added ON articles(time_added DESC);
CREATE INDEX IF NOT EXISTS idx_articles_deleted_at ON articles(deleted_at);

-- article_tags table
CREATE TABLE IF NOT EXISTS article_tags (
    item_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (item_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_article_tags_tag ON article_tags(tag);

-- attachments
CREATE TABLE IF NOT EXISTS article_images (
    item_id TEXT NOT NULL,
    image_id INTEGER NOT NULL,
    src TEXT NOT NULL,
    caption TEXT,
    PRIMARY KEY (item_id, image_id)
);

CREATE TABLE IF NOT EXISTS article_videos (
    item_id TEXT NOT NULL,
    video_id INTEGER NOT NULL,
    src TEXT NOT NULL,
    PRIMARY KEY (item_id, video_id)
);

CREATE TABLE IF NOT EXISTS article_authors (
    item_id TEXT NOT NULL,
    author_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    url TEXT,
    PRIMARY KEY (item_id, author_id)
);

CREATE TABLE IF NOT EXISTS domain_metadata (
    item_id TEXT PRIMARY KEY NOT NULL,
    name TEXT,
    logo TEXT
);

-- full-text index, kept in step with articles by the repository
CREATE VIRTUAL TABLE IF NOT EXISTS articles_fts USING fts5(
    item_id UNINDEXED,
    title,
    excerpt,
    text
);
"#;
