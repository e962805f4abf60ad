use crate::models::Article;

/// How much useful data an article version carries. Only used to break
/// `time_updated` ties.
pub fn calculate_article_completeness(article: &Article) -> u32 {
    let mut score = 0;
    if article.text.as_deref().is_some_and(|t| !t.trim().is_empty()) {
        score += 10;
    }
    if article.favorite {
        score += 5;
    }
    if article.time_read.is_some() {
        score += 5;
    }
    if article.excerpt.as_deref().is_some_and(|e| !e.trim().is_empty()) {
        score += 3;
    }
    if article.word_count > 0 {
        score += 2;
    }
    score
}

/// Remote wins when strictly newer, or on an exact timestamp tie when it is
/// at least as complete as the local copy.
pub fn should_accept_remote_change(local: &Article, remote: &Article) -> bool {
    if remote.time_updated != local.time_updated {
        return remote.time_updated > local.time_updated;
    }
    calculate_article_completeness(remote) >= calculate_article_completeness(local)
}
