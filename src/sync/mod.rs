mod conflict;
mod manager;
mod scheduler;
mod state;

pub use conflict::{calculate_article_completeness, should_accept_remote_change};
pub use manager::{chunk_size_for, PushOutcome, RemoteChange, SyncManager};
pub use state::SyncObserver;
