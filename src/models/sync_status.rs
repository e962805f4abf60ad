use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success(String),
    Error(String),
}

impl SyncStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, SyncStatus::Error(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            SyncStatus::Success(msg) | SyncStatus::Error(msg) => Some(msg),
            SyncStatus::Idle | SyncStatus::Syncing => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Success(msg) => write!(f, "success: {}", msg),
            SyncStatus::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}
