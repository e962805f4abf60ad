use tokio::sync::watch;

use crate::models::SyncStatus;

/// Observable sync state. Only the sync manager holds this writer half;
/// everyone else reads through [`SyncObserver`].
pub(super) struct SyncState {
    is_syncing: watch::Sender<bool>,
    status: watch::Sender<SyncStatus>,
    last_sync_time: watch::Sender<Option<i64>>,
    last_error: watch::Sender<Option<String>>,
    progress: watch::Sender<Option<(usize, usize)>>,
    #[cfg(test)]
    progress_history: std::sync::Mutex<Vec<(usize, usize)>>,
}

impl SyncState {
    pub(super) fn new() -> Self {
        Self {
            is_syncing: watch::Sender::new(false),
            status: watch::Sender::new(SyncStatus::Idle),
            last_sync_time: watch::Sender::new(None),
            last_error: watch::Sender::new(None),
            progress: watch::Sender::new(None),
            #[cfg(test)]
            progress_history: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub(super) fn observer(&self) -> SyncObserver {
        SyncObserver {
            is_syncing: self.is_syncing.subscribe(),
            status: self.status.subscribe(),
            last_sync_time: self.last_sync_time.subscribe(),
            last_error: self.last_error.subscribe(),
            progress: self.progress.subscribe(),
        }
    }

    /// Marks a run as started. The run ends when the returned guard is
    /// finished or dropped; a dropped guard reports the run as cancelled.
    pub(super) fn begin(&self) -> SyncRun<'_> {
        self.is_syncing.send_replace(true);
        self.status.send_replace(SyncStatus::Syncing);
        self.progress.send_replace(None);
        SyncRun { state: self, finished: false }
    }

    pub(super) fn report_progress(&self, current: usize, total: usize) {
        #[cfg(test)]
        self.progress_history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((current, total));
        self.progress.send_replace(Some((current, total)));
    }

    /// Every progress report since the manager was created.
    #[cfg(test)]
    pub(super) fn progress_history(&self) -> Vec<(usize, usize)> {
        self.progress_history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(super) fn set_last_sync_time(&self, timestamp: i64) {
        self.last_sync_time.send_replace(Some(timestamp));
    }

    fn finish(&self, status: SyncStatus) {
        match &status {
            SyncStatus::Error(message) => {
                self.last_error.send_replace(Some(message.clone()));
            }
            SyncStatus::Success(_) => {
                self.last_error.send_replace(None);
            }
            SyncStatus::Idle | SyncStatus::Syncing => {}
        }
        self.status.send_replace(status);
        self.progress.send_replace(None);
        self.is_syncing.send_replace(false);
    }
}

/// One in-flight run. Dropping it unfinished, e.g. when the task running
/// the sync is aborted, resets the state to an error.
pub(super) struct SyncRun<'a> {
    state: &'a SyncState,
    finished: bool,
}

impl SyncRun<'_> {
    pub(super) fn finish(mut self, status: SyncStatus) {
        self.finished = true;
        self.state.finish(status);
    }
}

impl Drop for SyncRun<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Sync run ended before completing");
            self.state.finish(SyncStatus::Error(CANCELLED.to_string()));
        }
    }
}

pub(super) const CANCELLED: &str = "Sync cancelled";

/// Read-only view of the sync state for the CLI and other observers.
#[derive(Clone)]
pub struct SyncObserver {
    is_syncing: watch::Receiver<bool>,
    status: watch::Receiver<SyncStatus>,
    last_sync_time: watch::Receiver<Option<i64>>,
    last_error: watch::Receiver<Option<String>>,
    progress: watch::Receiver<Option<(usize, usize)>>,
}

impl SyncObserver {
    pub fn is_syncing(&self) -> bool {
        *self.is_syncing.borrow()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn last_sync_time(&self) -> Option<i64> {
        *self.last_sync_time.borrow()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub fn progress(&self) -> Option<(usize, usize)> {
        *self.progress.borrow()
    }

    /// Waits for the next status change and returns the new status.
    /// Returns `None` once the manager has been dropped.
    pub async fn changed(&mut self) -> Option<SyncStatus> {
        self.status.changed().await.ok()?;
        Some(self.status.borrow_and_update().clone())
    }
}
