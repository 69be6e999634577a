use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use super::progress::ProgressSink;
use crate::core::error::{LauncherError, LauncherResult};

/// Shared, thread-safe state of a single install run.
///
/// Counters are touched by every download worker, so they are all atomics.
/// A session is created for one run and must not be reused.
pub struct InstallSession {
    pack: String,
    version: String,
    is_reinstall: bool,

    total_bytes: AtomicU64,
    downloaded_bytes: AtomicU64,
    total_downloads: AtomicUsize,
    done_downloads: AtomicUsize,
    percent: AtomicU8,
    cancelled: AtomicBool,

    // Run-wide network totals, never reset between stages.
    network_bytes: AtomicU64,
    network_fetches: AtomicUsize,

    sink: Arc<dyn ProgressSink>,
}

impl InstallSession {
    pub fn new(
        pack: impl Into<String>,
        version: impl Into<String>,
        is_reinstall: bool,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            pack: pack.into(),
            version: version.into(),
            is_reinstall,
            total_bytes: AtomicU64::new(0),
            downloaded_bytes: AtomicU64::new(0),
            total_downloads: AtomicUsize::new(0),
            done_downloads: AtomicUsize::new(0),
            percent: AtomicU8::new(0),
            cancelled: AtomicBool::new(false),
            network_bytes: AtomicU64::new(0),
            network_fetches: AtomicUsize::new(0),
            sink,
        }
    }

    pub fn is_reinstall(&self) -> bool {
        self.is_reinstall
    }

    // ── Cancellation ────────────────────────────────────

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            warn!("Install of {} {} cancelled", self.pack, self.version);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the run has been cancelled. Called before any
    /// step that would start new work or touch the filesystem.
    pub fn ensure_active(&self) -> LauncherResult<()> {
        if self.is_cancelled() {
            Err(LauncherError::Cancelled)
        } else {
            Ok(())
        }
    }

    // ── Progress ────────────────────────────────────────

    pub fn set_label(&self, label: &str) {
        self.sink.set_label(label);
    }

    /// Start a stage: byte and file counters restart from zero so the
    /// sub-progress reflects only this stage.
    pub fn enter_stage(&self, label: &str) {
        self.total_bytes.store(0, Ordering::SeqCst);
        self.downloaded_bytes.store(0, Ordering::SeqCst);
        self.total_downloads.store(0, Ordering::SeqCst);
        self.done_downloads.store(0, Ordering::SeqCst);
        self.sink.set_label(label);
        self.sink.set_sub_percent(0);
    }

    pub fn set_total_bytes(&self, total: u64) {
        self.total_bytes.store(total, Ordering::SeqCst);
        self.sink.set_total_bytes(total);
        self.sink.set_sub_percent(self.sub_progress());
    }

    pub fn add_total_downloads(&self, count: usize) {
        self.total_downloads.fetch_add(count, Ordering::SeqCst);
    }

    pub fn add_downloaded_bytes(&self, bytes: u64) {
        self.downloaded_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.network_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.sink.add_downloaded_bytes(bytes);
        self.sink.set_sub_percent(self.sub_progress());
    }

    /// One fetch unit finished (downloaded or already valid).
    pub fn done_task(&self, fetched: bool) {
        self.done_downloads.fetch_add(1, Ordering::SeqCst);
        if fetched {
            self.network_fetches.fetch_add(1, Ordering::SeqCst);
        }
        self.sink.done_task();
        self.sink.set_sub_percent(self.sub_progress());
    }

    /// 0-100 progress of the current stage, by bytes when a total is known
    /// and by finished units otherwise.
    pub fn sub_progress(&self) -> u8 {
        let total = self.total_bytes.load(Ordering::SeqCst);
        if total > 0 {
            let done = self.downloaded_bytes.load(Ordering::SeqCst).min(total);
            return ((done * 100) / total) as u8;
        }
        let total = self.total_downloads.load(Ordering::SeqCst);
        if total > 0 {
            let done = self.done_downloads.load(Ordering::SeqCst).min(total);
            return ((done * 100) / total) as u8;
        }
        0
    }

    pub fn advance_percent(&self, weight: u8) -> u8 {
        let previous = self
            .percent
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| {
                Some(p.saturating_add(weight).min(100))
            })
            .unwrap_or(100);
        let now = previous.saturating_add(weight).min(100);
        self.sink.set_percent(now);
        now
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes.load(Ordering::SeqCst)
    }

    /// Bytes received from the network over the whole run.
    pub fn network_bytes(&self) -> u64 {
        self.network_bytes.load(Ordering::SeqCst)
    }

    /// Fetch units that actually went to the network over the whole run.
    pub fn network_fetches(&self) -> usize {
        self.network_fetches.load(Ordering::SeqCst)
    }
}
