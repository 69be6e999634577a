use tracing::{debug, info};

/// What the pipeline needs from whoever displays progress.
///
/// Implementations are called from download workers concurrently, so they must
/// be cheap and thread-safe.
pub trait ProgressSink: Send + Sync {
    fn set_label(&self, label: &str);
    fn set_total_bytes(&self, total: u64);
    fn done_task(&self);
    fn add_downloaded_bytes(&self, bytes: u64);

    /// Coarse run-wide percentage. Optional for sinks that only care about
    /// bytes.
    fn set_percent(&self, _percent: u8) {}

    /// 0-100 progress within the current stage.
    fn set_sub_percent(&self, _percent: u8) {}
}

/// Sink that drops everything.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn set_label(&self, _label: &str) {}
    fn set_total_bytes(&self, _total: u64) {}
    fn done_task(&self) {}
    fn add_downloaded_bytes(&self, _bytes: u64) {}
}

/// Sink that reports stage changes through `tracing`.
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn set_label(&self, label: &str) {
        info!("{}", label);
    }

    fn set_total_bytes(&self, total: u64) {
        if total > 0 {
            debug!("Expecting {} bytes", total);
        }
    }

    fn done_task(&self) {}

    fn add_downloaded_bytes(&self, _bytes: u64) {}

    fn set_percent(&self, percent: u8) {
        debug!("Install progress {}%", percent);
    }
}
