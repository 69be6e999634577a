use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;

use crate::core::config::InstallerConfig;
use crate::core::install::InstallSession;

/// Everything a fetch unit needs at run time. Cheap to clone.
#[derive(Clone)]
pub struct FetchContext {
    pub client: Client,
    pub session: Option<Arc<InstallSession>>,
    pub failed_downloads_dir: PathBuf,
    pub concurrency: usize,
    pub max_retries: u32,
}

impl FetchContext {
    pub fn new(client: Client, config: &InstallerConfig) -> Self {
        Self {
            client,
            session: None,
            failed_downloads_dir: config.failed_downloads_dir(),
            concurrency: config.concurrency(),
            max_retries: config.max_retries,
        }
    }

    pub fn with_session(mut self, session: Arc<InstallSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_cancelled())
    }

    pub fn cancel_session(&self) {
        if let Some(session) = &self.session {
            session.cancel();
        }
    }

    pub(crate) fn report_bytes(&self, bytes: u64) {
        if let Some(session) = &self.session {
            session.add_downloaded_bytes(bytes);
        }
    }

    pub(crate) fn report_done(&self, fetched: bool) {
        if let Some(session) = &self.session {
            session.done_task(fetched);
        }
    }
}
