use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use futures_util::StreamExt;
use reqwest::Response;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use super::context::FetchContext;
use super::extract::{extract_archive, ExtractRules};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http;
use crate::core::integrity::{digest_like, file_matches, fingerprint_file};

/// How a call to [`FetchUnit::download`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The file on disk was already good; only post-processing ran.
    AlreadyValid,
    /// The file was transferred and verified.
    Downloaded { bytes: u64 },
    /// Verification kept failing but the unit tolerates that.
    FailedIgnored,
}

/// One remote file with the metadata needed to check a local copy.
///
/// Two units are the same unit when they write to the same destination.
#[derive(Debug, Clone)]
pub struct FetchUnit {
    pub url: String,
    /// Tried in order when `url` cannot be reached.
    pub fallback_urls: Vec<String>,
    pub dest: PathBuf,
    pub copy_to: Option<PathBuf>,
    pub unzip_to: Option<PathBuf>,
    pub extract_rules: ExtractRules,
    pub delete_after_extract: bool,
    pub hash: Option<String>,
    pub fingerprint: Option<u64>,
    /// `None` means unknown: the server is asked with a HEAD request.
    pub size: Option<u64>,
    pub force: bool,
    pub ignore_failures: bool,
    pub executable: bool,
    remote_size: OnceLock<Option<u64>>,
}

impl PartialEq for FetchUnit {
    fn eq(&self, other: &Self) -> bool {
        self.dest == other.dest
    }
}

impl Eq for FetchUnit {}

impl Hash for FetchUnit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dest.hash(state);
    }
}

impl FetchUnit {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            fallback_urls: Vec::new(),
            dest: dest.into(),
            copy_to: None,
            unzip_to: None,
            extract_rules: ExtractRules::default(),
            delete_after_extract: false,
            hash: None,
            fingerprint: None,
            size: None,
            force: false,
            ignore_failures: false,
            executable: false,
            remote_size: OnceLock::new(),
        }
    }

    // ── Builder ─────────────────────────────────────────

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        let hash = hash.into();
        if !hash.trim().is_empty() {
            self.hash = Some(hash.trim().to_ascii_lowercase());
        }
        self
    }

    pub fn with_optional_hash(self, hash: Option<&str>) -> Self {
        match hash {
            Some(h) => self.with_hash(h),
            None => self,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: u64) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_optional_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_fallbacks(mut self, urls: Vec<String>) -> Self {
        self.fallback_urls = urls;
        self
    }

    pub fn copy_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.copy_to = Some(path.into());
        self
    }

    pub fn unzip_to(mut self, path: impl Into<PathBuf>, rules: ExtractRules) -> Self {
        self.unzip_to = Some(path.into());
        self.extract_rules = rules;
        self
    }

    pub fn delete_after_extract(mut self) -> Self {
        self.delete_after_extract = true;
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn ignore_failures(mut self) -> Self {
        self.ignore_failures = true;
        self
    }

    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }

    pub fn file_name(&self) -> String {
        self.dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    // ── Checks ──────────────────────────────────────────

    /// Whether the destination has to be fetched. Cheap checks come first: a
    /// fingerprint, then a strong hash, and only without either the size the
    /// server reports.
    pub async fn needs_download(&self, ctx: &FetchContext) -> LauncherResult<bool> {
        if self.force {
            return Ok(true);
        }

        let Ok(meta) = tokio::fs::metadata(&self.dest).await else {
            return Ok(true);
        };
        if !meta.is_file() {
            return Ok(true);
        }

        if self.ignore_failures && meta.len() > 0 {
            return Ok(false);
        }

        if let Some(expected) = self.fingerprint {
            if fingerprint_file(&self.dest).await? == expected {
                return Ok(false);
            }
            if self.hash.is_none() {
                return Ok(true);
            }
        }

        if let Some(expected) = &self.hash {
            return Ok(!file_matches(&self.dest, expected).await?);
        }

        match self.remote_size(ctx).await {
            Some(size) => Ok(meta.len() != size),
            None => Ok(true),
        }
    }

    /// Expected size: the declared one, or whatever the server reports for a
    /// HEAD request. The server answer is remembered for the unit's lifetime.
    pub async fn remote_size(&self, ctx: &FetchContext) -> Option<u64> {
        if let Some(size) = self.size {
            return Some(size);
        }
        if let Some(cached) = self.remote_size.get() {
            return *cached;
        }

        let size = match ctx.client.head(&self.url).send().await {
            Ok(response) if response.status().is_success() => http::header_content_length(&response),
            Ok(response) => {
                debug!("HEAD {} returned {}", self.url, response.status());
                None
            }
            Err(e) => {
                debug!("HEAD {} failed: {}", self.url, e);
                None
            }
        };
        *self.remote_size.get_or_init(|| size)
    }

    // ── Transfer ────────────────────────────────────────

    /// Open the connection, trying mirrors when the primary host cannot be
    /// reached. Non-2xx answers become `DownloadFailed`.
    pub async fn execute(&self, ctx: &FetchContext) -> LauncherResult<Response> {
        let mut last_err = None;

        for url in std::iter::once(&self.url).chain(self.fallback_urls.iter()) {
            match ctx.client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => return Err(http::response_error(url, response).await),
                Err(e) if http::is_connectivity_error(&e) => {
                    warn!("Could not reach {}: {}", url, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(match last_err {
            Some(e) => e.into(),
            None => LauncherError::Other(format!("No URL to fetch {}", self.file_name())),
        })
    }

    /// Fetch the unit if needed, verify it, then run post-processing.
    /// Safe to call repeatedly: a good local copy is only post-processed.
    pub async fn download(&self, ctx: &FetchContext) -> LauncherResult<FetchOutcome> {
        if !self.needs_download(ctx).await? {
            self.run_post_processors().await?;
            ctx.report_done(false);
            return Ok(FetchOutcome::AlreadyValid);
        }

        if let Some(parent) = self.dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }

        let backup = self.backup_path();
        let had_backup = if self.dest.exists() {
            let _ = tokio::fs::remove_file(&backup).await;
            tokio::fs::rename(&self.dest, &backup)
                .await
                .map_err(|e| LauncherError::io(&self.dest, e))?;
            true
        } else {
            false
        };

        let attempts = ctx.max_retries + 1;
        let mut mismatch = None;

        for attempt in 1..=attempts {
            let (written, content_length) = match self.transfer(ctx).await {
                Ok(result) => result,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&self.dest).await;
                    self.restore_backup(had_backup).await;
                    if !self.ignore_failures {
                        ctx.cancel_session();
                    }
                    return Err(e);
                }
            };

            match self.verify(written, content_length).await? {
                None => {
                    if had_backup {
                        let _ = tokio::fs::remove_file(&backup).await;
                    }
                    ctx.report_done(true);
                    self.run_post_processors().await?;
                    debug!("Downloaded {} -> {:?}", self.url, self.dest);
                    return Ok(FetchOutcome::Downloaded { bytes: written });
                }
                Some(err) => {
                    warn!(
                        "Verification of {} failed (attempt {}/{})",
                        self.file_name(),
                        attempt,
                        attempts
                    );
                    mismatch = Some(err);
                }
            }
        }

        let err = mismatch.unwrap_or(LauncherError::Cancelled);
        self.handle_permanent_failure(ctx, err, had_backup).await
    }

    async fn transfer(&self, ctx: &FetchContext) -> LauncherResult<(u64, Option<u64>)> {
        let response = self.execute(ctx).await?;
        let content_length = http::header_content_length(&response);

        let mut file = tokio::fs::File::create(&self.dest)
            .await
            .map_err(|e| LauncherError::io(&self.dest, e))?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| LauncherError::io(&self.dest, e))?;
            written += chunk.len() as u64;
            ctx.report_bytes(chunk.len() as u64);
        }
        file.flush()
            .await
            .map_err(|e| LauncherError::io(&self.dest, e))?;
        // Handle must be closed before hashing or renaming on Windows.
        drop(file);

        Ok((written, content_length))
    }

    /// `None` when the fresh file is acceptable, otherwise the mismatch.
    async fn verify(&self, written: u64, content_length: Option<u64>) -> LauncherResult<Option<LauncherError>> {
        let expected_size = self.size.or(content_length);

        let (ok, actual_hash) = if let Some(expected) = self.fingerprint {
            let actual = fingerprint_file(&self.dest).await?;
            let ok = actual == expected
                || match &self.hash {
                    Some(hash) => file_matches(&self.dest, hash).await?,
                    None => false,
                };
            (ok, Some(actual.to_string()))
        } else if let Some(expected) = &self.hash {
            let actual = digest_like(&self.dest, expected).await?;
            let ok = actual
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(expected));
            (ok, actual)
        } else {
            (expected_size.map_or(true, |s| s == written), None)
        };

        if ok {
            return Ok(None);
        }

        Ok(Some(LauncherError::IntegrityMismatch {
            file: self.file_name(),
            url: self.url.clone(),
            expected_hash: self
                .hash
                .clone()
                .or_else(|| self.fingerprint.map(|f| f.to_string())),
            actual_hash,
            expected_size,
            actual_size: written,
        }))
    }

    async fn handle_permanent_failure(
        &self,
        ctx: &FetchContext,
        err: LauncherError,
        had_backup: bool,
    ) -> LauncherResult<FetchOutcome> {
        if let LauncherError::IntegrityMismatch {
            file,
            url,
            expected_hash,
            actual_hash,
            expected_size,
            actual_size,
        } = &err
        {
            error!(
                file = %file,
                url = %url,
                expected_hash = ?expected_hash,
                actual_hash = ?actual_hash,
                expected_size = ?expected_size,
                actual_size = *actual_size,
                "Download failed integrity verification"
            );
        }

        self.keep_failed_copy(ctx).await;

        if self.ignore_failures {
            warn!("Keeping unverified {} as requested", self.file_name());
            if had_backup {
                let _ = tokio::fs::remove_file(self.backup_path()).await;
            }
            ctx.report_done(true);
            self.run_post_processors().await?;
            return Ok(FetchOutcome::FailedIgnored);
        }

        let _ = tokio::fs::remove_file(&self.dest).await;
        self.restore_backup(had_backup).await;
        ctx.cancel_session();
        Err(err)
    }

    async fn keep_failed_copy(&self, ctx: &FetchContext) {
        if tokio::fs::create_dir_all(&ctx.failed_downloads_dir).await.is_err() {
            return;
        }
        let target = ctx.failed_downloads_dir.join(self.file_name());
        if let Err(e) = tokio::fs::copy(&self.dest, &target).await {
            warn!("Could not keep failed download {:?}: {}", target, e);
        }
    }

    async fn restore_backup(&self, had_backup: bool) {
        if !had_backup {
            return;
        }
        if let Err(e) = tokio::fs::rename(self.backup_path(), &self.dest).await {
            warn!("Could not restore backup of {:?}: {}", self.dest, e);
        }
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.dest.as_os_str().to_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    // ── Post-processing ─────────────────────────────────

    /// Copy, unzip and chmod steps. Runs on both the fresh-download and the
    /// already-valid paths.
    pub async fn run_post_processors(&self) -> LauncherResult<()> {
        if let Some(copy_to) = &self.copy_to {
            if self.copy_needed(copy_to).await? {
                if let Some(parent) = copy_to.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| LauncherError::io(parent, e))?;
                }
                tokio::fs::copy(&self.dest, copy_to)
                    .await
                    .map_err(|e| LauncherError::io(copy_to, e))?;
            }
        }

        if let Some(unzip_to) = &self.unzip_to {
            extract_archive(&self.dest, unzip_to, &self.extract_rules).await?;
            if self.delete_after_extract {
                tokio::fs::remove_file(&self.dest)
                    .await
                    .map_err(|e| LauncherError::io(&self.dest, e))?;
            }
        }

        if self.executable {
            set_executable(&self.dest)?;
        }

        Ok(())
    }

    async fn copy_needed(&self, copy_to: &Path) -> LauncherResult<bool> {
        let (Ok(src), Ok(dst)) = (
            tokio::fs::metadata(&self.dest).await,
            tokio::fs::metadata(copy_to).await,
        ) else {
            return Ok(true);
        };
        if src.len() != dst.len() {
            return Ok(true);
        }
        match &self.hash {
            Some(hash) => Ok(!file_matches(copy_to, hash).await?),
            None => Ok(false),
        }
    }
}

#[cfg(unix)]
pub(crate) fn set_executable(path: &Path) -> LauncherResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| LauncherError::io(path, e))?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).map_err(|e| LauncherError::io(path, e))
}

#[cfg(not(unix))]
pub(crate) fn set_executable(_path: &Path) -> LauncherResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::config::InstallerConfig;
    use crate::core::install::{InstallSession, NoopProgress};
    use crate::core::integrity::{fingerprint_bytes, sha1_hex};
    use crate::core::test_support::{zip_bytes, TestServer};

    fn context(dir: &Path) -> (FetchContext, Arc<InstallSession>) {
        let config = InstallerConfig::with_data_dir(dir);
        let session = Arc::new(InstallSession::new("p", "1", false, Arc::new(NoopProgress)));
        let ctx = FetchContext::new(reqwest::Client::new(), &config).with_session(session.clone());
        (ctx, session)
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced() {
        let server = TestServer::start().await;
        server.serve("/lib.jar", b"good bytes");
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path());

        let dest = dir.path().join("lib.jar");
        std::fs::write(&dest, b"bad bytes!").unwrap();
        let unit = FetchUnit::new(server.url("/lib.jar"), &dest).with_hash(sha1_hex(b"good bytes"));

        assert!(unit.needs_download(&ctx).await.unwrap());
        let outcome = unit.download(&ctx).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Downloaded { bytes: 10 });
        assert_eq!(std::fs::read(&dest).unwrap(), b"good bytes");
        assert!(!unit.needs_download(&ctx).await.unwrap());
        assert!(!unit.backup_path().exists());
    }

    #[tokio::test]
    async fn mismatch_gives_up_after_three_retries() {
        let server = TestServer::start().await;
        server.serve("/bad.jar", b"always wrong");
        let dir = tempfile::tempdir().unwrap();
        let (ctx, session) = context(dir.path());

        let dest = dir.path().join("bad.jar");
        let unit = FetchUnit::new(server.url("/bad.jar"), &dest).with_hash("0".repeat(40));

        let err = unit.download(&ctx).await.unwrap_err();
        assert!(matches!(err, LauncherError::IntegrityMismatch { actual_size: 12, .. }));
        assert_eq!(server.hits("/bad.jar"), 4);
        assert!(session.is_cancelled());
        assert!(dir.path().join("FailedDownloads").join("bad.jar").exists());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn failed_download_restores_previous_file() {
        let server = TestServer::start().await;
        server.serve("/mod.jar", b"new content");
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path());

        let dest = dir.path().join("mod.jar");
        std::fs::write(&dest, b"old content").unwrap();
        let unit = FetchUnit::new(server.url("/mod.jar"), &dest).with_hash("f".repeat(40));

        assert!(unit.download(&ctx).await.is_err());
        assert_eq!(std::fs::read(&dest).unwrap(), b"old content");
    }

    #[tokio::test]
    async fn ignored_failures_keep_the_file() {
        let server = TestServer::start().await;
        server.serve("/cfg.zip", b"whatever");
        let dir = tempfile::tempdir().unwrap();
        let (ctx, session) = context(dir.path());

        let dest = dir.path().join("cfg.zip");
        let unit = FetchUnit::new(server.url("/cfg.zip"), &dest)
            .with_hash("1".repeat(32))
            .ignore_failures();

        assert_eq!(unit.download(&ctx).await.unwrap(), FetchOutcome::FailedIgnored);
        assert!(dest.exists());
        assert!(!session.is_cancelled());
        assert!(!unit.needs_download(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn size_only_unit_trusts_matching_length() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path());
        let dest = dir.path().join("file.bin");
        std::fs::write(&dest, b"12345").unwrap();

        let unit = FetchUnit::new("http://127.0.0.1:9/never", &dest).with_size(5);
        assert!(!unit.needs_download(&ctx).await.unwrap());

        let unit = FetchUnit::new("http://127.0.0.1:9/never", &dest).with_size(6);
        assert!(unit.needs_download(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_size_is_asked_from_the_server_once() {
        let server = TestServer::start().await;
        server.serve("/sized.bin", b"12345");
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path());
        let dest = dir.path().join("sized.bin");
        std::fs::write(&dest, b"abcde").unwrap();

        let unit = FetchUnit::new(server.url("/sized.bin"), &dest);
        assert!(!unit.needs_download(&ctx).await.unwrap());
        assert!(!unit.needs_download(&ctx).await.unwrap());
        assert_eq!(server.hits_for("HEAD", "/sized.bin"), 1);
        assert_eq!(server.hits("/sized.bin"), 0);
    }

    #[tokio::test]
    async fn fingerprint_is_checked_before_hash() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path());
        let dest = dir.path().join("mod.jar");
        std::fs::write(&dest, b"mod body\r\n").unwrap();

        let unit = FetchUnit::new("http://127.0.0.1:9/never", &dest)
            .with_fingerprint(fingerprint_bytes(b"mod body"))
            .with_hash("2".repeat(40));
        assert!(!unit.needs_download(&ctx).await.unwrap());
    }

    #[tokio::test]
    async fn http_errors_are_typed() {
        let server = TestServer::start().await;
        server.serve_status("/gone.jar", 403, "application/xml", b"<Error>denied</Error>");
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path());

        let unit = FetchUnit::new(server.url("/gone.jar"), dir.path().join("gone.jar")).ignore_failures();
        let err = unit.download(&ctx).await.unwrap_err();
        match err {
            LauncherError::DownloadFailed { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body.as_deref(), Some("<Error>denied</Error>"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(server.hits("/gone.jar"), 1);
    }

    #[tokio::test]
    async fn unreachable_primary_falls_back_to_mirror() {
        let server = TestServer::start().await;
        server.serve("/pack/mod.jar", b"mirrored");
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path());

        let dest = dir.path().join("mod.jar");
        let unit = FetchUnit::new("http://127.0.0.1:1/pack/mod.jar", &dest)
            .with_fallbacks(vec![server.url("/pack/mod.jar")])
            .with_hash(sha1_hex(b"mirrored"));

        unit.download(&ctx).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"mirrored");
    }

    #[tokio::test]
    async fn post_processing_runs_on_valid_copy() {
        let archive = zip_bytes(&[("config/a.cfg", b"a=1")]);
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path());

        let dest = dir.path().join("configs.zip");
        std::fs::write(&dest, &archive).unwrap();
        let unit = FetchUnit::new("http://127.0.0.1:9/never", &dest)
            .with_hash(sha1_hex(&archive))
            .copy_to(dir.path().join("copy/configs.zip"))
            .unzip_to(dir.path().join("instance"), ExtractRules::default());

        assert_eq!(unit.download(&ctx).await.unwrap(), FetchOutcome::AlreadyValid);
        assert!(dir.path().join("copy/configs.zip").exists());
        assert_eq!(
            std::fs::read(dir.path().join("instance/config/a.cfg")).unwrap(),
            b"a=1"
        );
    }

    #[test]
    fn identity_is_the_destination() {
        let a = FetchUnit::new("http://a/x.jar", "/libs/x.jar").with_hash("1".repeat(40));
        let b = FetchUnit::new("http://b/x.jar", "/libs/x.jar");
        let c = FetchUnit::new("http://a/x.jar", "/libs/y.jar");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: std::collections::HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
