use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use super::model::InstanceManifest;
use crate::core::error::{LauncherError, LauncherResult};

pub const MANIFEST_FILE: &str = "instance.json";

/// Reads and writes the manifest of one instance directory.
pub struct InstanceManager {
    instance_dir: PathBuf,
}

impl InstanceManager {
    pub fn new(instance_dir: impl Into<PathBuf>) -> Self {
        Self {
            instance_dir: instance_dir.into(),
        }
    }

    pub fn instance_dir(&self) -> &Path {
        &self.instance_dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.instance_dir.join(MANIFEST_FILE)
    }

    /// `Ok(None)` for a directory that was never installed into. An
    /// unreadable manifest is treated the same way, with a warning, since a
    /// reinstall rewrites it anyway.
    pub async fn load(&self) -> LauncherResult<Option<InstanceManifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LauncherError::io(&path, e))?;
        match serde_json::from_str(&json) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub async fn require(&self) -> LauncherResult<InstanceManifest> {
        self.load()
            .await?
            .ok_or_else(|| LauncherError::InstanceNotFound(self.instance_dir.display().to_string()))
    }

    pub async fn save(&self, manifest: &mut InstanceManifest) -> LauncherResult<()> {
        manifest.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(manifest)?;
        tokio::fs::create_dir_all(&self.instance_dir)
            .await
            .map_err(|e| LauncherError::io(&self.instance_dir, e))?;

        // Write-then-rename so a crash never leaves half a manifest.
        let path = self.manifest_path();
        let tmp = self.instance_dir.join(format!("{}.tmp", MANIFEST_FILE));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| LauncherError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| LauncherError::io(&path, e))
    }

    pub async fn mark_corrupt(&self, manifest: &mut InstanceManifest) -> LauncherResult<()> {
        manifest.is_corrupt = true;
        self.save(manifest).await?;
        info!("Marked {} as incomplete until the install finishes", self.instance_dir.display());
        Ok(())
    }
}
