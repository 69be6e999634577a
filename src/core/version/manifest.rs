// ─── Version Manifest ───
// Mojang version manifest v2, read through the document cache.

use serde::Deserialize;
use tracing::info;

use super::version_file::VersionJson;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::HttpCache;

/// Top-level Mojang version manifest.
#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<VersionEntry>,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    #[serde(default)]
    pub release_time: Option<String>,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    pub async fn fetch(cache: &HttpCache, url: &str) -> LauncherResult<Self> {
        let manifest: VersionManifest = cache.get_json(url).await?;
        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn releases(&self) -> Vec<&VersionEntry> {
        self.versions
            .iter()
            .filter(|v| v.version_type == "release")
            .collect()
    }

    /// Fetch the version JSON for `id`. Returns the parsed document and the
    /// raw text so callers can store it next to the jar.
    pub async fn resolve(&self, cache: &HttpCache, id: &str) -> LauncherResult<(VersionJson, String)> {
        let entry = self.find_version(id).ok_or_else(|| {
            LauncherError::Resolution(format!("Minecraft version {} is not in the manifest", id))
        })?;
        let raw = cache.get_text(&entry.url).await?;
        let version: VersionJson = serde_json::from_str(&raw)?;
        Ok((version, raw))
    }
}
