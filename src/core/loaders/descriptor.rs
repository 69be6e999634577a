use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::config::Endpoints;
use crate::core::error::LauncherResult;
use crate::core::integrity::HttpCache;
use crate::core::maven::MavenMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    Forge,
    #[serde(alias = "neo-forge")]
    NeoForge,
}

impl LoaderKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "forge" => Some(Self::Forge),
            "neoforge" | "neo-forge" => Some(Self::NeoForge),
            _ => None,
        }
    }

    pub fn group(self) -> &'static str {
        match self {
            Self::Forge => "net.minecraftforge",
            Self::NeoForge => "net.neoforged",
        }
    }

    pub fn artifact(self) -> &'static str {
        match self {
            Self::Forge => "forge",
            Self::NeoForge => "neoforge",
        }
    }

    pub fn repository(self, endpoints: &Endpoints) -> &str {
        match self {
            Self::Forge => &endpoints.forge_maven,
            Self::NeoForge => &endpoints.neoforge_maven,
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact())
    }
}

/// Which file of a loader release a downloadable refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactRole {
    Installer,
    Universal,
    Client,
    Server,
}

impl ArtifactRole {
    pub fn classifier(self) -> &'static str {
        match self {
            Self::Installer => "installer",
            Self::Universal => "universal",
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

/// Known digest and size of a loader file, so it can be verified without an
/// extra round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downloadable {
    pub hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderVersionDescriptor {
    /// Loader version without the Minecraft prefix (`47.2.0`).
    pub version: String,
    /// Version as it appears in maven paths (`1.20.1-47.2.0`).
    pub raw_version: String,
    #[serde(default)]
    pub recommended: bool,
    #[serde(rename = "type")]
    pub kind: LoaderKind,
    #[serde(default)]
    pub downloadables: HashMap<ArtifactRole, Downloadable>,
}

impl LoaderVersionDescriptor {
    pub fn downloadable(&self, role: ArtifactRole) -> Option<&Downloadable> {
        self.downloadables.get(&role)
    }

    /// Pre-1.6 Forge shipped as a jar mod rather than an installer.
    pub fn is_legacy(&self, minecraft_version: &str) -> bool {
        self.kind == LoaderKind::Forge && minecraft_before_1_6(minecraft_version)
    }

    /// Maven file name for `role`, e.g. `forge-1.20.1-47.2.0-installer.jar`.
    pub fn file_name(&self, role: ArtifactRole, extension: &str) -> String {
        format!(
            "{}-{}-{}.{}",
            self.kind.artifact(),
            self.raw_version,
            role.classifier(),
            extension
        )
    }

    pub fn url(&self, endpoints: &Endpoints, role: ArtifactRole, extension: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.kind.repository(endpoints).trim_end_matches('/'),
            self.kind.group().replace('.', "/"),
            self.kind.artifact(),
            self.raw_version,
            self.file_name(role, extension)
        )
    }
}

fn minecraft_before_1_6(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    major == 1 && minor < 6
}

/// Loader versions published for `minecraft_version`, newest last as listed
/// in the repository metadata.
pub async fn list_loader_versions(
    cache: &HttpCache,
    endpoints: &Endpoints,
    kind: LoaderKind,
    minecraft_version: &str,
) -> LauncherResult<Vec<LoaderVersionDescriptor>> {
    let metadata = MavenMetadata::fetch(
        cache,
        kind.repository(endpoints),
        kind.group(),
        kind.artifact(),
    )
    .await?;
    let release = metadata.versioning.release.clone();

    let descriptors: Vec<_> = metadata
        .versions()
        .iter()
        .filter_map(|raw| {
            let version = loader_version_for(kind, minecraft_version, raw)?;
            Some(LoaderVersionDescriptor {
                version,
                raw_version: raw.clone(),
                recommended: release.as_deref() == Some(raw.as_str()),
                kind,
                downloadables: HashMap::new(),
            })
        })
        .collect();

    info!(
        "Found {} {} versions for Minecraft {}",
        descriptors.len(),
        kind,
        minecraft_version
    );
    Ok(descriptors)
}

/// Loader version part of a raw maven version, if it targets
/// `minecraft_version`.
fn loader_version_for(kind: LoaderKind, minecraft_version: &str, raw: &str) -> Option<String> {
    match kind {
        LoaderKind::Forge => {
            let rest = raw.strip_prefix(minecraft_version)?.strip_prefix('-')?;
            // Old builds carry a trailing branch suffix: 10.13.4.1614-1.7.10
            let version = rest
                .strip_suffix(minecraft_version)
                .and_then(|r| r.strip_suffix('-'))
                .unwrap_or(rest);
            Some(version.to_string())
        }
        LoaderKind::NeoForge => {
            // NeoForge drops the leading "1." and uses ".0" for a bare minor.
            let trimmed = minecraft_version.strip_prefix("1.")?;
            let prefix = if trimmed.contains('.') {
                format!("{}.", trimmed)
            } else {
                format!("{}.0.", trimmed)
            };
            raw.starts_with(&prefix).then(|| raw.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::core::test_support::TestServer;

    #[test]
    fn descriptor_deserializes_with_downloadables() {
        let d: LoaderVersionDescriptor = serde_json::from_value(serde_json::json!({
            "version": "47.2.0",
            "rawVersion": "1.20.1-47.2.0",
            "recommended": true,
            "type": "forge",
            "downloadables": {"installer": {"hash": "abc", "size": 10}}
        }))
        .unwrap();

        assert_eq!(d.kind, LoaderKind::Forge);
        assert_eq!(d.downloadable(ArtifactRole::Installer).unwrap().size, 10);
        assert!(d.downloadable(ArtifactRole::Universal).is_none());
        assert_eq!(d.file_name(ArtifactRole::Installer, "jar"), "forge-1.20.1-47.2.0-installer.jar");
    }

    #[test]
    fn legacy_detection() {
        let mut d: LoaderVersionDescriptor = serde_json::from_value(serde_json::json!({
            "version": "7.8.1.738", "rawVersion": "1.5.2-7.8.1.738", "type": "forge"
        }))
        .unwrap();
        assert!(d.is_legacy("1.5.2"));
        assert!(d.is_legacy("1.4.7"));
        assert!(!d.is_legacy("1.6.4"));
        assert!(!d.is_legacy("1.20.1"));
        d.kind = LoaderKind::NeoForge;
        assert!(!d.is_legacy("1.5.2"));
    }

    #[test]
    fn loader_versions_match_minecraft_version() {
        assert_eq!(
            loader_version_for(LoaderKind::Forge, "1.20.1", "1.20.1-47.2.0").as_deref(),
            Some("47.2.0")
        );
        assert_eq!(
            loader_version_for(LoaderKind::Forge, "1.7.10", "1.7.10-10.13.4.1614-1.7.10").as_deref(),
            Some("10.13.4.1614")
        );
        assert!(loader_version_for(LoaderKind::Forge, "1.20", "1.20.1-47.2.0").is_none());
        assert_eq!(
            loader_version_for(LoaderKind::NeoForge, "1.20.4", "20.4.237").as_deref(),
            Some("20.4.237")
        );
        assert_eq!(
            loader_version_for(LoaderKind::NeoForge, "1.21", "21.0.167").as_deref(),
            Some("21.0.167")
        );
        assert!(loader_version_for(LoaderKind::NeoForge, "1.20.4", "20.2.88").is_none());
    }

    #[tokio::test]
    async fn lists_versions_from_maven_metadata() {
        let server = TestServer::start().await;
        server.serve_status(
            "/net/minecraftforge/forge/maven-metadata.xml",
            200,
            "application/xml",
            br#"<metadata><versioning><release>1.20.1-47.2.0</release><versions>
                <version>1.19.2-43.3.0</version>
                <version>1.20.1-47.1.0</version>
                <version>1.20.1-47.2.0</version>
            </versions></versioning></metadata>"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path(), reqwest::Client::new(), Duration::from_secs(60));
        let endpoints = Endpoints {
            forge_maven: server.base().to_string(),
            ..Endpoints::default()
        };

        let versions = list_loader_versions(&cache, &endpoints, LoaderKind::Forge, "1.20.1")
            .await
            .unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].version, "47.2.0");
        assert!(versions[1].recommended);
        assert!(!versions[0].recommended);
    }
}
