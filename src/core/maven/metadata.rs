use serde::Deserialize;

use crate::core::error::LauncherResult;
use crate::core::integrity::HttpCache;

/// `maven-metadata.xml` as published next to every artifact directory.
#[derive(Debug, Deserialize)]
#[serde(rename = "metadata")]
pub struct MavenMetadata {
    #[serde(rename = "groupId", default)]
    pub group_id: Option<String>,
    #[serde(rename = "artifactId", default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub versioning: Versioning,
}

#[derive(Debug, Default, Deserialize)]
pub struct Versioning {
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub versions: Versions,
}

#[derive(Debug, Default, Deserialize)]
pub struct Versions {
    #[serde(rename = "version", default)]
    pub version: Vec<String>,
}

impl MavenMetadata {
    pub fn parse(xml: &str) -> LauncherResult<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    /// Fetch `<repo>/<group path>/<artifact>/maven-metadata.xml`.
    pub async fn fetch(cache: &HttpCache, repo_base: &str, group: &str, artifact: &str) -> LauncherResult<Self> {
        let url = format!(
            "{}/{}/{}/maven-metadata.xml",
            repo_base.trim_end_matches('/'),
            group.replace('.', "/"),
            artifact
        );
        let xml = cache.get_text(&url).await?;
        Self::parse(&xml)
    }

    pub fn versions(&self) -> &[String] {
        &self.versioning.versions.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_list() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>net.minecraftforge</groupId>
  <artifactId>forge</artifactId>
  <versioning>
    <latest>1.20.1-47.2.20</latest>
    <release>1.20.1-47.2.20</release>
    <versions>
      <version>1.20.1-47.2.0</version>
      <version>1.20.1-47.2.20</version>
      <version>1.19.2-43.3.0</version>
    </versions>
    <lastUpdated>20240101000000</lastUpdated>
  </versioning>
</metadata>"#;

        let meta = MavenMetadata::parse(xml).unwrap();
        assert_eq!(meta.artifact_id.as_deref(), Some("forge"));
        assert_eq!(meta.versions().len(), 3);
        assert_eq!(meta.versioning.release.as_deref(), Some("1.20.1-47.2.20"));
    }

    #[test]
    fn empty_versioning_is_tolerated() {
        let meta = MavenMetadata::parse("<metadata><groupId>x</groupId></metadata>").unwrap();
        assert!(meta.versions().is_empty());
    }
}
