use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::core::download::FetchUnit;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::HttpCache;
use crate::core::version::version_file::AssetIndexInfo;

/// Asset index JSON: logical path to content-addressed object.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndex {
    #[serde(default)]
    pub objects: BTreeMap<String, AssetObject>,
    /// Objects are also laid out by name under `assets/virtual/<id>/`.
    #[serde(rename = "virtual", default)]
    pub is_virtual: bool,
    /// Objects are also copied into `<instance>/resources/` (pre-1.6 layout).
    #[serde(default)]
    pub map_to_resources: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    /// `<first two hex chars>/<hash>`
    pub fn object_path(&self) -> String {
        format!("{}/{}", &self.hash[..2.min(self.hash.len())], self.hash)
    }
}

/// Resolves an asset index into fetch units against the shared object store.
pub struct AssetResolver<'a> {
    pub assets_dir: &'a Path,
    pub resources_url: &'a str,
    pub instance_dir: &'a Path,
}

impl AssetResolver<'_> {
    /// Fetch the index through the document cache and store a copy in
    /// `assets/indexes/<id>.json`.
    pub async fn fetch_index(&self, cache: &HttpCache, info: &AssetIndexInfo) -> LauncherResult<AssetIndex> {
        let raw = cache.get_text(&info.url).await?;
        let index: AssetIndex = serde_json::from_str(&raw)?;

        let indexes_dir = self.assets_dir.join("indexes");
        tokio::fs::create_dir_all(&indexes_dir)
            .await
            .map_err(|e| LauncherError::io(&indexes_dir, e))?;
        let index_path = indexes_dir.join(format!("{}.json", info.id));
        tokio::fs::write(&index_path, &raw)
            .await
            .map_err(|e| LauncherError::io(&index_path, e))?;

        Ok(index)
    }

    /// One unit per object that is missing from the store, or whose mirrored
    /// copy is missing for virtual and resource-mapped indexes.
    pub fn units(&self, index_id: &str, index: &AssetIndex) -> Vec<FetchUnit> {
        let objects_dir = self.assets_dir.join("objects");
        let base = self.resources_url.trim_end_matches('/');

        let units: Vec<FetchUnit> = index
            .objects
            .iter()
            .filter(|(_, obj)| obj.hash.len() >= 2)
            .filter_map(|(name, obj)| {
                let relative = obj.object_path();
                let dest = objects_dir.join(&relative);
                let copy_to = self.mirrored_path(index_id, index, name);

                let stored = dest.exists();
                let copied = copy_to.as_ref().map_or(true, |p| p.exists());
                if stored && copied {
                    return None;
                }

                let mut unit = FetchUnit::new(format!("{}/{}", base, relative), dest)
                    .with_hash(&obj.hash)
                    .with_size(obj.size);
                if let Some(copy_to) = copy_to {
                    unit = unit.copy_to(copy_to);
                }
                Some(unit)
            })
            .collect();

        info!(
            "{} of {} asset objects need work",
            units.len(),
            index.objects.len()
        );
        units
    }

    fn mirrored_path(&self, index_id: &str, index: &AssetIndex, name: &str) -> Option<PathBuf> {
        if index.map_to_resources {
            Some(self.instance_dir.join("resources").join(name))
        } else if index.is_virtual {
            Some(self.assets_dir.join("virtual").join(index_id).join(name))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "abc1230000000000000000000000000000000000";

    fn index(json: serde_json::Value) -> AssetIndex {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn missing_object_yields_one_unit() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        let resolver = AssetResolver {
            assets_dir: &assets,
            resources_url: "https://resources.example",
            instance_dir: dir.path(),
        };
        let idx = index(serde_json::json!({"objects": {"a.txt": {"hash": HASH, "size": 10}}}));

        let units = resolver.units("17", &idx);
        assert_eq!(units.len(), 1);
        let unit = &units[0];
        assert_eq!(unit.dest, assets.join("objects").join("ab").join(HASH));
        assert_eq!(unit.hash.as_deref(), Some(HASH));
        assert_eq!(unit.size, Some(10));
        assert_eq!(unit.url, format!("https://resources.example/ab/{}", HASH));
        assert!(unit.copy_to.is_none());
    }

    #[test]
    fn present_objects_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        let object = assets.join("objects/ab").join(HASH);
        std::fs::create_dir_all(object.parent().unwrap()).unwrap();
        std::fs::write(&object, b"0123456789").unwrap();

        let resolver = AssetResolver {
            assets_dir: &assets,
            resources_url: "https://resources.example",
            instance_dir: dir.path(),
        };
        let idx = index(serde_json::json!({"objects": {"a.txt": {"hash": HASH, "size": 10}}}));
        assert!(resolver.units("17", &idx).is_empty());
    }

    #[test]
    fn virtual_index_needs_mirrored_copy() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        let object = assets.join("objects/ab").join(HASH);
        std::fs::create_dir_all(object.parent().unwrap()).unwrap();
        std::fs::write(&object, b"0123456789").unwrap();

        let resolver = AssetResolver {
            assets_dir: &assets,
            resources_url: "https://resources.example",
            instance_dir: dir.path(),
        };
        let idx = index(serde_json::json!({
            "virtual": true,
            "objects": {"sounds/a.ogg": {"hash": HASH, "size": 10}}
        }));

        let units = resolver.units("legacy", &idx);
        assert_eq!(units.len(), 1);
        assert_eq!(
            units[0].copy_to.as_deref(),
            Some(assets.join("virtual/legacy/sounds/a.ogg").as_path())
        );
    }

    #[test]
    fn resource_mapping_targets_instance() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("assets");
        let resolver = AssetResolver {
            assets_dir: &assets,
            resources_url: "https://resources.example",
            instance_dir: dir.path(),
        };
        let idx = index(serde_json::json!({
            "map_to_resources": true,
            "objects": {"sound/a.ogg": {"hash": HASH, "size": 10}}
        }));

        let units = resolver.units("pre-1.6", &idx);
        assert_eq!(
            units[0].copy_to.as_deref(),
            Some(dir.path().join("resources/sound/a.ogg").as_path())
        );
    }
}
