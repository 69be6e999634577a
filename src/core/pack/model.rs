use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::loaders::LoaderVersionDescriptor;

/// `packs/<pack>/pack.json`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackIndex {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<PackVersionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackVersionEntry {
    pub version: String,
    #[serde(default)]
    pub minecraft: Option<String>,
    #[serde(default)]
    pub recommended: bool,
}

impl PackIndex {
    pub fn find(&self, version: &str) -> Option<&PackVersionEntry> {
        self.versions.iter().find(|v| v.version == version)
    }
}

/// `packs/<pack>/versions/<version>/Configs.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackVersion {
    #[serde(default)]
    pub version: String,
    pub minecraft: String,
    #[serde(default)]
    pub messages: Messages,
    #[serde(default)]
    pub loader: Option<LoaderVersionDescriptor>,
    #[serde(default)]
    pub mods: Vec<Mod>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub case_all_files: Option<CaseConversion>,
    /// Digest of the `Configs.zip` overlay, when the pack ships one.
    #[serde(default)]
    pub configs: Option<ConfigOverlay>,
    /// Paths (relative to the instance) preserved across reinstalls.
    #[serde(default)]
    pub keeps: Vec<String>,
    /// Recommended maximum heap in MiB.
    #[serde(default)]
    pub memory: Option<u32>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub extra_arguments: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Messages {
    #[serde(default)]
    pub install: Option<String>,
    #[serde(default)]
    pub update: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigOverlay {
    pub sha1: String,
    #[serde(default)]
    pub filesize: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseConversion {
    Upper,
    Lower,
}

impl CaseConversion {
    /// Apply to a file stem; the extension is always lowercased.
    pub fn apply(self, file_name: &str) -> String {
        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (file_name, None),
        };
        let stem = match self {
            Self::Upper => stem.to_uppercase(),
            Self::Lower => stem.to_lowercase(),
        };
        match ext {
            Some(ext) => format!("{}.{}", stem, ext.to_lowercase()),
            None => stem,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    /// Hosted with the pack, under the pack base URL and its mirrors.
    #[default]
    Server,
    /// An absolute URL.
    Direct,
    /// Must be fetched by the user through a browser.
    Browser,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModType {
    #[default]
    Mods,
    Coremods,
    Dependency,
    Jar,
    Root,
    Extract,
    Resourcepack,
    Texturepack,
    Resourcepackextract,
    Texturepackextract,
    Shaderpack,
    Plugins,
}

/// Where a mod ends up inside the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Copy(PathBuf),
    Extract(PathBuf),
}

impl ModType {
    pub fn is_extracted(self) -> bool {
        matches!(
            self,
            Self::Extract | Self::Resourcepackextract | Self::Texturepackextract
        )
    }

    /// Directory an extract-type pack is unpacked into before it is zipped
    /// back up by the repackaging stage.
    pub fn repack_dir(self, instance_dir: &Path) -> Option<PathBuf> {
        let temp = instance_dir.join(".install-temp");
        match self {
            Self::Resourcepackextract => Some(temp.join("resourcepacks")),
            Self::Texturepackextract => Some(temp.join("texturepacks")),
            _ => None,
        }
    }

    pub fn placement(self, m: &Mod, instance_dir: &Path, minecraft: &str) -> Placement {
        let file = &m.file;
        match self {
            Self::Mods => Placement::Copy(instance_dir.join("mods").join(file)),
            Self::Coremods => Placement::Copy(instance_dir.join("coremods").join(file)),
            Self::Dependency => Placement::Copy(instance_dir.join("mods").join(minecraft).join(file)),
            Self::Jar => Placement::Copy(instance_dir.join("jarmods").join(file)),
            Self::Root => Placement::Copy(instance_dir.join(file)),
            Self::Resourcepack => Placement::Copy(instance_dir.join("resourcepacks").join(file)),
            Self::Texturepack => Placement::Copy(instance_dir.join("texturepacks").join(file)),
            Self::Shaderpack => Placement::Copy(instance_dir.join("shaderpacks").join(file)),
            Self::Plugins => Placement::Copy(instance_dir.join("plugins").join(file)),
            Self::Extract => {
                let base = match &m.extract_to {
                    Some(sub) => instance_dir.join(sub),
                    None => instance_dir.to_path_buf(),
                };
                Placement::Extract(base)
            }
            Self::Resourcepackextract | Self::Texturepackextract => {
                let stem = file.rsplit_once('.').map_or(file.as_str(), |(s, _)| s);
                let dir = self.repack_dir(instance_dir).unwrap_or_default();
                Placement::Extract(dir.join(stem))
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mod {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub file: String,
    #[serde(default, alias = "md5", alias = "sha1")]
    pub hash: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<u64>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub download: DownloadKind,
    #[serde(rename = "type", default)]
    pub mod_type: ModType,
    /// Subdirectory for `extract` mods.
    #[serde(default)]
    pub extract_to: Option<String>,
    #[serde(default)]
    pub client_only: bool,
    #[serde(default)]
    pub server_only: bool,
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub server_file: Option<String>,
    #[serde(default)]
    pub server_hash: Option<String>,
    #[serde(default)]
    pub server_download: Option<DownloadKind>,
    #[serde(default)]
    pub server_type: Option<ModType>,
    #[serde(default)]
    pub optional: bool,
    /// Optional mods installed unless deselected.
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl Mod {
    /// This mod as installed on `side`: server overrides replace the client
    /// values on servers.
    pub fn for_side(&self, is_server: bool) -> Mod {
        let mut m = self.clone();
        if !is_server {
            return m;
        }
        if let Some(url) = &self.server_url {
            m.url = url.clone();
            // A different file means the client digests no longer apply.
            m.hash = self.server_hash.clone();
            m.fingerprint = None;
            m.filesize = None;
        }
        if let Some(file) = &self.server_file {
            m.file = file.clone();
        }
        if let Some(hash) = &self.server_hash {
            m.hash = Some(hash.clone());
        }
        if let Some(download) = self.server_download {
            m.download = download;
        }
        if let Some(mod_type) = self.server_type {
            m.mod_type = mod_type;
        }
        m
    }

    pub fn installs_on(&self, is_server: bool) -> bool {
        if is_server {
            !self.client_only
        } else {
            !self.server_only
        }
    }

    /// Whether `file` and `extract_to` stay inside the directories they are
    /// joined onto.
    pub fn has_contained_paths(&self) -> bool {
        is_contained(&self.file) && self.extract_to.as_deref().map_or(true, is_contained)
    }
}

/// A pack-supplied relative path with no root, drive prefix or `..`.
pub fn is_contained(relative: &str) -> bool {
    !relative.trim().is_empty()
        && Path::new(relative)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "createZip")]
    CreateZip,
    #[serde(rename = "renameMod")]
    RenameMod,
    #[serde(rename = "renameZip")]
    RenameZip,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action: ActionKind,
    #[serde(default)]
    pub mods: Vec<String>,
    pub save_as: String,
    /// Where the result goes.
    #[serde(rename = "type", default)]
    pub target: ModType,
    /// `delete` removes the source files after zipping.
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub client: Option<bool>,
    #[serde(default)]
    pub server: Option<bool>,
}

impl Action {
    pub fn applies_to(&self, is_server: bool) -> bool {
        if is_server {
            self.server.unwrap_or(true)
        } else {
            self.client.unwrap_or(true)
        }
    }

    pub fn deletes_sources(&self) -> bool {
        self.after.as_deref().is_some_and(|a| a.eq_ignore_ascii_case("delete"))
    }
}
