use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::loaders::LoaderKind;
use crate::core::pack::{Mod, ModType};

/// Which side an instance was installed for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Server,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Client => write!(f, "client"),
            Side::Server => write!(f, "server"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledLoader {
    pub kind: LoaderKind,
    pub version: String,
    pub raw_version: String,
}

/// One mod file put down by an install, kept so the next reinstall can
/// remove it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledMod {
    pub name: String,
    pub version: String,
    pub file: String,
    #[serde(rename = "type")]
    pub mod_type: ModType,
    pub hash: Option<String>,
}

impl From<&Mod> for InstalledMod {
    fn from(m: &Mod) -> Self {
        Self {
            name: m.name.clone(),
            version: m.version.clone(),
            file: m.file.clone(),
            mod_type: m.mod_type,
            hash: m.hash.clone(),
        }
    }
}

/// Installed-instance record persisted as `<instance>/instance.json`.
///
/// The layout inside an instance directory:
/// - `bin/`          game jar (client) and merged jar mods
/// - `mods/`, `coremods/`, `config/`, `resourcepacks/`, `texturepacks/`
/// - `natives/`      extracted native libraries
/// - `jarmods/`      jar mods waiting to be merged
/// - `instance.json` this struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceManifest {
    pub id: String,
    pub pack: String,
    pub version: String,
    pub minecraft_version: String,
    pub loader: Option<InstalledLoader>,
    pub side: Side,
    /// Set once an install starts changing files, cleared when it finishes.
    pub is_corrupt: bool,
    pub mods: Vec<InstalledMod>,
    /// Classpath entries, relative to the shared libraries directory where
    /// possible.
    pub libraries: Vec<String>,
    pub main_class: Option<String>,
    pub jvm_args: Vec<String>,
    pub game_args: Vec<String>,
    pub max_memory_mb: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceManifest {
    pub fn new(pack: &str, version: &str, minecraft_version: &str, side: Side) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            pack: pack.to_string(),
            version: version.to_string(),
            minecraft_version: minecraft_version.to_string(),
            loader: None,
            side,
            is_corrupt: false,
            mods: Vec::new(),
            libraries: Vec::new(),
            main_class: None,
            jvm_args: Vec::new(),
            game_args: Vec::new(),
            max_memory_mb: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Start a new install on top of this record, keeping its identity.
    pub fn reinstall(&self, version: &str, minecraft_version: &str, side: Side) -> Self {
        Self {
            id: self.id.clone(),
            created_at: self.created_at,
            ..Self::new(&self.pack, version, minecraft_version, side)
        }
    }
}
