// ─── Version File ───
// Mojang version JSON plus the OS/arch rule evaluation used by libraries and
// arguments.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::download::FetchUnit;
use crate::core::error::{LauncherError, LauncherResult};

/// A parsed Mojang version JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionJson {
    pub id: String,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexInfo>,
    /// Asset index id for versions that predate `assetIndex`.
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    /// Legacy `minecraftArguments` field (pre-1.13).
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub logging: Option<Logging>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionDownloads {
    pub client: Option<DownloadArtifact>,
    pub server: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<serde_json::Value>,
    #[serde(default)]
    pub jvm: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    #[serde(default)]
    pub client: Option<LoggingEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingEntry {
    #[serde(default)]
    pub argument: Option<String>,
    pub file: LoggingFile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingFile {
    pub id: String,
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

// ─── Library Entry with Rules ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    /// Maven repository base for libraries listed without `downloads`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Option<Vec<LibraryRule>>,
    #[serde(default)]
    pub natives: Option<HashMap<String, String>>,
    #[serde(default)]
    pub extract: Option<ExtractSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<LibDownloadArtifact>,
    #[serde(default)]
    pub classifiers: Option<HashMap<String, LibDownloadArtifact>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibDownloadArtifact {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractSpec {
    #[serde(default)]
    pub exclude: Vec<String>,
}

// ─── OS Rule Evaluation ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

impl OsRule {
    fn matches_current(&self) -> bool {
        let name_ok = self.name.as_deref().map_or(true, |n| n == current_os_name());
        let arch_ok = self.arch.as_deref().map_or(true, |a| a == current_arch_name());
        name_ok && arch_ok
    }
}

/// Rules are applied top to bottom starting from "disallowed"; each rule whose
/// OS constraint matches sets the state. No rules at all means allowed.
pub fn rules_allow(rules: Option<&[LibraryRule]>) -> bool {
    let Some(rules) = rules else {
        return true;
    };

    let mut allowed = false;
    for rule in rules {
        let os_matches = rule.os.as_ref().map_or(true, OsRule::matches_current);
        if os_matches {
            allowed = rule.action == RuleAction::Allow;
        }
    }
    allowed
}

impl LibraryEntry {
    pub fn is_allowed_for_current_os(&self) -> bool {
        rules_allow(self.rules.as_deref())
    }

    /// Native classifier for this platform, with `${arch}` filled in.
    pub fn native_classifier_for_current_os(&self) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let classifier = natives.get(current_os_name())?;
        let bits = if cfg!(target_pointer_width = "64") { "64" } else { "32" };
        Some(classifier.replace("${arch}", bits))
    }
}

/// Mojang OS name for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

fn current_arch_name() -> &'static str {
    if cfg!(target_arch = "x86") {
        "x86"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else {
        "x86_64"
    }
}

impl VersionJson {
    /// Asset index id, falling back to the pre-1.6 `legacy` index.
    pub fn asset_index_id(&self) -> String {
        self.asset_index
            .as_ref()
            .map(|a| a.id.clone())
            .or_else(|| self.assets.clone())
            .unwrap_or_else(|| "legacy".to_string())
    }

    /// Location of the game jar in the shared versions directory.
    pub fn jar_path(&self, versions_dir: &Path, is_server: bool) -> PathBuf {
        let file = if is_server {
            format!("{}-server.jar", self.id)
        } else {
            format!("{}.jar", self.id)
        };
        versions_dir.join(&self.id).join(file)
    }

    /// Fetch unit for the client or server jar.
    pub fn jar_unit(&self, versions_dir: &Path, is_server: bool) -> LauncherResult<FetchUnit> {
        let downloads = self.downloads.as_ref();
        let artifact = if is_server {
            downloads.and_then(|d| d.server.as_ref())
        } else {
            downloads.and_then(|d| d.client.as_ref())
        };
        let artifact = artifact.ok_or_else(|| {
            LauncherError::Resolution(format!(
                "Version {} has no {} download",
                self.id,
                if is_server { "server" } else { "client" }
            ))
        })?;

        Ok(FetchUnit::new(&artifact.url, self.jar_path(versions_dir, is_server))
            .with_hash(&artifact.sha1)
            .with_size(artifact.size))
    }

    /// Fetch unit for the client logging config, when the version ships one.
    pub fn logging_unit(&self, assets_dir: &Path) -> Option<FetchUnit> {
        let file = &self.logging.as_ref()?.client.as_ref()?.file;
        Some(
            FetchUnit::new(&file.url, assets_dir.join("log_configs").join(&file.id))
                .with_hash(&file.sha1)
                .with_size(file.size),
        )
    }

    /// Game arguments, string-only, after rule filtering.
    pub fn game_arguments(&self) -> Vec<String> {
        match &self.arguments {
            Some(args) => args.game.iter().flat_map(extract_argument_values).collect(),
            None => self
                .minecraft_arguments
                .as_deref()
                .map(|s| s.split_whitespace().map(ToString::to_string).collect())
                .unwrap_or_default(),
        }
    }

    pub fn jvm_arguments(&self) -> Vec<String> {
        match &self.arguments {
            Some(args) => args.jvm.iter().flat_map(extract_argument_values).collect(),
            None => vec![],
        }
    }
}

fn extract_argument_values(value: &serde_json::Value) -> Vec<String> {
    if let Some(arg) = value.as_str() {
        return vec![arg.to_string()];
    }

    let Some(obj) = value.as_object() else {
        return vec![];
    };

    if let Some(rules) = obj.get("rules") {
        // Feature-gated arguments (demo mode, custom resolution) carry rules
        // without an OS and are never on by default.
        let parsed: Vec<LibraryRule> = serde_json::from_value(rules.clone()).unwrap_or_default();
        let feature_gated = rules
            .as_array()
            .is_some_and(|r| r.iter().any(|rule| rule.get("features").is_some()));
        if feature_gated || !rules_allow(Some(&parsed)) {
            return vec![];
        }
    }

    match obj.get("value") {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(arr)) => arr
            .iter()
            .filter_map(|v| v.as_str().map(ToString::to_string))
            .collect(),
        _ => vec![],
    }
}
