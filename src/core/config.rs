use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

const APP_DIR_NAME: &str = "Packsmith";
const BOOTSTRAP_FILE: &str = "packsmith_bootstrap.json";
pub const SETTINGS_FILE: &str = "installer_settings.json";

/// Remote base URLs. Every network location the pipeline touches is listed
/// here so a run can be pointed at mirrors (or at a local test server).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub version_manifest: String,
    pub resources: String,
    pub libraries: String,
    pub forge_maven: String,
    pub neoforge_maven: String,
    pub fml_libraries: String,
    /// Base URL serving `packs/<pack>/...` documents and pack-hosted files.
    pub pack_base: String,
    /// Tried in order when `pack_base` cannot be reached.
    pub pack_mirrors: Vec<String>,
    /// Batch file-size lookup. Skipped when unset.
    pub file_sizes: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            version_manifest: "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json"
                .to_string(),
            resources: "https://resources.download.minecraft.net".to_string(),
            libraries: crate::core::maven::MOJANG_LIBRARIES.to_string(),
            forge_maven: crate::core::maven::FORGE_MAVEN.to_string(),
            neoforge_maven: crate::core::maven::NEOFORGE_MAVEN.to_string(),
            fml_libraries: "https://files.minecraftforge.net/fmllibs".to_string(),
            pack_base: "https://download.nodecdn.net/containers/atl".to_string(),
            pack_mirrors: Vec::new(),
            file_sizes: None,
        }
    }
}

/// Immutable settings for one install run. Shared as `Arc<InstallerConfig>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub data_dir: PathBuf,
    pub concurrent_connections: usize,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_retries: u32,
    pub use_system_glfw: bool,
    pub use_system_openal: bool,
    pub scan_mods: bool,
    pub java_path: PathBuf,
    pub max_memory_mb: Option<u32>,
    pub browser_downloads_dir: Option<PathBuf>,
    pub document_cache_max_age_secs: u64,
    pub endpoints: Endpoints,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            concurrent_connections: 8,
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            max_retries: 3,
            use_system_glfw: false,
            use_system_openal: false,
            scan_mods: true,
            java_path: PathBuf::from("java"),
            max_memory_mb: None,
            browser_downloads_dir: dirs::download_dir(),
            document_cache_max_age_secs: 600,
            endpoints: Endpoints::default(),
        }
    }
}

impl InstallerConfig {
    /// Config rooted at `data_dir` with every other setting at its default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load settings from `path`, falling back to defaults when the file is
    /// missing. A malformed file is an error rather than silently ignored.
    pub fn load(path: &Path) -> LauncherResult<Self> {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| LauncherError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load `installer_settings.json` from the default data directory.
    pub fn load_default() -> LauncherResult<Self> {
        Self::load(&default_data_dir().join(SETTINGS_FILE))
    }

    pub fn save(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| LauncherError::io(path, e))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrent_connections.max(1)
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.data_dir.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.data_dir.join("versions")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join("downloads")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache").join("http")
    }

    pub fn failed_downloads_dir(&self) -> PathBuf {
        self.data_dir.join("FailedDownloads")
    }
}

#[derive(Debug, Deserialize)]
struct BootstrapConfig {
    data_dir: PathBuf,
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve the shared data directory, honouring a bootstrap file that points
/// somewhere else.
pub fn default_data_dir() -> PathBuf {
    let base = default_base_dir();
    let bootstrap_path = base.join(BOOTSTRAP_FILE);

    if let Ok(raw) = std::fs::read_to_string(&bootstrap_path) {
        match serde_json::from_str::<BootstrapConfig>(&raw) {
            Ok(cfg) => return cfg.data_dir,
            Err(e) => warn!("Ignoring unreadable {:?}: {}", bootstrap_path, e),
        }
    }

    base.join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = InstallerConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(cfg.concurrent_connections, 8);
        assert_eq!(cfg.max_retries, 3);
        assert!(cfg.scan_mods);
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            r#"{"concurrent_connections": 3, "endpoints": {"pack_base": "http://mirror"}}"#,
        )
        .unwrap();

        let cfg = InstallerConfig::load(&path).unwrap();
        assert_eq!(cfg.concurrent_connections, 3);
        assert_eq!(cfg.endpoints.pack_base, "http://mirror");
        assert_eq!(cfg.endpoints.libraries, "https://libraries.minecraft.net");
        assert_eq!(cfg.read_timeout_secs, 60);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let mut cfg = InstallerConfig::with_data_dir(dir.path());
        cfg.use_system_glfw = true;
        cfg.save(&path).unwrap();

        let loaded = InstallerConfig::load(&path).unwrap();
        assert!(loaded.use_system_glfw);
        assert_eq!(loaded.data_dir, dir.path());
        assert_eq!(loaded.failed_downloads_dir(), dir.path().join("FailedDownloads"));
    }

    #[test]
    fn concurrency_never_zero() {
        let mut cfg = InstallerConfig::with_data_dir("/tmp/x");
        cfg.concurrent_connections = 0;
        assert_eq!(cfg.concurrency(), 1);
    }
}
