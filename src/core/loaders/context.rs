use std::path::PathBuf;
use std::sync::Arc;

use super::descriptor::LoaderVersionDescriptor;
use crate::core::config::InstallerConfig;
use crate::core::download::FetchContext;
use crate::core::error::{LauncherError, LauncherResult};

/// Everything a loader strategy needs from the running install.
pub struct LoaderContext {
    pub config: Arc<InstallerConfig>,
    pub fetch: FetchContext,
    pub descriptor: LoaderVersionDescriptor,
    pub minecraft_version: String,
    pub instance_dir: PathBuf,
    /// Scratch space for installer archives, removed after the install.
    pub temp_dir: PathBuf,
    /// Vanilla game jar in the shared versions directory.
    pub minecraft_jar: PathBuf,
    pub is_server: bool,
}

impl LoaderContext {
    /// Servers are self-contained and keep their libraries in the instance.
    pub fn libraries_dir(&self) -> PathBuf {
        if self.is_server {
            self.instance_dir.join("libraries")
        } else {
            self.config.libraries_dir()
        }
    }

    pub fn side(&self) -> &'static str {
        if self.is_server {
            "server"
        } else {
            "client"
        }
    }

    pub fn ensure_active(&self) -> LauncherResult<()> {
        if self.fetch.is_cancelled() {
            Err(LauncherError::Cancelled)
        } else {
            Ok(())
        }
    }
}
