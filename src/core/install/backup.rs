use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

/// Files a player creates that a reinstall must not lose.
pub const USER_FILES: &[&str] = &[
    "options.txt",
    "servers.dat",
    "journeymap",
    "voxelmap",
    "portablemaps",
];

pub const BACKUP_DIR: &str = ".install-backup";

pub(crate) fn copy_recursive(src: &Path, dest: &Path) -> LauncherResult<()> {
    if src.is_dir() {
        std::fs::create_dir_all(dest).map_err(|e| LauncherError::io(dest, e))?;
        for entry in std::fs::read_dir(src).map_err(|e| LauncherError::io(src, e))? {
            let entry = entry.map_err(|e| LauncherError::io(src, e))?;
            copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        std::fs::copy(src, dest).map_err(|e| LauncherError::io(dest, e))?;
    }
    Ok(())
}

/// User files saved aside before a reinstall touches the instance.
#[derive(Debug, Default)]
pub struct UserFileBackup {
    instance_dir: PathBuf,
    saved: Vec<PathBuf>,
}

impl UserFileBackup {
    fn backup_dir(&self) -> PathBuf {
        self.instance_dir.join(BACKUP_DIR)
    }

    /// Save the standard user files plus `keeps` (paths relative to the
    /// instance). Missing entries are ignored.
    pub async fn create(instance_dir: &Path, keeps: &[String]) -> LauncherResult<Self> {
        let instance_dir = instance_dir.to_path_buf();
        let keeps = keeps.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut backup = UserFileBackup {
                instance_dir,
                saved: Vec::new(),
            };
            let backup_dir = backup.backup_dir();
            let candidates = USER_FILES.iter().map(|s| s.to_string()).chain(keeps);
            for relative in candidates {
                let relative = PathBuf::from(relative.trim_start_matches('/'));
                if relative.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
                    continue;
                }
                let source = backup.instance_dir.join(&relative);
                if !source.exists() {
                    continue;
                }
                copy_recursive(&source, &backup_dir.join(&relative))?;
                debug!("Backed up {}", relative.display());
                backup.saved.push(relative);
            }
            if !backup.saved.is_empty() {
                info!("Backed up {} user files", backup.saved.len());
            }
            Ok(backup)
        })
        .await?
    }

    /// Put every saved file back and drop the backup directory.
    pub async fn restore(self) -> LauncherResult<usize> {
        tokio::task::spawn_blocking(move || {
            let backup_dir = self.backup_dir();
            for relative in &self.saved {
                copy_recursive(&backup_dir.join(relative), &self.instance_dir.join(relative))?;
            }
            if backup_dir.exists() {
                std::fs::remove_dir_all(&backup_dir).map_err(|e| LauncherError::io(&backup_dir, e))?;
            }
            Ok(self.saved.len())
        })
        .await?
    }
}
