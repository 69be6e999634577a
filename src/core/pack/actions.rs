use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;

use super::model::{is_contained, Action, ActionKind, Mod, Placement};
use crate::core::error::{LauncherError, LauncherResult};

/// Applies post-install actions to the mods an install put down.
pub struct ActionRunner<'a> {
    pub instance_dir: &'a Path,
    pub minecraft: &'a str,
    pub is_server: bool,
    pub installed: &'a [Mod],
}

impl ActionRunner<'_> {
    fn installed_path(&self, name: &str) -> Option<PathBuf> {
        let m = self.installed.iter().find(|m| m.name == name)?;
        match m.mod_type.placement(m, self.instance_dir, self.minecraft) {
            Placement::Copy(path) => Some(path),
            Placement::Extract(_) => None,
        }
    }

    fn target_path(&self, action: &Action) -> PathBuf {
        let target = Mod {
            file: action.save_as.clone(),
            ..Mod::default()
        };
        match action.target.placement(&target, self.instance_dir, self.minecraft) {
            Placement::Copy(path) => path,
            Placement::Extract(dir) => dir.join(&action.save_as),
        }
    }

    /// Run every action that applies. Returns how many ran.
    pub fn run_all(&self, actions: &[Action]) -> LauncherResult<usize> {
        let mut ran = 0;
        for action in actions {
            if !action.applies_to(self.is_server) {
                continue;
            }
            if !is_contained(&action.save_as) {
                warn!("Skipping {:?} action: target {:?} leaves its directory", action.action, action.save_as);
                continue;
            }
            let sources: Option<Vec<PathBuf>> =
                action.mods.iter().map(|n| self.installed_path(n)).collect();
            let Some(sources) = sources.filter(|s| !s.is_empty()) else {
                debug!("Skipping {:?} action for {}: mods not installed", action.action, action.save_as);
                continue;
            };

            match action.action {
                ActionKind::CreateZip => self.create_zip(action, &sources)?,
                ActionKind::RenameMod | ActionKind::RenameZip => self.rename(action, &sources[0])?,
            }
            ran += 1;
        }
        Ok(ran)
    }

    fn create_zip(&self, action: &Action, sources: &[PathBuf]) -> LauncherResult<()> {
        let dest = self.target_path(action);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }

        let file = std::fs::File::create(&dest).map_err(|e| LauncherError::io(&dest, e))?;
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default().last_modified_time(zip::DateTime::default());
        for source in sources {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let bytes = std::fs::read(source).map_err(|e| LauncherError::io(source, e))?;
            writer.start_file(name, options)?;
            writer.write_all(&bytes).map_err(|e| LauncherError::io(&dest, e))?;
        }
        writer.finish()?;

        if action.deletes_sources() {
            for source in sources {
                std::fs::remove_file(source).map_err(|e| LauncherError::io(source, e))?;
            }
        }
        info!("Created {} from {} mods", dest.display(), sources.len());
        Ok(())
    }

    fn rename(&self, action: &Action, source: &Path) -> LauncherResult<()> {
        let dest = self.target_path(action);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        std::fs::rename(source, &dest).map_err(|e| LauncherError::io(source, e))?;
        debug!("Renamed {} to {}", source.display(), dest.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pack::model::ModType;

    fn installed(name: &str, file: &str) -> Mod {
        Mod {
            name: name.into(),
            file: file.into(),
            url: format!("mods/{}", file),
            ..Mod::default()
        }
    }

    fn action(json: serde_json::Value) -> Action {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn create_zip_bundles_and_deletes_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mods_dir = dir.path().join("mods");
        std::fs::create_dir_all(&mods_dir).unwrap();
        std::fs::write(mods_dir.join("a.jar"), b"a").unwrap();
        std::fs::write(mods_dir.join("b.jar"), b"b").unwrap();
        let mods = vec![installed("A", "a.jar"), installed("B", "b.jar")];
        let runner = ActionRunner {
            instance_dir: dir.path(),
            minecraft: "1.7.10",
            is_server: false,
            installed: &mods,
        };

        let ran = runner
            .run_all(&[action(serde_json::json!({
                "action": "createZip", "mods": ["A", "B"], "saveAs": "bundle.zip",
                "type": "coremods", "after": "delete"
            }))])
            .unwrap();

        assert_eq!(ran, 1);
        let bundle = dir.path().join("coremods/bundle.zip");
        let archive = zip::ZipArchive::new(std::fs::File::open(bundle).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        assert!(!mods_dir.join("a.jar").exists());
    }

    #[test]
    fn actions_need_every_mod_and_matching_side() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("mods")).unwrap();
        std::fs::write(dir.path().join("mods/a.jar"), b"a").unwrap();
        let mods = vec![installed("A", "a.jar")];
        let runner = ActionRunner {
            instance_dir: dir.path(),
            minecraft: "1.7.10",
            is_server: true,
            installed: &mods,
        };

        let actions = [
            action(serde_json::json!({"action": "createZip", "mods": ["A", "Missing"], "saveAs": "x.zip"})),
            action(serde_json::json!({"action": "renameMod", "mods": ["A"], "saveAs": "z.jar", "server": false})),
        ];
        assert_eq!(runner.run_all(&actions).unwrap(), 0);

        let rename = action(serde_json::json!({"action": "renameMod", "mods": ["A"], "saveAs": "renamed.jar"}));
        assert_eq!(rename.target, ModType::Mods);
        assert_eq!(runner.run_all(&[rename]).unwrap(), 1);
        assert!(dir.path().join("mods/renamed.jar").exists());
    }

    #[test]
    fn escaping_targets_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let instance = dir.path().join("instance");
        std::fs::create_dir_all(instance.join("mods")).unwrap();
        std::fs::write(instance.join("mods/a.jar"), b"a").unwrap();
        let mods = vec![installed("A", "a.jar")];
        let runner = ActionRunner {
            instance_dir: &instance,
            minecraft: "1.7.10",
            is_server: false,
            installed: &mods,
        };

        let escape = action(serde_json::json!({"action": "renameMod", "mods": ["A"], "saveAs": "../../stolen.jar"}));
        assert_eq!(runner.run_all(&[escape]).unwrap(), 0);
        assert!(instance.join("mods/a.jar").exists());
        assert!(!dir.path().join("stolen.jar").exists());
    }
}
