// ─── Library Resolver ───
// Turns a version's library list into fetch units, split between classpath
// artifacts and native archives.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::download::{ExtractRules, FetchUnit};
use crate::core::error::LauncherResult;
use crate::core::maven::MavenArtifact;
use crate::core::version::{LibDownloadArtifact, LibraryEntry};

/// Output of [`LibraryResolver::resolve`].
#[derive(Debug, Default)]
pub struct ResolvedLibraries {
    /// Classpath artifacts.
    pub plain: Vec<FetchUnit>,
    /// Native archives, already set to unpack into the natives directory.
    pub natives: Vec<FetchUnit>,
    /// Libraries with no remote location; a loader supplies them locally.
    pub local: Vec<PathBuf>,
}

impl ResolvedLibraries {
    pub fn classpath(&self) -> Vec<PathBuf> {
        self.plain
            .iter()
            .map(|u| u.dest.clone())
            .chain(self.local.iter().cloned())
            .collect()
    }

    pub fn into_units(self) -> Vec<FetchUnit> {
        self.plain.into_iter().chain(self.natives).collect()
    }
}

pub struct LibraryResolver<'a> {
    libraries_dir: &'a Path,
    default_repository: &'a str,
    natives_dir: Option<PathBuf>,
    use_system_glfw: bool,
    use_system_openal: bool,
}

impl<'a> LibraryResolver<'a> {
    pub fn new(libraries_dir: &'a Path, default_repository: &'a str) -> Self {
        Self {
            libraries_dir,
            default_repository,
            natives_dir: None,
            use_system_glfw: false,
            use_system_openal: false,
        }
    }

    /// Extract native archives into `dir`. Without this natives are skipped,
    /// which is what servers want.
    pub fn with_natives(mut self, dir: impl Into<PathBuf>, use_system_glfw: bool, use_system_openal: bool) -> Self {
        self.natives_dir = Some(dir.into());
        self.use_system_glfw = use_system_glfw;
        self.use_system_openal = use_system_openal;
        self
    }

    pub fn resolve(&self, libraries: &[LibraryEntry]) -> LauncherResult<ResolvedLibraries> {
        let mut resolved = ResolvedLibraries::default();

        for lib in libraries {
            if !lib.is_allowed_for_current_os() {
                debug!("Skipping library (OS rule): {}", lib.name);
                continue;
            }

            let is_native_jar = lib.name.contains(":natives-");
            if is_native_jar && (self.natives_dir.is_none() || self.provided_by_system(&lib.name)) {
                debug!("Skipping native library {}", lib.name);
                continue;
            }

            match self.plain_unit(lib)? {
                Some(PlainArtifact::Remote(unit)) => resolved.plain.push(unit),
                Some(PlainArtifact::Local(path)) => resolved.local.push(path),
                None => {}
            }

            if let Some(unit) = self.native_unit(lib)? {
                resolved.natives.push(unit);
            }
        }

        debug!(
            "Resolved {} libraries, {} native archives, {} local",
            resolved.plain.len(),
            resolved.natives.len(),
            resolved.local.len()
        );
        Ok(resolved)
    }

    fn plain_unit(&self, lib: &LibraryEntry) -> LauncherResult<Option<PlainArtifact>> {
        if let Some(downloads) = &lib.downloads {
            return match &downloads.artifact {
                Some(artifact) => self.unit_for(&lib.name, None, artifact).map(Some),
                // Natives-only entries (pre-1.19 LWJGL 2) have no main artifact.
                None => Ok(None),
            };
        }

        // Old-style entry: coordinate plus optional repository base.
        if lib.natives.is_some() {
            return Ok(None);
        }
        let artifact = MavenArtifact::parse(&lib.name)?;
        let repo = lib.url.as_deref().unwrap_or(self.default_repository);
        Ok(Some(PlainArtifact::Remote(FetchUnit::new(
            artifact.url(repo),
            self.libraries_dir.join(artifact.local_path()),
        ))))
    }

    fn native_unit(&self, lib: &LibraryEntry) -> LauncherResult<Option<FetchUnit>> {
        let Some(natives_dir) = &self.natives_dir else {
            return Ok(None);
        };
        let Some(classifier) = lib.native_classifier_for_current_os() else {
            return Ok(None);
        };
        if self.provided_by_system(&lib.name) {
            debug!("Using system natives instead of {}", lib.name);
            return Ok(None);
        }

        let exclude = lib.extract.as_ref().map(|e| e.exclude.clone()).unwrap_or_default();
        // Native jars nest their libraries per platform; the JVM only
        // searches the top of the natives directory.
        let rules = ExtractRules::excluding(exclude).flattened();

        let classified = lib
            .downloads
            .as_ref()
            .and_then(|d| d.classifiers.as_ref())
            .and_then(|c| c.get(&classifier));

        let unit = match classified {
            Some(artifact) => match self.unit_for(&lib.name, Some(&classifier), artifact)? {
                PlainArtifact::Remote(unit) => unit,
                PlainArtifact::Local(_) => return Ok(None),
            },
            None => {
                let mut artifact = MavenArtifact::parse(&lib.name)?;
                artifact.classifier = Some(classifier);
                let repo = lib.url.as_deref().unwrap_or(self.default_repository);
                FetchUnit::new(artifact.url(repo), self.libraries_dir.join(artifact.local_path()))
            }
        };

        Ok(Some(unit.unzip_to(natives_dir, rules)))
    }

    fn unit_for(
        &self,
        name: &str,
        classifier: Option<&str>,
        artifact: &LibDownloadArtifact,
    ) -> LauncherResult<PlainArtifact> {
        let relative = match &artifact.path {
            Some(path) => path.split('/').collect::<PathBuf>(),
            None => {
                let mut coord = MavenArtifact::parse(name)?;
                if let Some(c) = classifier {
                    coord.classifier = Some(c.to_string());
                }
                coord.local_path()
            }
        };
        let dest = self.libraries_dir.join(relative);

        if artifact.url.trim().is_empty() {
            return Ok(PlainArtifact::Local(dest));
        }

        Ok(PlainArtifact::Remote(
            FetchUnit::new(&artifact.url, dest)
                .with_optional_hash(artifact.sha1.as_deref())
                .with_optional_size(artifact.size),
        ))
    }

    fn provided_by_system(&self, name: &str) -> bool {
        (self.use_system_glfw && name.contains("lwjgl-glfw"))
            || (self.use_system_openal && name.contains("lwjgl-openal"))
    }
}

enum PlainArtifact {
    Remote(FetchUnit),
    Local(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::current_os_name;

    fn libraries(json: serde_json::Value) -> Vec<LibraryEntry> {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn artifacts_use_declared_paths_and_hashes() {
        let libs = libraries(serde_json::json!([{
            "name": "com.mojang:brigadier:1.1.8",
            "downloads": {"artifact": {
                "path": "com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar",
                "sha1": "5244ce82c3337bba4a196a3ce858bfaecc74404a",
                "size": 78940,
                "url": "https://libraries.minecraft.net/com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar"
            }}
        }]));
        let dir = Path::new("/data/libraries");
        let resolved = LibraryResolver::new(dir, "https://repo").resolve(&libs).unwrap();

        assert_eq!(resolved.plain.len(), 1);
        let unit = &resolved.plain[0];
        assert_eq!(unit.dest, dir.join("com/mojang/brigadier/1.1.8/brigadier-1.1.8.jar"));
        assert_eq!(unit.size, Some(78940));
        assert!(unit.hash.is_some());
    }

    #[test]
    fn bare_maven_entries_use_their_repository() {
        let libs = libraries(serde_json::json!([
            {"name": "net.fabricmc:tiny-mappings-parser:0.3.0", "url": "https://maven.example/"},
            {"name": "org.ow2.asm:asm:9.5"}
        ]));
        let resolved = LibraryResolver::new(Path::new("/libs"), "https://default")
            .resolve(&libs)
            .unwrap();

        assert_eq!(
            resolved.plain[0].url,
            "https://maven.example/net/fabricmc/tiny-mappings-parser/0.3.0/tiny-mappings-parser-0.3.0.jar"
        );
        assert_eq!(resolved.plain[1].url, "https://default/org/ow2/asm/asm/9.5/asm-9.5.jar");
        assert!(resolved.plain[1].size.is_none());
    }

    #[test]
    fn empty_url_marks_local_library() {
        let libs = libraries(serde_json::json!([{
            "name": "net.minecraftforge:forge:1.20.1-47.2.0:universal",
            "downloads": {"artifact": {
                "path": "net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-universal.jar",
                "url": ""
            }}
        }]));
        let resolved = LibraryResolver::new(Path::new("/libs"), "https://r").resolve(&libs).unwrap();
        assert!(resolved.plain.is_empty());
        assert_eq!(resolved.local.len(), 1);
        assert_eq!(resolved.classpath().len(), 1);
    }

    #[test]
    fn natives_are_extracted_with_excludes() {
        let os = current_os_name();
        let libs = libraries(serde_json::json!([{
            "name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.4",
            "natives": {(os): format!("natives-{}", os)},
            "extract": {"exclude": ["META-INF/"]},
            "downloads": {"classifiers": {(format!("natives-{}", os)): {
                "path": format!("org/lwjgl/lwjgl/lwjgl-platform/2.9.4/lwjgl-platform-2.9.4-natives-{}.jar", os),
                "sha1": "b04f3ee8f5e43fa3b162981b50bb72fe1acabb33",
                "size": 22,
                "url": "https://libraries.minecraft.net/native.jar"
            }}}
        }]));

        let resolved = LibraryResolver::new(Path::new("/libs"), "https://r")
            .with_natives("/instance/natives", false, false)
            .resolve(&libs)
            .unwrap();

        assert!(resolved.plain.is_empty());
        assert_eq!(resolved.natives.len(), 1);
        let unit = &resolved.natives[0];
        assert_eq!(unit.unzip_to.as_deref(), Some(Path::new("/instance/natives")));
        assert!(unit.extract_rules.is_excluded("META-INF/MANIFEST.MF"));
        assert!(unit.extract_rules.flatten);
    }

    #[test]
    fn servers_and_system_toggles_skip_natives() {
        let os = current_os_name();
        let libs = libraries(serde_json::json!([
            {
                "name": "org.lwjgl:lwjgl-glfw:3.3.1:natives-linux",
                "downloads": {"artifact": {"path": "a.jar", "sha1": "a", "size": 1, "url": "http://x/a.jar"}}
            },
            {
                "name": "org.lwjgl:lwjgl-openal:3.3.1",
                "natives": {(os): "natives"},
                "downloads": {
                    "artifact": {"path": "b.jar", "sha1": "b", "size": 1, "url": "http://x/b.jar"},
                    "classifiers": {"natives": {"path": "c.jar", "sha1": "c", "size": 1, "url": "http://x/c.jar"}}
                }
            }
        ]));

        let server = LibraryResolver::new(Path::new("/libs"), "https://r").resolve(&libs).unwrap();
        assert_eq!(server.plain.len(), 1);
        assert!(server.natives.is_empty());

        let client = LibraryResolver::new(Path::new("/libs"), "https://r")
            .with_natives("/n", true, true)
            .resolve(&libs)
            .unwrap();
        assert_eq!(client.plain.len(), 1);
        assert!(client.natives.is_empty());

        let client = LibraryResolver::new(Path::new("/libs"), "https://r")
            .with_natives("/n", false, false)
            .resolve(&libs)
            .unwrap();
        assert_eq!(client.plain.len(), 2);
        assert_eq!(client.natives.len(), 1);
    }
}
