use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::context::LoaderContext;
use super::descriptor::ArtifactRole;
use super::processor::{build_data_map, Processor, SidedValue};
use super::strategy::{LoaderArguments, LoaderLibrary, LoaderStrategy};
use crate::core::download::{ExtractRules, FetchUnit};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::libraries::LibraryResolver;
use crate::core::maven::MavenArtifact;
use crate::core::version::{LibraryEntry, VersionJson};

/// Subset of `install_profile.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallProfile {
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub processors: Vec<Processor>,
    #[serde(default)]
    pub data: HashMap<String, SidedValue>,
}

/// Installer-based loaders (Forge 1.13+, NeoForge): an installer archive with
/// an install profile whose processors patch the game jar.
#[derive(Default)]
pub struct ModernLoader {
    installer_dir: Option<PathBuf>,
    installer_jar: Option<PathBuf>,
    profile: Option<InstallProfile>,
    version: Option<VersionJson>,
}

impl ModernLoader {
    pub fn new() -> Self {
        Self::default()
    }

    fn installer_dir(&self) -> LauncherResult<&Path> {
        self.installer_dir
            .as_deref()
            .ok_or_else(|| LauncherError::Loader("Installer has not been extracted".into()))
    }

    fn profile(&self) -> LauncherResult<&InstallProfile> {
        self.profile
            .as_ref()
            .ok_or_else(|| LauncherError::Loader("Install profile not loaded".into()))
    }

    fn all_libraries(&self) -> impl Iterator<Item = (&LibraryEntry, bool)> {
        let install_only = self
            .profile
            .iter()
            .flat_map(|p| p.libraries.iter().map(|l| (l, true)));
        let runtime = self
            .version
            .iter()
            .flat_map(|v| v.libraries.iter().map(|l| (l, false)));
        runtime.chain(install_only)
    }

    /// Args files shipped by 1.17+ installers for servers, which are started
    /// with `@args` instead of `-jar`.
    fn args_files(&self) -> Vec<PathBuf> {
        let Some(dir) = &self.installer_dir else {
            return Vec::new();
        };
        ["unix_args.txt", "win_args.txt"]
            .iter()
            .map(|f| dir.join("data").join(f))
            .filter(|p| p.exists())
            .collect()
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> LauncherResult<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

#[async_trait]
impl LoaderStrategy for ModernLoader {
    async fn download_and_extract_installer(&mut self, ctx: &LoaderContext) -> LauncherResult<()> {
        ctx.ensure_active()?;
        let descriptor = &ctx.descriptor;
        // Cached with other downloads; only the extracted copy is temporary.
        let installer_jar = ctx
            .config
            .downloads_dir()
            .join(descriptor.file_name(ArtifactRole::Installer, "jar"));
        let installer_dir = ctx.temp_dir.join("installer");

        info!(
            "Installing {} {} for Minecraft {}",
            descriptor.kind, descriptor.version, ctx.minecraft_version
        );

        let mut unit = FetchUnit::new(
            descriptor.url(&ctx.config.endpoints, ArtifactRole::Installer, "jar"),
            &installer_jar,
        )
        .unzip_to(&installer_dir, ExtractRules::default());
        if let Some(known) = descriptor.downloadable(ArtifactRole::Installer) {
            unit = unit.with_hash(&known.hash).with_size(known.size);
        }
        unit.download(&ctx.fetch).await?;

        let profile: InstallProfile = read_json(&installer_dir.join("install_profile.json")).await?;
        let version_path = installer_dir.join("version.json");
        let version: Option<VersionJson> = if version_path.exists() {
            Some(read_json(&version_path).await?)
        } else {
            None
        };

        debug!(
            "Install profile has {} libraries and {} processors",
            profile.libraries.len(),
            profile.processors.len()
        );

        self.installer_dir = Some(installer_dir);
        self.installer_jar = Some(installer_jar);
        self.profile = Some(profile);
        self.version = version;
        Ok(())
    }

    async fn copy_local_libraries(&self, ctx: &LoaderContext) -> LauncherResult<()> {
        let installer_dir = self.installer_dir()?;
        let libraries_dir = ctx.libraries_dir();
        let resolver = LibraryResolver::new(&libraries_dir, &ctx.config.endpoints.libraries);
        let entries: Vec<LibraryEntry> = self.all_libraries().map(|(l, _)| l.clone()).collect();

        for dest in resolver.resolve(&entries)?.local {
            let Ok(relative) = dest.strip_prefix(&libraries_dir) else {
                continue;
            };
            let source = installer_dir.join("maven").join(relative);
            if !source.exists() {
                return Err(LauncherError::Loader(format!(
                    "Installer does not contain local library {}",
                    relative.display()
                )));
            }
            let len = |p: &Path| std::fs::metadata(p).map(|m| m.len()).ok();
            if len(&dest).is_some() && len(&dest) == len(&source) {
                continue;
            }
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| LauncherError::io(parent, e))?;
            }
            tokio::fs::copy(&source, &dest)
                .await
                .map_err(|e| LauncherError::io(&dest, e))?;
            debug!("Copied local library {}", relative.display());
        }

        if ctx.is_server {
            // The args files point at `libraries/...`, relative to the server root.
            let target = ctx
                .instance_dir
                .join("libraries")
                .join(ctx.descriptor.kind.group().replace('.', "/"))
                .join(ctx.descriptor.kind.artifact())
                .join(&ctx.descriptor.raw_version);
            for file in self.args_files() {
                tokio::fs::create_dir_all(&target)
                    .await
                    .map_err(|e| LauncherError::io(&target, e))?;
                let Some(name) = file.file_name() else {
                    continue;
                };
                let dest = target.join(name);
                tokio::fs::copy(&file, &dest)
                    .await
                    .map_err(|e| LauncherError::io(&dest, e))?;
            }
        }

        Ok(())
    }

    async fn run_processors(&self, ctx: &LoaderContext) -> LauncherResult<()> {
        let profile = self.profile()?;
        let installer_dir = self.installer_dir()?;
        let libraries_dir = ctx.libraries_dir();
        let side = ctx.side();

        let installer_jar = self
            .installer_jar
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let runtime = [
            ("SIDE", side.to_string()),
            ("MINECRAFT_JAR", ctx.minecraft_jar.to_string_lossy().to_string()),
            ("MINECRAFT_VERSION", ctx.minecraft_version.clone()),
            ("ROOT", ctx.instance_dir.to_string_lossy().to_string()),
            ("INSTALLER", installer_jar),
            ("LIBRARY_DIR", libraries_dir.to_string_lossy().to_string()),
        ];
        let data = build_data_map(&profile.data, side, &runtime, &libraries_dir, installer_dir)?;

        for processor in profile.processors.iter().filter(|p| p.applies_to(side)) {
            ctx.ensure_active()?;

            if processor.outputs_up_to_date(&data, &libraries_dir).await? {
                debug!("Processor {} outputs already present, skipping", processor.jar);
                continue;
            }

            if let Err(e) = processor.run(&ctx.config.java_path, &data, &libraries_dir).await {
                ctx.fetch.cancel_session();
                return Err(e);
            }
        }

        Ok(())
    }

    fn get_libraries(&self, ctx: &LoaderContext) -> LauncherResult<Vec<LoaderLibrary>> {
        let libraries_dir = ctx.libraries_dir();
        let resolver = LibraryResolver::new(&libraries_dir, &ctx.config.endpoints.libraries);

        let mut out = Vec::new();
        for (entry, install_only) in self.all_libraries() {
            let resolved = resolver.resolve(std::slice::from_ref(entry))?;
            out.extend(resolved.plain.into_iter().map(|unit| LoaderLibrary { unit, install_only }));
        }
        Ok(out)
    }

    fn get_arguments(&self) -> LoaderArguments {
        match &self.version {
            Some(v) => LoaderArguments {
                game: v.game_arguments(),
                jvm: v.jvm_arguments(),
            },
            None => LoaderArguments::default(),
        }
    }

    fn get_main_class(&self) -> Option<String> {
        self.version.as_ref().and_then(|v| v.main_class.clone())
    }

    fn get_server_jar(&self, ctx: &LoaderContext) -> Option<PathBuf> {
        if !self.args_files().is_empty() {
            return None;
        }
        // 1.13 - 1.16 installers carry the server launcher jar under maven/.
        let artifact = MavenArtifact::parse(&format!(
            "{}:{}:{}",
            ctx.descriptor.kind.group(),
            ctx.descriptor.kind.artifact(),
            ctx.descriptor.raw_version
        ))
        .ok()?;
        let jar = self.installer_dir.as_ref()?.join("maven").join(artifact.local_path());
        if jar.exists() {
            Some(jar)
        } else {
            warn!("No server jar found in {} installer", ctx.descriptor.kind);
            None
        }
    }

    fn use_minecraft_libraries(&self) -> bool {
        true
    }

    /// Pre-1.13 style version files restate every game argument.
    fn use_minecraft_arguments(&self) -> bool {
        self.version
            .as_ref()
            .map_or(true, |v| v.minecraft_arguments.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::config::InstallerConfig;
    use crate::core::download::FetchContext;
    use crate::core::integrity::sha1_hex;
    use crate::core::loaders::descriptor::LoaderVersionDescriptor;
    use crate::core::test_support::{zip_bytes, TestServer};

    fn installer_zip() -> Vec<u8> {
        let profile = serde_json::json!({
            "libraries": [
                {"name": "net.minecraftforge:installertools:1.3.0", "downloads": {"artifact": {
                    "path": "net/minecraftforge/installertools/1.3.0/installertools-1.3.0.jar",
                    "sha1": sha1_hex(b"tools"), "size": 5, "url": "http://libs/installertools-1.3.0.jar"
                }}},
                {"name": "net.minecraftforge:forge:1.20.1-47.2.0:universal", "downloads": {"artifact": {
                    "path": "net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-universal.jar",
                    "url": ""
                }}}
            ],
            "processors": [
                {"sides": ["server"], "jar": "a:server-only:1", "args": []},
                {"jar": "net.minecraftforge:installertools:1.3.0",
                 "args": ["--task", "{SIDE}"],
                 "outputs": {"{PATCHED}": "{PATCHED_SHA}"}}
            ],
            "data": {
                "PATCHED": {"client": "[net.minecraftforge:forge:1.20.1-47.2.0:client]", "server": "[x:y:1]"},
                "PATCHED_SHA": {"client": format!("'{}'", sha1_hex(b"patched")), "server": "''"}
            }
        });
        let version = serde_json::json!({
            "id": "1.20.1-forge-47.2.0",
            "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
            "arguments": {"game": ["--launchTarget", "forgeclient"], "jvm": ["-DignoreList=x"]},
            "libraries": [
                {"name": "net.minecraftforge:fmlcore:1.20.1-47.2.0", "downloads": {"artifact": {
                    "path": "net/minecraftforge/fmlcore/1.20.1-47.2.0/fmlcore-1.20.1-47.2.0.jar",
                    "sha1": sha1_hex(b"fmlcore"), "size": 7, "url": "http://libs/fmlcore.jar"
                }}}
            ]
        });
        let profile = serde_json::to_vec(&profile).unwrap();
        let version = serde_json::to_vec(&version).unwrap();
        zip_bytes(&[
            ("install_profile.json", &profile),
            ("version.json", &version),
            (
                "maven/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-universal.jar",
                b"universal",
            ),
        ])
    }

    fn context(server: &TestServer, dir: &Path) -> LoaderContext {
        let mut config = InstallerConfig::with_data_dir(dir.join("data"));
        config.endpoints.forge_maven = server.base().to_string();
        let fetch = FetchContext::new(reqwest::Client::new(), &config);
        let descriptor: LoaderVersionDescriptor = serde_json::from_value(serde_json::json!({
            "version": "47.2.0", "rawVersion": "1.20.1-47.2.0", "type": "forge"
        }))
        .unwrap();
        LoaderContext {
            config: Arc::new(config),
            fetch,
            descriptor,
            minecraft_version: "1.20.1".into(),
            instance_dir: dir.join("instance"),
            temp_dir: dir.join("instance/.install-temp/loader"),
            minecraft_jar: dir.join("data/versions/1.20.1/1.20.1.jar"),
            is_server: false,
        }
    }

    #[tokio::test]
    async fn installer_yields_libraries_and_launch_details() {
        let server = TestServer::start().await;
        server.serve(
            "/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar",
            &installer_zip(),
        );
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&server, dir.path());

        let mut loader = ModernLoader::new();
        loader.download_and_extract_installer(&ctx).await.unwrap();
        assert!(ctx
            .config
            .downloads_dir()
            .join("forge-1.20.1-47.2.0-installer.jar")
            .is_file());

        // A wiped temp dir is refilled from the cached installer.
        std::fs::remove_dir_all(&ctx.temp_dir).unwrap();
        let mut again = ModernLoader::new();
        again.download_and_extract_installer(&ctx).await.unwrap();
        assert_eq!(
            server.hits("/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar"),
            1
        );
        assert!(ctx.temp_dir.join("installer/install_profile.json").is_file());

        let libraries = loader.get_libraries(&ctx).unwrap();
        assert_eq!(libraries.len(), 2);
        assert!(libraries.iter().any(|l| l.install_only && l.unit.dest.ends_with("installertools-1.3.0.jar")));
        assert!(libraries.iter().any(|l| !l.install_only && l.unit.dest.ends_with("fmlcore-1.20.1-47.2.0.jar")));

        assert_eq!(
            loader.get_main_class().as_deref(),
            Some("cpw.mods.bootstraplauncher.BootstrapLauncher")
        );
        assert_eq!(loader.get_arguments().game, vec!["--launchTarget", "forgeclient"]);
        assert!(loader.use_minecraft_arguments());

        loader.copy_local_libraries(&ctx).await.unwrap();
        let universal = ctx
            .libraries_dir()
            .join("net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-universal.jar");
        assert_eq!(std::fs::read(universal).unwrap(), b"universal");
    }

    #[tokio::test]
    async fn processors_with_current_outputs_are_skipped() {
        let server = TestServer::start().await;
        server.serve(
            "/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar",
            &installer_zip(),
        );
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(&server, dir.path());
        // Would fail loudly if any processor were actually started.
        Arc::get_mut(&mut ctx.config).unwrap().java_path = PathBuf::from("/nonexistent/java");

        let mut loader = ModernLoader::new();
        loader.download_and_extract_installer(&ctx).await.unwrap();

        let patched = ctx
            .libraries_dir()
            .join("net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-client.jar");
        std::fs::create_dir_all(patched.parent().unwrap()).unwrap();
        std::fs::write(&patched, b"patched").unwrap();

        loader.run_processors(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn missing_processor_jar_cancels_session() {
        let server = TestServer::start().await;
        server.serve(
            "/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar",
            &installer_zip(),
        );
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(&server, dir.path());
        let session = Arc::new(crate::core::install::InstallSession::new(
            "p",
            "1",
            false,
            Arc::new(crate::core::install::NoopProgress),
        ));
        ctx.fetch = ctx.fetch.clone().with_session(session.clone());

        let mut loader = ModernLoader::new();
        loader.download_and_extract_installer(&ctx).await.unwrap();

        let err = loader.run_processors(&ctx).await.unwrap_err();
        assert!(matches!(err, LauncherError::Processor(_)));
        assert!(session.is_cancelled());
    }
}
