use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tracing::{debug, error, info, warn};

use super::backup::UserFileBackup;
use super::memory::{effective_memory, total_system_memory_mb};
use super::progress::ProgressSink;
use super::scripts::{write_server_scripts, ServerLaunch};
use super::session::InstallSession;
use super::stage::Stage;
use crate::core::assets::AssetResolver;
use crate::core::config::InstallerConfig;
use crate::core::download::{extract_archive, zip_directory, ExtractRules, FetchContext, FetchPool, FetchUnit, PoolReport};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::instance::{InstalledLoader, InstalledMod, InstanceManager, InstanceManifest, Side};
use crate::core::integrity::HttpCache;
use crate::core::libraries::LibraryResolver;
use crate::core::loaders::{Loader, LoaderContext, LoaderStrategy};
use crate::core::pack::{
    fetch_file_sizes, scan_for_malware, select_mods, ActionRunner, Mod, ModPlanner, ModType, PackResolver, PackVersion,
    Placement,
};
use crate::core::version::{VersionJson, VersionManifest};

const TEMP_DIR: &str = ".install-temp";

/// What to install, and where.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub pack: String,
    pub version: String,
    pub instance_dir: PathBuf,
    pub is_server: bool,
    /// Optional mods to install in addition to the pack's defaults.
    pub optional_mods: Vec<String>,
}

#[derive(Debug)]
pub struct InstallOutcome {
    pub manifest: InstanceManifest,
    /// Files that went to the network during this run.
    pub network_fetches: usize,
    pub network_bytes: u64,
}

/// Results carried from one stage to the next.
#[derive(Default)]
struct InstallState {
    previous: Option<InstanceManifest>,
    manifest: Option<InstanceManifest>,
    pack_version: Option<PackVersion>,
    version_json: Option<VersionJson>,
    mods: Vec<Mod>,
    mod_sizes: HashMap<String, u64>,
    backup: Option<UserFileBackup>,
    loader: Option<Loader>,
    loader_ctx: Option<LoaderContext>,
    minecraft_jar: Option<PathBuf>,
    vanilla_classpath: Vec<PathBuf>,
    loader_classpath: Vec<PathBuf>,
    classpath: Vec<PathBuf>,
    main_class: Option<String>,
    jvm_args: Vec<String>,
    game_args: Vec<String>,
    memory_mb: Option<u32>,
    server_launch: Option<ServerLaunch>,
    jar_mods: bool,
}

/// Drives one install of a pack version into an instance directory.
///
/// Stages run strictly in order; cancellation is checked before each one.
/// A run that stops early leaves the instance marked corrupt so the next
/// install re-validates everything.
pub struct InstanceInstaller {
    config: Arc<InstallerConfig>,
    request: InstallRequest,
    session: Arc<InstallSession>,
    client: Client,
    cache: HttpCache,
    fetch: FetchContext,
    manager: InstanceManager,
    state: InstallState,
}

impl InstanceInstaller {
    pub fn new(
        config: Arc<InstallerConfig>,
        request: InstallRequest,
        sink: Arc<dyn ProgressSink>,
    ) -> LauncherResult<Self> {
        let client = build_http_client(&config)?;
        let manager = InstanceManager::new(&request.instance_dir);
        let is_reinstall = manager.manifest_path().exists();
        let session = Arc::new(InstallSession::new(
            &request.pack,
            &request.version,
            is_reinstall,
            sink,
        ));
        let cache = HttpCache::new(
            config.cache_dir(),
            client.clone(),
            std::time::Duration::from_secs(config.document_cache_max_age_secs),
        );
        let fetch = FetchContext::new(client.clone(), &config).with_session(session.clone());

        Ok(Self {
            config,
            request,
            session,
            client,
            cache,
            fetch,
            manager,
            state: InstallState::default(),
        })
    }

    /// Handle for cancelling the run from elsewhere.
    pub fn session(&self) -> Arc<InstallSession> {
        self.session.clone()
    }

    fn instance_dir(&self) -> &Path {
        &self.request.instance_dir
    }

    fn temp_dir(&self) -> PathBuf {
        self.instance_dir().join(TEMP_DIR)
    }

    fn is_server(&self) -> bool {
        self.request.is_server
    }

    fn side(&self) -> Side {
        if self.is_server() {
            Side::Server
        } else {
            Side::Client
        }
    }

    fn pack_version(&self) -> LauncherResult<&PackVersion> {
        self.state
            .pack_version
            .as_ref()
            .ok_or_else(|| LauncherError::Other("Pack version not resolved".into()))
    }

    fn version_json(&self) -> LauncherResult<&VersionJson> {
        self.state
            .version_json
            .as_ref()
            .ok_or_else(|| LauncherError::Other("Minecraft version not resolved".into()))
    }

    fn pack_resolver(&self) -> PackResolver<'_> {
        PackResolver::new(&self.cache, &self.config.endpoints, &self.request.pack)
    }

    /// Run every stage. Consumes the installer: a session is never reused.
    pub async fn install(mut self) -> LauncherResult<InstallOutcome> {
        info!(
            "Installing {} {} into {} ({}{})",
            self.request.pack,
            self.request.version,
            self.instance_dir().display(),
            self.side(),
            if self.session.is_reinstall() { ", reinstall" } else { "" }
        );
        self.state.previous = self.manager.load().await?;

        for stage in Stage::ALL {
            self.session.ensure_active()?;
            if !stage.applies(self.is_server()) {
                self.session.advance_percent(stage.weight());
                continue;
            }

            self.session.enter_stage(stage.label());
            debug!(stage = ?stage, "Entering stage");
            if let Err(e) = self.run_stage(stage).await {
                if e.is_cancelled() {
                    warn!(stage = ?stage, "Install cancelled");
                } else {
                    error!(stage = ?stage, "Install failed: {}", e);
                    self.session.cancel();
                }
                return Err(e);
            }
            self.session.advance_percent(stage.weight());
        }

        let manifest = self
            .state
            .manifest
            .take()
            .ok_or_else(|| LauncherError::Other("Install finished without a manifest".into()))?;
        info!(
            "Installed {} {}: {} files fetched, {} bytes",
            self.request.pack,
            self.request.version,
            self.session.network_fetches(),
            self.session.network_bytes()
        );
        Ok(InstallOutcome {
            manifest,
            network_fetches: self.session.network_fetches(),
            network_bytes: self.session.network_bytes(),
        })
    }

    async fn run_stage(&mut self, stage: Stage) -> LauncherResult<()> {
        match stage {
            Stage::ShowPreInstallMessage => self.show_pre_install_message().await,
            Stage::ResolveModsAndActions => self.resolve_mods_and_actions().await,
            Stage::BackupLegacyUserFiles => self.backup_user_files().await,
            Stage::CreateDirectories => self.create_directories().await,
            Stage::SyncAssets => self.sync_assets().await,
            Stage::SyncLibraries => self.sync_libraries().await,
            Stage::OrganizeLibraries => self.organize_libraries().await,
            Stage::ExtractOrStripJarMods => self.extract_game_jar().await,
            Stage::SyncAndInstallMods => self.sync_mods().await,
            Stage::ApplyCaseConversions => self.apply_case_conversions().await,
            Stage::RepackageJarMods => self.repackage_jar_mods().await,
            Stage::RepackageExtractedResourcePacks => self.repackage_resource_packs().await,
            Stage::RunPostInstallActions => self.run_actions(),
            Stage::ApplyConfigOverlay => self.apply_config_overlay().await,
            Stage::RestoreLegacyUserFiles => self.restore_user_files().await,
            Stage::WriteLauncherScripts => self.write_scripts().await,
            Stage::Done => self.finish().await,
        }
    }

    /// Downsize, size, then fetch a batch. Fails when any required unit
    /// failed or the session got cancelled meanwhile.
    async fn run_pool(&self, units: Vec<FetchUnit>) -> LauncherResult<PoolReport> {
        self.session.ensure_active()?;
        let mut pool = FetchPool::new();
        pool.add_all(units);
        let pool = pool.downsize(&self.fetch).await?;
        let total = pool.total_size(&self.fetch).await?;
        self.session.set_total_bytes(total);

        let report = pool.download_all(&self.fetch).await?.into_result()?;
        self.session.ensure_active()?;
        debug!(
            "Batch done: {} downloaded, {} already valid, {} bytes",
            report.downloaded, report.already_valid, report.bytes
        );
        Ok(report)
    }

    // ── Stages ──────────────────────────────────────────

    async fn show_pre_install_message(&mut self) -> LauncherResult<()> {
        let pack_version = self.pack_resolver().fetch_version(&self.request.version).await?;
        let message = if self.session.is_reinstall() {
            pack_version.messages.update.as_ref()
        } else {
            pack_version.messages.install.as_ref()
        };
        if let Some(message) = message {
            info!("{}", message);
            self.session.set_label(message);
        }
        self.state.pack_version = Some(pack_version);
        Ok(())
    }

    async fn resolve_mods_and_actions(&mut self) -> LauncherResult<()> {
        let pack_version = self.pack_version()?;
        let manifest = VersionManifest::fetch(&self.cache, &self.config.endpoints.version_manifest).await?;
        let (version_json, raw) = manifest.resolve(&self.cache, &pack_version.minecraft).await?;

        let version_file = self
            .config
            .versions_dir()
            .join(&version_json.id)
            .join(format!("{}.json", version_json.id));
        if let Some(parent) = version_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        tokio::fs::write(&version_file, raw)
            .await
            .map_err(|e| LauncherError::io(&version_file, e))?;

        let selected = select_mods(pack_version, self.is_server(), &self.request.optional_mods);
        let resolver = self.pack_resolver();
        let downloads_dir = self.config.downloads_dir();
        let planner = ModPlanner {
            resolver: &resolver,
            instance_dir: self.instance_dir(),
            downloads_dir: &downloads_dir,
            browser_dir: self.config.browser_downloads_dir.as_deref(),
            minecraft: &pack_version.minecraft,
        };

        let sizes = match &self.config.endpoints.file_sizes {
            Some(endpoint) => {
                let urls = planner.unsized_urls(&selected);
                fetch_file_sizes(&self.client, endpoint, &urls)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("File size lookup failed, sizes will be asked per file: {}", e);
                        HashMap::new()
                    })
            }
            None => HashMap::new(),
        };

        // Fails early for browser-only mods the user still has to fetch.
        let mods = planner.plan(selected, &sizes)?.mods;
        let memory = effective_memory(
            pack_version.memory,
            self.config.max_memory_mb,
            total_system_memory_mb(),
        );
        let jar_mods = !self.is_server() && mods.iter().any(|m| m.mod_type == ModType::Jar);

        self.state.mods = mods;
        self.state.mod_sizes = sizes;
        self.state.memory_mb = memory;
        self.state.jar_mods = jar_mods;
        self.state.version_json = Some(version_json);
        Ok(())
    }

    async fn backup_user_files(&mut self) -> LauncherResult<()> {
        if !self.session.is_reinstall() {
            return Ok(());
        }
        let keeps = self.pack_version()?.keeps.clone();
        self.state.backup = Some(UserFileBackup::create(self.instance_dir(), &keeps).await?);
        Ok(())
    }

    async fn create_directories(&mut self) -> LauncherResult<()> {
        let minecraft = self.version_json()?.id.clone();
        let has_overlay = self.pack_version()?.configs.is_some();
        let mut manifest = match &self.state.previous {
            Some(previous) => previous.reinstall(&self.request.version, &minecraft, self.side()),
            None => InstanceManifest::new(&self.request.pack, &self.request.version, &minecraft, self.side()),
        };
        self.manager.mark_corrupt(&mut manifest).await?;

        let dir = self.instance_dir().to_path_buf();
        if let Some(previous) = &self.state.previous {
            for installed in &previous.mods {
                let m = Mod {
                    name: installed.name.clone(),
                    file: installed.file.clone(),
                    mod_type: installed.mod_type,
                    ..Mod::default()
                };
                if let Placement::Copy(path) = m.mod_type.placement(&m, &dir, &previous.minecraft_version) {
                    if path.is_file() {
                        debug!("Removing previously installed {}", path.display());
                        if let Err(e) = tokio::fs::remove_file(&path).await {
                            warn!("Could not remove {}: {}", path.display(), e);
                        }
                    }
                }
            }

            let mut wiped = vec!["jarmods", "bin", "natives", TEMP_DIR];
            if has_overlay {
                wiped.push("config");
            }
            for name in wiped {
                let path = dir.join(name);
                if path.exists() {
                    tokio::fs::remove_dir_all(&path)
                        .await
                        .map_err(|e| LauncherError::io(&path, e))?;
                }
            }
        }

        let mut dirs = vec!["mods", "config", TEMP_DIR];
        if self.is_server() {
            dirs.push("libraries");
        } else {
            dirs.extend(["bin", "natives", "jarmods", "resourcepacks"]);
        }
        for name in dirs {
            let path = dir.join(name);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| LauncherError::io(&path, e))?;
        }

        self.state.manifest = Some(manifest);
        Ok(())
    }

    async fn sync_assets(&mut self) -> LauncherResult<()> {
        let version_json = self.version_json()?;
        let assets_dir = self.config.assets_dir();
        let Some(info) = &version_json.asset_index else {
            debug!("Version {} has no asset index", version_json.id);
            return Ok(());
        };

        let resolver = AssetResolver {
            assets_dir: &assets_dir,
            resources_url: &self.config.endpoints.resources,
            instance_dir: self.instance_dir(),
        };
        let index = resolver.fetch_index(&self.cache, info).await?;
        let mut units = resolver.units(&info.id, &index);
        units.extend(version_json.logging_unit(&assets_dir));

        self.run_pool(units).await?;
        Ok(())
    }

    async fn sync_libraries(&mut self) -> LauncherResult<()> {
        let version_json = self.version_json()?;
        let is_server = self.is_server();

        let jar_unit = version_json.jar_unit(&self.config.versions_dir(), is_server)?;
        let minecraft_jar = jar_unit.dest.clone();
        let mut units = vec![jar_unit];

        let libraries_dir = if is_server {
            self.instance_dir().join("libraries")
        } else {
            self.config.libraries_dir()
        };
        let mut resolver = LibraryResolver::new(&libraries_dir, &self.config.endpoints.libraries);
        if !is_server {
            resolver = resolver.with_natives(
                self.instance_dir().join("natives"),
                self.config.use_system_glfw,
                self.config.use_system_openal,
            );
        }
        let resolved = resolver.resolve(&version_json.libraries)?;
        let vanilla_classpath = resolved.classpath();
        units.extend(resolved.into_units());

        let mut loader_classpath = Vec::new();
        let mut loader_state = None;
        if let Some(descriptor) = self.pack_version()?.loader.clone() {
            let ctx = LoaderContext {
                config: self.config.clone(),
                fetch: self.fetch.clone(),
                descriptor,
                minecraft_version: version_json.id.clone(),
                instance_dir: self.instance_dir().to_path_buf(),
                temp_dir: self.temp_dir().join("loader"),
                minecraft_jar: minecraft_jar.clone(),
                is_server,
            };
            let mut loader = Loader::for_context(&ctx);
            loader.download_and_extract_installer(&ctx).await?;
            for library in loader.get_libraries(&ctx)? {
                if !library.install_only {
                    loader_classpath.push(library.unit.dest.clone());
                }
                units.push(library.unit);
            }
            loader_state = Some((loader, ctx));
        }

        self.run_pool(units).await?;

        if let Some((loader, ctx)) = loader_state {
            self.state.loader = Some(loader);
            self.state.loader_ctx = Some(ctx);
        }
        self.state.minecraft_jar = Some(minecraft_jar);
        self.state.vanilla_classpath = vanilla_classpath;
        self.state.loader_classpath = loader_classpath;
        Ok(())
    }

    async fn organize_libraries(&mut self) -> LauncherResult<()> {
        let version_json = self.version_json()?;
        let minecraft_jar = self
            .state
            .minecraft_jar
            .clone()
            .ok_or_else(|| LauncherError::Other("Game jar not downloaded".into()))?;
        let dir = self.instance_dir().to_path_buf();

        let instance_jar = if self.is_server() {
            dir.join(format!("minecraft_server.{}.jar", version_json.id))
        } else {
            dir.join("bin").join("minecraft.jar")
        };
        copy_file(&minecraft_jar, &instance_jar).await?;

        let pack_version = self.pack_version()?;
        let (use_vanilla_libraries, use_vanilla_arguments, loader_args, loader_main) = match &self.state.loader {
            Some(loader) => (
                loader.use_minecraft_libraries(),
                loader.use_minecraft_arguments(),
                loader.get_arguments(),
                loader.get_main_class(),
            ),
            None => (true, true, Default::default(), None),
        };

        let mut classpath = self.state.loader_classpath.clone();
        if use_vanilla_libraries {
            classpath.extend(self.state.vanilla_classpath.iter().cloned());
        }
        if !self.is_server() {
            classpath.push(instance_jar.clone());
        }

        let mut game_args = if use_vanilla_arguments {
            version_json.game_arguments()
        } else {
            Vec::new()
        };
        game_args.extend(loader_args.game);
        if let Some(extra) = &pack_version.extra_arguments {
            game_args.extend(extra.split_whitespace().map(str::to_string));
        }
        let mut jvm_args = version_json.jvm_arguments();
        jvm_args.extend(loader_args.jvm);

        let main_class = loader_main
            .or_else(|| pack_version.main_class.clone())
            .or_else(|| version_json.main_class.clone());

        let server_launch = if self.is_server() {
            Some(self.server_launch(&instance_jar).await?)
        } else {
            None
        };

        self.state.classpath = classpath;
        self.state.game_args = game_args;
        self.state.jvm_args = jvm_args;
        self.state.main_class = main_class;
        self.state.server_launch = server_launch;

        // Processors need every library in place, so they run last.
        if let (Some(loader), Some(ctx)) = (&self.state.loader, &self.state.loader_ctx) {
            loader.copy_local_libraries(ctx).await?;
            self.session.ensure_active()?;
            loader.run_processors(ctx).await?;
        }
        Ok(())
    }

    /// Which jar or args file starts the server, copying a loader-provided
    /// jar into the instance root.
    async fn server_launch(&self, vanilla_jar: &Path) -> LauncherResult<ServerLaunch> {
        let dir = self.instance_dir();
        let relative = |p: &Path| {
            p.strip_prefix(dir)
                .unwrap_or(p)
                .to_string_lossy()
                .replace('\\', "/")
        };

        let (Some(loader), Some(ctx)) = (&self.state.loader, &self.state.loader_ctx) else {
            return Ok(ServerLaunch::Jar(relative(vanilla_jar)));
        };

        if let Some(jar) = loader.get_server_jar(ctx) {
            if jar.starts_with(dir) && !jar.starts_with(self.temp_dir()) {
                return Ok(ServerLaunch::Jar(relative(&jar)));
            }
            let name = jar
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "server.jar".into());
            copy_file(&jar, &dir.join(&name)).await?;
            return Ok(ServerLaunch::Jar(name));
        }

        let args_dir = format!(
            "libraries/{}/{}/{}",
            ctx.descriptor.kind.group().replace('.', "/"),
            ctx.descriptor.kind.artifact(),
            ctx.descriptor.raw_version
        );
        if !loader.is_legacy() && dir.join(&args_dir).join("unix_args.txt").exists() {
            return Ok(ServerLaunch::ArgsFiles {
                unix: format!("{}/unix_args.txt", args_dir),
                windows: format!("{}/win_args.txt", args_dir),
            });
        }
        Ok(ServerLaunch::Jar(relative(vanilla_jar)))
    }

    async fn extract_game_jar(&mut self) -> LauncherResult<()> {
        let legacy = self.state.loader.as_ref().is_some_and(|l| l.is_legacy());
        if !legacy && !self.state.jar_mods {
            return Ok(());
        }
        let game_jar = self.instance_dir().join("bin").join("minecraft.jar");
        let target = self.temp_dir().join("jar");
        if target.exists() {
            tokio::fs::remove_dir_all(&target)
                .await
                .map_err(|e| LauncherError::io(&target, e))?;
        }
        extract_archive(&game_jar, &target, &strip_signatures()).await?;
        self.state.jar_mods = true;
        Ok(())
    }

    async fn sync_mods(&mut self) -> LauncherResult<()> {
        let pack_version = self.pack_version()?;
        let resolver = self.pack_resolver();
        let downloads_dir = self.config.downloads_dir();
        let planner = ModPlanner {
            resolver: &resolver,
            instance_dir: self.instance_dir(),
            downloads_dir: &downloads_dir,
            browser_dir: self.config.browser_downloads_dir.as_deref(),
            minecraft: &pack_version.minecraft,
        };
        let plan = planner.plan(self.state.mods.clone(), &self.state.mod_sizes)?;
        plan.stage_browser_copies().await?;

        for m in &plan.mods {
            self.session.ensure_active()?;
            debug!("Queued mod {} {}", m.name, m.version);
        }
        self.run_pool(plan.units).await?;

        if self.config.scan_mods {
            let dir = self.instance_dir();
            let scanned = ["mods", "coremods", "jarmods", "plugins"]
                .iter()
                .map(|d| dir.join(d))
                .collect();
            scan_for_malware(scanned).await?;
        }
        self.state.mods = plan.mods;
        Ok(())
    }

    async fn apply_case_conversions(&mut self) -> LauncherResult<()> {
        let Some(conversion) = self.pack_version()?.case_all_files else {
            return Ok(());
        };
        let mods_dir = self.instance_dir().join("mods");
        for m in self.state.mods.iter_mut().filter(|m| m.mod_type == ModType::Mods) {
            let converted = conversion.apply(&m.file);
            if converted == m.file {
                continue;
            }
            let from = mods_dir.join(&m.file);
            let to = mods_dir.join(&converted);
            if from.exists() {
                tokio::fs::rename(&from, &to)
                    .await
                    .map_err(|e| LauncherError::io(&from, e))?;
            }
            m.file = converted;
        }
        Ok(())
    }

    async fn repackage_jar_mods(&mut self) -> LauncherResult<()> {
        if !self.state.jar_mods {
            return Ok(());
        }
        let dir = self.instance_dir().to_path_buf();
        let mut jar_mods = Vec::new();
        if let (Some(Loader::Legacy(legacy)), Some(ctx)) = (&self.state.loader, &self.state.loader_ctx) {
            jar_mods.extend(legacy.archive_path(ctx));
        }
        for m in self.state.mods.iter().filter(|m| m.mod_type == ModType::Jar) {
            if let Placement::Copy(path) = m.mod_type.placement(m, &dir, &self.version_json()?.id) {
                jar_mods.push(path);
            }
        }

        let staging = self.temp_dir().join("jar");
        for jar_mod in &jar_mods {
            self.session.ensure_active()?;
            extract_archive(jar_mod, &staging, &strip_signatures()).await?;
        }

        let game_jar = dir.join("bin").join("minecraft.jar");
        tokio::task::spawn_blocking(move || zip_directory(&staging, &game_jar)).await??;
        info!("Merged {} jar mods into the game jar", jar_mods.len());
        Ok(())
    }

    async fn repackage_resource_packs(&mut self) -> LauncherResult<()> {
        let dir = self.instance_dir().to_path_buf();
        let pairs = [
            (ModType::Resourcepackextract, "resourcepacks"),
            (ModType::Texturepackextract, "texturepacks"),
        ];
        for (mod_type, out) in pairs {
            let Some(staging) = mod_type.repack_dir(&dir) else {
                continue;
            };
            if !staging.is_dir() {
                continue;
            }
            let out_dir = dir.join(out);
            tokio::task::spawn_blocking(move || -> LauncherResult<()> {
                let mut packs: Vec<_> = std::fs::read_dir(&staging)
                    .map_err(|e| LauncherError::io(&staging, e))?
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.is_dir())
                    .collect();
                packs.sort();
                for pack in packs {
                    let name = pack
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    zip_directory(&pack, &out_dir.join(format!("{}.zip", name)))?;
                    debug!("Repackaged {}", name);
                }
                Ok(())
            })
            .await??;
        }
        Ok(())
    }

    fn run_actions(&mut self) -> LauncherResult<()> {
        let actions = &self.pack_version()?.actions;
        if actions.is_empty() {
            return Ok(());
        }
        let runner = ActionRunner {
            instance_dir: self.instance_dir(),
            minecraft: &self.version_json()?.id,
            is_server: self.is_server(),
            installed: &self.state.mods,
        };
        let ran = runner.run_all(actions)?;
        debug!("Ran {} of {} actions", ran, actions.len());
        Ok(())
    }

    async fn apply_config_overlay(&mut self) -> LauncherResult<()> {
        let unit = self.pack_resolver().config_overlay_unit(
            self.pack_version()?,
            self.instance_dir(),
            &self.config.downloads_dir(),
        );
        if let Some(unit) = unit {
            self.run_pool(vec![unit]).await?;
        }
        Ok(())
    }

    async fn restore_user_files(&mut self) -> LauncherResult<()> {
        if let Some(backup) = self.state.backup.take() {
            let restored = backup.restore().await?;
            debug!("Restored {} user files", restored);
        }
        Ok(())
    }

    async fn write_scripts(&mut self) -> LauncherResult<()> {
        let launch = self
            .state
            .server_launch
            .clone()
            .ok_or_else(|| LauncherError::Other("Server launch target not resolved".into()))?;
        let extra = self.pack_version()?.extra_arguments.clone().unwrap_or_default();
        write_server_scripts(self.instance_dir(), &launch, self.state.memory_mb, &extra).await
    }

    async fn finish(&mut self) -> LauncherResult<()> {
        let libraries_dir = self.config.libraries_dir();
        let dir = self.instance_dir().to_path_buf();
        let libraries = self
            .state
            .classpath
            .iter()
            .map(|p| {
                p.strip_prefix(&libraries_dir)
                    .or_else(|_| p.strip_prefix(&dir))
                    .unwrap_or(p)
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        let loader = self.pack_version()?.loader.as_ref().map(|d| InstalledLoader {
            kind: d.kind,
            version: d.version.clone(),
            raw_version: d.raw_version.clone(),
        });

        let mut manifest = self
            .state
            .manifest
            .take()
            .ok_or_else(|| LauncherError::Other("Instance manifest missing".into()))?;
        manifest.loader = loader;
        manifest.mods = self.state.mods.iter().map(InstalledMod::from).collect();
        manifest.libraries = libraries;
        manifest.main_class = self.state.main_class.clone();
        manifest.jvm_args = self.state.jvm_args.clone();
        manifest.game_args = self.state.game_args.clone();
        manifest.max_memory_mb = self.state.memory_mb;
        manifest.is_corrupt = false;
        self.manager.save(&mut manifest).await?;

        let temp = self.temp_dir();
        if temp.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&temp).await {
                warn!("Could not remove {}: {}", temp.display(), e);
            }
        }
        self.state.manifest = Some(manifest);
        Ok(())
    }
}

fn strip_signatures() -> ExtractRules {
    ExtractRules::excluding(vec!["META-INF/".into()])
}

async fn copy_file(from: &Path, to: &Path) -> LauncherResult<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::io(parent, e))?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| LauncherError::io(to, e))?;
    Ok(())
}
