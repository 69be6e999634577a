use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use super::context::LoaderContext;
use super::descriptor::ArtifactRole;
use super::strategy::{LoaderArguments, LoaderLibrary, LoaderStrategy};
use crate::core::download::{FetchPool, FetchUnit};
use crate::core::error::LauncherResult;

/// Libraries FML fetched on first start before 1.6. Servers hosting them
/// disappeared long ago, so they are placed in `lib/` up front.
const FML_LIBS_1_5: &[(&str, &str)] = &[
    ("argo-small-3.2.jar", "58912ea2858d168c50781f956fa5b59f0f7c6b51"),
    ("guava-14.0-rc3.jar", "931ae21fa8014c3ce686aaa621eae565fefb1a6a"),
    ("asm-all-4.1.jar", "054986e962b88d8660ae4566475658469595ef58"),
    ("bcprov-jdk15on-148.jar", "960dea7c9181ba0b17e8bab0c06a43f0a5f04e65"),
    ("scala-library.jar", "458d046151ad179c85429ed7420ffb1eaf6ddf85"),
];

const FML_LIBS_1_4: &[(&str, &str)] = &[
    ("argo-2.25.jar", "bb672829fde76cb163004752b86b0484bd0a7f4b"),
    ("guava-12.0.1.jar", "b8e78b9af7bf45900e14c6f958486b6ca682195f"),
    ("asm-all-4.0.jar", "98308890597acb64047f7e896638e0d98753ae82"),
    ("bcprov-jdk15on-147.jar", "b6f5d9926b0afbde9f4dbe3db88c5247be7794bb"),
];

fn deobfuscation_data(minecraft_version: &str) -> Option<(&'static str, &'static str)> {
    match minecraft_version {
        "1.5.2" => Some((
            "deobfuscation_data_1.5.2.zip",
            "446e55cd986582c70fcf12cb27bc00114c5adfd9",
        )),
        "1.5.1" => Some((
            "deobfuscation_data_1.5.1.zip",
            "22e221a0d89516c1f721d6cab056a7e37471d0a6",
        )),
        "1.5" => Some((
            "deobfuscation_data_1.5.zip",
            "5f7c142d53776f16304c0bbe10542014abad6af8",
        )),
        _ => None,
    }
}

fn static_libraries(minecraft_version: &str) -> Vec<(&'static str, &'static str)> {
    if minecraft_version.starts_with("1.5") {
        let mut libs = FML_LIBS_1_5.to_vec();
        libs.extend(deobfuscation_data(minecraft_version));
        libs
    } else if minecraft_version.starts_with("1.4") {
        FML_LIBS_1_4.to_vec()
    } else {
        Vec::new()
    }
}

/// Pre-1.6 Forge: a jar mod merged into the game jar on the client, or a
/// standalone server jar, plus the FML support libraries.
#[derive(Default)]
pub struct LegacyLoader;

impl LegacyLoader {
    pub fn new() -> Self {
        Self
    }

    /// Everything a legacy install needs: the loader archive and the static
    /// FML libraries.
    pub fn planned_downloads(&self, ctx: &LoaderContext) -> Vec<FetchUnit> {
        let descriptor = &ctx.descriptor;
        let side_role = if ctx.is_server {
            ArtifactRole::Server
        } else {
            ArtifactRole::Client
        };
        // Universal builds run on both sides and are preferred when published.
        let role = if descriptor.downloadables.is_empty()
            || descriptor.downloadable(ArtifactRole::Universal).is_some()
        {
            ArtifactRole::Universal
        } else {
            side_role
        };
        let extension = if ctx.is_server { "jar" } else { "zip" };
        let file_name = descriptor.file_name(role, extension);

        let placed = if ctx.is_server {
            ctx.instance_dir.join(&file_name)
        } else {
            ctx.instance_dir.join("jarmods").join(&file_name)
        };
        // `jarmods/` is recreated on reinstall, so the archive itself lives
        // in the download cache.
        let mut archive = FetchUnit::new(
            descriptor.url(&ctx.config.endpoints, role, extension),
            ctx.config.downloads_dir().join(&file_name),
        )
        .copy_to(placed);
        if let Some(known) = descriptor.downloadable(role) {
            archive = archive.with_hash(&known.hash).with_size(known.size);
        }

        let base = ctx.config.endpoints.fml_libraries.trim_end_matches('/');
        let lib_dir = ctx.instance_dir.join("lib");
        std::iter::once(archive)
            .chain(
                static_libraries(&ctx.minecraft_version)
                    .into_iter()
                    .map(|(name, sha1)| {
                        FetchUnit::new(format!("{}/{}", base, name), lib_dir.join(name))
                            .with_hash(sha1)
                    }),
            )
            .collect()
    }

    /// Where the loader archive lands: the jar mod on clients, the server
    /// jar on servers.
    pub fn archive_path(&self, ctx: &LoaderContext) -> Option<PathBuf> {
        self.planned_downloads(ctx).into_iter().next().and_then(|u| u.copy_to)
    }
}

#[async_trait]
impl LoaderStrategy for LegacyLoader {
    async fn download_and_extract_installer(&mut self, ctx: &LoaderContext) -> LauncherResult<()> {
        ctx.ensure_active()?;
        info!(
            "Installing legacy {} {} for Minecraft {}",
            ctx.descriptor.kind, ctx.descriptor.version, ctx.minecraft_version
        );

        let mut pool = FetchPool::new();
        pool.add_all(self.planned_downloads(ctx));
        let pool = pool.downsize(&ctx.fetch).await?;
        debug!("{} legacy loader files to fetch", pool.len());
        pool.download_all(&ctx.fetch).await?.into_result()?;
        Ok(())
    }

    async fn copy_local_libraries(&self, _ctx: &LoaderContext) -> LauncherResult<()> {
        Ok(())
    }

    async fn run_processors(&self, _ctx: &LoaderContext) -> LauncherResult<()> {
        Ok(())
    }

    fn get_libraries(&self, _ctx: &LoaderContext) -> LauncherResult<Vec<LoaderLibrary>> {
        Ok(Vec::new())
    }

    fn get_arguments(&self) -> LoaderArguments {
        LoaderArguments::default()
    }

    fn get_main_class(&self) -> Option<String> {
        None
    }

    fn get_server_jar(&self, ctx: &LoaderContext) -> Option<PathBuf> {
        if ctx.is_server {
            self.archive_path(ctx)
        } else {
            None
        }
    }

    fn use_minecraft_libraries(&self) -> bool {
        true
    }

    fn use_minecraft_arguments(&self) -> bool {
        true
    }
}
