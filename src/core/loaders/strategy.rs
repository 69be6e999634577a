use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::context::LoaderContext;
use super::legacy::LegacyLoader;
use super::modern::ModernLoader;
use crate::core::download::FetchUnit;
use crate::core::error::LauncherResult;

/// A library a loader needs in the shared store.
#[derive(Debug, Clone)]
pub struct LoaderLibrary {
    pub unit: FetchUnit,
    /// Only needed by install processors, not at launch.
    pub install_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderArguments {
    pub game: Vec<String>,
    pub jvm: Vec<String>,
}

/// One generation of mod loader installation.
///
/// The orchestrator calls `download_and_extract_installer` first, fetches
/// whatever `get_libraries` returns, then `copy_local_libraries` and
/// `run_processors`. The remaining getters describe the installed result.
#[async_trait]
pub trait LoaderStrategy: Send + Sync {
    async fn download_and_extract_installer(&mut self, ctx: &LoaderContext) -> LauncherResult<()>;

    async fn copy_local_libraries(&self, ctx: &LoaderContext) -> LauncherResult<()>;

    async fn run_processors(&self, ctx: &LoaderContext) -> LauncherResult<()>;

    fn get_libraries(&self, ctx: &LoaderContext) -> LauncherResult<Vec<LoaderLibrary>>;

    fn get_arguments(&self) -> LoaderArguments;

    fn get_main_class(&self) -> Option<String>;

    /// Jar a server is started with, when the loader provides one. `None`
    /// means the vanilla server jar or an args file is used instead.
    fn get_server_jar(&self, ctx: &LoaderContext) -> Option<PathBuf>;

    /// Whether the vanilla library list stays on the classpath.
    fn use_minecraft_libraries(&self) -> bool;

    /// Whether vanilla game arguments are kept alongside the loader's.
    fn use_minecraft_arguments(&self) -> bool;
}

/// Dispatcher sin Box<dyn>
pub enum Loader {
    Modern(ModernLoader),
    Legacy(LegacyLoader),
}

impl Loader {
    pub fn for_context(ctx: &LoaderContext) -> Self {
        if ctx.descriptor.is_legacy(&ctx.minecraft_version) {
            Self::Legacy(LegacyLoader::new())
        } else {
            Self::Modern(ModernLoader::new())
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

#[async_trait]
impl LoaderStrategy for Loader {
    async fn download_and_extract_installer(&mut self, ctx: &LoaderContext) -> LauncherResult<()> {
        match self {
            Loader::Modern(l) => l.download_and_extract_installer(ctx).await,
            Loader::Legacy(l) => l.download_and_extract_installer(ctx).await,
        }
    }

    async fn copy_local_libraries(&self, ctx: &LoaderContext) -> LauncherResult<()> {
        match self {
            Loader::Modern(l) => l.copy_local_libraries(ctx).await,
            Loader::Legacy(l) => l.copy_local_libraries(ctx).await,
        }
    }

    async fn run_processors(&self, ctx: &LoaderContext) -> LauncherResult<()> {
        match self {
            Loader::Modern(l) => l.run_processors(ctx).await,
            Loader::Legacy(l) => l.run_processors(ctx).await,
        }
    }

    fn get_libraries(&self, ctx: &LoaderContext) -> LauncherResult<Vec<LoaderLibrary>> {
        match self {
            Loader::Modern(l) => l.get_libraries(ctx),
            Loader::Legacy(l) => l.get_libraries(ctx),
        }
    }

    fn get_arguments(&self) -> LoaderArguments {
        match self {
            Loader::Modern(l) => l.get_arguments(),
            Loader::Legacy(l) => l.get_arguments(),
        }
    }

    fn get_main_class(&self) -> Option<String> {
        match self {
            Loader::Modern(l) => l.get_main_class(),
            Loader::Legacy(l) => l.get_main_class(),
        }
    }

    fn get_server_jar(&self, ctx: &LoaderContext) -> Option<PathBuf> {
        match self {
            Loader::Modern(l) => l.get_server_jar(ctx),
            Loader::Legacy(l) => l.get_server_jar(ctx),
        }
    }

    fn use_minecraft_libraries(&self) -> bool {
        match self {
            Loader::Modern(l) => l.use_minecraft_libraries(),
            Loader::Legacy(l) => l.use_minecraft_libraries(),
        }
    }

    fn use_minecraft_arguments(&self) -> bool {
        match self {
            Loader::Modern(l) => l.use_minecraft_arguments(),
            Loader::Legacy(l) => l.use_minecraft_arguments(),
        }
    }
}
