use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use packsmith_lib::core::config::{default_data_dir, InstallerConfig, SETTINGS_FILE};
use packsmith_lib::core::error::{LauncherError, LauncherResult};
use packsmith_lib::core::http::build_http_client;
use packsmith_lib::core::install::{InstallRequest, InstanceInstaller, ProgressSink};
use packsmith_lib::core::instance::InstanceManager;
use packsmith_lib::core::integrity::HttpCache;
use packsmith_lib::core::loaders::{list_loader_versions, LoaderKind};

#[derive(Parser)]
#[command(name = "packsmith", version, about = "Install and update modpack instances")]
struct Cli {
    /// Settings file; defaults to the one in the data directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or update a pack version into an instance directory.
    Install {
        pack: String,
        version: String,
        dir: PathBuf,
        #[arg(long)]
        server: bool,
        /// Fail unless `dir` already holds an installed instance.
        #[arg(long)]
        reinstall: bool,
        /// Optional mod to include, by name. Repeatable.
        #[arg(long = "optional", value_name = "NAME")]
        optional: Vec<String>,
    },
    /// List loader builds published for a Minecraft version.
    LoaderVersions { loader: String, minecraft: String },
}

/// Progress bar over the run-wide percentage, with the current stage and its
/// own progress as the message.
struct BarProgress {
    bar: ProgressBar,
    label: Mutex<String>,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% | {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            label: Mutex::new(String::new()),
        }
    }
}

impl ProgressSink for BarProgress {
    fn set_label(&self, label: &str) {
        if let Ok(mut current) = self.label.lock() {
            *current = label.to_string();
        }
        self.bar.set_message(label.to_string());
    }

    fn set_total_bytes(&self, _total: u64) {}

    fn done_task(&self) {}

    fn add_downloaded_bytes(&self, _bytes: u64) {}

    fn set_percent(&self, percent: u8) {
        self.bar.set_position(u64::from(percent));
    }

    fn set_sub_percent(&self, percent: u8) {
        if let Ok(label) = self.label.lock() {
            if percent > 0 {
                self.bar.set_message(format!("{} ({}%)", label, percent));
            }
        }
    }
}

fn load_config(path: Option<PathBuf>) -> LauncherResult<InstallerConfig> {
    let path = path.unwrap_or_else(|| default_data_dir().join(SETTINGS_FILE));
    InstallerConfig::load(&path)
}

async fn run(cli: Cli) -> LauncherResult<()> {
    let config = Arc::new(load_config(cli.config)?);

    match cli.command {
        Commands::Install {
            pack,
            version,
            dir,
            server,
            reinstall,
            optional,
        } => {
            if reinstall {
                InstanceManager::new(&dir).require().await?;
            }
            let progress = Arc::new(BarProgress::new());
            let request = InstallRequest {
                pack,
                version,
                instance_dir: dir,
                is_server: server,
                optional_mods: optional,
            };
            let installer = InstanceInstaller::new(config, request, progress.clone())?;

            let session = installer.session();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling install");
                    session.cancel();
                }
            });

            let result = installer.install().await;
            progress.bar.finish_and_clear();
            let outcome = result?;
            println!(
                "Installed {} {} (Minecraft {}), {} files downloaded",
                outcome.manifest.pack,
                outcome.manifest.version,
                outcome.manifest.minecraft_version,
                outcome.network_fetches
            );
        }
        Commands::LoaderVersions { loader, minecraft } => {
            let kind = LoaderKind::parse(&loader).ok_or_else(|| {
                LauncherError::Loader(format!("Unknown loader {}", loader))
            })?;
            let client = build_http_client(&config)?;
            let cache = HttpCache::new(
                config.cache_dir(),
                client,
                Duration::from_secs(config.document_cache_max_age_secs),
            );
            for descriptor in list_loader_versions(&cache, &config.endpoints, kind, &minecraft).await? {
                let marker = if descriptor.recommended { " (recommended)" } else { "" };
                println!("{}{}", descriptor.version, marker);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    packsmith_lib::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
