use std::path::Path;

use tracing::info;

use crate::core::download::unit::set_executable;
use crate::core::error::{LauncherError, LauncherResult};

/// How a server is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLaunch {
    /// `java -jar <jar>`, path relative to the instance.
    Jar(String),
    /// `java @<args file>`, one file per platform, relative to the instance.
    ArgsFiles { unix: String, windows: String },
}

fn java_line(launch: &ServerLaunch, memory_mb: Option<u32>, extra: &str, windows: bool) -> String {
    let mut parts = vec!["java".to_string()];
    if let Some(mb) = memory_mb {
        parts.push(format!("-Xmx{}M", mb));
    }
    parts.extend(extra.split_whitespace().map(str::to_string));
    match launch {
        ServerLaunch::Jar(jar) => {
            parts.push("-jar".into());
            parts.push(jar.clone());
        }
        ServerLaunch::ArgsFiles { unix, windows: win } => {
            let file = if windows { win } else { unix };
            parts.push(format!("@{}", file));
        }
    }
    parts.push("nogui".into());
    parts.join(" ")
}

/// Write `LaunchServer.sh` (executable) and `LaunchServer.bat`.
pub async fn write_server_scripts(
    instance_dir: &Path,
    launch: &ServerLaunch,
    memory_mb: Option<u32>,
    extra_arguments: &str,
) -> LauncherResult<()> {
    let sh = format!(
        "#!/usr/bin/env sh\ncd \"$(dirname \"$0\")\"\n{} \"$@\"\n",
        java_line(launch, memory_mb, extra_arguments, false)
    );
    let bat = format!(
        "@echo off\r\ncd /d \"%~dp0\"\r\n{} %*\r\npause\r\n",
        java_line(launch, memory_mb, extra_arguments, true)
    );

    let sh_path = instance_dir.join("LaunchServer.sh");
    tokio::fs::write(&sh_path, sh)
        .await
        .map_err(|e| LauncherError::io(&sh_path, e))?;
    set_executable(&sh_path)?;

    let bat_path = instance_dir.join("LaunchServer.bat");
    tokio::fs::write(&bat_path, bat)
        .await
        .map_err(|e| LauncherError::io(&bat_path, e))?;

    info!("Wrote server launch scripts in {}", instance_dir.display());
    Ok(())
}
