use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::core::error::{LauncherError, LauncherResult};

/// Entry paths dropped into infected jars by known mod malware families.
const MALICIOUS_ENTRIES: &[&str] = &[
    "dev/neko/nekoinjector/",
    "dev/neko/nekoclient/",
    "net/java/h.class",
    "net/java/i.class",
    "net/java/l.class",
];

/// Byte strings found in infected classes: command and control hosts and
/// their obfuscated forms.
const MALICIOUS_MARKERS: &[&[u8]] = &[
    b"85.217.144.130",
    b"107.189.3.101",
    b"files-8ie.pages.dev",
    b"-74.-10.78.-106.12",
];

fn scan_archive(path: &Path) -> LauncherResult<Option<String>> {
    let file = File::open(path).map_err(|e| LauncherError::io(path, e))?;
    let Ok(mut archive) = zip::ZipArchive::new(file) else {
        debug!("{} is not a zip archive, not scanned", path.display());
        return Ok(None);
    };

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if let Some(sig) = MALICIOUS_ENTRIES.iter().find(|s| name.starts_with(**s)) {
            return Ok(Some(sig.to_string()));
        }
        if !name.ends_with(".class") {
            continue;
        }
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| LauncherError::io(path, e))?;
        for marker in MALICIOUS_MARKERS {
            if bytes.windows(marker.len()).any(|w| w == *marker) {
                return Ok(Some(String::from_utf8_lossy(marker).to_string()));
            }
        }
    }
    Ok(None)
}

fn collect_archives(dir: &Path, out: &mut Vec<PathBuf>) -> LauncherResult<()> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries {
        let path = entry.map_err(|e| LauncherError::io(dir, e))?.path();
        if path.is_dir() {
            collect_archives(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jar") || e.eq_ignore_ascii_case("zip"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Scan every jar and zip under `dirs`. The first infected file is deleted
/// and reported as `MaliciousContent`.
pub async fn scan_for_malware(dirs: Vec<PathBuf>) -> LauncherResult<usize> {
    tokio::task::spawn_blocking(move || {
        let mut archives = Vec::new();
        for dir in &dirs {
            collect_archives(dir, &mut archives)?;
        }
        for path in &archives {
            if let Some(signature) = scan_archive(path)? {
                error!(file = %path.display(), signature = %signature, "Malicious content found");
                let _ = std::fs::remove_file(path);
                return Err(LauncherError::MaliciousContent {
                    path: path.clone(),
                    signature,
                });
            }
        }
        debug!("Scanned {} archives, nothing found", archives.len());
        Ok(archives.len())
    })
    .await?
}
