use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;

use crate::core::error::{LauncherError, LauncherResult};

/// How an archive is unpacked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractRules {
    /// Entry prefixes or glob patterns that are skipped.
    pub exclude: Vec<String>,
    /// Drop directory structure, except under `META-INF/`.
    pub flatten: bool,
}

impl ExtractRules {
    pub fn excluding(exclude: Vec<String>) -> Self {
        Self {
            exclude,
            flatten: false,
        }
    }

    pub fn flattened(mut self) -> Self {
        self.flatten = true;
        self
    }

    pub fn is_excluded(&self, entry: &str) -> bool {
        self.exclude.iter().any(|pattern| {
            entry.starts_with(pattern.as_str())
                || glob::Pattern::new(pattern).is_ok_and(|p| p.matches(entry))
        })
    }

    fn target_for(&self, entry: &str) -> Option<PathBuf> {
        if !self.flatten || entry.starts_with("META-INF/") {
            return Some(PathBuf::from(entry));
        }
        Path::new(entry).file_name().map(PathBuf::from)
    }
}

/// Unpack `archive` into `dest`. Returns the number of files written.
pub async fn extract_archive(archive: &Path, dest: &Path, rules: &ExtractRules) -> LauncherResult<usize> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    let rules = rules.clone();
    tokio::task::spawn_blocking(move || extract_archive_blocking(&archive, &dest, &rules)).await?
}

pub fn extract_archive_blocking(archive: &Path, dest: &Path, rules: &ExtractRules) -> LauncherResult<usize> {
    let file = File::open(archive).map_err(|e| LauncherError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)?;
    std::fs::create_dir_all(dest).map_err(|e| LauncherError::io(dest, e))?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let name = name.to_string_lossy().replace('\\', "/");

        if rules.is_excluded(&name) {
            continue;
        }

        if entry.is_dir() {
            if !rules.flatten {
                let dir = dest.join(&name);
                std::fs::create_dir_all(&dir).map_err(|e| LauncherError::io(&dir, e))?;
            }
            continue;
        }

        let Some(relative) = rules.target_for(&name) else {
            continue;
        };
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }

        let mut out = File::create(&target).map_err(|e| LauncherError::io(&target, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&target, e))?;
        written += 1;
    }

    debug!("Extracted {} files from {:?} into {:?}", written, archive, dest);
    Ok(written)
}

/// Zip the contents of `source_dir` into `dest` with paths relative to the
/// directory. Entries are written in sorted order so repeated runs produce the
/// same archive.
pub fn zip_directory(source_dir: &Path, dest: &Path) -> LauncherResult<()> {
    let mut files = Vec::new();
    collect_files(source_dir, source_dir, &mut files)?;
    files.sort();

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
    }
    let out = File::create(dest).map_err(|e| LauncherError::io(dest, e))?;
    let mut writer = zip::ZipWriter::new(out);
    let options = SimpleFileOptions::default().last_modified_time(zip::DateTime::default());

    for relative in files {
        let path = source_dir.join(&relative);
        let mut bytes = Vec::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|e| LauncherError::io(&path, e))?;
        writer.start_file(relative, options)?;
        writer.write_all(&bytes).map_err(|e| LauncherError::io(dest, e))?;
    }

    writer.finish()?;
    Ok(())
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> LauncherResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| LauncherError::io(dir, e))? {
        let entry = entry.map_err(|e| LauncherError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::zip_bytes;

    fn write_archive(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("archive.zip");
        std::fs::write(&path, zip_bytes(entries)).unwrap();
        path
    }

    #[test]
    fn exclusions_accept_prefixes_and_globs() {
        let rules = ExtractRules::excluding(vec!["META-INF/".into(), "*.sha1".into()]);
        assert!(rules.is_excluded("META-INF/MANIFEST.MF"));
        assert!(rules.is_excluded("liblwjgl.so.sha1"));
        assert!(!rules.is_excluded("liblwjgl.so"));
    }

    #[tokio::test]
    async fn extraction_skips_excluded_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(
            dir.path(),
            &[
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0"),
                ("linux/x64/liblwjgl.so", b"native"),
            ],
        );
        let out = dir.path().join("natives");
        let rules = ExtractRules::excluding(vec!["META-INF/".into()]);

        let written = extract_archive(&archive, &out, &rules).await.unwrap();
        assert_eq!(written, 1);
        assert!(out.join("linux/x64/liblwjgl.so").exists());
        assert!(!out.join("META-INF").exists());
    }

    #[tokio::test]
    async fn flatten_keeps_meta_inf_structure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(
            dir.path(),
            &[
                ("META-INF/services/x", b"svc"),
                ("deep/nested/lib.dll", b"dll"),
            ],
        );
        let out = dir.path().join("flat");
        let rules = ExtractRules::default().flattened();

        extract_archive(&archive, &out, &rules).await.unwrap();
        assert!(out.join("lib.dll").exists());
        assert!(out.join("META-INF/services/x").exists());
        assert!(!out.join("deep").exists());
    }

    #[test]
    fn zipping_a_directory_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("b")).unwrap();
        std::fs::write(src.join("a.txt"), b"a").unwrap();
        std::fs::write(src.join("b/c.txt"), b"c").unwrap();

        let first = dir.path().join("one.zip");
        let second = dir.path().join("two.zip");
        zip_directory(&src, &first).unwrap();
        zip_directory(&src, &second).unwrap();

        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
        let mut archive = zip::ZipArchive::new(File::open(&first).unwrap()).unwrap();
        assert!(archive.by_name("b/c.txt").is_ok());
    }
}
