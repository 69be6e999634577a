// ─── Install Processors ───
// External jars declared by an install profile, run with a fresh classpath and
// templated arguments.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::{digest_file, HashAlgorithm};
use crate::core::maven::MavenArtifact;

/// A value in the install profile's `data` map, after picking the side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataValue {
    /// `'quoted'`: used verbatim without the quotes.
    Literal(String),
    /// `[group:artifact:version]`: a file in the libraries directory.
    Artifact(MavenArtifact),
    /// `/path`: a file inside the extracted installer.
    InstallerPath(String),
    /// Anything else, used as is.
    Plain(String),
}

impl DataValue {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
            return Ok(Self::Literal(raw[1..raw.len() - 1].to_string()));
        }
        if let Some(coord) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return Ok(Self::Artifact(MavenArtifact::parse(coord)?));
        }
        if raw.starts_with('/') {
            return Ok(Self::InstallerPath(raw.to_string()));
        }
        Ok(Self::Plain(raw.to_string()))
    }

    fn resolve(&self, libraries_dir: &Path, installer_dir: &Path) -> String {
        match self {
            Self::Literal(s) | Self::Plain(s) => s.clone(),
            Self::Artifact(a) => path_string(&libraries_dir.join(a.local_path())),
            Self::InstallerPath(p) => {
                let relative: PathBuf = p.trim_start_matches('/').split('/').collect();
                path_string(&installer_dir.join(relative))
            }
        }
    }
}

/// One argument of a processor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorArg {
    /// `[coordinate]`: path of an artifact in the libraries directory.
    Artifact(MavenArtifact),
    /// Text with zero or more `{KEY}` references into the data map.
    Template(String),
}

impl ProcessorArg {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        match raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            Some(coord) => Ok(Self::Artifact(MavenArtifact::parse(coord)?)),
            None => Ok(Self::Template(raw.to_string())),
        }
    }
}

/// Resolve a processor argument against the data map. Unknown keys are an
/// error: running a processor with a half-substituted argument corrupts
/// whatever it writes.
pub fn resolve_arg(
    arg: &ProcessorArg,
    data: &HashMap<String, String>,
    libraries_dir: &Path,
) -> LauncherResult<String> {
    match arg {
        ProcessorArg::Artifact(a) => Ok(path_string(&libraries_dir.join(a.local_path()))),
        ProcessorArg::Template(text) => {
            let mut out = String::with_capacity(text.len());
            let mut rest = text.as_str();
            while let Some(start) = rest.find('{') {
                let Some(len) = rest[start..].find('}') else {
                    break;
                };
                out.push_str(&rest[..start]);
                let key = &rest[start + 1..start + len];
                let value = data.get(key).ok_or_else(|| {
                    LauncherError::Processor(format!("Unknown processor data key {{{}}}", key))
                })?;
                out.push_str(value);
                rest = &rest[start + len + 1..];
            }
            out.push_str(rest);
            Ok(out)
        }
    }
}

/// Build the processor data map: profile entries for `side` plus the runtime
/// keys every processor may reference.
pub fn build_data_map(
    profile_data: &HashMap<String, SidedValue>,
    side: &str,
    runtime: &[(&str, String)],
    libraries_dir: &Path,
    installer_dir: &Path,
) -> LauncherResult<HashMap<String, String>> {
    let mut data = HashMap::new();
    for (key, value) in profile_data {
        let raw = if side == "server" { &value.server } else { &value.client };
        let parsed = DataValue::parse(raw)?;
        data.insert(key.clone(), parsed.resolve(libraries_dir, installer_dir));
    }
    for (key, value) in runtime {
        data.insert((*key).to_string(), value.clone());
    }
    Ok(data)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SidedValue {
    pub client: String,
    pub server: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Processor {
    #[serde(default)]
    pub sides: Option<Vec<String>>,
    pub jar: String,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Output file template to expected SHA-1 template.
    #[serde(default)]
    pub outputs: HashMap<String, String>,
}

impl Processor {
    pub fn applies_to(&self, side: &str) -> bool {
        self.sides
            .as_ref()
            .map_or(true, |sides| sides.iter().any(|s| s == side))
    }

    /// Outputs with templates resolved: (path, expected sha1).
    pub fn resolved_outputs(
        &self,
        data: &HashMap<String, String>,
        libraries_dir: &Path,
    ) -> LauncherResult<Vec<(PathBuf, String)>> {
        self.outputs
            .iter()
            .map(|(file, hash)| {
                let file = resolve_arg(&ProcessorArg::parse(file)?, data, libraries_dir)?;
                let hash = resolve_arg(&ProcessorArg::parse(hash)?, data, libraries_dir)?;
                Ok((PathBuf::from(file), hash.trim_matches('\'').to_ascii_lowercase()))
            })
            .collect()
    }

    /// True when the processor declares outputs and all of them already
    /// exist with the expected hash.
    pub async fn outputs_up_to_date(
        &self,
        data: &HashMap<String, String>,
        libraries_dir: &Path,
    ) -> LauncherResult<bool> {
        if self.outputs.is_empty() {
            return Ok(false);
        }
        for (path, expected) in self.resolved_outputs(data, libraries_dir)? {
            if !path.exists() {
                return Ok(false);
            }
            if digest_file(&path, HashAlgorithm::Sha1).await? != expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run the processor with `java`. Fails if the jar is missing, the
    /// process exits non-zero, or a declared output does not match.
    pub async fn run(
        &self,
        java: &Path,
        data: &HashMap<String, String>,
        libraries_dir: &Path,
    ) -> LauncherResult<()> {
        let jar = libraries_dir.join(MavenArtifact::parse(&self.jar)?.local_path());
        if !jar.exists() {
            return Err(LauncherError::Processor(format!(
                "Missing processor jar {}",
                jar.display()
            )));
        }

        let mut classpath = vec![jar.clone()];
        for entry in &self.classpath {
            let path = libraries_dir.join(MavenArtifact::parse(entry)?.local_path());
            if !path.exists() {
                return Err(LauncherError::Processor(format!(
                    "Missing processor classpath entry {}",
                    path.display()
                )));
            }
            classpath.push(path);
        }
        let classpath = std::env::join_paths(&classpath)
            .map_err(|e| LauncherError::Processor(e.to_string()))?;

        let main_class = read_main_class_from_jar(&jar)?;
        let args = self
            .args
            .iter()
            .map(|a| resolve_arg(&ProcessorArg::parse(a)?, data, libraries_dir))
            .collect::<LauncherResult<Vec<_>>>()?;

        info!("Running processor {} ({})", self.jar, main_class);
        debug!("Processor args: {:?}", args);

        let output = tokio::process::Command::new(java)
            .arg("-cp")
            .arg(&classpath)
            .arg(&main_class)
            .args(&args)
            .current_dir(libraries_dir)
            .output()
            .await
            .map_err(|e| LauncherError::Processor(format!("Could not start {}: {}", java.display(), e)))?;

        if !output.status.success() {
            return Err(LauncherError::Processor(format!(
                "{} failed (code {:?})\nSTDOUT:\n{}\nSTDERR:\n{}",
                self.jar,
                output.status.code(),
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        for (path, expected) in self.resolved_outputs(data, libraries_dir)? {
            let actual = if path.exists() {
                Some(digest_file(&path, HashAlgorithm::Sha1).await?)
            } else {
                None
            };
            if actual.as_deref() != Some(expected.as_str()) {
                return Err(LauncherError::Processor(format!(
                    "{} produced {} with hash {:?}, expected {}",
                    self.jar,
                    path.display(),
                    actual,
                    expected
                )));
            }
        }

        Ok(())
    }
}

/// `Main-Class` from a jar's manifest, following continuation lines.
pub fn read_main_class_from_jar(path: &Path) -> LauncherResult<String> {
    let file = std::fs::File::open(path).map_err(|e| LauncherError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut manifest = archive.by_name("META-INF/MANIFEST.MF").map_err(|e| {
        LauncherError::Processor(format!("Manifest not found in {}: {}", path.display(), e))
    })?;

    let mut text = String::new();
    manifest.read_to_string(&mut text)?;

    let mut main_class: Option<String> = None;
    let mut in_main_class = false;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(' ') {
            if in_main_class {
                if let Some(value) = &mut main_class {
                    value.push_str(rest.trim_end());
                }
            }
            continue;
        }

        in_main_class = false;
        if let Some((key, value)) = line.split_once(':') {
            if key.trim() == "Main-Class" {
                main_class = Some(value.trim().to_string());
                in_main_class = true;
            }
        }
    }

    main_class.ok_or_else(|| {
        LauncherError::Processor(format!("Main-Class missing in {}", path.display()))
    })
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
