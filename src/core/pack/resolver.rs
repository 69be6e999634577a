use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::model::{DownloadKind, Mod, PackIndex, PackVersion, Placement};
use crate::core::config::Endpoints;
use crate::core::download::{ExtractRules, FetchUnit};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http;
use crate::core::integrity::HttpCache;

/// Reads a pack's documents and turns its hosted files into fetch units.
pub struct PackResolver<'a> {
    cache: &'a HttpCache,
    endpoints: &'a Endpoints,
    pack: &'a str,
}

impl<'a> PackResolver<'a> {
    pub fn new(cache: &'a HttpCache, endpoints: &'a Endpoints, pack: &'a str) -> Self {
        Self {
            cache,
            endpoints,
            pack,
        }
    }

    fn pack_path(&self, relative: &str) -> String {
        format!("packs/{}/{}", self.pack, relative)
    }

    /// Primary URL plus one fallback per configured mirror.
    pub fn hosted_urls(&self, relative: &str) -> (String, Vec<String>) {
        let relative = relative.trim_start_matches('/');
        let join = |base: &str| format!("{}/{}", base.trim_end_matches('/'), relative);
        (
            join(&self.endpoints.pack_base),
            self.endpoints.pack_mirrors.iter().map(|m| join(m)).collect(),
        )
    }

    /// Read a hosted document, moving on to the next mirror while hosts
    /// cannot be reached.
    async fn get_hosted<T: serde::de::DeserializeOwned>(&self, relative: &str) -> LauncherResult<T> {
        let (mut url, mirrors) = self.hosted_urls(relative);
        let mut result = self.cache.get_json(&url).await;
        for mirror in mirrors {
            match &result {
                Err(LauncherError::Http(e)) if http::is_connectivity_error(e) => {
                    warn!("{} unreachable ({}), trying {}", url, e, mirror);
                }
                _ => break,
            }
            url = mirror;
            result = self.cache.get_json(&url).await;
        }
        result
    }

    pub async fn fetch_index(&self) -> LauncherResult<PackIndex> {
        self.get_hosted(&self.pack_path("pack.json")).await
    }

    /// Load `Configs.json` for `version`. A pack without any versions cannot
    /// be installed at all.
    pub async fn fetch_version(&self, version: &str) -> LauncherResult<PackVersion> {
        let index = self.fetch_index().await?;
        if index.versions.is_empty() {
            return Err(LauncherError::Resolution(format!(
                "Pack {} has no versions",
                self.pack
            )));
        }
        if index.find(version).is_none() {
            return Err(LauncherError::Resolution(format!(
                "Pack {} has no version {}",
                self.pack, version
            )));
        }

        let mut parsed: PackVersion = self
            .get_hosted(&self.pack_path(&format!("versions/{}/Configs.json", version)))
            .await?;
        if parsed.version.is_empty() {
            parsed.version = version.to_string();
        }
        info!(
            "Pack {} {} targets Minecraft {} with {} mods",
            self.pack,
            version,
            parsed.minecraft,
            parsed.mods.len()
        );
        Ok(parsed)
    }

    /// `Configs.zip` overlay, kept in the download cache and unpacked over
    /// the instance.
    pub fn config_overlay_unit(
        &self,
        version: &PackVersion,
        instance_dir: &Path,
        downloads_dir: &Path,
    ) -> Option<FetchUnit> {
        let overlay = version.configs.as_ref()?;
        let (url, mirrors) =
            self.hosted_urls(&self.pack_path(&format!("versions/{}/Configs.zip", version.version)));
        Some(
            FetchUnit::new(
                url,
                downloads_dir.join(format!("{}-{}-Configs.zip", self.pack, version.version)),
            )
            .with_fallbacks(mirrors)
            .with_hash(&overlay.sha1)
            .with_optional_size(overlay.filesize)
            .unzip_to(instance_dir, ExtractRules::default()),
        )
    }
}

/// Mods this install should get: well-formed entries for the current side,
/// with optional ones kept when selected by default or by name.
pub fn select_mods(version: &PackVersion, is_server: bool, optional: &[String]) -> Vec<Mod> {
    version
        .mods
        .iter()
        .filter(|m| {
            if m.url.trim().is_empty() || m.file.trim().is_empty() {
                warn!("Skipping mod {:?}: missing url or file", m.name);
                return false;
            }
            true
        })
        .filter(|m| m.installs_on(is_server))
        .filter(|m| {
            !m.optional || m.selected || optional.iter().any(|o| o.eq_ignore_ascii_case(&m.name))
        })
        .map(|m| m.for_side(is_server))
        .filter(|m| {
            if !m.has_contained_paths() {
                warn!("Skipping mod {:?}: file {:?} leaves its directory", m.name, m.file);
                return false;
            }
            true
        })
        .collect()
}

/// Ask the sizing endpoint for the size of every URL in one request. The body
/// is the base64 of the newline-joined list; the answer maps URL to bytes.
pub async fn fetch_file_sizes(
    client: &Client,
    endpoint: &str,
    urls: &[String],
) -> LauncherResult<HashMap<String, u64>> {
    if urls.is_empty() {
        return Ok(HashMap::new());
    }
    let body = base64::engine::general_purpose::STANDARD.encode(urls.join("\n"));
    let response = client
        .post(endpoint)
        .header(reqwest::header::CONTENT_TYPE, "text/plain")
        .body(body)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(http::response_error(endpoint, response).await);
    }
    let sizes: HashMap<String, u64> = response.json().await?;
    debug!("Size lookup returned {} of {} entries", sizes.len(), urls.len());
    Ok(sizes)
}

/// A browser-only mod the user already saved locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCopy {
    pub source: PathBuf,
    pub dest: PathBuf,
}

#[derive(Debug, Default)]
pub struct ModPlan {
    pub units: Vec<FetchUnit>,
    pub browser_copies: Vec<BrowserCopy>,
    /// Mods that will actually be installed.
    pub mods: Vec<Mod>,
}

impl ModPlan {
    /// Move browser-saved files into the download cache so their units see
    /// a local copy.
    pub async fn stage_browser_copies(&self) -> LauncherResult<()> {
        for copy in &self.browser_copies {
            if let Some(parent) = copy.dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| LauncherError::io(parent, e))?;
            }
            tokio::fs::copy(&copy.source, &copy.dest)
                .await
                .map_err(|e| LauncherError::io(&copy.dest, e))?;
        }
        Ok(())
    }
}

pub struct ModPlanner<'a> {
    pub resolver: &'a PackResolver<'a>,
    pub instance_dir: &'a Path,
    pub downloads_dir: &'a Path,
    pub browser_dir: Option<&'a Path>,
    pub minecraft: &'a str,
}

impl ModPlanner<'_> {
    /// URLs of pack-hosted mods whose size is not declared.
    pub fn unsized_urls(&self, mods: &[Mod]) -> Vec<String> {
        mods.iter()
            .filter(|m| m.download == DownloadKind::Server && m.filesize.is_none())
            .map(|m| self.resolver.hosted_urls(&m.url).0)
            .collect()
    }

    pub fn plan(&self, mods: Vec<Mod>, sizes: &HashMap<String, u64>) -> LauncherResult<ModPlan> {
        let mut plan = ModPlan::default();

        for m in mods {
            let cached = self.downloads_dir.join(&m.file);
            let (url, fallbacks) = match m.download {
                DownloadKind::Server => self.resolver.hosted_urls(&m.url),
                DownloadKind::Direct => (m.url.clone(), Vec::new()),
                DownloadKind::Browser => {
                    let found = self
                        .browser_dir
                        .map(|d| d.join(&m.file))
                        .filter(|p| p.is_file());
                    match found {
                        Some(source) => plan.browser_copies.push(BrowserCopy {
                            source,
                            dest: cached.clone(),
                        }),
                        None if m.optional => {
                            warn!("Skipping optional mod {}: {} not downloaded", m.name, m.file);
                            continue;
                        }
                        None => {
                            return Err(LauncherError::ManualDownloadRequired {
                                name: m.name.clone(),
                                url: m.url.clone(),
                            });
                        }
                    }
                    (m.url.clone(), Vec::new())
                }
            };

            let size = m.filesize.or_else(|| sizes.get(&url).copied());
            let mut unit = FetchUnit::new(&url, &cached)
                .with_fallbacks(fallbacks)
                .with_optional_hash(m.hash.as_deref())
                .with_optional_size(size);
            if let Some(fingerprint) = m.fingerprint {
                unit = unit.with_fingerprint(fingerprint);
            }
            if m.download == DownloadKind::Browser {
                // The user's copy is all there is; it cannot be refetched.
                unit = unit.ignore_failures();
            }
            unit = match m.mod_type.placement(&m, self.instance_dir, self.minecraft) {
                Placement::Copy(path) => unit.copy_to(path),
                Placement::Extract(path) => unit.unzip_to(path, ExtractRules::default()),
            };

            plan.units.push(unit);
            plan.mods.push(m);
        }

        info!(
            "{} mods to install ({} from browser downloads)",
            plan.mods.len(),
            plan.browser_copies.len()
        );
        Ok(plan)
    }
}
