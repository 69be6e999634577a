use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http;
use crate::core::integrity::hashing::sha1_hex;

/// On-disk cache for manifest and index documents, keyed by URL.
///
/// Raw file downloads never go through here: those are validated by hash.
/// This cache exists for small documents that are fetched on every install
/// but rarely change.
#[derive(Clone)]
pub struct HttpCache {
    dir: PathBuf,
    client: Client,
    max_age: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    url: String,
    etag: Option<String>,
    last_modified: Option<String>,
    fetched_at: DateTime<Utc>,
}

impl HttpCache {
    pub fn new(dir: impl Into<PathBuf>, client: Client, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            client,
            max_age,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> LauncherResult<T> {
        let text = self.get_text(url).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Fetch `url`, serving a fresh cached copy without touching the network
    /// and revalidating a stale one. When the server cannot be reached or
    /// answers with an error, a stale copy is still better than nothing.
    pub async fn get_text(&self, url: &str) -> LauncherResult<String> {
        let key = sha1_hex(url.as_bytes());
        let body_path = self.dir.join(format!("{key}.body"));
        let meta_path = self.dir.join(format!("{key}.json"));

        let cached = self.read_cached(&meta_path, &body_path).await;
        if let Some((meta, body)) = &cached {
            if self.is_fresh(meta) {
                debug!("Cache hit for {}", url);
                return Ok(body.clone());
            }
        }

        let mut request = self.client.get(url);
        if let Some((meta, _)) = &cached {
            if let Some(etag) = &meta.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &meta.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                return match cached {
                    Some((_, body)) => {
                        warn!("Serving stale copy of {} ({})", url, e);
                        Ok(body)
                    }
                    None => Err(e.into()),
                };
            }
        };

        if response.status() == StatusCode::NOT_MODIFIED {
            if let Some((mut meta, body)) = cached {
                debug!("Revalidated {}", url);
                meta.fetched_at = Utc::now();
                self.write_meta(&meta_path, &meta).await?;
                return Ok(body);
            }
        }

        if !response.status().is_success() {
            let err = http::response_error(url, response).await;
            return match cached {
                Some((_, body)) => {
                    warn!("Serving stale copy of {} ({})", url, err);
                    Ok(body)
                }
                None => Err(err),
            };
        }

        let etag = header_string(&response, ETAG);
        let last_modified = header_string(&response, LAST_MODIFIED);
        let body = response.text().await?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| LauncherError::io(&self.dir, e))?;
        tokio::fs::write(&body_path, &body)
            .await
            .map_err(|e| LauncherError::io(&body_path, e))?;
        self.write_meta(
            &meta_path,
            &CacheMeta {
                url: url.to_string(),
                etag,
                last_modified,
                fetched_at: Utc::now(),
            },
        )
        .await?;

        Ok(body)
    }

    fn is_fresh(&self, meta: &CacheMeta) -> bool {
        let age = Utc::now().signed_duration_since(meta.fetched_at);
        age.to_std().map(|a| a < self.max_age).unwrap_or(false)
    }

    async fn read_cached(&self, meta_path: &Path, body_path: &Path) -> Option<(CacheMeta, String)> {
        let meta_raw = tokio::fs::read_to_string(meta_path).await.ok()?;
        let meta: CacheMeta = serde_json::from_str(&meta_raw).ok()?;
        let body = tokio::fs::read_to_string(body_path).await.ok()?;
        Some((meta, body))
    }

    async fn write_meta(&self, path: &Path, meta: &CacheMeta) -> LauncherResult<()> {
        let json = serde_json::to_string(meta)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| LauncherError::io(path, e))
    }
}

fn header_string(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::TestServer;

    #[tokio::test]
    async fn fresh_entries_skip_the_network() {
        let server = TestServer::start().await;
        server.serve_json("/manifest.json", &serde_json::json!({"versions": []}));
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path(), Client::new(), Duration::from_secs(600));

        let url = server.url("/manifest.json");
        let first = cache.get_text(&url).await.unwrap();
        let second = cache.get_text(&url).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(server.hits("/manifest.json"), 1);
    }

    #[tokio::test]
    async fn stale_entries_are_refetched() {
        let server = TestServer::start().await;
        server.serve_json("/index.json", &serde_json::json!({"v": 1}));
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path(), Client::new(), Duration::ZERO);

        let url = server.url("/index.json");
        cache.get_text(&url).await.unwrap();
        server.serve_json("/index.json", &serde_json::json!({"v": 2}));
        let value: serde_json::Value = cache.get_json(&url).await.unwrap();

        assert_eq!(value["v"], 2);
        assert_eq!(server.hits("/index.json"), 2);
    }

    #[tokio::test]
    async fn server_error_falls_back_to_stale_copy() {
        let server = TestServer::start().await;
        server.serve_json("/pack.json", &serde_json::json!({"name": "pack"}));
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path(), Client::new(), Duration::ZERO);

        let url = server.url("/pack.json");
        cache.get_text(&url).await.unwrap();
        server.serve_status("/pack.json", 500, "text/plain", b"boom");

        let value: serde_json::Value = cache.get_json(&url).await.unwrap();
        assert_eq!(value["name"], "pack");
    }

    #[tokio::test]
    async fn uncached_error_surfaces() {
        let server = TestServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::new(dir.path(), Client::new(), Duration::from_secs(60));

        let err = cache.get_text(&server.url("/missing.json")).await.unwrap_err();
        assert!(matches!(err, LauncherError::DownloadFailed { status: 404, .. }));
    }
}
