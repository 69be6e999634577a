use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Response};

use crate::core::config::InstallerConfig;
use crate::core::error::LauncherError;

const APP_USER_AGENT: &str = concat!("Packsmith/", env!("CARGO_PKG_VERSION"));
const MAX_DIAGNOSTIC_BODY: usize = 2048;

/// Build the run-wide HTTP client. Timeouts come from the config and apply to
/// every request the pipeline makes.
pub fn build_http_client(config: &InstallerConfig) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(config.connect_timeout())
        .read_timeout(config.read_timeout())
        .build()
}

/// Turn a non-2xx response into a `DownloadFailed` error. The body is kept
/// only for textual content types (JSON, XML, plain text).
pub async fn response_error(url: &str, response: Response) -> LauncherError {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let body = if content_type.as_deref().is_some_and(is_textual) {
        response.text().await.ok().map(|mut text| {
            if text.len() > MAX_DIAGNOSTIC_BODY {
                let mut cut = MAX_DIAGNOSTIC_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
                text.push_str("...");
            }
            text
        })
    } else {
        None
    };

    LauncherError::DownloadFailed {
        url: url.to_string(),
        status,
        content_type,
        body,
    }
}

/// `Content-Length` as sent by the server. Read from the header directly since
/// HEAD responses carry no body for reqwest to size.
pub fn header_content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Errors worth retrying against a mirror.
pub fn is_connectivity_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

fn is_textual(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("json") || ct.contains("xml") || ct.starts_with("text/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::TestServer;

    #[test]
    fn textual_content_types() {
        assert!(is_textual("application/json; charset=utf-8"));
        assert!(is_textual("text/html"));
        assert!(is_textual("application/xml"));
        assert!(!is_textual("application/java-archive"));
        assert!(!is_textual("application/octet-stream"));
    }

    #[tokio::test]
    async fn error_keeps_json_body() {
        let server = TestServer::start().await;
        server.serve_status("/missing", 404, "application/json", br#"{"error":"gone"}"#);

        let client = Client::new();
        let url = server.url("/missing");
        let response = client.get(&url).send().await.unwrap();
        match response_error(&url, response).await {
            LauncherError::DownloadFailed {
                status,
                content_type,
                body,
                ..
            } => {
                assert_eq!(status, 404);
                assert_eq!(content_type.as_deref(), Some("application/json"));
                assert_eq!(body.as_deref(), Some(r#"{"error":"gone"}"#));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_drops_binary_body() {
        let server = TestServer::start().await;
        server.serve_status("/blob", 500, "application/octet-stream", &[0u8, 1, 2]);

        let client = Client::new();
        let url = server.url("/blob");
        let response = client.get(&url).send().await.unwrap();
        let err = response_error(&url, response).await;
        assert!(matches!(
            err,
            LauncherError::DownloadFailed { status: 500, body: None, .. }
        ));
    }
}
