//! Size Prober (§4.1): discovers each remote file's byte length via a HEAD
//! request, tolerating header-name variants and redirects.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::EngineError;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_BATCH_PROBE_TIMEOUT: Duration = Duration::from_secs(45);

const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; FluxDM/1.0; +https://fluxdm.example/engine) reqwest";

/// Result of successfully probing one URL: the resolved byte length and the
/// URL the server ultimately answered from (after following redirects).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub total_bytes: u64,
    pub resolved_url: String,
}

/// Discovers `url`'s remote byte length with a single HEAD request (§4.1).
pub async fn probe(client: &Client, url: &str, timeout: Duration) -> Result<ProbeOutcome, EngineError> {
    reqwest::Url::parse(url).map_err(|e| EngineError::InvalidUrl(e.to_string()))?;

    let request = client
        .head(url)
        .timeout(timeout)
        .header("Accept", "*/*")
        .header("Cache-Control", "no-cache")
        .header("Accept-Encoding", "identity")
        .header("User-Agent", USER_AGENT);

    let response = request.send().await.map_err(classify_request_error)?;

    let status = response.status();
    if !matches!(
        status,
        StatusCode::OK | StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND
    ) {
        return Err(EngineError::HttpError(status.as_u16()));
    }

    let resolved_url = response.url().to_string();
    let headers = response.headers();

    let total_bytes = find_size_header(headers).ok_or(EngineError::FileSizeNotAvailable)?;

    debug!(url, resolved_url, total_bytes, "probed file size");

    Ok(ProbeOutcome {
        total_bytes,
        resolved_url,
    })
}

/// Probes every url in `urls` in parallel under `timeout`. Succeeds as long
/// as at least one probe succeeds; the map carries a per-url `Result` so
/// callers can tell which artifacts failed. If every probe fails, the first
/// error observed is surfaced as the overall error (§4.1).
pub async fn probe_all(
    client: &Client,
    urls: &[String],
    timeout: Duration,
) -> Result<HashMap<String, Result<ProbeOutcome, EngineError>>, EngineError> {
    let futures = urls
        .iter()
        .map(|url| async move { (url.clone(), probe(client, url, timeout).await) });

    let results: Vec<(String, Result<ProbeOutcome, EngineError>)> =
        futures_util::future::join_all(futures).await;

    if results.iter().all(|(_, r)| r.is_err()) {
        if let Some((_, Err(first_error))) = results.first() {
            return Err(first_error.clone());
        }
    }

    Ok(results.into_iter().collect())
}

/// Searches, in the order §4.1 specifies, for a body-size value among
/// header-name variants that differ only by case or vendor extension.
fn find_size_header(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    if let Some(value) = headers.get("x-linked-size").and_then(parse_positive_u64) {
        return Some(value);
    }

    if let Some(value) = headers.get("content-length").and_then(parse_positive_u64) {
        return Some(value);
    }

    if let Some(range) = headers
        .get("content-range")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(total) = parse_content_range_total(range) {
            return Some(total);
        }
    }

    None
}

fn parse_positive_u64(value: &reqwest::header::HeaderValue) -> Option<u64> {
    value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
}

/// Parses `C` out of `Content-Range: bytes A-B/C`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let total = value.rsplit('/').next()?.trim();
    total.parse::<u64>().ok().filter(|n| *n > 0)
}

fn classify_request_error(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout
    } else if err.is_connect() {
        EngineError::NetworkUnavailable
    } else if let Some(status) = err.status() {
        EngineError::HttpError(status.as_u16())
    } else {
        EngineError::NetworkLost(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn finds_size_from_x_linked_size_any_case() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/model.bin"))
            .respond_with(ResponseTemplate::new(200).insert_header("X-Linked-Size", "4096"))
            .mount(&server)
            .await;

        let client = Client::new();
        let url = format!("{}/model.bin", server.uri());
        let outcome = probe(&client, &url, DEFAULT_PROBE_TIMEOUT).await.unwrap();
        assert_eq!(outcome.total_bytes, 4096);
    }

    #[tokio::test]
    async fn falls_back_to_content_length() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/model.bin"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "2048"))
            .mount(&server)
            .await;

        let client = Client::new();
        let url = format!("{}/model.bin", server.uri());
        let outcome = probe(&client, &url, DEFAULT_PROBE_TIMEOUT).await.unwrap();
        assert_eq!(outcome.total_bytes, 2048);
    }

    #[tokio::test]
    async fn falls_back_to_content_range_total() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/model.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Range", "bytes 0-0/4294967296"),
            )
            .mount(&server)
            .await;

        let client = Client::new();
        let url = format!("{}/model.bin", server.uri());
        let outcome = probe(&client, &url, DEFAULT_PROBE_TIMEOUT).await.unwrap();
        assert_eq!(outcome.total_bytes, 4_294_967_296);
    }

    #[tokio::test]
    async fn no_size_header_is_file_size_not_available() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/model.bin"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new();
        let url = format!("{}/model.bin", server.uri());
        let err = probe(&client, &url, DEFAULT_PROBE_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::FileSizeNotAvailable));
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/missing.bin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Client::new();
        let url = format!("{}/missing.bin", server.uri());
        let err = probe(&client, &url, DEFAULT_PROBE_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::HttpError(404)));
    }

    #[tokio::test]
    async fn sends_expected_request_headers() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/model.bin"))
            .and(header("accept-encoding", "identity"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "10"))
            .mount(&server)
            .await;

        let client = Client::new();
        let url = format!("{}/model.bin", server.uri());
        probe(&client, &url, DEFAULT_PROBE_TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn probe_all_succeeds_if_any_file_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/ok.bin"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Length", "10"))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/missing.bin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Client::new();
        let urls = vec![
            format!("{}/ok.bin", server.uri()),
            format!("{}/missing.bin", server.uri()),
        ];
        let results = probe_all(&client, &urls, DEFAULT_BATCH_PROBE_TIMEOUT)
            .await
            .unwrap();

        assert!(results[&urls[0]].is_ok());
        assert!(results[&urls[1]].is_err());
    }

    #[tokio::test]
    async fn probe_all_fails_if_every_file_fails() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/missing.bin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Client::new();
        let urls = vec![format!("{}/missing.bin", server.uri())];
        let err = probe_all(&client, &urls, DEFAULT_BATCH_PROBE_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::HttpError(404)));
    }
}
