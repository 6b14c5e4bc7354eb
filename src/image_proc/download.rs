//! Image feed download.
//!
//! Uses a shared HTTP client to avoid connection pool leaks and reduce
//! memory overhead from creating new clients for each request. A failed
//! request is not retried here: the feed worker simply tries again after its
//! polling interval.

use once_cell::sync::Lazy;
use std::time::Duration;
use thiserror::Error;

/// Shared HTTP client for all feed requests
///
/// - Single idle connection per host (minimize memory)
/// - 30 second idle timeout (release connections promptly)
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .pool_max_idle_per_host(1)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build tuned HTTP client ({}), using defaults", e);
            reqwest::Client::new()
        })
});

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    #[error("Empty URL")]
    EmptyUrl,
}

/// Fetch the raw bytes behind a URL
pub async fn fetch_bytes(url: &str, timeout: Duration) -> Result<bytes::Bytes, DownloadError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(DownloadError::EmptyUrl);
    }

    tracing::debug!("Fetching image feed from: {}", url);

    let response = HTTP_CLIENT.get(url).timeout(timeout).send().await?;
    let status = response.status();
    if !status.is_success() {
        tracing::warn!("HTTP error: {} for {}", status, url);
        return Err(DownloadError::HttpError {
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().await?;
    tracing::debug!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn returns_body_bytes() {
        let base = serve(Router::new().route("/img", get(|| async { "frame-bytes" }))).await;

        let bytes = fetch_bytes(&format!("{base}/img"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"frame-bytes");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let base = serve(Router::new().route(
            "/img",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        ))
        .await;

        let result = fetch_bytes(&format!("{base}/img"), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(DownloadError::HttpError { status: 404 })));
    }

    #[tokio::test]
    async fn blank_url_is_rejected() {
        let result = fetch_bytes("   ", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(DownloadError::EmptyUrl)));
    }
}
