//! Bundle acquisition: stream a remote bundle to a local file.
//!
//! The body is written chunk by chunk so a large bundle never has to fit in
//! memory. Any failure (connect error, timeout, non-2xx status, broken stream,
//! disk error) removes the partially written file before the error is
//! returned, so a file at `dest` is always a complete download.
//!
//! There is no retry here; a caller that wants retries wraps this call.

use crate::error::SyncError;
use futures::StreamExt;
use reqwest::Url;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Download `url` to `dest`, returning the number of bytes written.
pub async fn download_bundle(url: &Url, dest: &Path, timeout_secs: u64) -> Result<u64, SyncError> {
    info!("Downloading bundle from: {}", url);

    match stream_to_file(url, dest, timeout_secs).await {
        Ok(written) => {
            info!("Downloaded {} bytes to: {}", written, dest.display());
            Ok(written)
        }
        Err(e) => {
            match tokio::fs::remove_file(dest).await {
                Ok(()) => debug!("Removed partial download {}", dest.display()),
                Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => {}
                Err(rm) => warn!(
                    "Could not remove partial download {}: {}",
                    dest.display(),
                    rm
                ),
            }
            Err(e)
        }
    }
}

async fn stream_to_file(url: &Url, dest: &Path, timeout_secs: u64) -> Result<u64, SyncError> {
    let transport_error = |e: reqwest::Error| {
        if e.is_timeout() {
            SyncError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            SyncError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SyncError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(transport_error)?;

    if !response.status().is_success() {
        return Err(SyncError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SyncError::io(parent, e))?;
    }
    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| SyncError::io(dest, e))?;

    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(transport_error)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| SyncError::io(dest, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| SyncError::io(dest, e))?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(router: Router) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn writes_body_to_destination() {
        let addr = serve(Router::new().route("/b.CRDesign", get(|| async { "bundle-bytes" }))).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/b.CRDesign");
        let url = Url::parse(&format!("http://{addr}/b.CRDesign")).unwrap();

        let written = download_bundle(&url, &dest, 5).await.unwrap();
        assert_eq!(written, 12);
        assert_eq!(std::fs::read(&dest).unwrap(), b"bundle-bytes");
    }

    #[tokio::test]
    async fn non_success_status_leaves_no_file() {
        let addr = serve(Router::new().route(
            "/missing.CRDesign",
            get(|| async { (StatusCode::NOT_FOUND, "nope") }),
        ))
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.CRDesign");
        let url = Url::parse(&format!("http://{addr}/missing.CRDesign")).unwrap();

        let err = download_bundle(&url, &dest, 5).await.unwrap_err();
        assert!(matches!(err, SyncError::DownloadFailed { .. }), "{err}");
        assert!(err.to_string().contains("404"));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn connection_refused_is_download_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("x.CRDesign");
        let url = Url::parse(&format!("http://{addr}/x.CRDesign")).unwrap();

        let err = download_bundle(&url, &dest, 5).await.unwrap_err();
        assert!(err.is_upstream_error());
        assert!(!dest.exists());
    }
}
