//! Error types for the crdesign-sync library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SyncError`] — **Fatal**: the bundle cannot be processed at all
//!   (bad link, download failure, corrupt archive, rasteriser crash).
//!   Returned as `Err(SyncError)` from [`crate::sync::process_bundle`] and
//!   turned into a single failure response by the HTTP layer.
//!
//! * [`AssetError`] — **Non-fatal**: one raster asset could not be
//!   re-encoded. Stored inside [`crate::output::CompressionReport`] so the
//!   remaining assets are still compressed and the bundle is still packaged.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the crdesign-sync library.
#[derive(Debug, Error)]
pub enum SyncError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request did not carry a link at all.
    #[error("link is required")]
    MissingLink,

    /// The link is not an absolute HTTP/HTTPS URL.
    #[error("Invalid link '{link}': {reason}")]
    InvalidLink { link: String, reason: String },

    // ── Transport errors ──────────────────────────────────────────────────
    /// The bundle could not be downloaded (connection error or non-2xx).
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Bundle errors ─────────────────────────────────────────────────────
    /// The downloaded file is not a readable zip container.
    #[error("Bundle archive '{path}' is corrupt: {detail}")]
    CorruptArchive { path: PathBuf, detail: String },

    /// The bundle held neither a vector-markup file nor a preview.
    #[error("Bundle '{path}' contains no design markup and no preview")]
    MissingMarkup { path: PathBuf },

    /// The design markup could not be parsed as XML.
    #[error("Design markup '{path}' is not valid XML: {detail}")]
    InvalidMarkup { path: PathBuf, detail: String },

    /// No background layer defined a usable canvas size.
    #[error("Design '{path}' has no background layer with a non-zero canvas size")]
    EmptyCanvas { path: PathBuf },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// The external rasteriser failed or produced no output.
    #[error("Rasterisation failed: {detail}")]
    RasterisationFailed { detail: String },

    /// The output archive could not be written.
    #[error("Packaging '{folder}' failed: {detail}")]
    PackagingFailed { folder: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A filesystem operation on the working tree failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Wrap an `std::io::Error` together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the failure was caused by the caller's input rather than by
    /// the pipeline or one of its collaborators.
    pub fn is_client_error(&self) -> bool {
        matches!(self, SyncError::MissingLink | SyncError::InvalidLink { .. })
    }

    /// True when the failure happened while talking to the remote host.
    pub fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            SyncError::DownloadFailed { .. } | SyncError::DownloadTimeout { .. }
        )
    }
}

/// A non-fatal error for a single raster asset.
///
/// Stored in [`crate::output::CompressionReport`] when the re-encoder fails.
/// The asset keeps whatever bytes it had before the failing attempt.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum AssetError {
    /// The external or in-process re-encoder reported a failure.
    #[error("{path}: re-encoding failed: {detail}")]
    ReencodeFailed { path: PathBuf, detail: String },

    /// Reading or replacing the asset on disk failed.
    #[error("{path}: I/O error: {detail}")]
    Io { path: PathBuf, detail: String },
}
