//! Asset embedding: raster file → base64 data URI.
//!
//! The background composite must be self-contained so the rasteriser can run
//! from any working directory, so every accepted layer is inlined as a
//! `data:` URI. The MIME label is always `image/jpeg`, whatever the real
//! format: rasterisers sniff the payload, and bundles mix PNG and JPEG layers.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// MIME type written into every embedded data URI.
pub const EMBEDDED_MIME: &str = "image/jpeg";

/// Encode raw image bytes as a `data:image/jpeg;base64,…` URI.
pub fn encode_data_uri(bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded asset → {} bytes base64", b64.len());
    format!("data:{EMBEDDED_MIME};base64,{b64}")
}

/// Read `path` and encode it as a data URI.
pub fn embed_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(encode_data_uri(&bytes))
}
