//! Output types returned by the sync pipeline.

use crate::error::AssetError;
use crate::pipeline::compress::Preset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of one successful `process_bundle` run.
///
/// Serialises to the success body of `POST /download-image` (without the
/// `reports` / `stats` fields, which the handler drops).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutput {
    /// Sanitised identifier of the bundle; also the output sub-directory.
    pub folder_name: String,
    /// Absolute path of the packaged archive.
    pub zip_path: PathBuf,
    /// Absolute path of the copied preview image, if the bundle had one.
    pub preview_path: Option<PathBuf>,
    /// Public URL of the archive under the static file prefix.
    pub zip_url: String,
    /// Public URL of the preview image.
    pub preview_url: Option<String>,
    /// One entry per raster asset the compression engine visited.
    pub reports: Vec<CompressionReport>,
    pub stats: SyncStats,
}

/// What happened to one raster asset during compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionReport {
    /// Path relative to the working folder.
    pub path: PathBuf,
    pub original_bytes: u64,
    /// Size after compression; never greater than `original_bytes`.
    pub final_bytes: u64,
    pub attempts: Vec<CompressionAttempt>,
    /// True when `final_bytes` is at or under the budget.
    pub within_budget: bool,
    /// Set when the re-encoder failed; the asset keeps its best bytes so far.
    pub error: Option<AssetError>,
}

impl CompressionReport {
    pub fn saved_bytes(&self) -> u64 {
        self.original_bytes.saturating_sub(self.final_bytes)
    }
}

/// One preset evaluated against an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionAttempt {
    pub preset: Preset,
    /// Candidate size, or `None` when the re-encoder declined the preset.
    pub candidate_bytes: Option<u64>,
    /// Whether the candidate replaced the asset.
    pub kept: bool,
}

/// Timing information for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub download_bytes: u64,
    pub download_ms: u64,
    pub extract_ms: u64,
    pub render_ms: u64,
    pub compress_ms: u64,
    pub package_ms: u64,
    pub total_ms: u64,
    /// Raster assets visited by the compression engine.
    pub assets: usize,
    /// Assets still above the budget after every preset.
    pub oversize_assets: usize,
    /// Assets whose re-encoding failed.
    pub failed_assets: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_uses_wire_field_names() {
        let out = SyncOutput {
            folder_name: "1234".into(),
            zip_path: PathBuf::from("/srv/output/1234/1234.zip"),
            preview_path: None,
            zip_url: "/files/1234/1234.zip".into(),
            preview_url: None,
            reports: vec![],
            stats: SyncStats::default(),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["folderName"], "1234");
        assert_eq!(json["zipUrl"], "/files/1234/1234.zip");
        assert!(json["previewPath"].is_null());
    }

    #[test]
    fn saved_bytes_saturates() {
        let report = CompressionReport {
            path: PathBuf::from("a.png"),
            original_bytes: 100,
            final_bytes: 100,
            attempts: vec![],
            within_budget: true,
            error: None,
        };
        assert_eq!(report.saved_bytes(), 0);
    }
}
