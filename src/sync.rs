//! Bundle processing entry point.
//!
//! [`process_bundle`] runs the whole pipeline for one request, one stage
//! after another:
//!
//! ```text
//! link ─► canonical URL ─► download ─► extract + normalise ─► stage
//!      ─► compose + rasterise background ─► re-layout text ─► final markup
//!      ─► compress assets ─► publish processed folder ─► package
//! ```
//!
//! All intermediate state lives in request-scoped temporary directories, so
//! concurrent requests never share a working folder and a failed run leaves
//! nothing behind. The processed folder and the output bundle are published
//! by rename only after every earlier stage has succeeded.

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::output::{SyncOutput, SyncStats};
use crate::pipeline::compress::{compress_folder, Reencoder};
use crate::pipeline::extract::{extract_bundle, StagedDesign};
use crate::pipeline::layers::{canvas_size, composite_layers, embed_layers, parse_layers, Layer};
use crate::pipeline::rasterize::{render_background, Rasterizer};
use crate::pipeline::{assemble, compose, fetch, link, package, publish, text};
use crate::progress::{SyncProgressCallback, SyncStage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Body of a sync request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequest {
    /// Catalog link to the design (preview image or bundle).
    pub link: Option<String>,
    /// Caller-supplied identifier, string or number.
    pub id: Option<CallerId>,
    /// Catalog image number; preferred over `id` for the folder name.
    pub img_no: Option<u64>,
}

impl BundleRequest {
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: Some(link.into()),
            ..Self::default()
        }
    }
}

/// An identifier that may arrive as a JSON string or number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallerId {
    Number(i64),
    Text(String),
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerId::Number(n) => write!(f, "{}", n),
            CallerId::Text(s) => f.write_str(s),
        }
    }
}

/// External collaborators of a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub rasterizer: &'a dyn Rasterizer,
    pub reencoder: &'a dyn Reencoder,
    pub progress: &'a dyn SyncProgressCallback,
}

/// Download, rework, compress and publish the bundle behind `request.link`.
///
/// # Errors
/// Every failure is fatal for the request and returned as [`SyncError`];
/// per-asset compression failures are not, and end up in
/// [`SyncOutput::reports`] instead.
pub async fn process_bundle(
    request: &BundleRequest,
    config: &SyncConfig,
    with: Collaborators<'_>,
) -> Result<SyncOutput, SyncError> {
    let total_start = Instant::now();

    // ── Step 1: Validate and canonicalise the link ───────────────────────
    let raw_link = request
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or(SyncError::MissingLink)?;
    let url = link::canonicalize_link(raw_link, config)?;
    let file_name = link::derived_file_name(&url);
    let folder = link::folder_name(request, &file_name);
    info!("Starting sync of {} as '{}'", url, folder);

    match run(&url, &file_name, &folder, config, with, total_start).await {
        Ok(output) => {
            with.progress.on_complete(&output);
            Ok(output)
        }
        Err(e) => {
            warn!("Sync of '{}' failed: {}", folder, e);
            with.progress.on_failed(&folder, &e.to_string());
            Err(e)
        }
    }
}

async fn run(
    url: &reqwest::Url,
    file_name: &str,
    folder: &str,
    config: &SyncConfig,
    with: Collaborators<'_>,
    total_start: Instant,
) -> Result<SyncOutput, SyncError> {
    let mut stats = SyncStats::default();
    config.ensure_dirs().await?;

    // Download + extraction scratch; removed when this function returns.
    let scratch = tempfile::Builder::new()
        .prefix(".req-")
        .tempdir_in(&config.download_dir)
        .map_err(|e| SyncError::io(&config.download_dir, e))?;
    // Working folder; published by rename on success, purged otherwise.
    let staging = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempdir_in(&config.processed_dir)
        .map_err(|e| SyncError::io(&config.processed_dir, e))?;

    // ── Step 2: Download ─────────────────────────────────────────────────
    with.progress.on_stage(folder, SyncStage::Download);
    let step = Instant::now();
    let archive = scratch.path().join(file_name);
    stats.download_bytes = fetch::download_bundle(url, &archive, config.download_timeout_secs).await?;
    stats.download_ms = step.elapsed().as_millis() as u64;

    // ── Step 3: Extract, normalise, stage ────────────────────────────────
    with.progress.on_stage(folder, SyncStage::Extract);
    let step = Instant::now();
    let extract_dir = scratch.path().join("extracted");
    let staged = extract_bundle(&archive, &extract_dir, staging.path()).await?;
    stats.extract_ms = step.elapsed().as_millis() as u64;

    // ── Step 4: Background, text re-layout, final markup ─────────────────
    match &staged {
        StagedDesign {
            markup: Some(markup_path),
            ..
        } => {
            let step = Instant::now();
            rework_design(markup_path, &extract_dir, staging.path(), scratch.path(), folder, config, with).await?;
            stats.render_ms = step.elapsed().as_millis() as u64;
        }
        StagedDesign {
            markup: None,
            preview: None,
        } => {
            return Err(SyncError::MissingMarkup {
                path: archive.clone(),
            });
        }
        StagedDesign { markup: None, .. } => {
            warn!("Bundle for '{}' has no design markup; packaging the preview only", folder);
        }
    }

    // ── Step 5: Compress raster assets ───────────────────────────────────
    with.progress.on_stage(folder, SyncStage::Compress);
    let step = Instant::now();
    let reports = compress_folder(staging.path(), config.asset_budget_bytes, with.reencoder).await;
    for report in &reports {
        with.progress.on_asset_compressed(folder, report);
    }
    stats.compress_ms = step.elapsed().as_millis() as u64;
    stats.assets = reports.len();
    stats.oversize_assets = reports.iter().filter(|r| !r.within_budget).count();
    stats.failed_assets = reports.iter().filter(|r| r.error.is_some()).count();

    // ── Step 6: Publish the processed folder ─────────────────────────────
    // Held through packaging; another run of the same folder waits here.
    let processed = config.processed_dir.join(folder);
    let _publishing = publish::lock_target(&processed).await;
    publish::publish_dir(staging.path(), &processed).await?;
    drop(scratch);

    // ── Step 7: Package ──────────────────────────────────────────────────
    with.progress.on_stage(folder, SyncStage::Package);
    let step = Instant::now();
    let packaged = package::package_folder(folder, &processed, &config.output_dir).await?;
    stats.package_ms = step.elapsed().as_millis() as u64;
    stats.total_ms = total_start.elapsed().as_millis() as u64;

    let public = |path: &Path| -> String {
        config.public_url(path.strip_prefix(&config.output_dir).unwrap_or(path))
    };
    info!(
        "Sync of '{}' complete: {} assets ({} oversize, {} failed), {}ms total",
        folder, stats.assets, stats.oversize_assets, stats.failed_assets, stats.total_ms
    );

    Ok(SyncOutput {
        folder_name: folder.to_string(),
        zip_url: public(&packaged.zip_path),
        preview_url: packaged.preview_path.as_deref().map(public),
        zip_path: packaged.zip_path,
        preview_path: packaged.preview_path,
        reports,
        stats,
    })
}

/// Rasterise the background and rewrite `current.svg` into its final form.
async fn rework_design(
    markup_path: &Path,
    asset_root: &Path,
    staging_dir: &Path,
    scratch_dir: &Path,
    folder: &str,
    config: &SyncConfig,
    with: Collaborators<'_>,
) -> Result<(), SyncError> {
    let markup = tokio::fs::read_to_string(markup_path)
        .await
        .map_err(|e| SyncError::io(markup_path, e))?;

    with.progress.on_stage(folder, SyncStage::Render);
    let layers = parse_layers(&markup, markup_path)?;
    let canvas = canvas_size(&layers);
    if canvas.is_empty() {
        return Err(SyncError::EmptyCanvas {
            path: markup_path.to_path_buf(),
        });
    }
    let composite: Vec<Layer> = composite_layers(&layers).into_iter().cloned().collect();
    debug!("{} of {} layers composited into the background", composite.len(), layers.len());

    let root = asset_root.to_path_buf();
    let embedded = tokio::task::spawn_blocking(move || {
        let refs: Vec<&Layer> = composite.iter().collect();
        embed_layers(&refs, &root)
    })
    .await
    .map_err(|e| SyncError::Internal(format!("Asset embedding task panicked: {}", e)))?;

    let background_svg = compose::compose_background(&embedded);
    let background_png = staging_dir.join(assemble::BACKGROUND_IMAGE);
    render_background(with.rasterizer, &background_svg, canvas, &background_png, scratch_dir).await?;

    with.progress.on_stage(folder, SyncStage::Relayout);
    let relaid = text::relayout_text(&markup, &config.roles, markup_path)?;
    let final_markup = assemble::assemble_final(&relaid, markup_path)?;
    tokio::fs::write(markup_path, final_markup)
        .await
        .map_err(|e| SyncError::io(markup_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::compress::ToolReencoder;
    use crate::pipeline::rasterize::SvgExport;
    use crate::progress::NoopProgressCallback;

    #[test]
    fn request_accepts_string_or_number_ids() {
        let req: BundleRequest =
            serde_json::from_str(r#"{"link":"https://x/a.jpg","id":42,"imgNo":7}"#).unwrap();
        assert_eq!(req.id, Some(CallerId::Number(42)));
        assert_eq!(req.img_no, Some(7));

        let req: BundleRequest = serde_json::from_str(r#"{"link":"https://x/a.jpg","id":"abc"}"#).unwrap();
        assert_eq!(req.id, Some(CallerId::Text("abc".into())));
        assert_eq!(req.id.unwrap().to_string(), "abc");
    }

    #[test]
    fn empty_body_deserialises() {
        let req: BundleRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req, BundleRequest::default());
    }

    async fn run_request(request: BundleRequest) -> Result<SyncOutput, SyncError> {
        let root = tempfile::tempdir().unwrap();
        let config = SyncConfig::builder().data_root(root.path()).build().unwrap();
        process_bundle(
            &request,
            &config,
            Collaborators {
                rasterizer: &SvgExport::default(),
                reencoder: &ToolReencoder::default(),
                progress: &NoopProgressCallback,
            },
        )
        .await
    }

    #[tokio::test]
    async fn missing_or_blank_link_is_rejected() {
        let err = run_request(BundleRequest::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingLink));

        let err = run_request(BundleRequest::new("   ")).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingLink));
    }

    #[tokio::test]
    async fn relative_link_is_invalid() {
        let err = run_request(BundleRequest::new("cards/design-p.jpg")).await.unwrap_err();
        assert!(err.is_client_error(), "{err}");
    }
}
