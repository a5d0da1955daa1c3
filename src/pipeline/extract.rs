//! Bundle extraction and file-name normalisation.
//!
//! A CRDesign bundle is a plain zip container whose members use `dg`-prefixed
//! extensions (`photo.dgjpg`, `frame.dgpng`, `layout.dgsvg`). After
//! extraction those are renamed to their standard equivalents so the
//! rasteriser and the re-encoders recognise them, then the design markup and
//! the preview thumbnail are copied into the staging folder under canonical
//! names.
//!
//! Zip handling and the directory walks are blocking, so the public entry
//! point runs them on the blocking pool.

use crate::error::SyncError;
use crate::pipeline::walk::{extension_lower, files_matching, files_under};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Canonical name of the design markup inside the staging folder.
pub const MARKUP_FILE: &str = "current.svg";

/// Canonical name of the preview thumbnail inside the staging folder.
pub const PREVIEW_FILE: &str = "preview.png";

const MARKUP_EXTENSION: &str = "svg";
const PREVIEW_EXTENSION: &str = "prib";

static DG_PNG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.dgpng$").unwrap());
static DG_JPG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.dgjpg$").unwrap());
static DG_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.dg").unwrap());

/// What extraction left in the staging folder.
#[derive(Debug, Clone, Default)]
pub struct StagedDesign {
    /// `current.svg` in the staging folder, when the bundle had markup.
    pub markup: Option<PathBuf>,
    /// `preview.png` in the staging folder, when the bundle had a thumbnail.
    pub preview: Option<PathBuf>,
}

/// Extract `archive` into `extract_dir`, normalise names, and stage the
/// design files into `staging_dir`.
pub async fn extract_bundle(
    archive: &Path,
    extract_dir: &Path,
    staging_dir: &Path,
) -> Result<StagedDesign, SyncError> {
    let archive = archive.to_path_buf();
    let extract_dir = extract_dir.to_path_buf();
    let staging_dir = staging_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        extract_archive(&archive, &extract_dir)?;
        let renamed = normalize_names(&extract_dir)?;
        debug!("Renamed {} bundle members", renamed);
        let files = collect_design_files(&extract_dir);
        stage_design_files(&files, &staging_dir)
    })
    .await
    .map_err(|e| SyncError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Extract every entry of the zip container at `archive` into `dest`.
///
/// The file extension is ignored: bundles are zip containers whatever they are
/// called. Entries whose names would escape `dest` are refused by the reader.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), SyncError> {
    let corrupt = |detail: String| SyncError::CorruptArchive {
        path: archive.to_path_buf(),
        detail,
    };

    let file = std::fs::File::open(archive).map_err(|e| SyncError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;
    let entries = zip.len();

    std::fs::create_dir_all(dest).map_err(|e| SyncError::io(dest, e))?;
    zip.extract(dest).map_err(|e| corrupt(e.to_string()))?;

    info!("Extracted {} entries to {}", entries, dest.display());
    Ok(())
}

/// Standard file name for a bundle member, or `None` when already standard.
pub fn normalized_file_name(name: &str) -> Option<String> {
    let renamed = DG_PNG.replace(name, ".png");
    let renamed = DG_JPG.replace(&renamed, ".jpg");
    let renamed = DG_SEGMENT.replace_all(&renamed, ".");
    if renamed == name {
        None
    } else {
        Some(renamed.into_owned())
    }
}

/// Rename every `dg`-suffixed file under `root`; returns how many were renamed.
pub fn normalize_names(root: &Path) -> Result<usize, SyncError> {
    let mut renamed = 0;
    for path in files_under(root) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(new_name) = normalized_file_name(name) else {
            continue;
        };
        let target = path.with_file_name(&new_name);
        std::fs::rename(&path, &target).map_err(|e| SyncError::io(&path, e))?;
        debug!("Renamed {} → {}", name, new_name);
        renamed += 1;
    }
    Ok(renamed)
}

/// Markup (`.svg`) and thumbnail (`.prib`) files under `root`, in walk order.
pub fn collect_design_files(root: &Path) -> Vec<PathBuf> {
    files_matching(root, |p| {
        matches!(
            extension_lower(p).as_deref(),
            Some(MARKUP_EXTENSION) | Some(PREVIEW_EXTENSION)
        )
    })
}

/// Copy the first markup file to `current.svg` and the first thumbnail to
/// `preview.png` inside `staging_dir`.
pub fn stage_design_files(files: &[PathBuf], staging_dir: &Path) -> Result<StagedDesign, SyncError> {
    std::fs::create_dir_all(staging_dir).map_err(|e| SyncError::io(staging_dir, e))?;

    let first_with = |ext: &str| {
        let mut matching = files
            .iter()
            .filter(|p| extension_lower(p).as_deref() == Some(ext));
        let first = matching.next();
        let extra = matching.count();
        if extra > 0 {
            warn!(
                "Bundle holds {} .{} files; only {} is used",
                extra + 1,
                ext,
                first.map(|p| p.display().to_string()).unwrap_or_default()
            );
        }
        first
    };

    let mut staged = StagedDesign::default();

    if let Some(source) = first_with(MARKUP_EXTENSION) {
        let dest = staging_dir.join(MARKUP_FILE);
        std::fs::copy(source, &dest).map_err(|e| SyncError::io(source, e))?;
        staged.markup = Some(dest);
    }
    if let Some(source) = first_with(PREVIEW_EXTENSION) {
        let dest = staging_dir.join(PREVIEW_FILE);
        std::fs::copy(source, &dest).map_err(|e| SyncError::io(source, e))?;
        staged.preview = Some(dest);
    }

    if staged.markup.is_none() {
        warn!("Bundle contains no .svg design markup");
    }
    Ok(staged)
}
