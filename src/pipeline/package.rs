//! Packaging: zip the processed folder and publish it under the output root.
//!
//! Layout of a published bundle:
//!
//! ```text
//! <output_root>/<name>/<name>.zip    every file of the working folder
//! <output_root>/<name>/preview.png   copy of the thumbnail (optional)
//! ```
//!
//! The directory is assembled under a dot-prefixed temporary name inside
//! `output_root` and renamed into place only once complete; the static file
//! server never serves dot-prefixed components, so readers cannot observe a
//! half-written bundle.

use crate::error::SyncError;
use crate::pipeline::extract::PREVIEW_FILE;
use crate::pipeline::publish;
use crate::pipeline::walk::files_under;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

/// Where a published bundle ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedBundle {
    pub zip_path: PathBuf,
    pub preview_path: Option<PathBuf>,
}

/// Zip `working_dir` into `<output_root>/<folder_name>/<folder_name>.zip`.
///
/// An existing bundle of the same name is replaced; packagings of one name
/// run one at a time.
pub async fn package_folder(
    folder_name: &str,
    working_dir: &Path,
    output_root: &Path,
) -> Result<PackagedBundle, SyncError> {
    let folder_name = folder_name.to_string();
    let working_dir = working_dir.to_path_buf();
    let output_root = output_root.to_path_buf();

    let _publishing = publish::lock_target(&output_root.join(&folder_name)).await;
    tokio::task::spawn_blocking(move || package_blocking(&folder_name, &working_dir, &output_root))
        .await
        .map_err(|e| SyncError::Internal(format!("Packaging task panicked: {}", e)))?
}

fn package_blocking(folder_name: &str, working_dir: &Path, output_root: &Path) -> Result<PackagedBundle, SyncError> {
    let failed = |detail: String| SyncError::PackagingFailed {
        folder: folder_name.to_string(),
        detail,
    };

    std::fs::create_dir_all(output_root).map_err(|e| SyncError::io(output_root, e))?;
    let staging = tempfile::Builder::new()
        .prefix(".pkg-")
        .tempdir_in(output_root)
        .map_err(|e| SyncError::io(output_root, e))?;

    let archive_name = format!("{}.zip", folder_name);
    let entries = write_archive(working_dir, &staging.path().join(&archive_name)).map_err(failed)?;
    debug!("Wrote {} entries to {}", entries, archive_name);

    let source_preview = working_dir.join(PREVIEW_FILE);
    let has_preview = source_preview.is_file();
    if has_preview {
        std::fs::copy(&source_preview, staging.path().join(PREVIEW_FILE))
            .map_err(|e| SyncError::io(&source_preview, e))?;
    } else {
        warn!("No {} in {}; publishing archive only", PREVIEW_FILE, working_dir.display());
    }

    // ── Publish ──────────────────────────────────────────────────────────
    let target = output_root.join(folder_name);
    publish::replace_dir(staging.path(), &target).map_err(|e| SyncError::io(&target, e))?;

    let zip_path = target.join(&archive_name);
    info!("Packaged {} ({} files) → {}", folder_name, entries, zip_path.display());
    Ok(PackagedBundle {
        zip_path,
        preview_path: has_preview.then(|| target.join(PREVIEW_FILE)),
    })
}

/// Deflate (level 9) every file under `root` into a new archive at `dest`.
///
/// Entry names are paths relative to `root` with `/` separators.
fn write_archive(root: &Path, dest: &Path) -> Result<usize, String> {
    let file = File::create(dest).map_err(|e| format!("{}: {}", dest.display(), e))?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    let files = files_under(root);
    for path in &files {
        let rel = path.strip_prefix(root).map_err(|e| e.to_string())?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(name.as_str(), options)
            .map_err(|e| format!("{}: {}", name, e))?;
        let mut src = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        std::io::copy(&mut src, &mut zip).map_err(|e| format!("{}: {}", name, e))?;
    }
    zip.finish().map_err(|e| e.to_string())?;
    Ok(files.len())
}
