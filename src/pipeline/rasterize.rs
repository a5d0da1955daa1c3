//! Background rasterisation through an external SVG → PNG converter.
//!
//! Rendering SVG is delegated to a separate program (`svgexport` by default)
//! invoked as `<program> <in.svg> <out.png> <W>:<H>`. The [`Rasterizer`]
//! trait is the seam: the service uses [`SvgExport`], tests plug in a fake.

use crate::error::SyncError;
use crate::pipeline::layers::Canvas;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// Converts an SVG file into a PNG of an exact size.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, svg: &Path, png: &Path, canvas: Canvas) -> Result<(), SyncError>;
}

/// Runs an svgexport-compatible command line.
#[derive(Debug, Clone)]
pub struct SvgExport {
    program: String,
}

impl SvgExport {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SvgExport {
    fn default() -> Self {
        Self::new("svgexport")
    }
}

#[async_trait]
impl Rasterizer for SvgExport {
    async fn rasterize(&self, svg: &Path, png: &Path, canvas: Canvas) -> Result<(), SyncError> {
        let size = format!("{}:{}", canvas.width, canvas.height);
        debug!(
            "Running {} {} {} {}",
            self.program,
            svg.display(),
            png.display(),
            size
        );

        let output = Command::new(&self.program)
            .arg(svg)
            .arg(png)
            .arg(&size)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SyncError::RasterisationFailed {
                detail: format!("could not start '{}': {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::RasterisationFailed {
                detail: format!("'{}' exited with {}: {}", self.program, output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

/// Write `svg` to a scratch file in `scratch_dir` and rasterise it to `png`.
///
/// The scratch file is removed on return, success or not.
pub async fn render_background(
    rasterizer: &dyn Rasterizer,
    svg: &str,
    canvas: Canvas,
    png: &Path,
    scratch_dir: &Path,
) -> Result<(), SyncError> {
    let scratch = tempfile::Builder::new()
        .prefix("composite-")
        .suffix(".svg")
        .tempfile_in(scratch_dir)
        .map_err(|e| SyncError::io(scratch_dir, e))?;
    tokio::fs::write(scratch.path(), svg)
        .await
        .map_err(|e| SyncError::io(scratch.path(), e))?;

    if let Some(parent) = png.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SyncError::io(parent, e))?;
    }

    rasterizer.rasterize(scratch.path(), png, canvas).await?;

    if !tokio::fs::try_exists(png).await.unwrap_or(false) {
        return Err(SyncError::RasterisationFailed {
            detail: format!("rasteriser reported success but wrote no {}", png.display()),
        });
    }

    info!(
        "Rasterised background {}x{} → {}",
        canvas.width,
        canvas.height,
        png.display()
    );
    Ok(())
}
