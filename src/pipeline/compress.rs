//! Iterative per-asset compression towards a byte budget.
//!
//! Every `.png` / `.jpg` / `.jpeg` file under the working folder walks an
//! ordered preset ladder, strongest quality first. Each preset re-encodes the
//! *pristine* original into a candidate file; the candidate replaces the
//! asset only when it is smaller than the best result so far, so an asset
//! never grows. The ladder stops at the first result within budget.
//!
//! The actual encoders sit behind [`Reencoder`]. [`ToolReencoder`] runs
//! `pngquant` for PNG and the `image` crate's JPEG encoder for JPEG.

use crate::error::AssetError;
use crate::output::{CompressionAttempt, CompressionReport};
use crate::pipeline::walk::{extension_lower, files_matching};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

// ── Presets ──────────────────────────────────────────────────────────────

/// One step of a compression ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum Preset {
    /// pngquant quality range (0–100) and speed (1 = slowest, best).
    Png { min: u8, max: u8, speed: u8 },
    /// JPEG quality (1–100).
    Jpeg { quality: u8 },
}

pub const PNG_PRESETS: [Preset; 4] = [
    Preset::Png { min: 70, max: 90, speed: 1 },
    Preset::Png { min: 55, max: 75, speed: 1 },
    Preset::Png { min: 40, max: 60, speed: 1 },
    Preset::Png { min: 25, max: 45, speed: 1 },
];

pub const JPEG_PRESETS: [Preset; 5] = [
    Preset::Jpeg { quality: 95 },
    Preset::Jpeg { quality: 85 },
    Preset::Jpeg { quality: 75 },
    Preset::Jpeg { quality: 65 },
    Preset::Jpeg { quality: 55 },
];

/// Raster formats the engine knows how to shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match extension_lower(path)?.as_str() {
            "png" => Some(RasterFormat::Png),
            "jpg" | "jpeg" => Some(RasterFormat::Jpeg),
            _ => None,
        }
    }

    pub fn presets(self) -> &'static [Preset] {
        match self {
            RasterFormat::Png => &PNG_PRESETS,
            RasterFormat::Jpeg => &JPEG_PRESETS,
        }
    }
}

// ── Re-encoder seam ──────────────────────────────────────────────────────

/// Outcome of a single re-encode call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reencoded {
    /// `dest` now holds a candidate.
    Written,
    /// The encoder declined this preset (e.g. quality floor not reachable).
    Skipped(String),
}

/// Re-encodes `source` into `dest` using one preset.
#[async_trait]
pub trait Reencoder: Send + Sync {
    async fn reencode(&self, source: &Path, dest: &Path, preset: Preset) -> Result<Reencoded, AssetError>;
}

/// pngquant exit codes that mean "could not meet the requested quality".
const PNGQUANT_SKIP_CODES: [i32; 2] = [98, 99];

/// Default re-encoder: `pngquant` process for PNG, in-process JPEG encoder.
#[derive(Debug, Clone)]
pub struct ToolReencoder {
    pngquant: String,
}

impl ToolReencoder {
    pub fn new(pngquant: impl Into<String>) -> Self {
        Self {
            pngquant: pngquant.into(),
        }
    }

    async fn pngquant(&self, source: &Path, dest: &Path, min: u8, max: u8, speed: u8) -> Result<Reencoded, AssetError> {
        let output = Command::new(&self.pngquant)
            .arg(format!("--quality={}-{}", min, max))
            .arg("--speed")
            .arg(speed.to_string())
            .arg("--force")
            .arg("--output")
            .arg(dest)
            .arg("--")
            .arg(source)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AssetError::ReencodeFailed {
                path: source.to_path_buf(),
                detail: format!("could not start '{}': {}", self.pngquant, e),
            })?;

        match output.status.code() {
            Some(0) => Ok(Reencoded::Written),
            Some(code) if PNGQUANT_SKIP_CODES.contains(&code) => {
                Ok(Reencoded::Skipped(format!("pngquant exit code {}", code)))
            }
            _ => Err(AssetError::ReencodeFailed {
                path: source.to_path_buf(),
                detail: format!(
                    "'{}' exited with {}: {}",
                    self.pngquant,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }),
        }
    }
}

impl Default for ToolReencoder {
    fn default() -> Self {
        Self::new("pngquant")
    }
}

#[async_trait]
impl Reencoder for ToolReencoder {
    async fn reencode(&self, source: &Path, dest: &Path, preset: Preset) -> Result<Reencoded, AssetError> {
        match preset {
            Preset::Png { min, max, speed } => self.pngquant(source, dest, min, max, speed).await,
            Preset::Jpeg { quality } => {
                let source = source.to_path_buf();
                let dest = dest.to_path_buf();
                tokio::task::spawn_blocking(move || encode_jpeg_blocking(&source, &dest, quality))
                    .await
                    .map_err(|e| AssetError::ReencodeFailed {
                        path: PathBuf::new(),
                        detail: format!("encoder task panicked: {}", e),
                    })?
            }
        }
    }
}

fn encode_jpeg_blocking(source: &Path, dest: &Path, quality: u8) -> Result<Reencoded, AssetError> {
    use image::codecs::jpeg::JpegEncoder;
    use image::DynamicImage;
    use std::io::Write;

    let failed = |detail: String| AssetError::ReencodeFailed {
        path: source.to_path_buf(),
        detail,
    };

    let img = image::ImageReader::open(source)
        .map_err(|e| failed(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| failed(e.to_string()))?
        .decode()
        .map_err(|e| failed(e.to_string()))?;
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let file = std::fs::File::create(dest).map_err(|e| AssetError::Io {
        path: dest.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut writer = std::io::BufWriter::new(file);
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))
        .map_err(|e| failed(e.to_string()))?;
    writer.flush().map_err(|e| AssetError::Io {
        path: dest.to_path_buf(),
        detail: e.to_string(),
    })?;
    Ok(Reencoded::Written)
}

// ── Engine ───────────────────────────────────────────────────────────────

/// Compress every raster asset under `root` towards `budget` bytes.
///
/// Assets are processed one after another in walk order. A failing asset is
/// logged and reported; the remaining assets are still processed.
pub async fn compress_folder(root: &Path, budget: u64, reencoder: &dyn Reencoder) -> Vec<CompressionReport> {
    let walk_root = root.to_path_buf();
    let assets = match tokio::task::spawn_blocking(move || {
        files_matching(&walk_root, |p| RasterFormat::from_path(p).is_some())
    })
    .await
    {
        Ok(files) => files,
        Err(e) => {
            error!("Asset walk of {} failed: {}", root.display(), e);
            return Vec::new();
        }
    };
    info!("Compressing {} raster assets under {}", assets.len(), root.display());

    let mut reports = Vec::with_capacity(assets.len());
    for asset in assets {
        let report = compress_file(&asset, budget, reencoder).await;
        let rel = asset.strip_prefix(root).unwrap_or(&asset).to_path_buf();
        reports.push(CompressionReport { path: rel, ..report });
    }
    reports
}

/// Walk one asset down its preset ladder.
///
/// The returned report carries the asset's full path.
pub async fn compress_file(path: &Path, budget: u64, reencoder: &dyn Reencoder) -> CompressionReport {
    let mut report = CompressionReport {
        path: path.to_path_buf(),
        original_bytes: 0,
        final_bytes: 0,
        attempts: Vec::new(),
        within_budget: false,
        error: None,
    };

    let Some(format) = RasterFormat::from_path(path) else {
        return report;
    };

    let original = match tokio::fs::metadata(path).await {
        Ok(m) => m.len(),
        Err(e) => {
            error!("Cannot stat {}: {}", path.display(), e);
            report.error = Some(AssetError::Io {
                path: path.to_path_buf(),
                detail: e.to_string(),
            });
            return report;
        }
    };
    report.original_bytes = original;
    report.final_bytes = original;

    if let Err(e) = run_ladder(path, format, budget, reencoder, &mut report).await {
        error!("Compression of {} failed: {}", path.display(), e);
        report.error = Some(e);
    }

    report.within_budget = report.final_bytes <= budget;
    if report.within_budget {
        info!(
            "Compressed {}: {} KB → {} KB in {} attempt(s)",
            path.display(),
            report.original_bytes / 1024,
            report.final_bytes / 1024,
            report.attempts.len()
        );
    } else {
        warn!(
            "{} is still {} KB after {} attempt(s) (budget {} KB)",
            path.display(),
            report.final_bytes / 1024,
            report.attempts.len(),
            budget / 1024
        );
    }
    report
}

async fn run_ladder(
    path: &Path,
    format: RasterFormat,
    budget: u64,
    reencoder: &dyn Reencoder,
    report: &mut CompressionReport,
) -> Result<(), AssetError> {
    let io_err = |p: &Path, e: std::io::Error| AssetError::Io {
        path: p.to_path_buf(),
        detail: e.to_string(),
    };
    let dir = path.parent().unwrap_or(Path::new("."));
    let suffix = format!(".{}", extension_lower(path).unwrap_or_default());

    let pristine = scratch_file(dir, ".pristine-", &suffix).map_err(|e| io_err(dir, e))?;
    tokio::fs::copy(path, pristine.path())
        .await
        .map_err(|e| io_err(path, e))?;

    for preset in format.presets() {
        let candidate = scratch_file(dir, ".candidate-", &suffix).map_err(|e| io_err(dir, e))?;
        match reencoder.reencode(pristine.path(), candidate.path(), *preset).await? {
            Reencoded::Skipped(reason) => {
                debug!("{}: preset {:?} skipped ({})", path.display(), preset, reason);
                report.attempts.push(CompressionAttempt {
                    preset: *preset,
                    candidate_bytes: None,
                    kept: false,
                });
            }
            Reencoded::Written => {
                let size = tokio::fs::metadata(candidate.path())
                    .await
                    .map_err(|e| io_err(candidate.path(), e))?
                    .len();
                let kept = size > 0 && size < report.final_bytes;
                debug!("{}: preset {:?} → {} bytes (kept: {})", path.display(), preset, size, kept);
                if kept {
                    candidate.persist(path).map_err(|e| io_err(path, e.error))?;
                    report.final_bytes = size;
                }
                report.attempts.push(CompressionAttempt {
                    preset: *preset,
                    candidate_bytes: Some(size),
                    kept,
                });
            }
        }
        if report.final_bytes <= budget {
            break;
        }
    }
    Ok(())
}

fn scratch_file(dir: &Path, prefix: &str, suffix: &str) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new().prefix(prefix).suffix(suffix).tempfile_in(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KIB: u64 = 1024;

    /// Writes a candidate whose size depends only on the preset's position
    /// in its ladder. Sources starting with `X` fail.
    struct Ladder {
        sizes: Vec<u64>,
    }

    #[async_trait]
    impl Reencoder for Ladder {
        async fn reencode(&self, source: &Path, dest: &Path, preset: Preset) -> Result<Reencoded, AssetError> {
            let bytes = std::fs::read(source).unwrap();
            if bytes.first() == Some(&b'X') {
                return Err(AssetError::ReencodeFailed {
                    path: source.to_path_buf(),
                    detail: "boom".into(),
                });
            }
            let ladder: &[Preset] = match preset {
                Preset::Png { .. } => &PNG_PRESETS,
                Preset::Jpeg { .. } => &JPEG_PRESETS,
            };
            let idx = ladder.iter().position(|p| *p == preset).unwrap();
            match self.sizes.get(idx) {
                Some(0) => Ok(Reencoded::Skipped("declined".into())),
                Some(&n) => {
                    std::fs::write(dest, vec![b'c'; n as usize]).unwrap();
                    Ok(Reencoded::Written)
                }
                None => Ok(Reencoded::Skipped("no size".into())),
            }
        }
    }

    fn write_asset(dir: &Path, name: &str, size: u64) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, vec![b'o'; size as usize]).unwrap();
        p
    }

    fn no_scratch_left(dir: &Path) -> bool {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .all(|e| !e.file_name().to_string_lossy().starts_with('.'))
    }

    #[test]
    fn formats_by_extension() {
        assert_eq!(RasterFormat::from_path(Path::new("a.PNG")), Some(RasterFormat::Png));
        assert_eq!(RasterFormat::from_path(Path::new("a.jpeg")), Some(RasterFormat::Jpeg));
        assert_eq!(RasterFormat::from_path(Path::new("a.svg")), None);
        assert_eq!(RasterFormat::Png.presets().len(), 4);
        assert_eq!(RasterFormat::Jpeg.presets().len(), 5);
    }

    #[tokio::test]
    async fn large_png_stops_once_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_asset(dir.path(), "bg.png", 400 * KIB);
        let reencoder = Ladder {
            sizes: vec![200 * KIB, 100 * KIB, 50 * KIB, 25 * KIB],
        };

        let report = compress_file(&asset, 150 * KIB, &reencoder).await;

        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.original_bytes, 400 * KIB);
        assert_eq!(report.final_bytes, 100 * KIB);
        assert!(report.within_budget);
        assert!(report.error.is_none());
        assert_eq!(std::fs::metadata(&asset).unwrap().len(), 100 * KIB);
        assert!(no_scratch_left(dir.path()));
    }

    #[tokio::test]
    async fn never_grows_and_keeps_best_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_asset(dir.path(), "photo.jpg", 400 * KIB);
        let reencoder = Ladder {
            sizes: vec![300 * KIB, 350 * KIB, 0, 500 * KIB, 200 * KIB],
        };

        let report = compress_file(&asset, 150 * KIB, &reencoder).await;

        assert_eq!(report.attempts.len(), 5);
        let kept: Vec<bool> = report.attempts.iter().map(|a| a.kept).collect();
        assert_eq!(kept, [true, false, false, false, true]);
        assert_eq!(report.attempts[2].candidate_bytes, None);
        assert_eq!(report.final_bytes, 200 * KIB);
        assert!(!report.within_budget);
        assert_eq!(std::fs::metadata(&asset).unwrap().len(), 200 * KIB);
    }

    #[tokio::test]
    async fn small_asset_still_gets_one_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let asset = write_asset(dir.path(), "icon.png", 10 * KIB);
        let reencoder = Ladder {
            sizes: vec![20 * KIB],
        };

        let report = compress_file(&asset, 150 * KIB, &reencoder).await;

        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.final_bytes, 10 * KIB);
        assert!(report.within_budget);
    }

    #[tokio::test]
    async fn failing_asset_does_not_stop_the_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Images")).unwrap();
        std::fs::write(dir.path().join("Images/bad.png"), b"X broken").unwrap();
        write_asset(&dir.path().join("Images"), "good.png", 300 * KIB);
        std::fs::write(dir.path().join("current.svg"), b"<svg/>").unwrap();
        let reencoder = Ladder {
            sizes: vec![100 * KIB],
        };

        let reports = compress_folder(dir.path(), 150 * KIB, &reencoder).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].path, PathBuf::from("Images/bad.png"));
        assert!(matches!(reports[0].error, Some(AssetError::ReencodeFailed { .. })));
        assert_eq!(std::fs::read(dir.path().join("Images/bad.png")).unwrap(), b"X broken");
        assert_eq!(reports[1].path, PathBuf::from("Images/good.png"));
        assert_eq!(reports[1].final_bytes, 100 * KIB);
        assert!(no_scratch_left(&dir.path().join("Images")));
    }

    #[tokio::test]
    async fn jpeg_encoder_writes_a_decodable_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("in.jpg");
        let img = image::RgbImage::from_fn(64, 64, |x, y| image::Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
        img.save(&source).unwrap();
        let dest = dir.path().join("out.jpg");

        let outcome = ToolReencoder::default()
            .reencode(&source, &dest, Preset::Jpeg { quality: 55 })
            .await
            .unwrap();

        assert_eq!(outcome, Reencoded::Written);
        let decoded = image::open(&dest).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[tokio::test]
    async fn missing_pngquant_is_an_asset_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_asset(dir.path(), "a.png", 10);
        let err = ToolReencoder::new("definitely-not-pngquant")
            .reencode(&source, &dir.path().join("b.png"), PNG_PRESETS[0])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not start"));
    }
}
