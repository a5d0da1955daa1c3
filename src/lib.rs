//! # crdesign-sync
//!
//! Download CRDesign bundles, rework them into an editable layered design,
//! and republish them as compact archives.
//!
//! A CRDesign bundle is a zip container holding a vector design (`.dgsvg`),
//! its raster assets (`.dgpng`, `.dgjpg`) and a thumbnail (`.prib`). Editors
//! downstream cannot use it directly: the background is made of many layers,
//! text fields carry sample content, and the assets are far too large. This
//! crate turns one bundle into a small folder an editor can fill in.
//!
//! ## Pipeline Overview
//!
//! ```text
//! catalog link
//!  │
//!  ├─ 1. Link      rewrite to the canonical bundle URL, derive folder name
//!  ├─ 2. Fetch     stream the bundle to a request-scoped scratch dir
//!  ├─ 3. Extract   unzip, normalise `.dg*` names, stage markup + preview
//!  ├─ 4. Render    background + clipart → one SVG → background.png
//!  ├─ 5. Relayout  classify text fields, rewrite them as editable <text>
//!  ├─ 6. Assemble  final current.svg (background, logo, masked profile, texts)
//!  ├─ 7. Compress  every PNG/JPEG down a preset ladder towards 150 KiB
//!  └─ 8. Package   <output>/<name>/<name>.zip + preview.png
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crdesign_sync::{process_bundle, BundleRequest, Collaborators, SyncConfig};
//! use crdesign_sync::{NoopProgressCallback, SvgExport, ToolReencoder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::builder().data_root("downloads").build()?;
//!     let request = BundleRequest::new("https://design.instrasoftsolutions.in/cards/design-p.jpg");
//!     let with = Collaborators {
//!         rasterizer: &SvgExport::default(),
//!         reencoder: &ToolReencoder::default(),
//!         progress: &NoopProgressCallback,
//!     };
//!     let output = process_bundle(&request, &config, with).await?;
//!     println!("{}", output.zip_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `crdesign-sync` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## External programs
//!
//! Rasterisation runs `svgexport` and PNG quantisation runs `pngquant`; both
//! sit behind traits ([`Rasterizer`], [`Reencoder`]) and can be replaced.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod server;
pub mod sync;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{AssetError, SyncError};
pub use output::{CompressionAttempt, CompressionReport, SyncOutput, SyncStats};
pub use pipeline::compress::{Preset, Reencoded, Reencoder, ToolReencoder};
pub use pipeline::layers::Canvas;
pub use pipeline::rasterize::{Rasterizer, SvgExport};
pub use pipeline::text::{TextRole, TextRoles};
pub use progress::{NoopProgressCallback, ProgressCallback, SyncProgressCallback, SyncStage};
pub use server::{build_router, serve, AppState};
pub use sync::{process_bundle, BundleRequest, CallerId, Collaborators};
