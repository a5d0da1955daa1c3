//! Shared fixtures for the integration tests: fake collaborators, a bundle
//! builder, and a throwaway origin server.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use crdesign_sync::pipeline::compress::{JPEG_PRESETS, PNG_PRESETS};
use crdesign_sync::{AppState, AssetError, Canvas, Preset, Rasterizer, Reencoded, Reencoder, SyncConfig, SyncError};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const KIB: usize = 1024;

/// Writes a fixed-size PNG stand-in and records what it was asked to draw.
#[derive(Default)]
pub struct FakeRasterizer {
    pub calls: Mutex<Vec<(String, Canvas)>>,
}

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(&self, svg: &Path, png: &Path, canvas: Canvas) -> Result<(), SyncError> {
        let markup = std::fs::read_to_string(svg).unwrap();
        self.calls.lock().unwrap().push((markup, canvas));
        std::fs::write(png, vec![0u8; 400 * KIB]).unwrap();
        Ok(())
    }
}

/// Halves the pristine size once per step down the ladder.
pub struct HalvingReencoder;

#[async_trait]
impl Reencoder for HalvingReencoder {
    async fn reencode(&self, source: &Path, dest: &Path, preset: Preset) -> Result<Reencoded, AssetError> {
        let len = std::fs::metadata(source).unwrap().len() as usize;
        let ladder: &[Preset] = match preset {
            Preset::Png { .. } => &PNG_PRESETS,
            Preset::Jpeg { .. } => &JPEG_PRESETS,
        };
        let step = ladder.iter().position(|p| *p == preset).unwrap();
        std::fs::write(dest, vec![1u8; len >> (step + 1)]).unwrap();
        Ok(Reencoded::Written)
    }
}

pub const DESIGN_MARKUP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="600" height="400">
  <image Dg_type="DgBackGround" x="0" y="0" width="600" height="400" xlink:href="Images/bg.dgpng"/>
  <image Dg_type="DgClipart" x="20" y="30" width="80" height="40" DgAngleZ="15" xlink:href="Design/Clipart/Logos/acme.dgpng"/>
  <image Dg_type="DgPhoto" x="400" y="100" width="120" height="140" xlink:href="Design/photo.dgjpg"/>
  <text Dg_type="DgTitle" x="5" y="5" Text="Business Card"/>
  <text x="10" y="300" width="200" height="20" DgTitleColor="336699" Text="Manager"/>
</svg>
"#;

/// A CRDesign bundle as the catalog serves it.
pub fn bundle_bytes() -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    let thumb = vec![7u8; 2 * KIB];
    let entries: [(&str, &[u8]); 5] = [
        ("Design/layout.dgsvg", DESIGN_MARKUP.as_bytes()),
        ("Images/bg.dgpng", b"background-bytes".as_slice()),
        ("Design/Clipart/Logos/acme.dgpng", b"logo-bytes".as_slice()),
        ("Design/photo.dgjpg", b"photo-bytes".as_slice()),
        ("thumb.prib", thumb.as_slice()),
    ];
    for (name, data) in entries {
        zip.start_file(name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A zip container with nothing a design bundle would hold.
pub fn unrelated_zip_bytes() -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    zip.start_file("notes.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"not a design").unwrap();
    zip.finish().unwrap().into_inner()
}

/// Serve `bundle_bytes()` at `/cards/design.CRDesign` (plus a few broken
/// bundles) on an ephemeral port.
pub async fn spawn_origin() -> SocketAddr {
    let bundle = bundle_bytes();
    let unrelated = unrelated_zip_bytes();
    let router = Router::new()
        .route(
            "/cards/design.CRDesign",
            get(move || {
                let body = bundle.clone();
                async move { body }
            }),
        )
        .route(
            "/cards/notes.CRDesign",
            get(move || {
                let body = unrelated.clone();
                async move { body }
            }),
        )
        .route("/cards/garbage.CRDesign", get(|| async { "definitely not a zip" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub fn config(root: &Path) -> SyncConfig {
    SyncConfig::builder()
        .data_root(root)
        .download_timeout_secs(10)
        .build()
        .unwrap()
}

pub fn state(root: &Path) -> (AppState, Arc<FakeRasterizer>) {
    let rasterizer = Arc::new(FakeRasterizer::default());
    let state = AppState::new(config(root), rasterizer.clone(), Arc::new(HalvingReencoder));
    (state, rasterizer)
}

/// Names directly under `dir` that start with a dot.
pub fn hidden_entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| n.starts_with('.'))
                .collect()
        })
        .unwrap_or_default()
}
