//! Configuration types for bundle processing.
//!
//! All pipeline behaviour is controlled through [`SyncConfig`], built via its
//! [`SyncConfigBuilder`]. The config is created once when the host service
//! starts and then shared (behind an `Arc`) by every request; no stage reads
//! process-wide globals for its directories or limits.

use crate::error::SyncError;
use crate::pipeline::text::TextRoles;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Per-asset byte budget the compression engine tries to reach (150 KiB).
pub const DEFAULT_ASSET_BUDGET_BYTES: u64 = 150 * 1024;

/// Extension appended to every canonical bundle link.
pub const DEFAULT_BUNDLE_EXTENSION: &str = "CRDesign";

/// Host every bundle link is rewritten to.
pub const DEFAULT_CANONICAL_HOST: &str = "https://design.instrasoftsolutions.in";

/// Configuration for the bundle processing pipeline.
///
/// Built via [`SyncConfig::builder()`] or using [`SyncConfig::default()`].
///
/// # Example
/// ```rust
/// use crdesign_sync::SyncConfig;
///
/// let config = SyncConfig::builder()
///     .data_root("/var/lib/crdesign")
///     .asset_budget_bytes(100 * 1024)
///     .build()
///     .unwrap();
/// assert!(config.output_dir.ends_with("output"));
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory receiving downloaded bundles. Each request downloads and
    /// extracts into its own temporary subdirectory, removed when done.
    pub download_dir: PathBuf,

    /// Directory holding the published working folders, one per folder name.
    pub processed_dir: PathBuf,

    /// Public output tree: `<output_dir>/<name>/<name>.zip` and
    /// `<output_dir>/<name>/preview.png`. The static server never reads
    /// outside this directory.
    pub output_dir: PathBuf,

    /// Scheme and host every link is rewritten to.
    pub canonical_host: String,

    /// Scheme-and-host prefixes rewritten to [`Self::canonical_host`].
    pub legacy_hosts: Vec<String>,

    /// Extension (without the dot) of the canonical bundle link. Default: `CRDesign`.
    pub bundle_extension: String,

    /// Download timeout in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-asset compression target in bytes. Default: 150 KiB.
    pub asset_budget_bytes: u64,

    /// Program invoked as `<program> <in.svg> <out.png> <W>:<H>`. Default: `svgexport`.
    pub rasterizer_program: String,

    /// pngquant binary used for PNG re-encoding. Default: `pngquant`.
    pub pngquant_program: String,

    /// URL prefix under which the output tree is served. Default: `/files`.
    pub public_prefix: String,

    /// Reference sets for text-role classification.
    pub roles: TextRoles,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let root = PathBuf::from("downloads");
        Self {
            download_dir: root.clone(),
            processed_dir: root.join("processed"),
            output_dir: root.join("output"),
            canonical_host: DEFAULT_CANONICAL_HOST.to_string(),
            legacy_hosts: vec!["http://design.instrasoftsolutions.in".to_string()],
            bundle_extension: DEFAULT_BUNDLE_EXTENSION.to_string(),
            download_timeout_secs: 120,
            asset_budget_bytes: DEFAULT_ASSET_BUDGET_BYTES,
            rasterizer_program: "svgexport".to_string(),
            pngquant_program: "pngquant".to_string(),
            public_prefix: "/files".to_string(),
            roles: TextRoles::default(),
        }
    }
}

impl SyncConfig {
    /// Create a new builder for `SyncConfig`.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder {
            config: Self::default(),
        }
    }

    /// Create the download, processed and output directories.
    ///
    /// Called once at service startup; stages assume the roots exist.
    pub async fn ensure_dirs(&self) -> Result<(), SyncError> {
        for dir in [&self.download_dir, &self.processed_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SyncError::io(dir, e))?;
            debug!("Ensured directory {}", dir.display());
        }
        Ok(())
    }

    /// Public URL of a file inside the output tree.
    pub fn public_url(&self, relative: &Path) -> String {
        let rel = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.public_prefix.trim_end_matches('/'), rel)
    }
}

/// Builder for [`SyncConfig`].
#[derive(Debug)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Place the download, processed and output trees under one root.
    pub fn data_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.config.download_dir = root.to_path_buf();
        self.config.processed_dir = root.join("processed");
        self.config.output_dir = root.join("output");
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = dir.into();
        self
    }

    pub fn processed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.processed_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn canonical_host(mut self, host: impl Into<String>) -> Self {
        self.config.canonical_host = host.into().trim_end_matches('/').to_string();
        self
    }

    pub fn legacy_host(mut self, host: impl Into<String>) -> Self {
        self.config
            .legacy_hosts
            .push(host.into().trim_end_matches('/').to_string());
        self
    }

    pub fn legacy_hosts(mut self, hosts: Vec<String>) -> Self {
        self.config.legacy_hosts = hosts
            .into_iter()
            .map(|h| h.trim_end_matches('/').to_string())
            .collect();
        self
    }

    pub fn bundle_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.bundle_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn asset_budget_bytes(mut self, bytes: u64) -> Self {
        self.config.asset_budget_bytes = bytes;
        self
    }

    pub fn rasterizer_program(mut self, program: impl Into<String>) -> Self {
        self.config.rasterizer_program = program.into();
        self
    }

    pub fn pngquant_program(mut self, program: impl Into<String>) -> Self {
        self.config.pngquant_program = program.into();
        self
    }

    pub fn public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.public_prefix = prefix.into();
        self
    }

    pub fn roles(mut self, roles: TextRoles) -> Self {
        self.config.roles = roles;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SyncConfig, SyncError> {
        let c = &self.config;
        if c.asset_budget_bytes == 0 {
            return Err(SyncError::InvalidConfig(
                "Asset budget must be > 0 bytes".into(),
            ));
        }
        if c.bundle_extension.is_empty()
            || !c.bundle_extension.chars().all(|ch| ch.is_ascii_alphanumeric())
        {
            return Err(SyncError::InvalidConfig(format!(
                "Bundle extension must be alphanumeric, got '{}'",
                c.bundle_extension
            )));
        }
        match reqwest::Url::parse(&c.canonical_host) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(SyncError::InvalidConfig(format!(
                    "Canonical host must be an http(s) URL, got '{}'",
                    c.canonical_host
                )))
            }
        }
        if c.output_dir.starts_with(&c.processed_dir) {
            return Err(SyncError::InvalidConfig(
                "Output directory must not live inside the processed directory".into(),
            ));
        }
        if !c.public_prefix.starts_with('/') {
            return Err(SyncError::InvalidConfig(format!(
                "Public prefix must start with '/', got '{}'",
                c.public_prefix
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = SyncConfig::builder().build().expect("defaults are valid");
        assert_eq!(config.asset_budget_bytes, 150 * 1024);
        assert_eq!(config.bundle_extension, "CRDesign");
        assert_eq!(config.output_dir, PathBuf::from("downloads/output"));
    }

    #[test]
    fn data_root_moves_every_tree() {
        let config = SyncConfig::builder().data_root("/srv/x").build().unwrap();
        assert_eq!(config.download_dir, PathBuf::from("/srv/x"));
        assert_eq!(config.processed_dir, PathBuf::from("/srv/x/processed"));
        assert_eq!(config.output_dir, PathBuf::from("/srv/x/output"));
    }

    #[test]
    fn rejects_zero_budget() {
        let err = SyncConfig::builder().asset_budget_bytes(0).build().unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_non_http_canonical_host() {
        let err = SyncConfig::builder()
            .canonical_host("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ftp://example.com"));
    }

    #[test]
    fn rejects_output_nested_in_processed() {
        let err = SyncConfig::builder()
            .processed_dir("/data/processed")
            .output_dir("/data/processed/output")
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn extension_leading_dot_is_trimmed() {
        let config = SyncConfig::builder().bundle_extension(".Bundle").build().unwrap();
        assert_eq!(config.bundle_extension, "Bundle");
    }

    #[test]
    fn public_url_joins_components() {
        let config = SyncConfig::default();
        assert_eq!(
            config.public_url(Path::new("42/42.zip")),
            "/files/42/42.zip"
        );
    }
}
