//! Progress-callback trait for pipeline events.
//!
//! Pass a [`SyncProgressCallback`] to [`crate::sync::process_bundle`] to
//! observe a run as it moves through its stages. The HTTP service uses the
//! no-op implementation; the CLI logs each stage.
//!
//! # Example
//!
//! ```rust
//! use crdesign_sync::{SyncProgressCallback, SyncStage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct StageCounter(AtomicUsize);
//!
//! impl SyncProgressCallback for StageCounter {
//!     fn on_stage(&self, _folder: &str, _stage: SyncStage) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = StageCounter(AtomicUsize::new(0));
//! counter.on_stage("1234", SyncStage::Download);
//! assert_eq!(counter.0.load(Ordering::SeqCst), 1);
//! ```

use crate::output::{CompressionReport, SyncOutput};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStage {
    Download,
    Extract,
    Render,
    Relayout,
    Compress,
    Package,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::Download => "download",
            SyncStage::Extract => "extract",
            SyncStage::Render => "render",
            SyncStage::Relayout => "relayout",
            SyncStage::Compress => "compress",
            SyncStage::Package => "package",
        };
        f.write_str(name)
    }
}

/// Called by the pipeline as one bundle is processed.
///
/// All methods default to no-ops so implementors override only what they
/// need. Implementations must be `Send + Sync`: the server runs many
/// requests at once and may share one callback between them.
pub trait SyncProgressCallback: Send + Sync {
    /// A stage is about to start.
    fn on_stage(&self, folder: &str, stage: SyncStage) {
        let _ = (folder, stage);
    }

    /// One raster asset has been through the compression ladder.
    fn on_asset_compressed(&self, folder: &str, report: &CompressionReport) {
        let _ = (folder, report);
    }

    /// The bundle has been published.
    fn on_complete(&self, output: &SyncOutput) {
        let _ = output;
    }

    /// The run failed; nothing was published.
    fn on_failed(&self, folder: &str, error: &str) {
        let _ = (folder, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SyncProgressCallback for NoopProgressCallback {}

/// Shared callback handle.
pub type ProgressCallback = Arc<dyn SyncProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SyncStats;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<SyncStage>>,
        failures: Mutex<Vec<String>>,
    }

    impl SyncProgressCallback for Recorder {
        fn on_stage(&self, _folder: &str, stage: SyncStage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_failed(&self, _folder: &str, error: &str) {
            self.failures.lock().unwrap().push(error.to_string());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage("a", SyncStage::Download);
        cb.on_failed("a", "boom");
        cb.on_complete(&SyncOutput {
            folder_name: "a".into(),
            zip_path: PathBuf::from("a.zip"),
            preview_path: None,
            zip_url: "/files/a/a.zip".into(),
            preview_url: None,
            reports: vec![],
            stats: SyncStats::default(),
        });
    }

    #[test]
    fn recorder_sees_overridden_events_only() {
        let rec = Recorder::default();
        rec.on_stage("a", SyncStage::Extract);
        rec.on_stage("a", SyncStage::Render);
        rec.on_failed("a", "no canvas");
        assert_eq!(*rec.stages.lock().unwrap(), [SyncStage::Extract, SyncStage::Render]);
        assert_eq!(rec.failures.lock().unwrap().len(), 1);
    }

    #[test]
    fn stage_names_are_lowercase() {
        assert_eq!(SyncStage::Relayout.to_string(), "relayout");
        assert_eq!(serde_json::to_string(&SyncStage::Package).unwrap(), "\"package\"");
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage("x", SyncStage::Compress);
    }
}
