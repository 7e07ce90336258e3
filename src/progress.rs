//! Progress-callback trait for per-stage extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves from download to the final metadata record.
//!
//! # Example
//!
//! ```rust
//! use arxiv_figures::{ExtractionConfig, ExtractionProgressCallback, ImageArtifact};
//! use std::sync::Arc;
//!
//! struct PrintSaved;
//!
//! impl ExtractionProgressCallback for PrintSaved {
//!     fn on_figure_saved(&self, index: usize, artifact: &ImageArtifact) {
//!         eprintln!("#{index}: figure {} → {}", artifact.figure_number, artifact.stored_filename);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(PrintSaved) as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{ExtractionStatus, ImageArtifact, Stage};
use std::sync::Arc;

/// Called by the pipeline as it moves through its stages.
///
/// Implementations must be `Send + Sync`; the two downloads run
/// concurrently. All methods default to no-ops so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes.
    ///
    /// # Arguments
    /// * `stage` — the stage that finished
    /// * `items` — what it produced: bytes for downloads, characters for
    ///   source text, records for captions/matches, files for materialize
    fn on_stage_complete(&self, stage: Stage, items: usize) {
        let _ = (stage, items);
    }

    /// Called after a figure image has been written to the store.
    ///
    /// `index` is the 1-based sequence index used in the stored file name.
    fn on_figure_saved(&self, index: usize, artifact: &ImageArtifact) {
        let _ = (index, artifact);
    }

    /// Called when a matched figure could not be extracted.
    fn on_figure_skipped(&self, figure_number: &str, reason: &str) {
        let _ = (figure_number, reason);
    }

    /// Called once with the terminal state of a non-fatal run.
    fn on_extraction_complete(&self, status: ExtractionStatus, images: usize) {
        let _ = (status, images);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        stages: AtomicUsize,
        saved: AtomicUsize,
        skipped: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_stage_start(&self, _stage: Stage) {
            self.stages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_figure_saved(&self, _index: usize, _artifact: &ImageArtifact) {
            self.saved.fetch_add(1, Ordering::SeqCst);
        }

        fn on_figure_skipped(&self, _figure_number: &str, _reason: &str) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Download);
        cb.on_stage_complete(Stage::Download, 1024);
        cb.on_figure_skipped("2", "missing");
        cb.on_extraction_complete(ExtractionStatus::Success, 0);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            stages: AtomicUsize::new(0),
            saved: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        };
        let artifact = ImageArtifact {
            figure_number: "1".into(),
            stored_filename: "x_1.png".into(),
            original_path: "a.png".into(),
            caption: "c".into(),
        };

        tracker.on_stage_start(Stage::Captions);
        tracker.on_stage_start(Stage::Matching);
        tracker.on_figure_saved(1, &artifact);
        tracker.on_figure_skipped("2", "not found");

        assert_eq!(tracker.stages.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.saved.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skipped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn ExtractionProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Materialize);
        cb.on_stage_complete(Stage::Materialize, 3);
    }
}
