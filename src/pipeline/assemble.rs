//! Result assembly: pick the terminal state and persist the metadata record.
//!
//! Only a [`ExtractionStatus::Success`] run writes `{stem}_data.json`;
//! warning outcomes leave any previous record untouched.

use super::fetch::PaperId;
use crate::error::{FigureError, StageError};
use crate::output::{
    CaptionRecord, ExtractionOutcome, ExtractionStats, ExtractionStatus, ImageArtifact,
};
use crate::store::ArtifactStore;
use tracing::info;

/// User-facing message for a terminal state.
pub fn status_message(status: ExtractionStatus, images: usize) -> String {
    match status {
        ExtractionStatus::Success => format!("Processing complete. Found {images} images."),
        ExtractionStatus::NoCaptions => "Failed to extract figures from the PDF.".to_string(),
        ExtractionStatus::NoMatches => {
            "Figures were extracted, but could not be matched with images in the LaTeX source."
                .to_string()
        }
    }
}

/// Outcome for a run that stopped early with a warning. Nothing is written.
pub fn warning(
    id: &PaperId,
    status: ExtractionStatus,
    captions: Vec<CaptionRecord>,
    diagnostics: Vec<StageError>,
    stats: ExtractionStats,
) -> ExtractionOutcome {
    info!("{}: {}", id, status_message(status, 0));
    ExtractionOutcome {
        arxiv_id: id.to_string(),
        status,
        message: status_message(status, 0),
        captions,
        images: Vec::new(),
        diagnostics,
        stats,
    }
}

/// Outcome for a run that reached materialization; persists the record.
///
/// Success holds even when `images` is empty: matching produced candidates,
/// none of which resolved.
pub async fn finish(
    store: &ArtifactStore,
    id: &PaperId,
    captions: Vec<CaptionRecord>,
    images: Vec<ImageArtifact>,
    diagnostics: Vec<StageError>,
    stats: ExtractionStats,
) -> Result<ExtractionOutcome, FigureError> {
    let outcome = ExtractionOutcome {
        arxiv_id: id.to_string(),
        status: ExtractionStatus::Success,
        message: status_message(ExtractionStatus::Success, images.len()),
        captions,
        images,
        diagnostics,
        stats,
    };
    store.write_metadata(id, &outcome.bundle()).await?;
    Ok(outcome)
}
