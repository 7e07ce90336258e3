//! Output types: the data model flowing through the pipeline and the
//! records handed back to callers.
//!
//! [`CaptionRecord`] and [`FigureMatch`] are *hypotheses* produced by the
//! inference collaborator. [`ImageArtifact`] and [`ResultBundle`] are the
//! only durable outputs; they are what ends up on disk.

use crate::error::{FigureError, StageError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One figure as listed by the caption call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionRecord {
    /// Free-text figure number ("1", "3b", "A.2"); not guaranteed sequential.
    pub figure_number: String,
    pub caption: String,
}

/// A figure paired with the archive path the collaborator believes holds it.
///
/// `file_path` is unverified: it may be misspelled, missing an extension, or
/// point at nothing at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureMatch {
    pub figure_number: String,
    pub caption: String,
    pub file_path: String,
}

impl FigureMatch {
    /// Only matches carrying a non-empty path are worth materialising.
    pub fn is_eligible(&self) -> bool {
        !self.file_path.trim().is_empty()
    }
}

/// A figure image that was successfully copied out of the source archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArtifact {
    pub figure_number: String,
    /// Name of the stored file, `{stem}_{index}.{ext}`.
    #[serde(rename = "filename")]
    pub stored_filename: String,
    /// Path of the entry inside the source archive.
    #[serde(rename = "original_filename")]
    pub original_path: String,
    pub caption: String,
}

/// The persisted metadata record for one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub arxiv_id: String,
    pub images: Vec<ImageArtifact>,
}

/// Pipeline stages, used in diagnostics and progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Probe,
    SourceText,
    Captions,
    Matching,
    Materialize,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Download => "download",
            Stage::Probe => "probe",
            Stage::SourceText => "source text",
            Stage::Captions => "captions",
            Stage::Matching => "matching",
            Stage::Materialize => "materialize",
            Stage::Assemble => "assemble",
        };
        f.write_str(name)
    }
}

/// Terminal state of a run that did not fail fatally.
///
/// Fatal outcomes (transport failure, no LaTeX) are `Err(FigureError)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Figures were matched; `images` holds whatever could be extracted.
    Success,
    /// The caption call produced nothing usable.
    NoCaptions,
    /// Captions exist but no figure could be matched to a source path.
    NoMatches,
}

impl ExtractionStatus {
    /// Pick the terminal state from upstream stage results, in pipeline order.
    pub fn select(captions: &[CaptionRecord], matches: &[FigureMatch]) -> Self {
        if captions.is_empty() {
            ExtractionStatus::NoCaptions
        } else if matches.is_empty() {
            ExtractionStatus::NoMatches
        } else {
            ExtractionStatus::Success
        }
    }

    pub fn is_warning(self) -> bool {
        !matches!(self, ExtractionStatus::Success)
    }
}

/// Timing and token statistics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub source_bytes: usize,
    pub pdf_bytes: usize,
    pub source_text_chars: usize,
    pub captions: usize,
    pub matches: usize,
    pub images_saved: usize,
    pub images_skipped: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub inference_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a non-fatal run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub arxiv_id: String,
    pub status: ExtractionStatus,
    pub message: String,
    pub captions: Vec<CaptionRecord>,
    pub images: Vec<ImageArtifact>,
    /// Non-fatal problems encountered along the way.
    pub diagnostics: Vec<StageError>,
    pub stats: ExtractionStats,
}

impl ExtractionOutcome {
    /// The persisted view of this outcome.
    pub fn bundle(&self) -> ResultBundle {
        ResultBundle {
            arxiv_id: self.arxiv_id.clone(),
            images: self.images.clone(),
        }
    }
}

/// Response envelope for the request/response boundary.
///
/// Mirrors the JSON the web front-end expects: `status` is one of
/// `success`, `warning` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigureResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<Vec<ImageArtifact>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure_info: Option<Vec<CaptionRecord>>,
}

impl FigureResponse {
    /// Build the envelope for one run. `arxiv_id` is attached to error
    /// responses when the caller knows it.
    pub fn from_result(
        arxiv_id: Option<&str>,
        result: &Result<ExtractionOutcome, FigureError>,
    ) -> Self {
        match result {
            Ok(outcome) => {
                let (status, image_data, figure_info) = match outcome.status {
                    ExtractionStatus::Success => ("success", Some(outcome.images.clone()), None),
                    ExtractionStatus::NoCaptions => ("warning", None, None),
                    ExtractionStatus::NoMatches => {
                        ("warning", None, Some(outcome.captions.clone()))
                    }
                };
                FigureResponse {
                    status: status.to_string(),
                    message: outcome.message.clone(),
                    arxiv_id: Some(outcome.arxiv_id.clone()),
                    image_data,
                    figure_info,
                }
            }
            Err(e) => FigureResponse {
                status: "error".to_string(),
                message: e.to_string(),
                arxiv_id: arxiv_id.map(str::to_string),
                image_data: None,
                figure_info: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caption(n: &str) -> CaptionRecord {
        CaptionRecord {
            figure_number: n.into(),
            caption: format!("Caption {n}"),
        }
    }

    #[test]
    fn status_selection_follows_pipeline_order() {
        let m = FigureMatch {
            figure_number: "1".into(),
            caption: "c".into(),
            file_path: "a.png".into(),
        };
        assert_eq!(ExtractionStatus::select(&[], &[m.clone()]), ExtractionStatus::NoCaptions);
        assert_eq!(ExtractionStatus::select(&[caption("1")], &[]), ExtractionStatus::NoMatches);
        assert_eq!(ExtractionStatus::select(&[caption("1")], &[m]), ExtractionStatus::Success);
    }

    #[test]
    fn eligibility_requires_non_blank_path() {
        let mut m = FigureMatch {
            figure_number: "1".into(),
            caption: "c".into(),
            file_path: "  ".into(),
        };
        assert!(!m.is_eligible());
        m.file_path = "fig.png".into();
        assert!(m.is_eligible());
    }

    #[test]
    fn artifact_serialises_with_legacy_keys() {
        let a = ImageArtifact {
            figure_number: "1".into(),
            stored_filename: "1706.03762_1.png".into(),
            original_path: "images/plot.png".into(),
            caption: "A plot".into(),
        };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["filename"], "1706.03762_1.png");
        assert_eq!(json["original_filename"], "images/plot.png");
    }

    #[test]
    fn error_response_carries_message() {
        let result: Result<ExtractionOutcome, FigureError> = Err(FigureError::NoSourceText {
            paper_id: "2101.00001".into(),
        });
        let resp = FigureResponse::from_result(Some("2101.00001"), &result);
        assert_eq!(resp.status, "error");
        assert!(resp.message.contains("No LaTeX content found"));
        assert!(resp.image_data.is_none());
    }

    #[test]
    fn no_matches_response_includes_figure_info() {
        let outcome = ExtractionOutcome {
            arxiv_id: "2101.00001".into(),
            status: ExtractionStatus::NoMatches,
            message: "no match".into(),
            captions: vec![caption("1")],
            images: vec![],
            diagnostics: vec![],
            stats: ExtractionStats::default(),
        };
        let resp = FigureResponse::from_result(None, &Ok(outcome));
        assert_eq!(resp.status, "warning");
        assert_eq!(resp.figure_info.as_ref().map(Vec::len), Some(1));
        assert_eq!(resp.arxiv_id.as_deref(), Some("2101.00001"));
    }
}
