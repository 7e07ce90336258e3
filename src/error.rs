//! Error types for the arxiv-figures library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FigureError`] — **Fatal**: the run cannot produce anything useful
//!   (the paper could not be downloaded, the source has no LaTeX, the
//!   provider is not configured, storage refused a write). Returned as
//!   `Err(FigureError)` from the top-level `extract*` functions.
//!
//! * [`StageError`] — **Non-fatal**: the collaborator returned garbage, or a
//!   hypothesised archive path does not exist. Collected into
//!   [`crate::output::ExtractionOutcome::diagnostics`] so callers can see
//!   what degraded without losing the figures that did work.

use crate::output::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the arxiv-figures library.
///
/// Stage-level failures use [`StageError`] and are reported inside
/// [`crate::output::ExtractionOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum FigureError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input is neither an arXiv identifier nor an arXiv link.
    #[error("Invalid paper identifier '{input}'\nExpected e.g. 1706.03762, arXiv:1706.03762v5, hep-th/9901001 or an arxiv.org link.")]
    InvalidPaperId { input: String },

    // ── Transport errors ──────────────────────────────────────────────────
    /// The source archive or PDF could not be downloaded.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The source archive is unreadable or holds no source-text files.
    #[error("No LaTeX content found in the source files of '{paper_id}'.")]
    NoSourceText { paper_id: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Could not create or write an artifact in the output directory.
    #[error("Failed to write '{path}': {source}")]
    StorageFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored artifact was requested but does not exist.
    #[error("Artifact not found: '{path}'")]
    ArtifactNotFound { path: PathBuf },

    /// The stored metadata record exists but cannot be decoded.
    #[error("Metadata record '{path}' is corrupt: {detail}")]
    MetadataCorrupt { path: PathBuf, detail: String },

    /// Building the on-demand image bundle failed.
    #[error("Failed to build image bundle '{path}': {detail}")]
    BundleFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FigureError {
    /// Whether this error came from retrieving the paper over the network.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FigureError::DownloadFailed { .. } | FigureError::DownloadTimeout { .. }
        )
    }
}

/// A non-fatal error for a single stage or a single figure.
///
/// The run continues; the affected stage yields fewer (possibly zero) items.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum StageError {
    /// The collaborator call itself failed (API error, refused request).
    #[error("{stage}: collaborator call failed: {detail}")]
    CollaboratorFailed { stage: Stage, detail: String },

    /// The collaborator call exceeded the per-call timeout.
    #[error("{stage}: collaborator call timed out after {secs}s")]
    CollaboratorTimeout { stage: Stage, secs: u64 },

    /// The collaborator answered, but not with the expected structure.
    #[error("{stage}: could not parse collaborator response: {detail}")]
    MalformedResponse {
        stage: Stage,
        detail: String,
        raw: String,
    },

    /// A matched path does not exist in the source archive.
    #[error("Figure {figure_number}: '{path}' not found in source archive")]
    EntryNotFound { figure_number: String, path: String },

    /// The source is not an archive, so no entry can be extracted.
    #[error("Figure {figure_number}: cannot extract '{path}' from a raw (non-archive) source")]
    RawArchive { figure_number: String, path: String },

    /// The entry exists but could not be read from the archive.
    ///
    /// Failing to write the image into the store is fatal
    /// ([`FigureError::StorageFailed`]), not a per-figure skip.
    #[error("Figure {figure_number}: failed to extract '{path}': {detail}")]
    EntryReadFailed {
        figure_number: String,
        path: String,
        detail: String,
    },
}

/// Error reported by an [`crate::pipeline::llm::InferenceCollaborator`].
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// The underlying provider returned an error.
    #[error("{0}")]
    Provider(String),

    /// The call did not finish within the configured budget.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl CollaboratorError {
    pub(crate) fn into_stage_error(self, stage: Stage) -> StageError {
        match self {
            CollaboratorError::Provider(detail) => StageError::CollaboratorFailed { stage, detail },
            CollaboratorError::Timeout { secs } => StageError::CollaboratorTimeout { stage, secs },
        }
    }
}
