//! # arxiv-figures
//!
//! Extract the figures of an arXiv paper, each paired with its caption.
//!
//! ## Why this crate?
//!
//! A paper's figures live as image files inside its LaTeX source bundle,
//! but nothing in the bundle says which file is "Figure 3". Captions are
//! easy to read off the rendered PDF and hard to pull out of raw LaTeX;
//! file paths are the opposite. This crate asks an LLM for each half (the
//! caption list from the PDF, then a path per caption from the LaTeX) and
//! verifies every proposed path against the actual archive before copying
//! anything to disk.
//!
//! ## Pipeline Overview
//!
//! ```text
//! paper id
//!  │
//!  ├─ 1. Fetch        download e-print source and PDF concurrently
//!  ├─ 2. Probe        tar(.gz) / zip / raw, by trial
//!  ├─ 3. Source text  concatenate every .tex entry
//!  ├─ 4. Captions     LLM reads the PDF → [(figure_number, caption)]
//!  ├─ 5. Matching     LLM reads captions + LaTeX excerpt → archive paths
//!  ├─ 6. Materialize  copy resolvable entries to {stem}_{n}.{ext}
//!  └─ 7. Assemble     {stem}_data.json + terminal status
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arxiv_figures::{extract_figures, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected; GEMINI_API_KEY is preferred
//!     let config = ExtractionConfig::builder().output_dir("figures").build()?;
//!     let outcome = extract_figures("1706.03762", &config).await?;
//!     for image in &outcome.images {
//!         println!("Figure {}: {}", image.figure_number, image.stored_filename);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `arxiv-figures` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! arxiv-figures = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! The caption call attaches the whole PDF, so the model must accept
//! `application/pdf` input. `gemini-2.0-flash` does so natively and is the
//! default whenever `GEMINI_API_KEY` is set.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, SampleStrategy};
pub use error::{CollaboratorError, FigureError, StageError};
pub use extract::{extract_figures, extract_figures_sync, extract_from_bytes};
pub use output::{
    CaptionRecord, ExtractionOutcome, ExtractionStats, ExtractionStatus, FigureMatch,
    FigureResponse, ImageArtifact, ResultBundle, Stage,
};
pub use pipeline::archive::{probe, ArchiveKind, SourceArchive};
pub use pipeline::fetch::PaperId;
pub use pipeline::llm::{
    Attachment, InferenceCollaborator, InferenceReply, InferenceRequest, LlmCollaborator,
};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::ArtifactStore;
