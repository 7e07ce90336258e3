//! Top-level extraction entry points.
//!
//! A run is strictly sequential: each stage consumes the previous stage's
//! output and the first empty result ends the run with a warning. Only
//! retrieval, storage, a missing provider and an archive without LaTeX are
//! fatal.

use crate::config::ExtractionConfig;
use crate::error::{FigureError, StageError};
use crate::output::{CaptionRecord, ExtractionOutcome, ExtractionStats, ExtractionStatus, Stage};
use crate::pipeline::fetch::{self, PaperId};
use crate::pipeline::llm::{InferenceCollaborator, LlmCollaborator};
use crate::pipeline::{archive, assemble, captions, matcher, materialize, text};
use crate::progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
use crate::prompts::CAPTION_PROMPT;
use crate::store::ArtifactStore;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Download an arXiv paper and extract its figures.
///
/// This is the primary entry point for the library. `paper` may be a bare
/// id (`1706.03762`), an `arXiv:` id or an arxiv.org link.
///
/// # Returns
/// `Ok(ExtractionOutcome)` for every run that got as far as the caption
/// call, including warning states. Check `outcome.status` and
/// `outcome.diagnostics`.
///
/// # Errors
/// Returns `Err(FigureError)` only for fatal errors:
/// - invalid paper id or no configured provider (checked before any download)
/// - download failure or timeout
/// - no LaTeX in the source archive
/// - the output directory cannot be written
pub async fn extract_figures(
    paper: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, FigureError> {
    let total_start = Instant::now();
    let id = PaperId::parse(paper.as_ref())?;
    info!("Starting figure extraction: {}", id);

    let collaborator = resolve_collaborator(config)?;
    let progress = progress_of(config);

    progress.on_stage_start(Stage::Download);
    let download =
        fetch::fetch_paper(&config.arxiv_base_url, &id, config.download_timeout_secs).await?;
    progress.on_stage_complete(Stage::Download, 2);

    run(
        &id,
        download.source,
        download.pdf,
        collaborator.as_ref(),
        progress.as_ref(),
        config,
        total_start,
    )
    .await
}

/// Extract figures from an already-downloaded source bundle and PDF.
///
/// No network access apart from the collaborator. Useful when the caller
/// caches arXiv downloads, and for driving the pipeline with a scripted
/// collaborator in tests.
pub async fn extract_from_bytes(
    id: &PaperId,
    source: Vec<u8>,
    pdf: Vec<u8>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, FigureError> {
    let total_start = Instant::now();
    let collaborator = resolve_collaborator(config)?;
    let progress = progress_of(config);
    run(
        id,
        source,
        pdf,
        collaborator.as_ref(),
        progress.as_ref(),
        config,
        total_start,
    )
    .await
}

/// Synchronous wrapper around [`extract_figures`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_figures_sync(
    paper: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome, FigureError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FigureError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_figures(paper, config))
}

async fn run(
    id: &PaperId,
    source: Vec<u8>,
    pdf: Vec<u8>,
    collaborator: &dyn InferenceCollaborator,
    progress: &dyn ExtractionProgressCallback,
    config: &ExtractionConfig,
    total_start: Instant,
) -> Result<ExtractionOutcome, FigureError> {
    let mut stats = ExtractionStats {
        source_bytes: source.len(),
        pdf_bytes: pdf.len(),
        ..Default::default()
    };
    let mut diagnostics = Vec::new();

    // ── Step 1: Probe the source container ───────────────────────────────
    progress.on_stage_start(Stage::Probe);
    let archive = archive::probe(source);
    info!("Source archive: {:?}, {} bytes", archive.kind(), archive.len());
    progress.on_stage_complete(Stage::Probe, usize::from(archive.is_archive()));

    // ── Step 2: Concatenate LaTeX sources ────────────────────────────────
    progress.on_stage_start(Stage::SourceText);
    let source_text = text::extract_source_text(&archive, &config.source_suffixes);
    stats.source_text_chars = source_text.chars().count();
    progress.on_stage_complete(Stage::SourceText, stats.source_text_chars);
    if source_text.is_empty() {
        return Err(FigureError::NoSourceText {
            paper_id: id.to_string(),
        });
    }

    // ── Step 3: Captions from the PDF ────────────────────────────────────
    progress.on_stage_start(Stage::Captions);
    let inference_start = Instant::now();
    let instruction = config.caption_prompt.as_deref().unwrap_or(CAPTION_PROMPT);
    let caption_out = captions::extract_captions(collaborator, Arc::new(pdf), instruction).await;
    stats.total_input_tokens += caption_out.input_tokens;
    stats.total_output_tokens += caption_out.output_tokens;
    stats.captions = caption_out.items.len();
    diagnostics.extend(caption_out.error);
    progress.on_stage_complete(Stage::Captions, stats.captions);

    let caption_list = caption_out.items;
    let status = ExtractionStatus::select(&caption_list, &[]);
    if status == ExtractionStatus::NoCaptions {
        stats.inference_duration_ms = inference_start.elapsed().as_millis() as u64;
        return Ok(finish_warning(
            id,
            status,
            caption_list,
            diagnostics,
            stats,
            progress,
            total_start,
        ));
    }

    // ── Step 4: Match captions to archive paths ──────────────────────────
    progress.on_stage_start(Stage::Matching);
    let match_out = matcher::match_figures(
        collaborator,
        &caption_list,
        &source_text,
        config.source_sample_chars,
        config.sample_strategy,
    )
    .await;
    stats.inference_duration_ms = inference_start.elapsed().as_millis() as u64;
    stats.total_input_tokens += match_out.input_tokens;
    stats.total_output_tokens += match_out.output_tokens;
    stats.matches = match_out.items.len();
    diagnostics.extend(match_out.error);
    progress.on_stage_complete(Stage::Matching, stats.matches);

    let matches = match_out.items;
    let status = ExtractionStatus::select(&caption_list, &matches);
    if status.is_warning() {
        return Ok(finish_warning(
            id,
            status,
            caption_list,
            diagnostics,
            stats,
            progress,
            total_start,
        ));
    }

    // ── Step 5: Copy matched entries into the store ──────────────────────
    progress.on_stage_start(Stage::Materialize);
    let store = ArtifactStore::new(&config.output_dir);
    store.ensure_root().await?;
    let materialized =
        materialize::materialize(&archive, &matches, id, &store, progress).await?;
    stats.images_saved = materialized.artifacts.len();
    stats.images_skipped = materialized.skipped.len();
    diagnostics.extend(materialized.skipped);
    progress.on_stage_complete(Stage::Materialize, stats.images_saved);

    // ── Step 6: Persist the metadata record ──────────────────────────────
    progress.on_stage_start(Stage::Assemble);
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    let outcome = assemble::finish(
        &store,
        id,
        caption_list,
        materialized.artifacts,
        diagnostics,
        stats,
    )
    .await?;
    progress.on_stage_complete(Stage::Assemble, outcome.images.len());

    info!(
        "Extraction complete: {} images from {} matches, {}ms total",
        outcome.images.len(),
        outcome.stats.matches,
        outcome.stats.total_duration_ms
    );
    progress.on_extraction_complete(outcome.status, outcome.images.len());
    Ok(outcome)
}

fn finish_warning(
    id: &PaperId,
    status: ExtractionStatus,
    captions: Vec<CaptionRecord>,
    diagnostics: Vec<StageError>,
    mut stats: ExtractionStats,
    progress: &dyn ExtractionProgressCallback,
    total_start: Instant,
) -> ExtractionOutcome {
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    let outcome = assemble::warning(id, status, captions, diagnostics, stats);
    progress.on_extraction_complete(status, 0);
    outcome
}

fn progress_of(config: &ExtractionConfig) -> ProgressCallback {
    config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, FigureError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        FigureError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Model used when a provider is named but no model is configured.
fn default_model(provider_name: &str) -> &'static str {
    if provider_name.eq_ignore_ascii_case("gemini") {
        DEFAULT_GEMINI_MODEL
    } else {
        DEFAULT_MODEL
    }
}

/// Resolve the collaborator, from most-specific to least-specific.
///
/// 1. **Pre-built collaborator** (`config.collaborator`), used as-is.
/// 2. **Pre-built provider** (`config.provider`), wrapped in an
///    [`LlmCollaborator`].
/// 3. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 5. **`GEMINI_API_KEY`**: Gemini reads PDFs natively, so it is preferred
///    over whatever else auto-detection would find.
/// 6. **Full auto-detection** (`ProviderFactory::from_env`).
pub(crate) fn resolve_collaborator(
    config: &ExtractionConfig,
) -> Result<Arc<dyn InferenceCollaborator>, FigureError> {
    if let Some(ref collaborator) = config.collaborator {
        return Ok(Arc::clone(collaborator));
    }
    let provider = resolve_provider(config)?;
    debug!("Wrapping LLM provider in collaborator (timeout {}s)", config.api_timeout_secs);
    Ok(Arc::new(LlmCollaborator::new(provider, config)))
}

fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, FigureError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(default_model(name));
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
            return create_provider("gemini", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| FigureError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (recommended: it reads PDFs natively), \
                OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::pipeline::llm::{InferenceReply, InferenceRequest};
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl InferenceCollaborator for Silent {
        async fn complete(&self, _: InferenceRequest) -> Result<InferenceReply, CollaboratorError> {
            Ok(InferenceReply::new("[]"))
        }
    }

    #[test]
    fn default_model_depends_on_provider() {
        assert_eq!(default_model("gemini"), "gemini-2.0-flash");
        assert_eq!(default_model("Gemini"), "gemini-2.0-flash");
        assert_eq!(default_model("openai"), "gpt-4.1-nano");
    }

    #[test]
    fn explicit_collaborator_wins() {
        let collab: Arc<dyn InferenceCollaborator> = Arc::new(Silent);
        let config = ExtractionConfig::builder()
            .collaborator(Arc::clone(&collab))
            .provider_name("definitely-not-a-provider")
            .build()
            .unwrap();
        let resolved = resolve_collaborator(&config).unwrap();
        assert!(Arc::ptr_eq(&resolved, &collab));
    }

    #[tokio::test]
    async fn invalid_id_fails_before_anything_else() {
        let config = ExtractionConfig::builder()
            .collaborator(Arc::new(Silent))
            .arxiv_base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let err = extract_figures("../../etc/passwd", &config).await.unwrap_err();
        assert!(matches!(err, FigureError::InvalidPaperId { .. }));
    }
}
