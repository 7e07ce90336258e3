//! Image materialization: copy each matched archive entry into the store.
//!
//! The matcher's paths are hypotheses. Each one is resolved against the
//! archive's actual entry list, read from a fresh scan, and written as
//! `{stem}_{index}.{ext}`. Anything that cannot be resolved is skipped with
//! a [`StageError`]; the remaining figures are unaffected.

use super::archive::SourceArchive;
use super::fetch::PaperId;
use crate::error::{FigureError, StageError};
use crate::output::{FigureMatch, ImageArtifact};
use crate::progress::ExtractionProgressCallback;
use crate::store::ArtifactStore;
use std::path::Path;
use tracing::{debug, info, warn};

/// Extensions tried, in order, when a matched path has none.
///
/// LaTeX lets `\includegraphics{plot}` omit the extension and picks the
/// first existing file from a driver-specific list.
const IMPLICIT_EXTENSIONS: &[&str] = &["png", "pdf", "jpg", "jpeg", "eps"];

/// Graphics extensions kept as-is when the content cannot be sniffed.
const KNOWN_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp", "pdf", "eps", "ps", "svg",
];

const FALLBACK_EXTENSION: &str = "png";

/// Artifacts written plus per-figure problems.
#[derive(Debug, Default)]
pub struct MaterializeOutput {
    pub artifacts: Vec<ImageArtifact>,
    pub skipped: Vec<StageError>,
}

/// Copy every eligible match out of `archive` into `store`.
///
/// The sequence index is the 1-based position among eligible matches, so a
/// skipped figure leaves a gap rather than renumbering the rest. Per-figure
/// failures never abort the loop; only a storage write failure is fatal.
pub async fn materialize(
    archive: &SourceArchive,
    matches: &[FigureMatch],
    id: &PaperId,
    store: &ArtifactStore,
    progress: &dyn ExtractionProgressCallback,
) -> Result<MaterializeOutput, FigureError> {
    let mut out = MaterializeOutput::default();
    let eligible: Vec<&FigureMatch> = matches.iter().filter(|m| m.is_eligible()).collect();
    if eligible.len() < matches.len() {
        debug!(
            "Ignoring {} matches without a file path",
            matches.len() - eligible.len()
        );
    }

    if !archive.is_archive() {
        for m in eligible {
            warn!(
                "Cannot extract figure {} ('{}'): source is not an archive",
                m.figure_number, m.file_path
            );
            progress.on_figure_skipped(&m.figure_number, "source is not an archive");
            out.skipped.push(StageError::RawArchive {
                figure_number: m.figure_number.clone(),
                path: m.file_path.clone(),
            });
        }
        return Ok(out);
    }

    let names = archive.entry_names().unwrap_or_else(|e| {
        warn!("Failed to list archive entries: {}", e);
        Vec::new()
    });

    for (position, m) in eligible.into_iter().enumerate() {
        let index = position + 1;
        let wanted = m.file_path.trim();
        let entry = resolve_entry(&names, wanted).unwrap_or(wanted);

        let bytes = match archive.read_entry(entry) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!("Image file {} not found in archive", wanted);
                progress.on_figure_skipped(&m.figure_number, "not found in archive");
                out.skipped.push(StageError::EntryNotFound {
                    figure_number: m.figure_number.clone(),
                    path: m.file_path.clone(),
                });
                continue;
            }
            Err(e) => {
                warn!("Failed to read {} from archive: {}", entry, e);
                progress.on_figure_skipped(&m.figure_number, "unreadable archive entry");
                out.skipped.push(StageError::EntryReadFailed {
                    figure_number: m.figure_number.clone(),
                    path: m.file_path.clone(),
                    detail: e.to_string(),
                });
                continue;
            }
        };

        let extension = stored_extension(&bytes, entry);
        let filename = ArtifactStore::image_filename(id, index, extension);
        store.write_image(&filename, &bytes).await?;
        info!("Saved image: {}", filename);

        let artifact = ImageArtifact {
            figure_number: m.figure_number.clone(),
            stored_filename: filename,
            original_path: entry.to_string(),
            caption: m.caption.clone(),
        };
        progress.on_figure_saved(index, &artifact);
        out.artifacts.push(artifact);
    }

    Ok(out)
}

/// Find the archive entry a hypothesised path refers to.
///
/// Tries the exact name, then the name with `./` prefixes and backslashes
/// normalised, then (for paths without an extension) each
/// [`IMPLICIT_EXTENSIONS`] candidate.
pub fn resolve_entry<'a>(names: &'a [String], wanted: &str) -> Option<&'a str> {
    if let Some(name) = names.iter().find(|n| n.as_str() == wanted) {
        return Some(name);
    }

    let target = normalize(wanted);
    if let Some(name) = names.iter().find(|n| normalize(n) == target) {
        return Some(name);
    }

    if Path::new(&target).extension().is_none() {
        for ext in IMPLICIT_EXTENSIONS {
            let candidate = format!("{target}.{ext}");
            if let Some(name) = names.iter().find(|n| normalize(n) == candidate) {
                return Some(name);
            }
        }
    }
    None
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut rest = path.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

/// Extension for the stored file: sniffed from the content, else the
/// entry's own extension if it is a known graphics type, else `png`.
pub fn stored_extension(bytes: &[u8], entry: &str) -> &'static str {
    if let Some(ext) = image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
    {
        return ext;
    }
    if bytes.starts_with(b"%PDF") {
        return "pdf";
    }
    Path::new(entry)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .and_then(|e| KNOWN_EXTENSIONS.iter().copied().find(|k| *k == e))
        .unwrap_or(FALLBACK_EXTENSION)
}
