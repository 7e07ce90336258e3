//! Source-text extraction: concatenate every LaTeX file in the archive.
//!
//! The result is one logical document for the matching call. File order is
//! archive order; files are joined with a newline so `\end{document}` of one
//! file never fuses with the first line of the next. Bytes that are not
//! valid UTF-8 (Latin-1 sources are common on older papers) are replaced
//! rather than failing the whole extraction.

use super::archive::{SourceArchive, Visit};
use std::io::Read;
use tracing::{debug, warn};

/// Concatenate all entries whose name ends with one of `suffixes`.
///
/// Returns an empty string for raw sources or when nothing matches; the
/// caller treats that as "no usable source".
pub fn extract_source_text(archive: &SourceArchive, suffixes: &[String]) -> String {
    if !archive.is_archive() {
        debug!("Raw source: no LaTeX entries to read");
        return String::new();
    }

    let mut text = String::new();
    let mut files = 0usize;

    let walk = archive.visit_files(
        |name| has_source_suffix(name, suffixes),
        |name, reader| {
            let mut buf = Vec::new();
            if let Err(e) = reader.read_to_end(&mut buf) {
                warn!("Skipping unreadable source file '{}': {}", name, e);
                return Ok(Visit::Skip);
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&buf));
            files += 1;
            debug!("Read source file '{}' ({} bytes)", name, buf.len());
            Ok(Visit::Skip)
        },
    );

    if let Err(e) = walk {
        warn!(
            "Archive walk stopped early after {} source files: {}",
            files, e
        );
    }

    debug!("Extracted {} chars from {} source files", text.len(), files);
    text
}

fn has_source_suffix(name: &str, suffixes: &[String]) -> bool {
    suffixes.iter().any(|s| name.ends_with(s.as_str()))
}
