//! Path matching: map each caption to the archive file holding its image.
//!
//! Exact static matching would need full LaTeX expansion (macros,
//! `\graphicspath`, `\input` chains, missing extensions). Instead the
//! collaborator gets the caption list and a bounded excerpt of the source
//! and proposes a path per figure. The answer is a hypothesis; the
//! materializer verifies it against the archive.

use super::llm::{InferenceCollaborator, InferenceRequest};
use super::parse::parse_matches;
use super::StageOutput;
use crate::config::SampleStrategy;
use crate::error::StageError;
use crate::output::{CaptionRecord, FigureMatch, Stage};
use crate::prompts::match_prompt;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

static RE_FIGURE_ENV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{(?:sub)?figure\*?\}.*?\\end\{(?:sub)?figure\*?\}").unwrap());

static RE_GRAPHICS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^.*\\(?:includegraphics|graphicspath|includesvg).*$").unwrap());

/// Propose archive paths for `captions`.
///
/// One collaborator call with a `sample_chars`-bounded excerpt of
/// `source_text`. Never fails: problems yield an empty list plus a
/// [`StageError`].
pub async fn match_figures(
    collaborator: &dyn InferenceCollaborator,
    captions: &[CaptionRecord],
    source_text: &str,
    sample_chars: usize,
    strategy: SampleStrategy,
) -> StageOutput<FigureMatch> {
    let captions_json =
        serde_json::to_string_pretty(captions).unwrap_or_else(|_| "[]".to_string());
    let sample = select_sample(source_text, sample_chars, strategy);
    debug!(
        "Matching {} captions against a {}-char sample ({:?})",
        captions.len(),
        sample.chars().count(),
        strategy
    );

    let request = InferenceRequest::text(match_prompt(&captions_json, &sample));
    let reply = match collaborator.complete(request).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Path matching call failed: {}", e);
            return StageOutput::failed(e.into_stage_error(Stage::Matching));
        }
    };
    debug!("LaTeX matching result: {}", reply.text);

    match parse_matches(&reply.text, captions) {
        Ok(matches) => {
            info!("Matched {} figures", matches.len());
            StageOutput::completed(matches, &reply)
        }
        Err(failure) => {
            warn!(
                "Failed to parse matching response: {}. Raw response: {}",
                failure.detail, reply.text
            );
            let mut out = StageOutput::failed(StageError::MalformedResponse {
                stage: Stage::Matching,
                detail: failure.detail,
                raw: reply.text.clone(),
            });
            out.record_tokens(&reply);
            out
        }
    }
}

/// Choose the LaTeX excerpt sent with the matching call.
///
/// The result never exceeds `max_chars` characters.
pub fn select_sample(text: &str, max_chars: usize, strategy: SampleStrategy) -> String {
    match strategy {
        SampleStrategy::Prefix => take_chars(text, max_chars).to_string(),
        SampleStrategy::Figures => {
            let mut sample = figure_snippets(text).join("\n");
            let used = sample.chars().count();
            if used < max_chars {
                let rest = max_chars - used;
                let sep = if sample.is_empty() { 0 } else { 1 };
                if rest > sep {
                    if sep == 1 {
                        sample.push('\n');
                    }
                    sample.push_str(take_chars(text, rest - sep));
                }
            }
            take_chars(&sample, max_chars).to_string()
        }
    }
}

/// Figure environments, then graphics lines outside of them, in source order.
fn figure_snippets(text: &str) -> Vec<&str> {
    let envs: Vec<(usize, usize, &str)> = RE_FIGURE_ENV
        .find_iter(text)
        .map(|m| (m.start(), m.end(), m.as_str()))
        .collect();

    let mut snippets: Vec<(usize, &str)> = envs.iter().map(|(s, _, t)| (*s, *t)).collect();
    snippets.extend(
        RE_GRAPHICS_LINE
            .find_iter(text)
            .filter(|m| !envs.iter().any(|(s, e, _)| m.start() >= *s && m.start() < *e))
            .map(|m| (m.start(), m.as_str())),
    );
    snippets.sort_by_key(|(start, _)| *start);
    snippets.into_iter().map(|(_, s)| s).collect()
}

/// The first `n` characters of `s`, on a char boundary.
fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
