//! Pipeline stages for figure extraction.
//!
//! Each submodule implements exactly one step and can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ archive ──▶ text ──▶ captions ──▶ matcher ──▶ materialize ──▶ assemble
//! (HTTP)    (probe)    (LaTeX)   (LLM+PDF)    (LLM+TeX)   (archive→disk)  (metadata)
//! ```
//!
//! 1. [`fetch`]       — parse the paper id; download source and PDF concurrently
//! 2. [`archive`]     — tar / zip / raw by trial; rewindable entry access
//! 3. [`text`]        — concatenate every `.tex` entry
//! 4. [`captions`]    — collaborator lists figure numbers and captions
//! 5. [`matcher`]     — collaborator proposes an archive path per figure
//! 6. [`materialize`] — copy each resolvable entry into the store
//! 7. [`assemble`]    — pick the terminal state, persist the metadata record
//!
//! [`llm`] is the collaborator seam and [`parse`] validates its answers.

pub mod archive;
pub mod assemble;
pub mod captions;
pub mod fetch;
pub mod llm;
pub mod matcher;
pub mod materialize;
pub mod parse;
pub mod text;

use crate::error::StageError;
use llm::InferenceReply;

/// Result of a collaborator-backed stage.
///
/// `items` is empty whenever `error` is set; an empty `items` with no
/// error means the collaborator legitimately found nothing.
#[derive(Debug, Clone)]
pub struct StageOutput<T> {
    pub items: Vec<T>,
    pub error: Option<StageError>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl<T> StageOutput<T> {
    pub(crate) fn completed(items: Vec<T>, reply: &InferenceReply) -> Self {
        Self {
            items,
            error: None,
            input_tokens: reply.input_tokens,
            output_tokens: reply.output_tokens,
        }
    }

    pub(crate) fn failed(error: StageError) -> Self {
        Self {
            items: Vec::new(),
            error: Some(error),
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    pub(crate) fn record_tokens(&mut self, reply: &InferenceReply) {
        self.input_tokens = reply.input_tokens;
        self.output_tokens = reply.output_tokens;
    }
}
