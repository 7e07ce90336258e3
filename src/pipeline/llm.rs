//! The inference collaborator: trait seam plus the LLM-backed implementation.
//!
//! The pipeline talks to the model through [`InferenceCollaborator`] only,
//! so the caption and matching stages can be driven by a scripted double in
//! tests and by any provider `edgequake-llm` supports in production.
//!
//! ## No retry
//!
//! Each stage makes exactly one call. A failed or timed-out call is a
//! degraded stage result, not something this layer papers over; retry
//! policy belongs to whoever invokes the pipeline.

use crate::config::ExtractionConfig;
use crate::error::CollaboratorError;
use crate::prompts::SYSTEM_PROMPT;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Content attached to a collaborator request alongside the instruction.
#[derive(Debug, Clone)]
pub enum Attachment {
    /// A rendered paper, sent as an `application/pdf` document.
    Pdf(Arc<Vec<u8>>),
}

/// One call to the collaborator.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub instruction: String,
    pub attachment: Option<Attachment>,
}

impl InferenceRequest {
    pub fn text(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            attachment: None,
        }
    }

    pub fn with_pdf(instruction: impl Into<String>, pdf: Arc<Vec<u8>>) -> Self {
        Self {
            instruction: instruction.into(),
            attachment: Some(Attachment::Pdf(pdf)),
        }
    }
}

/// The collaborator's free-text answer plus token accounting.
#[derive(Debug, Clone, Default)]
pub struct InferenceReply {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl InferenceReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// An external text/document-understanding service.
///
/// Implementations return whatever text the service produced; validating
/// its structure is the caller's job.
#[async_trait]
pub trait InferenceCollaborator: Send + Sync {
    async fn complete(&self, request: InferenceRequest) -> Result<InferenceReply, CollaboratorError>;
}

/// [`InferenceCollaborator`] backed by an `edgequake-llm` provider.
pub struct LlmCollaborator {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl LlmCollaborator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            timeout_secs: config.api_timeout_secs,
        }
    }
}

#[async_trait]
impl InferenceCollaborator for LlmCollaborator {
    async fn complete(&self, request: InferenceRequest) -> Result<InferenceReply, CollaboratorError> {
        let start = Instant::now();
        let messages = build_messages(&request);

        let response = timeout(
            Duration::from_secs(self.timeout_secs),
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        .map_err(|_| CollaboratorError::Timeout {
            secs: self.timeout_secs,
        })?
        .map_err(|e| CollaboratorError::Provider(e.to_string()))?;

        debug!(
            "Collaborator: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(InferenceReply {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

/// Build the message list for one request.
///
/// ## Message Layout
/// 1. **System message** — JSON-only answering rules
/// 2. **User message** — the instruction, with the PDF attached when present
fn build_messages(request: &InferenceRequest) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
    match &request.attachment {
        Some(Attachment::Pdf(bytes)) => {
            let doc = ImageData::new(STANDARD.encode(bytes.as_slice()), "application/pdf");
            messages.push(ChatMessage::user_with_images(
                request.instruction.as_str(),
                vec![doc],
            ));
        }
        None => messages.push(ChatMessage::user(request.instruction.as_str())),
    }
    messages
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ExtractionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[test]
    fn text_request_has_system_and_user_messages() {
        let messages = build_messages(&InferenceRequest::text("match these"));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn pdf_request_carries_attachment() {
        let req = InferenceRequest::with_pdf("list figures", Arc::new(b"%PDF-1.5".to_vec()));
        assert!(matches!(req.attachment, Some(Attachment::Pdf(ref b)) if b.starts_with(b"%PDF")));
        assert_eq!(build_messages(&req).len(), 2);
    }
}
