//! Caption extraction: ask the collaborator to list every figure in the PDF.

use super::llm::{InferenceCollaborator, InferenceRequest};
use super::parse::parse_captions;
use super::StageOutput;
use crate::error::StageError;
use crate::output::{CaptionRecord, Stage};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extract `(figure_number, caption)` pairs from a rendered paper.
///
/// Exactly one collaborator call. Never fails: a call error or an
/// unparseable answer yields an empty list plus the matching
/// [`StageError`], with the raw answer logged for diagnosis.
pub async fn extract_captions(
    collaborator: &dyn InferenceCollaborator,
    pdf: Arc<Vec<u8>>,
    instruction: &str,
) -> StageOutput<CaptionRecord> {
    let request = InferenceRequest::with_pdf(instruction, pdf);

    let reply = match collaborator.complete(request).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Caption extraction call failed: {}", e);
            return StageOutput::failed(e.into_stage_error(Stage::Captions));
        }
    };
    debug!("PDF extraction result: {}", reply.text);

    match parse_captions(&reply.text) {
        Ok(captions) => {
            info!("Extracted {} figures", captions.len());
            StageOutput::completed(captions, &reply)
        }
        Err(failure) => {
            warn!(
                "Failed to parse caption response: {}. Raw response: {}",
                failure.detail, reply.text
            );
            let mut out = StageOutput::failed(StageError::MalformedResponse {
                stage: Stage::Captions,
                detail: failure.detail,
                raw: reply.text.clone(),
            });
            out.record_tokens(&reply);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::llm::InferenceReply;
    use super::*;
    use crate::error::CollaboratorError;
    use async_trait::async_trait;

    struct Fixed(Result<&'static str, CollaboratorError>);

    #[async_trait]
    impl InferenceCollaborator for Fixed {
        async fn complete(
            &self,
            request: InferenceRequest,
        ) -> Result<InferenceReply, CollaboratorError> {
            assert!(request.attachment.is_some(), "caption call must attach the PDF");
            self.0.clone().map(InferenceReply::new)
        }
    }

    fn pdf() -> Arc<Vec<u8>> {
        Arc::new(b"%PDF-1.5".to_vec())
    }

    #[test]
    fn parses_fenced_response() {
        let collab = Fixed(Ok(
            "```json\n[{\"figure_number\": \"1\", \"caption\": \"Overview.\"}]\n```",
        ));
        let out = tokio_test::block_on(extract_captions(&collab, pdf(), "list"));
        assert_eq!(out.items.len(), 1);
        assert!(out.error.is_none());
    }

    #[test]
    fn garbage_yields_empty_list_and_diagnostic() {
        let collab = Fixed(Ok("Sorry, I cannot read PDFs."));
        let out = tokio_test::block_on(extract_captions(&collab, pdf(), "list"));
        assert!(out.items.is_empty());
        match out.error {
            Some(StageError::MalformedResponse { stage, raw, .. }) => {
                assert_eq!(stage, Stage::Captions);
                assert_eq!(raw, "Sorry, I cannot read PDFs.");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn call_failure_yields_empty_list() {
        let collab = Fixed(Err(CollaboratorError::Provider("503".into())));
        let out = tokio_test::block_on(extract_captions(&collab, pdf(), "list"));
        assert!(out.items.is_empty());
        assert!(matches!(
            out.error,
            Some(StageError::CollaboratorFailed { stage: Stage::Captions, .. })
        ));
    }
}
