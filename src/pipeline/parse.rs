//! Parsing of collaborator responses into typed records.
//!
//! The collaborator is asked for a JSON list inside a ```json fence. Models
//! comply most of the time; the rest of the time they drop the fence, wrap
//! the list in an object, number figures as integers, or return prose. This
//! module treats the response as untrusted input:
//!
//! 1. take the JSON fenced block if there is one (see
//!    [`structured_payload`]), else the whole text;
//! 2. decode it as JSON;
//! 3. validate the shape explicitly: a list (or an object holding exactly
//!    one list), whose items are objects with the required keys as strings
//!    or numbers.
//!
//! Items failing step 3 are dropped individually. A response failing
//! steps 2–3 as a whole is a [`ParseFailure`]; callers turn that into an
//! empty stage result.

use crate::output::{CaptionRecord, FigureMatch};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

static RE_FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap()
});

/// Why a response could not be turned into records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub detail: String,
}

/// The structured payload of a response.
///
/// Models often quote LaTeX or code in other fences before answering, so
/// the block is chosen in this order: the first ```` ```json ```` block,
/// the first fenced block whose body decodes as JSON, the first untagged
/// block, and finally the whole trimmed text.
pub fn structured_payload(text: &str) -> &str {
    let blocks: Vec<(&str, &str)> = RE_FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str().trim())))
        .collect();

    blocks
        .iter()
        .find(|(tag, _)| tag.eq_ignore_ascii_case("json"))
        .or_else(|| {
            blocks
                .iter()
                .find(|(_, body)| serde_json::from_str::<Value>(body).is_ok())
        })
        .or_else(|| blocks.iter().find(|(tag, _)| tag.is_empty()))
        .map(|(_, body)| *body)
        .unwrap_or_else(|| text.trim())
}

/// Parse a caption-call response.
pub fn parse_captions(text: &str) -> Result<Vec<CaptionRecord>, ParseFailure> {
    let items = parse_list(text)?;
    let total = items.len();
    let records: Vec<CaptionRecord> = items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            Some(CaptionRecord {
                figure_number: text_field(obj, "figure_number")?,
                caption: text_field(obj, "caption")?,
            })
        })
        .collect();
    report_dropped("caption", total, records.len());
    Ok(records)
}

/// Parse a matching-call response.
///
/// `file_path` may be absent or null (kept as empty, later ineligible).
/// A missing `caption` is filled from `captions` by figure number.
pub fn parse_matches(
    text: &str,
    captions: &[CaptionRecord],
) -> Result<Vec<FigureMatch>, ParseFailure> {
    let items = parse_list(text)?;
    let total = items.len();
    let matches: Vec<FigureMatch> = items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            let figure_number = text_field(obj, "figure_number")?;
            let caption = match obj.get("caption") {
                None | Some(Value::Null) => captions
                    .iter()
                    .find(|c| c.figure_number == figure_number)
                    .map(|c| c.caption.clone())
                    .unwrap_or_default(),
                Some(_) => text_field(obj, "caption")?,
            };
            let file_path = match obj.get("file_path") {
                None | Some(Value::Null) => String::new(),
                Some(_) => text_field(obj, "file_path")?,
            };
            Some(FigureMatch {
                figure_number,
                caption,
                file_path: file_path.trim().to_string(),
            })
        })
        .collect();
    report_dropped("match", total, matches.len());
    Ok(matches)
}

fn parse_list(text: &str) -> Result<Vec<Value>, ParseFailure> {
    let payload = structured_payload(text);
    let value: Value = serde_json::from_str(payload).map_err(|e| ParseFailure {
        detail: format!("invalid JSON: {e}"),
    })?;

    match value {
        Value::Array(items) => Ok(items),
        Value::Object(obj) => {
            let mut lists = obj.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            });
            match (lists.next(), lists.next()) {
                (Some(items), None) => Ok(items),
                _ => Err(ParseFailure {
                    detail: "expected a JSON list, got an object without a single list field"
                        .into(),
                }),
            }
        }
        other => Err(ParseFailure {
            detail: format!("expected a JSON list, got {}", json_kind(&other)),
        }),
    }
}

/// A string field, or a number rendered as text. Anything else is a shape error.
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn report_dropped(what: &str, total: usize, kept: usize) {
    if kept < total {
        warn!(
            "Dropped {} of {} {} records with missing or mistyped fields",
            total - kept,
            total,
            what
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_extracted() {
        let text = "Here you go:\n```json\n[{\"figure_number\": \"1\", \"caption\": \"A plot.\"}]\n```\nThanks";
        let caps = parse_captions(text).unwrap();
        assert_eq!(
            caps,
            vec![CaptionRecord {
                figure_number: "1".into(),
                caption: "A plot.".into()
            }]
        );
    }

    #[test]
    fn json_fence_wins_over_earlier_latex_fence() {
        let text = "The figure is included with:\n```latex\n\\includegraphics{images/plot.png}\n```\nAnswer:\n```json\n[{\"figure_number\": \"1\", \"caption\": \"A\", \"file_path\": \"images/plot.png\"}]\n```";
        let matches = parse_matches(text, &[]).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].file_path, "images/plot.png");
    }

    #[test]
    fn untagged_json_fence_is_found_after_other_fences() {
        let text = "```tex\n\\begin{figure}\n```\n```\n[{\"figure_number\": \"1\", \"caption\": \"A\"}]\n```";
        assert_eq!(structured_payload(text), "[{\"figure_number\": \"1\", \"caption\": \"A\"}]");
        assert_eq!(parse_captions(text).unwrap().len(), 1);
    }

    #[test]
    fn mistagged_fence_holding_json_is_used() {
        let text = "```latex\n\\caption{x}\n```\n```javascript\n[]\n```";
        assert_eq!(structured_payload(text), "[]");
    }

    #[test]
    fn unfenced_json_is_parsed_as_is() {
        let caps = parse_captions("[{\"figure_number\": \"2\", \"caption\": \"B\"}]").unwrap();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].figure_number, "2");
    }

    #[test]
    fn bare_fence_and_crlf_are_accepted() {
        let text = "```\r\n[{\"figure_number\": 3, \"caption\": \"C\"}]\r\n```";
        let caps = parse_captions(text).unwrap();
        assert_eq!(caps[0].figure_number, "3");
    }

    #[test]
    fn prose_is_a_parse_failure() {
        let err = parse_captions("I could not find any figures in this paper.").unwrap_err();
        assert!(err.detail.contains("invalid JSON"));
    }

    #[test]
    fn scalar_is_a_parse_failure() {
        let err = parse_captions("42").unwrap_err();
        assert!(err.detail.contains("a number"));
    }

    #[test]
    fn object_wrapping_one_list_is_unwrapped() {
        let text = r#"{"figures": [{"figure_number": "1", "caption": "x"}]}"#;
        assert_eq!(parse_captions(text).unwrap().len(), 1);
    }

    #[test]
    fn object_without_list_is_rejected() {
        assert!(parse_captions(r#"{"figure_number": "1", "caption": "x"}"#).is_err());
    }

    #[test]
    fn mistyped_items_are_dropped() {
        let text = r#"[
            {"figure_number": "1", "caption": "ok"},
            {"figure_number": "2"},
            {"figure_number": ["3"], "caption": "bad"},
            "not an object"
        ]"#;
        let caps = parse_captions(text).unwrap();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].caption, "ok");
    }

    #[test]
    fn matches_tolerate_missing_path_and_caption() {
        let captions = vec![CaptionRecord {
            figure_number: "1".into(),
            caption: "From captions".into(),
        }];
        let text = r#"```json
[
  {"figure_number": "1", "file_path": " images/plot.png "},
  {"figure_number": "2", "caption": "Two", "file_path": null},
  {"figure_number": "3", "caption": "Three"}
]
```"#;
        let matches = parse_matches(text, &captions).unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].caption, "From captions");
        assert_eq!(matches[0].file_path, "images/plot.png");
        assert!(!matches[1].is_eligible());
        assert!(!matches[2].is_eligible());
    }

    #[test]
    fn matches_with_non_string_path_are_dropped() {
        let text = r#"[{"figure_number": "1", "caption": "c", "file_path": {"path": "x"}}]"#;
        assert!(parse_matches(text, &[]).unwrap().is_empty());
    }
}
