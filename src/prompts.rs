//! Instructions sent to the inference collaborator.
//!
//! Every prompt lives here so tests can inspect them without a model, and a
//! wording change touches exactly one place. The caption instruction can be
//! overridden via [`crate::config::ExtractionConfig::caption_prompt`].

/// System message for both collaborator calls.
pub const SYSTEM_PROMPT: &str = "You are a meticulous research assistant that reads scientific papers \
and their LaTeX sources. You answer with JSON only, inside a single ```json fenced block. \
You never invent figures, captions or file paths that are not present in the material you were given.";

/// Instruction for the caption call. The PDF is attached to the same message.
pub const CAPTION_PROMPT: &str = r#"Read this paper carefully and list every figure it contains, in the order they appear.

For each figure give:
- `figure_number`: the number exactly as printed (e.g. "1", "3b", "A.2")
- `caption`: the full caption text, verbatim

Do not miss any figure and do not make up any information.
Respond with a JSON list of objects, each with exactly the two keys `figure_number` and `caption`."#;

/// Build the instruction for the matching call.
///
/// `captions_json` is the pretty-printed caption list; `sample` is the
/// bounded LaTeX excerpt chosen by [`crate::pipeline::matcher::select_sample`].
pub fn match_prompt(captions_json: &str, sample: &str) -> String {
    format!(
        r#"Given the following LaTeX source and extracted figure information, find the correct file path for each figure.
Return the results as a JSON list of objects, where each object contains `figure_number`, `caption` and `file_path`.
`file_path` must be the path of the image file inside the source archive, as referenced by the LaTeX. Use an empty string when you cannot tell.

Extracted figure information:
{captions_json}

LaTeX source (excerpt):
"""
{sample}
"""

Focus on \includegraphics commands (and \graphicspath, \input of figure files) that match the figure numbers or captions."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_prompt_names_both_keys() {
        assert!(CAPTION_PROMPT.contains("`figure_number`"));
        assert!(CAPTION_PROMPT.contains("`caption`"));
    }

    #[test]
    fn match_prompt_embeds_inputs() {
        let p = match_prompt("[{\"figure_number\":\"1\"}]", "\\includegraphics{plot}");
        assert!(p.contains("[{\"figure_number\":\"1\"}]"));
        assert!(p.contains("\\includegraphics{plot}"));
        assert!(p.contains("`file_path`"));
    }
}
