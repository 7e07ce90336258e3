//! Paper retrieval: normalise the user's input to an arXiv id and download
//! the source bundle and the rendered PDF.
//!
//! Both downloads are independent and run concurrently. Neither response is
//! validated beyond transport success: the source format is only known after
//! [`super::archive::probe`], and the PDF is opaque to this crate.

use crate::error::FigureError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

static RE_ARXIV_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.|export\.)?arxiv\.org/(?:abs|pdf|e-print|src)/(.+?)/?$").unwrap()
});

static RE_PAPER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._/-]+$").unwrap());

/// A validated arXiv paper identifier, e.g. `1706.03762v5` or `hep-th/9901001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaperId(String);

impl PaperId {
    /// Parse a bare id, an `arXiv:` prefixed id, or an arxiv.org link.
    ///
    /// Links to `abs/`, `pdf/` and `e-print/` pages are accepted; a trailing
    /// `.pdf` is dropped. Ids containing `..` segments or characters outside
    /// `[A-Za-z0-9._/-]` are rejected so they are safe to embed in file names
    /// and URLs.
    pub fn parse(input: &str) -> Result<Self, FigureError> {
        let invalid = || FigureError::InvalidPaperId {
            input: input.to_string(),
        };
        let trimmed = input.trim();

        let id = match RE_ARXIV_URL.captures(trimmed).and_then(|c| c.get(1)) {
            Some(m) => m.as_str(),
            None => trimmed
                .strip_prefix("arXiv:")
                .or_else(|| trimmed.strip_prefix("arxiv:"))
                .unwrap_or(trimmed),
        };
        let id = id.strip_suffix(".pdf").unwrap_or(id).trim_matches('/');

        if id.is_empty()
            || !RE_PAPER_ID.is_match(id)
            || id.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(invalid());
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as a single path component: `/` becomes `_`.
    pub fn file_stem(&self) -> String {
        self.0.replace('/', "_")
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// URL of the source bundle for `id`.
pub fn source_url(base: &str, id: &PaperId) -> String {
    format!("{}/e-print/{}", base.trim_end_matches('/'), id)
}

/// URL of the rendered PDF for `id`.
pub fn pdf_url(base: &str, id: &PaperId) -> String {
    format!("{}/pdf/{}.pdf", base.trim_end_matches('/'), id)
}

/// Both downloads for one paper.
pub struct PaperDownload {
    pub source: Vec<u8>,
    pub pdf: Vec<u8>,
}

/// Download the source bundle and the PDF concurrently.
///
/// Fails with the first transport error; the other request is dropped.
pub async fn fetch_paper(
    base: &str,
    id: &PaperId,
    timeout_secs: u64,
) -> Result<PaperDownload, FigureError> {
    let client = build_client(timeout_secs)?;
    let src = source_url(base, id);
    let pdf = pdf_url(base, id);

    let (source, pdf) = futures::try_join!(
        download(&client, &src, timeout_secs),
        download(&client, &pdf, timeout_secs),
    )?;

    Ok(PaperDownload { source, pdf })
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, FigureError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("arxiv-figures/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FigureError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// GET `url` and return the body. Non-2xx is a transport failure.
async fn download(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: u64,
) -> Result<Vec<u8>, FigureError> {
    info!("Downloading: {}", url);

    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            FigureError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            FigureError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_err)?;

    if !response.status().is_success() {
        return Err(FigureError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_err)?;
    debug!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_prefixed_ids() {
        assert_eq!(PaperId::parse("1706.03762").unwrap().as_str(), "1706.03762");
        assert_eq!(PaperId::parse(" arXiv:1706.03762v5 ").unwrap().as_str(), "1706.03762v5");
        assert_eq!(PaperId::parse("hep-th/9901001").unwrap().as_str(), "hep-th/9901001");
    }

    #[test]
    fn parses_links() {
        for link in [
            "https://arxiv.org/abs/1706.03762",
            "https://arxiv.org/pdf/1706.03762.pdf",
            "http://arxiv.org/pdf/1706.03762",
            "https://export.arxiv.org/e-print/1706.03762/",
        ] {
            assert_eq!(PaperId::parse(link).unwrap().as_str(), "1706.03762", "{link}");
        }
        assert_eq!(
            PaperId::parse("https://arxiv.org/abs/math.GT/0309136").unwrap().as_str(),
            "math.GT/0309136"
        );
    }

    #[test]
    fn rejects_unsafe_or_empty_ids() {
        for bad in ["", "   ", "../etc/passwd", "a/../b", "id with space", "x;rm", "/"] {
            assert!(PaperId::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn file_stem_flattens_old_style_ids() {
        let id = PaperId::parse("hep-th/9901001").unwrap();
        assert_eq!(id.file_stem(), "hep-th_9901001");
    }

    #[test]
    fn urls_follow_arxiv_layout() {
        let id = PaperId::parse("1706.03762").unwrap();
        assert_eq!(source_url("https://arxiv.org/", &id), "https://arxiv.org/e-print/1706.03762");
        assert_eq!(pdf_url("https://arxiv.org", &id), "https://arxiv.org/pdf/1706.03762.pdf");
    }
}
